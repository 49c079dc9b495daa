//! Main Coordinator task implementation

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::{CoordRequest, CoordinatorMetrics, HubSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::dispatch::{Broadcast, Command, Dispatcher, spawn_outbox};
use crate::domain::{DeviceId, TaskId};
use crate::events::{EventBus, HubEvent};
use crate::presence::{LivenessMonitor, PresenceTracker, PresenceTransition};
use crate::session::{Presence, Session};

/// State owned exclusively by the coordinator task
struct HubState {
    tracker: PresenceTracker,
    session: Session,
    monitor: LivenessMonitor,
    metrics: CoordinatorMetrics,
    events: EventBus,
}

impl HubState {
    fn new(config: &CoordinatorConfig, events: EventBus) -> Self {
        Self {
            tracker: PresenceTracker::new(&config.devices),
            session: Session::new(&config.tasks, config.session_duration_secs),
            monitor: LivenessMonitor::new(&config.liveness),
            metrics: CoordinatorMetrics::default(),
            events,
        }
    }

    fn presence(&self) -> Presence {
        Presence {
            connected: self.tracker.connected_count(),
            total: self.tracker.len(),
        }
    }

    fn on_announce(&mut self, device: DeviceId, now: Instant) -> Option<Command> {
        if !self.tracker.record_signal(device, now) {
            warn!(%device, "Announce from device that is not required, ignoring");
            self.metrics.dropped_signals += 1;
            return None;
        }

        if !self.tracker.mark_connected(device) {
            debug!(%device, "Coordinator: duplicate announce");
            return None;
        }

        info!(%device, "Device announced");
        self.events.emit(HubEvent::DeviceAnnounced { device });
        self.session.on_presence(self.presence())
    }

    fn on_signal(&mut self, device: DeviceId, at: Instant, now: Instant) -> Option<Command> {
        self.metrics.signals += 1;
        // A signal cannot be fresher than the coordinator clock
        if !self.tracker.record_signal(device, at.min(now)) {
            debug!(%device, "Coordinator: signal from untracked device");
            self.metrics.dropped_signals += 1;
            return None;
        }

        if self.tracker.is_connected(device) {
            return None;
        }

        // Recover straight away instead of waiting for the next tick
        let transition = self.monitor.evaluate_device(&mut self.tracker, device, now)?;
        self.apply(transition)
    }

    fn on_tick(&mut self, now: Instant) -> Vec<Command> {
        self.metrics.ticks += 1;
        let mut commands: Vec<Command> = self
            .monitor
            .evaluate(&mut self.tracker, now)
            .into_iter()
            .filter_map(|transition| self.apply(transition))
            .collect();

        if !self.session.is_activated()
            && let Some(cmd) = self.session.on_presence(self.presence())
        {
            commands.push(cmd);
        }
        commands
    }

    fn apply(&mut self, transition: PresenceTransition) -> Option<Command> {
        match transition {
            PresenceTransition::Lost(device) => {
                self.metrics.devices_lost += 1;
                self.events.emit(HubEvent::DeviceLost { device });
                self.session.on_device_lost(device)
            }
            PresenceTransition::Recovered(device) => {
                self.metrics.devices_recovered += 1;
                self.events.emit(HubEvent::DeviceRecovered { device });
                self.session.on_presence(self.presence())
            }
        }
    }

    fn on_task_completed(&mut self, task: TaskId) -> Option<Command> {
        self.events.emit(HubEvent::TaskCompleted { task });
        self.session.on_task_completed(task)
    }

    fn on_reset(&mut self) {
        self.session.reset();
        self.tracker.reset_counters();
        self.events.emit(HubEvent::SessionReset {
            session: self.session.id().to_string(),
        });
    }

    fn snapshot(&self, now: Instant) -> HubSnapshot {
        HubSnapshot {
            session: self.session.status(),
            devices: self.tracker.snapshot(now),
            metrics: self.metrics.clone(),
        }
    }
}

/// The Coordinator serializes every inbound event and liveness tick
///
/// All presence and session state lives inside [`Coordinator::run`]; other
/// tasks only ever talk to it through its request channel.
pub struct Coordinator {
    config: CoordinatorConfig,
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<dyn Dispatcher>,
    events: EventBus,
}

impl Coordinator {
    /// Create a new Coordinator with the given configuration
    pub fn new(config: CoordinatorConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        Self {
            config,
            tx,
            rx,
            clock: Arc::new(SystemClock),
            dispatcher,
            events: EventBus::with_default_capacity(),
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish hub events on an existing bus
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Get a sender for the liveness ticker
    pub fn sender(&self) -> mpsc::Sender<CoordRequest> {
        self.tx.clone()
    }

    /// Create a handle for event producers
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone())
    }

    /// The bus hub events are published on
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Run the Coordinator task
    ///
    /// This consumes the Coordinator and runs until shutdown is requested or
    /// every sender is gone. Broadcasts already queued are delivered before
    /// this returns.
    pub async fn run(mut self) {
        let mut state = HubState::new(&self.config, self.events.clone());
        let (outbox_tx, outbox) = spawn_outbox(self.dispatcher.clone(), self.config.outbox_buffer);
        drop(self.tx);

        info!(
            devices = self.config.devices.len(),
            tasks = self.config.tasks.len(),
            session = %state.session.id(),
            "Coordinator started"
        );

        while let Some(req) = self.rx.recv().await {
            state.metrics.messages_received += 1;
            let now = self.clock.now();

            let commands: Vec<Command> = match req {
                CoordRequest::Announce { device } => state.on_announce(device, now).into_iter().collect(),

                CoordRequest::Signal { device, at } => state.on_signal(device, at.unwrap_or(now), now).into_iter().collect(),

                CoordRequest::TaskCompleted { task } => state.on_task_completed(task).into_iter().collect(),

                CoordRequest::TimerExpired => vec![state.session.on_timer_expired()],

                CoordRequest::ManualPause => state.session.manual_pause().into_iter().collect(),

                CoordRequest::ManualResume => state.session.manual_resume().into_iter().collect(),

                CoordRequest::Reset => {
                    state.on_reset();
                    Vec::new()
                }

                CoordRequest::Tick => state.on_tick(now),

                CoordRequest::GetSnapshot { reply_tx } => {
                    let _ = reply_tx.send(state.snapshot(now));
                    Vec::new()
                }

                CoordRequest::Shutdown => {
                    info!("Coordinator shutting down");
                    break;
                }
            };

            for command in commands {
                let targets = state.tracker.ids();
                state.metrics.commands_issued += 1;
                state.events.emit(HubEvent::CommandIssued {
                    kind: command.kind(),
                    targets: targets.clone(),
                    payload: command.payload(),
                });

                if outbox_tx.send(Broadcast { command, targets }).await.is_err() {
                    warn!("Outbox closed, dropping broadcast");
                }
            }
        }

        drop(outbox_tx);
        match outbox.await {
            Ok(delivered) => debug!(delivered, "Coordinator: outbox drained"),
            Err(e) => warn!(error = %e, "Outbox task failed"),
        }

        info!(metrics = ?state.metrics, "Coordinator stopped");
    }
}
