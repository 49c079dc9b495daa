//! Event Bus - central pub/sub system for hub events
//!
//! The EventBus uses tokio broadcast channels to deliver events to all subscribers
//! with minimal latency. The coordinator emits events, consumers (loggers, tests)
//! subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::HubEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Central event bus for hub activity streaming
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HubEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// This is fire-and-forget: if there are no subscribers, the event is dropped.
    /// If a subscriber lags, it loses the oldest events.
    pub fn emit(&self, event: HubEvent) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeviceId;
    use tokio::sync::broadcast::error::TryRecvError;

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(HubEvent::DeviceLost { device: DeviceId::Wire });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(HubEvent::DeviceRecovered { device: DeviceId::Timer });

        // Both subscribers should receive the event
        assert_eq!(rx1.recv().await.unwrap().device(), Some(DeviceId::Timer));
        assert_eq!(rx2.recv().await.unwrap().device(), Some(DeviceId::Timer));
        assert!(matches!(rx1.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(16);
        let _keepalive = bus.subscribe();
        bus.emit(HubEvent::DeviceLost { device: DeviceId::Maze });

        let mut late = bus.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }
}
