//! Liveness evaluation
//!
//! Loss needs `max_missed` consecutive stale evaluations, so the effective
//! disconnect latency is roughly `timeout + (max_missed - 1) * period`.
//! Recovery needs a single fresh signal.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::tracker::PresenceTracker;
use crate::config::LivenessConfig;
use crate::domain::DeviceId;

/// A connectivity change decided by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    Lost(DeviceId),
    Recovered(DeviceId),
}

impl PresenceTransition {
    pub fn device(&self) -> DeviceId {
        match self {
            Self::Lost(id) | Self::Recovered(id) => *id,
        }
    }
}

/// Applies the timeout policy to a [`PresenceTracker`]
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    timeout: Duration,
    max_missed: u32,
}

impl LivenessMonitor {
    pub fn new(config: &LivenessConfig) -> Self {
        debug!(
            timeout_ms = config.timeout_ms,
            max_missed = config.max_missed,
            "LivenessMonitor::new: called"
        );
        Self {
            timeout: config.timeout(),
            max_missed: config.max_missed.max(1),
        }
    }

    /// Evaluate every tracked device
    pub fn evaluate(&self, tracker: &mut PresenceTracker, now: Instant) -> Vec<PresenceTransition> {
        tracker
            .ids()
            .into_iter()
            .filter_map(|id| self.evaluate_device(tracker, id, now))
            .collect()
    }

    /// Evaluate a single device
    ///
    /// Devices that have never been heard from are skipped entirely.
    pub fn evaluate_device(
        &self,
        tracker: &mut PresenceTracker,
        id: DeviceId,
        now: Instant,
    ) -> Option<PresenceTransition> {
        let elapsed = tracker.elapsed_since_seen(id, now)?;

        if elapsed > self.timeout {
            let missed = tracker.note_missed(id, self.max_missed);
            debug!(%id, missed, elapsed_ms = elapsed.as_millis() as u64, "LivenessMonitor: stale device");

            if missed >= self.max_missed && tracker.mark_disconnected(id) {
                info!(%id, missed, "Device lost");
                return Some(PresenceTransition::Lost(id));
            }
            return None;
        }

        tracker.clear_missed(id);
        if tracker.mark_connected(id) {
            info!(%id, "Device recovered");
            return Some(PresenceTransition::Recovered(id));
        }
        None
    }
}
