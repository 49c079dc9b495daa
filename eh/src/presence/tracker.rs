//! Per-device presence records

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::domain::DeviceId;

/// Presence state of a single module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub connected: bool,
    pub last_seen_at: Option<Instant>,
    pub missed_beats: u32,
}

impl DeviceRecord {
    fn new(id: DeviceId) -> Self {
        Self {
            id,
            connected: false,
            last_seen_at: None,
            missed_beats: 0,
        }
    }

    /// A device that never sent anything has not joined yet
    pub fn has_joined(&self) -> bool {
        self.last_seen_at.is_some()
    }
}

/// Point-in-time view of one device, for status reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub id: DeviceId,
    pub connected: bool,
    pub joined: bool,
    #[serde(rename = "missed-beats")]
    pub missed_beats: u32,
    #[serde(rename = "last-seen-ms-ago", skip_serializing_if = "Option::is_none")]
    pub last_seen_ms_ago: Option<u64>,
}

/// Owns the presence record of every required device
///
/// Only the liveness monitor and first-contact announces flip `connected`;
/// everything else goes through [`PresenceTracker::record_signal`].
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    devices: BTreeMap<DeviceId, DeviceRecord>,
}

impl PresenceTracker {
    pub fn new(required: &[DeviceId]) -> Self {
        debug!(?required, "PresenceTracker::new: called");
        let devices = required.iter().map(|&id| (id, DeviceRecord::new(id))).collect();
        Self { devices }
    }

    /// Record proof of liveness observed at `at`
    ///
    /// Returns false when the device is not part of the required set. A
    /// signal older than the one already recorded leaves the record as is.
    pub fn record_signal(&mut self, id: DeviceId, at: Instant) -> bool {
        let Some(record) = self.devices.get_mut(&id) else {
            debug!(%id, "PresenceTracker::record_signal: device not tracked");
            return false;
        };
        if record.last_seen_at.is_some_and(|seen| at < seen) {
            debug!(%id, "PresenceTracker::record_signal: out-of-order signal, keeping newer");
            return true;
        }
        record.last_seen_at = Some(at);
        record.missed_beats = 0;
        true
    }

    /// Returns true if the flag changed
    pub fn mark_connected(&mut self, id: DeviceId) -> bool {
        match self.devices.get_mut(&id) {
            Some(record) if !record.connected => {
                record.connected = true;
                debug!(%id, "PresenceTracker::mark_connected: connected");
                true
            }
            _ => false,
        }
    }

    /// Returns true if the flag changed
    pub fn mark_disconnected(&mut self, id: DeviceId) -> bool {
        match self.devices.get_mut(&id) {
            Some(record) if record.connected => {
                record.connected = false;
                debug!(%id, "PresenceTracker::mark_disconnected: disconnected");
                true
            }
            _ => false,
        }
    }

    /// Bump the miss counter, saturating at `cap`, and return the new value
    pub(crate) fn note_missed(&mut self, id: DeviceId, cap: u32) -> u32 {
        match self.devices.get_mut(&id) {
            Some(record) => {
                record.missed_beats = (record.missed_beats + 1).min(cap);
                record.missed_beats
            }
            None => 0,
        }
    }

    pub(crate) fn clear_missed(&mut self, id: DeviceId) {
        if let Some(record) = self.devices.get_mut(&id) {
            record.missed_beats = 0;
        }
    }

    pub fn get(&self, id: DeviceId) -> Option<&DeviceRecord> {
        self.devices.get(&id)
    }

    pub fn is_tracked(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn is_connected(&self, id: DeviceId) -> bool {
        self.devices.get(&id).is_some_and(|r| r.connected)
    }

    pub fn all_connected(&self) -> bool {
        self.devices.values().all(|r| r.connected)
    }

    pub fn connected_count(&self) -> usize {
        self.devices.values().filter(|r| r.connected).count()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Required devices, in a stable order
    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.keys().copied().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    /// Zero every miss counter; `connected` is left as last observed
    pub fn reset_counters(&mut self) {
        debug!("PresenceTracker::reset_counters: called");
        for record in self.devices.values_mut() {
            record.missed_beats = 0;
        }
    }

    pub fn snapshot(&self, now: Instant) -> Vec<DeviceStatus> {
        self.devices
            .values()
            .map(|r| DeviceStatus {
                id: r.id,
                connected: r.connected,
                joined: r.has_joined(),
                missed_beats: r.missed_beats,
                last_seen_ms_ago: r
                    .last_seen_at
                    .map(|t| now.saturating_duration_since(t).as_millis() as u64),
            })
            .collect()
    }

    /// How long since the device was last heard from
    pub fn elapsed_since_seen(&self, id: DeviceId, now: Instant) -> Option<Duration> {
        self.devices
            .get(&id)
            .and_then(|r| r.last_seen_at)
            .map(|t| now.saturating_duration_since(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(&DeviceId::ALL)
    }

    #[test]
    fn test_new_devices_have_not_joined() {
        let tracker = tracker();
        assert_eq!(tracker.len(), 4);
        assert!(tracker.records().all(|r| !r.connected && !r.has_joined()));
        assert!(!tracker.all_connected());
    }

    #[test]
    fn test_record_signal_does_not_connect() {
        let mut tracker = tracker();
        let now = Instant::now();

        assert!(tracker.record_signal(DeviceId::Wire, now));

        let record = tracker.get(DeviceId::Wire).unwrap();
        assert_eq!(record.last_seen_at, Some(now));
        assert!(!record.connected);
    }

    #[test]
    fn test_record_signal_resets_missed_beats() {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.record_signal(DeviceId::Maze, now);
        tracker.note_missed(DeviceId::Maze, 5);
        tracker.note_missed(DeviceId::Maze, 5);
        assert_eq!(tracker.get(DeviceId::Maze).unwrap().missed_beats, 2);

        tracker.record_signal(DeviceId::Maze, now + Duration::from_secs(1));
        assert_eq!(tracker.get(DeviceId::Maze).unwrap().missed_beats, 0);
    }

    #[test]
    fn test_older_signal_does_not_rewind() {
        let mut tracker = tracker();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(20);
        tracker.record_signal(DeviceId::Wire, t1);
        tracker.note_missed(DeviceId::Wire, 5);

        assert!(tracker.record_signal(DeviceId::Wire, t0));

        let record = tracker.get(DeviceId::Wire).unwrap();
        assert_eq!(record.last_seen_at, Some(t1));
        assert_eq!(record.missed_beats, 1);
    }

    #[test]
    fn test_untracked_device_is_ignored() {
        let mut tracker = PresenceTracker::new(&[DeviceId::Wire]);
        assert!(!tracker.record_signal(DeviceId::Timer, Instant::now()));
        assert!(!tracker.mark_connected(DeviceId::Timer));
        assert!(!tracker.is_tracked(DeviceId::Timer));
    }

    #[test]
    fn test_mark_connected_reports_change_once() {
        let mut tracker = tracker();
        assert!(tracker.mark_connected(DeviceId::Button));
        assert!(!tracker.mark_connected(DeviceId::Button));
        assert!(tracker.mark_disconnected(DeviceId::Button));
        assert!(!tracker.mark_disconnected(DeviceId::Button));
    }

    #[test]
    fn test_note_missed_saturates() {
        let mut tracker = tracker();
        for _ in 0..10 {
            tracker.note_missed(DeviceId::Timer, 2);
        }
        assert_eq!(tracker.get(DeviceId::Timer).unwrap().missed_beats, 2);
    }

    #[test]
    fn test_reset_counters_keeps_connected() {
        let mut tracker = tracker();
        tracker.mark_connected(DeviceId::Wire);
        tracker.note_missed(DeviceId::Wire, 3);

        tracker.reset_counters();

        let record = tracker.get(DeviceId::Wire).unwrap();
        assert_eq!(record.missed_beats, 0);
        assert!(record.connected);
    }

    #[test]
    fn test_all_connected_requires_every_device() {
        let mut tracker = tracker();
        for id in &DeviceId::ALL[..3] {
            tracker.mark_connected(*id);
        }
        assert!(!tracker.all_connected());
        assert_eq!(tracker.connected_count(), 3);

        tracker.mark_connected(DeviceId::Button);
        assert!(tracker.all_connected());
    }

    #[test]
    fn test_snapshot_reports_age() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.record_signal(DeviceId::Wire, start);

        let snapshot = tracker.snapshot(start + Duration::from_millis(1500));
        let wire = snapshot.iter().find(|s| s.id == DeviceId::Wire).unwrap();
        assert_eq!(wire.last_seen_ms_ago, Some(1500));
        assert!(wire.joined);

        let timer = snapshot.iter().find(|s| s.id == DeviceId::Timer).unwrap();
        assert_eq!(timer.last_seen_ms_ago, None);
    }

    proptest! {
        #[test]
        fn prop_record_signal_is_idempotent(misses in 0u32..10, repeats in 1usize..5) {
            let mut tracker = tracker();
            let now = Instant::now();
            for _ in 0..misses {
                tracker.note_missed(DeviceId::Wire, 10);
            }
            for _ in 0..repeats {
                tracker.record_signal(DeviceId::Wire, now);
            }
            let record = tracker.get(DeviceId::Wire).unwrap();
            prop_assert_eq!(record.missed_beats, 0);
            prop_assert_eq!(record.last_seen_at, Some(now));
        }
    }
}
