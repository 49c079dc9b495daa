//! Session state machine

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatch::{Command, CommandKind};
use crate::domain::{DeviceId, TaskId};

/// Why the session is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PauseReason {
    #[default]
    None,
    DeviceLost,
    Manual,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::DeviceLost => write!(f, "device-lost"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Coarse lifecycle position, derived from the session flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    /// Waiting for every device to be present
    Idle,
    /// Activation sent, round in progress
    Active,
    /// Activated but halted
    Paused,
    /// Last round ended in victory or game over, no progress since
    Completed,
}

/// Serializable view of the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub id: String,
    pub phase: SessionPhase,
    pub activated: bool,
    pub paused: bool,
    #[serde(rename = "pause-reason")]
    pub pause_reason: PauseReason,
    pub round: u32,
    pub completion: BTreeMap<TaskId, bool>,
}

/// Presence summary the session reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub connected: usize,
    pub total: usize,
}

impl Presence {
    pub fn all_connected(&self) -> bool {
        self.connected == self.total
    }
}

/// Session-level state: activation gate, pause bookkeeping, task completion
///
/// Every method returns the command to broadcast, if any. Transitions that do
/// not apply in the current state are silent no-ops.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    activated: bool,
    paused: bool,
    pause_reason: PauseReason,
    completed: bool,
    round: u32,
    completion: BTreeMap<TaskId, bool>,
    duration_secs: u64,
}

impl Session {
    pub fn new(tasks: &[TaskId], duration_secs: u64) -> Self {
        debug!(?tasks, duration_secs, "Session::new: called");
        Self {
            id: Uuid::now_v7(),
            activated: false,
            paused: false,
            pause_reason: PauseReason::None,
            completed: false,
            round: 1,
            completion: tasks.iter().map(|&t| (t, false)).collect(),
            duration_secs,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause_reason(&self) -> PauseReason {
        self.pause_reason
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    #[cfg(test)]
    pub(crate) fn is_task_complete(&self, task: TaskId) -> bool {
        self.completion.get(&task).copied().unwrap_or(false)
    }

    pub fn phase(&self) -> SessionPhase {
        if !self.activated {
            SessionPhase::Idle
        } else if self.paused {
            SessionPhase::Paused
        } else if self.completed {
            SessionPhase::Completed
        } else {
            SessionPhase::Active
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id.to_string(),
            phase: self.phase(),
            activated: self.activated,
            paused: self.paused,
            pause_reason: self.pause_reason,
            round: self.round,
            completion: self.completion.clone(),
        }
    }

    fn command(&self, kind: CommandKind) -> Command {
        Command::new(kind)
            .with("session", self.id.to_string())
            .with("round", self.round)
    }

    /// Re-check the activation gate and automatic resume
    ///
    /// Called after any device connects or recovers and after every liveness
    /// tick. Activation is sticky until [`Session::reset`].
    pub fn on_presence(&mut self, presence: Presence) -> Option<Command> {
        if !self.activated {
            if presence.all_connected() {
                self.activated = true;
                self.completed = false;
                info!(session = %self.id, devices = presence.total, "All devices present, activating session");
                return Some(self.command(CommandKind::Activate).with("duration", self.duration_secs));
            }
            debug!(
                connected = presence.connected,
                total = presence.total,
                "Session::on_presence: waiting for devices"
            );
            return None;
        }

        if self.paused && self.pause_reason == PauseReason::DeviceLost {
            if presence.all_connected() {
                self.paused = false;
                self.pause_reason = PauseReason::None;
                info!(session = %self.id, "All devices back, resuming session");
                return Some(self.command(CommandKind::Resume).with("reason", "devices-recovered"));
            }
            info!(
                connected = presence.connected,
                total = presence.total,
                "Partial recovery, session stays paused"
            );
        }

        None
    }

    /// A device crossed the missed-beat threshold
    pub fn on_device_lost(&mut self, device: DeviceId) -> Option<Command> {
        if !self.activated || self.paused {
            debug!(%device, activated = self.activated, paused = self.paused, "Session::on_device_lost: no-op");
            return None;
        }

        self.paused = true;
        self.pause_reason = PauseReason::DeviceLost;
        info!(session = %self.id, %device, "Device lost, pausing session");
        Some(
            self.command(CommandKind::Pause)
                .with("reason", PauseReason::DeviceLost.to_string())
                .with("device", device.as_str()),
        )
    }

    /// A module reported its puzzle solved
    pub fn on_task_completed(&mut self, task: TaskId) -> Option<Command> {
        if !self.activated {
            debug!(%task, "Session::on_task_completed: session not active, ignoring");
            return None;
        }
        let Some(flag) = self.completion.get_mut(&task) else {
            debug!(%task, "Session::on_task_completed: task not required, ignoring");
            return None;
        };

        *flag = true;
        self.completed = false;
        let done = self.completion.values().filter(|f| **f).count();
        info!(%task, done, total = self.completion.len(), "Task completed");

        if done < self.completion.len() {
            return None;
        }

        info!(session = %self.id, round = self.round, "All tasks completed, victory");
        let cmd = self
            .command(CommandKind::Victory)
            .with("message", "All puzzles completed!")
            .with("timestamp", Utc::now().timestamp().to_string());
        self.finish_round();
        Some(cmd)
    }

    /// The countdown ran out
    pub fn on_timer_expired(&mut self) -> Command {
        info!(session = %self.id, round = self.round, "Timer expired, game over");
        let cmd = self
            .command(CommandKind::GameOver)
            .with("reason", "timer_finished")
            .with("message", "Time's up! Game over!")
            .with("timestamp", Utc::now().timestamp().to_string());
        self.finish_round();
        cmd
    }

    /// Operator pause
    ///
    /// An automatic pause already in effect is taken over by the operator, so
    /// it will no longer lift on its own when devices return.
    pub fn manual_pause(&mut self) -> Option<Command> {
        if !self.activated {
            debug!("Session::manual_pause: session not active, ignoring");
            return None;
        }
        if self.paused {
            if self.pause_reason == PauseReason::DeviceLost {
                info!("Operator took over automatic pause");
                self.pause_reason = PauseReason::Manual;
            }
            return None;
        }

        self.paused = true;
        self.pause_reason = PauseReason::Manual;
        info!(session = %self.id, "Manual pause");
        Some(self.command(CommandKind::Pause).with("reason", PauseReason::Manual.to_string()))
    }

    /// Operator resume; does not require every device to be present
    pub fn manual_resume(&mut self) -> Option<Command> {
        if !self.paused {
            debug!("Session::manual_resume: not paused, ignoring");
            return None;
        }

        self.paused = false;
        self.pause_reason = PauseReason::None;
        info!(session = %self.id, "Manual resume");
        Some(self.command(CommandKind::Resume).with("reason", PauseReason::Manual.to_string()))
    }

    /// Back to idle with a fresh session id
    pub fn reset(&mut self) {
        self.id = Uuid::now_v7();
        self.activated = false;
        self.paused = false;
        self.pause_reason = PauseReason::None;
        self.completed = false;
        self.round = 1;
        self.clear_completion();
        info!(session = %self.id, "Session reset");
    }

    fn finish_round(&mut self) {
        self.clear_completion();
        self.paused = false;
        self.pause_reason = PauseReason::None;
        self.completed = true;
        self.round += 1;
    }

    fn clear_completion(&mut self) {
        for flag in self.completion.values_mut() {
            *flag = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PRESENT: Presence = Presence { connected: 4, total: 4 };

    fn session() -> Session {
        Session::new(&TaskId::ALL, 300)
    }

    fn active_session() -> Session {
        let mut s = session();
        s.on_presence(ALL_PRESENT).unwrap();
        s
    }

    #[test]
    fn test_new_session_is_idle() {
        let s = session();
        assert_eq!(s.phase(), SessionPhase::Idle);
        assert!(!s.is_activated());
        assert!(!s.is_paused());
        assert_eq!(s.round(), 1);
    }

    #[test]
    fn test_activation_waits_for_every_device() {
        let mut s = session();
        for connected in 1..4 {
            assert!(s.on_presence(Presence { connected, total: 4 }).is_none());
        }

        let cmd = s.on_presence(ALL_PRESENT).unwrap();
        assert_eq!(cmd.kind(), CommandKind::Activate);
        assert_eq!(cmd.field("duration"), Some(&serde_json::Value::from(300)));
        assert_eq!(s.phase(), SessionPhase::Active);
    }

    #[test]
    fn test_activation_fires_once() {
        let mut s = active_session();
        assert!(s.on_presence(ALL_PRESENT).is_none());
        assert!(s.on_presence(Presence { connected: 3, total: 4 }).is_none());
        assert!(s.on_presence(ALL_PRESENT).is_none());
    }

    #[test]
    fn test_device_lost_pauses_active_session() {
        let mut s = active_session();
        let cmd = s.on_device_lost(DeviceId::Maze).unwrap();

        assert_eq!(cmd.kind(), CommandKind::Pause);
        assert_eq!(cmd.field("reason"), Some(&serde_json::Value::from("device-lost")));
        assert_eq!(cmd.field("device"), Some(&serde_json::Value::from("maze")));
        assert!(s.is_paused());
        assert_eq!(s.pause_reason(), PauseReason::DeviceLost);

        // Second loss while paused does not re-broadcast
        assert!(s.on_device_lost(DeviceId::Wire).is_none());
    }

    #[test]
    fn test_device_lost_before_activation_is_noop() {
        let mut s = session();
        assert!(s.on_device_lost(DeviceId::Wire).is_none());
        assert!(!s.is_paused());
    }

    #[test]
    fn test_partial_recovery_stays_paused() {
        let mut s = active_session();
        s.on_device_lost(DeviceId::Wire);

        assert!(s.on_presence(Presence { connected: 2, total: 4 }).is_none());
        assert!(s.on_presence(Presence { connected: 3, total: 4 }).is_none());
        assert!(s.is_paused());

        let cmd = s.on_presence(ALL_PRESENT).unwrap();
        assert_eq!(cmd.kind(), CommandKind::Resume);
        assert!(!s.is_paused());
        assert_eq!(s.pause_reason(), PauseReason::None);
    }

    #[test]
    fn test_victory_requires_all_tasks() {
        let mut s = active_session();
        assert!(s.on_task_completed(TaskId::Wire).is_none());
        assert!(s.on_task_completed(TaskId::Maze).is_none());
        // Repeat of an already-complete task changes nothing
        assert!(s.on_task_completed(TaskId::Maze).is_none());

        let cmd = s.on_task_completed(TaskId::Button).unwrap();
        assert_eq!(cmd.kind(), CommandKind::Victory);
        assert_eq!(cmd.field("round"), Some(&serde_json::Value::from(1)));
        assert!(TaskId::ALL.iter().all(|t| !s.is_task_complete(*t)));
        assert_eq!(s.phase(), SessionPhase::Completed);
        assert_eq!(s.round(), 2);
    }

    #[test]
    fn test_victory_does_not_repeat_without_new_round() {
        let mut s = active_session();
        for task in TaskId::ALL {
            s.on_task_completed(task);
        }
        assert!(s.on_task_completed(TaskId::Button).is_none());
        assert_eq!(s.phase(), SessionPhase::Active);
    }

    #[test]
    fn test_task_completion_before_activation_ignored() {
        let mut s = session();
        assert!(s.on_task_completed(TaskId::Wire).is_none());
        assert!(!s.is_task_complete(TaskId::Wire));
    }

    #[test]
    fn test_unrequired_task_ignored() {
        let mut s = Session::new(&[TaskId::Wire], 300);
        s.on_presence(ALL_PRESENT);
        assert!(s.on_task_completed(TaskId::Maze).is_none());
        assert!(s.on_task_completed(TaskId::Wire).is_some());
    }

    #[test]
    fn test_timer_expiry_game_over_clears_flags() {
        let mut s = active_session();
        s.on_task_completed(TaskId::Wire);

        let cmd = s.on_timer_expired();

        assert_eq!(cmd.kind(), CommandKind::GameOver);
        assert_eq!(cmd.field("reason"), Some(&serde_json::Value::from("timer_finished")));
        assert!(!s.is_task_complete(TaskId::Wire));
        assert_eq!(s.phase(), SessionPhase::Completed);
    }

    #[test]
    fn test_game_over_while_paused_ends_pause() {
        let mut s = active_session();
        s.on_device_lost(DeviceId::Maze).unwrap();
        assert_eq!(s.phase(), SessionPhase::Paused);

        assert_eq!(s.on_timer_expired().kind(), CommandKind::GameOver);
        assert!(!s.is_paused());
        assert_eq!(s.pause_reason(), PauseReason::None);
        assert_eq!(s.phase(), SessionPhase::Completed);

        // The maze coming back must not resume a finished round
        assert!(s.on_presence(ALL_PRESENT).is_none());
    }

    #[test]
    fn test_manual_pause_and_resume() {
        let mut s = active_session();

        let pause = s.manual_pause().unwrap();
        assert_eq!(pause.field("reason"), Some(&serde_json::Value::from("manual")));
        assert_eq!(s.pause_reason(), PauseReason::Manual);
        assert!(s.manual_pause().is_none());

        // Presence changes never lift a manual pause
        assert!(s.on_presence(ALL_PRESENT).is_none());
        assert!(s.is_paused());

        let resume = s.manual_resume().unwrap();
        assert_eq!(resume.kind(), CommandKind::Resume);
        assert!(!s.is_paused());
        assert!(s.manual_resume().is_none());
    }

    #[test]
    fn test_manual_resume_overrides_missing_devices() {
        let mut s = active_session();
        s.on_device_lost(DeviceId::Timer);

        let cmd = s.manual_resume().unwrap();
        assert_eq!(cmd.kind(), CommandKind::Resume);
        assert!(!s.is_paused());
    }

    #[test]
    fn test_manual_pause_takes_over_automatic_pause() {
        let mut s = active_session();
        s.on_device_lost(DeviceId::Timer);

        assert!(s.manual_pause().is_none());
        assert_eq!(s.pause_reason(), PauseReason::Manual);
        assert!(s.on_presence(ALL_PRESENT).is_none());
        assert!(s.is_paused());
    }

    #[test]
    fn test_manual_pause_before_activation_ignored() {
        let mut s = session();
        assert!(s.manual_pause().is_none());
        assert!(!s.is_paused());
    }

    #[test]
    fn test_reset_returns_to_idle_and_allows_reactivation() {
        let mut s = active_session();
        let first_id = s.id();
        s.on_task_completed(TaskId::Wire);
        s.on_device_lost(DeviceId::Wire);

        s.reset();

        assert_eq!(s.phase(), SessionPhase::Idle);
        assert!(!s.is_paused());
        assert!(!s.is_task_complete(TaskId::Wire));
        assert_ne!(s.id(), first_id);

        let cmd = s.on_presence(ALL_PRESENT).unwrap();
        assert_eq!(cmd.kind(), CommandKind::Activate);
    }

    #[test]
    fn test_commands_carry_session_id() {
        let mut s = session();
        let cmd = s.on_presence(ALL_PRESENT).unwrap();
        assert_eq!(cmd.field("session"), Some(&serde_json::Value::from(s.id().to_string())));
    }
}
