//! Coordinator configuration

use tracing::debug;

use crate::config::{Config, LivenessConfig};
use crate::domain::{DeviceId, TaskId};

/// Everything the coordinator actor needs from the application config
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Required modules; broadcasts always go to all of them
    pub devices: Vec<DeviceId>,

    /// Tasks that make up one round
    pub tasks: Vec<TaskId>,

    /// Heartbeat timeout policy
    pub liveness: LivenessConfig,

    /// Countdown length sent with activation
    pub session_duration_secs: u64,

    /// Channel buffer size for coordinator requests
    pub channel_buffer: usize,

    /// Queue depth towards the outbox task
    pub outbox_buffer: usize,
}

impl From<&Config> for CoordinatorConfig {
    fn from(config: &Config) -> Self {
        debug!("CoordinatorConfig::from: called");
        Self {
            devices: config.devices.clone(),
            tasks: config.tasks.clone(),
            liveness: config.liveness.clone(),
            session_duration_secs: config.session.duration_secs,
            channel_buffer: config.session.channel_buffer.max(1),
            outbox_buffer: config.dispatch.outbox_buffer.max(1),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}
