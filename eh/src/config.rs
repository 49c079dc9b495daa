//! escapehub configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{DeviceId, TaskId};

/// Main escapehub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Modules that must all be present before a session activates
    pub devices: Vec<DeviceId>,

    /// Tasks that must all complete for a victory
    pub tasks: Vec<TaskId>,

    /// Heartbeat timeout policy
    pub liveness: LivenessConfig,

    /// Outbound command pacing
    pub dispatch: DispatchConfig,

    /// Game session settings
    pub session: SessionConfig,

    /// Transport listener
    pub transport: TransportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            devices: DeviceId::ALL.to_vec(),
            tasks: TaskId::ALL.to_vec(),
            liveness: LivenessConfig::default(),
            dispatch: DispatchConfig::default(),
            session: SessionConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    ///
    /// Any error here is fatal at startup; nothing is re-validated at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(eyre!("At least one device must be configured"));
        }
        let unique: HashSet<_> = self.devices.iter().collect();
        if unique.len() != self.devices.len() {
            return Err(eyre!("Duplicate entries in devices: {:?}", self.devices));
        }

        if self.tasks.is_empty() {
            return Err(eyre!("At least one task must be configured"));
        }
        let unique: HashSet<_> = self.tasks.iter().collect();
        if unique.len() != self.tasks.len() {
            return Err(eyre!("Duplicate entries in tasks: {:?}", self.tasks));
        }

        if self.liveness.timeout_ms == 0 {
            return Err(eyre!("liveness.timeout-ms must be greater than zero"));
        }
        if self.liveness.period_ms == 0 {
            return Err(eyre!("liveness.period-ms must be greater than zero"));
        }
        if self.liveness.max_missed == 0 {
            return Err(eyre!("liveness.max-missed must be at least 1"));
        }
        if self.liveness.period_ms > self.liveness.timeout_ms {
            tracing::warn!(
                period_ms = self.liveness.period_ms,
                timeout_ms = self.liveness.timeout_ms,
                "Evaluation period is longer than the timeout; loss detection will lag"
            );
        }

        if self.session.duration_secs == 0 {
            return Err(eyre!("session.duration-secs must be greater than zero"));
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .escapehub.yml
        let local_config = PathBuf::from(".escapehub.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/escapehub/escapehub.yml
        if let Some(user_config) = user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed; the full load reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => std::iter::once(PathBuf::from(".escapehub.yml"))
                .chain(user_config_path())
                .collect(),
        };

        candidates
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("escapehub").join("escapehub.yml"))
}

/// Heartbeat timeout policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// A signal older than this counts as a missed beat
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Consecutive missed beats before a device is declared lost
    #[serde(rename = "max-missed")]
    pub max_missed: u32,

    /// How often the liveness monitor evaluates all devices
    #[serde(rename = "period-ms")]
    pub period_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_missed: 2,
            period_ms: 2_000,
        }
    }
}

impl LivenessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Outbound command pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delay between consecutive sends of one broadcast (0 disables pacing)
    #[serde(rename = "pacing-ms")]
    pub pacing_ms: u64,

    /// Queue depth between the coordinator and the outbox task
    #[serde(rename = "outbox-buffer")]
    pub outbox_buffer: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 100,
            outbox_buffer: 64,
        }
    }
}

impl DispatchConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Game session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Countdown length sent with the activation command
    #[serde(rename = "duration-secs")]
    pub duration_secs: u64,

    /// Channel buffer size for coordinator requests
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: 300,
            channel_buffer: 256,
        }
    }
}

/// Transport listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Address the line-delimited JSON listener binds to
    pub listen: String,

    /// Outbound queue depth per connected module
    #[serde(rename = "peer-buffer")]
    pub peer_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:7878".to_string(),
            peer_buffer: 32,
        }
    }
}
