// Timeouts, topics, queue sizing and the robot's pin table
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::motion::ChannelId;

// Action queue: commands waiting behind the one in progress
pub const ACTION_QUEUE_CAPACITY: usize = 10;

// Worker idle poll on the action queue
pub const QUEUE_POLL: Duration = Duration::from_millis(1000);

// Pause after each finished action before taking the next
pub const POST_ACTION_PAUSE: Duration = Duration::from_millis(20);

// How long stop waits for an interrupted action to settle
pub const STOP_WAIT: Duration = Duration::from_millis(2000);

// Status/trim publish rate
pub const STATUS_HZ: u64 = 10;

// Zenoh topics
pub const TOPIC_CMD_ACTION: &str = "otto/cmd/action"; // ActionParams
pub const TOPIC_CMD_TRIM: &str = "otto/cmd/trim"; // TrimRequest
pub const TOPIC_CMD_STOP: &str = "otto/cmd/stop"; // any payload
pub const TOPIC_STATUS: &str = "otto/state/status"; // "moving" | "idle"
pub const TOPIC_TRIMS: &str = "otto/state/trims"; // Trims

// Trim persistence
pub const TRIM_NAMESPACE: &str = "otto_trims";
pub const DEFAULT_TRIM_DIR: &str = "otto_data";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Output pin per channel; `None` means nothing is wired to that slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinTable {
    pub left_leg: Option<u8>,
    pub right_leg: Option<u8>,
    pub left_foot: Option<u8>,
    pub right_foot: Option<u8>,
    pub left_hand: Option<u8>,
    pub right_hand: Option<u8>,
}

impl Default for PinTable {
    fn default() -> Self {
        Self {
            left_leg: Some(17),
            right_leg: Some(39),
            left_foot: Some(18),
            right_foot: Some(38),
            left_hand: Some(8),
            right_hand: Some(12),
        }
    }
}

impl PinTable {
    pub fn pin(&self, id: ChannelId) -> Option<u8> {
        match id {
            ChannelId::LeftLeg => self.left_leg,
            ChannelId::RightLeg => self.right_leg,
            ChannelId::LeftFoot => self.left_foot,
            ChannelId::RightFoot => self.right_foot,
            ChannelId::LeftHand => self.left_hand,
            ChannelId::RightHand => self.right_hand,
        }
    }

    /// Channels with a pin assigned
    pub fn present(&self) -> Vec<ChannelId> {
        ChannelId::ALL
            .into_iter()
            .filter(|&id| self.pin(id).is_some())
            .collect()
    }

    pub fn without_hands(self) -> Self {
        Self {
            left_hand: None,
            right_hand: None,
            ..self
        }
    }
}

/// Runtime configuration, loaded from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub pins: PinTable,
    pub trim_dir: PathBuf,
    /// Servo slew limit in deg/s, unlimited when absent
    pub servo_limit: Option<u32>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            pins: PinTable::default(),
            trim_dir: PathBuf::from(DEFAULT_TRIM_DIR),
            servo_limit: None,
        }
    }
}

impl RobotConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
