//! Upload tuning knobs.
//!
//! Every heuristic constant of the engine and scheduler lives here so it
//! can be loaded from a config file and overridden in tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::UploadError;
use crate::status::StatusPolicy;

/// Engine, executor and scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Initial chunk length in bytes for every new engine.
    #[serde(default = "default_chunk_len")]
    pub chunk_len: u64,

    /// Growth factor applied after each accepted chunk.
    #[serde(default = "default_speed_up_ratio")]
    pub speed_up_ratio: f64,

    /// Shrink factor applied after each ambiguous failure.
    #[serde(default = "default_speed_down_ratio")]
    pub speed_down_ratio: f64,

    /// Smallest chunk length. A failure at this length means the transfer
    /// has stalled.
    #[serde(default = "default_chunk_len_floor")]
    pub chunk_len_floor: u64,

    /// Upper bound of the randomized backoff delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Attempts at `create` before giving up.
    #[serde(default = "default_create_retry_limit")]
    pub create_retry_limit: u32,

    /// Scheduler tick period.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum number of queued entries.
    #[serde(default = "default_max_queued")]
    pub max_queued: usize,

    /// Statuses that abort an upload without retrying.
    #[serde(default = "default_fatal_statuses")]
    pub fatal_statuses: Vec<u16>,
}

fn default_chunk_len() -> u64 {
    1024 * 1024
}

fn default_speed_up_ratio() -> f64 {
    1.05
}

fn default_speed_down_ratio() -> f64 {
    0.5
}

fn default_chunk_len_floor() -> u64 {
    1
}

fn default_backoff_max_ms() -> u64 {
    2000
}

fn default_create_retry_limit() -> u32 {
    2
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_max_queued() -> usize {
    1000
}

fn default_fatal_statuses() -> Vec<u16> {
    vec![400, 401, 403, 404, 409]
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_len: default_chunk_len(),
            speed_up_ratio: default_speed_up_ratio(),
            speed_down_ratio: default_speed_down_ratio(),
            chunk_len_floor: default_chunk_len_floor(),
            backoff_max_ms: default_backoff_max_ms(),
            create_retry_limit: default_create_retry_limit(),
            tick_interval_ms: default_tick_interval_ms(),
            max_queued: default_max_queued(),
            fatal_statuses: default_fatal_statuses(),
        }
    }
}

impl UploaderConfig {
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn status_policy(&self) -> StatusPolicy {
        StatusPolicy::new(self.fatal_statuses.iter().copied())
    }

    /// Rejects combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_len_floor == 0 {
            return Err(UploadError::Validation(
                "chunk_len_floor must be at least 1".into(),
            ));
        }
        if self.chunk_len < self.chunk_len_floor {
            return Err(UploadError::Validation(format!(
                "chunk_len {} is below chunk_len_floor {}",
                self.chunk_len, self.chunk_len_floor
            )));
        }
        if !(self.speed_up_ratio >= 1.0 && self.speed_up_ratio.is_finite()) {
            return Err(UploadError::Validation(format!(
                "speed_up_ratio must be >= 1.0, got {}",
                self.speed_up_ratio
            )));
        }
        if !(self.speed_down_ratio > 0.0 && self.speed_down_ratio < 1.0) {
            return Err(UploadError::Validation(format!(
                "speed_down_ratio must be in (0, 1), got {}",
                self.speed_down_ratio
            )));
        }
        if self.create_retry_limit == 0 {
            return Err(UploadError::Validation(
                "create_retry_limit must be at least 1".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(UploadError::Validation(
                "tick_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = UploaderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_len, 1024 * 1024);
        assert_eq!(config.backoff_max(), Duration::from_secs(2));
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: UploaderConfig =
            serde_json::from_str(r#"{"chunk_len": 4096, "fatal_statuses": [409]}"#).unwrap();
        assert_eq!(config.chunk_len, 4096);
        assert_eq!(config.speed_down_ratio, 0.5);
        assert!(config.status_policy().is_fatal(409));
        assert!(!config.status_policy().is_fatal(404));
    }

    #[test]
    fn rejects_growing_shrink_ratio() {
        let config = UploaderConfig {
            speed_down_ratio: 1.5,
            ..UploaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(UploadError::Validation(_))));
    }

    #[test]
    fn rejects_zero_floor() {
        let config = UploaderConfig {
            chunk_len_floor: 0,
            ..UploaderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_chunk_len_below_floor() {
        let config = UploaderConfig {
            chunk_len: 2,
            chunk_len_floor: 8,
            ..UploaderConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
