//! Demuxer configuration.

use serde::{Deserialize, Serialize};

use crate::structs::time::Time;
use crate::utils::errors::ConfigError;

pub const MIN_MEASUREMENT_WINDOW: usize = 16;
pub const MAX_MEASUREMENT_WINDOW: usize = 256;

/// How an estimated frame rate is snapped to a well-known value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapPolicy {
    /// Standard rates within 0.2 Hz, then 1/1..1/4 of the declared rate
    /// within 0.8 Hz.
    #[default]
    Standard,
    /// Only 1/1..1/4 of the declared rate, within 1.0 Hz.
    DeclaredOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemuxConfig {
    /// Number of video timestamps collected for frame-rate estimation.
    pub measurement_window: usize,
    /// Largest timestamp step accepted as continuous.
    pub jump_threshold_ms: i64,
    /// Largest gap difference for which a stream is timed against video.
    pub video_sync_threshold_ms: i64,
    pub snap_policy: SnapPolicy,
    /// Look for DTS frames hidden in 16-bit PCM streams.
    pub dts_detection: bool,
    /// Bound on buffers queued between the demuxer and its consumer.
    pub max_in_flight: usize,
    /// Skip deep probing of the container at start-up.
    pub fast_probe: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            measurement_window: 96,
            jump_threshold_ms: 10_000,
            video_sync_threshold_ms: 15_000,
            snap_policy: SnapPolicy::Standard,
            dts_detection: true,
            max_in_flight: 32,
            fast_probe: false,
        }
    }
}

impl DemuxConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_MEASUREMENT_WINDOW..=MAX_MEASUREMENT_WINDOW).contains(&self.measurement_window) {
            return Err(ConfigError::MeasurementWindow {
                min: MIN_MEASUREMENT_WINDOW,
                max: MAX_MEASUREMENT_WINDOW,
                actual: self.measurement_window,
            });
        }

        if self.jump_threshold_ms <= 0 {
            return Err(ConfigError::JumpThreshold(self.jump_threshold_ms));
        }

        if self.video_sync_threshold_ms <= 0 {
            return Err(ConfigError::VideoSyncThreshold(
                self.video_sync_threshold_ms,
            ));
        }

        if self.max_in_flight == 0 {
            return Err(ConfigError::MaxInFlight);
        }

        Ok(())
    }

    /// Packets read ahead at start-up at most.
    pub fn max_buffer_count(&self) -> usize {
        self.measurement_window * 8
    }

    pub fn jump_threshold(&self) -> Time {
        Time::from_millis(self.jump_threshold_ms)
    }

    pub fn video_sync_threshold(&self) -> Time {
        Time::from_millis(self.video_sync_threshold_ms)
    }
}

#[test]
fn default_config_is_valid() {
    let config = DemuxConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.max_buffer_count(), 768);
    assert_eq!(config.jump_threshold(), Time::from_secs(10));
}

#[test]
fn reject_tiny_window() {
    let config = DemuxConfig {
        measurement_window: 4,
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MeasurementWindow { actual: 4, .. })
    ));
}
