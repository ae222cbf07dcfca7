//! Appliance configuration.
//!
//! Settings come from an optional TOML file and are then overridden by the
//! environment variables the appliance has always been deployed with
//! (`VIDEO_RESOLUTION`, `LEFT_BUTTON_PIN`, ...).

use crate::capture::naming::{check_datetime_format, DEFAULT_DATETIME_FORMAT, DEFAULT_IMAGES_DIR};
use crate::capture::{encode::DEFAULT_JPEG_QUALITY, CaptureConfig};
use crate::input::DEFAULT_DEBOUNCE_WINDOW;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("invalid manual focus value: {0}")]
    InvalidFocus(f32),
    #[error("debounce window must be greater than zero")]
    InvalidDebounce,
    #[error("left and right buttons share pin {0}")]
    DuplicatePin(u8),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Which camera implementation to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// Synthetic frames, no hardware needed.
    #[default]
    Mock,
    /// The physical camera (requires the `camera` feature).
    Native,
}

/// Camera section: device settings plus backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraSection {
    #[serde(default)]
    pub backend: CameraBackend,
    #[serde(flatten)]
    pub capture: CaptureConfig,
}

/// Button wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonsConfig {
    /// BCM pin of the snapshot button.
    pub left_pin: u8,
    /// BCM pin of the stream toggle button.
    pub right_pin: u8,
    /// Suppression window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for ButtonsConfig {
    fn default() -> Self {
        Self {
            left_pin: 18,
            right_pin: 23,
            debounce_ms: DEFAULT_DEBOUNCE_WINDOW.as_millis() as u64,
        }
    }
}

impl ButtonsConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Where and how snapshots are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub directory: PathBuf,
    /// chrono format string for the timestamp in file names.
    pub datetime_format: String,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_IMAGES_DIR),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub buttons: ButtonsConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, then re-validates.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VIDEO_RESOLUTION") {
            let (width, height) = CaptureConfig::parse_resolution(&value)?;
            self.camera.capture.width = width;
            self.camera.capture.height = height;
        }
        if let Some(value) = lookup("VIDEO_FRAMERATE") {
            self.camera.capture.fps = parse("VIDEO_FRAMERATE", &value)?;
        }
        if let Some(value) = lookup("VIDEO_DEVICE") {
            self.camera.capture.device = value.parse().unwrap_or_default();
        }
        if let Some(value) = lookup("LEFT_BUTTON_PIN") {
            self.buttons.left_pin = parse("LEFT_BUTTON_PIN", &value)?;
        }
        if let Some(value) = lookup("RIGHT_BUTTON_PIN") {
            self.buttons.right_pin = parse("RIGHT_BUTTON_PIN", &value)?;
        }
        if let Some(value) = lookup("DEBOUNCE_TIME") {
            // Seconds, fractional allowed ("0.2").
            let seconds: f64 = parse("DEBOUNCE_TIME", &value)?;
            let window = Duration::try_from_secs_f64(seconds).map_err(|_| {
                ConfigError::InvalidValue {
                    key: "DEBOUNCE_TIME",
                    value: value.clone(),
                }
            })?;
            self.buttons.debounce_ms =
                u64::try_from(window.as_millis()).map_err(|_| ConfigError::InvalidValue {
                    key: "DEBOUNCE_TIME",
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup("IMAGES_SAVE_DIRECTORY") {
            self.snapshot.directory = PathBuf::from(value);
        }
        if let Some(value) = lookup("DATETIME_FORMAT") {
            self.snapshot.datetime_format = value;
        }
        if let Some(value) = lookup("METRICS_PORT") {
            self.metrics.port = parse("METRICS_PORT", &value)?;
        }
        self.validate()
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera.capture.validate()?;
        if self.buttons.debounce_ms == 0 {
            return Err(ConfigError::InvalidDebounce);
        }
        if self.buttons.left_pin == self.buttons.right_pin {
            return Err(ConfigError::DuplicatePin(self.buttons.left_pin));
        }
        if !(1..=100).contains(&self.snapshot.jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                key: "jpeg_quality",
                value: self.snapshot.jpeg_quality.to_string(),
            });
        }
        check_datetime_format(&self.snapshot.datetime_format)?;
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DeviceId;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.backend, CameraBackend::Mock);
        assert_eq!(config.buttons.left_pin, 18);
        assert_eq!(config.buttons.right_pin, 23);
        assert_eq!(config.buttons.debounce_window(), Duration::from_millis(200));
        assert_eq!(config.snapshot.directory, PathBuf::from("./captured_images"));
    }

    #[test]
    fn test_parse_full_file() {
        let config = AppConfig::from_toml(
            r#"
            [camera]
            backend = "native"
            device = "/dev/video1"
            width = 1280
            height = 720
            fps = 15
            manual_focus = 3.5

            [buttons]
            left_pin = 5
            right_pin = 6
            debounce_ms = 150

            [snapshot]
            directory = "/var/lib/doorbell"
            jpeg_quality = 70

            [metrics]
            port = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.camera.backend, CameraBackend::Native);
        assert_eq!(config.camera.capture.device, DeviceId::Path("/dev/video1".into()));
        assert_eq!((config.camera.capture.width, config.camera.capture.height), (1280, 720));
        assert_eq!(config.camera.capture.manual_focus, Some(3.5));
        assert_eq!(config.buttons.debounce_ms, 150);
        assert_eq!(config.snapshot.datetime_format, DEFAULT_DATETIME_FORMAT);
        assert_eq!(config.metrics.port, 0);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = AppConfig::from_toml("[buttons]\nleft_pin = 4\n").unwrap();
        assert_eq!(config.buttons.left_pin, 4);
        assert_eq!(config.buttons.right_pin, 23);
        assert_eq!(config.camera.capture.fps, 30);
    }

    #[test]
    fn test_invalid_file_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[camera]\nwidth = 0\n"),
            Err(ConfigError::InvalidDimensions)
        ));
        assert!(matches!(
            AppConfig::from_toml("[camera\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("VIDEO_RESOLUTION", "1920x1080"),
                ("VIDEO_FRAMERATE", "25"),
                ("VIDEO_DEVICE", "2"),
                ("LEFT_BUTTON_PIN", "17"),
                ("DEBOUNCE_TIME", "0.35"),
                ("IMAGES_SAVE_DIRECTORY", "/tmp/shots"),
                ("DATETIME_FORMAT", "%s"),
            ]))
            .unwrap();

        assert_eq!(config.camera.capture.width, 1920);
        assert_eq!(config.camera.capture.height, 1080);
        assert_eq!(config.camera.capture.fps, 25);
        assert_eq!(config.camera.capture.device, DeviceId::Index(2));
        assert_eq!(config.buttons.left_pin, 17);
        assert_eq!(config.buttons.debounce_ms, 350);
        assert_eq!(config.snapshot.directory, PathBuf::from("/tmp/shots"));
        assert_eq!(config.snapshot.datetime_format, "%s");
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_overrides(env(&[("VIDEO_FRAMERATE", "fast")])),
            Err(ConfigError::InvalidValue { key: "VIDEO_FRAMERATE", .. })
        ));

        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_overrides(env(&[("DEBOUNCE_TIME", "-1")])),
            Err(ConfigError::InvalidValue { key: "DEBOUNCE_TIME", .. })
        ));

        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_overrides(env(&[("RIGHT_BUTTON_PIN", "18")])),
            Err(ConfigError::DuplicatePin(18))
        ));
    }

    #[test]
    fn test_unrenderable_datetime_format_rejected() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_overrides(env(&[("DATETIME_FORMAT", "%Q")])),
            Err(ConfigError::InvalidValue { key: "DATETIME_FORMAT", .. })
        ));

        assert!(matches!(
            AppConfig::from_toml("[snapshot]\ndatetime_format = \"%Y-%\"\n"),
            Err(ConfigError::InvalidValue { key: "DATETIME_FORMAT", .. })
        ));
    }

    #[test]
    fn test_oversized_debounce_rejected() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_overrides(env(&[("DEBOUNCE_TIME", "1e17")])),
            Err(ConfigError::InvalidValue { key: "DEBOUNCE_TIME", .. })
        ));
    }
}
