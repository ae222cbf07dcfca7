//! Camera capture configuration.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest frame rate accepted by validation.
pub const MAX_FRAME_RATE: u32 = 120;

/// Identifies the camera to open: a numeric index or a device path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceId {
    /// Backend enumeration index (`0` is the first camera).
    Index(u32),
    /// Device node such as `/dev/video0`, or a backend-specific name.
    ///
    /// V4L2 opens devices by number, so `/dev/videoN` nodes resolve to index
    /// `N` (see [`DeviceId::index`]); other names go to the backend as-is.
    Path(String),
}

impl DeviceId {
    /// The numeric device index, if one can be derived.
    pub fn index(&self) -> Option<u32> {
        match self {
            DeviceId::Index(i) => Some(*i),
            DeviceId::Path(p) => p.strip_prefix("/dev/video")?.parse().ok(),
        }
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        DeviceId::Index(0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Index(i) => write!(f, "#{}", i),
            DeviceId::Path(p) => f.write_str(p),
        }
    }
}

impl std::str::FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<u32>() {
            Ok(index) => DeviceId::Index(index),
            Err(_) => DeviceId::Path(s.trim().to_string()),
        })
    }
}

/// Configuration for opening the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera device index or identifier.
    pub device: DeviceId,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
    /// Fixed lens position; `None` leaves the device in autofocus.
    pub manual_focus: Option<f32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: DeviceId::default(),
            width: 640,
            height: 480,
            fps: 30,
            manual_focus: None,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Parses a `WIDTHxHEIGHT` resolution string such as `640x480`.
    pub fn parse_resolution(value: &str) -> Result<(u32, u32), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: "resolution",
            value: value.to_string(),
        };
        let (w, h) = value.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = w.trim().parse().map_err(|_| invalid())?;
        let height = h.trim().parse().map_err(|_| invalid())?;
        Ok((width, height))
    }

    /// Time between frames at the configured rate.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(1) / self.fps.max(1)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > MAX_FRAME_RATE {
            return Err(ConfigError::InvalidFrameRate);
        }
        if let Some(focus) = self.manual_focus {
            if !focus.is_finite() || focus < 0.0 {
                return Err(ConfigError::InvalidFocus(focus));
            }
        }
        if let DeviceId::Path(path) = &self.device {
            if path.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "device",
                    value: String::new(),
                });
            }
        }
        Ok(())
    }
}
