//! Camera input, frame acquisition and snapshots.
//!
//! The [`CaptureEngine`] owns a [`Camera`] and runs a background acquisition
//! loop that keeps the latest [`Frame`] in a [`FrameSlot`]. Snapshot requests
//! and the live feed read that slot without ever waiting on the device.

mod camera;
mod config;
pub mod encode;
mod engine;
mod frame;
pub mod naming;
#[cfg(feature = "camera")]
mod native;
mod slot;

pub use camera::{Camera, CameraError, MockCamera};
pub use config::{CaptureConfig, DeviceId, MAX_FRAME_RATE};
pub use encode::{encode_as_data_url, EncodeError};
pub use engine::{CaptureEngine, EngineError, EngineStats, Snapshot};
pub use frame::{Frame, PixelFormat};
pub use naming::{SnapshotName, SnapshotNamer};
#[cfg(feature = "camera")]
pub use native::NokhwaCamera;
pub use slot::FrameSlot;
