//! Raspberry Pi doorbell device interface.
//!
//! Two independent subsystems make up the core:
//!
//! - [`capture`]: owns the camera, keeps the latest frame fresh on a
//!   background thread, and serves snapshots and live-feed frames from it.
//! - [`input`]: turns raw falling edges on button pins into debounced
//!   press events.
//!
//! Everything that decides what to do with a frame or a press (HTTP
//! routes, uploads, the viewer socket) sits outside and only calls the
//! operations exposed here.
//!
//! # Example
//!
//! ```no_run
//! use pi_doorbell::{
//!     capture::{CaptureConfig, CaptureEngine, MockCamera},
//!     input::{Debouncer, MockEdgeSource, DEFAULT_DEBOUNCE_WINDOW},
//! };
//!
//! let engine = CaptureEngine::open(CaptureConfig::default(), MockCamera::new()).unwrap();
//! engine.start().unwrap();
//!
//! let mut buttons = Debouncer::new(MockEdgeSource::new());
//! buttons.register("left", 18, DEFAULT_DEBOUNCE_WINDOW).unwrap();
//! buttons.on_press("left", |channel| println!("{} pressed", channel)).unwrap();
//! buttons.start().unwrap();
//!
//! if let Some(frame) = engine.latest_frame() {
//!     let url = engine.encode_as_data_url(&frame).unwrap();
//!     println!("{} bytes for the viewer", url.len());
//! }
//! let snapshot = engine.capture_snapshot("captured_images/visitor.jpg");
//! println!("{:?}", snapshot.map(|s| s.path));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod input;
pub mod metrics;

// Re-export commonly used types at crate root
pub use capture::{
    Camera, CaptureConfig, CaptureEngine, EngineError, Frame, MockCamera, Snapshot, SnapshotNamer,
};
pub use config::{AppConfig, ConfigError};
pub use input::{ChannelId, Debouncer, EdgeSource, InputError, PressEvent};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
