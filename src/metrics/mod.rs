//! Prometheus metrics exporter for the appliance.
//!
//! # Metrics Exposed
//!
//! - `doorbell_streaming` - Acquisition loop status (1=streaming, 0=stopped)
//! - `doorbell_frames_acquired_total` - Frames read from the camera
//! - `doorbell_snapshots_total` - Snapshots written to disk
//! - `doorbell_snapshot_failures_total` - Failed snapshot attempts
//! - `doorbell_button_presses_total` - Debounced button presses
//! - `doorbell_button_suppressed_total` - Edges discarded as bounce
//!
//! # Example
//!
//! ```no_run
//! use pi_doorbell::capture::EngineStats;
//! use pi_doorbell::input::DebounceStats;
//! use pi_doorbell::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot::from_components(
//!     &EngineStats::default(),
//!     &DebounceStats::default(),
//! );
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
