//! Debounced physical button input.
//!
//! A [`Debouncer`] owns a set of button channels on top of an
//! [`EdgeSource`]. Raw falling edges go in; at most one [`PressEvent`] per
//! physical press comes out, delivered to per-channel callbacks and to any
//! subscribed receivers.

mod debouncer;
mod edge;
#[cfg(feature = "gpio")]
mod gpio;

pub use debouncer::{
    ChannelId, DebounceStats, Debouncer, EdgeOutcome, Phase, PressCallback, PressEvent,
    PressState, DEFAULT_DEBOUNCE_WINDOW,
};
pub use edge::{EdgeSink, EdgeSource, InputError, MockEdgeHandle, MockEdgeSource};
#[cfg(feature = "gpio")]
pub use gpio::GpioEdgeSource;
