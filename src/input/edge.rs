//! Falling-edge sources.
//!
//! An [`EdgeSource`] claims physical input lines and reports every falling
//! edge it sees to a sink. The debouncer only talks to this trait, so tests
//! drive it with [`MockEdgeSource`] instead of a live GPIO backend.

use super::ChannelId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;

/// Errors raised while registering or claiming input channels.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("pin {pin} unavailable: {reason}")]
    PinUnavailable { pin: u8, reason: String },
    #[error("channel already registered: {0}")]
    DuplicateChannel(ChannelId),
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("cannot change channels while listening")]
    Listening,
    #[error("input backend unavailable: {0}")]
    Backend(String),
}

/// Receives the instant of each falling edge on a claimed pin.
pub type EdgeSink = Arc<dyn Fn(Instant) + Send + Sync>;

/// A provider of falling-edge notifications for numbered pins.
pub trait EdgeSource: Send {
    /// Checks that `pin` exists and is free without keeping it.
    fn check(&self, pin: u8) -> Result<(), InputError>;

    /// Claims `pin` and delivers its falling edges to `sink` until released.
    fn claim(&mut self, pin: u8, sink: EdgeSink) -> Result<(), InputError>;

    /// Stops delivering edges for `pin` and gives the line back.
    fn release(&mut self, pin: u8);
}

#[derive(Default)]
struct MockLines {
    sinks: HashMap<u8, EdgeSink>,
    unavailable: HashSet<u8>,
}

/// In-memory edge source. Edges are injected through a [`MockEdgeHandle`].
#[derive(Clone, Default)]
pub struct MockEdgeSource {
    lines: Arc<Mutex<MockLines>>,
}

impl MockEdgeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `pin` fail to claim, as if another process held it.
    pub fn with_unavailable_pin(self, pin: u8) -> Self {
        self.lock().unavailable.insert(pin);
        self
    }

    /// Returns a handle for injecting edges.
    pub fn handle(&self) -> MockEdgeHandle {
        MockEdgeHandle {
            lines: Arc::clone(&self.lines),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockLines> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EdgeSource for MockEdgeSource {
    fn check(&self, pin: u8) -> Result<(), InputError> {
        let lines = self.lock();
        if lines.unavailable.contains(&pin) {
            return Err(InputError::PinUnavailable {
                pin,
                reason: "held by another owner".to_string(),
            });
        }
        if lines.sinks.contains_key(&pin) {
            return Err(InputError::PinUnavailable {
                pin,
                reason: "already claimed".to_string(),
            });
        }
        Ok(())
    }

    fn claim(&mut self, pin: u8, sink: EdgeSink) -> Result<(), InputError> {
        self.check(pin)?;
        self.lock().sinks.insert(pin, sink);
        Ok(())
    }

    fn release(&mut self, pin: u8) {
        self.lock().sinks.remove(&pin);
    }
}

/// Injects falling edges into a [`MockEdgeSource`].
#[derive(Clone)]
pub struct MockEdgeHandle {
    lines: Arc<Mutex<MockLines>>,
}

impl MockEdgeHandle {
    /// Signals a falling edge on `pin` now.
    pub fn fall(&self, pin: u8) -> bool {
        self.fall_at(pin, Instant::now())
    }

    /// Signals a falling edge on `pin` stamped `at`.
    ///
    /// Returns `false` when nothing has claimed the pin. The sink runs on
    /// the calling thread.
    pub fn fall_at(&self, pin: u8, at: Instant) -> bool {
        let sink = self
            .lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sinks
            .get(&pin)
            .cloned();
        match sink {
            Some(sink) => {
                sink(at);
                true
            }
            None => false,
        }
    }

    pub fn is_claimed(&self, pin: u8) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sinks
            .contains_key(&pin)
    }
}
