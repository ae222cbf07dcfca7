//! Metrics collection and registry.

use crate::capture::EngineStats;
use crate::input::DebounceStats;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of appliance state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether the acquisition loop is running.
    pub streaming: bool,
    /// Frames acquired since the engine was opened.
    pub frames_acquired: u64,
    /// Snapshots successfully written.
    pub snapshots_written: u64,
    /// Snapshot attempts that failed to encode or persist.
    pub snapshot_failures: u64,
    /// Accepted button presses across all channels.
    pub button_presses: u64,
    /// Edges discarded by debouncing.
    pub button_suppressed: u64,
}

impl MetricsSnapshot {
    /// Builds a snapshot from the engine and debouncer counters.
    pub fn from_components(engine: &EngineStats, input: &DebounceStats) -> Self {
        Self {
            streaming: engine.streaming,
            frames_acquired: engine.frames_acquired,
            snapshots_written: engine.snapshots_written,
            snapshot_failures: engine.snapshot_failures,
            button_presses: input.accepted,
            button_suppressed: input.suppressed,
        }
    }
}

/// Prometheus metrics registry for the appliance.
pub struct MetricsRegistry {
    registry: Registry,

    streaming: IntGauge,
    frames_acquired: IntCounter,
    snapshots_total: IntCounter,
    snapshot_failures_total: IntCounter,
    button_presses_total: IntCounter,
    button_suppressed_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all appliance metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let streaming = IntGauge::new(
            "doorbell_streaming",
            "Whether the camera acquisition loop is running (1=streaming, 0=stopped)",
        )?;
        let frames_acquired = IntCounter::new(
            "doorbell_frames_acquired_total",
            "Total frames acquired from the camera",
        )?;
        let snapshots_total = IntCounter::new(
            "doorbell_snapshots_total",
            "Total snapshots written to disk",
        )?;
        let snapshot_failures_total = IntCounter::new(
            "doorbell_snapshot_failures_total",
            "Total snapshot attempts that failed",
        )?;
        let button_presses_total = IntCounter::new(
            "doorbell_button_presses_total",
            "Total debounced button presses",
        )?;
        let button_suppressed_total = IntCounter::new(
            "doorbell_button_suppressed_total",
            "Total button edges suppressed by debouncing",
        )?;

        registry.register(Box::new(streaming.clone()))?;
        registry.register(Box::new(frames_acquired.clone()))?;
        registry.register(Box::new(snapshots_total.clone()))?;
        registry.register(Box::new(snapshot_failures_total.clone()))?;
        registry.register(Box::new(button_presses_total.clone()))?;
        registry.register(Box::new(button_suppressed_total.clone()))?;

        Ok(Self {
            registry,
            streaming,
            frames_acquired,
            snapshots_total,
            snapshot_failures_total,
            button_presses_total,
            button_suppressed_total,
        })
    }

    /// Updates all metrics from a snapshot of appliance state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.streaming.set(if snapshot.streaming { 1 } else { 0 });

        // Counters only move forward, by the difference
        advance(&self.frames_acquired, snapshot.frames_acquired);
        advance(&self.snapshots_total, snapshot.snapshots_written);
        advance(&self.snapshot_failures_total, snapshot.snapshot_failures);
        advance(&self.button_presses_total, snapshot.button_presses);
        advance(&self.button_suppressed_total, snapshot.button_suppressed);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}
