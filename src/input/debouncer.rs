//! Debounced press detection over any [`EdgeSource`].

use super::edge::{EdgeSink, EdgeSource, InputError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Suppression window used when none is configured.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// Logical name of a button channel, e.g. `"left"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(Arc<str>);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        ChannelId(Arc::from(s))
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        ChannelId(Arc::from(s))
    }
}

/// An accepted press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PressEvent {
    pub channel: ChannelId,
    pub pin: u8,
    /// Instant of the falling edge that was accepted.
    pub at: Instant,
}

/// Callback bound to a channel; invoked once per accepted press.
pub type PressCallback = Arc<dyn Fn(&ChannelId) + Send + Sync>;

/// Where a channel sits in its press cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Ready to accept the next edge.
    Idle,
    /// A press fired and the debounce window has not elapsed yet.
    Fired,
}

/// Whether an edge became a press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    Accepted,
    Suppressed,
}

/// Debounce bookkeeping for a single line.
///
/// An edge arriving in `Idle` is pending until checked against the last
/// accepted press; only falling edges are reported, so nothing can cancel a
/// pending press and it fires right away. Edges inside the window after a
/// fire are discarded without re-arming the window.
#[derive(Debug, Clone)]
pub struct PressState {
    window: Duration,
    last_fired: Option<Instant>,
}

impl PressState {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn phase(&self, now: Instant) -> Phase {
        match self.last_fired {
            Some(fired) if now.saturating_duration_since(fired) < self.window => Phase::Fired,
            _ => Phase::Idle,
        }
    }

    /// Feeds one falling edge observed at `at`.
    pub fn observe(&mut self, at: Instant) -> EdgeOutcome {
        match self.phase(at) {
            Phase::Fired => EdgeOutcome::Suppressed,
            Phase::Idle => {
                self.last_fired = Some(at);
                EdgeOutcome::Accepted
            }
        }
    }
}

/// Accepted and suppressed edge totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebounceStats {
    pub accepted: u64,
    pub suppressed: u64,
}

struct Channel {
    id: ChannelId,
    pin: u8,
    state: Mutex<PressState>,
    callbacks: RwLock<Vec<PressCallback>>,
}

/// Fan-out shared by every channel's edge sink.
#[derive(Default)]
struct Dispatch {
    subscribers: Mutex<Vec<mpsc::Sender<PressEvent>>>,
    accepted: AtomicU64,
    suppressed: AtomicU64,
}

impl Dispatch {
    fn on_edge(&self, channel: &Channel, at: Instant) {
        let outcome = channel
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(at);

        if outcome == EdgeOutcome::Suppressed {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(channel = %channel.id, pin = channel.pin, "Edge suppressed");
            return;
        }

        self.accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(channel = %channel.id, pin = channel.pin, "Button press accepted");

        let callbacks = channel
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in &callbacks {
            callback(&channel.id);
        }

        let event = PressEvent {
            channel: channel.id.clone(),
            pin: channel.pin,
            at,
        };
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Turns raw falling edges into one press event per physical press.
///
/// Channels are registered up front, then `start()` claims all their pins
/// at once. Each channel debounces independently.
pub struct Debouncer<S: EdgeSource> {
    source: S,
    channels: Vec<Arc<Channel>>,
    dispatch: Arc<Dispatch>,
    listening: bool,
}

impl<S: EdgeSource> Debouncer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            channels: Vec::new(),
            dispatch: Arc::new(Dispatch::default()),
            listening: false,
        }
    }

    /// Associates `id` with `pin` and its suppression window.
    pub fn register(
        &mut self,
        id: impl Into<ChannelId>,
        pin: u8,
        window: Duration,
    ) -> Result<(), InputError> {
        if self.listening {
            return Err(InputError::Listening);
        }
        let id = id.into();
        if self.channels.iter().any(|c| c.id == id) {
            return Err(InputError::DuplicateChannel(id));
        }
        if let Some(other) = self.channels.iter().find(|c| c.pin == pin) {
            return Err(InputError::PinUnavailable {
                pin,
                reason: format!("already bound to channel {}", other.id),
            });
        }
        self.source.check(pin)?;

        tracing::debug!(channel = %id, pin, window_ms = window.as_millis() as u64, "Button channel registered");
        self.channels.push(Arc::new(Channel {
            id,
            pin,
            state: Mutex::new(PressState::new(window)),
            callbacks: RwLock::new(Vec::new()),
        }));
        Ok(())
    }

    /// Binds `callback` to the channel named `id`.
    pub fn on_press<F>(&mut self, id: &str, callback: F) -> Result<(), InputError>
    where
        F: Fn(&ChannelId) + Send + Sync + 'static,
    {
        let channel = self
            .channels
            .iter()
            .find(|c| c.id.as_str() == id)
            .ok_or_else(|| InputError::UnknownChannel(id.to_string()))?;
        channel
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
        Ok(())
    }

    /// Returns a receiver for every accepted press on every channel.
    pub fn subscribe(&self) -> mpsc::Receiver<PressEvent> {
        let (tx, rx) = mpsc::channel();
        self.dispatch
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Claims every registered pin and begins delivering presses.
    ///
    /// Either all channels start listening or none do.
    pub fn start(&mut self) -> Result<(), InputError> {
        if self.listening {
            return Ok(());
        }

        for (claimed, channel) in self.channels.iter().enumerate() {
            let sink: EdgeSink = {
                let channel = Arc::clone(channel);
                let dispatch = Arc::clone(&self.dispatch);
                Arc::new(move |at: Instant| dispatch.on_edge(&channel, at))
            };
            if let Err(e) = self.source.claim(channel.pin, sink) {
                for earlier in &self.channels[..claimed] {
                    self.source.release(earlier.pin);
                }
                tracing::error!(channel = %channel.id, pin = channel.pin, error = %e, "Failed to claim button pin");
                return Err(e);
            }
        }

        self.listening = true;
        tracing::info!(channels = self.channels.len(), "Listening for button presses");
        Ok(())
    }

    /// Releases every pin. Edges are ignored until the next `start()`.
    pub fn stop(&mut self) {
        if !self.listening {
            return;
        }
        for channel in &self.channels {
            self.source.release(channel.pin);
        }
        self.listening = false;
        tracing::info!("Stopped listening for button presses");
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Registered channels as `(id, pin, window)`.
    pub fn channels(&self) -> Vec<(ChannelId, u8, Duration)> {
        self.channels
            .iter()
            .map(|c| {
                let window = c.state.lock().unwrap_or_else(PoisonError::into_inner).window();
                (c.id.clone(), c.pin, window)
            })
            .collect()
    }

    pub fn stats(&self) -> DebounceStats {
        DebounceStats {
            accepted: self.dispatch.accepted.load(Ordering::Relaxed),
            suppressed: self.dispatch.suppressed.load(Ordering::Relaxed),
        }
    }
}

impl<S: EdgeSource> Drop for Debouncer<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{MockEdgeHandle, MockEdgeSource};
    use std::sync::atomic::AtomicUsize;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn debouncer() -> (Debouncer<MockEdgeSource>, MockEdgeHandle) {
        let source = MockEdgeSource::new();
        let handle = source.handle();
        (Debouncer::new(source), handle)
    }

    fn counter(debouncer: &mut Debouncer<MockEdgeSource>, id: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        debouncer
            .on_press(id, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        count
    }

    #[test]
    fn test_press_state_cycle() {
        let t0 = Instant::now();
        let mut state = PressState::new(ms(200));

        assert_eq!(state.phase(t0), Phase::Idle);
        assert_eq!(state.observe(t0), EdgeOutcome::Accepted);
        assert_eq!(state.phase(t0 + ms(100)), Phase::Fired);
        assert_eq!(state.observe(t0 + ms(100)), EdgeOutcome::Suppressed);
        // Suppressed edges do not extend the window.
        assert_eq!(state.phase(t0 + ms(200)), Phase::Idle);
        assert_eq!(state.observe(t0 + ms(250)), EdgeOutcome::Accepted);
    }

    #[test]
    fn test_two_edges_inside_window_fire_once() {
        let (mut debouncer, edges) = debouncer();
        debouncer.register("A", 17, ms(200)).unwrap();
        let presses = counter(&mut debouncer, "A");
        debouncer.start().unwrap();

        let t0 = Instant::now();
        edges.fall_at(17, t0);
        edges.fall_at(17, t0 + ms(50));

        assert_eq!(presses.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.stats(), DebounceStats { accepted: 1, suppressed: 1 });
    }

    #[test]
    fn test_edges_beyond_window_fire_twice() {
        let (mut debouncer, edges) = debouncer();
        debouncer.register("A", 17, ms(200)).unwrap();
        let presses = counter(&mut debouncer, "A");
        debouncer.start().unwrap();

        let t0 = Instant::now();
        edges.fall_at(17, t0);
        edges.fall_at(17, t0 + ms(201));

        assert_eq!(presses.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_bounce_burst_fires_once() {
        let (mut debouncer, edges) = debouncer();
        debouncer.register("A", 17, ms(200)).unwrap();
        let presses = counter(&mut debouncer, "A");
        debouncer.start().unwrap();

        let t0 = Instant::now();
        for i in 0..20 {
            edges.fall_at(17, t0 + ms(i * 5));
        }
        assert_eq!(presses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_real_time_edges_fifty_ms_apart() {
        let (mut debouncer, edges) = debouncer();
        debouncer.register("A", 17, DEFAULT_DEBOUNCE_WINDOW).unwrap();
        let presses = debouncer.subscribe();
        debouncer.start().unwrap();

        edges.fall(17);
        std::thread::sleep(ms(50));
        edges.fall(17);

        let event = presses.try_recv().unwrap();
        assert_eq!(event.channel.as_str(), "A");
        assert_eq!(event.pin, 17);
        assert!(presses.try_recv().is_err());
    }

    #[test]
    fn test_channels_are_independent() {
        let (mut debouncer, edges) = debouncer();
        debouncer.register("left", 18, ms(200)).unwrap();
        debouncer.register("right", 23, ms(200)).unwrap();
        let left = counter(&mut debouncer, "left");
        let right = counter(&mut debouncer, "right");
        let events = debouncer.subscribe();
        debouncer.start().unwrap();

        let t0 = Instant::now();
        edges.fall_at(18, t0);
        edges.fall_at(23, t0 + ms(10));
        edges.fall_at(18, t0 + ms(20));

        assert_eq!(left.load(Ordering::SeqCst), 1);
        assert_eq!(right.load(Ordering::SeqCst), 1);
        let order: Vec<_> = events.try_iter().map(|e| e.channel.to_string()).collect();
        assert_eq!(order, vec!["left", "right"]);
    }

    #[test]
    fn test_stop_ignores_edges_until_restart() {
        let (mut debouncer, edges) = debouncer();
        debouncer.register("A", 17, ms(200)).unwrap();
        let presses = counter(&mut debouncer, "A");
        debouncer.start().unwrap();
        debouncer.stop();

        let t0 = Instant::now();
        assert!(!edges.fall_at(17, t0));
        assert_eq!(presses.load(Ordering::SeqCst), 0);

        debouncer.start().unwrap();
        assert!(edges.fall_at(17, t0 + ms(1)));
        assert_eq!(presses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_fails_as_a_whole() {
        let source = MockEdgeSource::new();
        let handle = source.handle();
        let mut debouncer = Debouncer::new(source.clone());
        debouncer.register("left", 18, ms(200)).unwrap();
        debouncer.register("right", 23, ms(200)).unwrap();

        // Another owner grabs pin 23 after registration.
        let mut other = source;
        other.claim(23, Arc::new(|_: Instant| {})).unwrap();

        assert!(matches!(
            debouncer.start(),
            Err(InputError::PinUnavailable { pin: 23, .. })
        ));
        assert!(!debouncer.is_listening());
        assert!(!handle.is_claimed(18));
    }

    #[test]
    fn test_register_rejects_conflicts() {
        let source = MockEdgeSource::new().with_unavailable_pin(4);
        let mut debouncer = Debouncer::new(source);

        assert!(matches!(
            debouncer.register("busy", 4, ms(200)),
            Err(InputError::PinUnavailable { pin: 4, .. })
        ));
        debouncer.register("left", 18, ms(200)).unwrap();
        assert!(matches!(
            debouncer.register("left", 19, ms(200)),
            Err(InputError::DuplicateChannel(_))
        ));
        assert!(matches!(
            debouncer.register("other", 18, ms(200)),
            Err(InputError::PinUnavailable { pin: 18, .. })
        ));
        assert!(matches!(
            debouncer.on_press("missing", |_| {}),
            Err(InputError::UnknownChannel(_))
        ));

        debouncer.start().unwrap();
        assert!(matches!(
            debouncer.register("late", 20, ms(200)),
            Err(InputError::Listening)
        ));
        assert_eq!(debouncer.channels().len(), 1);
    }

    #[test]
    fn test_drop_releases_pins() {
        let (mut debouncer, edges) = debouncer();
        debouncer.register("A", 17, ms(200)).unwrap();
        debouncer.start().unwrap();
        assert!(edges.is_claimed(17));

        drop(debouncer);
        assert!(!edges.is_claimed(17));
    }
}
