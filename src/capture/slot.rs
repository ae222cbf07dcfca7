//! Single-value cell holding the most recently acquired frame.

use super::Frame;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared "latest frame" cell.
///
/// The writer replaces the whole `Arc<Frame>` under a short write lock and
/// readers clone the `Arc` under a read lock, so a reader holds either a
/// complete frame or nothing. A poisoned lock still guards a whole `Arc`,
/// so poisoning is ignored.
#[derive(Debug, Default)]
pub struct FrameSlot {
    current: RwLock<Option<Arc<Frame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the held frame.
    pub fn publish(&self, frame: Arc<Frame>) {
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            guard.replace(frame)
        };
        // The old frame is released outside the lock.
        drop(previous);
    }

    /// Returns the held frame without waiting for a new one.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Empties the slot.
    pub fn clear(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(previous);
    }

    pub fn is_empty(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> Arc<Frame> {
        Arc::new(Frame::new(vec![sequence as u8; 12], 2, 2, sequence))
    }

    #[test]
    fn test_starts_empty() {
        let slot = FrameSlot::new();
        assert!(slot.is_empty());
        assert!(slot.latest().is_none());
    }

    #[test]
    fn test_publish_replaces_and_clear_empties() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        slot.publish(frame(2));
        assert_eq!(slot.latest().unwrap().sequence(), 2);

        slot.clear();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn test_reader_keeps_frame_after_replacement() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        let held = slot.latest().unwrap();

        slot.publish(frame(2));
        slot.clear();

        assert_eq!(held.sequence(), 1);
        assert_eq!(held.pixels(), &[1u8; 12]);
    }
}
