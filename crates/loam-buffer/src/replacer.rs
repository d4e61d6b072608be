//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Trait for page replacement algorithms.
///
/// Evictability is determined at eviction time through a predicate (typically
/// a pin-count check on the candidate frame) rather than tracked separately.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Selects a victim frame for eviction.
    ///
    /// `can_evict` reports whether a candidate frame may be evicted right
    /// now. Returns None if no candidate qualifies.
    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId>;

    /// Removes a frame from consideration (e.g. when its page is deleted).
    fn remove(&self, frame_id: FrameId);
}

/// Clock replacement algorithm implementation.
///
/// Uses atomic reference bits for lock-free access recording. Only the
/// clock hand is behind a mutex.
pub struct ClockReplacer {
    /// Number of frames.
    num_frames: usize,
    /// Reference bits for each frame (atomic for lock-free access).
    reference_bits: Vec<AtomicBool>,
    /// Current clock hand position.
    clock_hand: Mutex<usize>,
}

impl ClockReplacer {
    /// Creates a new clock replacer with the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        let reference_bits: Vec<AtomicBool> =
            (0..num_frames).map(|_| AtomicBool::new(false)).collect();

        Self {
            num_frames,
            reference_bits,
            clock_hand: Mutex::new(0),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }
}

impl Replacer for ClockReplacer {
    #[inline]
    fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
        }
    }

    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId> {
        let mut hand = self.clock_hand.lock();

        // Make at most 2 full rotations to find a victim
        for _ in 0..(2 * self.num_frames) {
            let frame_id = FrameId(*hand as u32);
            let pos = *hand;
            *hand = (*hand + 1) % self.num_frames;

            if can_evict(frame_id) {
                if !self.reference_bits[pos].load(Ordering::Relaxed) {
                    // Found victim: evictable and reference bit is 0
                    return Some(frame_id);
                }
                // Clear reference bit and continue
                self.reference_bits[pos].store(false, Ordering::Relaxed);
            }
        }

        // Everything referenced on both rotations: take any evictable frame
        for i in 0..self.num_frames {
            let frame_id = FrameId(i as u32);
            if can_evict(frame_id) {
                return Some(frame_id);
            }
        }

        None
    }

    fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(false, Ordering::Relaxed);
        }
    }
}
