//! Fixed-capacity FIFO between the effects graph and the monitor output.
//!
//! The studio controller pushes rendered blocks; the cpal output callback
//! pulls whatever it needs.  When the producer runs ahead, new samples
//! **overwrite** the oldest ones so monitor latency stays bounded by the
//! capacity instead of growing without limit.
//!
//! # Example
//!
//! ```rust
//! use take_studio::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]); // oldest sample dropped
//! let mut out = [0.0_f32; 3];
//! assert_eq!(buf.read_into(&mut out), 3);
//! assert_eq!(out, [2.0, 3.0, 4.0]);
//! assert_eq!(buf.len(), 1);
//! ```

use std::sync::{Arc, Mutex};

/// A monitor buffer shared between the controller task and the output
/// device callback.
pub type SharedRingBuffer = Arc<Mutex<RingBuffer<f32>>>;

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity circular FIFO.
///
/// ## Overflow behaviour
///
/// When [`push_slice`](Self::push_slice) would exceed `capacity`, the oldest
/// samples are silently overwritten.  The buffer never allocates beyond its
/// initial capacity.
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Index of the oldest stored sample.
    read_pos: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            capacity,
            read_pos: 0,
            len: 0,
        }
    }

    /// Append `data`, overwriting the oldest samples on overflow.
    pub fn push_slice(&mut self, data: &[T]) {
        for &item in data {
            let write_pos = (self.read_pos + self.len) % self.capacity;
            self.buf[write_pos] = item;
            if self.len < self.capacity {
                self.len += 1;
            } else {
                self.read_pos = (self.read_pos + 1) % self.capacity;
            }
        }
    }

    /// Move up to `out.len()` of the oldest samples into `out`.
    ///
    /// Returns how many samples were written; the rest of `out` is left
    /// untouched so the caller decides how to fill an underrun.
    pub fn read_into(&mut self, out: &mut [T]) -> usize {
        let n = out.len().min(self.len);
        for slot in out.iter_mut().take(n) {
            *slot = self.buf[self.read_pos];
            self.read_pos = (self.read_pos + 1) % self.capacity;
        }
        self.len -= n;
        if self.len == 0 {
            self.read_pos = 0;
        }
        n
    }

    /// Discard all samples.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.len = 0;
    }

    /// Number of valid samples currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of samples the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
