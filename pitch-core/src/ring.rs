//! # Sample Ring Buffer
//!
//! Fixed-capacity circular buffer sitting between the audio callback and the
//! analysis pass. The callback writes variable-size chunks; the analysis side
//! reads fixed-size windows. Both operations are plain copies into a buffer
//! allocated once at construction, so the hot path never allocates or blocks.

use crate::error::PitchError;

/// Circular f32 sample buffer with wraparound-aware block copies.
///
/// Writes that would overflow drop the incoming chunk and report
/// [`PitchError::BufferOverflow`]; reads of a full window either succeed
/// completely or leave the buffer untouched.
pub struct SampleRingBuffer {
    buffer: Box<[f32]>,
    read_pos: usize,
    write_pos: usize,
    available: usize,
}

impl SampleRingBuffer {
    /// Creates a buffer holding `capacity` samples. Capacity should be a
    /// small multiple (>= 4x is typical) of the analysis window size to
    /// absorb producer/consumer rate mismatch.
    pub fn new(capacity: usize) -> Self {
        SampleRingBuffer {
            buffer: vec![0.0; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            available: 0,
        }
    }

    /// Total capacity in samples.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of buffered samples not yet read.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Fill ratio in `[0, 1]`, for telemetry.
    pub fn usage(&self) -> f32 {
        self.available as f32 / self.buffer.len() as f32
    }

    /// Discards all buffered samples.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.available = 0;
    }

    /// Appends a chunk of samples in arrival order.
    ///
    /// If the chunk does not fit, nothing is written and the whole chunk is
    /// reported dropped. The caller logs this; it is not fatal.
    pub fn write(&mut self, samples: &[f32]) -> Result<(), PitchError> {
        let len = samples.len();
        let capacity = self.buffer.len();
        if self.available + len > capacity {
            return Err(PitchError::BufferOverflow { dropped: len });
        }

        if self.write_pos + len <= capacity {
            self.buffer[self.write_pos..self.write_pos + len].copy_from_slice(samples);
        } else {
            let first = capacity - self.write_pos;
            self.buffer[self.write_pos..].copy_from_slice(&samples[..first]);
            self.buffer[..len - first].copy_from_slice(&samples[first..]);
        }

        self.write_pos = (self.write_pos + len) % capacity;
        self.available += len;
        Ok(())
    }

    /// Copies one full window of samples into `out` and advances the read
    /// cursor. Returns `false` without side effects when fewer than
    /// `out.len()` samples are buffered.
    pub fn try_read_window(&mut self, out: &mut [f32]) -> bool {
        let len = out.len();
        let capacity = self.buffer.len();
        if self.available < len {
            return false;
        }

        if self.read_pos + len <= capacity {
            out.copy_from_slice(&self.buffer[self.read_pos..self.read_pos + len]);
        } else {
            let first = capacity - self.read_pos;
            out[..first].copy_from_slice(&self.buffer[self.read_pos..]);
            out[first..].copy_from_slice(&self.buffer[..len - first]);
        }

        self.read_pos = (self.read_pos + len) % capacity;
        self.available -= len;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_order() {
        let mut ring = SampleRingBuffer::new(16);
        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
        ring.write(&input).unwrap();

        let mut out = [0.0; 8];
        assert!(ring.try_read_window(&mut out));
        assert_eq!(&out, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(ring.available(), 2);
    }

    #[test]
    fn read_without_enough_samples_has_no_side_effects() {
        let mut ring = SampleRingBuffer::new(16);
        ring.write(&[1.0, 2.0, 3.0]).unwrap();

        let mut out = [0.0; 4];
        assert!(!ring.try_read_window(&mut out));
        assert_eq!(ring.available(), 3);

        let mut out = [0.0; 3];
        assert!(ring.try_read_window(&mut out));
        assert_eq!(&out, &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn wraparound_copies_split_correctly() {
        let mut ring = SampleRingBuffer::new(8);

        // Push the cursors near the capacity edge.
        ring.write(&[0.0; 6]).unwrap();
        let mut scratch = [0.0; 6];
        assert!(ring.try_read_window(&mut scratch));

        // This write wraps: two samples at the end, four at the start.
        let input: Vec<f32> = (10..16).map(|i| i as f32).collect();
        ring.write(&input).unwrap();

        let mut out = [0.0; 6];
        assert!(ring.try_read_window(&mut out));
        assert_eq!(&out, &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
    }

    #[test]
    fn overflow_drops_chunk_and_keeps_existing_samples() {
        let mut ring = SampleRingBuffer::new(8);
        ring.write(&[1.0; 6]).unwrap();

        let err = ring.write(&[2.0; 4]).unwrap_err();
        match err {
            PitchError::BufferOverflow { dropped } => assert_eq!(dropped, 4),
            other => panic!("unexpected error: {other}"),
        }

        // Existing samples are intact.
        let mut out = [0.0; 6];
        assert!(ring.try_read_window(&mut out));
        assert_eq!(&out, &[1.0; 6]);
    }

    #[test]
    fn clear_empties_the_buffer() {
        let mut ring = SampleRingBuffer::new(8);
        ring.write(&[1.0; 5]).unwrap();
        ring.clear();
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.usage(), 0.0);
    }
}
