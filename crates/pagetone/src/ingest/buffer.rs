//! Bounded hand-off buffer for decoded audio

use arraydeque::{ArrayDeque, Saturating};
use byteorder::{ByteOrder, LittleEndian};
use slice_ring_buffer::SliceRingBuffer;

/// Bytes per `f32le` sample
pub const SAMPLE_BYTES: usize = 4;

/// Overflows remembered between calls to `take_overflows()`
///
/// Further overflows are added to the newest record.
pub const MAX_OVERFLOW_RECORDS: usize = 4096;

/// Bounded buffer of decoded sample bytes
///
/// The producer [pushes](SampleBuffer::push) raw `f32le`
/// bytes in whatever chunk sizes it reads them. The consumer
/// [takes](SampleBuffer::take_samples) every whole sample which
/// is available. Bytes which do not yet form a whole sample
/// stay in the buffer until the rest of the sample arrives.
///
/// The buffer never blocks and never grows beyond its
/// capacity. When a push would overfill it, the *oldest*
/// bytes are discarded. Discards are always a whole number
/// of samples so that later samples stay aligned. Each
/// discarding push is recorded separately until the consumer
/// [takes](SampleBuffer::take_overflows) the records.
///
/// ```
/// use pagetone::SampleBuffer;
///
/// let mut buf = SampleBuffer::new(8);
/// let bytes: Vec<u8> = [1.0f32, 2.0, 3.0]
///     .iter()
///     .flat_map(|s| s.to_le_bytes())
///     .collect();
///
/// // oldest sample is dropped
/// assert_eq!(4, buf.push(&bytes));
/// assert_eq!(vec![2.0f32, 3.0], buf.take_samples());
/// assert!(buf.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    bytes: SliceRingBuffer<u8>,
    capacity: usize,
    overflows: ArrayDeque<usize, MAX_OVERFLOW_RECORDS, Saturating>,
}

impl SampleBuffer {
    /// Empty buffer
    ///
    /// The `capacity`, in bytes, is rounded up to a whole
    /// number of samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = round_up(usize::max(capacity, SAMPLE_BYTES));
        Self {
            bytes: SliceRingBuffer::with_capacity(capacity),
            capacity,
            overflows: ArrayDeque::new(),
        }
    }

    /// Append bytes, discarding the oldest if needed
    ///
    /// Returns the number of bytes discarded, which is zero
    /// unless the buffer overflowed. If `chunk` alone is larger
    /// than the capacity, only its newest bytes are kept.
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        let total = self.bytes.len() + chunk.len();
        if total <= self.capacity {
            self.bytes.extend_from_slice(chunk);
            return 0;
        }

        let excess = round_up(total - self.capacity);
        let from_buffer = usize::min(excess, self.bytes.len());
        std::mem::drop(self.bytes.drain(0..from_buffer));
        self.bytes
            .extend_from_slice(&chunk[usize::min(excess - from_buffer, chunk.len())..]);

        if self.overflows.is_full() {
            if let Some(newest) = self.overflows.back_mut() {
                *newest += excess;
            }
        } else {
            let _ = self.overflows.push_back(excess);
        }
        excess
    }

    /// Remove and decode every whole sample
    ///
    /// Up to three trailing bytes of an incomplete sample
    /// remain in the buffer.
    pub fn take_samples(&mut self) -> Vec<f32> {
        let whole = self.bytes.len() / SAMPLE_BYTES;
        let mut out = vec![0.0f32; whole];
        LittleEndian::read_f32_into(&self.bytes.as_slice()[0..whole * SAMPLE_BYTES], &mut out);
        std::mem::drop(self.bytes.drain(0..whole * SAMPLE_BYTES));
        out
    }

    /// Overflows since the last call
    ///
    /// Returns the number of bytes discarded by each push which
    /// overflowed, oldest first, and forgets them.
    pub fn take_overflows(&mut self) -> Vec<usize> {
        std::iter::from_fn(|| self.overflows.pop_front()).collect()
    }

    /// Discard all contents
    ///
    /// Also discards any incomplete trailing sample and the
    /// overflow records.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.overflows.clear();
    }

    /// Buffered bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if no bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Capacity, in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// round up to a whole number of samples
#[inline]
fn round_up(bytes: usize) -> usize {
    (bytes + SAMPLE_BYTES - 1) / SAMPLE_BYTES * SAMPLE_BYTES
}
