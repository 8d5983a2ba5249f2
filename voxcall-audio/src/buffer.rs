//! Lock-free circular buffer for audio samples

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;

/// Lock-free circular buffer for audio samples
///
/// Uses `ringbuf` for wait-free single-producer single-consumer (SPSC)
/// operations. The audio callback produces, the activity-detector task
/// consumes, and neither blocks the other.
pub struct CircularBuffer {
    producer: ringbuf::HeapProd<f32>,
    consumer: ringbuf::HeapCons<f32>,
    capacity: usize,
}

impl CircularBuffer {
    /// Create new circular buffer with given capacity in f32 samples
    pub fn new(capacity: usize) -> Self {
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();

        Self {
            producer,
            consumer,
            capacity,
        }
    }

    /// Write samples to the buffer (producer side, called from audio callback)
    ///
    /// Returns number of samples actually written. If the buffer is full,
    /// excess samples are dropped.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Read samples from the buffer (consumer side)
    ///
    /// Returns number of samples actually read.
    pub fn read(&mut self, output: &mut [f32]) -> usize {
        self.consumer.pop_slice(output)
    }

    /// Number of samples currently available for reading
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Remaining capacity for writing
    pub fn free_space(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Total buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }

    /// Clear all data from buffer
    pub fn clear(&mut self) {
        self.consumer.clear();
    }

    /// Read all available samples into a Vec
    pub fn read_all(&mut self) -> Vec<f32> {
        let available = self.available();
        let mut output = vec![0.0; available];
        let read = self.read(&mut output);
        output.truncate(read);
        output
    }
}
