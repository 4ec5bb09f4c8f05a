use std::collections::VecDeque;

use crate::measurement::HeartRateSample;

/// Longest the history may grow before it is trimmed.
pub const DEFAULT_CAPACITY: usize = 1000;
/// Number of most recent samples kept by a trim.
pub const DEFAULT_RETAIN: usize = 500;

/// Bounded, insertion-ordered history of decoded samples.
///
/// When an append pushes the length past `capacity`, only the newest
/// `retain` samples survive.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<HeartRateSample>,
    capacity: usize,
    retain: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        HistoryBuffer::new()
    }
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_RETAIN)
    }

    /// `retain` is clamped to `capacity`.
    pub fn with_limits(capacity: usize, retain: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
            retain: retain.min(capacity),
        }
    }

    pub fn append(&mut self, sample: HeartRateSample) {
        self.samples.push_back(sample);

        if self.samples.len() > self.capacity {
            let excess = self.samples.len() - self.retain;
            self.samples.drain(..excess);
            log::debug!("History trimmed, dropped {} oldest samples", excess);
        }
    }

    /// Copy of the history, oldest first.
    pub fn snapshot(&self) -> Vec<HeartRateSample> {
        self.samples.iter().copied().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn latest(&self) -> Option<&HeartRateSample> {
        self.samples.back()
    }
}
