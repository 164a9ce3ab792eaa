//! Rolling series - fixed-capacity FIFO history for trend display.
//!
//! One [`SeriesBuffer`] per tracked scalar. [`SeriesSet`] groups the four
//! series a run view keeps and records every frame into all of them in one
//! step, so their lengths never drift apart.

use std::collections::VecDeque;

use shared_types::Frame;

/// Samples kept per series unless configured otherwise
pub const DEFAULT_SERIES_CAPACITY: usize = 60;

/// Bounded, chronologically ordered samples. Eviction is positional: the
/// oldest sample goes first.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SeriesBuffer {
    /// Capacity is at least one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Non-mutating form of [`push`](Self::push).
    pub fn appended(&self, value: f64) -> Self {
        let mut next = self.clone();
        next.push(value);
        next
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

/// Queue depths of one frame, aligned on a shared time axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuePoint {
    pub frontier: f64,
    pub fetch: f64,
    pub parse: f64,
}

/// Throughput plus the three stage queues
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSet {
    pub throughput: SeriesBuffer,
    pub frontier: SeriesBuffer,
    pub fetch: SeriesBuffer,
    pub parse: SeriesBuffer,
}

impl SeriesSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            throughput: SeriesBuffer::new(capacity),
            frontier: SeriesBuffer::new(capacity),
            fetch: SeriesBuffer::new(capacity),
            parse: SeriesBuffer::new(capacity),
        }
    }

    pub fn record(&mut self, frame: &Frame) {
        self.throughput.push(frame.throughput.pages_per_sec);
        self.frontier.push(frame.queues.frontier as f64);
        self.fetch.push(frame.queues.fetch as f64);
        self.parse.push(frame.queues.parse as f64);
    }

    /// Number of frames currently represented (equal across all four series).
    pub fn len(&self) -> usize {
        self.throughput.len()
    }

    pub fn is_empty(&self) -> bool {
        self.throughput.is_empty()
    }

    /// Positional zip of the queue series, oldest first.
    pub fn queue_points(&self) -> Vec<QueuePoint> {
        self.frontier
            .iter()
            .zip(self.fetch.iter())
            .zip(self.parse.iter())
            .map(|((frontier, fetch), parse)| QueuePoint {
                frontier,
                fetch,
                parse,
            })
            .collect()
    }
}
