use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// A fixed-capacity queue that keeps the most recent N elements.
///
/// When the buffer is full and a new element is pushed, the oldest element
/// is dropped. Used for the audio output, which the host drains once per
/// frame: if it stops draining only the latest samples are kept.
#[derive(Default, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    capacity: usize,
    buffer: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    /// Pushes an element to the back, dropping the front one when full.
    pub fn push(&mut self, element: T) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(element);
    }

    /// Removes every element, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.buffer.drain(..)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
