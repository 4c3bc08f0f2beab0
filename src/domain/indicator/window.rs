//! Fixed-capacity ring buffer of the most recent bars.
//!
//! The window owns a flat arena of slots and a write cursor. Once full, each
//! push overwrites the oldest slot, so memory stays bounded by the largest
//! indicator lookback no matter how long the stream runs.

use crate::domain::bar::Bar;

#[derive(Debug, Clone)]
pub struct BarWindow {
    slots: Vec<Bar>,
    capacity: usize,
    next: usize,
}

impl BarWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, bar: Bar) {
        if self.capacity == 0 {
            return;
        }
        if self.slots.len() < self.capacity {
            self.slots.push(bar);
        } else {
            self.slots[self.next] = bar;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.next = 0;
    }

    /// Bar at chronological position `i` (0 = oldest held).
    pub fn get(&self, i: usize) -> Option<&Bar> {
        if i >= self.slots.len() {
            return None;
        }
        if self.slots.len() < self.capacity {
            self.slots.get(i)
        } else {
            self.slots.get((self.next + i) % self.capacity)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        (0..self.slots.len()).filter_map(move |i| self.get(i))
    }

    /// The `n` most recent bars, oldest first. `None` while fewer are held.
    pub fn tail(&self, n: usize) -> Option<Vec<&Bar>> {
        if n > self.slots.len() {
            return None;
        }
        let skip = self.slots.len() - n;
        Some(self.iter().skip(skip).collect())
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.slots.len().checked_sub(1).and_then(|i| self.get(i))
    }
}
