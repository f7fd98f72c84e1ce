//! Per-packet annotation store.
//!
//! Remembers the result computed for each capture frame so that a second
//! analysis pass over the same packets reads cached results instead of
//! mutating reassembly state again.

use std::collections::HashMap;

use crate::types::FrameNumber;

/// Results keyed by the frame that produced them.
#[derive(Debug, Clone)]
pub struct PacketAnnotations<T> {
    entries: HashMap<FrameNumber, T>,
}

impl<T> Default for PacketAnnotations<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> PacketAnnotations<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `frame` has already been processed.
    pub fn already_visited(&self, frame: FrameNumber) -> bool {
        self.entries.contains_key(&frame)
    }

    /// The result recorded for `frame`.
    pub fn get(&self, frame: FrameNumber) -> Option<&T> {
        self.entries.get(&frame)
    }

    /// Records the result for `frame`. The first record wins.
    pub fn insert(&mut self, frame: FrameNumber, value: T) -> &T {
        self.entries.entry(frame).or_insert(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
