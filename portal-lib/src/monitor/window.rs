use std::collections::VecDeque;

/// Append-only log that keeps the newest `capacity` entries.
///
/// Once full, every push drops the oldest entry.
#[derive(Debug, Clone)]
pub(crate) struct Window<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    /// Create an empty window holding at most `capacity` entries
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append `item`, returning the entry that fell out, if any
    pub(crate) fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.data.len() >= self.capacity {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(item);
        evicted
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Entries from oldest to newest
    pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.data.iter()
    }

    /// The newest entry matching `predicate`
    pub(crate) fn latest(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        self.data.iter().rev().find(|item| predicate(item))
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    pub(crate) fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.data.iter().cloned().collect()
    }
}
