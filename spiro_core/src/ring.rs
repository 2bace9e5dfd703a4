//! Fixed-capacity ring buffer used for every streamed channel.
//!
//! Pushing into a full buffer overwrites the oldest slot in O(1). Logical
//! order (oldest first) is recovered from `head` on read.

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    /// Slot holding the oldest element once the buffer has wrapped.
    head: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        if self.buf.len() < self.capacity {
            self.buf.push(value);
        } else {
            self.buf[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Element `i` counting from the oldest.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&T> {
        let len = self.buf.len();
        if i >= len {
            return None;
        }
        self.buf.get((self.head + i) % len)
    }

    #[inline]
    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    #[inline]
    pub fn latest(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Oldest-to-newest iteration.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let (newer, older) = self.buf.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// The most recent `last_k` elements in time order (fewer while filling).
    pub fn window(&self, last_k: usize) -> Vec<T> {
        let skip = self.len().saturating_sub(last_k);
        self.iter().skip(skip).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_and_keeps_order() {
        let mut rb = RingBuffer::new(3);
        for v in 1..=5 {
            rb.push(v);
        }
        assert_eq!(rb.to_vec(), vec![3, 4, 5]);
        assert_eq!(rb.oldest(), Some(&3));
        assert_eq!(rb.latest(), Some(&5));
        assert_eq!(rb.get(1), Some(&4));
        assert_eq!(rb.get(3), None);
    }

    #[test]
    fn window_while_filling() {
        let mut rb = RingBuffer::new(8);
        rb.push(1.0);
        rb.push(2.0);
        assert_eq!(rb.window(5), vec![1.0, 2.0]);
        assert_eq!(rb.window(1), vec![2.0]);
        assert!(rb.window(0).is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut rb = RingBuffer::new(0);
        rb.push('a');
        rb.push('b');
        assert_eq!(rb.capacity(), 1);
        assert_eq!(rb.to_vec(), vec!['b']);
    }

    #[test]
    fn reverse_iteration_is_newest_first() {
        let mut rb = RingBuffer::new(2);
        for v in 0..3 {
            rb.push(v);
        }
        let rev: Vec<_> = rb.iter().rev().copied().collect();
        assert_eq!(rev, vec![2, 1]);
    }
}
