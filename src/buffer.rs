//! Fixed-capacity containers used for waveform history and bounded lists.

/// Largest history a probe may keep.
pub const MAX_HISTORY_CAPACITY: usize = 65_536;

/// Ring buffer that overwrites its oldest entry once full.
///
/// Entries are stored in a preallocated vector with a moving write
/// position, so pushing never allocates.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buffer: Vec<T>,
    capacity: usize,
    /// Next slot to overwrite once the buffer has wrapped
    write_pos: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a ring buffer; the capacity is clamped to `1..=MAX_HISTORY_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_HISTORY_CAPACITY);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    /// Append a value, dropping the oldest one when full.
    pub fn push(&mut self, value: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(value);
        } else {
            self.buffer[self.write_pos] = value;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (newest, oldest) = self.buffer.split_at(self.write_pos);
        oldest.iter().chain(newest.iter())
    }

    /// Most recently pushed value.
    pub fn latest(&self) -> Option<&T> {
        if self.buffer.is_empty() {
            None
        } else if self.write_pos == 0 {
            self.buffer.last()
        } else {
            self.buffer.get(self.write_pos - 1)
        }
    }

    /// Copy the contents out, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.write_pos = 0;
    }
}

/// Vector with a hard upper bound on its length.
#[derive(Debug, Clone)]
pub struct BoundedVec<T> {
    items: Vec<T>,
    limit: usize,
}

impl<T> BoundedVec<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Push a value; returns false and drops it when the limit is reached.
    pub fn push(&mut self, value: T) -> bool {
        if self.items.len() >= self.limit {
            return false;
        }
        self.items.push(value);
        true
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_wraps() {
        let mut rb = RingBuffer::new(3);
        for i in 0..5 {
            rb.push(i);
        }
        assert_eq!(rb.len(), 3);
        assert!(rb.is_full());
        assert_eq!(rb.to_vec(), vec![2, 3, 4]);
        assert_eq!(rb.latest(), Some(&4));
    }

    #[test]
    fn test_ring_buffer_before_wrap() {
        let mut rb = RingBuffer::new(4);
        rb.push(1.0);
        rb.push(2.0);
        assert_eq!(rb.to_vec(), vec![1.0, 2.0]);
        assert_eq!(rb.latest(), Some(&2.0));
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.latest(), None);
    }

    #[test]
    fn test_ring_buffer_capacity_is_clamped() {
        let rb: RingBuffer<u8> = RingBuffer::new(0);
        assert_eq!(rb.capacity(), 1);
        let rb: RingBuffer<u8> = RingBuffer::new(usize::MAX);
        assert_eq!(rb.capacity(), MAX_HISTORY_CAPACITY);
    }

    #[test]
    fn test_bounded_vec_rejects_overflow() {
        let mut v = BoundedVec::new(2);
        assert!(v.push('a'));
        assert!(v.push('b'));
        assert!(!v.push('c'));
        assert_eq!(v.len(), 2);
        assert_eq!(v.remove(0), Some('a'));
        assert_eq!(v.remove(5), None);
        assert!(v.push('d'));
        assert_eq!(v.as_slice(), &['b', 'd']);
    }
}
