//! Fixed-capacity FIFO ring.

/// Keeps the `N` most recent items; pushing into a full ring evicts the
/// oldest.
#[derive(Debug, Clone)]
pub struct Ring<T, const N: usize> {
    slots: [Option<T>; N],
    head: usize,
    len: usize,
}

impl<T, const N: usize> Default for Ring<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Ring<T, N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            head: 0,
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `item`, returning the evicted one when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if N == 0 {
            return Some(item);
        }
        let tail = (self.head + self.len) % N;
        if self.len == N {
            let evicted = self.slots[self.head].replace(item);
            self.head = (self.head + 1) % N;
            evicted
        } else {
            self.slots[tail] = Some(item);
            self.len += 1;
            None
        }
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % N].as_ref())
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone, const N: usize> Ring<T, N> {
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let mut ring: Ring<u32, 3> = Ring::new();
        assert!(ring.is_empty());
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.to_vec(), vec![1, 2]);
        assert_eq!(ring.capacity(), 3);
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut ring: Ring<u32, 3> = Ring::new();
        for i in 1..=3 {
            ring.push(i);
        }
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.push(5), Some(2));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn test_clear_resets() {
        let mut ring: Ring<&str, 2> = Ring::new();
        ring.push("a");
        ring.push("b");
        ring.push("c");
        ring.clear();
        assert!(ring.is_empty());
        ring.push("d");
        assert_eq!(ring.to_vec(), vec!["d"]);
    }
}
