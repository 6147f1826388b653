//! LRU Tracker Module
//!
//! Implements Least Recently Used ordering for cache eviction.

/// Sentinel for "no neighbour" in the linked list.
const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: usize,
    next: usize,
    linked: bool,
}

impl Link {
    const UNLINKED: Link = Link {
        prev: NIL,
        next: NIL,
        linked: false,
    };
}

// == Recency Index ==
/// Tracks access order of store slots for LRU eviction.
///
/// Slots are the stable indices the entry store hands out. The index keeps an
/// intrusive doubly-linked list over them where:
/// - Front (head) = Most recently used
/// - Back (tail) = Least recently used
///
/// Every operation is O(1). The index only orders slots; it never owns values.
#[derive(Debug)]
pub struct RecencyIndex {
    links: Vec<Link>,
    head: usize,
    tail: usize,
    len: usize,
}

impl Default for RecencyIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RecencyIndex {
    // == Constructor ==
    /// Creates a new empty recency index.
    pub fn new() -> Self {
        Self {
            links: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    // == Push Front ==
    /// Links a slot as the most recently used one.
    ///
    /// A slot that is already linked is moved instead.
    pub fn push_front(&mut self, slot: usize) {
        if slot >= self.links.len() {
            self.links.resize(slot + 1, Link::UNLINKED);
        }
        if self.links[slot].linked {
            self.move_to_front(slot);
            return;
        }

        self.links[slot] = Link {
            prev: NIL,
            next: self.head,
            linked: true,
        };
        if self.head != NIL {
            self.links[self.head].prev = slot;
        } else {
            self.tail = slot;
        }
        self.head = slot;
        self.len += 1;
    }

    // == Touch ==
    /// Marks a slot as recently used (moves to front).
    ///
    /// Unlinked slots are ignored.
    pub fn move_to_front(&mut self, slot: usize) {
        if !self.contains(slot) || self.head == slot {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    // == Remove ==
    /// Removes a slot from the ordering. Returns false if it was not linked.
    pub fn remove(&mut self, slot: usize) -> bool {
        if !self.contains(slot) {
            return false;
        }
        self.unlink(slot);
        true
    }

    // == Evict Oldest ==
    /// Returns and unlinks the least recently used slot.
    ///
    /// Returns None if the index is empty.
    pub fn pop_back(&mut self) -> Option<usize> {
        let slot = self.back()?;
        self.unlink(slot);
        Some(slot)
    }

    // == Peek Oldest ==
    /// Returns the least recently used slot without unlinking it.
    pub fn back(&self) -> Option<usize> {
        (self.tail != NIL).then_some(self.tail)
    }

    // == Length ==
    /// Returns the number of linked slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // == Contains ==
    /// Checks if a slot is currently linked.
    pub fn contains(&self, slot: usize) -> bool {
        self.links.get(slot).is_some_and(|link| link.linked)
    }

    /// Iterates slots from most to least recently used.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            index: self,
            cursor: self.head,
        }
    }

    /// Unlinks every slot.
    pub fn clear(&mut self) {
        self.links.clear();
        self.head = NIL;
        self.tail = NIL;
        self.len = 0;
    }

    fn unlink(&mut self, slot: usize) {
        let Link { prev, next, .. } = self.links[slot];
        if prev != NIL {
            self.links[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.links[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.links[slot] = Link::UNLINKED;
        self.len -= 1;
    }
}

/// Most-to-least recently used iterator over linked slots.
pub struct Iter<'a> {
    index: &'a RecencyIndex,
    cursor: usize,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cursor == NIL {
            return None;
        }
        let slot = self.cursor;
        self.cursor = self.index.links[slot].next;
        Some(slot)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn order(index: &RecencyIndex) -> Vec<usize> {
        index.iter().collect()
    }

    #[test]
    fn test_recency_new() {
        let index = RecencyIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert_eq!(index.back(), None);
        assert_eq!(index.iter().next(), None);
    }

    #[test]
    fn test_push_front_orders_newest_first() {
        let mut index = RecencyIndex::new();

        index.push_front(0);
        index.push_front(1);
        index.push_front(2);

        assert_eq!(index.len(), 3);
        assert_eq!(order(&index), vec![2, 1, 0]);
        // slot 0 is oldest (added first)
        assert_eq!(index.back(), Some(0));
    }

    #[test]
    fn test_move_to_front() {
        let mut index = RecencyIndex::new();

        index.push_front(0);
        index.push_front(1);
        index.push_front(2);

        index.move_to_front(0);

        assert_eq!(index.len(), 3);
        assert_eq!(order(&index), vec![0, 2, 1]);
        assert_eq!(index.back(), Some(1));
    }

    #[test]
    fn test_move_to_front_of_tail_and_middle() {
        let mut index = RecencyIndex::new();
        for slot in 0..4 {
            index.push_front(slot);
        }
        // [3, 2, 1, 0]
        index.move_to_front(2);
        assert_eq!(order(&index), vec![2, 3, 1, 0]);
        index.move_to_front(0);
        assert_eq!(order(&index), vec![0, 2, 3, 1]);
        assert_eq!(index.back(), Some(1));
    }

    #[test]
    fn test_pop_back() {
        let mut index = RecencyIndex::new();

        index.push_front(5);
        index.push_front(7);
        index.push_front(9);

        assert_eq!(index.pop_back(), Some(5));
        assert_eq!(index.len(), 2);
        assert_eq!(index.pop_back(), Some(7));
        assert_eq!(index.pop_back(), Some(9));
        assert_eq!(index.pop_back(), None);
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut index = RecencyIndex::new();

        index.push_front(0);
        index.push_front(1);
        index.push_front(2);

        assert!(index.remove(1));

        assert_eq!(index.len(), 2);
        assert!(!index.contains(1));
        assert_eq!(order(&index), vec![2, 0]);
    }

    #[test]
    fn test_remove_unlinked_slot() {
        let mut index = RecencyIndex::new();
        index.push_front(0);

        // Remove a slot that was never linked - should not panic or affect the rest
        assert!(!index.remove(42));
        assert_eq!(index.len(), 1);
        assert!(index.contains(0));
    }

    #[test]
    fn test_push_same_slot_multiple_times() {
        let mut index = RecencyIndex::new();

        index.push_front(3);
        index.push_front(3);
        index.push_front(3);

        assert_eq!(index.len(), 1);
        assert_eq!(index.pop_back(), Some(3));
        assert!(index.is_empty());
    }

    #[test]
    fn test_slot_reuse_after_remove() {
        let mut index = RecencyIndex::new();
        index.push_front(0);
        index.push_front(1);
        index.remove(0);
        index.push_front(0);

        assert_eq!(order(&index), vec![0, 1]);
        assert_eq!(index.back(), Some(1));
    }

    #[test]
    fn test_clear() {
        let mut index = RecencyIndex::new();
        index.push_front(0);
        index.push_front(1);
        index.clear();

        assert!(index.is_empty());
        assert_eq!(index.iter().count(), 0);
        assert!(!index.contains(0));
    }
}
