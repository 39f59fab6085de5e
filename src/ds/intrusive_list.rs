//! Doubly linked list whose nodes live in a [`SlotArena`].
//!
//! Nodes are linked by `SlotId`, which gives callers a stable handle for O(1)
//! removal and move-to-front. Both the hot/cold box queues and the ghost
//! cache keep their recency order in one of these.
//!
//! ```text
//!   head (MRU) ─► [id_3] ◄──► [id_1] ◄──► [id_2] ◄── tail (LRU)
//! ```
//!
//! `debug_validate_invariants()` is available in debug/test builds.
use crate::ds::slot_arena::{SlotArena, SlotId};

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Arena-backed list: front is most recently used, back is least recently used.
#[derive(Debug)]
pub struct IntrusiveList<T> {
    arena: SlotArena<Node<T>>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

impl<T> IntrusiveList<T> {
    pub fn new() -> Self {
        Self {
            arena: SlotArena::new(),
            head: None,
            tail: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: SlotArena::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Returns `true` if `id` is a live node of this list.
    pub fn contains(&self, id: SlotId) -> bool {
        self.arena.contains(id)
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.arena.get(id).map(|node| &node.value)
    }

    /// Value at the LRU end.
    pub fn back(&self) -> Option<&T> {
        self.tail.and_then(|id| self.get(id))
    }

    /// Value at the MRU end.
    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|id| self.get(id))
    }

    /// Iterates from MRU to LRU.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            current: self.head,
        }
    }

    /// Inserts at the MRU end and returns the node handle.
    pub fn push_front(&mut self, value: T) -> SlotId {
        let id = self.arena.insert(Node {
            value,
            prev: None,
            next: self.head,
        });
        match self.head {
            Some(head) => {
                if let Some(node) = self.arena.get_mut(head) {
                    node.prev = Some(id);
                }
            },
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        id
    }

    /// Removes and returns the LRU value.
    pub fn pop_back(&mut self) -> Option<T> {
        let id = self.tail?;
        self.remove(id)
    }

    /// Unlinks `id` and returns its value.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.detach(id)?;
        self.arena.remove(id).map(|node| node.value)
    }

    /// Moves `id` to the MRU end; returns `false` if `id` is not live.
    pub fn move_to_front(&mut self, id: SlotId) -> bool {
        if !self.arena.contains(id) {
            return false;
        }
        if self.head == Some(id) {
            return true;
        }
        self.detach(id);
        self.attach_front(id);
        true
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.head = None;
        self.tail = None;
    }

    fn detach(&mut self, id: SlotId) -> Option<()> {
        let (prev, next) = {
            let node = self.arena.get(id)?;
            (node.prev, node.next)
        };

        match prev {
            Some(prev_id) => {
                if let Some(prev_node) = self.arena.get_mut(prev_id) {
                    prev_node.next = next;
                }
            },
            None => self.head = next,
        }
        match next {
            Some(next_id) => {
                if let Some(next_node) = self.arena.get_mut(next_id) {
                    next_node.prev = prev;
                }
            },
            None => self.tail = prev,
        }

        let node = self.arena.get_mut(id)?;
        node.prev = None;
        node.next = None;
        Some(())
    }

    fn attach_front(&mut self, id: SlotId) {
        let old_head = self.head;
        if let Some(node) = self.arena.get_mut(id) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(old) => {
                if let Some(head_node) = self.arena.get_mut(old) {
                    head_node.prev = Some(id);
                }
            },
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        if self.head.is_none() || self.tail.is_none() {
            assert!(self.head.is_none() && self.tail.is_none());
            assert_eq!(self.len(), 0);
            return;
        }

        let mut count = 0usize;
        let mut prev = None;
        let mut current = self.head;
        while let Some(id) = current {
            let node = self.arena.get(id).expect("linked node missing from arena");
            assert_eq!(node.prev, prev);
            if node.next.is_none() {
                assert_eq!(self.tail, Some(id));
            }
            prev = Some(id);
            current = node.next;
            count += 1;
            assert!(count <= self.len(), "cycle in list");
        }
        assert_eq!(count, self.len());
    }
}

impl<T> Default for IntrusiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator from MRU to LRU.
pub struct Iter<'a, T> {
    list: &'a IntrusiveList<T>,
    current: Option<SlotId>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let node = self.list.arena.get(id)?;
        self.current = node.next;
        Some(&node.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(list: &IntrusiveList<u64>) -> Vec<u64> {
        list.iter().copied().collect()
    }

    #[test]
    fn push_front_orders_mru_first() {
        let mut list = IntrusiveList::new();
        list.push_front(1);
        list.push_front(2);
        list.push_front(3);
        assert_eq!(order(&list), vec![3, 2, 1]);
        assert_eq!(list.front(), Some(&3));
        assert_eq!(list.back(), Some(&1));
        list.debug_validate_invariants();
    }

    #[test]
    fn pop_back_takes_lru() {
        let mut list = IntrusiveList::with_capacity(2);
        list.push_front(1);
        list.push_front(2);
        assert_eq!(list.pop_back(), Some(1));
        assert_eq!(list.pop_back(), Some(2));
        assert_eq!(list.pop_back(), None);
        assert!(list.is_empty());
        list.debug_validate_invariants();
    }

    #[test]
    fn move_to_front_reorders_middle_node() {
        let mut list = IntrusiveList::new();
        let a = list.push_front(1);
        let b = list.push_front(2);
        list.push_front(3);

        assert!(list.move_to_front(b));
        assert_eq!(order(&list), vec![2, 3, 1]);
        assert!(list.move_to_front(a));
        assert_eq!(order(&list), vec![1, 2, 3]);
        list.debug_validate_invariants();
    }

    #[test]
    fn remove_by_handle_relinks_neighbours() {
        let mut list = IntrusiveList::new();
        list.push_front(1);
        let mid = list.push_front(2);
        list.push_front(3);

        assert_eq!(list.remove(mid), Some(2));
        assert!(!list.contains(mid));
        assert!(!list.move_to_front(mid));
        assert_eq!(order(&list), vec![3, 1]);
        list.debug_validate_invariants();

        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.front(), None);
    }
}
