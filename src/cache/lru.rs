//! LRU List Module
//!
//! Recency ordering for a shard, stored as an arena of nodes linked by
//! integer handles instead of references.

// == Handle ==
/// Index of a node slot in the arena.
pub type Handle = usize;

#[derive(Debug)]
struct Node<T> {
    item: T,
    prev: Option<Handle>,
    next: Option<Handle>,
}

// == LRU List ==
/// Doubly-linked recency list backed by a slot arena.
///
/// - Head = Most recently used
/// - Tail = Least recently used
///
/// Freed slots are recycled, so the arena never grows beyond the largest
/// number of items held at once. Every operation is O(1).
#[derive(Debug)]
pub struct LruList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<Handle>,
    head: Option<Handle>,
    tail: Option<Handle>,
    len: usize,
}

impl<T> Default for LruList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LruList<T> {
    // == Constructor ==
    /// Creates a new empty list.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty list with room for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    // == Push Front ==
    /// Inserts an item as most recently used and returns its handle.
    pub fn push_front(&mut self, item: T) -> Handle {
        let node = Node {
            item,
            prev: None,
            next: self.head,
        };
        let handle = match self.free.pop() {
            Some(handle) => {
                self.slots[handle] = Some(node);
                handle
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        match self.head {
            Some(old_head) => self.node_mut(old_head).prev = Some(handle),
            None => self.tail = Some(handle),
        }
        self.head = Some(handle);
        self.len += 1;
        handle
    }

    // == Remove ==
    /// Unlinks the node at `handle` and returns its item.
    ///
    /// Returns None if the slot is vacant.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        self.slots.get(handle)?.as_ref()?;
        self.unlink(handle);
        let node = self.slots[handle].take()?;
        self.free.push(handle);
        self.len -= 1;
        Some(node.item)
    }

    // == Move To Front ==
    /// Marks the node at `handle` as most recently used.
    pub fn move_to_front(&mut self, handle: Handle) {
        if self.head == Some(handle) || self.get(handle).is_none() {
            return;
        }
        self.unlink(handle);
        let old_head = self.head;
        {
            let node = self.node_mut(handle);
            node.prev = None;
            node.next = old_head;
        }
        if let Some(old_head) = old_head {
            self.node_mut(old_head).prev = Some(handle);
        }
        self.head = Some(handle);
        if self.tail.is_none() {
            self.tail = Some(handle);
        }
    }

    // == Pop Back ==
    /// Removes and returns the least recently used item.
    ///
    /// Returns None if the list is empty.
    pub fn pop_back(&mut self) -> Option<T> {
        let tail = self.tail?;
        self.remove(tail)
    }

    // == Back ==
    /// Handle of the least recently used node.
    pub fn back(&self) -> Option<Handle> {
        self.tail
    }

    /// Handle of the most recently used node.
    pub fn front(&self) -> Option<Handle> {
        self.head
    }

    /// Returns the item stored at `handle`, if the slot is occupied.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle)?.as_ref().map(|node| &node.item)
    }

    /// Mutable access to the item at `handle`.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle)?
            .as_mut()
            .map(|node| &mut node.item)
    }

    // == Length ==
    /// Returns the number of linked items.
    pub fn len(&self) -> usize {
        self.len
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of arena slots, occupied or free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Iterates items from most to least recently used.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    fn unlink(&mut self, handle: Handle) {
        let (prev, next) = {
            let node = self.node_mut(handle);
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }

    // Only called with handles reachable from head/tail or verified occupied.
    fn node_mut(&mut self, handle: Handle) -> &mut Node<T> {
        match self.slots[handle].as_mut() {
            Some(node) => node,
            None => unreachable!("linked handle {handle} points at a vacant slot"),
        }
    }
}

// == Iterator ==
/// MRU to LRU iterator over an [`LruList`].
pub struct Iter<'a, T> {
    list: &'a LruList<T>,
    cursor: Option<Handle>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.cursor?;
        let node = self.list.slots[handle].as_ref()?;
        self.cursor = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some(&node.item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
