// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Slab-backed intrusive lists shared by the eviction policies.
//!
//! Entries live in a single [`Slab`] and are threaded onto one or more [`List`]s through
//! index links. Keeping the links in the slab lets a policy move an entry between lists
//! (T1 to T2, T1 to B1, ...) in O(1) without reallocating it.

/// Index of a node slot inside a [`Slab`].
pub(crate) type NodeIndex = usize;

/// Sentinel value indicating no node.
const NULL_INDEX: NodeIndex = NodeIndex::MAX;

#[derive(Debug)]
struct Node<T> {
    item: Option<T>,
    prev: NodeIndex,
    next: NodeIndex,
}

/// Storage for list nodes with a free list for slot reuse.
#[derive(Debug)]
pub(crate) struct Slab<T> {
    nodes: Vec<Node<T>>,
    free_head: NodeIndex,
}

impl<T> Slab<T> {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_head: NULL_INDEX,
        }
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free_head: NULL_INDEX,
        }
    }

    /// Stores `item` in a free slot, growing the slab when none is available.
    pub(crate) fn insert(&mut self, item: T) -> NodeIndex {
        let node = Node {
            item: Some(item),
            prev: NULL_INDEX,
            next: NULL_INDEX,
        };

        if self.free_head == NULL_INDEX {
            self.nodes.push(node);
            return self.nodes.len() - 1;
        }

        let idx = self.free_head;
        self.free_head = self.nodes[idx].next;
        self.nodes[idx] = node;
        idx
    }

    /// Releases the slot at `idx` and returns its item.
    ///
    /// The node must already be unlinked from its list.
    pub(crate) fn remove(&mut self, idx: NodeIndex) -> Option<T> {
        let node = self.nodes.get_mut(idx)?;
        let item = node.item.take()?;
        node.prev = NULL_INDEX;
        node.next = self.free_head;
        self.free_head = idx;
        Some(item)
    }

    pub(crate) fn get(&self, idx: NodeIndex) -> Option<&T> {
        self.nodes.get(idx).and_then(|node| node.item.as_ref())
    }

    pub(crate) fn get_mut(&mut self, idx: NodeIndex) -> Option<&mut T> {
        self.nodes.get_mut(idx).and_then(|node| node.item.as_mut())
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.free_head = NULL_INDEX;
    }
}

/// A doubly-linked list whose nodes live in a [`Slab`].
///
/// The head is the most recently used end, the tail the least recently used.
#[derive(Debug, Clone, Copy)]
pub(crate) struct List {
    head: NodeIndex,
    tail: NodeIndex,
    len: usize,
}

impl List {
    pub(crate) const fn new() -> Self {
        Self {
            head: NULL_INDEX,
            tail: NULL_INDEX,
            len: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the least recently used node.
    pub(crate) fn back(&self) -> Option<NodeIndex> {
        (self.tail != NULL_INDEX).then_some(self.tail)
    }

    pub(crate) fn push_front<T>(&mut self, slab: &mut Slab<T>, idx: NodeIndex) {
        let old_head = self.head;
        {
            let node = &mut slab.nodes[idx];
            node.prev = NULL_INDEX;
            node.next = old_head;
        }

        if old_head == NULL_INDEX {
            self.tail = idx;
        } else {
            slab.nodes[old_head].prev = idx;
        }

        self.head = idx;
        self.len += 1;
    }

    pub(crate) fn unlink<T>(&mut self, slab: &mut Slab<T>, idx: NodeIndex) {
        let (prev, next) = {
            let node = &slab.nodes[idx];
            (node.prev, node.next)
        };

        if prev == NULL_INDEX {
            self.head = next;
        } else {
            slab.nodes[prev].next = next;
        }

        if next == NULL_INDEX {
            self.tail = prev;
        } else {
            slab.nodes[next].prev = prev;
        }

        let node = &mut slab.nodes[idx];
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;
        self.len -= 1;
    }

    pub(crate) fn move_to_front<T>(&mut self, slab: &mut Slab<T>, idx: NodeIndex) {
        if self.head != idx {
            self.unlink(slab, idx);
            self.push_front(slab, idx);
        }
    }

    /// Unlinks and returns the least recently used node.
    pub(crate) fn pop_back<T>(&mut self, slab: &mut Slab<T>) -> Option<NodeIndex> {
        let idx = self.back()?;
        self.unlink(slab, idx);
        Some(idx)
    }

    /// Iterates node indices from most to least recently used.
    pub(crate) fn iter<'a, T>(&self, slab: &'a Slab<T>) -> ListIter<'a, T> {
        ListIter {
            slab,
            cursor: self.head,
        }
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct ListIter<'a, T> {
    slab: &'a Slab<T>,
    cursor: NodeIndex,
}

impl<T> Iterator for ListIter<'_, T> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NULL_INDEX {
            return None;
        }
        let idx = self.cursor;
        self.cursor = self.slab.nodes[idx].next;
        Some(idx)
    }
}
