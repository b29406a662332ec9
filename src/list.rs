//! # Intrusive List
//!
//! Circular doubly-linked lists threaded through a fixed arena of links.
//!
//! Every node is a slot in a [`LinkArena`] addressed by [`NodeId`]. A list
//! is named by a *head* node (a sentinel that never carries data); the
//! list is empty when the head's successor is the head itself. Nodes that
//! are not in any list point to themselves, so "is this node queued?" is a
//! single comparison and removing an unlinked node is a no-op.
//!
//! ```text
//!        ┌──────────────────────────────────────────┐
//!        ▼                                          │
//!   ┌────────┐ next ┌────────┐ next ┌────────┐ next │
//!   │  head  │ ───► │ node a │ ───► │ node b │ ─────┘
//!   └────────┘ ◄─── └────────┘ ◄─── └────────┘
//!        │     prev             prev     ▲
//!        └───────────────────────────────┘ prev
//! ```
//!
//! The scheduler owns one arena holding task nodes followed by the heads
//! of the free pool, the immediate queue and every mutex wait list, so
//! moving a task between queues never copies it.
//!
//! The arena is not synchronized. Callers that share it with an interrupt
//! handler must hold a critical section for the duration of each call.

/// Index of a node in a [`LinkArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u16);

impl NodeId {
    /// Node at `index`.
    pub const fn new(index: usize) -> Self {
        assert!(index <= u16::MAX as usize, "node index out of range");
        Self(index as u16)
    }

    /// Arena index of this node.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    prev: NodeId,
    next: NodeId,
}

impl Link {
    const fn unlinked(node: NodeId) -> Self {
        Self { prev: node, next: node }
    }
}

/// Fixed-size arena of list links.
pub struct LinkArena<const N: usize> {
    links: [Link; N],
}

impl<const N: usize> LinkArena<N> {
    /// Create an arena where every node is self-linked (an empty list, or
    /// an unlinked node, depending on how the caller uses it).
    pub const fn new() -> Self {
        let mut links = [Link::unlinked(NodeId(0)); N];
        let mut i = 0;
        while i < N {
            links[i] = Link::unlinked(NodeId::new(i));
            i += 1;
        }
        Self { links }
    }

    /// Number of nodes in the arena.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Make `node` its own head: an empty list, or an unlinked node.
    ///
    /// Does not touch neighbours; use [`remove`](Self::remove) to take a
    /// node out of a list.
    #[inline]
    pub fn init(&mut self, node: NodeId) {
        self.links[node.index()] = Link::unlinked(node);
    }

    /// True if the list headed by `head` has no members.
    #[inline]
    pub fn is_empty(&self, head: NodeId) -> bool {
        self.links[head.index()].next == head
    }

    /// True if `node` currently sits in some list.
    #[inline]
    pub fn is_linked(&self, node: NodeId) -> bool {
        self.links[node.index()].next != node
    }

    /// Successor of `node` (the node itself if unlinked).
    #[inline]
    pub fn next(&self, node: NodeId) -> NodeId {
        self.links[node.index()].next
    }

    /// Predecessor of `node` (the node itself if unlinked).
    #[inline]
    pub fn prev(&self, node: NodeId) -> NodeId {
        self.links[node.index()].prev
    }

    fn splice(&mut self, node: NodeId, prev: NodeId, next: NodeId) {
        debug_assert!(!self.is_linked(node), "node is already in a list");
        self.links[next.index()].prev = node;
        self.links[node.index()] = Link { prev, next };
        self.links[prev.index()].next = node;
    }

    /// Insert `node` right after `head`.
    ///
    /// `node` must not be a member of any list; remove it first.
    pub fn add_at_front(&mut self, head: NodeId, node: NodeId) {
        let next = self.next(head);
        self.splice(node, head, next);
    }

    /// Insert `node` right before `head` (the tail of the list).
    ///
    /// `node` must not be a member of any list; remove it first.
    pub fn add_at_rear(&mut self, head: NodeId, node: NodeId) {
        let prev = self.prev(head);
        self.splice(node, prev, head);
    }

    /// Unlink `node` from whatever list holds it and leave it self-linked.
    /// Calling this on an unlinked node does nothing.
    pub fn remove(&mut self, node: NodeId) {
        let Link { prev, next } = self.links[node.index()];
        self.links[next.index()].prev = prev;
        self.links[prev.index()].next = next;
        self.init(node);
    }

    /// Remove and return the first member, or `None` if empty.
    pub fn remove_front(&mut self, head: NodeId) -> Option<NodeId> {
        if self.is_empty(head) {
            return None;
        }
        let node = self.next(head);
        self.remove(node);
        Some(node)
    }

    /// Remove and return the last member, or `None` if empty.
    pub fn remove_rear(&mut self, head: NodeId) -> Option<NodeId> {
        if self.is_empty(head) {
            return None;
        }
        let node = self.prev(head);
        self.remove(node);
        Some(node)
    }

    /// First member (in list order) for which `pred` holds.
    pub fn find<P>(&self, head: NodeId, mut pred: P) -> Option<NodeId>
    where
        P: FnMut(NodeId) -> bool,
    {
        self.iter(head).find(|&node| pred(node))
    }

    /// Call `f` on every member.
    ///
    /// The successor is captured before `f` runs, so `f` may remove the
    /// node it was handed (but no other member of the same list).
    pub fn each<F>(&mut self, head: NodeId, f: F)
    where
        F: FnMut(&mut Self, NodeId),
    {
        self.each_if(head, |_, _| true, f);
    }

    /// Call `f` on every member for which `pred` holds, with the same
    /// removal rule as [`each`](Self::each).
    pub fn each_if<P, F>(&mut self, head: NodeId, mut pred: P, mut f: F)
    where
        P: FnMut(&Self, NodeId) -> bool,
        F: FnMut(&mut Self, NodeId),
    {
        let mut pos = self.next(head);
        while pos != head {
            let next = self.next(pos);
            if pred(&*self, pos) {
                f(self, pos);
            }
            pos = next;
        }
    }

    /// Iterate members front to rear.
    pub fn iter(&self, head: NodeId) -> Iter<'_, N> {
        Iter {
            arena: self,
            head,
            pos: self.next(head),
        }
    }

    /// Number of members. O(n).
    pub fn len(&self, head: NodeId) -> usize {
        self.iter(head).count()
    }

    /// True if `node` is a member of the list headed by `head`. O(n).
    pub fn contains(&self, head: NodeId, node: NodeId) -> bool {
        self.find(head, |n| n == node).is_some()
    }

    /// Walk the list headed by `head` and check that every `next`/`prev`
    /// pair is mutually inverse and that the walk returns to `head`.
    pub fn is_consistent(&self, head: NodeId) -> bool {
        let mut pos = head;
        for _ in 0..=N {
            let next = self.next(pos);
            if self.prev(next) != pos {
                return false;
            }
            if next == head {
                return true;
            }
            pos = next;
        }
        // longer than the arena: the walk never closed
        false
    }
}

impl<const N: usize> Default for LinkArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Front-to-rear iterator over the members of one list.
pub struct Iter<'a, const N: usize> {
    arena: &'a LinkArena<N>,
    head: NodeId,
    pos: NodeId,
}

impl<const N: usize> Iterator for Iter<'_, N> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.pos == self.head {
            return None;
        }
        let node = self.pos;
        self.pos = self.arena.next(node);
        Some(node)
    }
}
