use super::replacer::{FrameId, Replacer};

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    prev: Option<FrameId>,
    next: Option<FrameId>,
    linked: bool,
}

/// Least-recently-used replacer.
///
/// An intrusive doubly linked list threaded through a node table indexed by
/// frame id: the head is the least recently used frame, the tail the most
/// recent. Access and removal are O(1); eviction walks from the head past
/// frames the caller refuses.
#[derive(Debug)]
pub struct LruReplacer {
    nodes: Vec<Node>,
    head: Option<FrameId>,
    tail: Option<FrameId>,
    len: usize,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: vec![Node::default(); capacity],
            head: None,
            tail: None,
            len: 0,
        }
    }

    fn node_mut(&mut self, frame_id: FrameId) -> &mut Node {
        if frame_id >= self.nodes.len() {
            self.nodes.resize(frame_id + 1, Node::default());
        }
        &mut self.nodes[frame_id]
    }

    fn unlink(&mut self, frame_id: FrameId) {
        let node = self.nodes[frame_id];
        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
        self.nodes[frame_id] = Node::default();
        self.len -= 1;
    }

    fn push_back(&mut self, frame_id: FrameId) {
        let tail = self.tail;
        *self.node_mut(frame_id) = Node {
            prev: tail,
            next: None,
            linked: true,
        };
        match tail {
            Some(tail) => self.nodes[tail].next = Some(frame_id),
            None => self.head = Some(frame_id),
        }
        self.tail = Some(frame_id);
        self.len += 1;
    }

    fn is_linked(&self, frame_id: FrameId) -> bool {
        self.nodes.get(frame_id).is_some_and(|n| n.linked)
    }

    /// Tracked frames from least to most recently used.
    pub fn order(&self) -> Vec<FrameId> {
        let mut order = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(frame_id) = cursor {
            order.push(frame_id);
            cursor = self.nodes[frame_id].next;
        }
        order
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if self.is_linked(frame_id) {
            if self.tail == Some(frame_id) {
                return;
            }
            self.unlink(frame_id);
        }
        self.push_back(frame_id);
    }

    fn evict(&mut self, evictable: &dyn Fn(FrameId) -> bool) -> Option<FrameId> {
        let mut cursor = self.head;
        while let Some(frame_id) = cursor {
            if evictable(frame_id) {
                self.unlink(frame_id);
                return Some(frame_id);
            }
            cursor = self.nodes[frame_id].next;
        }
        None
    }

    fn remove(&mut self, frame_id: FrameId) {
        if self.is_linked(frame_id) {
            self.unlink(frame_id);
        }
    }

    fn size(&self) -> usize {
        self.len
    }
}
