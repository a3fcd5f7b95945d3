// id.rs — Stable node identifiers for the Beacon node graph
//
// Node identities are arena indices handed out in construction order. A
// binder run starts a fresh allocator, so the same source always yields the
// same ids (and therefore the same generated variable names).

use std::fmt;

/// Identity of a bound node: its index in the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocator for node ids. Produces monotonically increasing ids in
/// allocation order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn count(&self) -> usize {
        self.next as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_sequential() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.alloc(), NodeId(0));
        assert_eq!(ids.alloc(), NodeId(1));
        assert_eq!(ids.count(), 2);
    }
}
