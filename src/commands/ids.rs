use std::collections::HashSet;

/// Identifier of a group or command, unique within one catalog load
pub type NodeId = u64;

/// Hands out node IDs for a single catalog load.
///
/// IDs written in the source are claimed up front so that automatically
/// assigned IDs skip them.
#[derive(Debug)]
pub struct IdCounter {
    next: NodeId,
    claimed: HashSet<NodeId>,
}

impl IdCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 1,
            claimed: HashSet::new(),
        }
    }

    /// Reserve an explicit ID. Returns `false` if it was already taken.
    pub fn claim(&mut self, id: NodeId) -> bool {
        self.claimed.insert(id)
    }

    /// Next unclaimed ID, counting up from 1.
    pub fn next_id(&mut self) -> NodeId {
        while self.claimed.contains(&self.next) {
            self.next += 1;
        }
        let id = self.next;
        self.claimed.insert(id);
        self.next += 1;
        id
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new()
    }
}
