use std::sync::Arc;

use crate::commands::command::Command;
use crate::commands::group::CommandGroup;
use crate::commands::ids::NodeId;

/// A catalog tree node: either a group of nodes or a runnable command
#[derive(Debug, Clone)]
pub enum CommandNode {
    Group(CommandGroup),
    Command(Arc<Command>),
}

impl CommandNode {
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            CommandNode::Group(group) => group.id,
            CommandNode::Command(cmd) => cmd.id,
        }
    }

    /// Depth-first search for the node with `id`, this node included.
    #[must_use]
    pub fn find(&self, id: NodeId) -> Option<&CommandNode> {
        if self.id() == id {
            return Some(self);
        }
        match self {
            CommandNode::Group(group) => find_in(&group.children, id),
            CommandNode::Command(_) => None,
        }
    }
}

/// Depth-first search over a list of sibling nodes; the first match wins.
#[must_use]
pub fn find_in(nodes: &[CommandNode], id: NodeId) -> Option<&CommandNode> {
    nodes.iter().find_map(|node| node.find(id))
}
