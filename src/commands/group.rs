use crate::commands::ids::NodeId;
use crate::commands::node::CommandNode;

/// Hierarchical grouping of related commands
#[derive(Debug, Clone, Default)]
pub struct CommandGroup {
    pub id: NodeId,
    pub name: String,
    pub label: String,
    pub description: String,
    pub children: Vec<CommandNode>,
}

