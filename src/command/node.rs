use super::{
    CallbackCommand, Command, ContextualCommand, ContextualDeleteCommand, DeleteCommand,
    InsertCommand, TransactionalCommand, UpdateCommand,
};
use std::sync::Arc;

/// The "nothing to do" command. Composites and transactions drop it on add,
/// so callers can return it instead of special-casing an empty result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullCommand;

/// One node of a command graph.
#[derive(Clone)]
pub enum CommandNode {
    Null,
    Leaf(Arc<dyn Command>),
    Composite(TransactionalCommand),
}

impl CommandNode {
    pub fn leaf(command: impl Command + 'static) -> Self {
        CommandNode::Leaf(Arc::new(command))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CommandNode::Null)
    }

    /// Contextual view of this node; composites are always contextual
    pub fn as_contextual(&self) -> Option<&dyn ContextualCommand> {
        match self {
            CommandNode::Null => None,
            CommandNode::Leaf(command) => command.as_contextual(),
            CommandNode::Composite(composite) => Some(composite as &dyn ContextualCommand),
        }
    }

    /// Depth-first leaves of this node, in add order
    pub fn flatten(&self) -> Vec<Arc<dyn Command>> {
        let mut leaves = Vec::new();
        self.flatten_into(&mut leaves);
        leaves
    }

    pub(crate) fn flatten_into(&self, leaves: &mut Vec<Arc<dyn Command>>) {
        match self {
            CommandNode::Null => {}
            CommandNode::Leaf(command) => leaves.push(command.clone()),
            CommandNode::Composite(composite) => {
                for child in composite.children() {
                    child.flatten_into(leaves);
                }
            }
        }
    }
}

impl std::fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandNode::Null => write!(f, "Null"),
            CommandNode::Leaf(command) => write!(f, "Leaf({})", command.label()),
            CommandNode::Composite(composite) => write!(f, "Composite({})", composite.child_count()),
        }
    }
}

impl From<NullCommand> for CommandNode {
    fn from(_: NullCommand) -> Self {
        CommandNode::Null
    }
}

impl From<TransactionalCommand> for CommandNode {
    fn from(composite: TransactionalCommand) -> Self {
        CommandNode::Composite(composite)
    }
}

impl From<Arc<dyn Command>> for CommandNode {
    fn from(command: Arc<dyn Command>) -> Self {
        CommandNode::Leaf(command)
    }
}

macro_rules! leaf_from {
    ($($command:ty),+) => {
        $(
            impl From<$command> for CommandNode {
                fn from(command: $command) -> Self {
                    CommandNode::Leaf(Arc::new(command))
                }
            }
        )+
    };
}

leaf_from!(
    InsertCommand,
    UpdateCommand,
    DeleteCommand,
    ContextualDeleteCommand,
    CallbackCommand
);
