use crate::command::CommandNode;
use crate::core::Result;

/// Entity able to describe its own pending writes as a command graph.
///
/// Implementors usually return a [`TransactionalCommand`](crate::command::TransactionalCommand)
/// whose leading child is the record's own insert or update, with relation
/// commands around it. A record with nothing to write may return
/// [`CommandNode::Null`].
///
/// Records typically register `on_complete` callbacks to adopt their new
/// primary key and `on_rollback` callbacks to restore their previous state.
pub trait Persistable {
    /// Queue an insert or update, optionally followed by relation commands
    fn queue_store(&mut self, queue_relations: bool) -> Result<CommandNode>;

    /// Queue deletion of the record
    fn queue_delete(&mut self) -> Result<CommandNode>;
}
