// ============================================================================
// Transaction Executor
// ============================================================================
//
// Runs a command graph as one unit of work:
// - flattens top-level commands into leaves (depth-first, add order)
// - groups them by driver and opens at most one native transaction per driver
// - executes in order, unwinding in reverse on the first failure
// - commits, then completes every command in order
//
// ============================================================================

pub mod executor;
pub mod record;

pub use executor::Transaction;
pub use record::Persistable;
