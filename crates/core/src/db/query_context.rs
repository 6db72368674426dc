use std::collections::HashSet;

use sqlfake_lib::row::RowKey;

/// Request-scoped execution flags and state, injected into every statement.
///
/// Constructed at request entry and dropped (or [`reset`](Self::reset)) at
/// request exit. The dirty row-id set grows as rows are written and is
/// consulted by the replica guard in `apply_where`: a replica read that
/// would surface a row written earlier in the same request fails instead of
/// returning possibly-stale data.
#[derive(Debug, Default, Clone)]
pub struct QueryContext {
    pub use_replica: bool,
    pub in_request: bool,
    pub prevent_replica_reads_after_writes: bool,
    /// Emulate a server that does not enforce unique constraints.
    pub relax_unique_constraints: bool,
    /// Strict SQL mode: schema coercion errors instead of best-effort casts.
    pub strict_schema: bool,
    /// The SQL text of the statement being executed, for error messages.
    pub query: Option<String>,
    /// Primary keys written during this request.
    pub dirty_row_ids: HashSet<RowKey>,
}

impl QueryContext {
    pub fn new() -> Self {
        QueryContext::default()
    }

    pub fn for_testing() -> Self {
        QueryContext {
            in_request: true,
            strict_schema: true,
            ..QueryContext::default()
        }
    }

    pub fn guards_replica_reads(&self) -> bool {
        self.use_replica && self.in_request && self.prevent_replica_reads_after_writes
    }

    /// Records a written primary key. Only tracked while inside a request.
    pub fn record_dirty(&mut self, key: RowKey) {
        if self.in_request {
            self.dirty_row_ids.insert(key);
        }
    }

    /// Request exit: forget the statement text and the dirty set.
    pub fn reset(&mut self) {
        self.query = None;
        self.dirty_row_ids.clear();
    }

    pub(crate) fn query_for_error(&self) -> String {
        self.query.clone().unwrap_or_default()
    }
}
