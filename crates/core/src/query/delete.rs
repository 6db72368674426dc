use crate::db::connection::Connection;
use crate::db::index_refs::compute_index_keys;
use crate::db::query_context::QueryContext;
use crate::error::DbError;
use crate::query::ast::DeleteStatement;
use crate::query::plan::{
    all_applicable_indexes, apply_limit, apply_order_by, apply_where, parse_table_name,
    snapshot, PlannerHints,
};

impl DeleteStatement {
    /// Executes against `conn`, returning the number of rows deleted.
    #[tracing::instrument(skip_all, fields(table = %self.table))]
    pub fn execute(&self, conn: &Connection, ctx: &mut QueryContext) -> Result<u64, DbError> {
        ctx.query = Some(self.to_string());
        let (database, table) = parse_table_name(conn, &self.table)?;
        let (data, schema) = snapshot(conn, &database, &table)?;

        let hints = schema.as_ref().map(PlannerHints::from_schema);
        let filtered = apply_where(
            ctx,
            self.where_clause.as_ref(),
            data.rows.clone(),
            &data.index_refs,
            hints,
        )?;
        let filtered = apply_order_by(filtered, &self.order_by)?;
        let filtered = apply_limit(filtered, self.limit.as_ref());

        let applicable = schema
            .as_ref()
            .map(all_applicable_indexes)
            .unwrap_or_default();
        let mut rows = data.rows;
        let mut index_refs = data.index_refs;
        let mut delete_count = 0u64;
        for (row_id, row) in filtered {
            if rows.shift_remove(&row_id).is_none() {
                continue;
            }
            for entry in compute_index_keys(&applicable, &row) {
                index_refs.remove(&entry.index, &entry.path, entry.store_as_unique, &row_id);
            }
            ctx.record_dirty(row_id);
            delete_count += 1;
        }

        conn.server()
            .lock()
            .save_table(&database, &table, rows, index_refs)?;
        Ok(delete_count)
    }
}
