use sqlfake_lib::row::{Dataset, Row, RowKey};
use sqlfake_lib::schema::TableSchema;

use crate::db::connection::Connection;
use crate::db::index_refs::compute_index_keys;
use crate::db::integrity::{check_unique_constraints, coerce_to_schema};
use crate::db::query_context::QueryContext;
use crate::error::{DbError, IndexError};
use crate::query::ast::InsertStatement;
use crate::query::plan::{all_applicable_indexes, apply_set, parse_table_name, snapshot, SetParams};

impl InsertStatement {
    /// Executes against `conn`, returning the number of rows written.
    #[tracing::instrument(skip_all, fields(table = %self.table))]
    pub fn execute(&self, conn: &Connection, ctx: &mut QueryContext) -> Result<u64, DbError> {
        ctx.query = Some(self.to_string());
        let (database, table) = parse_table_name(conn, &self.table)?;
        let (data, schema) = snapshot(conn, &database, &table)?;

        let applicable = schema
            .as_ref()
            .map(all_applicable_indexes)
            .unwrap_or_default();
        let mut rows = data.rows;
        let mut index_refs = data.index_refs;
        let mut write_count = 0u64;

        for input in &self.rows {
            let row = match &schema {
                Some(schema) => coerce_to_schema(input, schema, ctx.strict_schema)?,
                None => input.clone(),
            };
            let row_id = row_id_for(&row, schema.as_ref(), &rows);

            if let Some(schema) = &schema {
                if let Some(violation) = check_unique_constraints(&rows, &row, schema, None) {
                    if let Some(assignments) = &self.on_duplicate {
                        // Funnel the conflicting row through the shared SET
                        // core, exposing the would-be-inserted values to
                        // `VALUES(col)`.
                        let existing_id = violation.existing_row_id;
                        let mut conflicting = Dataset::new();
                        if let Some(existing) = rows.get(&existing_id) {
                            conflicting.insert(existing_id.clone(), existing.clone());
                        }
                        let (count, new_rows, new_refs) = apply_set(
                            ctx,
                            SetParams {
                                conn,
                                database: &database,
                                table: &table,
                                filtered_rows: conflicting,
                                original_table: rows,
                                index_refs,
                                assignments,
                                schema: Some(schema),
                                values: Some(&row),
                                ignore_dupes: false,
                            },
                        )?;
                        rows = new_rows;
                        index_refs = new_refs;
                        write_count += count;
                        continue;
                    }
                    if self.ignore {
                        continue;
                    }
                    return Err(IndexError::UniqueConstraintViolation {
                        constraint_name: violation.constraint_name,
                        table_name: table.clone(),
                        value: violation.value,
                    }
                    .into());
                }
            }

            for entry in compute_index_keys(&applicable, &row) {
                index_refs.add(&entry.index, &entry.path, entry.store_as_unique, row_id.clone());
            }
            ctx.record_dirty(row_id.clone());
            rows.insert(row_id, row);
            write_count += 1;
        }

        conn.server()
            .lock()
            .save_table(&database, &table, rows, index_refs)?;
        Ok(write_count)
    }
}

/// The dataset key for a new row: the single-column primary key value when
/// the schema has one, otherwise the next synthetic integer id.
fn row_id_for(row: &Row, schema: Option<&TableSchema>, existing: &Dataset) -> RowKey {
    if let Some(col) = schema.and_then(TableSchema::primary_single_column) {
        if let Some(value) = row.get(col).filter(|v| !v.is_null()) {
            return RowKey::from(value);
        }
    }
    let next = existing
        .keys()
        .filter_map(|key| match key {
            RowKey::Int(i) => Some(*i),
            RowKey::Str(_) => None,
        })
        .max()
        .unwrap_or(0)
        + 1;
    RowKey::Int(next)
}
