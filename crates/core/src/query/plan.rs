//! The execution plan base shared by every statement: WHERE filtering with
//! optional index narrowing, MySQL-conformant ORDER BY, LIMIT slicing,
//! table-name resolution, and the SET core shared by UPDATE and
//! `INSERT ... ON DUPLICATE KEY UPDATE`.

use core::cmp::Ordering;

use sqlfake_lib::expr::{EvalContext, Expr};
use sqlfake_lib::row::{Dataset, Row, RowKey};
use sqlfake_lib::schema::{ColumnDef, IndexDef, TableSchema};
use sqlfake_lib::value::Value;

use crate::db::connection::Connection;
use crate::db::index_refs::{compute_index_keys, ApplicableIndex, IndexRefs};
use crate::db::integrity::{check_unique_constraints, coerce_to_schema};
use crate::db::query_context::QueryContext;
use crate::db::server::TableData;
use crate::error::{DbError, IndexError, ReplicaError, TableError};
use crate::query::ast::{Assignment, Limit, OrderByRule, OrderDirection};

/// Hints handed to [`apply_where`]: the table's columns and the indexes the
/// planner may probe. Absent for schemaless tables, which always scan.
#[derive(Clone, Copy)]
pub struct PlannerHints<'a> {
    pub columns: &'a [ColumnDef],
    pub indexes: &'a [IndexDef],
}

impl<'a> PlannerHints<'a> {
    pub fn from_schema(schema: &'a TableSchema) -> Self {
        PlannerHints {
            columns: &schema.fields,
            indexes: &schema.indexes,
        }
    }
}

/// Filters `dataset` by the WHERE clause, narrowing through indexes first
/// when hints allow, then enforcing the replica-after-write guard.
#[tracing::instrument(skip_all)]
pub fn apply_where(
    ctx: &QueryContext,
    where_clause: Option<&Expr>,
    dataset: Dataset,
    index_refs: &IndexRefs,
    hints: Option<PlannerHints<'_>>,
) -> Result<Dataset, DbError> {
    let Some(clause) = where_clause else {
        return Ok(dataset);
    };

    let (narrowed, all_matched) = match hints {
        Some(hints) => {
            crate::query::planner::filter_with_indexes(dataset, index_refs, &hints, clause)?
        }
        None => (dataset, false),
    };

    let filtered = if all_matched {
        narrowed
    } else {
        let mut kept = Dataset::with_capacity(narrowed.len());
        for (row_id, row) in narrowed {
            if clause.evaluate(&EvalContext::new(&row))?.is_truthy() {
                kept.insert(row_id, row);
            }
        }
        kept
    };

    if ctx.guards_replica_reads() {
        if let Some(dirty) = filtered.keys().find(|k| ctx.dirty_row_ids.contains(*k)) {
            tracing::debug!(row_id = %dirty, "replica read of a row written in this request");
            return Err(ReplicaError::ReadAfterWrite {
                query: ctx.query_for_error(),
            }
            .into());
        }
    }
    Ok(filtered)
}

/// Reorders `dataset` by the ORDER BY rules. Numeric pairs compare as
/// floats, everything else as strings; ties keep their pre-sort relative
/// order. Row-ids survive as dataset keys so UPDATE/DELETE can still
/// address rows after ordering.
pub fn apply_order_by(dataset: Dataset, rules: &[OrderByRule]) -> Result<Dataset, DbError> {
    if rules.is_empty() {
        return Ok(dataset);
    }

    // A bare column reference may reach across joined tables without a
    // schema lookup.
    let fallthrough: Vec<bool> = rules
        .iter()
        .map(|rule| matches!(&rule.expr, Expr::Column(c) if c.table.is_none()))
        .collect();

    let mut keyed: Vec<(usize, RowKey, Row, Vec<Value>)> = Vec::with_capacity(dataset.len());
    for (ordinal, (row_id, row)) in dataset.into_iter().enumerate() {
        let mut sort_keys = Vec::with_capacity(rules.len());
        for (rule, &fall) in rules.iter().zip(&fallthrough) {
            let mut ctx = EvalContext::new(&row);
            if fall {
                ctx = ctx.with_fallthrough();
            }
            sort_keys.push(rule.expr.evaluate(&ctx)?);
        }
        keyed.push((ordinal, row_id, row, sort_keys));
    }

    keyed.sort_by(|a, b| {
        for (rule, (ka, kb)) in rules.iter().zip(a.3.iter().zip(&b.3)) {
            let ord = match rule.direction {
                OrderDirection::Asc => ka.compare(kb),
                OrderDirection::Desc => ka.compare(kb).reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        // Stable tie-break on the pre-sort ordinal.
        a.0.cmp(&b.0)
    });

    Ok(keyed.into_iter().map(|(_, id, row, _)| (id, row)).collect())
}

/// Slices the dataset's keys `[offset, offset + row_count)` in current
/// order.
pub fn apply_limit(dataset: Dataset, limit: Option<&Limit>) -> Dataset {
    match limit {
        None => dataset,
        Some(limit) => dataset
            .into_iter()
            .skip(limit.offset)
            .take(limit.row_count)
            .collect(),
    }
}

/// `"db.table"` resolves as written; a bare `"table"` resolves against the
/// connection's current database.
pub fn parse_table_name(conn: &Connection, name: &str) -> Result<(String, String), DbError> {
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(table), None, _) => {
            let db = conn
                .current_database()
                .ok_or_else(|| TableError::NoDatabaseSelected(name.to_owned()))?;
            Ok((db.to_owned(), table.to_owned()))
        }
        (Some(db), Some(table), None) if !db.is_empty() && !table.is_empty() => {
            Ok((db.to_owned(), table.to_owned()))
        }
        _ => Err(TableError::InvalidName(name.to_owned()).into()),
    }
}

/// Clones out a table's state and schema for one statement's execution.
pub(crate) fn snapshot(
    conn: &Connection,
    db: &str,
    table: &str,
) -> Result<(TableData, Option<TableSchema>), DbError> {
    conn.server().lock().snapshot(db, table)
}

/// Every index whose fields intersect the assigned columns, plus all
/// indexes when the primary key changed. Sharding configuration appends
/// its synthetic structurally-unique entry over the sharding key.
fn applicable_indexes(
    schema: &TableSchema,
    assigned: &[&str],
    primary_key_changed: bool,
) -> Vec<ApplicableIndex> {
    let mut out: Vec<ApplicableIndex> = schema
        .indexes
        .iter()
        .filter(|def| {
            primary_key_changed || def.fields.iter().any(|f| assigned.contains(&f.as_str()))
        })
        .map(ApplicableIndex::from_def)
        .collect();
    if let Some(sharding) = &schema.vitess_sharding {
        out.push(ApplicableIndex::sharding(
            &sharding.keyspace,
            &sharding.sharding_key,
        ));
    }
    out
}

/// The full applicable set, used by INSERT and DELETE which touch every
/// index.
pub(crate) fn all_applicable_indexes(schema: &TableSchema) -> Vec<ApplicableIndex> {
    let mut out: Vec<ApplicableIndex> = schema
        .indexes
        .iter()
        .map(ApplicableIndex::from_def)
        .collect();
    if let Some(sharding) = &schema.vitess_sharding {
        out.push(ApplicableIndex::sharding(
            &sharding.keyspace,
            &sharding.sharding_key,
        ));
    }
    out
}

/// Arguments for [`apply_set`].
pub struct SetParams<'a> {
    pub conn: &'a Connection,
    pub database: &'a str,
    pub table: &'a str,
    /// Rows to mutate, in apply order (already filtered/ordered/limited).
    pub filtered_rows: Dataset,
    /// The full current table snapshot.
    pub original_table: Dataset,
    pub index_refs: IndexRefs,
    pub assignments: &'a [Assignment],
    pub schema: Option<&'a TableSchema>,
    /// The row that would have been inserted; read by `VALUES(col)` during
    /// `ON DUPLICATE KEY UPDATE`.
    pub values: Option<&'a Row>,
    /// Skip rows whose update would violate a unique key.
    pub ignore_dupes: bool,
}

/// The mutation core shared by UPDATE and `INSERT ... ON DUPLICATE KEY
/// UPDATE`: applies the SET clause row by row, reconciles index refs,
/// enforces uniqueness, records dirty primary keys, and publishes the new
/// snapshot. Returns the update count with the new table state.
#[tracing::instrument(skip_all, fields(table = params.table))]
pub fn apply_set(
    ctx: &mut QueryContext,
    params: SetParams<'_>,
) -> Result<(u64, Dataset, IndexRefs), DbError> {
    let SetParams {
        conn,
        database,
        table,
        filtered_rows,
        mut original_table,
        mut index_refs,
        assignments,
        schema,
        values,
        ignore_dupes,
    } = params;

    if let Some(schema) = schema {
        for assignment in assignments {
            if schema.field(&assignment.column.column).is_none() {
                return Err(TableError::ColumnNotFound(
                    table.to_owned(),
                    assignment.column.column.clone(),
                )
                .into());
            }
        }
    }

    let assigned: Vec<&str> = assignments
        .iter()
        .map(|a| a.column.column.as_str())
        .collect();
    let pk_fields: &[String] = schema
        .and_then(TableSchema::primary_index)
        .map(|i| i.fields.as_slice())
        .unwrap_or(&[]);
    let primary_key_changed = assigned.iter().any(|c| pk_fields.iter().any(|f| f == c));
    let primary_single = schema.and_then(TableSchema::primary_single_column);
    let applicable = schema
        .map(|s| applicable_indexes(s, &assigned, primary_key_changed))
        .unwrap_or_default();

    let mut update_count = 0u64;
    for (row_id, row) in &filtered_rows {
        let old_entries = compute_index_keys(&applicable, row);

        let mut update_row = row.clone();
        let mut changes_found = false;
        for assignment in assignments {
            let new_value = assignment
                .value
                .evaluate(&EvalContext::with_values(&update_row, values))?;
            if update_row.get(&assignment.column.column) != Some(&new_value) {
                changes_found = true;
            }
            update_row.insert(assignment.column.column.clone(), new_value);
        }
        if !changes_found {
            // Untouched rows cause no index churn, no dirty entry, and do
            // not count.
            continue;
        }

        if let Some(schema) = schema {
            update_row = coerce_to_schema(&update_row, schema, ctx.strict_schema)?;
        }

        let new_row_id = match primary_single {
            Some(col) => update_row
                .get(col)
                .map(RowKey::from)
                .unwrap_or_else(|| row_id.clone()),
            None => row_id.clone(),
        };
        let new_entries = compute_index_keys(&applicable, &update_row);

        if let Some(schema) = schema {
            let rekeyed_onto_existing =
                new_row_id != *row_id && original_table.contains_key(&new_row_id);
            let unique_path_taken = new_entries.iter().any(|entry| {
                entry.store_as_unique
                    && index_refs
                        .unique_leaf(&entry.index, &entry.path)
                        .is_some_and(|held| held != row_id)
            });
            if rekeyed_onto_existing || unique_path_taken {
                if let Some(violation) =
                    check_unique_constraints(&original_table, &update_row, schema, Some(row_id))
                {
                    if ignore_dupes {
                        continue;
                    }
                    if !ctx.relax_unique_constraints {
                        return Err(IndexError::UniqueConstraintViolation {
                            constraint_name: violation.constraint_name,
                            table_name: table.to_owned(),
                            value: violation.value,
                        }
                        .into());
                    }
                }
            }
        }

        // Delete-then-add, so the uniqueness pre-check above saw the
        // pre-update state.
        for entry in &old_entries {
            index_refs.remove(&entry.index, &entry.path, entry.store_as_unique, row_id);
        }
        for entry in &new_entries {
            index_refs.add(
                &entry.index,
                &entry.path,
                entry.store_as_unique,
                new_row_id.clone(),
            );
        }

        ctx.record_dirty(new_row_id.clone());

        if new_row_id == *row_id {
            original_table.insert(row_id.clone(), update_row);
        } else {
            // Rekey in place: the new id takes the old entry's position.
            // Insertion order is part of the contract.
            original_table = original_table
                .into_iter()
                .map(|(id, r)| {
                    if id == *row_id {
                        (new_row_id.clone(), update_row.clone())
                    } else {
                        (id, r)
                    }
                })
                .collect();
        }
        update_count += 1;
    }

    conn.server().lock().save_table(
        database,
        table,
        original_table.clone(),
        index_refs.clone(),
    )?;
    Ok((update_count, original_table, index_refs))
}
