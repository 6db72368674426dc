//! Schema conformance and unique-constraint checking.

use core::cmp::Ordering;

use itertools::Itertools;
use sqlfake_lib::row::{Dataset, Row, RowKey};
use sqlfake_lib::schema::{ColumnDef, ColumnType, IndexDef, TableSchema};
use sqlfake_lib::value::Value;

use crate::error::SchemaError;

/// A unique-constraint violation: the offending constraint and the row
/// already holding the conflicting key.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueViolation {
    pub constraint_name: String,
    pub existing_row_id: RowKey,
    /// The conflicting key, rendered for the error message.
    pub value: Value,
}

/// Rebuilds `row` to conform to `schema`, in schema field order. Columns
/// absent from the schema are dropped, which also guarantees that nothing
/// synthetic ever reaches persisted data. Missing columns take their
/// declared default, then NULL when nullable, then the type's zero value.
///
/// Strict mode rejects type mismatches with [`SchemaError::TypeMismatch`];
/// otherwise values are coerced best-effort the way a permissive MySQL
/// server casts them.
pub fn coerce_to_schema(
    row: &Row,
    schema: &TableSchema,
    strict: bool,
) -> Result<Row, SchemaError> {
    let mut out = Row::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let value = match row.get(&field.name) {
            Some(value) => coerce_value(value, field, &schema.name, strict)?,
            None => missing_value(field),
        };
        out.insert(field.name.clone(), value);
    }
    Ok(out)
}

fn missing_value(field: &ColumnDef) -> Value {
    if let Some(default) = &field.default {
        default.clone()
    } else if field.nullable {
        Value::Null
    } else {
        field.col_type.zero_value()
    }
}

fn coerce_value(
    value: &Value,
    field: &ColumnDef,
    table: &str,
    strict: bool,
) -> Result<Value, SchemaError> {
    let mismatch = || SchemaError::TypeMismatch {
        table: table.to_owned(),
        column: field.name.clone(),
        expected: field.col_type.name(),
        value: value.clone(),
    };

    if value.is_null() {
        if field.nullable {
            return Ok(Value::Null);
        }
        if strict {
            return Err(mismatch());
        }
        return Ok(field.col_type.zero_value());
    }

    let conforms = matches!(
        (field.col_type, value),
        (ColumnType::Int, Value::Int(_))
            | (ColumnType::Float, Value::Float(_) | Value::Int(_))
            | (ColumnType::String, Value::Str(_))
            | (ColumnType::Bool, Value::Bool(_) | Value::Int(_))
    );
    if conforms {
        return Ok(promote(field.col_type, value));
    }
    if strict {
        return Err(mismatch());
    }
    Ok(cast(field.col_type, value))
}

/// Lossless adjustments for values that already conform: ints widen into
/// float columns, ints narrow into bool columns.
fn promote(col_type: ColumnType, value: &Value) -> Value {
    match (col_type, value) {
        (ColumnType::Float, Value::Int(i)) => Value::Float(*i as f64),
        (ColumnType::Bool, Value::Int(i)) => Value::Bool(*i != 0),
        _ => value.clone(),
    }
}

/// Permissive-mode cast for non-conforming values.
fn cast(col_type: ColumnType, value: &Value) -> Value {
    match col_type {
        ColumnType::Int => Value::Int(value.numeric().unwrap_or(0.0) as i64),
        ColumnType::Float => Value::Float(value.numeric().unwrap_or(0.0)),
        ColumnType::String => Value::Str(value.to_sql_string()),
        ColumnType::Bool => Value::Bool(value.is_truthy()),
    }
}

/// Checks `row` against every PRIMARY/UNIQUE index of `schema`, ignoring
/// `skip_row_id` (the row being updated). Index tuples containing NULL are
/// exempt, as in MySQL. Returns the first violation found.
///
/// The Vitess sharding pseudo-index joins the check as a unique index named
/// after the keyspace: its entries store as single leaves, so a second row
/// on an occupied shard key would silently orphan the first.
pub fn check_unique_constraints(
    table: &Dataset,
    row: &Row,
    schema: &TableSchema,
    skip_row_id: Option<&RowKey>,
) -> Option<UniqueViolation> {
    let sharding = schema
        .vitess_sharding
        .as_ref()
        .map(|s| IndexDef::unique(s.keyspace.as_str(), [s.sharding_key.as_str()]));
    for index in schema.indexes.iter().chain(sharding.as_ref()) {
        if !index.is_unique() {
            continue;
        }

        if index.is_primary_single() {
            let Some(value) = row.get(index.fields[0].as_str()) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let key = RowKey::from(value);
            if skip_row_id != Some(&key) && table.contains_key(&key) {
                return Some(UniqueViolation {
                    constraint_name: index.name.clone(),
                    existing_row_id: key,
                    value: value.clone(),
                });
            }
            continue;
        }

        let mut needle = Vec::with_capacity(index.fields.len());
        for field in &index.fields {
            match row.get(field.as_str()).filter(|v| !v.is_null()) {
                Some(value) => needle.push(value.clone()),
                None => {
                    needle.clear();
                    break;
                }
            }
        }
        if needle.is_empty() {
            continue;
        }

        for (row_id, existing) in table {
            if skip_row_id == Some(row_id) {
                continue;
            }
            let matches = index.fields.iter().zip(&needle).all(|(field, nv)| {
                existing
                    .get(field.as_str())
                    .is_some_and(|ev| ev.compare(nv) == Ordering::Equal)
            });
            if matches {
                return Some(UniqueViolation {
                    constraint_name: index.name.clone(),
                    existing_row_id: row_id.clone(),
                    value: Value::Str(needle.iter().map(Value::to_sql_string).join(", ")),
                });
            }
        }
    }
    None
}
