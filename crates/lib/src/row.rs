use core::fmt;

use indexmap::IndexMap;

use crate::value::Value;

/// The string a missing field value is encoded as in index key paths.
pub const NULL_SENTINEL: &str = "__NULL__";

/// The key a row is stored under in a [`Dataset`], doubling as the component
/// type of secondary-index key paths. When a table has a single-column
/// primary key, the row key *is* that column's value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    Int(i64),
    Str(String),
}

impl RowKey {
    pub fn null_sentinel() -> Self {
        RowKey::Str(NULL_SENTINEL.to_owned())
    }

    pub fn is_null_sentinel(&self) -> bool {
        matches!(self, RowKey::Str(s) if s == NULL_SENTINEL)
    }
}

impl From<&Value> for RowKey {
    /// Key coercion: ints stay ints, booleans key as `0`/`1`, floats key by
    /// their printed form, and `NULL` keys as the sentinel.
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(i) => RowKey::Int(*i),
            Value::Bool(b) => RowKey::Int(i64::from(*b)),
            Value::Str(s) => RowKey::Str(s.clone()),
            Value::Float(f) => RowKey::Str(f.to_string()),
            Value::Null => RowKey::null_sentinel(),
        }
    }
}

impl From<i64> for RowKey {
    fn from(i: i64) -> Self {
        RowKey::Int(i)
    }
}

impl From<&str> for RowKey {
    fn from(s: &str) -> Self {
        RowKey::Str(s.to_owned())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Int(i) => write!(f, "{i}"),
            RowKey::Str(s) => f.write_str(s),
        }
    }
}

/// A table row: column name to value, insertion order preserved.
pub type Row = IndexMap<String, Value>;

/// An ordered table snapshot: row-id to row. The order is semantically
/// meaningful — it carries insertion order, and sort order after ORDER BY.
pub type Dataset = IndexMap<RowKey, Row>;

/// Builds a [`Row`] from `column => value` pairs, preserving their order.
///
/// ```
/// use sqlfake_lib::{row, Value};
///
/// let r = row! { "id" => 1, "name" => "bob" };
/// assert_eq!(r["name"], Value::from("bob"));
/// ```
#[macro_export]
macro_rules! row {
    ($($name:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut row = $crate::Row::new();
        $(row.insert(($name).to_string(), $crate::Value::from($value));)*
        row
    }};
}
