use core::cmp::Ordering;
use core::fmt;

/// A dynamically typed SQL value.
///
/// MySQL's loose comparison rules live on [`Value::compare`]: two numeric
/// values compare as floats, anything else compares as strings. Equality via
/// `PartialEq` is *strict* — a distinct variant is a distinct value — which
/// is what change detection in the SET core relies on.
#[derive(Debug, Clone, PartialEq, derive_more::From)]
pub enum Value {
    #[from(ignore)]
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `Int`, `Float` and `Bool` are numeric; strings are not, even when
    /// they parse as numbers. Sorting and comparison depend on this split.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Bool(_))
    }

    /// The float reading of a numeric value. `None` for `Null` and `Str`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(f64::from(*b)),
            Value::Null | Value::Str(_) => None,
        }
    }

    /// The float reading MySQL applies in arithmetic contexts: strings are
    /// parsed, unparseable strings read as `0`. `None` only for `Null`.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Str(s) => Some(s.trim().parse::<f64>().unwrap_or(0.0)),
            other => other.as_f64(),
        }
    }

    /// Stringification used for comparisons and index-key rendering.
    /// `Null` reads as the empty string, booleans as `1`/`0`.
    pub fn to_sql_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_owned(),
        }
    }

    /// WHERE-clause truthiness: `Null` is falsy, numbers are truthy when
    /// non-zero, strings when non-empty and not `"0"`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::Bool(b) => *b,
        }
    }

    /// MySQL-style ordering: numeric pairs compare as floats, everything
    /// else falls back to lexicographic comparison of the stringified
    /// values.
    pub fn compare(&self, other: &Value) -> Ordering {
        if self.is_numeric() && other.is_numeric() {
            let lhs = self.as_f64().unwrap_or(0.0);
            let rhs = other.as_f64().unwrap_or(0.0);
            lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal)
        } else {
            self.to_sql_string().cmp(&other.to_sql_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            other => f.write_str(&other.to_sql_string()),
        }
    }
}
