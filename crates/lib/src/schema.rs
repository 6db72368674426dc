//! Table schema definitions: columns, indexes, and optional Vitess-style
//! sharding. The engine consults these for coercion, unique enforcement and
//! index planning; tables may also run schemaless, in which case none of
//! that applies.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    String,
    Bool,
}

impl ColumnType {
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Bool => "bool",
        }
    }

    /// The value a NOT NULL column takes when nothing else supplies one.
    pub fn zero_value(self) -> Value {
        match self {
            ColumnType::Int => Value::Int(0),
            ColumnType::Float => Value::Float(0.0),
            ColumnType::String => Value::Str(String::new()),
            ColumnType::Bool => Value::Bool(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        ColumnDef {
            name: name.into(),
            col_type,
            nullable: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Primary,
    Unique,
    Index,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub kind: IndexKind,
    pub fields: Vec<String>,
}

impl IndexDef {
    pub fn primary(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        IndexDef {
            name: "PRIMARY".to_owned(),
            kind: IndexKind::Primary,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn unique(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        IndexDef {
            name: name.into(),
            kind: IndexKind::Unique,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn index(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        IndexDef {
            name: name.into(),
            kind: IndexKind::Index,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether entries of this index are structurally unique.
    pub fn is_unique(&self) -> bool {
        matches!(self.kind, IndexKind::Primary | IndexKind::Unique)
    }

    /// A single-column PRIMARY index coincides with the dataset row key and
    /// is never materialized in the index-refs store.
    pub fn is_primary_single(&self) -> bool {
        self.kind == IndexKind::Primary && self.fields.len() == 1
    }
}

/// Vitess-style sharding configuration. Modeled by the executor as one more
/// synthetic index over the sharding key, named after the keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardingDef {
    pub keyspace: String,
    pub sharding_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
    pub vitess_sharding: Option<ShardingDef>,
}

impl TableSchema {
    pub fn new(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = ColumnDef>,
        indexes: impl IntoIterator<Item = IndexDef>,
    ) -> Self {
        TableSchema {
            name: name.into(),
            fields: fields.into_iter().collect(),
            indexes: indexes.into_iter().collect(),
            vitess_sharding: None,
        }
    }

    pub fn with_sharding(mut self, keyspace: impl Into<String>, key: impl Into<String>) -> Self {
        self.vitess_sharding = Some(ShardingDef {
            keyspace: keyspace.into(),
            sharding_key: key.into(),
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&ColumnDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_index(&self) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.kind == IndexKind::Primary)
    }

    /// The column of a single-column PRIMARY index, when the table has one.
    pub fn primary_single_column(&self) -> Option<&str> {
        self.primary_index()
            .filter(|i| i.is_primary_single())
            .map(|i| i.fields[0].as_str())
    }
}
