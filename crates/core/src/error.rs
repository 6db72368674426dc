use enum_as_inner::EnumAsInner;
use sqlfake_lib::error::LibError;
use sqlfake_lib::value::Value;
use thiserror::Error;

#[derive(Error, Debug, EnumAsInner)]
pub enum DbError {
    #[error("TableError: {0}")]
    Table(#[from] TableError),
    #[error("IndexError: {0}")]
    Index(#[from] IndexError),
    #[error("SchemaError: {0}")]
    Schema(#[from] SchemaError),
    #[error("ReplicaError: {0}")]
    Replica(#[from] ReplicaError),
    #[error("LibError: {0}")]
    Lib(#[from] LibError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TableError {
    #[error("Database with name `{0}` not found.")]
    DatabaseNotFound(String),
    #[error("Table with name `{0}` not found.")]
    NotFound(String),
    #[error("Invalid table name: `{0}`.")]
    InvalidName(String),
    #[error("No database selected for unqualified table name `{0}`.")]
    NoDatabaseSelected(String),
    #[error("Column `{1}` not found in schema for table `{0}`.")]
    ColumnNotFound(String, String),
}

#[derive(Error, Debug, PartialEq)]
pub enum IndexError {
    #[error("Duplicate entry {value} for key `{constraint_name}` on table `{table_name}`.")]
    UniqueConstraintViolation {
        constraint_name: String,
        table_name: String,
        value: Value,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("Invalid value {value} for column `{table}.{column}`: expected {expected}.")]
    TypeMismatch {
        table: String,
        column: String,
        expected: &'static str,
        value: Value,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReplicaError {
    #[error("Replica read of rows written during this request, executing: `{query}`.")]
    ReadAfterWrite { query: String },
}
