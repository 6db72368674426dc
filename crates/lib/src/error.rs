use thiserror::Error;

/// Errors raised by expression evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibError {
    #[error("Unknown column: `{0}`")]
    UnknownColumn(String),
    #[error("VALUES() is only valid inside ON DUPLICATE KEY UPDATE")]
    ValuesOutsideUpsert,
}

/// Convenient alias for fallible tests.
pub type ResultTest<T = ()> = Result<T, anyhow::Error>;
