//! An in-memory emulation of a MySQL server for use in tests.
//!
//! Callers construct parsed statements ([`query::ast`]) and execute them
//! through a [`Connection`] into a shared [`Server`]. The engine
//! materializes results and mutations against in-memory [`Dataset`]s while
//! honoring schema constraints, secondary indexes, MySQL ordering
//! semantics, and the replica-after-write guard of [`QueryContext`].

pub mod db;
pub mod error;
pub mod query;

pub use db::connection::Connection;
pub use db::query_context::QueryContext;
pub use db::server::{Server, SharedServer};
pub use error::DbError;

pub use sqlfake_lib::{Dataset, Row, RowKey, Value};
