pub mod connection;
pub mod index_refs;
pub mod integrity;
pub mod query_context;
pub mod server;
