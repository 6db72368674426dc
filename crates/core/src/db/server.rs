use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sqlfake_lib::row::Dataset;
use sqlfake_lib::schema::TableSchema;

use crate::db::index_refs::IndexRefs;
use crate::error::{DbError, TableError};

/// One table's stored state: the row snapshot plus its secondary-index
/// refs. Replaced wholesale by [`Server::save_table`]; executors never
/// mutate it in place.
#[derive(Debug, Default, Clone)]
pub struct TableData {
    pub rows: Dataset,
    pub index_refs: IndexRefs,
}

/// A logical database: tables and their registered schemas. Tables without
/// a registered schema run schemaless (no coercion, no unique enforcement,
/// no index planning).
#[derive(Debug, Default)]
pub struct Database {
    tables: HashMap<String, TableData>,
    schemas: HashMap<String, TableSchema>,
}

impl Database {
    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.get(name)
    }

    pub fn schema(&self, name: &str) -> Option<&TableSchema> {
        self.schemas.get(name)
    }

    /// Registers `schema` and creates its (empty) table.
    pub fn create_table(&mut self, schema: TableSchema) {
        let name = schema.name.clone();
        self.schemas.insert(name.clone(), schema);
        self.tables.entry(name).or_default();
    }

    /// Creates an empty table with no schema attached.
    pub fn create_schemaless_table(&mut self, name: impl Into<String>) {
        self.tables.entry(name.into()).or_default();
    }
}

/// The backing store shared by every connection into the same fake server.
#[derive(Debug, Default)]
pub struct Server {
    databases: HashMap<String, Database>,
}

/// Handle type connections hold; executors snapshot under the lock, compute
/// unlocked, and publish under the lock.
pub type SharedServer = Arc<Mutex<Server>>;

impl Server {
    pub fn new() -> Self {
        Server::default()
    }

    pub fn into_shared(self) -> SharedServer {
        Arc::new(Mutex::new(self))
    }

    pub fn create_database(&mut self, name: impl Into<String>) -> &mut Database {
        self.databases.entry(name.into()).or_default()
    }

    pub fn get_database(&self, name: &str) -> Option<&Database> {
        self.databases.get(name)
    }

    pub fn get_database_mut(&mut self, name: &str) -> Option<&mut Database> {
        self.databases.get_mut(name)
    }

    /// Clones out a table's current state and schema for one statement's
    /// execution.
    pub fn snapshot(
        &self,
        db: &str,
        table: &str,
    ) -> Result<(TableData, Option<TableSchema>), DbError> {
        let database = self
            .get_database(db)
            .ok_or_else(|| TableError::DatabaseNotFound(db.to_owned()))?;
        let data = database
            .table(table)
            .cloned()
            .ok_or_else(|| TableError::NotFound(format!("{db}.{table}")))?;
        Ok((data, database.schema(table).cloned()))
    }

    /// Atomically replaces a table's snapshot. This is the only point where
    /// a statement's mutations become visible.
    pub fn save_table(
        &mut self,
        db: &str,
        table: &str,
        rows: Dataset,
        index_refs: IndexRefs,
    ) -> Result<(), DbError> {
        let database = self
            .get_database_mut(db)
            .ok_or_else(|| TableError::DatabaseNotFound(db.to_owned()))?;
        database.tables.insert(table.to_owned(), TableData { rows, index_refs });
        Ok(())
    }
}
