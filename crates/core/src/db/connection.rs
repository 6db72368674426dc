use crate::db::server::SharedServer;

/// A client connection: the current database plus the backing server store.
#[derive(Clone)]
pub struct Connection {
    server: SharedServer,
    current_database: Option<String>,
}

impl Connection {
    pub fn new(server: SharedServer) -> Self {
        Connection {
            server,
            current_database: None,
        }
    }

    pub fn with_database(server: SharedServer, database: impl Into<String>) -> Self {
        Connection {
            server,
            current_database: Some(database.into()),
        }
    }

    /// `USE <db>`.
    pub fn use_database(&mut self, database: impl Into<String>) {
        self.current_database = Some(database.into());
    }

    pub fn current_database(&self) -> Option<&str> {
        self.current_database.as_deref()
    }

    pub fn server(&self) -> &SharedServer {
        &self.server
    }
}
