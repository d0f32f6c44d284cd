//! Database driver abstraction trait
//!
//! Defines the query-execution interface the mapper facade and the schema loader
//! run on top of.

use crate::db::parameter::SqlParameter;
use crate::db::query::QueryResult;
use crate::error::Result;
use async_trait::async_trait;

/// How the command text is interpreted by the server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// A batch of T-SQL statements
    Text,
    /// The name of a stored procedure, optionally schema-qualified
    StoredProcedure,
}

/// A statement or stored procedure to run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    pub kind: CommandKind,
}

impl Command {
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            text: sql.into(),
            kind: CommandKind::Text,
        }
    }

    pub fn stored_procedure(name: impl Into<String>) -> Self {
        Self {
            text: name.into(),
            kind: CommandKind::StoredProcedure,
        }
    }
}

/// Trait that all database drivers must implement.
///
/// All methods are async because callers live in a tokio runtime.
/// Output, input-output and return-value parameters are written back into
/// `params` once the command completes.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Test that the connection is alive
    async fn test_connection(&self) -> Result<bool>;

    /// Reconnect using the same configuration
    async fn reconnect(&mut self) -> Result<()>;

    /// Run a command and return its first result set
    async fn execute(&self, command: &Command, params: &mut [SqlParameter]) -> Result<QueryResult>;

    /// Run a command that returns no rows and report the number of rows affected
    async fn execute_non_query(&self, command: &Command, params: &mut [SqlParameter]) -> Result<u64>;

    /// Get the name of the database the connection was opened on
    fn database_name(&self) -> String;

    /// List databases on the server
    async fn get_databases(&self) -> Result<Vec<String>>;
}
