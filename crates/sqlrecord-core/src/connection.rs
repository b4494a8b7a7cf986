//! Database driver contract.
//!
//! This module defines the single abstraction the rest of the workspace uses to
//! reach a database:
//!
//! - [`Connection`] - query/execute plus transaction and savepoint control
//! - [`ExecResult`] - what a data-modifying statement reports back
//!
//! All operations integrate with asupersync's structured concurrency via `Cx`
//! context for proper cancellation handling. Driver failures are returned as
//! [`Error::Connection`](crate::Error::Connection),
//! [`Error::Query`](crate::Error::Query) or
//! [`Error::Transaction`](crate::Error::Transaction) and are passed through
//! untouched by every higher layer.

use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use serde::{Deserialize, Serialize};

/// Result of an INSERT/UPDATE/DELETE.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecResult {
    /// Number of rows the statement touched
    pub rows_affected: u64,
    /// Generated key reported by the driver, if any
    pub insert_id: Option<Value>,
}

impl ExecResult {
    /// Create a result without a generated key.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            insert_id: None,
        }
    }

    /// Attach a generated key.
    pub fn with_insert_id(mut self, id: impl Into<Value>) -> Self {
        self.insert_id = Some(id.into());
        self
    }
}

/// A database connection capable of executing compiled statements.
///
/// All operations are async and take a `Cx` context for cancellation support.
/// Implementations must be `Send + Sync` for use across async boundaries.
/// Every statement issued between [`begin`](Connection::begin) and
/// [`commit`](Connection::commit)/[`rollback`](Connection::rollback) must run on
/// the same underlying connection.
///
/// # Example
///
/// ```rust,ignore
/// let rows = conn.query(&cx, "SELECT * FROM \"users\" WHERE \"id\" = $1", &[Value::Int(1)]).await;
///
/// conn.begin(&cx).await;
/// conn.execute(&cx, "INSERT INTO \"logs\" (\"msg\") VALUES ($1)", &[Value::from("action")]).await;
/// conn.commit(&cx).await;
/// ```
pub trait Connection: Send + Sync {
    /// Open the underlying connection.
    fn connect(&self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send {
        let _ = cx;
        async { Outcome::Ok(()) }
    }

    /// Close the underlying connection.
    fn disconnect(&self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send {
        let _ = cx;
        async { Outcome::Ok(()) }
    }

    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE).
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, crate::Error>> + Send;

    /// Begin a top-level transaction.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send {
        async move { self.execute(cx, "BEGIN", &[]).await.map(|_| ()) }
    }

    /// Commit the current top-level transaction.
    fn commit(&self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send {
        async move { self.execute(cx, "COMMIT", &[]).await.map(|_| ()) }
    }

    /// Roll back the current top-level transaction.
    fn rollback(&self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send {
        async move { self.execute(cx, "ROLLBACK", &[]).await.map(|_| ()) }
    }

    /// Create a savepoint within the current transaction.
    fn savepoint(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), crate::Error>> + Send {
        let sql = format!("SAVEPOINT {name}");
        async move { self.execute(cx, &sql, &[]).await.map(|_| ()) }
    }

    /// Release a savepoint, keeping its changes in the enclosing transaction.
    fn release(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), crate::Error>> + Send {
        let sql = format!("RELEASE SAVEPOINT {name}");
        async move { self.execute(cx, &sql, &[]).await.map(|_| ()) }
    }

    /// Roll back to a previously created savepoint.
    fn rollback_to(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), crate::Error>> + Send {
        let sql = format!("ROLLBACK TO SAVEPOINT {name}");
        async move { self.execute(cx, &sql, &[]).await.map(|_| ()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_result_builders() {
        let result = ExecResult::affected(2);
        assert_eq!(result.rows_affected, 2);
        assert!(result.insert_id.is_none());

        let result = ExecResult::affected(1).with_insert_id(41_i64);
        assert_eq!(result.insert_id, Some(Value::BigInt(41)));
    }
}
