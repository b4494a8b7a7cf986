//! Sessions.
//!
//! A [`Session`] bundles everything a query needs at execution time: the
//! driver connection, the dialect, the morph-type registry, the hook bus and
//! the configuration. Sessions are cheap to clone and are passed explicitly;
//! there is no global connection.

use crate::connection::{Connection, ExecResult};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::hooks::{HookBus, NoopHooks};
use crate::morph::MorphMap;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::fmt;
use std::sync::Arc;

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// SQL dialect used to compile every statement. Required.
    pub dialect: Option<Dialect>,
    /// Page size used when a caller does not pick one.
    pub default_per_page: u64,
    /// Chunk size used when a caller does not pick one.
    pub default_chunk_size: u64,
    /// Include bound parameters in statement logs.
    pub log_parameters: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dialect: None,
            default_per_page: 15,
            default_chunk_size: 100,
            log_parameters: false,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    #[must_use]
    pub fn default_per_page(mut self, per_page: u64) -> Self {
        self.default_per_page = per_page;
        self
    }

    #[must_use]
    pub fn default_chunk_size(mut self, size: u64) -> Self {
        self.default_chunk_size = size;
        self
    }

    #[must_use]
    pub fn log_parameters(mut self, enabled: bool) -> Self {
        self.log_parameters = enabled;
        self
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder<C: Connection> {
    connection: Option<Arc<C>>,
    config: SessionConfig,
    morphs: MorphMap,
    hooks: Option<Arc<dyn HookBus>>,
}

impl<C: Connection> Default for SessionBuilder<C> {
    fn default() -> Self {
        Self {
            connection: None,
            config: SessionConfig::default(),
            morphs: MorphMap::default(),
            hooks: None,
        }
    }
}

impl<C: Connection> SessionBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connection(mut self, connection: C) -> Self {
        self.connection = Some(Arc::new(connection));
        self
    }

    /// Use a connection that is shared with other owners.
    #[must_use]
    pub fn shared_connection(mut self, connection: Arc<C>) -> Self {
        self.connection = Some(connection);
        self
    }

    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config.dialect = Some(dialect);
        self
    }

    /// Replace the whole configuration. A dialect set earlier is kept
    /// unless the new configuration names one.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        let dialect = config.dialect.or(self.config.dialect);
        self.config = config;
        self.config.dialect = dialect;
        self
    }

    #[must_use]
    pub fn morph_map(mut self, morphs: MorphMap) -> Self {
        self.morphs = morphs;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: impl HookBus + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Finish the session. Both a connection and a dialect are required.
    #[allow(clippy::result_large_err)]
    pub fn build(self) -> Result<Session<C>> {
        let connection = self
            .connection
            .ok_or_else(|| Error::config("session requires a database connection"))?;
        let dialect = self
            .config
            .dialect
            .ok_or_else(|| Error::config("session requires a SQL dialect"))?;
        tracing::debug!(
            dialect = %dialect,
            morph_types = self.morphs.len(),
            "Session built"
        );
        Ok(Session {
            connection,
            dialect,
            morphs: Arc::new(self.morphs),
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoopHooks)),
            config: self.config,
            tx_depth: 0,
        })
    }
}

/// Execution context for queries and persistence.
pub struct Session<C: Connection> {
    connection: Arc<C>,
    dialect: Dialect,
    morphs: Arc<MorphMap>,
    hooks: Arc<dyn HookBus>,
    config: SessionConfig,
    /// Number of enclosing `transaction` calls.
    tx_depth: u32,
}

impl<C: Connection> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            dialect: self.dialect,
            morphs: Arc::clone(&self.morphs),
            hooks: Arc::clone(&self.hooks),
            config: self.config.clone(),
            tx_depth: self.tx_depth,
        }
    }
}

impl<C: Connection> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("dialect", &self.dialect)
            .field("morph_types", &self.morphs.len())
            .field("config", &self.config)
            .field("tx_depth", &self.tx_depth)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Session<C> {
    pub fn builder() -> SessionBuilder<C> {
        SessionBuilder::new()
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn morphs(&self) -> &MorphMap {
        &self.morphs
    }

    pub fn hooks(&self) -> &dyn HookBus {
        self.hooks.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of enclosing transactions (0 outside any transaction).
    pub fn transaction_depth(&self) -> u32 {
        self.tx_depth
    }

    pub fn in_transaction(&self) -> bool {
        self.tx_depth > 0
    }

    fn log_statement(&self, kind: &'static str, sql: &str, params: &[Value]) {
        if self.config.log_parameters {
            tracing::debug!(dialect = %self.dialect, sql, params = ?params, "Executing {}", kind);
        } else {
            tracing::debug!(
                dialect = %self.dialect,
                sql,
                param_count = params.len(),
                "Executing {}",
                kind
            );
        }
    }

    /// Run a SELECT and return every row.
    pub async fn query(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        self.log_statement("query", sql, params);
        let outcome = self.connection.query(cx, sql, params).await;
        if let Outcome::Ok(rows) = &outcome {
            tracing::trace!(row_count = rows.len(), "Query returned");
        }
        outcome
    }

    /// Run a data-modifying statement.
    pub async fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> Outcome<ExecResult, Error> {
        self.log_statement("statement", sql, params);
        let outcome = self.connection.execute(cx, sql, params).await;
        if let Outcome::Ok(result) = &outcome {
            tracing::trace!(rows_affected = result.rows_affected, "Statement finished");
        }
        outcome
    }

    fn savepoint_name(&self) -> String {
        format!("sqlrecord_sp_{}", self.tx_depth)
    }

    /// Run `f` inside a transaction.
    ///
    /// The outermost call issues BEGIN/COMMIT; nested calls use a savepoint.
    /// Any outcome other than `Ok` (error, cancellation or panic) rolls back
    /// the transaction or savepoint and is returned unchanged.
    ///
    /// ```rust,ignore
    /// let outcome = session
    ///     .transaction(&cx, |tx| async move {
    ///         let user = try_outcome!(users.create(&cx, &tx, attrs).await);
    ///         posts.insert(&cx, &tx, rows).await
    ///     })
    ///     .await;
    /// ```
    #[tracing::instrument(level = "debug", skip(self, cx, f), fields(depth = self.tx_depth))]
    pub async fn transaction<T, F, Fut>(&self, cx: &Cx, f: F) -> Outcome<T, Error>
    where
        F: FnOnce(Session<C>) -> Fut,
        Fut: Future<Output = Outcome<T, Error>>,
    {
        let nested = self.tx_depth > 0;
        let savepoint = self.savepoint_name();

        let opened = if nested {
            self.connection.savepoint(cx, &savepoint).await
        } else {
            self.connection.begin(cx).await
        };
        match opened {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
        tracing::debug!(nested, "Transaction opened");

        let mut inner = self.clone();
        inner.tx_depth += 1;

        match f(inner).await {
            Outcome::Ok(value) => {
                let closed = if nested {
                    self.connection.release(cx, &savepoint).await
                } else {
                    self.connection.commit(cx).await
                };
                match closed {
                    Outcome::Ok(()) => {
                        tracing::debug!(nested, "Transaction committed");
                        Outcome::Ok(value)
                    }
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                }
            }
            failed => {
                let rolled_back = if nested {
                    self.connection.rollback_to(cx, &savepoint).await
                } else {
                    self.connection.rollback(cx).await
                };
                match rolled_back {
                    Outcome::Ok(()) => tracing::debug!(nested, "Transaction rolled back"),
                    Outcome::Err(e) => {
                        tracing::warn!(nested, error = %e, "Rollback failed");
                    }
                    Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                        tracing::warn!(nested, "Rollback did not complete");
                    }
                }
                failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;
    use asupersync::runtime::RuntimeBuilder;

    fn session(mock: &Arc<MockConnection>) -> Session<MockConnection> {
        Session::builder()
            .shared_connection(Arc::clone(mock))
            .dialect(Dialect::Sqlite)
            .build()
            .expect("build session")
    }

    #[test]
    fn build_requires_connection_and_dialect() {
        let err = SessionBuilder::<MockConnection>::new()
            .dialect(Dialect::Postgres)
            .build()
            .unwrap_err();
        assert!(err.is_config_error());

        let err = SessionBuilder::new()
            .connection(MockConnection::new())
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: session requires a SQL dialect");

        let session = SessionBuilder::new()
            .connection(MockConnection::new())
            .config(SessionConfig::new().dialect(Dialect::Mysql).default_per_page(25))
            .build()
            .unwrap();
        assert_eq!(session.dialect(), Dialect::Mysql);
        assert_eq!(session.config().default_per_page, 25);
        assert!(!session.in_transaction());
    }

    #[test]
    fn transaction_commits_on_ok() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let mock = Arc::new(MockConnection::new());
        let session = session(&mock);

        rt.block_on(async {
            let cx = &cx;
            let outcome = session
                .transaction(cx, |tx| async move {
                    assert_eq!(tx.transaction_depth(), 1);
                    tx.execute(cx, "DELETE FROM \"t\"", &[]).await.map(|r| r.rows_affected)
                })
                .await;
            assert!(matches!(outcome, Outcome::Ok(1)));
        });

        assert_eq!(mock.statements(), vec!["BEGIN", "DELETE FROM \"t\"", "COMMIT"]);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let mock = Arc::new(MockConnection::new());
        let session = session(&mock);

        rt.block_on(async {
            let outcome: Outcome<(), Error> = session
                .transaction(&cx, |_tx| async { Outcome::Err(Error::Custom("boom".into())) })
                .await;
            assert!(matches!(outcome, Outcome::Err(Error::Custom(ref m)) if m == "boom"));
        });

        assert_eq!(mock.statements(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn nested_transactions_use_savepoints() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let mock = Arc::new(MockConnection::new());
        let session = session(&mock);

        rt.block_on(async {
            let cx = &cx;
            let outcome = session
                .transaction(cx, |outer| async move {
                    let inner: Outcome<(), Error> = outer
                        .transaction(cx, |_inner| async {
                            Outcome::Err(Error::Custom("inner".into()))
                        })
                        .await;
                    assert!(matches!(inner, Outcome::Err(_)));
                    outer
                        .transaction(cx, |inner| async move {
                            assert_eq!(inner.transaction_depth(), 2);
                            Outcome::Ok(())
                        })
                        .await
                })
                .await;
            assert!(matches!(outcome, Outcome::Ok(())));
        });

        assert_eq!(
            mock.statements(),
            vec![
                "BEGIN",
                "SAVEPOINT sqlrecord_sp_1",
                "ROLLBACK TO SAVEPOINT sqlrecord_sp_1",
                "SAVEPOINT sqlrecord_sp_1",
                "RELEASE SAVEPOINT sqlrecord_sp_1",
                "COMMIT",
            ]
        );
    }
}
