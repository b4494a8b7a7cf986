//! Scripted in-memory connection for tests.
//!
//! [`MockConnection`] records every statement it receives and answers from a
//! queue: `query` pops the next scripted row set (empty when the queue is
//! drained) and `execute` pops the next scripted [`ExecResult`] or reports one
//! affected row with an incrementing `insert_id`.

use crate::connection::{Connection, ExecResult};
use crate::error::{Error, QueryError, QueryErrorKind, Result};
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Execute,
}

/// One statement received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    statements: Vec<Statement>,
    rows: VecDeque<Vec<Row>>,
    results: VecDeque<ExecResult>,
    failures: Vec<String>,
    next_insert_id: i64,
}

/// In-memory [`Connection`] that replays scripted results.
#[derive(Debug, Default)]
pub struct MockConnection {
    state: Mutex<MockState>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the rows returned by the next `query` call.
    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        self.state().rows.push_back(rows);
        self
    }

    /// Queue the result of the next `execute` call.
    pub fn push_result(&self, result: ExecResult) -> &Self {
        self.state().results.push_back(result);
        self
    }

    /// Fail every statement whose SQL contains `fragment`.
    pub fn fail_when(&self, fragment: impl Into<String>) -> &Self {
        self.state().failures.push(fragment.into());
        self
    }

    /// Everything received so far.
    pub fn recorded(&self) -> Vec<Statement> {
        self.state().statements.clone()
    }

    /// SQL text of everything received so far.
    pub fn statements(&self) -> Vec<String> {
        self.state()
            .statements
            .iter()
            .map(|s| s.sql.clone())
            .collect()
    }

    /// SQL text of `query` calls only.
    pub fn queries(&self) -> Vec<String> {
        self.state()
            .statements
            .iter()
            .filter(|s| s.kind == StatementKind::Query)
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Number of statements received.
    pub fn count(&self) -> usize {
        self.state().statements.len()
    }

    /// Forget recorded statements, keeping the script.
    pub fn clear(&self) {
        self.state().statements.clear();
    }

    #[allow(clippy::result_large_err)]
    fn record(&self, kind: StatementKind, sql: &str, params: &[Value]) -> Result<()> {
        let mut state = self.state();
        state.statements.push(Statement {
            kind,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if state.failures.iter().any(|f| sql.contains(f.as_str())) {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: Some(sql.to_string()),
                sqlstate: None,
                message: "scripted failure".to_string(),
                source: None,
            }));
        }
        Ok(())
    }
}

/// Unwrap `Outcome::Ok`, panicking with the outcome otherwise.
pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self
            .record(StatementKind::Query, sql, params)
            .map(|()| self.state().rows.pop_front().unwrap_or_default());
        async move {
            match result {
                Ok(rows) => Outcome::Ok(rows),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<ExecResult, Error>> + Send {
        let result = self.record(StatementKind::Execute, sql, params).map(|()| {
            let mut state = self.state();
            state.results.pop_front().unwrap_or_else(|| {
                state.next_insert_id += 1;
                ExecResult::affected(1).with_insert_id(state.next_insert_id)
            })
        });
        async move {
            match result {
                Ok(result) => Outcome::Ok(result),
                Err(e) => Outcome::Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;

    #[test]
    fn replays_script_in_order() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let mock = MockConnection::new();
        mock.push_rows(vec![Row::from_pairs([("id", 1)])]);
        mock.fail_when("broken");

        rt.block_on(async {
            let Outcome::Ok(rows) = mock.query(&cx, "SELECT 1", &[]).await else {
                panic!("expected rows");
            };
            assert_eq!(rows.len(), 1);
            let Outcome::Ok(rows) = mock.query(&cx, "SELECT 2", &[]).await else {
                panic!("expected rows");
            };
            assert!(rows.is_empty());

            let Outcome::Ok(first) = mock.execute(&cx, "INSERT", &[Value::Int(1)]).await else {
                panic!("expected exec result");
            };
            let Outcome::Ok(second) = mock.execute(&cx, "INSERT", &[]).await else {
                panic!("expected exec result");
            };
            assert_eq!(first.insert_id, Some(Value::BigInt(1)));
            assert_eq!(second.insert_id, Some(Value::BigInt(2)));

            assert!(matches!(mock.execute(&cx, "broken", &[]).await, Outcome::Err(_)));
        });

        assert_eq!(mock.count(), 5);
        assert_eq!(mock.queries(), vec!["SELECT 1", "SELECT 2"]);
        assert_eq!(mock.recorded()[2].params, vec![Value::Int(1)]);
    }
}
