//! Query execution against a session.
//!
//! Every helper compiles first and only then talks to the connection, so a
//! compilation failure never reaches the database. Aggregates work on a clone
//! of the builder with the select list, order and window replaced.

use crate::builder::QueryBuilder;
use crate::clause::Predicate;
use crate::expr::{Expr, Op};
use serde::{Deserialize, Serialize};
use sqlrecord_core::{
    Attributes, Connection, Cx, Error, ExecResult, Outcome, Result, Row, Session, Value,
    try_outcome, try_result,
};

/// Column alias used by aggregate queries.
const AGGREGATE: &str = "aggregate";

/// One page of results plus navigation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    /// Build a page; `total_pages` is the ceiling of `total / per_page`.
    pub fn new(data: Vec<T>, page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        Self {
            data,
            page,
            per_page,
            total,
            total_pages,
            has_prev: page > 1,
            has_next: page < total_pages,
        }
    }

    /// Convert the items, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
            has_prev: self.has_prev,
            has_next: self.has_next,
        }
    }

    /// Fallible conversion of the items.
    #[allow(clippy::result_large_err)]
    pub fn try_map<U>(self, f: impl FnMut(T) -> Result<U>) -> Result<Page<U>> {
        let data = self.data.into_iter().map(f).collect::<Result<Vec<U>>>()?;
        Ok(Page {
            data,
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
            has_prev: self.has_prev,
            has_next: self.has_next,
        })
    }
}

fn aggregate_value(rows: &[Row]) -> Value {
    rows.first()
        .and_then(|row| row.get_by_name(AGGREGATE).or_else(|| row.get(0)))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Last segment of a possibly table-qualified column.
fn bare_column(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

impl QueryBuilder {
    /// `SELECT COUNT(*)` over the current WHERE/JOIN state.
    ///
    /// DISTINCT and GROUP BY queries are counted as a derived table so the
    /// count reflects the rows the query would return.
    #[allow(clippy::result_large_err)]
    pub fn compile_count(&self) -> Result<(String, Vec<Value>)> {
        let dialect = self.dialect();
        if self.is_distinct() || self.is_grouped() {
            let inner = self.without_window();
            let mut params = Vec::new();
            let inner_sql = inner.compile_select_into(dialect, &mut params, 0)?;
            let sql = format!(
                "SELECT COUNT(*) AS {} FROM ({inner_sql}) AS {}",
                dialect.quote_identifier(AGGREGATE),
                dialect.quote_identifier("aggregate_table")
            );
            return Ok((sql, params));
        }
        self.without_projection()
            .with_columns(vec![Expr::count_all().alias(AGGREGATE)])
            .to_sql()
    }

    /// Run the query.
    pub async fn get<C: Connection>(&self, cx: &Cx, session: &Session<C>) -> Outcome<Vec<Row>, Error> {
        let (sql, params) = try_result!(self.to_sql());
        session.query(cx, &sql, &params).await
    }

    /// First row, if any.
    pub async fn first<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
    ) -> Outcome<Option<Row>, Error> {
        let rows = try_outcome!(self.clone().limit(1).get(cx, session).await);
        Outcome::Ok(rows.into_iter().next())
    }

    /// Row whose key column equals `id`.
    pub async fn find<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        id: impl Into<Value>,
    ) -> Outcome<Option<Row>, Error> {
        let key = self.key_column().to_string();
        self.clone().where_eq(key, id).first(cx, session).await
    }

    pub async fn count<C: Connection>(&self, cx: &Cx, session: &Session<C>) -> Outcome<u64, Error> {
        let (sql, params) = try_result!(self.compile_count());
        let rows = try_outcome!(session.query(cx, &sql, &params).await);
        let total = aggregate_value(&rows);
        let total = if total.is_null() {
            0
        } else {
            try_result!(<u64 as sqlrecord_core::FromValue>::from_value(&total))
        };
        Outcome::Ok(total)
    }

    async fn aggregate<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        expr: Expr,
    ) -> Outcome<Value, Error> {
        let query = self
            .without_projection()
            .with_columns(vec![expr.alias(AGGREGATE)]);
        let rows = try_outcome!(query.get(cx, session).await);
        Outcome::Ok(aggregate_value(&rows))
    }

    /// `SUM(column)`; zero when nothing matches.
    pub async fn sum<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        column: &str,
    ) -> Outcome<f64, Error> {
        let value = try_outcome!(self.aggregate(cx, session, Expr::col(column).sum()).await);
        Outcome::Ok(value.as_f64().unwrap_or(0.0))
    }

    /// `AVG(column)`; `None` when nothing matches.
    pub async fn avg<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        column: &str,
    ) -> Outcome<Option<f64>, Error> {
        let value = try_outcome!(self.aggregate(cx, session, Expr::col(column).avg()).await);
        Outcome::Ok(value.as_f64())
    }

    pub async fn min<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        column: &str,
    ) -> Outcome<Value, Error> {
        self.aggregate(cx, session, Expr::col(column).min()).await
    }

    pub async fn max<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        column: &str,
    ) -> Outcome<Value, Error> {
        self.aggregate(cx, session, Expr::col(column).max()).await
    }

    /// Values of a single column, in query order.
    pub async fn pluck<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        column: &str,
    ) -> Outcome<Vec<Value>, Error> {
        let query = self.clone().with_columns(vec![Expr::col(column)]);
        let rows = try_outcome!(query.get(cx, session).await);
        Outcome::Ok(
            rows.iter()
                .map(|row| {
                    row.get_by_name(bare_column(column))
                        .or_else(|| row.get(0))
                        .cloned()
                        .unwrap_or(Value::Null)
                })
                .collect(),
        )
    }

    /// Whether any row matches.
    pub async fn exists<C: Connection>(&self, cx: &Cx, session: &Session<C>) -> Outcome<bool, Error> {
        let query = self
            .without_projection()
            .with_columns(vec![Expr::raw("1", Vec::new())])
            .limit(1);
        let rows = try_outcome!(query.get(cx, session).await);
        Outcome::Ok(!rows.is_empty())
    }

    /// Count, then fetch one page.
    #[tracing::instrument(level = "debug", skip(self, cx, session), fields(table = %self.table()))]
    pub async fn paginate<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        page: u64,
        per_page: u64,
    ) -> Outcome<Page<Row>, Error> {
        if per_page == 0 {
            return Outcome::Err(Error::compilation("per_page must be greater than zero"));
        }
        let page = page.max(1);
        let total = try_outcome!(self.count(cx, session).await);
        let data = if total == 0 {
            Vec::new()
        } else {
            try_outcome!(self.clone().for_page(page, per_page).get(cx, session).await)
        };
        tracing::debug!(page, per_page, total, rows = data.len(), "Paginated");
        Outcome::Ok(Page::new(data, page, per_page, total))
    }

    /// Stream results in pages of `size` using LIMIT/OFFSET.
    ///
    /// The query must be ordered. Stops when `f` returns `false` or a page
    /// comes back short; returns `false` only if `f` stopped it.
    pub async fn chunk<C, F>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        size: u64,
        mut f: F,
    ) -> Outcome<bool, Error>
    where
        C: Connection,
        F: FnMut(Vec<Row>) -> bool,
    {
        if size == 0 {
            return Outcome::Err(Error::compilation("chunk size must be greater than zero"));
        }
        if !self.has_orders() {
            return Outcome::Err(Error::compilation(
                "chunk requires an ORDER BY clause for stable paging",
            ));
        }
        let mut page = 1;
        loop {
            let rows = try_outcome!(self.clone().for_page(page, size).get(cx, session).await);
            let fetched = rows.len() as u64;
            if fetched == 0 {
                return Outcome::Ok(true);
            }
            tracing::trace!(page, rows = fetched, "Chunk fetched");
            if !f(rows) {
                return Outcome::Ok(false);
            }
            if fetched < size {
                return Outcome::Ok(true);
            }
            page += 1;
        }
    }

    /// Stream results in pages of `size` using a `column > last` cursor.
    pub async fn chunk_by_id<C, F>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        size: u64,
        column: &str,
        mut f: F,
    ) -> Outcome<bool, Error>
    where
        C: Connection,
        F: FnMut(Vec<Row>) -> bool,
    {
        if size == 0 {
            return Outcome::Err(Error::compilation("chunk size must be greater than zero"));
        }
        let mut last: Option<Value> = None;
        loop {
            let mut query = self.clone().reorder().order_by(column).limit(size);
            if let Some(cursor) = last.take() {
                query = query.constrain(Predicate::Basic {
                    target: column.into(),
                    op: Op::Gt,
                    value: cursor,
                });
            }
            let rows = try_outcome!(query.get(cx, session).await);
            let fetched = rows.len() as u64;
            if fetched == 0 {
                return Outcome::Ok(true);
            }
            let Some(cursor) = rows
                .last()
                .and_then(|row| row.get_by_name(bare_column(column)))
                .cloned()
            else {
                return Outcome::Err(Error::compilation(format!(
                    "chunk_by_id column '{}' is missing from the results",
                    column
                )));
            };
            if !f(rows) {
                return Outcome::Ok(false);
            }
            if fetched < size {
                return Outcome::Ok(true);
            }
            last = Some(cursor);
        }
    }

    pub async fn insert<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        attributes: &Attributes,
    ) -> Outcome<ExecResult, Error> {
        let (sql, params) = try_result!(self.compile_insert(attributes));
        session.execute(cx, &sql, &params).await
    }

    pub async fn insert_many<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        rows: &[Attributes],
    ) -> Outcome<ExecResult, Error> {
        let (sql, params) = try_result!(self.compile_insert_many(rows));
        session.execute(cx, &sql, &params).await
    }

    /// UPDATE matching rows; returns rows affected.
    pub async fn update<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        assignments: &Attributes,
    ) -> Outcome<u64, Error> {
        let (sql, params) = try_result!(self.compile_update(assignments));
        session
            .execute(cx, &sql, &params)
            .await
            .map(|result| result.rows_affected)
    }

    /// DELETE matching rows; returns rows affected.
    pub async fn delete<C: Connection>(&self, cx: &Cx, session: &Session<C>) -> Outcome<u64, Error> {
        let (sql, params) = try_result!(self.compile_delete());
        session
            .execute(cx, &sql, &params)
            .await
            .map(|result| result.rows_affected)
    }

    pub async fn upsert<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        rows: &[Attributes],
        unique_by: &[&str],
        update_columns: &[&str],
    ) -> Outcome<u64, Error> {
        let (sql, params) = try_result!(self.compile_upsert(rows, unique_by, update_columns));
        session
            .execute(cx, &sql, &params)
            .await
            .map(|result| result.rows_affected)
    }
}
