//! Fluent SELECT builder.
//!
//! [`QueryBuilder`] accumulates clauses in call order and compiles them with
//! its dialect. It owns no connection: the execution helpers in
//! [`crate::fetch`] take the session explicitly.
//!
//! The user-facing WHERE chain is flat, with each clause attached to the one
//! before it by AND or OR. Internally added conditions (relation scopes,
//! soft-delete scopes, cursors, EXISTS sub-queries) live in a separate list of
//! constraint blocks that are always ANDed after the chain; the chain is
//! parenthesized when it contains an OR so the blocks cannot be bypassed.

use crate::clause::{Connector, OrderBy, Predicate, Target, WhereClause, compile_chain};
use crate::expr::{Direction, Expr, Op};
use crate::join::{Join, JoinType};
use sqlrecord_core::{Dialect, Error, Result, Value};

/// A SELECT query under construction.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    dialect: Dialect,
    key_name: String,
    columns: Vec<Expr>,
    distinct: bool,
    joins: Vec<Join>,
    wheres: Vec<WhereClause>,
    constraints: Vec<Predicate>,
    groups: Vec<String>,
    havings: Vec<WhereClause>,
    orders: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QueryBuilder {
    /// Create a builder selecting from `table`.
    pub fn new(table: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            table: table.into(),
            dialect,
            key_name: "id".to_string(),
            columns: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            wheres: Vec::new(),
            constraints: Vec::new(),
            groups: Vec::new(),
            havings: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Set the table to select from.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Column used by `find`. Defaults to `id`.
    pub fn key_name(mut self, column: impl Into<String>) -> Self {
        self.key_name = column.into();
        self
    }

    // ==================== Accessors ====================

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn key_column(&self) -> &str {
        &self.key_name
    }

    pub fn wheres(&self) -> &[WhereClause] {
        &self.wheres
    }

    pub fn constraints(&self) -> &[Predicate] {
        &self.constraints
    }

    pub fn has_orders(&self) -> bool {
        !self.orders.is_empty()
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn is_grouped(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    // ==================== WHERE ====================

    fn push_where(mut self, connector: Connector, predicate: Predicate) -> Self {
        self.wheres.push(WhereClause {
            connector,
            predicate,
        });
        self
    }

    /// `target = value`
    pub fn where_eq(self, target: impl Into<Target>, value: impl Into<Value>) -> Self {
        self.where_op(target, Op::Eq, value)
    }

    /// `target op value`
    pub fn where_op(self, target: impl Into<Target>, op: Op, value: impl Into<Value>) -> Self {
        self.push_where(
            Connector::And,
            Predicate::Basic {
                target: target.into(),
                op,
                value: value.into(),
            },
        )
    }

    pub fn or_where_eq(self, target: impl Into<Target>, value: impl Into<Value>) -> Self {
        self.or_where_op(target, Op::Eq, value)
    }

    pub fn or_where_op(self, target: impl Into<Target>, op: Op, value: impl Into<Value>) -> Self {
        self.push_where(
            Connector::Or,
            Predicate::Basic {
                target: target.into(),
                op,
                value: value.into(),
            },
        )
    }

    fn push_in<V: Into<Value>>(
        self,
        connector: Connector,
        target: impl Into<Target>,
        values: impl IntoIterator<Item = V>,
        negated: bool,
    ) -> Self {
        self.push_where(
            connector,
            Predicate::In {
                target: target.into(),
                values: values.into_iter().map(Into::into).collect(),
                negated,
            },
        )
    }

    /// `target IN (...)`; an empty list matches nothing.
    pub fn where_in<V: Into<Value>>(
        self,
        target: impl Into<Target>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_in(Connector::And, target, values, false)
    }

    /// `target NOT IN (...)`; an empty list adds no predicate.
    pub fn where_not_in<V: Into<Value>>(
        self,
        target: impl Into<Target>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_in(Connector::And, target, values, true)
    }

    pub fn or_where_in<V: Into<Value>>(
        self,
        target: impl Into<Target>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_in(Connector::Or, target, values, false)
    }

    pub fn or_where_not_in<V: Into<Value>>(
        self,
        target: impl Into<Target>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_in(Connector::Or, target, values, true)
    }

    pub fn where_null(self, target: impl Into<Target>) -> Self {
        self.push_where(
            Connector::And,
            Predicate::Null {
                target: target.into(),
                negated: false,
            },
        )
    }

    pub fn where_not_null(self, target: impl Into<Target>) -> Self {
        self.push_where(
            Connector::And,
            Predicate::Null {
                target: target.into(),
                negated: true,
            },
        )
    }

    pub fn or_where_null(self, target: impl Into<Target>) -> Self {
        self.push_where(
            Connector::Or,
            Predicate::Null {
                target: target.into(),
                negated: false,
            },
        )
    }

    pub fn or_where_not_null(self, target: impl Into<Target>) -> Self {
        self.push_where(
            Connector::Or,
            Predicate::Null {
                target: target.into(),
                negated: true,
            },
        )
    }

    pub fn where_between(
        self,
        target: impl Into<Target>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_where(
            Connector::And,
            Predicate::Between {
                target: target.into(),
                low: low.into(),
                high: high.into(),
                negated: false,
            },
        )
    }

    pub fn where_not_between(
        self,
        target: impl Into<Target>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_where(
            Connector::And,
            Predicate::Between {
                target: target.into(),
                low: low.into(),
                high: high.into(),
                negated: true,
            },
        )
    }

    /// Trusted SQL; `?` markers bind `params` in order.
    pub fn where_raw(self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.push_where(
            Connector::And,
            Predicate::Raw {
                sql: sql.into(),
                params,
            },
        )
    }

    pub fn or_where_raw(self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.push_where(
            Connector::Or,
            Predicate::Raw {
                sql: sql.into(),
                params,
            },
        )
    }

    /// Compare two columns.
    pub fn where_column(self, left: impl Into<String>, op: Op, right: impl Into<String>) -> Self {
        self.push_where(
            Connector::And,
            Predicate::Column {
                left: left.into(),
                op,
                right: right.into(),
            },
        )
    }

    /// A boolean expression as predicate.
    pub fn where_expr(self, expr: Expr) -> Self {
        self.push_where(Connector::And, Predicate::Expr(expr))
    }

    fn exists_block<F>(mut self, build: F, negated: bool) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let query = build(QueryBuilder::new("", self.dialect));
        self.constraints.push(Predicate::Exists {
            query: Box::new(query),
            negated,
        });
        self
    }

    /// `EXISTS (sub-query)`, ANDed after the chain.
    ///
    /// ```rust,ignore
    /// let with_posts = QueryBuilder::new("users", Dialect::Postgres)
    ///     .where_exists(|q| q.from("posts").where_column("posts.user_id", Op::Eq, "users.id"));
    /// ```
    pub fn where_exists<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.exists_block(build, false)
    }

    pub fn where_not_exists<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.exists_block(build, true)
    }

    /// Append an always-ANDed constraint block.
    pub fn constrain(mut self, predicate: Predicate) -> Self {
        self.constraints.push(predicate);
        self
    }

    // ==================== SELECT list ====================

    /// Replace the select list with plain columns.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| Expr::col(*c)).collect();
        self
    }

    pub fn add_select(mut self, columns: &[&str]) -> Self {
        self.columns.extend(columns.iter().map(|c| Expr::col(*c)));
        self
    }

    pub fn select_expr(mut self, expr: Expr) -> Self {
        self.columns.push(expr);
        self
    }

    pub fn select_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.columns.push(Expr::raw(sql, params));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== JOIN ====================

    pub fn join(
        mut self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: Op,
        second: impl Into<String>,
    ) -> Self {
        self.joins
            .push(Join::new(JoinType::Inner, table, first, op, second));
        self
    }

    pub fn left_join(
        mut self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: Op,
        second: impl Into<String>,
    ) -> Self {
        self.joins
            .push(Join::new(JoinType::Left, table, first, op, second));
        self
    }

    pub fn right_join(
        mut self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: Op,
        second: impl Into<String>,
    ) -> Self {
        self.joins
            .push(Join::new(JoinType::Right, table, first, op, second));
        self
    }

    pub fn cross_join(mut self, table: impl Into<String>) -> Self {
        self.joins.push(Join::cross(table));
        self
    }

    /// Add a fully built join.
    pub fn join_clause(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    // ==================== GROUP BY / HAVING ====================

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.groups.extend(columns.iter().map(|c| (*c).to_string()));
        self
    }

    pub fn having_op(mut self, target: impl Into<Target>, op: Op, value: impl Into<Value>) -> Self {
        self.havings.push(WhereClause::and(Predicate::Basic {
            target: target.into(),
            op,
            value: value.into(),
        }));
        self
    }

    pub fn having_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.havings.push(WhereClause::and(Predicate::Raw {
            sql: sql.into(),
            params,
        }));
        self
    }

    // ==================== ORDER BY / window ====================

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.orders.push(OrderBy::asc(column));
        self
    }

    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.orders.push(OrderBy::desc(column));
        self
    }

    pub fn order_by_expr(mut self, expr: Expr, direction: Direction) -> Self {
        self.orders.push(OrderBy {
            expr,
            direction: Some(direction),
        });
        self
    }

    pub fn order_by_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.orders.push(OrderBy::raw(sql, params));
        self
    }

    /// Newest first by `column`.
    pub fn latest(self, column: impl Into<String>) -> Self {
        self.order_by_desc(column)
    }

    /// Oldest first by `column`.
    pub fn oldest(self, column: impl Into<String>) -> Self {
        self.order_by(column)
    }

    /// Drop every ORDER BY item.
    pub fn reorder(mut self) -> Self {
        self.orders.clear();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// LIMIT/OFFSET for a 1-based page; page 0 is treated as page 1.
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.offset((page - 1) * per_page).limit(per_page)
    }

    /// Same query with order and window cleared.
    pub(crate) fn without_window(&self) -> Self {
        let mut query = self.clone();
        query.orders.clear();
        query.limit = None;
        query.offset = None;
        query
    }

    /// Same query with select list, order and window cleared.
    pub(crate) fn without_projection(&self) -> Self {
        let mut query = self.without_window();
        query.columns.clear();
        query
    }

    pub(crate) fn with_columns(mut self, columns: Vec<Expr>) -> Self {
        self.columns = columns;
        self
    }

    // ==================== Compilation ====================

    /// Compile to SQL and ordered parameters.
    #[allow(clippy::result_large_err)]
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let sql = self.compile_select_into(self.dialect, &mut params, 0)?;
        tracing::trace!(
            table = %self.table,
            dialect = %self.dialect,
            sql = %sql,
            param_count = params.len(),
            "Compiled SELECT"
        );
        Ok((sql, params))
    }

    #[allow(clippy::result_large_err)]
    pub(crate) fn quoted_table(&self, dialect: Dialect) -> Result<String> {
        if self.table.trim().is_empty() {
            return Err(Error::compilation("query has no table; call from() first"));
        }
        Ok(dialect.quote_column(&self.table))
    }

    /// Everything after WHERE: the flat chain, then the constraint blocks.
    #[allow(clippy::result_large_err)]
    pub(crate) fn compile_where_into(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> Result<Option<String>> {
        let mut parts = Vec::new();
        if let Some((chain, has_or)) = compile_chain(&self.wheres, dialect, params, offset)? {
            if has_or && !self.constraints.is_empty() {
                parts.push(format!("({chain})"));
            } else {
                parts.push(chain);
            }
        }
        for constraint in &self.constraints {
            if let Some(sql) = constraint.compile_into(dialect, params, offset)? {
                parts.push(sql);
            }
        }
        Ok((!parts.is_empty()).then(|| parts.join(" AND ")))
    }

    /// Compile the SELECT into a shared parameter vector.
    #[allow(clippy::result_large_err)]
    pub(crate) fn compile_select_into(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> Result<String> {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let mut columns = Vec::with_capacity(self.columns.len());
            for column in &self.columns {
                columns.push(column.compile_into(dialect, params, offset)?);
            }
            sql.push_str(&columns.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.quoted_table(dialect)?);

        for join in &self.joins {
            sql.push_str(&join.to_sql(dialect));
        }

        if let Some(condition) = self.compile_where_into(dialect, params, offset)? {
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }

        if !self.groups.is_empty() {
            let groups: Vec<String> = self.groups.iter().map(|g| dialect.quote_column(g)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        if let Some((having, _)) = compile_chain(&self.havings, dialect, params, offset)? {
            sql.push_str(" HAVING ");
            sql.push_str(&having);
        }

        if !self.orders.is_empty() {
            let mut orders = Vec::with_capacity(self.orders.len());
            for order in &self.orders {
                orders.push(order.compile_into(dialect, params, offset)?);
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(skip)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {skip}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(skip)) => match dialect {
                Dialect::Postgres => sql.push_str(&format!(" OFFSET {skip}")),
                // MySQL and SQLite reject OFFSET without LIMIT
                Dialect::Mysql | Dialect::Mariadb => {
                    sql.push_str(&format!(" LIMIT 18446744073709551615 OFFSET {skip}"));
                }
                Dialect::Sqlite => sql.push_str(&format!(" LIMIT -1 OFFSET {skip}")),
            },
            (None, None) => {}
        }

        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Dialect; 4] = [
        Dialect::Postgres,
        Dialect::Mysql,
        Dialect::Mariadb,
        Dialect::Sqlite,
    ];

    fn users(dialect: Dialect) -> QueryBuilder {
        QueryBuilder::new("users", dialect)
    }

    #[test]
    fn test_select_star() {
        let (sql, params) = users(Dialect::Postgres).to_sql().unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_two_and_three_arg_where_compile_identically() {
        for dialect in ALL {
            let two = users(dialect).where_eq("status", "active").to_sql().unwrap();
            let three = users(dialect)
                .where_op("status", Op::Eq, "active")
                .to_sql()
                .unwrap();
            assert_eq!(two, three);
        }
    }

    #[test]
    fn test_empty_in_lists() {
        let (sql, _) = users(Dialect::Postgres).where_in("id", Vec::<i64>::new()).to_sql().unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE 1 = 0");

        let (sql, params) = users(Dialect::Postgres)
            .where_not_in("id", Vec::<i64>::new())
            .to_sql()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_expression_target_numbering() {
        let total = Expr::col("price").mul(Expr::col("quantity"));
        let (sql, params) = QueryBuilder::new("orders", Dialect::Postgres)
            .where_eq("status", "active")
            .where_op(total, Op::Gt, 500)
            .where_eq("user_id", 10)
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"orders\" WHERE \"status\" = $1 AND (\"price\" * \"quantity\") > $2 AND \"user_id\" = $3"
        );
        assert_eq!(
            params,
            vec![Value::from("active"), Value::Int(500), Value::Int(10)]
        );
    }

    #[test]
    fn test_in_between_and_null() {
        let (sql, params) = users(Dialect::Postgres)
            .where_in("id", [1, 2])
            .where_between("age", 18, 65)
            .or_where_null("banned_at")
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE \"id\" IN ($1, $2) AND \"age\" BETWEEN $3 AND $4 OR \"banned_at\" IS NULL"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_constraints_follow_parenthesized_or_chain() {
        let (sql, params) = QueryBuilder::new("posts", Dialect::Sqlite)
            .where_eq("status", "draft")
            .or_where_eq("status", "review")
            .constrain(Predicate::Null {
                target: "deleted_at".into(),
                negated: false,
            })
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"posts\" WHERE (\"status\" = ? OR \"status\" = ?) AND \"deleted_at\" IS NULL"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_where_exists_uses_same_dialect_and_numbering() {
        let (sql, params) = users(Dialect::Postgres)
            .where_eq("active", true)
            .where_exists(|q| {
                q.from("posts")
                    .where_column("posts.user_id", Op::Eq, "users.id")
                    .where_op("posts.votes", Op::Gt, 10)
            })
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE \"active\" = $1 AND EXISTS (SELECT * FROM \"posts\" WHERE \"posts\".\"user_id\" = \"users\".\"id\" AND \"posts\".\"votes\" > $2)"
        );
        assert_eq!(params, vec![Value::Bool(true), Value::Int(10)]);
    }

    #[test]
    fn test_exists_without_table_is_an_error() {
        let err = users(Dialect::Postgres)
            .where_not_exists(|q| q)
            .to_sql()
            .unwrap_err();
        assert!(err.is_compilation_error());
    }

    #[test]
    fn test_full_clause_order() {
        let (sql, params) = users(Dialect::Mysql)
            .select(&["users.id", "users.name"])
            .select_expr(Expr::col("posts.id").count().alias("post_count"))
            .distinct()
            .left_join("posts", "users.id", Op::Eq, "posts.user_id")
            .where_eq("users.active", true)
            .group_by(&["users.id", "users.name"])
            .having_op(Expr::col("posts.id").count(), Op::Ge, 3)
            .order_by_desc("post_count")
            .order_by("users.name")
            .for_page(3, 20)
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT DISTINCT `users`.`id`, `users`.`name`, COUNT(`posts`.`id`) AS `post_count` FROM `users` LEFT JOIN `posts` ON `users`.`id` = `posts`.`user_id` WHERE `users`.`active` = ? GROUP BY `users`.`id`, `users`.`name` HAVING COUNT(`posts`.`id`) >= ? ORDER BY `post_count` DESC, `users`.`name` ASC LIMIT 20 OFFSET 40"
        );
        assert_eq!(params, vec![Value::Bool(true), Value::Int(3)]);
    }

    #[test]
    fn test_offset_without_limit_per_dialect() {
        let sql = |d| users(d).offset(5).to_sql().unwrap().0;
        assert!(sql(Dialect::Postgres).ends_with("FROM \"users\" OFFSET 5"));
        assert!(sql(Dialect::Sqlite).ends_with("LIMIT -1 OFFSET 5"));
        assert!(sql(Dialect::Mysql).ends_with("LIMIT 18446744073709551615 OFFSET 5"));
    }

    #[test]
    fn test_select_raw_and_order_raw() {
        let (sql, params) = users(Dialect::Postgres)
            .select_raw("COUNT(*) FILTER (WHERE age > ?) AS adults", vec![Value::Int(17)])
            .where_raw("name LIKE ?", vec![Value::from("a%")])
            .order_by_raw("RANDOM()", vec![])
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FILTER (WHERE age > $1) AS adults FROM \"users\" WHERE (name LIKE $2) ORDER BY RANDOM()"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let q = users(Dialect::Postgres).for_page(0, 10);
        assert_eq!(q.offset_value(), Some(0));
        assert_eq!(q.limit_value(), Some(10));
    }
}
