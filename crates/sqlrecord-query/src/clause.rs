//! WHERE, HAVING and ORDER BY clauses.

use crate::builder::QueryBuilder;
use crate::expr::{Direction, Expr, Op, bind, compile_raw};
use sqlrecord_core::{Dialect, Result, Value};

/// How a clause joins the one before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    pub const fn as_str(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// Left-hand side of a predicate: a plain column or a computed expression.
#[derive(Debug, Clone)]
pub enum Target {
    Column(String),
    Expr(Expr),
}

impl Target {
    fn compile_into(&self, dialect: Dialect, params: &mut Vec<Value>, offset: usize) -> Result<String> {
        match self {
            Target::Column(path) => Ok(dialect.quote_column(path)),
            Target::Expr(expr) => expr.compile_into(dialect, params, offset),
        }
    }
}

impl From<&str> for Target {
    fn from(column: &str) -> Self {
        Target::Column(column.to_string())
    }
}

impl From<String> for Target {
    fn from(column: String) -> Self {
        Target::Column(column)
    }
}

impl From<&String> for Target {
    fn from(column: &String) -> Self {
        Target::Column(column.clone())
    }
}

impl From<Expr> for Target {
    fn from(expr: Expr) -> Self {
        Target::Expr(expr)
    }
}

/// A single condition.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `target op value`; `= NULL` and `<> NULL` become IS [NOT] NULL
    Basic {
        target: Target,
        op: Op,
        value: Value,
    },
    /// `target [NOT] IN (...)`
    In {
        target: Target,
        values: Vec<Value>,
        negated: bool,
    },
    /// `target IS [NOT] NULL`
    Null { target: Target, negated: bool },
    /// `target [NOT] BETWEEN low AND high`
    Between {
        target: Target,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// Column-to-column comparison
    Column { left: String, op: Op, right: String },
    /// Trusted SQL with its own bound values
    Raw { sql: String, params: Vec<Value> },
    /// `[NOT] EXISTS (subquery)`
    Exists {
        query: Box<QueryBuilder>,
        negated: bool,
    },
    /// A boolean expression
    Expr(Expr),
}

impl Predicate {
    /// Compile the predicate. `None` means it contributes nothing
    /// (an empty NOT IN list).
    #[allow(clippy::result_large_err)]
    pub fn compile_into(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> Result<Option<String>> {
        let sql = match self {
            Predicate::Basic { target, op, value } => {
                let lhs = target.compile_into(dialect, params, offset)?;
                match (op, value) {
                    (Op::Eq, Value::Null) => format!("{lhs} IS NULL"),
                    (Op::Ne, Value::Null) => format!("{lhs} IS NOT NULL"),
                    _ => {
                        let rhs = bind(dialect, params, offset, value.clone());
                        op.render(dialect, &lhs, &rhs)
                    }
                }
            }
            Predicate::In {
                target,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // IN () matches nothing; NOT IN () filters nothing
                    return Ok(if *negated { None } else { Some("1 = 0".to_string()) });
                }
                let lhs = target.compile_into(dialect, params, offset)?;
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| bind(dialect, params, offset, v.clone()))
                    .collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{lhs} {keyword} ({})", placeholders.join(", "))
            }
            Predicate::Null { target, negated } => {
                let lhs = target.compile_into(dialect, params, offset)?;
                if *negated {
                    format!("{lhs} IS NOT NULL")
                } else {
                    format!("{lhs} IS NULL")
                }
            }
            Predicate::Between {
                target,
                low,
                high,
                negated,
            } => {
                let lhs = target.compile_into(dialect, params, offset)?;
                let low = bind(dialect, params, offset, low.clone());
                let high = bind(dialect, params, offset, high.clone());
                let keyword = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                format!("{lhs} {keyword} {low} AND {high}")
            }
            Predicate::Column { left, op, right } => op.render(
                dialect,
                &dialect.quote_column(left),
                &dialect.quote_column(right),
            ),
            Predicate::Raw { sql, params: values } => {
                format!("({})", compile_raw(dialect, sql, values, params, offset)?)
            }
            Predicate::Exists { query, negated } => {
                let inner = query.compile_select_into(dialect, params, offset)?;
                if *negated {
                    format!("NOT EXISTS ({inner})")
                } else {
                    format!("EXISTS ({inner})")
                }
            }
            Predicate::Expr(expr) => expr.compile_into(dialect, params, offset)?,
        };
        Ok(Some(sql))
    }
}

/// A predicate plus the connector joining it to the previous one.
#[derive(Debug, Clone)]
pub struct WhereClause {
    pub connector: Connector,
    pub predicate: Predicate,
}

impl WhereClause {
    pub fn and(predicate: Predicate) -> Self {
        Self {
            connector: Connector::And,
            predicate,
        }
    }

    pub fn or(predicate: Predicate) -> Self {
        Self {
            connector: Connector::Or,
            predicate,
        }
    }
}

/// Compile a flat clause chain. The first emitted clause drops its
/// connector. Returns the SQL and whether an OR joins any two clauses.
#[allow(clippy::result_large_err)]
pub(crate) fn compile_chain(
    clauses: &[WhereClause],
    dialect: Dialect,
    params: &mut Vec<Value>,
    offset: usize,
) -> Result<Option<(String, bool)>> {
    let mut sql = String::new();
    let mut has_or = false;
    for clause in clauses {
        let Some(fragment) = clause.predicate.compile_into(dialect, params, offset)? else {
            continue;
        };
        if !sql.is_empty() {
            has_or |= clause.connector == Connector::Or;
            sql.push(' ');
            sql.push_str(clause.connector.as_str());
            sql.push(' ');
        }
        sql.push_str(&fragment);
    }
    Ok((!sql.is_empty()).then_some((sql, has_or)))
}

/// ORDER BY item.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub expr: Expr,
    /// `None` for raw orderings that carry their own direction
    pub direction: Option<Direction>,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            expr: Expr::Column(column.into()),
            direction: Some(Direction::Asc),
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            expr: Expr::Column(column.into()),
            direction: Some(Direction::Desc),
        }
    }

    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            expr: Expr::raw(sql, params),
            direction: None,
        }
    }

    #[allow(clippy::result_large_err)]
    pub fn compile_into(&self, dialect: Dialect, params: &mut Vec<Value>, offset: usize) -> Result<String> {
        let sql = self.expr.compile_into(dialect, params, offset)?;
        Ok(match self.direction {
            Some(direction) => format!("{sql} {}", direction.as_str()),
            None => sql,
        })
    }
}
