//! SQL expressions.
//!
//! [`Expr`] is a closed tree of SQL fragments. Compiling is a pure function of
//! the dialect and a parameter offset: every literal becomes a bound
//! parameter, every identifier is quoted, and composite nodes share one
//! parameter vector so placeholder numbers grow monotonically through a whole
//! statement.

use crate::builder::QueryBuilder;
use regex::Regex;
use sqlrecord_core::{Dialect, Error, Result, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    Like,
    NotLike,
    /// Case-insensitive LIKE; emulated with LOWER() outside Postgres
    ILike,
}

impl Op {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
            Op::ILike => "ILIKE",
        }
    }

    /// Render `left OP right`, spelling ILIKE for the dialect.
    pub(crate) fn render(self, dialect: Dialect, left: &str, right: &str) -> String {
        if self == Op::ILike && !dialect.supports_ilike() {
            format!("LOWER({left}) LIKE LOWER({right})")
        } else {
            format!("{left} {} {right}", self.as_str())
        }
    }
}

impl FromStr for Op {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(Op::Eq),
            "!=" | "<>" => Ok(Op::Ne),
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Le),
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Ge),
            "LIKE" => Ok(Op::Like),
            "NOT LIKE" => Ok(Op::NotLike),
            "ILIKE" => Ok(Op::ILike),
            _ => Err(Error::compilation(format!("unknown operator '{}'", s))),
        }
    }
}

impl TryFrom<&str> for Op {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

/// Portable cast targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Text,
    Integer,
    BigInt,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Json,
    Uuid,
}

impl CastType {
    /// Type name used in `CAST(x AS ...)`.
    pub const fn sql_name(self, dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Postgres => match self {
                CastType::Text => "TEXT",
                CastType::Integer => "INTEGER",
                CastType::BigInt => "BIGINT",
                CastType::Float => "DOUBLE PRECISION",
                CastType::Decimal => "NUMERIC",
                CastType::Boolean => "BOOLEAN",
                CastType::Date => "DATE",
                CastType::DateTime => "TIMESTAMP",
                CastType::Json => "JSONB",
                CastType::Uuid => "UUID",
            },
            Dialect::Mysql | Dialect::Mariadb => match self {
                CastType::Text => "CHAR",
                CastType::Integer | CastType::BigInt => "SIGNED",
                CastType::Float => "DOUBLE",
                CastType::Decimal => "DECIMAL",
                CastType::Boolean => "UNSIGNED",
                CastType::Date => "DATE",
                CastType::DateTime => "DATETIME",
                CastType::Json => "JSON",
                CastType::Uuid => "CHAR(36)",
            },
            Dialect::Sqlite => match self {
                CastType::Text | CastType::Date | CastType::DateTime | CastType::Json => "TEXT",
                CastType::Uuid => "TEXT",
                CastType::Integer | CastType::BigInt | CastType::Boolean => "INTEGER",
                CastType::Float => "REAL",
                CastType::Decimal => "NUMERIC",
            },
        }
    }
}

/// Date parts for [`DateFn::Extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    /// 0 = Sunday in every dialect
    DayOfWeek,
}

impl DatePart {
    const fn postgres_field(self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
            DatePart::DayOfWeek => "DOW",
        }
    }

    const fn strftime_format(self) -> &'static str {
        match self {
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
            DatePart::Day => "%d",
            DatePart::Hour => "%H",
            DatePart::Minute => "%M",
            DatePart::Second => "%S",
            DatePart::DayOfWeek => "%w",
        }
    }
}

/// String functions.
#[derive(Debug, Clone)]
pub enum StringFn {
    Concat(Vec<Expr>),
    Upper(Box<Expr>),
    Lower(Box<Expr>),
    Length(Box<Expr>),
    Trim(Box<Expr>),
    /// 1-based start, optional length
    Substring {
        expr: Box<Expr>,
        start: i64,
        length: Option<i64>,
    },
    Replace {
        expr: Box<Expr>,
        from: Box<Expr>,
        to: Box<Expr>,
    },
}

/// Date functions.
#[derive(Debug, Clone)]
pub enum DateFn {
    Extract { part: DatePart, expr: Box<Expr> },
    /// Date portion of a timestamp
    DateOf(Box<Expr>),
    Now,
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub const fn as_str(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// A SQL expression that can be used in SELECT, WHERE, HAVING and ORDER BY.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Column reference; dotted paths are table-qualified
    Column(String),

    /// Literal value, always bound as a parameter
    Literal(Value),

    /// `expr AS "name"`
    Alias { expr: Box<Expr>, name: String },

    /// Trusted SQL; each `?` consumes the next parameter, `??` is a literal `?`
    Raw { sql: String, params: Vec<Value> },

    /// `CAST(expr AS type)`
    Cast { expr: Box<Expr>, to: CastType },

    /// `(left op right)`
    Arithmetic {
        left: Box<Expr>,
        op: ArithOp,
        right: Box<Expr>,
    },

    /// `(left op right)`
    Compare {
        left: Box<Expr>,
        op: Op,
        right: Box<Expr>,
    },

    String(StringFn),

    Date(DateFn),

    Coalesce(Vec<Expr>),

    NullIf(Box<Expr>, Box<Expr>),

    /// Aggregate; `arg: None` means `*`
    Aggregate {
        func: AggregateFn,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },

    /// CASE WHEN ... THEN ... ELSE ... END
    CaseWhen {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },

    /// Scalar read out of a JSON column (`settings`, `theme.colors[0]`)
    JsonExtract { column: String, path: String },

    /// Parenthesized sub-select
    SubQuery(Box<QueryBuilder>),

    /// `expr OVER (PARTITION BY ... ORDER BY ...)`
    Window {
        expr: Box<Expr>,
        partition_by: Vec<Expr>,
        order_by: Vec<(Expr, Direction)>,
    },
}

impl Expr {
    // ==================== Constructors ====================

    /// Create a column reference expression.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    /// Create a literal value expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a raw SQL expression with its own bound values.
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Expr::Raw {
            sql: sql.into(),
            params,
        }
    }

    /// `NOW()` / `CURRENT_TIMESTAMP`
    pub fn now() -> Self {
        Expr::Date(DateFn::Now)
    }

    /// `COUNT(*)`
    pub fn count_all() -> Self {
        Expr::Aggregate {
            func: AggregateFn::Count,
            arg: None,
            distinct: false,
        }
    }

    pub fn concat(parts: Vec<Expr>) -> Self {
        Expr::String(StringFn::Concat(parts))
    }

    pub fn coalesce(args: Vec<Expr>) -> Self {
        Expr::Coalesce(args)
    }

    pub fn null_if(left: Expr, right: Expr) -> Self {
        Expr::NullIf(Box::new(left), Box::new(right))
    }

    /// JSON scalar at `path` inside `column`.
    pub fn json(column: impl Into<String>, path: impl Into<String>) -> Self {
        Expr::JsonExtract {
            column: column.into(),
            path: path.into(),
        }
    }

    pub fn subquery(query: QueryBuilder) -> Self {
        Expr::SubQuery(Box::new(query))
    }

    /// Start a CASE expression.
    pub fn case() -> CaseBuilder {
        CaseBuilder {
            branches: Vec::new(),
        }
    }

    // ==================== Combinators ====================

    pub fn alias(self, name: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    pub fn cast(self, to: CastType) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            to,
        }
    }

    fn arithmetic(self, op: ArithOp, other: Expr) -> Self {
        Expr::Arithmetic {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn add(self, other: Expr) -> Self {
        self.arithmetic(ArithOp::Add, other)
    }

    pub fn sub(self, other: Expr) -> Self {
        self.arithmetic(ArithOp::Sub, other)
    }

    pub fn mul(self, other: Expr) -> Self {
        self.arithmetic(ArithOp::Mul, other)
    }

    pub fn div(self, other: Expr) -> Self {
        self.arithmetic(ArithOp::Div, other)
    }

    pub fn modulo(self, other: Expr) -> Self {
        self.arithmetic(ArithOp::Mod, other)
    }

    /// `(self op other)`
    pub fn compare(self, op: Op, other: Expr) -> Self {
        Expr::Compare {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Self {
        self.compare(Op::Eq, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        self.compare(Op::Gt, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        self.compare(Op::Lt, other)
    }

    pub fn upper(self) -> Self {
        Expr::String(StringFn::Upper(Box::new(self)))
    }

    pub fn lower(self) -> Self {
        Expr::String(StringFn::Lower(Box::new(self)))
    }

    pub fn length(self) -> Self {
        Expr::String(StringFn::Length(Box::new(self)))
    }

    pub fn trim(self) -> Self {
        Expr::String(StringFn::Trim(Box::new(self)))
    }

    pub fn substring(self, start: i64, length: Option<i64>) -> Self {
        Expr::String(StringFn::Substring {
            expr: Box::new(self),
            start,
            length,
        })
    }

    pub fn replace(self, from: Expr, to: Expr) -> Self {
        Expr::String(StringFn::Replace {
            expr: Box::new(self),
            from: Box::new(from),
            to: Box::new(to),
        })
    }

    pub fn extract(self, part: DatePart) -> Self {
        Expr::Date(DateFn::Extract {
            part,
            expr: Box::new(self),
        })
    }

    pub fn date_of(self) -> Self {
        Expr::Date(DateFn::DateOf(Box::new(self)))
    }

    fn aggregate(self, func: AggregateFn, distinct: bool) -> Self {
        Expr::Aggregate {
            func,
            arg: Some(Box::new(self)),
            distinct,
        }
    }

    pub fn count(self) -> Self {
        self.aggregate(AggregateFn::Count, false)
    }

    pub fn count_distinct(self) -> Self {
        self.aggregate(AggregateFn::Count, true)
    }

    pub fn sum(self) -> Self {
        self.aggregate(AggregateFn::Sum, false)
    }

    pub fn avg(self) -> Self {
        self.aggregate(AggregateFn::Avg, false)
    }

    pub fn min(self) -> Self {
        self.aggregate(AggregateFn::Min, false)
    }

    pub fn max(self) -> Self {
        self.aggregate(AggregateFn::Max, false)
    }

    /// Turn this expression into a window function.
    pub fn over(self, partition_by: Vec<Expr>, order_by: Vec<(Expr, Direction)>) -> Self {
        Expr::Window {
            expr: Box::new(self),
            partition_by,
            order_by,
        }
    }

    // ==================== Compilation ====================

    /// Compile to SQL and its ordered parameters.
    ///
    /// `offset` is the number of parameters already bound earlier in the
    /// statement; it only shifts Postgres placeholder numbers.
    #[allow(clippy::result_large_err)]
    pub fn compile(&self, dialect: Dialect, offset: usize) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let sql = self.compile_into(dialect, &mut params, offset)?;
        tracing::trace!(dialect = %dialect, sql = %sql, param_count = params.len(), "Compiled expression");
        Ok((sql, params))
    }

    /// Compile into a shared parameter vector.
    #[allow(clippy::result_large_err)]
    pub fn compile_into(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> Result<String> {
        let sql = match self {
            Expr::Column(path) => dialect.quote_column(path),

            Expr::Literal(value) => bind(dialect, params, offset, value.clone()),

            Expr::Alias { expr, name } => format!(
                "{} AS {}",
                expr.compile_into(dialect, params, offset)?,
                dialect.quote_identifier(name)
            ),

            Expr::Raw { sql, params: values } => {
                compile_raw(dialect, sql, values, params, offset)?
            }

            Expr::Cast { expr, to } => format!(
                "CAST({} AS {})",
                expr.compile_into(dialect, params, offset)?,
                to.sql_name(dialect)
            ),

            Expr::Arithmetic { left, op, right } => {
                let left = left.compile_into(dialect, params, offset)?;
                let right = right.compile_into(dialect, params, offset)?;
                format!("({left} {} {right})", op.as_str())
            }

            Expr::Compare { left, op, right } => {
                let left = left.compile_into(dialect, params, offset)?;
                let right = right.compile_into(dialect, params, offset)?;
                format!("({})", op.render(dialect, &left, &right))
            }

            Expr::String(func) => compile_string_fn(func, dialect, params, offset)?,

            Expr::Date(func) => compile_date_fn(func, dialect, params, offset)?,

            Expr::Coalesce(args) => {
                format!("COALESCE({})", compile_list(args, dialect, params, offset)?)
            }

            Expr::NullIf(left, right) => {
                let left = left.compile_into(dialect, params, offset)?;
                let right = right.compile_into(dialect, params, offset)?;
                format!("NULLIF({left}, {right})")
            }

            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                let arg_sql = match arg {
                    Some(arg) => arg.compile_into(dialect, params, offset)?,
                    None => "*".to_string(),
                };
                if *distinct {
                    format!("{}(DISTINCT {arg_sql})", func.as_str())
                } else {
                    format!("{}({arg_sql})", func.as_str())
                }
            }

            Expr::CaseWhen {
                branches,
                otherwise,
            } => {
                if branches.is_empty() {
                    return Err(Error::compilation("CASE requires at least one WHEN branch"));
                }
                let mut sql = String::from("CASE");
                for (condition, result) in branches {
                    let condition = condition.compile_into(dialect, params, offset)?;
                    let result = result.compile_into(dialect, params, offset)?;
                    sql.push_str(&format!(" WHEN {condition} THEN {result}"));
                }
                if let Some(otherwise) = otherwise {
                    let otherwise = otherwise.compile_into(dialect, params, offset)?;
                    sql.push_str(&format!(" ELSE {otherwise}"));
                }
                sql.push_str(" END");
                sql
            }

            Expr::JsonExtract { column, path } => {
                compile_json_extract(column, path, dialect, params, offset)?
            }

            Expr::SubQuery(query) => {
                format!("({})", query.compile_select_into(dialect, params, offset)?)
            }

            Expr::Window {
                expr,
                partition_by,
                order_by,
            } => {
                let inner = expr.compile_into(dialect, params, offset)?;
                let mut window = Vec::new();
                if !partition_by.is_empty() {
                    window.push(format!(
                        "PARTITION BY {}",
                        compile_list(partition_by, dialect, params, offset)?
                    ));
                }
                if !order_by.is_empty() {
                    let mut orders = Vec::with_capacity(order_by.len());
                    for (expr, direction) in order_by {
                        let sql = expr.compile_into(dialect, params, offset)?;
                        orders.push(format!("{sql} {}", direction.as_str()));
                    }
                    window.push(format!("ORDER BY {}", orders.join(", ")));
                }
                format!("{inner} OVER ({})", window.join(" "))
            }
        };
        Ok(sql)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

/// Builder for CASE expressions.
#[derive(Debug, Clone)]
pub struct CaseBuilder {
    branches: Vec<(Expr, Expr)>,
}

impl CaseBuilder {
    /// Add a WHEN condition THEN result branch.
    pub fn when(mut self, condition: Expr, result: Expr) -> Self {
        self.branches.push((condition, result));
        self
    }

    /// Finish with an ELSE branch.
    pub fn otherwise(self, result: Expr) -> Expr {
        Expr::CaseWhen {
            branches: self.branches,
            otherwise: Some(Box::new(result)),
        }
    }

    /// Finish without an ELSE branch.
    pub fn end(self) -> Expr {
        Expr::CaseWhen {
            branches: self.branches,
            otherwise: None,
        }
    }
}

/// Push a value and return its placeholder.
pub(crate) fn bind(dialect: Dialect, params: &mut Vec<Value>, offset: usize, value: Value) -> String {
    if matches!(value, Value::Default) {
        return "DEFAULT".to_string();
    }
    params.push(value);
    dialect.placeholder(offset + params.len())
}

fn compile_list(
    exprs: &[Expr],
    dialect: Dialect,
    params: &mut Vec<Value>,
    offset: usize,
) -> Result<String> {
    let mut parts = Vec::with_capacity(exprs.len());
    for expr in exprs {
        parts.push(expr.compile_into(dialect, params, offset)?);
    }
    Ok(parts.join(", "))
}

/// Substitute `?` markers in trusted SQL with dialect placeholders.
pub(crate) fn compile_raw(
    dialect: Dialect,
    sql: &str,
    values: &[Value],
    params: &mut Vec<Value>,
    offset: usize,
) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut remaining = values.iter();
    let mut used = 0usize;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '?' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'?') {
            chars.next();
            out.push('?');
            continue;
        }
        let value = remaining.next().ok_or_else(|| {
            Error::Compilation(sqlrecord_core::CompilationError {
                message: format!(
                    "raw SQL has more '?' markers than the {} bound values",
                    values.len()
                ),
                fragment: Some(sql.to_string()),
            })
        })?;
        used += 1;
        out.push_str(&bind(dialect, params, offset, value.clone()));
    }
    if used != values.len() {
        return Err(Error::Compilation(sqlrecord_core::CompilationError {
            message: format!(
                "raw SQL has {} '?' markers but {} bound values",
                used,
                values.len()
            ),
            fragment: Some(sql.to_string()),
        }));
    }
    Ok(out)
}

fn compile_string_fn(
    func: &StringFn,
    dialect: Dialect,
    params: &mut Vec<Value>,
    offset: usize,
) -> Result<String> {
    let sql = match func {
        StringFn::Concat(parts) => {
            if parts.is_empty() {
                return Err(Error::compilation("CONCAT requires at least one argument"));
            }
            let mut compiled = Vec::with_capacity(parts.len());
            for part in parts {
                compiled.push(part.compile_into(dialect, params, offset)?);
            }
            if dialect.is_mysql_family() {
                format!("CONCAT({})", compiled.join(", "))
            } else {
                format!("({})", compiled.join(" || "))
            }
        }
        StringFn::Upper(expr) => format!("UPPER({})", expr.compile_into(dialect, params, offset)?),
        StringFn::Lower(expr) => format!("LOWER({})", expr.compile_into(dialect, params, offset)?),
        StringFn::Length(expr) => {
            let inner = expr.compile_into(dialect, params, offset)?;
            if dialect.is_mysql_family() {
                format!("CHAR_LENGTH({inner})")
            } else {
                format!("LENGTH({inner})")
            }
        }
        StringFn::Trim(expr) => format!("TRIM({})", expr.compile_into(dialect, params, offset)?),
        StringFn::Substring {
            expr,
            start,
            length,
        } => {
            let name = if dialect == Dialect::Sqlite {
                "SUBSTR"
            } else {
                "SUBSTRING"
            };
            let inner = expr.compile_into(dialect, params, offset)?;
            let start = bind(dialect, params, offset, Value::BigInt(*start));
            match length {
                Some(length) => {
                    let length = bind(dialect, params, offset, Value::BigInt(*length));
                    format!("{name}({inner}, {start}, {length})")
                }
                None => format!("{name}({inner}, {start})"),
            }
        }
        StringFn::Replace { expr, from, to } => {
            let inner = expr.compile_into(dialect, params, offset)?;
            let from = from.compile_into(dialect, params, offset)?;
            let to = to.compile_into(dialect, params, offset)?;
            format!("REPLACE({inner}, {from}, {to})")
        }
    };
    Ok(sql)
}

fn compile_date_fn(
    func: &DateFn,
    dialect: Dialect,
    params: &mut Vec<Value>,
    offset: usize,
) -> Result<String> {
    let sql = match func {
        DateFn::Extract { part, expr } => {
            let inner = expr.compile_into(dialect, params, offset)?;
            match dialect {
                Dialect::Postgres => format!("EXTRACT({} FROM {inner})", part.postgres_field()),
                Dialect::Mysql | Dialect::Mariadb => match part {
                    DatePart::DayOfWeek => format!("(DAYOFWEEK({inner}) - 1)"),
                    other => format!("{}({inner})", other.postgres_field()),
                },
                Dialect::Sqlite => format!(
                    "CAST(strftime('{}', {inner}) AS INTEGER)",
                    part.strftime_format()
                ),
            }
        }
        DateFn::DateOf(expr) => {
            let inner = expr.compile_into(dialect, params, offset)?;
            match dialect {
                Dialect::Postgres => format!("CAST({inner} AS DATE)"),
                Dialect::Mysql | Dialect::Mariadb => format!("DATE({inner})"),
                Dialect::Sqlite => format!("date({inner})"),
            }
        }
        DateFn::Now => match dialect {
            Dialect::Sqlite => "CURRENT_TIMESTAMP".to_string(),
            _ => "NOW()".to_string(),
        },
    };
    Ok(sql)
}

/// One step of a JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonSegment {
    Key(String),
    Index(usize),
}

fn json_path_shape() -> Option<&'static Regex> {
    static SHAPE: OnceLock<Option<Regex>> = OnceLock::new();
    SHAPE
        .get_or_init(|| Regex::new(r"^[^.\[\]]+(\[\d+\])*(\.[^.\[\]]+(\[\d+\])*)*$").ok())
        .as_ref()
}

fn json_path_segment() -> Option<&'static Regex> {
    static SEGMENT: OnceLock<Option<Regex>> = OnceLock::new();
    SEGMENT
        .get_or_init(|| Regex::new(r"\[(\d+)\]|([^.\[\]]+)").ok())
        .as_ref()
}

fn simple_key() -> Option<&'static Regex> {
    static KEY: OnceLock<Option<Regex>> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Parse `a.b[0]` (optionally prefixed with `$.`) into segments.
#[allow(clippy::result_large_err)]
pub fn parse_json_path(path: &str) -> Result<Vec<JsonSegment>> {
    let trimmed = path.trim();
    let trimmed = trimmed
        .strip_prefix("$.")
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);
    let (Some(shape), Some(segment)) = (json_path_shape(), json_path_segment()) else {
        return Err(Error::compilation("JSON path patterns failed to compile"));
    };
    if !shape.is_match(trimmed) {
        return Err(Error::Compilation(sqlrecord_core::CompilationError {
            message: "malformed JSON path".to_string(),
            fragment: Some(path.to_string()),
        }));
    }
    let mut segments = Vec::new();
    for caps in segment.captures_iter(trimmed) {
        if let Some(index) = caps.get(1) {
            let index = index.as_str().parse::<usize>().map_err(|_| {
                Error::compilation(format!("JSON path index out of range in '{}'", path))
            })?;
            segments.push(JsonSegment::Index(index));
        } else if let Some(key) = caps.get(2) {
            segments.push(JsonSegment::Key(key.as_str().to_string()));
        }
    }
    Ok(segments)
}

/// `$.a.b[0]` form used by MySQL, MariaDB and SQLite.
fn dollar_path(segments: &[JsonSegment]) -> String {
    let mut out = String::from("$");
    for segment in segments {
        match segment {
            JsonSegment::Key(key) if simple_key().is_some_and(|re| re.is_match(key)) => {
                out.push('.');
                out.push_str(key);
            }
            JsonSegment::Key(key) => {
                out.push_str(&format!(".\"{}\"", key.replace('"', "\\\"")));
            }
            JsonSegment::Index(index) => out.push_str(&format!("[{index}]")),
        }
    }
    out
}

fn compile_json_extract(
    column: &str,
    path: &str,
    dialect: Dialect,
    params: &mut Vec<Value>,
    offset: usize,
) -> Result<String> {
    let segments = parse_json_path(path)?;
    let column = dialect.quote_column(column);
    let sql = match dialect {
        Dialect::Postgres => {
            let parts = segments
                .iter()
                .map(|segment| match segment {
                    JsonSegment::Key(key) => Value::Text(key.clone()),
                    JsonSegment::Index(index) => Value::Text(index.to_string()),
                })
                .collect();
            let placeholder = bind(dialect, params, offset, Value::Array(parts));
            format!("({column} #>> {placeholder})")
        }
        Dialect::Mysql => {
            let placeholder = bind(dialect, params, offset, Value::Text(dollar_path(&segments)));
            format!("JSON_UNQUOTE(JSON_EXTRACT({column}, {placeholder}))")
        }
        Dialect::Mariadb => {
            let placeholder = bind(dialect, params, offset, Value::Text(dollar_path(&segments)));
            format!("JSON_VALUE({column}, {placeholder})")
        }
        Dialect::Sqlite => {
            let placeholder = bind(dialect, params, offset, Value::Text(dollar_path(&segments)));
            format!("json_extract({column}, {placeholder})")
        }
    };
    Ok(sql)
}
