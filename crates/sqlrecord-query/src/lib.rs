//! Dialect-aware SQL compiler for sqlrecord.
//!
//! `sqlrecord-query` is the **query construction layer**. It turns a fluent,
//! dialect-agnostic description of a query into `(sql, ordered_params)`:
//!
//! - **Expressions**: [`Expr`] covers columns, literals, casts, arithmetic,
//!   string/date/JSON functions, aggregates, CASE, window functions and
//!   sub-queries.
//! - **Query builder**: [`QueryBuilder`] chains WHERE/JOIN/GROUP/ORDER/LIMIT
//!   clauses and compiles SELECT, INSERT, UPDATE, DELETE and upserts.
//! - **Execution**: `get`, `first`, aggregates, `paginate` and `chunk` run the
//!   compiled statement through a [`sqlrecord_core::Session`].
//!
//! Values are never inlined into SQL text; every literal is a bound parameter.

pub mod builder;
pub mod clause;
mod dml;
pub mod expr;
pub mod fetch;
pub mod join;

pub use builder::QueryBuilder;
pub use clause::{Connector, OrderBy, Predicate, Target, WhereClause};
pub use expr::{
    AggregateFn, ArithOp, CaseBuilder, CastType, DateFn, DatePart, Direction, Expr, JsonSegment,
    Op, StringFn, parse_json_path,
};
pub use fetch::Page;
pub use join::{Join, JoinOn, JoinType};
