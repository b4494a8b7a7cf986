//! sqlrecord - a dialect-aware query builder and active-record ORM.
//!
//! The workspace is split by layer and this crate re-exports all of them:
//!
//! - `sqlrecord-core`: values, rows, dialects, the driver contract, model
//!   metadata, records and the session
//! - `sqlrecord-query`: the expression compiler and [`QueryBuilder`]
//! - `sqlrecord-relation`: relations, eager loading and pivot management
//! - `sqlrecord-active`: persistence lifecycle and repositories
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlrecord::prelude::*;
//! use std::sync::OnceLock;
//!
//! struct User;
//!
//! impl Model for User {
//!     fn schema() -> &'static ModelSchema {
//!         static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
//!         SCHEMA.get_or_init(|| {
//!             ModelSchema::builder("users")
//!                 .key_strategy(KeyStrategy::AutoIncrement)
//!                 .fillable(&["name", "email"])
//!                 .timestamps()
//!                 .relation(RelationDef::has_many("posts", Post::schema, "user_id"))
//!                 .build()
//!         })
//!     }
//! }
//!
//! async fn example(cx: &Cx, conn: PgConnection) -> Outcome<(), Error> {
//!     let session = try_result!(
//!         Session::builder()
//!             .connection(conn)
//!             .dialect(Dialect::Postgres)
//!             .build()
//!     );
//!     let users = Repository::of::<User>(&session);
//!
//!     let mut attrs = Attributes::new();
//!     attrs.insert("email".into(), Value::from("ada@example.com"));
//!     let mut ada = try_outcome!(users.create(cx, attrs).await);
//!     ada.set("name", "Ada Lovelace");
//!     try_outcome!(ada.save(cx, &session).await);
//!
//!     let mut everyone = try_outcome!(users.all(cx).await);
//!     users.load(cx, &mut everyone, &["posts.comments"]).await
//! }
//! ```
//!
//! Every statement is compiled to `(sql, params)` with dialect placeholders;
//! values never appear in SQL text.

pub use sqlrecord_core::cast::{format_timestamp, now_timestamp};
pub use sqlrecord_core::{
    Attributes, CastKind, ColumnInfo, CompilationError, ConfigError, Connection, ConnectionError,
    ConnectionErrorKind, Cx, Dialect, Error, ExecResult, FromValue, HookBus, HookFn, HookPhase,
    HookRegistry, KeyStrategy, Loaded, Model, ModelSchema, ModelSchemaBuilder, MorphMap,
    NoopHooks, NotFoundError, NotFoundKind, Outcome, PivotInfo, QueryError, QueryErrorKind,
    Record, RelationDef, RelationKind, Result, Row, SchemaFn, Session, SessionBuilder,
    SessionConfig, Timestamps, TransactionError, TransactionErrorKind, ThroughInfo, TypeError,
    Value, ValueKey, try_outcome, try_result,
};

pub use sqlrecord_query::{
    AggregateFn, ArithOp, CaseBuilder, CastType, Connector, DateFn, DatePart, Direction, Expr,
    Join, JoinOn, JoinType, JsonSegment, Op, OrderBy, Page, Predicate, QueryBuilder, StringFn,
    Target, WhereClause, parse_json_path,
};

pub use sqlrecord_relation::{
    PIVOT_KEY, Relation, SyncInput, SyncResult, THROUGH_KEY, get_eager, load, parent_key,
};

pub use sqlrecord_active::{ActiveRecord, DestroyOptions, Repository, TrashedScope};

/// JSON produced by [`Record::to_json`] and [`Loaded::to_json`].
pub type Json = serde_json::Value;

/// Scripted in-memory connection for tests.
#[cfg(feature = "testing")]
pub use sqlrecord_core::testing;

/// Everything needed to declare models and run queries.
///
/// ```ignore
/// use sqlrecord::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Persistence
        ActiveRecord,
        Attributes,
        CastKind,
        // Runtime and driver
        Connection,
        Cx,
        DestroyOptions,
        Dialect,
        Error,
        // Query building
        Expr,
        HookPhase,
        HookRegistry,
        KeyStrategy,
        Loaded,
        // Model metadata
        Model,
        ModelSchema,
        MorphMap,
        Op,
        Outcome,
        Page,
        PivotInfo,
        QueryBuilder,
        Record,
        Relation,
        RelationDef,
        Repository,
        Result,
        Row,
        Session,
        SessionConfig,
        SyncInput,
        ThroughInfo,
        Value,
        try_outcome,
        try_result,
    };
}
