//! Core types and traits for sqlrecord.
//!
//! This crate provides the foundations every other layer builds on:
//!
//! - `Value`/`Row` for dynamically typed SQL data
//! - `Dialect` for the four supported SQL variants
//! - `Connection` trait for the injected database driver
//! - `Session` carrying the connection, dialect, morph map and hook bus
//! - `ModelSchema`/`RelationDef` static model metadata
//! - `Record` model instances with dirty tracking and casting
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod cast;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod hooks;
pub mod morph;
pub mod record;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod value;

pub use cast::CastKind;
pub use connection::{Connection, ExecResult};
pub use dialect::Dialect;
pub use error::{
    CompilationError, ConfigError, ConnectionError, ConnectionErrorKind, Error, NotFoundError,
    NotFoundKind, QueryError, QueryErrorKind, Result, TransactionError, TransactionErrorKind,
    TypeError,
};
pub use hooks::{HookBus, HookFn, HookPhase, HookRegistry, NoopHooks};
pub use morph::MorphMap;
pub use record::{Attributes, Loaded, Record};
pub use relationship::{PivotInfo, RelationDef, RelationKind, SchemaFn, ThroughInfo};
pub use row::{ColumnInfo, FromValue, Row};
pub use schema::{
    ForeignKeyDef, IndexDef, KeyStrategy, Model, ModelSchema, ModelSchemaBuilder, Setter,
    Timestamps,
};
pub use session::{Session, SessionBuilder, SessionConfig};
pub use value::{Value, ValueKey};

/// Unwrap an `Outcome::Ok`, returning early from the enclosing async
/// function on `Err`, `Cancelled` or `Panicked`.
///
/// Errors are converted with `From`, so a `Result`'s error can be lifted
/// with [`try_result!`] and a driver outcome with this macro.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::Outcome::Ok(value) => value,
            $crate::Outcome::Err(err) => {
                return $crate::Outcome::Err(::core::convert::From::from(err));
            }
            $crate::Outcome::Cancelled(reason) => return $crate::Outcome::Cancelled(reason),
            $crate::Outcome::Panicked(payload) => return $crate::Outcome::Panicked(payload),
        }
    };
}

/// Unwrap a `Result::Ok` inside a function returning `Outcome`, returning
/// `Outcome::Err` otherwise.
#[macro_export]
macro_rules! try_result {
    ($expr:expr) => {
        match $expr {
            ::core::result::Result::Ok(value) => value,
            ::core::result::Result::Err(err) => {
                return $crate::Outcome::Err(::core::convert::From::from(err));
            }
        }
    };
}
