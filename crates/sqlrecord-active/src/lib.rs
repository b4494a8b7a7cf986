//! Active-record layer for sqlrecord.
//!
//! [`ActiveRecord`] gives every [`Record`](sqlrecord_core::Record) its
//! persistence lifecycle (`save`, `destroy`, `restore`, `refresh`) with hook
//! dispatch, and [`Repository`] provides the model-level finders and
//! constructors, all against an explicit session.

pub mod persist;
pub mod repository;

pub use persist::{ActiveRecord, DestroyOptions};
pub use repository::{Repository, TrashedScope};
