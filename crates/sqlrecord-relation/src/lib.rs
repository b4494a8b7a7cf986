//! Relations between sqlrecord models.
//!
//! `sqlrecord-relation` turns the static [`RelationDef`](sqlrecord_core::RelationDef)
//! metadata on a schema into queries:
//!
//! - [`Relation`] binds one definition to one parent record and exposes the
//!   related query with chain methods and terminals.
//! - [`load`] and [`get_eager`] batch a relation across many parents, one
//!   query per level (per morph type for MorphTo).
//! - Pivot management (`attach`, `detach`, `sync`, `toggle`) for
//!   many-to-many relations.

pub mod constraints;
pub mod eager;
pub mod pivot;
pub mod relation;

pub use constraints::{PIVOT_KEY, THROUGH_KEY, add_constraints, add_eager_constraints};
pub use eager::{get_eager, load, parent_key};
pub use pivot::{SyncInput, SyncResult};
pub use relation::Relation;
