//! Polymorphic type registry.
//!
//! A morph relation stores a type alias next to a foreign id
//! (`commentable_type = "posts"`). The [`MorphMap`] is the only place those
//! aliases are turned back into schemas; an alias that was never registered
//! is a configuration error.

use crate::error::{Error, Result};
use crate::relationship::SchemaFn;
use crate::schema::ModelSchema;
use std::collections::BTreeMap;

/// Alias -> model schema mapping consulted by morph relations.
#[derive(Debug, Clone, Default)]
pub struct MorphMap {
    types: BTreeMap<String, SchemaFn>,
}

impl MorphMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `alias` as the stored type name for a model.
    pub fn register(&mut self, alias: impl Into<String>, schema: SchemaFn) -> &mut Self {
        let alias = alias.into();
        tracing::trace!(alias = %alias, table = schema().table_name(), "Registering morph type");
        self.types.insert(alias, schema);
        self
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, alias: impl Into<String>, schema: SchemaFn) -> Self {
        self.register(alias, schema);
        self
    }

    /// Resolve a stored type name.
    pub fn resolve(&self, alias: &str) -> Result<&'static ModelSchema> {
        self.types
            .get(alias)
            .map(|schema_fn| schema_fn())
            .ok_or_else(|| Error::config(format!("morph type '{}' is not registered", alias)))
    }

    /// The alias registered for a table, if any.
    pub fn alias_for(&self, table: &str) -> Option<&str> {
        self.types
            .iter()
            .find(|(_, schema_fn)| schema_fn().table_name() == table)
            .map(|(alias, _)| alias.as_str())
    }

    /// Type name written for a parent: its alias, or the table name.
    pub fn type_name_for(&self, schema: &ModelSchema) -> String {
        self.alias_for(schema.table_name())
            .unwrap_or(schema.table_name())
            .to_string()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
