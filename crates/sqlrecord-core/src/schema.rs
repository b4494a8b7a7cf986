//! Per-model metadata.
//!
//! Every model type owns exactly one [`ModelSchema`], built once with
//! [`ModelSchema::builder`] and handed out as `&'static` through [`Model`]:
//!
//! ```
//! use std::sync::OnceLock;
//! use sqlrecord_core::{CastKind, Model, ModelSchema};
//!
//! struct User;
//!
//! impl Model for User {
//!     fn schema() -> &'static ModelSchema {
//!         static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
//!         SCHEMA.get_or_init(|| {
//!             ModelSchema::builder("users")
//!                 .columns(&["id", "name", "is_admin"])
//!                 .cast("is_admin", CastKind::Boolean)
//!                 .hidden(&["password"])
//!                 .build()
//!         })
//!     }
//! }
//!
//! assert_eq!(User::schema().table_name(), "users");
//! ```

use crate::cast::CastKind;
use crate::error::{Error, Result};
use crate::hooks::HookPhase;
use crate::relationship::RelationDef;
use crate::value::Value;
use std::collections::BTreeMap;

/// Attribute setter applied on `fill` and `set`.
pub type Setter = fn(&Value) -> Value;

/// A model type with static metadata.
pub trait Model {
    /// The model's schema.
    fn schema() -> &'static ModelSchema;
}

/// How a new record gets its primary key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Generate a v4 UUID string before INSERT when the key is absent.
    #[default]
    Uuid,
    /// Let the database generate it and read it back from the driver.
    AutoIncrement,
    /// The caller always provides the key.
    Manual,
}

/// Named index metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

/// Created/updated timestamp column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamps {
    pub created_at: String,
    pub updated_at: String,
}

impl Default for Timestamps {
    fn default() -> Self {
        Self {
            created_at: "created_at".to_string(),
            updated_at: "updated_at".to_string(),
        }
    }
}

/// Static metadata for one model.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    table: String,
    primary_key: String,
    key_strategy: KeyStrategy,
    columns: Vec<String>,
    indexes: Vec<IndexDef>,
    uniques: Vec<Vec<String>>,
    foreign_keys: Vec<ForeignKeyDef>,
    encrypted_fields: Vec<String>,
    casts: BTreeMap<String, CastKind>,
    hooks: BTreeMap<HookPhase, Vec<String>>,
    fillable: Option<Vec<String>>,
    guarded: Vec<String>,
    visible: Option<Vec<String>>,
    hidden: Vec<String>,
    timestamps: Option<Timestamps>,
    soft_delete: Option<String>,
    setters: BTreeMap<String, Setter>,
    relations: Vec<RelationDef>,
}

impl ModelSchema {
    /// Start describing the model stored in `table`.
    pub fn builder(table: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            schema: ModelSchema {
                table: table.into(),
                primary_key: "id".to_string(),
                key_strategy: KeyStrategy::default(),
                columns: Vec::new(),
                indexes: Vec::new(),
                uniques: Vec::new(),
                foreign_keys: Vec::new(),
                encrypted_fields: Vec::new(),
                casts: BTreeMap::new(),
                hooks: BTreeMap::new(),
                fillable: None,
                guarded: Vec::new(),
                visible: None,
                hidden: Vec::new(),
                timestamps: None,
                soft_delete: None,
                setters: BTreeMap::new(),
                relations: Vec::new(),
            },
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn uniques(&self) -> &[Vec<String>] {
        &self.uniques
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyDef] {
        &self.foreign_keys
    }

    pub fn encrypted_fields(&self) -> &[String] {
        &self.encrypted_fields
    }

    pub fn casts(&self) -> &BTreeMap<String, CastKind> {
        &self.casts
    }

    /// Cast declared for an attribute.
    pub fn cast_for(&self, attribute: &str) -> Option<CastKind> {
        self.casts.get(attribute).copied()
    }

    /// Hook names listed for a lifecycle phase, in declaration order.
    pub fn hooks_for(&self, phase: HookPhase) -> &[String] {
        self.hooks.get(&phase).map_or(&[], Vec::as_slice)
    }

    pub fn fillable(&self) -> Option<&[String]> {
        self.fillable.as_deref()
    }

    pub fn guarded(&self) -> &[String] {
        &self.guarded
    }

    pub fn visible(&self) -> Option<&[String]> {
        self.visible.as_deref()
    }

    pub fn hidden(&self) -> &[String] {
        &self.hidden
    }

    pub fn timestamps(&self) -> Option<&Timestamps> {
        self.timestamps.as_ref()
    }

    /// Soft-delete column, if the model uses soft deletes.
    pub fn soft_delete_column(&self) -> Option<&str> {
        self.soft_delete.as_deref()
    }

    pub fn setter(&self, attribute: &str) -> Option<Setter> {
        self.setters.get(attribute).copied()
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    /// Look up a declared relation by name.
    pub fn relation(&self, name: &str) -> Result<&RelationDef> {
        self.relations
            .iter()
            .find(|def| def.name == name)
            .ok_or_else(|| Error::relation_not_found(&self.table, name))
    }

    /// Whether mass assignment may set `attribute`.
    ///
    /// The primary key is always guarded. An allowlist, when declared, wins
    /// over the blocklist; `"*"` in the blocklist guards everything.
    pub fn is_fillable(&self, attribute: &str) -> bool {
        if attribute == self.primary_key {
            return false;
        }
        if let Some(fillable) = &self.fillable {
            return fillable.iter().any(|f| f == attribute);
        }
        !self.guarded.iter().any(|g| g == attribute || g == "*")
    }

    /// `table.column`
    pub fn qualified(&self, column: &str) -> String {
        format!("{}.{}", self.table, column)
    }
}

/// Builder for [`ModelSchema`].
#[derive(Debug, Clone)]
pub struct ModelSchemaBuilder {
    schema: ModelSchema,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl ModelSchemaBuilder {
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.schema.primary_key = column.into();
        self
    }

    #[must_use]
    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.schema.key_strategy = strategy;
        self
    }

    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.schema.columns = owned(columns);
        self
    }

    #[must_use]
    pub fn index(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.schema.indexes.push(IndexDef {
            name: name.into(),
            columns: owned(columns),
        });
        self
    }

    #[must_use]
    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.schema.uniques.push(owned(columns));
        self
    }

    #[must_use]
    pub fn foreign_key(
        mut self,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        self.schema.foreign_keys.push(ForeignKeyDef {
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        });
        self
    }

    #[must_use]
    pub fn encrypted(mut self, columns: &[&str]) -> Self {
        self.schema.encrypted_fields.extend(owned(columns));
        self
    }

    #[must_use]
    pub fn cast(mut self, attribute: impl Into<String>, kind: CastKind) -> Self {
        self.schema.casts.insert(attribute.into(), kind);
        self
    }

    /// Register a named hook for a phase. Names are resolved by the hook bus.
    #[must_use]
    pub fn hook(mut self, phase: HookPhase, name: impl Into<String>) -> Self {
        self.schema.hooks.entry(phase).or_default().push(name.into());
        self
    }

    #[must_use]
    pub fn fillable(mut self, attributes: &[&str]) -> Self {
        self.schema.fillable = Some(owned(attributes));
        self
    }

    #[must_use]
    pub fn guarded(mut self, attributes: &[&str]) -> Self {
        self.schema.guarded = owned(attributes);
        self
    }

    #[must_use]
    pub fn visible(mut self, attributes: &[&str]) -> Self {
        self.schema.visible = Some(owned(attributes));
        self
    }

    #[must_use]
    pub fn hidden(mut self, attributes: &[&str]) -> Self {
        self.schema.hidden = owned(attributes);
        self
    }

    /// Maintain `created_at`/`updated_at`.
    #[must_use]
    pub fn timestamps(mut self) -> Self {
        self.schema.timestamps = Some(Timestamps::default());
        self
    }

    #[must_use]
    pub fn timestamp_columns(
        mut self,
        created_at: impl Into<String>,
        updated_at: impl Into<String>,
    ) -> Self {
        self.schema.timestamps = Some(Timestamps {
            created_at: created_at.into(),
            updated_at: updated_at.into(),
        });
        self
    }

    /// Soft delete through `deleted_at`.
    #[must_use]
    pub fn soft_deletes(self) -> Self {
        self.soft_delete_column("deleted_at")
    }

    #[must_use]
    pub fn soft_delete_column(mut self, column: impl Into<String>) -> Self {
        self.schema.soft_delete = Some(column.into());
        self
    }

    #[must_use]
    pub fn setter(mut self, attribute: impl Into<String>, setter: Setter) -> Self {
        self.schema.setters.insert(attribute.into(), setter);
        self
    }

    #[must_use]
    pub fn relation(mut self, def: RelationDef) -> Self {
        self.schema.relations.push(def);
        self
    }

    pub fn build(self) -> ModelSchema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lowercase(value: &Value) -> Value {
        match value {
            Value::Text(s) => Value::Text(s.to_lowercase()),
            other => other.clone(),
        }
    }

    #[test]
    fn primary_key_is_always_guarded() {
        let open = ModelSchema::builder("users").build();
        assert!(open.is_fillable("name"));
        assert!(!open.is_fillable("id"));

        let allow = ModelSchema::builder("users").fillable(&["name", "id"]).build();
        assert!(allow.is_fillable("name"));
        assert!(!allow.is_fillable("email"));
        assert!(!allow.is_fillable("id"));

        let block = ModelSchema::builder("users").guarded(&["is_admin"]).build();
        assert!(!block.is_fillable("is_admin"));
        assert!(block.is_fillable("email"));

        let all = ModelSchema::builder("users").guarded(&["*"]).build();
        assert!(!all.is_fillable("email"));
    }

    #[test]
    fn unknown_relation_is_not_found() {
        let schema = ModelSchema::builder("users").build();
        let err = schema.relation("posts").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Not found: relation 'posts' is not declared on 'users'"
        );
    }

    #[test]
    fn builder_records_metadata() {
        let schema = ModelSchema::builder("users")
            .primary_key("uuid")
            .key_strategy(KeyStrategy::Manual)
            .columns(&["uuid", "email"])
            .unique(&["email"])
            .index("users_email_idx", &["email"])
            .foreign_key("team_id", "teams", "id")
            .encrypted(&["ssn"])
            .hook(HookPhase::BeforeSave, "normalize")
            .hook(HookPhase::BeforeSave, "audit")
            .timestamps()
            .soft_deletes()
            .setter("email", lowercase)
            .build();

        assert_eq!(schema.primary_key(), "uuid");
        assert_eq!(schema.key_strategy(), KeyStrategy::Manual);
        assert_eq!(schema.uniques(), &[vec!["email".to_string()]]);
        assert_eq!(schema.indexes()[0].name, "users_email_idx");
        assert_eq!(schema.foreign_keys()[0].references_table, "teams");
        assert_eq!(schema.encrypted_fields(), &["ssn".to_string()]);
        assert_eq!(schema.hooks_for(HookPhase::BeforeSave), &["normalize", "audit"]);
        assert!(schema.hooks_for(HookPhase::AfterDelete).is_empty());
        assert_eq!(schema.timestamps().map(|t| t.updated_at.as_str()), Some("updated_at"));
        assert_eq!(schema.soft_delete_column(), Some("deleted_at"));
        let setter = schema.setter("email").unwrap();
        assert_eq!(setter(&Value::from("A@B.C")), Value::from("a@b.c"));
        assert_eq!(schema.qualified("email"), "users.email");
    }
}
