//! Relation metadata.
//!
//! Relations are declared once per model on its [`ModelSchema`] and
//! represented as plain static metadata. The relation layer turns a
//! [`RelationDef`] plus a parent's key value into SQL; nothing here touches a
//! connection.

use crate::schema::ModelSchema;

/// Function returning the static schema of a related model.
pub type SchemaFn = fn() -> &'static ModelSchema;

/// The variant of a relation between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// `users` has one `profiles` row (`profiles.user_id = users.id`).
    HasOne,
    /// `users` has many `posts` rows (`posts.user_id = users.id`).
    HasMany,
    /// `posts` belongs to one `users` row (`users.id = posts.user_id`).
    BelongsTo,
    /// `posts` and `tags` are linked through a pivot table.
    ManyToMany,
    /// One related row reached through an intermediate table.
    HasOneThrough,
    /// Many related rows reached through an intermediate table.
    HasManyThrough,
    /// One polymorphic child (`images.imageable_type/imageable_id`).
    MorphOne,
    /// Many polymorphic children (`comments.commentable_type/commentable_id`).
    MorphMany,
    /// The polymorphic owner of a child row.
    MorphTo,
}

impl RelationKind {
    /// Whether the relation resolves to at most one record.
    pub const fn is_to_one(self) -> bool {
        matches!(
            self,
            RelationKind::HasOne
                | RelationKind::BelongsTo
                | RelationKind::HasOneThrough
                | RelationKind::MorphOne
                | RelationKind::MorphTo
        )
    }
}

/// Pivot table of a many-to-many relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PivotInfo {
    /// The pivot table name (e.g., `"post_tag"`).
    pub table: &'static str,
    /// Pivot column pointing at the parent (e.g., `"post_id"`).
    pub pivot_local_key: &'static str,
    /// Pivot column pointing at the related model (e.g., `"tag_id"`).
    pub pivot_foreign_key: &'static str,
    /// Parent column referenced by `pivot_local_key`.
    pub parent_key: &'static str,
    /// Related column referenced by `pivot_foreign_key`.
    pub related_key: &'static str,
}

impl PivotInfo {
    /// Create a pivot definition keyed on `id` at both ends.
    #[must_use]
    pub const fn new(
        table: &'static str,
        pivot_local_key: &'static str,
        pivot_foreign_key: &'static str,
    ) -> Self {
        Self {
            table,
            pivot_local_key,
            pivot_foreign_key,
            parent_key: "id",
            related_key: "id",
        }
    }

    #[must_use]
    pub const fn parent_key(mut self, column: &'static str) -> Self {
        self.parent_key = column;
        self
    }

    #[must_use]
    pub const fn related_key(mut self, column: &'static str) -> Self {
        self.related_key = column;
        self
    }
}

/// Intermediate table of a through relation.
///
/// For `countries -> users -> posts`: `table = "users"`,
/// `first_key = "country_id"` (on users), `second_key = "user_id"` (on posts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughInfo {
    pub table: &'static str,
    /// Column on the intermediate table pointing at the parent.
    pub first_key: &'static str,
    /// Column on the related table pointing at the intermediate table.
    pub second_key: &'static str,
    /// Parent column referenced by `first_key`.
    pub local_key: &'static str,
    /// Intermediate column referenced by `second_key`.
    pub second_local_key: &'static str,
}

impl ThroughInfo {
    #[must_use]
    pub const fn new(
        table: &'static str,
        first_key: &'static str,
        second_key: &'static str,
    ) -> Self {
        Self {
            table,
            first_key,
            second_key,
            local_key: "id",
            second_local_key: "id",
        }
    }

    #[must_use]
    pub const fn local_key(mut self, column: &'static str) -> Self {
        self.local_key = column;
        self
    }

    #[must_use]
    pub const fn second_local_key(mut self, column: &'static str) -> Self {
        self.second_local_key = column;
        self
    }
}

/// Static description of one relation.
///
/// Key semantics depend on the kind:
///
/// - `HasOne`/`HasMany`/`MorphOne`/`MorphMany`: `foreign_key` lives on the
///   related table, `local_key` on the parent.
/// - `BelongsTo`: `foreign_key` lives on the parent record, `owner_key` on the
///   related table.
/// - `ManyToMany` uses [`PivotInfo`], the through kinds use [`ThroughInfo`].
/// - `MorphTo` reads `{morph_name}_type` and `{morph_name}_id` off the record.
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    /// Name the relation is accessed and eager-loaded by.
    pub name: &'static str,
    pub kind: RelationKind,
    /// Related schema. `None` only for `MorphTo`, which resolves per row.
    pub related: Option<SchemaFn>,
    pub foreign_key: &'static str,
    pub local_key: &'static str,
    pub owner_key: &'static str,
    pub pivot: Option<PivotInfo>,
    pub through: Option<ThroughInfo>,
    pub morph_name: Option<&'static str>,
}

impl RelationDef {
    const fn base(name: &'static str, kind: RelationKind, related: Option<SchemaFn>) -> Self {
        Self {
            name,
            kind,
            related,
            foreign_key: "",
            local_key: "id",
            owner_key: "id",
            pivot: None,
            through: None,
            morph_name: None,
        }
    }

    #[must_use]
    pub const fn has_one(name: &'static str, related: SchemaFn, foreign_key: &'static str) -> Self {
        let mut def = Self::base(name, RelationKind::HasOne, Some(related));
        def.foreign_key = foreign_key;
        def
    }

    #[must_use]
    pub const fn has_many(
        name: &'static str,
        related: SchemaFn,
        foreign_key: &'static str,
    ) -> Self {
        let mut def = Self::base(name, RelationKind::HasMany, Some(related));
        def.foreign_key = foreign_key;
        def
    }

    #[must_use]
    pub const fn belongs_to(
        name: &'static str,
        related: SchemaFn,
        foreign_key: &'static str,
    ) -> Self {
        let mut def = Self::base(name, RelationKind::BelongsTo, Some(related));
        def.foreign_key = foreign_key;
        def
    }

    #[must_use]
    pub const fn belongs_to_many(name: &'static str, related: SchemaFn, pivot: PivotInfo) -> Self {
        let mut def = Self::base(name, RelationKind::ManyToMany, Some(related));
        def.pivot = Some(pivot);
        def
    }

    #[must_use]
    pub const fn has_one_through(
        name: &'static str,
        related: SchemaFn,
        through: ThroughInfo,
    ) -> Self {
        let mut def = Self::base(name, RelationKind::HasOneThrough, Some(related));
        def.through = Some(through);
        def
    }

    #[must_use]
    pub const fn has_many_through(
        name: &'static str,
        related: SchemaFn,
        through: ThroughInfo,
    ) -> Self {
        let mut def = Self::base(name, RelationKind::HasManyThrough, Some(related));
        def.through = Some(through);
        def
    }

    #[must_use]
    pub const fn morph_one(
        name: &'static str,
        related: SchemaFn,
        morph_name: &'static str,
    ) -> Self {
        let mut def = Self::base(name, RelationKind::MorphOne, Some(related));
        def.morph_name = Some(morph_name);
        def
    }

    #[must_use]
    pub const fn morph_many(
        name: &'static str,
        related: SchemaFn,
        morph_name: &'static str,
    ) -> Self {
        let mut def = Self::base(name, RelationKind::MorphMany, Some(related));
        def.morph_name = Some(morph_name);
        def
    }

    /// Polymorphic owner; the morph name defaults to the relation name.
    #[must_use]
    pub const fn morph_to(name: &'static str) -> Self {
        let mut def = Self::base(name, RelationKind::MorphTo, None);
        def.morph_name = Some(name);
        def
    }

    #[must_use]
    pub const fn local_key(mut self, column: &'static str) -> Self {
        self.local_key = column;
        self
    }

    #[must_use]
    pub const fn owner_key(mut self, column: &'static str) -> Self {
        self.owner_key = column;
        self
    }

    #[must_use]
    pub const fn morph_name(mut self, name: &'static str) -> Self {
        self.morph_name = Some(name);
        self
    }

    /// Column on the parent record whose value binds the relation.
    pub fn parent_key_column(&self) -> String {
        match self.kind {
            RelationKind::HasOne
            | RelationKind::HasMany
            | RelationKind::MorphOne
            | RelationKind::MorphMany => self.local_key.to_string(),
            RelationKind::BelongsTo => self.foreign_key.to_string(),
            RelationKind::ManyToMany => self
                .pivot
                .map_or_else(|| self.local_key.to_string(), |p| p.parent_key.to_string()),
            RelationKind::HasOneThrough | RelationKind::HasManyThrough => self
                .through
                .map_or_else(|| self.local_key.to_string(), |t| t.local_key.to_string()),
            RelationKind::MorphTo => self.morph_id_column(),
        }
    }

    /// `{morph_name}_type`
    pub fn morph_type_column(&self) -> String {
        format!("{}_type", self.morph_name.unwrap_or(self.name))
    }

    /// `{morph_name}_id`
    pub fn morph_id_column(&self) -> String {
        format!("{}_id", self.morph_name.unwrap_or(self.name))
    }

    /// The related schema, if the relation has a fixed target.
    pub fn related_schema(&self) -> Option<&'static ModelSchema> {
        self.related.map(|schema_fn| schema_fn())
    }
}
