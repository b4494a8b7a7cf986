//! Model instances.
//!
//! A [`Record`] is one row of one model: the current attributes, a snapshot
//! of what was last read from or written to the database, the relation
//! cache, and whether the row exists yet. Persistence itself lives in the
//! active-record crate; this type only tracks state.

use crate::row::Row;
use crate::schema::ModelSchema;
use crate::value::Value;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// Attribute name -> value, ordered for stable SQL generation.
pub type Attributes = BTreeMap<String, Value>;

/// Result of loading one relation.
#[derive(Debug, Clone)]
pub enum Loaded {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl Loaded {
    /// Empty result shaped for a to-one or to-many relation.
    pub fn empty(to_one: bool) -> Self {
        if to_one {
            Loaded::One(None)
        } else {
            Loaded::Many(Vec::new())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Loaded::One(one) => one.is_none(),
            Loaded::Many(many) => many.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Loaded::One(one) => usize::from(one.is_some()),
            Loaded::Many(many) => many.len(),
        }
    }

    /// The single record of a to-one result.
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Loaded::One(one) => one.as_deref(),
            Loaded::Many(_) => None,
        }
    }

    /// The records of a to-many result.
    pub fn as_many(&self) -> Option<&[Record]> {
        match self {
            Loaded::Many(many) => Some(many),
            Loaded::One(_) => None,
        }
    }

    pub fn records(&self) -> Vec<&Record> {
        match self {
            Loaded::One(one) => one.as_deref().into_iter().collect(),
            Loaded::Many(many) => many.iter().collect(),
        }
    }

    pub fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            Loaded::One(one) => one.as_deref_mut().into_iter().collect(),
            Loaded::Many(many) => many.iter_mut().collect(),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Loaded::One(one) => one.as_ref().map_or(Json::Null, |record| record.to_json()),
            Loaded::Many(many) => Json::Array(many.iter().map(Record::to_json).collect()),
        }
    }
}

/// One model instance.
#[derive(Debug, Clone)]
pub struct Record {
    schema: &'static ModelSchema,
    attributes: Attributes,
    original: Attributes,
    relations: BTreeMap<String, Loaded>,
    exists: bool,
}

impl Record {
    /// A new, unsaved instance with no attributes.
    pub fn new(schema: &'static ModelSchema) -> Self {
        Self {
            schema,
            attributes: Attributes::new(),
            original: Attributes::new(),
            relations: BTreeMap::new(),
            exists: false,
        }
    }

    /// Build an existing instance from a fetched row.
    ///
    /// Declared casts are applied and the snapshot equals the casted row,
    /// so a fresh hydrate is never dirty.
    pub fn hydrate(schema: &'static ModelSchema, row: &Row) -> Self {
        let attributes: Attributes = row
            .iter()
            .map(|(column, value)| {
                let value = match schema.cast_for(column) {
                    Some(cast) => cast.apply(value),
                    None => value.clone(),
                };
                (column.to_string(), value)
            })
            .collect();
        Self {
            schema,
            original: attributes.clone(),
            attributes,
            relations: BTreeMap::new(),
            exists: true,
        }
    }

    pub fn schema(&self) -> &'static ModelSchema {
        self.schema
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn original(&self) -> &Attributes {
        &self.original
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Attribute value, NULL when absent.
    pub fn value(&self, attribute: &str) -> Value {
        self.attributes.get(attribute).cloned().unwrap_or(Value::Null)
    }

    /// Set one attribute, applying its declared setter. Never guarded.
    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let attribute = attribute.into();
        let value = value.into();
        let value = match self.schema.setter(&attribute) {
            Some(setter) => setter(&value),
            None => value,
        };
        self.attributes.insert(attribute, value);
        self
    }

    /// Mass-assign attributes, silently skipping guarded ones.
    pub fn fill<K, V>(&mut self, data: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in data {
            let key = key.into();
            if self.schema.is_fillable(&key) {
                self.set(key, value);
            } else {
                tracing::trace!(
                    table = self.schema.table_name(),
                    attribute = %key,
                    "Skipping guarded attribute"
                );
            }
        }
        self
    }

    /// Mass-assign attributes without guarding.
    pub fn force_fill<K, V>(&mut self, data: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in data {
            self.set(key, value);
        }
        self
    }

    /// Current primary key value.
    pub fn key(&self) -> Option<&Value> {
        self.get(self.schema.primary_key())
            .filter(|value| !value.is_null())
    }

    /// Primary key as last persisted, falling back to the current one.
    pub fn original_key(&self) -> Option<&Value> {
        self.original
            .get(self.schema.primary_key())
            .filter(|value| !value.is_null())
            .or_else(|| self.key())
    }

    /// Attributes whose value differs from the snapshot.
    #[tracing::instrument(level = "trace", skip(self), fields(table = self.schema.table_name()))]
    pub fn dirty(&self) -> Attributes {
        let dirty: Attributes = self
            .attributes
            .iter()
            .filter(|(key, value)| {
                self.original
                    .get(*key)
                    .is_none_or(|original| !original.same_as(value))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        tracing::trace!(dirty_count = dirty.len(), "Computed dirty attributes");
        dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    /// Whether one attribute differs from the snapshot.
    pub fn is_attribute_dirty(&self, attribute: &str) -> bool {
        match (self.attributes.get(attribute), self.original.get(attribute)) {
            (Some(current), Some(original)) => !current.same_as(original),
            (None, None) => false,
            _ => true,
        }
    }

    /// Whether the row has not been inserted yet.
    pub fn is_new(&self) -> bool {
        !self.exists
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Re-take the snapshot from the current attributes.
    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Re-take the snapshot for `attributes` only; other edits stay dirty.
    pub fn sync_attributes<S: AsRef<str>>(&mut self, attributes: &[S]) {
        for attribute in attributes {
            let attribute = attribute.as_ref();
            match self.attributes.get(attribute) {
                Some(value) => {
                    self.original.insert(attribute.to_string(), value.clone());
                }
                None => {
                    self.original.remove(attribute);
                }
            }
        }
    }

    /// Record a successful INSERT/UPDATE.
    pub fn mark_persisted(&mut self) {
        self.exists = true;
        self.sync_original();
    }

    /// Record a hard DELETE.
    pub fn mark_deleted(&mut self) {
        self.exists = false;
    }

    /// Replace attributes with a freshly fetched row, keeping relations.
    pub fn refill_from(&mut self, row: &Row) {
        let fresh = Record::hydrate(self.schema, row);
        self.attributes = fresh.attributes;
        self.original = fresh.original;
        self.exists = true;
    }

    /// Whether the soft-delete column is set.
    pub fn is_trashed(&self) -> bool {
        self.schema
            .soft_delete_column()
            .and_then(|column| self.get(column))
            .is_some_and(|value| !value.is_null())
    }

    pub fn set_relation(&mut self, name: impl Into<String>, loaded: Loaded) -> &mut Self {
        self.relations.insert(name.into(), loaded);
        self
    }

    pub fn relation(&self, name: &str) -> Option<&Loaded> {
        self.relations.get(name)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Loaded> {
        self.relations.get_mut(name)
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn take_relation(&mut self, name: &str) -> Option<Loaded> {
        self.relations.remove(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, Loaded> {
        &self.relations
    }

    /// Serialize for output.
    ///
    /// Attributes are cast again, loaded relations are merged in, then the
    /// schema's `visible` allowlist (which keeps every relation) or `hidden`
    /// blocklist (which also hides relations) is applied.
    pub fn to_json(&self) -> Json {
        let visible = self.schema.visible();
        let hidden = self.schema.hidden();
        let shown = |name: &str| match visible {
            Some(list) => list.iter().any(|v| v == name),
            None => !hidden.iter().any(|h| h == name),
        };

        let mut out = Map::new();
        for (key, value) in &self.attributes {
            if !shown(key) {
                continue;
            }
            let value = match self.schema.cast_for(key) {
                Some(cast) => cast.apply(value),
                None => value.clone(),
            };
            out.insert(key.clone(), value.to_json());
        }
        for (name, loaded) in &self.relations {
            if visible.is_none() && hidden.iter().any(|h| h == name) {
                continue;
            }
            out.insert(name.clone(), loaded.to_json());
        }
        Json::Object(out)
    }
}
