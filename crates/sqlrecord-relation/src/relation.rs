//! Relations bound to one parent record.

use crate::constraints::{add_constraints, base_query, order_to_one, pivot_info};
use crate::eager::morph_alias;
use sqlrecord_core::{
    Connection, Cx, Dialect, Error, Loaded, ModelSchema, MorphMap, Outcome, Record, RelationDef,
    RelationKind, Result, Session, Value, try_outcome, try_result,
};
use sqlrecord_query::{Expr, Op, QueryBuilder, Target};

/// A lazily constrained query on the related table.
///
/// Chain methods refine the related query; terminals add the parent key
/// constraint and run it. A relation whose parent key is NULL (or a morph
/// relation with no type set) answers every terminal with an empty result
/// and never touches the database.
///
/// ```rust,ignore
/// let recent = Relation::of(&session, &user, "posts")?
///     .where_eq("published", true)
///     .order_by_desc("created_at")
///     .limit(5)
///     .get(&cx, &session)
///     .await;
/// ```
#[derive(Debug, Clone)]
pub struct Relation {
    def: RelationDef,
    parent: &'static ModelSchema,
    related: Option<&'static ModelSchema>,
    local_value: Value,
    morph_type: Option<String>,
    query: QueryBuilder,
}

impl Relation {
    /// Bind the relation `name` declared on `record`'s schema.
    #[allow(clippy::result_large_err)]
    pub fn of<C: Connection>(session: &Session<C>, record: &Record, name: &str) -> Result<Self> {
        let def = *record.schema().relation(name)?;
        Self::bind(def, record, session.morphs(), session.dialect())
    }

    /// Bind `def` to `record` without a session.
    #[allow(clippy::result_large_err)]
    pub fn bind(
        def: RelationDef,
        record: &Record,
        morphs: &MorphMap,
        dialect: Dialect,
    ) -> Result<Self> {
        let parent = record.schema();
        let local_value = record.value(&def.parent_key_column());

        let (related, morph_type) = match def.kind {
            RelationKind::MorphTo => match morph_alias(&record.value(&def.morph_type_column())) {
                Some(alias) => (Some(morphs.resolve(&alias)?), Some(alias)),
                None => (None, None),
            },
            RelationKind::MorphOne | RelationKind::MorphMany => (
                Some(related_of(&def)?),
                Some(morphs.type_name_for(parent)),
            ),
            _ => (Some(related_of(&def)?), None),
        };

        let query = match related {
            Some(related) => base_query(&def, related, dialect)?,
            None => QueryBuilder::new("", dialect),
        };

        tracing::trace!(
            relation = def.name,
            parent = parent.table_name(),
            related = related.map(ModelSchema::table_name),
            "Bound relation"
        );

        Ok(Self {
            def,
            parent,
            related,
            local_value,
            morph_type,
            query,
        })
    }

    pub fn def(&self) -> &RelationDef {
        &self.def
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn parent_schema(&self) -> &'static ModelSchema {
        self.parent
    }

    /// The related schema; `None` for a MorphTo with no type set.
    pub fn related_schema(&self) -> Option<&'static ModelSchema> {
        self.related
    }

    /// The parent's key value this relation is bound to.
    pub fn local_value(&self) -> &Value {
        &self.local_value
    }

    pub fn dialect(&self) -> Dialect {
        self.query.dialect()
    }

    pub(crate) fn morph_type(&self) -> Option<&str> {
        self.morph_type.as_deref()
    }

    // ==================== Chain ====================

    pub fn where_eq(mut self, target: impl Into<Target>, value: impl Into<Value>) -> Self {
        self.query = self.query.where_eq(target, value);
        self
    }

    pub fn where_op(mut self, target: impl Into<Target>, op: Op, value: impl Into<Value>) -> Self {
        self.query = self.query.where_op(target, op, value);
        self
    }

    pub fn where_in<V: Into<Value>>(
        mut self,
        target: impl Into<Target>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.query = self.query.where_in(target, values);
        self
    }

    pub fn where_null(mut self, target: impl Into<Target>) -> Self {
        self.query = self.query.where_null(target);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.query = self.query.order_by(column);
        self
    }

    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.query = self.query.order_by_desc(column);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    /// Apply arbitrary builder calls to the related query.
    pub fn scope(mut self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.query = f(self.query);
        self
    }

    /// Project extra pivot columns as `pivot_<column>`.
    #[allow(clippy::result_large_err)]
    pub fn with_pivot(mut self, columns: &[&str]) -> Result<Self> {
        let pivot = pivot_info(&self.def)?;
        for column in columns {
            self.query = self.query.select_expr(
                Expr::col(format!("{}.{}", pivot.table, column)).alias(format!("pivot_{column}")),
            );
        }
        Ok(self)
    }

    // ==================== Terminals ====================

    /// The fully constrained query, or `None` when the relation cannot match
    /// anything.
    #[allow(clippy::result_large_err)]
    pub fn to_query(&self) -> Result<Option<QueryBuilder>> {
        let Some(related) = self.related else {
            return Ok(None);
        };
        if self.local_value.is_null() {
            return Ok(None);
        }
        let query = add_constraints(
            self.query.clone(),
            &self.def,
            related,
            &self.local_value,
            self.morph_type(),
        )?;
        Ok(Some(order_to_one(query, &self.def, related)))
    }

    #[tracing::instrument(level = "debug", skip(self, cx, session), fields(relation = self.def.name))]
    pub async fn get<C: Connection>(&self, cx: &Cx, session: &Session<C>) -> Outcome<Vec<Record>, Error> {
        let (Some(query), Some(related)) = (try_result!(self.to_query()), self.related) else {
            tracing::trace!("Relation unbound; skipping query");
            return Outcome::Ok(Vec::new());
        };
        let rows = try_outcome!(query.get(cx, session).await);
        Outcome::Ok(rows.iter().map(|row| Record::hydrate(related, row)).collect())
    }

    pub async fn first<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
    ) -> Outcome<Option<Record>, Error> {
        let limited = self.clone().limit(1);
        let records = try_outcome!(limited.get(cx, session).await);
        Outcome::Ok(records.into_iter().next())
    }

    pub async fn count<C: Connection>(&self, cx: &Cx, session: &Session<C>) -> Outcome<u64, Error> {
        match try_result!(self.to_query()) {
            Some(query) => query.count(cx, session).await,
            None => Outcome::Ok(0),
        }
    }

    pub async fn exists<C: Connection>(&self, cx: &Cx, session: &Session<C>) -> Outcome<bool, Error> {
        match try_result!(self.to_query()) {
            Some(query) => query.exists(cx, session).await,
            None => Outcome::Ok(false),
        }
    }

    pub async fn pluck<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        column: &str,
    ) -> Outcome<Vec<Value>, Error> {
        match try_result!(self.to_query()) {
            Some(query) => query.pluck(cx, session, column).await,
            None => Outcome::Ok(Vec::new()),
        }
    }

    /// Results shaped by cardinality: `One` for to-one kinds, `Many` otherwise.
    pub async fn get_results<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
    ) -> Outcome<Loaded, Error> {
        if self.def.kind.is_to_one() {
            let record = try_outcome!(self.first(cx, session).await);
            Outcome::Ok(Loaded::One(record.map(Box::new)))
        } else {
            self.get(cx, session).await.map(Loaded::Many)
        }
    }
}

#[allow(clippy::result_large_err)]
pub(crate) fn related_of(def: &RelationDef) -> Result<&'static ModelSchema> {
    def.related_schema().ok_or_else(|| {
        Error::config(format!("relation '{}' declares no related model", def.name))
    })
}
