//! Per-kind query shapes.
//!
//! Every relation is a query on the related table plus one key constraint.
//! Bound relations compare the key column with a single parent value; eager
//! loads compare it with the whole batch and, for pivot and through
//! relations, also select the parent key under a helper alias so rows can be
//! routed back to their parent.

use sqlrecord_core::{
    Dialect, Error, ModelSchema, PivotInfo, RelationDef, RelationKind, Result, ThroughInfo, Value,
};
use sqlrecord_query::{Expr, Op, Predicate, QueryBuilder, Target};

/// Alias of the parent key selected by many-to-many eager loads.
pub const PIVOT_KEY: &str = "__pivot_key";

/// Alias of the parent key selected by through eager loads.
pub const THROUGH_KEY: &str = "__through_key";

#[allow(clippy::result_large_err)]
pub(crate) fn pivot_info(def: &RelationDef) -> Result<PivotInfo> {
    def.pivot.ok_or_else(|| {
        Error::config(format!(
            "relation '{}' is many-to-many but declares no pivot table",
            def.name
        ))
    })
}

#[allow(clippy::result_large_err)]
pub(crate) fn through_info(def: &RelationDef) -> Result<ThroughInfo> {
    def.through.ok_or_else(|| {
        Error::config(format!(
            "relation '{}' is a through relation but declares no intermediate table",
            def.name
        ))
    })
}

/// Related table query with the joins and scopes the kind needs, but no key
/// constraint yet.
#[allow(clippy::result_large_err)]
pub(crate) fn base_query(
    def: &RelationDef,
    related: &'static ModelSchema,
    dialect: Dialect,
) -> Result<QueryBuilder> {
    let table = related.table_name();
    let mut query = QueryBuilder::new(table, dialect).key_name(related.primary_key());

    match def.kind {
        RelationKind::ManyToMany => {
            let pivot = pivot_info(def)?;
            query = query
                .select(&[format!("{table}.*").as_str()])
                .join(
                    pivot.table,
                    related.qualified(pivot.related_key),
                    Op::Eq,
                    format!("{}.{}", pivot.table, pivot.pivot_foreign_key),
                );
        }
        RelationKind::HasOneThrough | RelationKind::HasManyThrough => {
            let through = through_info(def)?;
            query = query
                .select(&[format!("{table}.*").as_str()])
                .join(
                    through.table,
                    format!("{}.{}", through.table, through.second_local_key),
                    Op::Eq,
                    related.qualified(through.second_key),
                );
        }
        _ => {}
    }

    if let Some(column) = related.soft_delete_column() {
        query = query.constrain(Predicate::Null {
            target: Target::Column(related.qualified(column)),
            negated: false,
        });
    }
    Ok(query)
}

/// Column compared with the parent's key value.
#[allow(clippy::result_large_err)]
pub(crate) fn key_column(def: &RelationDef, related: &'static ModelSchema) -> Result<String> {
    Ok(match def.kind {
        RelationKind::HasOne | RelationKind::HasMany => related.qualified(def.foreign_key),
        RelationKind::MorphOne | RelationKind::MorphMany => related.qualified(&def.morph_id_column()),
        RelationKind::BelongsTo => related.qualified(def.owner_key),
        RelationKind::MorphTo => related.qualified(related.primary_key()),
        RelationKind::ManyToMany => {
            let pivot = pivot_info(def)?;
            format!("{}.{}", pivot.table, pivot.pivot_local_key)
        }
        RelationKind::HasOneThrough | RelationKind::HasManyThrough => {
            let through = through_info(def)?;
            format!("{}.{}", through.table, through.first_key)
        }
    })
}

fn morph_scope(
    query: QueryBuilder,
    def: &RelationDef,
    related: &'static ModelSchema,
    morph_type: Option<&str>,
) -> QueryBuilder {
    match (def.kind, morph_type) {
        (RelationKind::MorphOne | RelationKind::MorphMany, Some(alias)) => {
            query.constrain(Predicate::Basic {
                target: Target::Column(related.qualified(&def.morph_type_column())),
                op: Op::Eq,
                value: Value::Text(alias.to_string()),
            })
        }
        _ => query,
    }
}

/// Order the candidates of a to-one relation that can match several rows by
/// the related key, unless the caller already ordered them. The bound and
/// eager paths both keep the first row, so they resolve to the same record.
pub(crate) fn order_to_one(
    query: QueryBuilder,
    def: &RelationDef,
    related: &'static ModelSchema,
) -> QueryBuilder {
    match def.kind {
        RelationKind::HasOne | RelationKind::HasOneThrough | RelationKind::MorphOne
            if !query.has_orders() =>
        {
            query.order_by(related.qualified(related.primary_key()))
        }
        _ => query,
    }
}

/// Constrain `query` to the rows related to one parent value.
#[allow(clippy::result_large_err)]
pub fn add_constraints(
    query: QueryBuilder,
    def: &RelationDef,
    related: &'static ModelSchema,
    local_value: &Value,
    morph_type: Option<&str>,
) -> Result<QueryBuilder> {
    let query = query.constrain(Predicate::Basic {
        target: Target::Column(key_column(def, related)?),
        op: Op::Eq,
        value: local_value.clone(),
    });
    Ok(morph_scope(query, def, related, morph_type))
}

/// Constrain `query` to the rows related to any of `keys`.
#[allow(clippy::result_large_err)]
pub fn add_eager_constraints(
    query: QueryBuilder,
    def: &RelationDef,
    related: &'static ModelSchema,
    keys: Vec<Value>,
    morph_type: Option<&str>,
) -> Result<QueryBuilder> {
    let column = key_column(def, related)?;
    let query = match def.kind {
        RelationKind::ManyToMany => query.select_expr(Expr::col(column.clone()).alias(PIVOT_KEY)),
        RelationKind::HasOneThrough | RelationKind::HasManyThrough => {
            query.select_expr(Expr::col(column.clone()).alias(THROUGH_KEY))
        }
        _ => query,
    };
    let query = query.constrain(Predicate::In {
        target: Target::Column(column),
        values: keys,
        negated: false,
    });
    Ok(morph_scope(query, def, related, morph_type))
}
