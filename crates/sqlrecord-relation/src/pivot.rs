//! Many-to-many pivot management.

use crate::constraints::pivot_info;
use crate::relation::Relation;
use serde::{Deserialize, Serialize};
use sqlrecord_core::{
    Attributes, Connection, Cx, Error, Outcome, PivotInfo, Result, Session, Value, ValueKey,
    try_outcome, try_result,
};
use sqlrecord_query::QueryBuilder;
use std::collections::{BTreeMap, HashSet};

/// Desired pivot state for [`Relation::sync`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncInput {
    /// Related keys only.
    Ids(Vec<Value>),
    /// Related keys with per-row pivot attributes.
    WithPivot(Vec<(Value, Attributes)>),
}

impl SyncInput {
    fn into_entries(self) -> Vec<(Value, Attributes)> {
        match self {
            SyncInput::Ids(ids) => ids.into_iter().map(|id| (id, Attributes::new())).collect(),
            SyncInput::WithPivot(entries) => entries,
        }
    }
}

impl<V: Into<Value>> From<Vec<V>> for SyncInput {
    fn from(ids: Vec<V>) -> Self {
        SyncInput::Ids(ids.into_iter().map(Into::into).collect())
    }
}

/// What a `sync` or `toggle` changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub attached: Vec<Value>,
    pub detached: Vec<Value>,
    /// Existing rows whose pivot attributes were rewritten.
    pub updated: Vec<Value>,
}

/// Drop NULL and repeated keys, keeping first occurrences.
fn dedup<T>(entries: Vec<(Value, T)>) -> Vec<(Value, T)> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|(id, _)| id.key().is_some_and(|key| seen.insert(key)))
        .collect()
}

impl Relation {
    #[allow(clippy::result_large_err)]
    fn pivot_target(&self) -> Result<(PivotInfo, Value)> {
        let pivot = pivot_info(self.def())?;
        if self.local_value().is_null() {
            return Err(Error::config(format!(
                "relation '{}' cannot manage pivot rows for a parent without a key",
                self.name()
            )));
        }
        Ok((pivot, self.local_value().clone()))
    }

    fn pivot_query(&self, pivot: &PivotInfo, local: &Value) -> QueryBuilder {
        QueryBuilder::new(pivot.table, self.dialect())
            .where_eq(pivot.pivot_local_key, local.clone())
    }

    /// Related keys currently linked to the parent.
    pub async fn pivot_ids<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
    ) -> Outcome<Vec<Value>, Error> {
        let (pivot, local) = try_result!(self.pivot_target());
        self.pivot_query(&pivot, &local)
            .pluck(cx, session, pivot.pivot_foreign_key)
            .await
    }

    async fn insert_pivot_rows<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        entries: Vec<(Value, Attributes)>,
    ) -> Outcome<u64, Error> {
        if entries.is_empty() {
            return Outcome::Ok(0);
        }
        let (pivot, local) = try_result!(self.pivot_target());
        let rows: Vec<Attributes> = entries
            .into_iter()
            .map(|(id, extra)| {
                let mut row = extra;
                row.insert(pivot.pivot_local_key.to_string(), local.clone());
                row.insert(pivot.pivot_foreign_key.to_string(), id);
                row
            })
            .collect();

        // Rows with different pivot attribute sets cannot share one INSERT.
        let mut batches: BTreeMap<Vec<String>, Vec<Attributes>> = BTreeMap::new();
        for row in rows {
            batches.entry(row.keys().cloned().collect()).or_default().push(row);
        }
        let query = QueryBuilder::new(pivot.table, self.dialect());
        let mut inserted = 0;
        for batch in batches.values() {
            let result = try_outcome!(query.insert_many(cx, session, batch).await);
            inserted += result.rows_affected;
        }
        Outcome::Ok(inserted)
    }

    /// Link related keys, with optional pivot attributes for every new row.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = self.name()))]
    pub async fn attach<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        ids: Vec<Value>,
        pivot_data: &Attributes,
    ) -> Outcome<u64, Error> {
        let entries = dedup(ids.into_iter().map(|id| (id, pivot_data.clone())).collect());
        self.insert_pivot_rows(cx, session, entries).await
    }

    /// Unlink related keys; `None` unlinks everything, an empty list nothing.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = self.name()))]
    pub async fn detach<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        ids: Option<Vec<Value>>,
    ) -> Outcome<u64, Error> {
        let (pivot, local) = try_result!(self.pivot_target());
        let query = self.pivot_query(&pivot, &local);
        let query = match ids {
            None => query,
            Some(ids) if ids.is_empty() => return Outcome::Ok(0),
            Some(ids) => query.where_in(pivot.pivot_foreign_key, ids),
        };
        query.delete(cx, session).await
    }

    /// Make the linked keys exactly `input`, touching only the difference.
    ///
    /// Runs in a transaction (a savepoint when one is already open), so a
    /// failed statement leaves the pivot as it was.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = self.name()))]
    pub async fn sync<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        input: impl Into<SyncInput>,
    ) -> Outcome<SyncResult, Error> {
        try_result!(self.pivot_target());
        let desired = dedup(input.into().into_entries());
        session
            .transaction(cx, |tx| async move { self.apply_sync(cx, &tx, desired).await })
            .await
    }

    async fn apply_sync<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        desired: Vec<(Value, Attributes)>,
    ) -> Outcome<SyncResult, Error> {
        let current = try_outcome!(self.pivot_ids(cx, session).await);
        let current_keys: HashSet<ValueKey> = current.iter().filter_map(Value::key).collect();
        let desired_keys: HashSet<ValueKey> = desired.iter().filter_map(|(id, _)| id.key()).collect();

        let detached: Vec<Value> = current
            .into_iter()
            .filter(|id| id.key().is_some_and(|key| !desired_keys.contains(&key)))
            .collect();
        let (existing, fresh): (Vec<_>, Vec<_>) = desired
            .into_iter()
            .partition(|(id, _)| id.key().is_some_and(|key| current_keys.contains(&key)));

        let mut result = SyncResult::default();
        if !detached.is_empty() {
            try_outcome!(self.detach(cx, session, Some(detached.clone())).await);
            result.detached = detached;
        }
        result.attached = fresh.iter().map(|(id, _)| id.clone()).collect();
        try_outcome!(self.insert_pivot_rows(cx, session, fresh).await);

        let (pivot, local) = try_result!(self.pivot_target());
        for (id, extra) in existing {
            if extra.is_empty() {
                continue;
            }
            try_outcome!(
                self.pivot_query(&pivot, &local)
                    .where_eq(pivot.pivot_foreign_key, id.clone())
                    .update(cx, session, &extra)
                    .await
            );
            result.updated.push(id);
        }

        tracing::debug!(
            attached = result.attached.len(),
            detached = result.detached.len(),
            updated = result.updated.len(),
            "Synced pivot"
        );
        Outcome::Ok(result)
    }

    /// Detach the linked keys among `ids` and attach the rest, in one
    /// transaction.
    #[tracing::instrument(level = "debug", skip_all, fields(relation = self.name()))]
    pub async fn toggle<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        ids: Vec<Value>,
    ) -> Outcome<SyncResult, Error> {
        try_result!(self.pivot_target());
        let wanted: Vec<Value> = dedup(ids.into_iter().map(|id| (id, ())).collect())
            .into_iter()
            .map(|(id, ())| id)
            .collect();
        if wanted.is_empty() {
            return Outcome::Ok(SyncResult::default());
        }
        session
            .transaction(cx, |tx| async move { self.apply_toggle(cx, &tx, wanted).await })
            .await
    }

    async fn apply_toggle<C: Connection>(
        &self,
        cx: &Cx,
        session: &Session<C>,
        wanted: Vec<Value>,
    ) -> Outcome<SyncResult, Error> {
        let current = try_outcome!(self.pivot_ids(cx, session).await);
        let current_keys: HashSet<ValueKey> = current.iter().filter_map(Value::key).collect();
        let (linked, unlinked): (Vec<_>, Vec<_>) = wanted
            .into_iter()
            .partition(|id| id.key().is_some_and(|key| current_keys.contains(&key)));

        if !linked.is_empty() {
            try_outcome!(self.detach(cx, session, Some(linked.clone())).await);
        }
        let entries = unlinked.iter().map(|id| (id.clone(), Attributes::new())).collect();
        try_outcome!(self.insert_pivot_rows(cx, session, entries).await);
        Outcome::Ok(SyncResult {
            attached: unlinked,
            detached: linked,
            updated: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use sqlrecord_core::testing::{MockConnection, StatementKind, unwrap_outcome};
    use sqlrecord_core::{Dialect, ModelSchema, MorphMap, Record, RelationDef, Row};
    use std::sync::OnceLock;

    fn users() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ModelSchema::builder("users")
                .relation(RelationDef::belongs_to_many(
                    "tags",
                    tags,
                    PivotInfo::new("tag_user", "user_id", "tag_id"),
                ))
                .build()
        })
    }

    fn tags() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| ModelSchema::builder("tags").build())
    }

    fn setup() -> (Session<MockConnection>, Relation) {
        let session = Session::builder()
            .connection(MockConnection::new())
            .dialect(Dialect::Postgres)
            .build()
            .expect("session");
        let user = Record::hydrate(users(), &Row::from_pairs([("id", 1)]));
        let relation = Relation::bind(
            *users().relation("tags").expect("declared"),
            &user,
            &MorphMap::new(),
            Dialect::Postgres,
        )
        .expect("bind");
        (session, relation)
    }

    fn tag_rows(ids: &[&str]) -> Vec<Row> {
        ids.iter().map(|id| Row::from_pairs([("tag_id", *id)])).collect()
    }

    #[test]
    fn test_sync_touches_only_the_difference() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (session, relation) = setup();
        session.connection().push_rows(tag_rows(&["b", "c"]));

        let result = unwrap_outcome(rt.block_on(async {
            relation.sync(&cx, &session, vec!["a", "b"]).await
        }));

        assert_eq!(result.attached, vec![Value::from("a")]);
        assert_eq!(result.detached, vec![Value::from("c")]);
        assert!(result.updated.is_empty());

        let executed: Vec<_> = session
            .connection()
            .recorded()
            .into_iter()
            .filter(|s| s.kind == StatementKind::Execute)
            .collect();
        assert_eq!(executed.len(), 4);
        assert_eq!(executed[0].sql, "BEGIN");
        assert_eq!(
            executed[1].sql,
            "DELETE FROM \"tag_user\" WHERE \"user_id\" = $1 AND \"tag_id\" IN ($2)"
        );
        assert_eq!(executed[1].params, vec![Value::Int(1), Value::from("c")]);
        assert_eq!(
            executed[2].sql,
            "INSERT INTO \"tag_user\" (\"tag_id\", \"user_id\") VALUES ($1, $2)"
        );
        assert_eq!(executed[2].params, vec![Value::from("a"), Value::Int(1)]);
        assert_eq!(executed[3].sql, "COMMIT");
    }

    #[test]
    fn test_attach_and_detach_edge_cases() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (session, relation) = setup();

        rt.block_on(async {
            let none = Attributes::new();
            assert_eq!(unwrap_outcome(relation.attach(&cx, &session, vec![], &none).await), 0);
            assert_eq!(
                unwrap_outcome(relation.detach(&cx, &session, Some(vec![])).await),
                0
            );
            assert_eq!(session.connection().count(), 0);

            let mut extra = Attributes::new();
            extra.insert("role".into(), Value::from("owner"));
            unwrap_outcome(
                relation
                    .attach(&cx, &session, vec![Value::Int(7), Value::Int(7)], &extra)
                    .await,
            );
            unwrap_outcome(relation.detach(&cx, &session, None).await);
        });

        assert_eq!(
            session.connection().statements(),
            vec![
                "INSERT INTO \"tag_user\" (\"role\", \"tag_id\", \"user_id\") VALUES ($1, $2, $3)"
                    .to_string(),
                "DELETE FROM \"tag_user\" WHERE \"user_id\" = $1".to_string(),
            ]
        );
    }

    #[test]
    fn test_toggle() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (session, relation) = setup();
        session.connection().push_rows(tag_rows(&["x"]));

        let result = unwrap_outcome(rt.block_on(async {
            relation
                .toggle(&cx, &session, vec![Value::from("x"), Value::from("y")])
                .await
        }));
        assert_eq!(result.detached, vec![Value::from("x")]);
        assert_eq!(result.attached, vec![Value::from("y")]);
    }

    #[test]
    fn test_sync_with_pivot_updates_existing_rows() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (session, relation) = setup();
        session.connection().push_rows(tag_rows(&["b"]));
        let mut extra = Attributes::new();
        extra.insert("weight".into(), Value::Int(3));

        let result = unwrap_outcome(rt.block_on(async {
            relation
                .sync(&cx, &session, SyncInput::WithPivot(vec![(Value::from("b"), extra)]))
                .await
        }));
        assert!(result.attached.is_empty());
        assert!(result.detached.is_empty());
        assert_eq!(result.updated, vec![Value::from("b")]);
        let statements = session.connection().statements();
        assert_eq!(
            statements[statements.len() - 2],
            "UPDATE \"tag_user\" SET \"weight\" = $1 WHERE \"user_id\" = $2 AND \"tag_id\" = $3"
        );
        assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));
    }

    #[test]
    fn test_failed_attach_rolls_back_detach() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (session, relation) = setup();
        session.connection().push_rows(tag_rows(&["b", "c"]));
        session.connection().fail_when("INSERT INTO \"tag_user\"");

        let outcome = rt.block_on(async { relation.sync(&cx, &session, vec!["a", "b"]).await });

        assert!(matches!(outcome, Outcome::Err(ref e) if e.is_driver_error()));
        let statements = session.connection().statements();
        assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
        assert!(statements.iter().any(|s| s.starts_with("DELETE FROM \"tag_user\"")));
        assert_eq!(statements.last().map(String::as_str), Some("ROLLBACK"));
    }

    #[test]
    fn test_sync_without_parent_key_opens_nothing() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let (session, _) = setup();
        let orphan = Record::new(users());
        let relation = Relation::of(&session, &orphan, "tags").expect("relation");

        let outcome = rt.block_on(async { relation.sync(&cx, &session, vec!["a"]).await });

        assert!(matches!(outcome, Outcome::Err(ref e) if e.is_config_error()));
        assert_eq!(session.connection().count(), 0);
    }
}
