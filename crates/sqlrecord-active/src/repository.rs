//! Model-level entry points bound to a session.

use crate::persist::{ActiveRecord, table_query};
use sqlrecord_core::{
    Attributes, Connection, Cx, Error, Model, ModelSchema, Outcome, Record, Result, Row, Session,
    Value, try_outcome,
};
use sqlrecord_query::{Page, Predicate, QueryBuilder, Target};
use sqlrecord_relation::Relation;

/// Which soft-deleted rows a repository query sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrashedScope {
    /// Live rows only.
    #[default]
    Exclude,
    /// Live and trashed rows.
    Include,
    /// Trashed rows only.
    Only,
}

/// Finders and constructors for one model, bound to a session.
///
/// ```rust,ignore
/// let users = Repository::<User, _>::new(&session);
/// let ada = users.find_or_fail(&cx, 1).await;
/// let page = users.paginate(&cx, 2, None).await;
/// ```
#[derive(Debug)]
pub struct Repository<'s, C: Connection> {
    session: &'s Session<C>,
    schema: &'static ModelSchema,
    trashed: TrashedScope,
}

impl<C: Connection> Clone for Repository<'_, C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            schema: self.schema,
            trashed: self.trashed,
        }
    }
}

impl<'s, C: Connection> Repository<'s, C> {
    /// Repository for the model type `M`.
    pub fn of<M: Model>(session: &'s Session<C>) -> Self {
        Self::new(session, M::schema())
    }

    pub fn new(session: &'s Session<C>, schema: &'static ModelSchema) -> Self {
        Self {
            session,
            schema,
            trashed: TrashedScope::default(),
        }
    }

    pub fn schema(&self) -> &'static ModelSchema {
        self.schema
    }

    pub fn session(&self) -> &'s Session<C> {
        self.session
    }

    /// Include trashed rows in every query.
    pub fn with_trashed(mut self) -> Self {
        self.trashed = TrashedScope::Include;
        self
    }

    /// Restrict every query to trashed rows.
    pub fn only_trashed(mut self) -> Self {
        self.trashed = TrashedScope::Only;
        self
    }

    /// A builder on the model's table with the soft-delete scope applied.
    pub fn query(&self) -> QueryBuilder {
        let query = table_query(self.schema, self.session);
        let Some(column) = self.schema.soft_delete_column() else {
            return query;
        };
        let target = Target::Column(self.schema.qualified(column));
        match self.trashed {
            TrashedScope::Include => query,
            TrashedScope::Exclude => query.constrain(Predicate::Null {
                target,
                negated: false,
            }),
            TrashedScope::Only => query.constrain(Predicate::Null {
                target,
                negated: true,
            }),
        }
    }

    fn hydrate(&self, rows: &[Row]) -> Vec<Record> {
        rows.iter()
            .map(|row| Record::hydrate(self.schema, row))
            .collect()
    }

    /// Run a builder obtained from [`query`](Self::query) and hydrate the rows.
    pub async fn get(&self, cx: &Cx, query: &QueryBuilder) -> Outcome<Vec<Record>, Error> {
        let rows = try_outcome!(query.get(cx, self.session).await);
        Outcome::Ok(self.hydrate(&rows))
    }

    pub async fn all(&self, cx: &Cx) -> Outcome<Vec<Record>, Error> {
        self.get(cx, &self.query()).await
    }

    pub async fn find(&self, cx: &Cx, id: impl Into<Value>) -> Outcome<Option<Record>, Error> {
        let row = try_outcome!(self.query().find(cx, self.session, id).await);
        Outcome::Ok(row.map(|row| Record::hydrate(self.schema, &row)))
    }

    /// Like [`find`](Self::find), but a missing row is a NotFound error.
    pub async fn find_or_fail(&self, cx: &Cx, id: impl Into<Value>) -> Outcome<Record, Error> {
        let id = id.into();
        match try_outcome!(self.find(cx, id.clone()).await) {
            Some(record) => Outcome::Ok(record),
            None => Outcome::Err(Error::record_not_found(
                self.schema.table_name(),
                format!("no row with {} = {}", self.schema.primary_key(), id),
            )),
        }
    }

    pub async fn find_many<V: Into<Value>>(
        &self,
        cx: &Cx,
        ids: impl IntoIterator<Item = V>,
    ) -> Outcome<Vec<Record>, Error> {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let query = self.query().where_in(self.schema.primary_key(), ids);
        self.get(cx, &query).await
    }

    pub async fn first_where(
        &self,
        cx: &Cx,
        column: &str,
        value: impl Into<Value>,
    ) -> Outcome<Option<Record>, Error> {
        let row = try_outcome!(self.query().where_eq(column, value).first(cx, self.session).await);
        Outcome::Ok(row.map(|row| Record::hydrate(self.schema, &row)))
    }

    /// A new unsaved record, mass-assigned from `attributes`.
    pub fn make(&self, attributes: Attributes) -> Record {
        let mut record = Record::new(self.schema);
        record.fill(attributes);
        record
    }

    /// [`make`](Self::make) and save.
    pub async fn create(&self, cx: &Cx, attributes: Attributes) -> Outcome<Record, Error> {
        let mut record = self.make(attributes);
        try_outcome!(record.save(cx, self.session).await);
        Outcome::Ok(record)
    }

    /// One page ordered by primary key; `per_page` defaults to the session's
    /// configured page size.
    pub async fn paginate(
        &self,
        cx: &Cx,
        page: u64,
        per_page: Option<u64>,
    ) -> Outcome<Page<Record>, Error> {
        let per_page = per_page.unwrap_or(self.session.config().default_per_page);
        let query = self.query().order_by(self.schema.primary_key());
        let page = try_outcome!(query.paginate(cx, self.session, page, per_page).await);
        Outcome::Ok(page.map(|row| Record::hydrate(self.schema, &row)))
    }

    /// Stream every row in primary-key order, `size` records at a time.
    ///
    /// Returns `false` if `f` stopped the iteration.
    pub async fn chunk<F>(&self, cx: &Cx, size: Option<u64>, mut f: F) -> Outcome<bool, Error>
    where
        F: FnMut(Vec<Record>) -> bool,
    {
        let size = size.unwrap_or(self.session.config().default_chunk_size);
        let query = self.query().order_by(self.schema.primary_key());
        query
            .chunk(cx, self.session, size, |rows| f(self.hydrate(&rows)))
            .await
    }

    /// Re-read `record` from the database.
    pub async fn refresh(&self, cx: &Cx, record: &mut Record) -> Outcome<(), Error> {
        record.refresh(cx, self.session).await
    }

    #[allow(clippy::result_large_err)]
    pub fn relation(&self, record: &Record, name: &str) -> Result<Relation> {
        Relation::of(self.session, record, name)
    }

    /// Eager load `paths` into `records`.
    pub async fn load(&self, cx: &Cx, records: &mut [Record], paths: &[&str]) -> Outcome<(), Error> {
        sqlrecord_relation::load(cx, self.session, records, paths).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use sqlrecord_core::testing::{MockConnection, unwrap_outcome};
    use sqlrecord_core::{Dialect, KeyStrategy, SessionConfig};
    use std::sync::OnceLock;

    struct Post;

    impl Model for Post {
        fn schema() -> &'static ModelSchema {
            static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                ModelSchema::builder("posts")
                    .key_strategy(KeyStrategy::AutoIncrement)
                    .fillable(&["title", "body"])
                    .soft_deletes()
                    .build()
            })
        }
    }

    fn session() -> Session<MockConnection> {
        Session::builder()
            .connection(MockConnection::new())
            .config(SessionConfig::new().dialect(Dialect::Sqlite).default_per_page(2))
            .build()
            .expect("session")
    }

    fn post(id: i32) -> Row {
        Row::from_pairs([("id", Value::from(id)), ("title", Value::from("t"))])
    }

    #[test]
    fn test_soft_delete_scopes() {
        let session = session();
        let posts = Repository::of::<Post>(&session);
        assert_eq!(
            posts.query().to_sql().unwrap().0,
            "SELECT * FROM \"posts\" WHERE \"posts\".\"deleted_at\" IS NULL"
        );
        assert_eq!(
            posts.clone().only_trashed().query().to_sql().unwrap().0,
            "SELECT * FROM \"posts\" WHERE \"posts\".\"deleted_at\" IS NOT NULL"
        );
        assert_eq!(
            posts.with_trashed().query().to_sql().unwrap().0,
            "SELECT * FROM \"posts\""
        );
    }

    #[test]
    fn test_find_or_fail() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session.connection().push_rows(vec![post(3)]);
        let posts = Repository::of::<Post>(&session);

        rt.block_on(async {
            let found = unwrap_outcome(posts.find_or_fail(&cx, 3).await);
            assert!(found.exists());
            assert_eq!(found.key(), Some(&Value::Int(3)));

            let missing = posts.find_or_fail(&cx, 4).await;
            assert!(matches!(missing, Outcome::Err(ref e) if e.is_not_found()));
        });
        assert_eq!(
            session.connection().statements()[0],
            "SELECT * FROM \"posts\" WHERE \"id\" = ? AND \"posts\".\"deleted_at\" IS NULL LIMIT 1"
        );
    }

    #[test]
    fn test_find_many_empty_skips_query() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        let posts = Repository::of::<Post>(&session);

        let found = unwrap_outcome(rt.block_on(posts.find_many(&cx, Vec::<i64>::new())));
        assert!(found.is_empty());
        assert_eq!(session.connection().count(), 0);
    }

    #[test]
    fn test_create_respects_fillable() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        let posts = Repository::of::<Post>(&session);

        let mut attributes = Attributes::new();
        attributes.insert("title".into(), Value::from("Hello"));
        attributes.insert("views".into(), Value::from(99));
        attributes.insert("id".into(), Value::from(500));
        let created = unwrap_outcome(rt.block_on(posts.create(&cx, attributes)));

        assert!(created.exists());
        assert_eq!(created.get("views"), None);
        assert_eq!(created.key(), Some(&Value::BigInt(1)));
        assert_eq!(
            session.connection().statements(),
            vec!["INSERT INTO \"posts\" (\"title\") VALUES (?)".to_string()]
        );
    }

    #[test]
    fn test_paginate_uses_default_per_page() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session
            .connection()
            .push_rows(vec![Row::from_pairs([("aggregate", 5)])])
            .push_rows(vec![post(3), post(4)]);
        let posts = Repository::of::<Post>(&session);

        let page = unwrap_outcome(rt.block_on(posts.paginate(&cx, 2, None)));
        assert_eq!(page.per_page, 2);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_prev && page.has_next);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].schema().table_name(), "posts");
        assert!(session.connection().statements()[1].ends_with("ORDER BY \"id\" ASC LIMIT 2 OFFSET 2"));
    }

    #[test]
    fn test_chunk_hydrates_and_stops() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session
            .connection()
            .push_rows(vec![post(1), post(2)])
            .push_rows(vec![post(3), post(4)]);
        let posts = Repository::of::<Post>(&session);

        let mut seen = Vec::new();
        let completed = unwrap_outcome(rt.block_on(posts.chunk(&cx, Some(2), |batch| {
            seen.extend(batch.iter().map(|r| r.value("id")));
            seen.len() < 2
        })));
        assert!(!completed);
        assert_eq!(seen, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(session.connection().count(), 1);
    }
}
