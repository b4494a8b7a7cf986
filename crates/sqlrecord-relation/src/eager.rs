//! Batched eager loading.
//!
//! One relation level costs one query no matter how many parents it covers
//! (MorphTo costs one per distinct type). Related rows are routed back to
//! their parents through [`ValueKey`]s built from the parent key.

use crate::constraints::{
    PIVOT_KEY, THROUGH_KEY, add_eager_constraints, base_query, order_to_one,
};
use crate::relation::related_of;
use sqlrecord_core::{
    Connection, Cx, Error, Loaded, ModelSchema, Outcome, Record, RelationDef, RelationKind, Row,
    Session, Value, ValueKey, try_outcome, try_result,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Morph alias stored in a `{name}_type` column.
pub(crate) fn morph_alias(value: &Value) -> Option<String> {
    if value.is_null() {
        return None;
    }
    Some(value.as_str().map_or_else(|| value.to_string(), str::to_string))
}

/// Key under which [`get_eager`] files the results for `record`.
///
/// `None` when the record cannot own anything through `def` (NULL key, or a
/// MorphTo without a type).
pub fn parent_key(def: &RelationDef, record: &Record) -> Option<ValueKey> {
    let id = record.value(&def.parent_key_column());
    match def.kind {
        RelationKind::MorphTo => {
            let alias = morph_alias(&record.value(&def.morph_type_column()))?;
            ValueKey::composite(&[&Value::Text(alias), &id])
        }
        _ => id.key(),
    }
}

/// Non-NULL values with duplicates removed, first occurrence wins.
fn unique(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| value.key().is_some_and(|key| seen.insert(key)))
        .collect()
}

fn shape(records: Vec<Record>, to_one: bool) -> Loaded {
    if to_one {
        Loaded::One(records.into_iter().next().map(Box::new))
    } else {
        Loaded::Many(records)
    }
}

/// Related-row column holding the value that names its parent.
fn owner_column(def: &RelationDef) -> String {
    match def.kind {
        RelationKind::MorphOne | RelationKind::MorphMany => def.morph_id_column(),
        RelationKind::BelongsTo => def.owner_key.to_string(),
        _ => def.foreign_key.to_string(),
    }
}

/// Load `def` for every record in `parents` with a single query.
///
/// The result is keyed by [`parent_key`]; parents with no match have no
/// entry. No query is issued when no parent has a usable key.
#[tracing::instrument(level = "debug", skip_all, fields(relation = def.name, parents = parents.len()))]
pub async fn get_eager<C: Connection>(
    cx: &Cx,
    session: &Session<C>,
    parent_schema: &'static ModelSchema,
    def: &RelationDef,
    parents: &[&Record],
) -> Outcome<HashMap<ValueKey, Loaded>, Error> {
    if def.kind == RelationKind::MorphTo {
        return get_eager_morph_to(cx, session, def, parents).await;
    }

    let column = def.parent_key_column();
    let keys = unique(parents.iter().map(|parent| parent.value(&column)));
    if keys.is_empty() {
        tracing::trace!("No parent keys; skipping eager query");
        return Outcome::Ok(HashMap::new());
    }

    let related = try_result!(related_of(def));
    let morph_type = match def.kind {
        RelationKind::MorphOne | RelationKind::MorphMany => {
            Some(session.morphs().type_name_for(parent_schema))
        }
        _ => None,
    };
    let query = try_result!(base_query(def, related, session.dialect()));
    let query = try_result!(add_eager_constraints(
        query,
        def,
        related,
        keys,
        morph_type.as_deref()
    ));
    let query = order_to_one(query, def, related);
    let rows = try_outcome!(query.get(cx, session).await);

    let owner = owner_column(def);
    let mut grouped: HashMap<ValueKey, Vec<Record>> = HashMap::new();
    for row in &rows {
        let (owner_value, record) = match def.kind {
            RelationKind::ManyToMany => hydrate_split(related, row, PIVOT_KEY),
            RelationKind::HasOneThrough | RelationKind::HasManyThrough => {
                hydrate_split(related, row, THROUGH_KEY)
            }
            _ => (
                row.get_by_name(&owner).cloned(),
                Record::hydrate(related, row),
            ),
        };
        if let Some(key) = owner_value.as_ref().and_then(Value::key) {
            grouped.entry(key).or_default().push(record);
        }
    }

    tracing::debug!(rows = rows.len(), owners = grouped.len(), "Eager loaded");
    let to_one = def.kind.is_to_one();
    Outcome::Ok(
        grouped
            .into_iter()
            .map(|(key, records)| (key, shape(records, to_one)))
            .collect(),
    )
}

fn hydrate_split(related: &'static ModelSchema, row: &Row, helper: &str) -> (Option<Value>, Record) {
    let (owner, rest) = row.split_off(helper);
    (owner, Record::hydrate(related, &rest))
}

/// One query per distinct morph type, in alias order.
async fn get_eager_morph_to<C: Connection>(
    cx: &Cx,
    session: &Session<C>,
    def: &RelationDef,
    parents: &[&Record],
) -> Outcome<HashMap<ValueKey, Loaded>, Error> {
    let type_column = def.morph_type_column();
    let id_column = def.morph_id_column();

    let mut ids_by_type: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for parent in parents {
        let id = parent.value(&id_column);
        if let Some(alias) = morph_alias(&parent.value(&type_column)) {
            if !id.is_null() {
                ids_by_type.entry(alias).or_default().push(id);
            }
        }
    }

    let mut loaded = HashMap::new();
    for (alias, ids) in ids_by_type {
        let related = try_result!(session.morphs().resolve(&alias));
        let query = try_result!(base_query(def, related, session.dialect()));
        let query = try_result!(add_eager_constraints(query, def, related, unique(ids), None));
        let rows = try_outcome!(query.get(cx, session).await);
        tracing::debug!(morph_type = %alias, rows = rows.len(), "Eager loaded morph type");

        let type_value = Value::Text(alias);
        for row in &rows {
            let record = Record::hydrate(related, row);
            let id = record.value(related.primary_key());
            if let Some(key) = ValueKey::composite(&[&type_value, &id]) {
                loaded
                    .entry(key)
                    .or_insert_with(|| Loaded::One(Some(Box::new(record))));
            }
        }
    }
    Outcome::Ok(loaded)
}

/// Relation paths to load, nested by dotted segment.
#[derive(Debug, Default)]
struct LoadTree(BTreeMap<String, LoadTree>);

impl LoadTree {
    #[allow(clippy::result_large_err)]
    fn parse(paths: &[&str]) -> sqlrecord_core::Result<Self> {
        let mut root = LoadTree::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.split('.') {
                let segment = segment.trim();
                if segment.is_empty() {
                    return Err(Error::compilation(format!(
                        "invalid eager load path '{path}'"
                    )));
                }
                node = node.0.entry(segment.to_string()).or_default();
            }
        }
        Ok(root)
    }
}

/// Eager load `paths` into every record's relation cache.
///
/// Dotted paths (`"posts.comments"`) load each level once for all records
/// reached by the previous one. Records with nothing related get an empty
/// result, so every requested relation counts as loaded afterwards.
#[tracing::instrument(level = "debug", skip_all, fields(records = records.len(), ?paths))]
pub async fn load<C: Connection>(
    cx: &Cx,
    session: &Session<C>,
    records: &mut [Record],
    paths: &[&str],
) -> Outcome<(), Error> {
    let tree = try_result!(LoadTree::parse(paths));
    let mut targets: Vec<&mut Record> = records.iter_mut().collect();
    load_into(cx, session, &mut targets, &tree).await
}

async fn load_into<C: Connection>(
    cx: &Cx,
    session: &Session<C>,
    records: &mut [&mut Record],
    tree: &LoadTree,
) -> Outcome<(), Error> {
    if records.is_empty() {
        return Outcome::Ok(());
    }

    for (name, children) in &tree.0 {
        // Nested levels under a MorphTo can mix models.
        let mut by_table: BTreeMap<&'static str, Vec<usize>> = BTreeMap::new();
        for (index, record) in records.iter().enumerate() {
            by_table
                .entry(record.schema().table_name())
                .or_default()
                .push(index);
        }

        for indexes in by_table.values() {
            let schema = records[indexes[0]].schema();
            let def = *try_result!(schema.relation(name));
            let parents: Vec<&Record> = indexes.iter().map(|&i| &*records[i]).collect();
            let results = try_outcome!(get_eager(cx, session, schema, &def, &parents).await);

            for &index in indexes {
                let record = &mut *records[index];
                let loaded = parent_key(&def, record)
                    .and_then(|key| results.get(&key).cloned())
                    .unwrap_or_else(|| Loaded::empty(def.kind.is_to_one()));
                record.set_relation(name.as_str(), loaded);
            }
        }

        if !children.0.is_empty() {
            let mut nested: Vec<&mut Record> = records
                .iter_mut()
                .filter_map(|record| record.relation_mut(name))
                .flat_map(Loaded::records_mut)
                .collect();
            try_outcome!(Box::pin(load_into(cx, session, &mut nested, children)).await);
        }
    }
    Outcome::Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use sqlrecord_core::testing::{MockConnection, unwrap_outcome};
    use crate::relation::Relation;
    use sqlrecord_core::{Dialect, MorphMap, PivotInfo, ThroughInfo};
    use std::sync::OnceLock;

    fn users() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ModelSchema::builder("users")
                .relation(RelationDef::has_many("posts", posts, "user_id"))
                .relation(RelationDef::has_one("profile", profiles, "user_id"))
                .relation(RelationDef::belongs_to_many(
                    "roles",
                    roles,
                    PivotInfo::new("role_user", "user_id", "role_id"),
                ))
                .build()
        })
    }

    fn posts() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ModelSchema::builder("posts")
                .relation(RelationDef::belongs_to("author", users, "user_id"))
                .relation(RelationDef::morph_many("comments", comments, "commentable"))
                .relation(RelationDef::morph_one("cover", images, "imageable"))
                .build()
        })
    }

    fn countries() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            let through = ThroughInfo::new("users", "country_id", "user_id");
            ModelSchema::builder("countries")
                .relation(RelationDef::has_many_through("posts", posts, through))
                .relation(RelationDef::has_one_through("first_post", posts, through))
                .build()
        })
    }

    fn profiles() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| ModelSchema::builder("profiles").build())
    }

    fn images() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| ModelSchema::builder("images").build())
    }

    fn videos() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| ModelSchema::builder("videos").build())
    }

    fn roles() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| ModelSchema::builder("roles").build())
    }

    fn comments() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ModelSchema::builder("comments")
                .relation(RelationDef::morph_to("commentable"))
                .build()
        })
    }

    fn session() -> Session<MockConnection> {
        Session::builder()
            .connection(MockConnection::new())
            .dialect(Dialect::Postgres)
            .morph_map(MorphMap::new().with("post", posts).with("video", videos))
            .build()
            .expect("session")
    }

    fn user(id: Value) -> Record {
        Record::hydrate(users(), &Row::from_pairs([("id", id)]))
    }

    fn post(id: i32, user_id: i32) -> Row {
        Row::from_pairs([("id", id), ("user_id", user_id)])
    }

    fn comment(id: i32, morph_type: &str, morph_id: i32) -> Row {
        Row::from_pairs([
            ("id", Value::from(id)),
            ("commentable_type", Value::from(morph_type)),
            ("commentable_id", Value::from(morph_id)),
        ])
    }

    #[test]
    fn test_has_many_single_query_for_all_parents() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session
            .connection()
            .push_rows(vec![post(10, 1), post(11, 1), post(12, 3)]);
        let mut users = vec![user(Value::Int(1)), user(Value::Int(2)), user(Value::Int(3))];

        unwrap_outcome(rt.block_on(load(&cx, &session, &mut users, &["posts"])));

        let recorded = session.connection().recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].sql,
            "SELECT * FROM \"posts\" WHERE \"posts\".\"user_id\" IN ($1, $2, $3)"
        );
        let counts: Vec<usize> = users
            .iter()
            .map(|u| u.relation("posts").map_or(0, Loaded::len))
            .collect();
        assert_eq!(counts, vec![2, 0, 1]);
        assert!(users.iter().all(|u| u.relation_loaded("posts")));
    }

    #[test]
    fn test_no_parents_no_query() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();

        let mut none: Vec<Record> = Vec::new();
        unwrap_outcome(rt.block_on(load(&cx, &session, &mut none, &["posts"])));
        assert_eq!(session.connection().count(), 0);

        let mut keyless = vec![user(Value::Null)];
        unwrap_outcome(rt.block_on(load(&cx, &session, &mut keyless, &["posts"])));
        assert_eq!(session.connection().count(), 0);
        assert!(matches!(keyless[0].relation("posts"), Some(Loaded::Many(m)) if m.is_empty()));
    }

    #[test]
    fn test_nested_path_one_query_per_level() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session
            .connection()
            .push_rows(vec![post(10, 1), post(11, 2)])
            .push_rows(vec![comment(100, "post", 10), comment(101, "post", 10)]);
        let mut users = vec![user(Value::Int(1)), user(Value::Int(2))];

        unwrap_outcome(rt.block_on(load(&cx, &session, &mut users, &["posts.comments", "posts"])));

        let recorded = session.connection().recorded();
        assert_eq!(recorded.len(), 2);
        assert_eq!(
            recorded[1].sql,
            "SELECT * FROM \"comments\" WHERE \"comments\".\"commentable_id\" IN ($1, $2) AND \"comments\".\"commentable_type\" = $3"
        );
        assert_eq!(recorded[1].params[2], Value::from("post"));

        let first_posts = users[0].relation("posts").and_then(Loaded::as_many).unwrap();
        assert_eq!(first_posts[0].relation("comments").map(Loaded::len), Some(2));
        let second_posts = users[1].relation("posts").and_then(Loaded::as_many).unwrap();
        assert_eq!(second_posts[0].relation("comments").map(Loaded::len), Some(0));
    }

    #[test]
    fn test_belongs_to_shares_owner() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session
            .connection()
            .push_rows(vec![Row::from_pairs([("id", 1)])]);
        let mut posts = vec![
            Record::hydrate(posts(), &post(10, 1)),
            Record::hydrate(posts(), &post(11, 1)),
        ];

        unwrap_outcome(rt.block_on(load(&cx, &session, &mut posts, &["author"])));

        assert_eq!(session.connection().count(), 1);
        assert_eq!(
            session.connection().recorded()[0].params,
            vec![Value::Int(1)]
        );
        for post in &posts {
            let author = post.relation("author").and_then(Loaded::as_one).unwrap();
            assert_eq!(author.value("id"), Value::Int(1));
        }
    }

    #[test]
    fn test_pivot_key_is_stripped() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session.connection().push_rows(vec![
            Row::from_pairs([
                ("id", Value::from(7)),
                ("name", Value::from("admin")),
                (PIVOT_KEY, Value::from(2)),
            ]),
        ]);
        let mut users = vec![user(Value::Int(1)), user(Value::Int(2))];

        unwrap_outcome(rt.block_on(load(&cx, &session, &mut users, &["roles"])));

        assert!(users[0].relation("roles").is_some_and(Loaded::is_empty));
        let roles = users[1].relation("roles").and_then(Loaded::as_many).unwrap();
        assert_eq!(roles.len(), 1);
        assert!(roles[0].get(PIVOT_KEY).is_none());
        assert_eq!(roles[0].value("name"), Value::from("admin"));
    }

    #[test]
    fn test_morph_to_one_query_per_type() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session
            .connection()
            .push_rows(vec![Row::from_pairs([("id", 10)])])
            .push_rows(vec![Row::from_pairs([("id", 5)])]);
        let mut comments = vec![
            Record::hydrate(comments(), &comment(1, "post", 10)),
            Record::hydrate(comments(), &comment(2, "video", 5)),
            Record::hydrate(comments(), &comment(3, "post", 11)),
        ];

        unwrap_outcome(rt.block_on(load(&cx, &session, &mut comments, &["commentable"])));

        let queries = session.connection().queries();
        assert_eq!(
            queries,
            vec![
                "SELECT * FROM \"posts\" WHERE \"posts\".\"id\" IN ($1, $2)".to_string(),
                "SELECT * FROM \"videos\" WHERE \"videos\".\"id\" IN ($1)".to_string(),
            ]
        );
        let owner = |i: usize| comments[i].relation("commentable").and_then(Loaded::as_one);
        assert_eq!(owner(0).map(|r| r.schema().table_name()), Some("posts"));
        assert_eq!(owner(1).map(|r| r.schema().table_name()), Some("videos"));
        assert!(owner(2).is_none());
    }

    fn country(id: i32) -> Record {
        Record::hydrate(countries(), &Row::from_pairs([("id", id)]))
    }

    fn through_post(id: i32, user_id: i32, country_id: i32) -> Row {
        Row::from_pairs([
            ("id", Value::from(id)),
            ("user_id", Value::from(user_id)),
            (THROUGH_KEY, Value::from(country_id)),
        ])
    }

    #[test]
    fn test_has_many_through_routes_by_helper_key() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session.connection().push_rows(vec![
            through_post(10, 1, 7),
            through_post(11, 2, 7),
            through_post(12, 3, 8),
        ]);
        let mut countries = vec![country(7), country(8), country(9)];

        unwrap_outcome(rt.block_on(load(&cx, &session, &mut countries, &["posts"])));

        assert_eq!(
            session.connection().queries(),
            vec![
                "SELECT \"posts\".*, \"users\".\"country_id\" AS \"__through_key\" FROM \"posts\" INNER JOIN \"users\" ON \"users\".\"id\" = \"posts\".\"user_id\" WHERE \"users\".\"country_id\" IN ($1, $2, $3)"
                    .to_string()
            ]
        );
        let ids = |i: usize| -> Vec<Value> {
            countries[i]
                .relation("posts")
                .and_then(Loaded::as_many)
                .map(|posts| posts.iter().map(|p| p.value("id")).collect())
                .unwrap_or_default()
        };
        assert_eq!(ids(0), vec![Value::Int(10), Value::Int(11)]);
        assert_eq!(ids(1), vec![Value::Int(12)]);
        assert!(ids(2).is_empty());
        let first = &countries[0].relation("posts").and_then(Loaded::as_many).unwrap()[0];
        assert!(first.get(THROUGH_KEY).is_none());
        assert!(!first.is_dirty());
    }

    #[test]
    fn test_has_one_through_keeps_lowest_key() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        session
            .connection()
            .push_rows(vec![through_post(10, 1, 7), through_post(11, 2, 7)]);
        let mut countries = vec![country(7), country(8)];

        unwrap_outcome(rt.block_on(load(&cx, &session, &mut countries, &["first_post"])));

        let recorded = session.connection().recorded();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].sql.ends_with("ORDER BY \"posts\".\"id\" ASC"));
        let first = countries[0].relation("first_post").and_then(Loaded::as_one).unwrap();
        assert_eq!(first.value("id"), Value::Int(10));
        assert!(first.get(THROUGH_KEY).is_none());
        assert!(matches!(countries[1].relation("first_post"), Some(Loaded::One(None))));
    }

    #[test]
    fn test_morph_one_scoped_by_type_and_shaped_as_one() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        let image = |id: i32, owner: i32| {
            Row::from_pairs([
                ("id", Value::from(id)),
                ("imageable_type", Value::from("post")),
                ("imageable_id", Value::from(owner)),
            ])
        };
        session
            .connection()
            .push_rows(vec![image(20, 10), image(21, 10), image(22, 11)]);
        let mut posts = vec![
            Record::hydrate(posts(), &post(10, 1)),
            Record::hydrate(posts(), &post(11, 1)),
            Record::hydrate(posts(), &post(12, 1)),
        ];

        unwrap_outcome(rt.block_on(load(&cx, &session, &mut posts, &["cover"])));

        let recorded = session.connection().recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].sql,
            "SELECT * FROM \"images\" WHERE \"images\".\"imageable_id\" IN ($1, $2, $3) AND \"images\".\"imageable_type\" = $4 ORDER BY \"images\".\"id\" ASC"
        );
        assert_eq!(recorded[0].params[3], Value::from("post"));
        let cover = |i: usize| posts[i].relation("cover").and_then(Loaded::as_one).map(|r| r.value("id"));
        assert_eq!(cover(0), Some(Value::Int(20)));
        assert_eq!(cover(1), Some(Value::Int(22)));
        assert!(matches!(posts[2].relation("cover"), Some(Loaded::One(None))));
    }

    #[test]
    fn test_has_one_eager_and_bound_agree() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        let profile = |id: i32, user_id: i32| Row::from_pairs([("id", id), ("user_id", user_id)]);
        session
            .connection()
            .push_rows(vec![profile(4, 1), profile(6, 1), profile(5, 2)]);
        let mut users = vec![user(Value::Int(1)), user(Value::Int(2))];

        unwrap_outcome(rt.block_on(load(&cx, &session, &mut users, &["profile"])));

        let eager_sql = session.connection().queries().remove(0);
        assert!(eager_sql.ends_with("ORDER BY \"profiles\".\"id\" ASC"));
        let picked = |i: usize| users[i].relation("profile").and_then(Loaded::as_one).map(|r| r.value("id"));
        assert_eq!(picked(0), Some(Value::Int(4)));
        assert_eq!(picked(1), Some(Value::Int(5)));

        let (bound_sql, _) = Relation::of(&session, &users[0], "profile")
            .expect("relation")
            .to_query()
            .expect("query")
            .expect("bound")
            .to_sql()
            .expect("sql");
        assert!(bound_sql.ends_with("ORDER BY \"profiles\".\"id\" ASC"));
    }

    #[test]
    fn test_unregistered_morph_type_surfaces() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        let mut comments = vec![Record::hydrate(comments(), &comment(1, "photo", 3))];

        let outcome = rt.block_on(load(&cx, &session, &mut comments, &["commentable"]));
        assert!(matches!(outcome, Outcome::Err(ref e) if e.is_config_error()));
        assert_eq!(session.connection().count(), 0);
    }

    #[test]
    fn test_bad_paths() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let session = session();
        let mut users = vec![user(Value::Int(1))];

        let outcome = rt.block_on(load(&cx, &session, &mut users, &["followers"]));
        assert!(matches!(outcome, Outcome::Err(ref e) if e.is_not_found()));

        let outcome = rt.block_on(load(&cx, &session, &mut users, &["posts..comments"]));
        assert!(matches!(outcome, Outcome::Err(ref e) if e.is_compilation_error()));
    }
}
