use asupersync::runtime::RuntimeBuilder;
use sqlrecord::prelude::*;
use sqlrecord_core::testing::{MockConnection, StatementKind, unwrap_outcome};
use std::sync::OnceLock;

struct User;
struct Post;
struct Comment;
struct Tag;

impl Model for User {
    fn schema() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ModelSchema::builder("users")
                .key_strategy(KeyStrategy::AutoIncrement)
                .fillable(&["name", "email"])
                .hidden(&["password"])
                .relation(RelationDef::has_many("posts", Post::schema, "user_id"))
                .build()
        })
    }
}

impl Model for Post {
    fn schema() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ModelSchema::builder("posts")
                .key_strategy(KeyStrategy::AutoIncrement)
                .cast("published", CastKind::Boolean)
                .soft_deletes()
                .relation(RelationDef::belongs_to("author", User::schema, "user_id"))
                .relation(RelationDef::morph_many("comments", Comment::schema, "commentable"))
                .relation(RelationDef::belongs_to_many(
                    "tags",
                    Tag::schema,
                    PivotInfo::new("post_tag", "post_id", "tag_id"),
                ))
                .build()
        })
    }
}

impl Model for Comment {
    fn schema() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ModelSchema::builder("comments")
                .relation(RelationDef::morph_to("commentable"))
                .build()
        })
    }
}

impl Model for Tag {
    fn schema() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| ModelSchema::builder("tags").build())
    }
}

fn session(dialect: Dialect) -> Session<MockConnection> {
    Session::builder()
        .connection(MockConnection::new())
        .dialect(dialect)
        .morph_map(MorphMap::new().with("post", Post::schema))
        .build()
        .expect("session")
}

fn row(pairs: &[(&str, Value)]) -> Row {
    Row::from_pairs(pairs.iter().map(|(k, v)| (*k, v.clone())))
}

#[test]
fn equality_shorthand_matches_explicit_operator_in_every_dialect() {
    for dialect in [Dialect::Postgres, Dialect::Mysql, Dialect::Mariadb, Dialect::Sqlite] {
        let short = QueryBuilder::new("users", dialect)
            .where_eq("email", "a@b.c")
            .to_sql()
            .unwrap();
        let long = QueryBuilder::new("users", dialect)
            .where_op("email", Op::Eq, "a@b.c")
            .to_sql()
            .unwrap();
        assert_eq!(short, long, "{dialect}");
    }
}

#[test]
fn create_user_then_eager_load_posts_and_comments() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session(Dialect::Postgres);
    let users = Repository::of::<User>(&session);

    let mut attributes = Attributes::new();
    attributes.insert("name".into(), Value::from("Ada"));
    attributes.insert("password".into(), Value::from("hunter2"));
    let ada = unwrap_outcome(rt.block_on(users.create(&cx, attributes)));
    assert_eq!(ada.key(), Some(&Value::BigInt(1)));
    assert_eq!(ada.get("password"), None);

    session.connection().clear();
    session
        .connection()
        .push_rows(vec![
            row(&[("id", Value::Int(1)), ("name", Value::from("Ada"))]),
            row(&[("id", Value::Int(2)), ("name", Value::from("Grace"))]),
        ])
        .push_rows(vec![
            row(&[("id", Value::Int(10)), ("user_id", Value::Int(1)), ("published", Value::Int(1))]),
            row(&[("id", Value::Int(11)), ("user_id", Value::Int(1)), ("published", Value::Int(0))]),
        ])
        .push_rows(vec![row(&[
            ("id", Value::Int(100)),
            ("commentable_type", Value::from("post")),
            ("commentable_id", Value::Int(11)),
        ])]);

    let everyone = rt.block_on(async {
        let mut everyone = unwrap_outcome(users.all(&cx).await);
        unwrap_outcome(users.load(&cx, &mut everyone, &["posts.comments"]).await);
        everyone
    });

    assert_eq!(
        session.connection().queries(),
        vec![
            "SELECT * FROM \"users\"".to_string(),
            "SELECT * FROM \"posts\" WHERE \"posts\".\"deleted_at\" IS NULL AND \"posts\".\"user_id\" IN ($1, $2)".to_string(),
            "SELECT * FROM \"comments\" WHERE \"comments\".\"commentable_id\" IN ($1, $2) AND \"comments\".\"commentable_type\" = $3".to_string(),
        ]
    );

    let posts = everyone[0].relation("posts").and_then(Loaded::as_many).unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].value("published"), Value::Bool(true));
    assert_eq!(posts[1].relation("comments").map(Loaded::len), Some(1));
    assert!(everyone[1].relation("posts").is_some_and(Loaded::is_empty));

    let json = everyone[0].to_json();
    assert_eq!(json["posts"][0]["published"], serde_json::json!(true));
    assert_eq!(json["posts"][1]["comments"][0]["id"], serde_json::json!(100));
}

#[test]
fn transaction_commits_or_rolls_back() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session(Dialect::Sqlite);

    let committed = rt.block_on(async {
        let cx = &cx;
        session
            .transaction(cx, |tx| async move {
                let mut post = Record::new(Post::schema());
                post.set("title", "Draft");
                try_outcome!(post.save(cx, &tx).await);
                Outcome::Ok(post)
            })
            .await
    });
    assert!(unwrap_outcome(committed).exists());
    assert_eq!(
        session.connection().statements(),
        vec![
            "BEGIN".to_string(),
            "INSERT INTO \"posts\" (\"title\") VALUES (?)".to_string(),
            "COMMIT".to_string(),
        ]
    );

    session.connection().clear();
    session.connection().fail_when("INSERT INTO \"posts\"");
    let failed = rt.block_on(async {
        let cx = &cx;
        session
            .transaction(cx, |tx| async move {
                let mut post = Record::new(Post::schema());
                post.set("title", "Doomed");
                post.save(cx, &tx).await
            })
            .await
    });
    assert!(matches!(failed, Outcome::Err(ref e) if e.is_driver_error()));
    assert_eq!(session.connection().statements().last().map(String::as_str), Some("ROLLBACK"));
}

#[test]
fn tags_sync_through_bound_relation() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session(Dialect::Mysql);
    session
        .connection()
        .push_rows(vec![row(&[("tag_id", Value::from("b"))]), row(&[("tag_id", Value::from("c"))])]);
    let post = Record::hydrate(Post::schema(), &row(&[("id", Value::Int(7))]));

    let result = rt.block_on(async {
        let tags = post.related(&session, "tags").expect("declared relation");
        unwrap_outcome(tags.sync(&cx, &session, vec!["a", "b"]).await)
    });

    assert_eq!(result.attached, vec![Value::from("a")]);
    assert_eq!(result.detached, vec![Value::from("c")]);
    let writes: Vec<String> = session
        .connection()
        .recorded()
        .into_iter()
        .filter(|s| s.kind == StatementKind::Execute)
        .map(|s| s.sql)
        .collect();
    assert_eq!(
        writes,
        vec![
            "BEGIN".to_string(),
            "DELETE FROM `post_tag` WHERE `post_id` = ? AND `tag_id` IN (?)".to_string(),
            "INSERT INTO `post_tag` (`post_id`, `tag_id`) VALUES (?, ?)".to_string(),
            "COMMIT".to_string(),
        ]
    );
}

#[test]
fn trashed_posts_are_hidden_until_asked_for() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session(Dialect::Postgres);
    session
        .connection()
        .push_rows(vec![row(&[("id", Value::Int(3)), ("deleted_at", Value::Null)])]);
    let posts = Repository::of::<Post>(&session);

    rt.block_on(async {
        let mut post = unwrap_outcome(posts.find_or_fail(&cx, 3).await);
        assert!(unwrap_outcome(post.destroy(&cx, &session, DestroyOptions::default()).await));
        assert!(post.is_trashed());
        unwrap_outcome(posts.clone().only_trashed().all(&cx).await);
    });

    let queries = session.connection().queries();
    assert!(queries[0].contains("\"posts\".\"deleted_at\" IS NULL"));
    assert_eq!(
        queries[1],
        "SELECT * FROM \"posts\" WHERE \"posts\".\"deleted_at\" IS NOT NULL"
    );
}

#[test]
fn paginate_reports_navigation() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session(Dialect::Postgres);
    session
        .connection()
        .push_rows(vec![row(&[("aggregate", Value::BigInt(25))])])
        .push_rows((11..=20).map(|id| row(&[("id", Value::Int(id))])).collect());

    let page = unwrap_outcome(rt.block_on(
        QueryBuilder::new("users", Dialect::Postgres)
            .order_by("id")
            .paginate(&cx, &session, 2, 10),
    ));

    assert_eq!(
        (page.page, page.per_page, page.total, page.total_pages),
        (2, 10, 25, 3)
    );
    assert!(page.has_prev && page.has_next);
    assert_eq!(page.data.len(), 10);
}
