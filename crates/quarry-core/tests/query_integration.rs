//! Integration tests for the query engine.

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use quarry_core::catalog::{AssociationDef, Catalog, ScalarType, Schema, TableDef};
use quarry_core::config::ExecutorConfig;
use quarry_core::driver::RecordingDriver;
use quarry_core::observer::QueryObserver;
use quarry_core::query::{Executor, Query};
use quarry_core::{Error, Value};

struct TestContext {
    catalog: Arc<Catalog>,
    driver: RecordingDriver,
    executor: Executor<RecordingDriver>,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    fn with_config(config: ExecutorConfig) -> Self {
        init_tracing();
        let catalog = setup_blog_schema();
        let driver = RecordingDriver::new();
        let executor = Executor::new(catalog.clone(), driver.clone(), config);
        Self {
            catalog,
            driver,
            executor,
        }
    }

    fn query(&self, table: &str) -> Query {
        self.catalog.query(table).unwrap()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup_blog_schema() -> Arc<Catalog> {
    let users = TableDef::new("users")
        .with_primary_key("id")
        .column("id", ScalarType::Int64)
        .column("name", ScalarType::String)
        .column("age", ScalarType::Int32)
        .nullable_column("email", ScalarType::String);

    let posts = TableDef::new("posts")
        .with_primary_key("id")
        .column("id", ScalarType::Int64)
        .column("user_id", ScalarType::Int64)
        .column("title", ScalarType::String)
        .column("views", ScalarType::Int64);

    let comments = TableDef::new("comments")
        .with_primary_key("id")
        .column("id", ScalarType::Int64)
        .column("post_id", ScalarType::Int64)
        .column("body", ScalarType::String)
        .column("approved", ScalarType::Bool);

    let profiles = TableDef::new("profiles")
        .with_primary_key("id")
        .column("id", ScalarType::Int64)
        .column("user_id", ScalarType::Int64)
        .column("bio", ScalarType::String);

    Schema::new()
        .with_table(users)
        .with_table(posts)
        .with_table(comments)
        .with_table(profiles)
        .with_association(AssociationDef::has_many("users", "posts", "posts", "user_id"))
        .with_association(AssociationDef::has_one("users", "profile", "profiles", "user_id"))
        .with_association(AssociationDef::belongs_to("posts", "author", "users", "user_id"))
        .with_association(AssociationDef::has_many("posts", "comments", "comments", "post_id"))
        .with_default_scope("comments", |q| q.col("approved").eq(true))
        .with_scope("posts", "popular", |q| q.col("views").gte(1000i64))
        .build()
        .unwrap()
}

fn user(id: i64, name: &str, age: i32) -> Vec<Value> {
    vec![Value::Int64(id), name.into(), Value::Int32(age), Value::Null]
}

fn post(id: i64, user_id: i64, title: &str) -> Vec<Value> {
    vec![
        Value::Int64(id),
        Value::Int64(user_id),
        title.into(),
        Value::Int64(0),
    ]
}

fn comment(id: i64, post_id: i64, body: &str) -> Vec<Value> {
    vec![
        Value::Int64(id),
        Value::Int64(post_id),
        body.into(),
        Value::Bool(true),
    ]
}

#[test]
fn test_chaining_is_immutable_and_deterministic() {
    let ctx = TestContext::new();
    let base = ctx.query("users").col("age").gt(30);
    let before = base.to_sql().unwrap();

    let _limited = base.limit(10).asc("name").with("posts");
    assert_eq!(base.to_sql().unwrap(), before);
    assert_eq!(base.to_sql().unwrap(), base.to_sql().unwrap());
    assert_eq!(
        before,
        (
            "SELECT id, name, age, email FROM users WHERE age > $1".to_string(),
            vec![Value::Int32(30)]
        )
    );
}

#[test]
fn test_search_scenario() {
    let ctx = TestContext::new();
    let q = ctx
        .query("users")
        .col("age")
        .gte(18)
        .col("name")
        .ilike("sa%")
        .limit(5);
    let (sql, params) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT id, name, age, email FROM users WHERE age >= $1 AND name ILIKE $2 LIMIT $3"
    );
    assert_eq!(
        params,
        vec![Value::Int32(18), Value::from("sa%"), Value::Int64(5)]
    );
    assert_eq!(
        q.to_prepared_sql().unwrap(),
        "SELECT id, name, age, email FROM users WHERE age >= 18 AND name ILIKE 'sa%' LIMIT 5"
    );
}

#[test]
fn test_and_or_grouping() {
    let ctx = TestContext::new();
    let q = ctx
        .query("users")
        .col("name")
        .eq("a")
        .or(|o| o.col("email").eq("b").col("age").eq(3));
    assert_eq!(
        q.to_sql().unwrap().0,
        "SELECT id, name, age, email FROM users WHERE name = $1 OR (email = $2 AND age = $3)"
    );

    let q = q.col("age").lt(90);
    assert_eq!(
        q.to_sql().unwrap().0,
        "SELECT id, name, age, email FROM users \
         WHERE (name = $1 OR (email = $2 AND age = $3)) AND age < $4"
    );
}

#[test]
fn test_negation() {
    let ctx = TestContext::new();
    let users = ctx.query("users");

    assert_eq!(
        users.col("name").not().eq("x").to_sql().unwrap().0,
        "SELECT id, name, age, email FROM users WHERE name <> $1"
    );
    assert_eq!(
        users.col("age").not().in_list([1, 2]).to_sql().unwrap().0,
        "SELECT id, name, age, email FROM users WHERE age NOT IN ($1,$2)"
    );
    assert_eq!(
        users
            .not_where(|w| w.col("age").gt(1).col("name").eq("x"))
            .to_sql()
            .unwrap()
            .0,
        "SELECT id, name, age, email FROM users WHERE NOT (age > $1 AND name = $2)"
    );
}

#[test]
fn test_nilable_predicates() {
    let ctx = TestContext::new();
    let users = ctx.query("users");
    assert_eq!(
        users.col("email").nilable_eq(None::<String>).to_sql().unwrap().0,
        "SELECT id, name, age, email FROM users WHERE email IS NULL"
    );
    assert_eq!(
        users.col("age").nilable_gt(None::<i32>).to_sql().unwrap().0,
        "SELECT id, name, age, email FROM users"
    );
    assert!(matches!(
        users.col("email").eq(None::<String>).to_sql(),
        Err(Error::NullArgument { .. })
    ));
}

#[test]
fn test_left_join_twice_yields_one_join() {
    let ctx = TestContext::new();
    let q = ctx.query("users").left_join("posts").left_join("posts");
    assert_eq!(
        q.to_sql().unwrap().0,
        "SELECT users.id, users.name, users.age, users.email FROM users \
         LEFT JOIN posts ON users.id = posts.user_id"
    );
}

#[test]
fn test_where_assoc_through_nested_path() {
    let ctx = TestContext::new();
    let q = ctx
        .query("users")
        .where_assoc("posts.comments", |c| c.col("body").like("%rust%"));
    let (sql, params) = q.to_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT users.id, users.name, users.age, users.email FROM users \
         INNER JOIN posts ON users.id = posts.user_id \
         INNER JOIN comments ON posts.id = comments.post_id \
         WHERE comments.body LIKE $1"
    );
    assert_eq!(params, vec![Value::from("%rust%")]);
}

#[test]
fn test_reset_where_removes_only_that_column() {
    let ctx = TestContext::new();
    let q = ctx
        .query("users")
        .col("age")
        .gt(1)
        .col("name")
        .eq("x")
        .col("age")
        .lt(9)
        .reset_where("age");
    let (sql, params) = q.to_sql().unwrap();
    assert_eq!(sql, "SELECT id, name, age, email FROM users WHERE name = $1");
    assert_eq!(params, vec![Value::from("x")]);
}

#[test]
fn test_named_scope() {
    let ctx = TestContext::new();
    let q = ctx.query("posts").scope("popular").desc("views");
    assert_eq!(
        q.to_sql().unwrap().0,
        "SELECT id, user_id, title, views FROM posts WHERE views >= $1 ORDER BY views DESC"
    );
    assert!(matches!(
        ctx.query("posts").scope("missing").to_sql(),
        Err(Error::UnknownScope { .. })
    ));
}

#[test]
fn test_aggregate_edge_cases() {
    let ctx = TestContext::new();
    ctx.driver
        .push_rows(vec![vec![Value::Null]])
        .push_rows(vec![vec![Value::Null]])
        .push_rows(vec![vec![Value::Int64(0)]]);
    let q = ctx.query("posts").col("title").eq("nothing");

    assert_eq!(ctx.executor.select_sum(&q, "views").unwrap(), None);
    assert_eq!(
        ctx.executor.select_sum_or_zero(&q, "views").unwrap(),
        Value::Int64(0)
    );
    assert_eq!(ctx.executor.select_count(&q).unwrap(), 0);
    assert_eq!(
        ctx.driver.sql()[2],
        "SELECT COUNT(*) FROM posts WHERE title = $1"
    );
}

#[test]
fn test_preload_batches_one_query_per_level() {
    let ctx = TestContext::new();
    ctx.driver
        .push_rows(vec![user(1, "ada", 36), user(2, "bob", 41), user(3, "cy", 29)])
        .push_rows(vec![post(10, 1, "one"), post(11, 1, "two"), post(12, 3, "three")]);

    let q = ctx.query("users").with("posts");
    let users = ctx.executor.all(&q).unwrap();

    let statements = ctx.driver.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[1].sql,
        "SELECT id, user_id, title, views FROM posts WHERE user_id IN ($1,$2,$3)"
    );
    assert_eq!(
        statements[1].params,
        vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]
    );

    let counts: Vec<usize> = users
        .iter()
        .map(|u| u.many("posts").unwrap().len())
        .collect();
    assert_eq!(counts, vec![2, 0, 1]);
    assert!(users[1].is_loaded("posts"));
}

#[test]
fn test_nested_preloads_run_in_order() {
    let ctx = TestContext::new();
    ctx.driver
        .push_rows(vec![user(1, "ada", 36), user(2, "bob", 41)])
        .push_rows(vec![post(10, 1, "one"), post(11, 2, "two")])
        .push_rows(vec![comment(100, 10, "nice"), comment(101, 10, "agreed")])
        .push_rows(vec![vec![Value::Int64(7), Value::Int64(2), "hi".into()]]);

    let q = ctx
        .query("users")
        .with_query("posts", |p| p.with("comments"))
        .with("profile");
    let users = ctx.executor.all(&q).unwrap();

    assert_eq!(
        ctx.driver.sql(),
        vec![
            "SELECT id, name, age, email FROM users",
            "SELECT id, user_id, title, views FROM posts WHERE user_id IN ($1,$2)",
            "SELECT id, post_id, body, approved FROM comments \
             WHERE approved = $1 AND post_id IN ($2,$3)",
            "SELECT id, user_id, bio FROM profiles WHERE user_id IN ($1,$2)",
        ]
    );

    let ada_posts = users[0].many("posts").unwrap();
    assert_eq!(ada_posts[0].many("comments").unwrap().len(), 2);
    assert!(users[0].one("profile").unwrap().is_none());
    let bob_profile = users[1].one("profile").unwrap().unwrap();
    assert_eq!(bob_profile.try_get::<String>("bio").unwrap(), "hi");
}

#[test]
fn test_none_never_contacts_driver() {
    let ctx = TestContext::new();
    let q = ctx.query("users").with("posts").none();
    assert!(ctx.executor.first_opt(&q).unwrap().is_none());
    assert_eq!(ctx.executor.select_count(&q).unwrap(), 0);
    assert_eq!(ctx.executor.select_sum(&q, "age").unwrap(), None);
    assert_eq!(ctx.driver.statement_count(), 0);
    assert_eq!(ctx.driver.acquired(), 0);
    assert_eq!(
        q.to_sql().unwrap().0,
        "SELECT id, name, age, email FROM users WHERE FALSE"
    );
}

#[test]
fn test_connection_released_when_preload_fails() {
    let ctx = TestContext::new();
    ctx.driver
        .push_rows(vec![user(1, "ada", 36)])
        .push_error("relation \"posts\" does not exist");

    let q = ctx.query("users").with("posts");
    let err = ctx.executor.all(&q).unwrap_err();
    assert!(matches!(err, Error::Driver(_)));
    assert_eq!(ctx.driver.acquired(), 1);
    assert_eq!(ctx.driver.released(), 1);
    assert_eq!(ctx.driver.outstanding(), 0);
}

#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<String>>>);

impl QueryObserver for Collect {
    fn on_execute(&self, sql: &str, params: &[Value]) {
        self.0.lock().push(format!("execute {} [{}]", sql, params.len()));
    }

    fn on_complete(&self, _sql: &str, rows: usize, _elapsed: std::time::Duration) {
        self.0.lock().push(format!("complete {}", rows));
    }
}

#[test]
fn test_observer_sees_every_statement() {
    let collect = Collect::default();
    let catalog = setup_blog_schema();
    let driver = RecordingDriver::new();
    let executor = Executor::new(catalog.clone(), driver.clone(), ExecutorConfig::default())
        .with_observer(collect.clone());

    driver
        .push_rows(vec![user(1, "ada", 36)])
        .push_rows(vec![post(10, 1, "one")]);
    let q = catalog.query("users").unwrap().with("posts");
    executor.all(&q).unwrap();

    assert_eq!(
        *collect.0.lock(),
        vec![
            "execute SELECT id, name, age, email FROM users [0]".to_string(),
            "complete 1".to_string(),
            "execute SELECT id, user_id, title, views FROM posts WHERE user_id IN ($1) [1]"
                .to_string(),
            "complete 1".to_string(),
        ]
    );
}

#[test]
fn test_iteration_is_restartable() {
    let ctx = TestContext::with_config(ExecutorConfig::new().with_batch_size(2));
    ctx.driver
        .push_rows(vec![user(1, "ada", 36)])
        .push_rows(vec![user(1, "ada", 36)])
        .push_rows(vec![user(1, "ada", 36), user(2, "bob", 41)])
        .push_rows(vec![]);

    let q = ctx.query("users");
    let scan = ctx.executor.iter(&q);
    assert_eq!(scan.iter().count(), 1);
    assert_eq!(scan.iter().count(), 1);

    let batches = ctx.executor.each_batch(&q).unwrap();
    let sizes: Vec<usize> = batches.iter().map(|b| b.unwrap().len()).collect();
    assert_eq!(sizes, vec![2]);
    assert_eq!(ctx.driver.statement_count(), 4);
}

#[test]
fn test_record_to_json_includes_associations() {
    let ctx = TestContext::new();
    ctx.driver
        .push_rows(vec![post(10, 1, "one")])
        .push_rows(vec![user(1, "ada", 36)]);
    let post = ctx.executor.first(&ctx.query("posts").with("author")).unwrap();
    let json = post.to_json();
    assert_eq!(json["title"], "one");
    assert_eq!(json["author"]["name"], "ada");
    assert!(json["author"]["email"].is_null());
}

#[test]
fn test_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Query>();
    assert_send_sync::<quarry_proto::Descriptor>();
    assert_send_sync::<Executor<RecordingDriver>>();

    let ctx = TestContext::new();
    let q = ctx
        .query("users")
        .col("age")
        .gte(18)
        .with_query("posts", |p| p.with("comments"))
        .limit(5);
    let expected = q.to_sql().unwrap();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                assert_eq!(q.to_sql().unwrap(), expected);
                assert!(ctx.executor.all(&q).unwrap().is_empty());
                assert!(!ctx.executor.exists(&q).unwrap());
            });
        }
    });

    assert_eq!(ctx.driver.acquired(), 16);
    assert_eq!(ctx.driver.acquired(), ctx.driver.released());
    assert_eq!(ctx.driver.statement_count(), 16);
}
