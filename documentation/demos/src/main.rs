//! quarry walkthrough
//!
//! Builds a small blog schema, prints the SQL a few queries compile to, and
//! runs a preloading query against the in-memory recording driver so the
//! batched statements show up in the log.
//!
//! Run with: RUST_LOG=quarry=debug cargo run

use std::sync::Arc;

use quarry::prelude::*;
use quarry::{Catalog, TracingObserver};

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarry=info".into()),
        )
        .init();

    let catalog = blog_schema()?;

    section("Filters and grouping");
    let adults = catalog
        .query("users")?
        .col("age")
        .gte(18)
        .col("name")
        .ilike("sa%")
        .limit(5);
    show(&adults)?;

    let either = catalog
        .query("users")?
        .col("name")
        .eq("ada")
        .or(|q| q.col("age").gt(60).col("email").nilable_eq(None::<String>));
    show(&either)?;

    section("Joins and association filters");
    let commented = catalog
        .query("users")?
        .left_join("posts")
        .where_assoc("posts.comments", |c| c.col("body").like("%rust%"))
        .desc("name");
    show(&commented)?;

    section("Preloading");
    let driver = RecordingDriver::new();
    driver
        .push_rows(vec![
            vec![Value::Int64(1), "ada".into(), Value::Int32(36), Value::Null],
            vec![Value::Int64(2), "bob".into(), Value::Int32(41), Value::Null],
        ])
        .push_rows(vec![
            vec![Value::Int64(10), Value::Int64(1), "Notes on engines".into()],
            vec![Value::Int64(11), Value::Int64(2), "Tables".into()],
        ])
        .push_rows(vec![vec![
            Value::Int64(100),
            Value::Int64(10),
            "Great read".into(),
        ]]);

    let executor = Executor::new(catalog.clone(), driver.clone(), ExecutorConfig::default())
        .with_observer(TracingObserver);
    let query = catalog
        .query("users")?
        .with_query("posts", |p| p.with("comments"))
        .asc("id");
    let users = executor.all(&query)?;

    for statement in driver.sql() {
        println!("  {}", statement);
    }
    for user in &users {
        let json = serde_json::to_string_pretty(&user.to_json())
            .map_err(|e| Error::Decode(e.to_string()))?;
        println!("{}", json);
    }
    println!(
        "{} statements for {} users, connection released: {}",
        driver.statement_count(),
        users.len(),
        driver.outstanding() == 0
    );

    Ok(())
}

fn blog_schema() -> Result<Arc<Catalog>, Error> {
    Schema::new()
        .with_table(
            TableDef::new("users")
                .with_primary_key("id")
                .column("id", ScalarType::Int64)
                .column("name", ScalarType::String)
                .column("age", ScalarType::Int32)
                .nullable_column("email", ScalarType::String),
        )
        .with_table(
            TableDef::new("posts")
                .with_primary_key("id")
                .column("id", ScalarType::Int64)
                .column("user_id", ScalarType::Int64)
                .column("title", ScalarType::String),
        )
        .with_table(
            TableDef::new("comments")
                .with_primary_key("id")
                .column("id", ScalarType::Int64)
                .column("post_id", ScalarType::Int64)
                .column("body", ScalarType::String),
        )
        .with_association(AssociationDef::has_many("users", "posts", "posts", "user_id"))
        .with_association(AssociationDef::has_many("posts", "comments", "comments", "post_id"))
        .build()
}

fn section(title: &str) {
    println!("\n== {} ==", title);
}

fn show(query: &Query) -> Result<(), Error> {
    let (sql, params) = query.to_sql()?;
    println!("  {}", sql);
    println!("  params: {:?}", params);
    println!("  inlined: {}", query.to_prepared_sql()?);
    Ok(())
}
