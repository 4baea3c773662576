//! Shared bootstrap for the lesson fixtures.
#![allow(dead_code)]

use ormlessons::prelude::*;
use ormlessons_blog::{Blog, BlogMother};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Route `tracing` output to the test harness. `RUST_LOG` overrides the
/// default `warn` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// SQLite connection that remembers every statement sent through it.
pub struct CountingConnection {
    inner: SqliteConnection,
    log: Mutex<Vec<String>>,
}

impl CountingConnection {
    pub fn open() -> Self {
        Self {
            inner: SqliteConnection::open_memory().expect("open sqlite memory db"),
            log: Mutex::new(Vec::new()),
        }
    }

    fn note(&self, sql: &str) {
        self.log.lock().expect("statement log").push(sql.to_string());
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().expect("statement log").clone()
    }

    pub fn selects(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.trim_start().starts_with("SELECT"))
            .collect()
    }

    /// SELECT texts issued more than once. Parameters are not compared.
    pub fn duplicate_selects(&self) -> Vec<String> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for sql in self.selects() {
            *seen.entry(sql).or_default() += 1;
        }
        let mut dups: Vec<String> = seen
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(sql, _)| sql)
            .collect();
        dups.sort();
        dups
    }

    pub fn reset(&self) {
        self.log.lock().expect("statement log").clear();
    }
}

impl Connection for CountingConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.note(sql);
        self.inner.query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.note(sql);
        self.inner.execute(sql, params)
    }

    fn execute_script(&self, sql: &str) -> Result<()> {
        self.note(sql);
        self.inner.execute_script(sql)
    }

    fn begin(&self) -> Result<()> {
        self.inner.begin()
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }

    fn transaction_depth(&self) -> usize {
        self.inner.transaction_depth()
    }
}

pub type Factory = SessionFactory<Arc<CountingConnection>>;

/// Fresh in-memory database with the lesson schema, plus a handle on its
/// statement log.
pub fn factory(config: SessionConfig) -> (Factory, Arc<CountingConnection>) {
    init_tracing();
    let conn = Arc::new(CountingConnection::open());
    let factory =
        ormlessons_blog::session_factory(Arc::clone(&conn), config).expect("create schema");
    conn.reset();
    (factory, conn)
}

/// Commit one blog built by the mother, then clear alerts and the statement
/// log so the lesson starts from a clean slate.
pub fn seed_blog(
    factory: &Factory,
    conn: &CountingConnection,
    name: &str,
    posts: usize,
    comments_per_post: usize,
) {
    seed(factory, conn, |uow| {
        let blog = BlogMother::create_blog_with_posts_and_comments(name, posts, comments_per_post)
            .expect("build blog");
        uow.save(blog).expect("save blog");
    });
}

/// Commit `count` blogs of the default shape.
pub fn seed_blogs(factory: &Factory, conn: &CountingConnection, count: usize) {
    seed(factory, conn, |uow| {
        for blog in BlogMother::create_blogs_with_posts_and_comments(count).expect("build blogs") {
            uow.save(blog).expect("save blog");
        }
    });
}

pub fn seed(
    factory: &Factory,
    conn: &CountingConnection,
    fill: impl FnOnce(&UnitOfWork<Arc<CountingConnection>>),
) {
    let uow = factory.start_unit_of_work().expect("start unit of work");
    fill(&uow);
    uow.commit().expect("commit seed data");
    factory.profiler().reset();
    conn.reset();
}

pub fn count_rows(factory: &Factory, table: &str) -> i64 {
    factory
        .connection()
        .query_one(&format!("SELECT COUNT(*) AS n FROM \"{table}\""), &[])
        .expect("count rows")
        .expect("count row")
        .get_named("n")
        .expect("count column")
}

pub fn blog_named(session: &Session<Arc<CountingConnection>>, name: &str) -> ModelRef<Blog> {
    session
        .query::<Blog>()
        .filter(Expr::prop("name").eq(name))
        .first()
        .expect("query blog")
        .expect("blog exists")
}
