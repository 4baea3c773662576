//! Session and unit of work for ormlessons.
//!
//! `ormlessons-session` is the **unit-of-work layer**. It coordinates object
//! identity, collection loading and transactional persistence over a
//! synchronous [`Connection`], and it watches how the database is used so the
//! lessons can point at the anti-patterns they provoke.
//!
//! # Role In The Architecture
//!
//! - **Identity map**: one in-memory instance per primary key and session,
//!   plus a natural-id index answering lookups without SQL.
//! - **Loading**: lazy collection loads (`Session::load`) and eager fetch
//!   directives (`FetchMany`) executed as one `IN (...)` query per level.
//! - **Flush**: snapshot-based dirty checking, batched multi-row INSERTs,
//!   parents-first inserts and children-first deletes.
//! - **Identifiers**: hi/lo blocks, so identities exist before any INSERT.
//! - **Profiling**: every statement is recorded per session, and alerts are
//!   raised for N+1 selects, unbounded result sets, large numbers of writes,
//!   several sessions in one request, and implicit rollbacks.
//!
//! # Design
//!
//! - **Explicit handles**: sessions and units of work are passed down call
//!   chains; there is no ambient "current session".
//! - **Shared connection**: all sessions of a factory use one connection, and
//!   nested units of work become savepoints.
//! - **Type erasure**: the identity map stores `Arc<RwLock<M>>` behind a trait
//!   object so heterogeneous aggregates can be flushed together.
//!
//! # Example
//!
//! ```ignore
//! let factory = SessionFactory::new(SqliteConnection::open_memory()?, SessionConfig::default());
//!
//! let uow = factory.start_unit_of_work()?;
//! let blog = uow.save(Blog::new("pitfalls"))?;
//! uow.commit()?;
//!
//! let uow = factory.start_unit_of_work()?;
//! let blogs = uow
//!     .query::<Blog>()
//!     .filter(Expr::prop("name").eq("pitfalls"))
//!     .fetch(FetchMany::new(Blog::POSTS).then(FetchMany::new(Post::COMMENTS)))
//!     .list()?;
//! uow.commit()?;
//! ```

pub mod eager;
pub mod flush;
pub mod hilo;
pub mod identity_map;
pub mod n1_detection;
pub mod profiler;
pub mod query_object;
pub mod unit_of_work;

pub use eager::{FetchMany, FetchPlan, LoadContext};
pub use flush::{FlushOrderer, FlushResult};
pub use hilo::{HiLoGenerator, HighWaterMarks};
pub use identity_map::{IdentityMap, ModelReadGuard, ModelRef, ModelWriteGuard};
pub use n1_detection::{CallSite, N1DetectionScope, N1QueryTracker, N1Stats};
pub use profiler::{Alert, AlertKind, Profiler, RequestScope};
pub use query_object::QueryObject;
pub use unit_of_work::UnitOfWork;

use flush::SnapshotStore;
use ormlessons_core::error::ConfigError;
use ormlessons_core::{
    Connection, Error, HasMany, IdAllocator, Model, ObjectGraph, Result, Row, RowImage, Value,
};
use ormlessons_query::{Expr, OrderBy, Select, Specification};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for session behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Rows per INSERT statement at flush; 0 writes one statement per row.
    pub batch_size: usize,
    /// Lazy loads of one relationship that raise a SELECT N+1 alert.
    pub n1_threshold: usize,
    /// Raise an alert for queries without a row limit.
    pub alert_unbounded: bool,
    /// Write statements in one flush that raise a large-number-of-writes
    /// alert; 0 disables the alert.
    pub large_write_threshold: usize,
    /// Identifiers reserved per hi/lo round trip.
    pub hilo_block_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_size: 0,
            n1_threshold: 3,
            alert_unbounded: true,
            large_write_threshold: 30,
            hilo_block_size: 100,
        }
    }
}

impl SessionConfig {
    pub const BATCH_SIZE_VAR: &'static str = "ORMLESSONS_BATCH_SIZE";
    pub const N1_THRESHOLD_VAR: &'static str = "ORMLESSONS_N1_THRESHOLD";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `ORMLESSONS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup` (an environment, a map in tests).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(Self::BATCH_SIZE_VAR) {
            self.batch_size = parse_var(Self::BATCH_SIZE_VAR, &raw)?;
        }
        if let Some(raw) = lookup(Self::N1_THRESHOLD_VAR) {
            self.n1_threshold = parse_var(Self::N1_THRESHOLD_VAR, &raw)?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows;
        self
    }

    #[must_use]
    pub fn n1_threshold(mut self, loads: usize) -> Self {
        self.n1_threshold = loads;
        self
    }

    #[must_use]
    pub fn alert_unbounded(mut self, enabled: bool) -> Self {
        self.alert_unbounded = enabled;
        self
    }

    #[must_use]
    pub fn large_write_threshold(mut self, statements: usize) -> Self {
        self.large_write_threshold = statements;
        self
    }

    #[must_use]
    pub fn hilo_block_size(mut self, ids: u32) -> Self {
        self.hilo_block_size = ids;
        self
    }
}

fn parse_var(variable: &'static str, raw: &str) -> Result<usize> {
    raw.trim().parse().map_err(|e| {
        Error::Config(ConfigError {
            variable,
            message: format!("must be a non-negative integer, got '{raw}'"),
            source: Some(Box::new(e)),
        })
    })
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| Error::poisoned(what))
}

// ============================================================================
// Session Factory
// ============================================================================

/// Opens sessions over one shared connection.
pub struct SessionFactory<C: Connection> {
    connection: Arc<C>,
    config: SessionConfig,
    profiler: Arc<Profiler>,
    high_water: Arc<HighWaterMarks>,
}

impl<C: Connection> SessionFactory<C> {
    pub fn new(connection: C, config: SessionConfig) -> Self {
        Self {
            connection: Arc::new(connection),
            config,
            profiler: Arc::new(Profiler::new()),
            high_water: Arc::new(HighWaterMarks::new()),
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Open a session outside any transaction (statements autocommit).
    pub fn open_session(&self) -> Session<C> {
        let id = self.profiler.session_opened();
        tracing::debug!(session = id, "session opened");
        Session::new(
            id,
            Arc::clone(&self.connection),
            self.config.clone(),
            Arc::clone(&self.profiler),
            Arc::clone(&self.high_water),
        )
    }

    /// Open a session inside a new transaction.
    pub fn start_unit_of_work(&self) -> Result<UnitOfWork<C>> {
        UnitOfWork::start(self.open_session())
    }

    /// Mark the start of one logical request.
    pub fn request(&self) -> RequestScope {
        RequestScope::new(Arc::clone(&self.profiler))
    }
}

impl<C: Connection> Clone for SessionFactory<C> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            config: self.config.clone(),
            profiler: Arc::clone(&self.profiler),
            high_water: Arc::clone(&self.high_water),
        }
    }
}

impl<C: Connection> fmt::Debug for SessionFactory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session
// ============================================================================

/// A conversation with the database: identity map, snapshots and the
/// statements issued so far.
///
/// All operations take `&self`, so a session can be lent to collaborators
/// (query objects, services) while its caller keeps using it.
pub struct Session<C: Connection> {
    id: u64,
    connection: Arc<C>,
    config: SessionConfig,
    profiler: Arc<Profiler>,
    identity_map: Mutex<IdentityMap>,
    snapshots: Mutex<SnapshotStore>,
    hilo: Mutex<HiLoGenerator>,
    statements: Mutex<Vec<String>>,
    n1: Arc<Mutex<N1QueryTracker>>,
}

impl<C: Connection> Session<C> {
    fn new(
        id: u64,
        connection: Arc<C>,
        config: SessionConfig,
        profiler: Arc<Profiler>,
        high_water: Arc<HighWaterMarks>,
    ) -> Self {
        let hilo = HiLoGenerator::shared(config.hilo_block_size, high_water);
        let n1 = N1QueryTracker::new().with_threshold(config.n1_threshold);
        Self {
            id,
            connection,
            config,
            profiler,
            identity_map: Mutex::new(IdentityMap::new()),
            snapshots: Mutex::new(SnapshotStore::default()),
            hilo: Mutex::new(hilo),
            statements: Mutex::new(Vec::new()),
            n1: Arc::new(Mutex::new(n1)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    fn record(&self, sql: &str) -> Result<()> {
        tracing::debug!(target: "ormlessons::sql", session = self.id, sql);
        lock(&self.statements, "statement log")?.push(sql.to_string());
        self.profiler.statement_issued();
        Ok(())
    }

    fn select_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql)?;
        self.connection.query(sql, params)
    }

    // ------------------------------------------------------------------------
    // Persisting
    // ------------------------------------------------------------------------

    /// Attach an aggregate to the session.
    ///
    /// Identifiers are assigned to the root and every owned child right away;
    /// the rows are written at the next flush. When the root is not new, rows
    /// that already had an identity are treated as persisted and fully
    /// rewritten by that flush.
    #[tracing::instrument(level = "debug", skip(self, model), fields(session = self.id, entity = M::ENTITY_NAME))]
    pub fn save<M: ObjectGraph>(&self, mut model: M) -> Result<ModelRef<M>> {
        let persisted: Vec<RowImage> = if model.is_new() {
            Vec::new()
        } else {
            model
                .row_images()
                .into_iter()
                .filter(|image| image.pk.iter().all(|v| !v.is_null()))
                .collect()
        };

        {
            let mut hilo = lock(&self.hilo, "hi/lo generator")?;
            let mut ids = SessionIds {
                generator: &mut hilo,
                conn: &Recorded(self),
            };
            model.assign_ids(&mut ids)?;
        }

        let pk = model.primary_key_value();
        let model_ref = {
            let mut map = lock(&self.identity_map, "identity map")?;
            if map.contains::<M>(&pk) {
                return Err(Error::Custom(format!(
                    "another {} instance with the same identity is already attached to session {}",
                    M::ENTITY_NAME,
                    self.id
                )));
            }
            map.insert(model)
        };
        if !persisted.is_empty() {
            lock(&self.snapshots, "snapshots")?.track_stale(persisted)?;
        }
        Ok(model_ref)
    }

    /// Schedule an aggregate for deletion at the next flush.
    ///
    /// Returns `false` when the instance was not resident in this session.
    pub fn delete<M: ObjectGraph>(&self, model: &ModelRef<M>) -> Result<bool> {
        let pk = model
            .read()
            .map_err(|_| Error::poisoned(M::ENTITY_NAME))?
            .primary_key_value();
        let mut map = lock(&self.identity_map, "identity map")?;
        if !map.contains_ref(model, &pk) {
            return Ok(false);
        }
        Ok(map.remove::<M>(&pk))
    }

    /// Write pending changes of every resident aggregate.
    #[tracing::instrument(level = "debug", skip(self), fields(session = self.id))]
    pub fn flush(&self) -> Result<FlushResult> {
        let aggregates = lock(&self.identity_map, "identity map")?.aggregates();
        {
            let mut hilo = lock(&self.hilo, "hi/lo generator")?;
            let mut ids = SessionIds {
                generator: &mut hilo,
                conn: &Recorded(self),
            };
            for aggregate in &aggregates {
                aggregate.assign_new_ids(&mut ids)?;
            }
        }
        let mut images = Vec::new();
        for aggregate in &aggregates {
            images.extend(aggregate.row_images()?);
        }

        let plan = lock(&self.snapshots, "snapshots")?.plan(images)?;
        if plan.is_empty() {
            return Ok(FlushResult::default());
        }
        let result = plan.execute(&Recorded(self), self.config.batch_size)?;
        lock(&self.snapshots, "snapshots")?.apply(plan);

        tracing::info!(
            session = self.id,
            inserted = result.inserted,
            updated = result.updated,
            deleted = result.deleted,
            statements = result.statements,
            "flush complete"
        );
        let threshold = self.config.large_write_threshold;
        if threshold > 0 && result.statements >= threshold {
            self.profiler.raise(Alert::LargeNumberOfWrites {
                session: self.id,
                statements: result.statements,
                threshold,
            });
        }
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    /// Get an aggregate root by single-column primary key.
    pub fn get<M: ObjectGraph>(&self, pk: impl Into<Value>) -> Result<Option<ModelRef<M>>> {
        self.get_by_key::<M>(&[pk.into()])
    }

    /// Get an aggregate root by (possibly composite) primary key: identity
    /// map first, then one SELECT.
    pub fn get_by_key<M: ObjectGraph>(&self, key: &[Value]) -> Result<Option<ModelRef<M>>> {
        if let Some(resident) = lock(&self.identity_map, "identity map")?.get::<M>(key) {
            return Ok(Some(resident));
        }

        let mut select = Select::<M>::new().limit(1);
        for (column, value) in M::PRIMARY_KEY.iter().zip(key) {
            let field = M::fields()
                .iter()
                .find(|f| f.column_name == *column)
                .ok_or_else(|| Error::unresolved_property(M::ENTITY_NAME, *column))?;
            select = select.filter(Expr::prop(field.name).eq(value.clone()));
        }
        Ok(self.materialize(&select)?.into_iter().next())
    }

    /// Start a query over `M`.
    pub fn query<M: ObjectGraph>(&self) -> SessionQuery<'_, C, M> {
        SessionQuery {
            session: self,
            select: Select::new(),
            fetches: Vec::new(),
        }
    }

    /// Resident instance with the given natural id. Never issues SQL.
    pub fn find_resident_by_natural_id<M: ObjectGraph>(
        &self,
        natural_id: impl Into<Value>,
    ) -> Result<Option<ModelRef<M>>> {
        Ok(lock(&self.identity_map, "identity map")?.get_by_natural_id::<M>(&natural_id.into()))
    }

    /// Lazily load one collection of `parent` (one SELECT unless it is
    /// already loaded). Each load counts towards SELECT N+1 detection.
    #[track_caller]
    pub fn load<'p, P: Model, Ch: Model>(
        &self,
        parent: &'p P,
        rel: HasMany<P, Ch>,
    ) -> Result<&'p [Ch]> {
        let collection = rel.collection(parent);
        if let Some(items) = collection.get() {
            return Ok(items);
        }

        let reached = lock(&self.n1, "N+1 tracker")?.record_load(P::ENTITY_NAME, rel.name());
        eager::load_children(self, rel, &[parent])?;
        if let Some(loads) = reached {
            self.profiler.raise(Alert::SelectNPlusOne {
                session: self.id,
                parent: P::ENTITY_NAME,
                relationship: rel.name(),
                loads,
            });
        }
        Ok(collection.get().unwrap_or(&[]))
    }

    /// Turn rows into resident instances. A row whose identity is already
    /// resident yields the resident instance, unchanged.
    fn materialize<M: ObjectGraph>(&self, select: &Select<M>) -> Result<Vec<ModelRef<M>>> {
        let (sql, params) = select.build()?;
        let rows = self.select_rows(&sql, &params)?;

        let mut out = Vec::with_capacity(rows.len());
        let mut fresh = Vec::new();
        {
            let mut map = lock(&self.identity_map, "identity map")?;
            for row in &rows {
                let model = M::from_row(row)?;
                let pk = model.primary_key_value();
                if let Some(resident) = map.get::<M>(&pk) {
                    out.push(resident);
                    continue;
                }
                fresh.extend(model.row_images());
                out.push(map.insert(model));
            }
        }
        if !fresh.is_empty() {
            lock(&self.snapshots, "snapshots")?.track(fresh)?;
        }
        Ok(out)
    }

    fn run_fetches<M: ObjectGraph>(
        &self,
        refs: &[ModelRef<M>],
        fetches: &[Box<dyn FetchPlan<M>>],
    ) -> Result<()> {
        if fetches.is_empty() || refs.is_empty() {
            return Ok(());
        }
        let guards = refs
            .iter()
            .map(|r| r.read().map_err(|_| Error::poisoned(M::ENTITY_NAME)))
            .collect::<Result<Vec<_>>>()?;
        let parents: Vec<&M> = guards.iter().map(|g| &**g).collect();
        for plan in fetches {
            plan.run(self, &parents)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Whether this exact instance is resident in the session.
    pub fn contains<M: ObjectGraph>(&self, model: &ModelRef<M>) -> Result<bool> {
        let pk = model
            .read()
            .map_err(|_| Error::poisoned(M::ENTITY_NAME))?
            .primary_key_value();
        Ok(lock(&self.identity_map, "identity map")?.contains_ref(model, &pk))
    }

    /// Number of resident aggregate roots.
    pub fn resident_count(&self) -> Result<usize> {
        Ok(lock(&self.identity_map, "identity map")?.len())
    }

    /// Evict everything. Pending changes are discarded, not written.
    pub fn clear(&self) -> Result<()> {
        lock(&self.identity_map, "identity map")?.clear();
        lock(&self.snapshots, "snapshots")?.clear();
        Ok(())
    }

    /// SQL of every statement this session issued, in order.
    pub fn statements(&self) -> Result<Vec<String>> {
        Ok(lock(&self.statements, "statement log")?.clone())
    }

    pub fn statement_count(&self) -> Result<usize> {
        Ok(lock(&self.statements, "statement log")?.len())
    }

    pub fn n1_stats(&self) -> Result<N1Stats> {
        Ok(lock(&self.n1, "N+1 tracker")?.stats())
    }

    /// Guard reporting the lazy loads performed while it lives.
    pub fn n1_scope(&self) -> N1DetectionScope {
        N1DetectionScope::new(Arc::clone(&self.n1))
    }
}

impl<C: Connection> LoadContext for Session<C> {
    fn select(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.select_rows(sql, params)
    }

    fn adopt(&self, parent: &RowImage, children: Vec<RowImage>) -> Result<()> {
        let mut snapshots = lock(&self.snapshots, "snapshots")?;
        if snapshots.contains(parent)? {
            snapshots.track(children)?;
        }
        Ok(())
    }
}

impl<C: Connection> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The session's connection, with every statement recorded.
struct Recorded<'s, C: Connection>(&'s Session<C>);

impl<C: Connection> Connection for Recorded<'_, C> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.0.select_rows(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.0.record(sql)?;
        self.0.connection.execute(sql, params)
    }

    fn execute_script(&self, sql: &str) -> Result<()> {
        self.0.record(sql)?;
        self.0.connection.execute_script(sql)
    }

    fn begin(&self) -> Result<()> {
        self.0.connection.begin()
    }

    fn commit(&self) -> Result<()> {
        self.0.connection.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.0.connection.rollback()
    }

    fn transaction_depth(&self) -> usize {
        self.0.connection.transaction_depth()
    }
}

struct SessionIds<'a> {
    generator: &'a mut HiLoGenerator,
    conn: &'a dyn Connection,
}

impl IdAllocator for SessionIds<'_> {
    fn next_id(&mut self, table: &'static str) -> Result<i64> {
        self.generator.next_id(self.conn, table)
    }
}

// ============================================================================
// Session Query
// ============================================================================

/// A query under construction, bound to a session.
pub struct SessionQuery<'s, C: Connection, M: ObjectGraph> {
    session: &'s Session<C>,
    select: Select<M>,
    fetches: Vec<Box<dyn FetchPlan<M>>>,
}

impl<'s, C: Connection, M: ObjectGraph> SessionQuery<'s, C, M> {
    /// Add a filter (ANDed with the previous ones).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.select = self.select.filter(expr);
        self
    }

    /// Filter by a specification's relational form.
    pub fn matching<S: Specification<M> + ?Sized>(self, spec: &S) -> Self {
        self.filter(spec.to_expr())
    }

    /// Eagerly fetch a collection of the results.
    pub fn fetch<Ch: Model>(mut self, plan: FetchMany<M, Ch>) -> Self {
        self.fetches.push(Box::new(plan));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.select = self.select.order_by(order);
        self
    }

    /// At most `n` rows.
    pub fn take(mut self, n: u64) -> Self {
        self.select = self.select.limit(n);
        self
    }

    /// Skip the first `n` rows.
    pub fn skip(mut self, n: u64) -> Self {
        self.select = self.select.offset(n);
        self
    }

    /// Run the query and its fetches.
    pub fn list(self) -> Result<Vec<ModelRef<M>>> {
        let refs = self.session.materialize(&self.select)?;
        if !self.select.is_bounded() && self.session.config.alert_unbounded {
            self.session.profiler.raise(Alert::UnboundedResultSet {
                session: self.session.id,
                entity: M::ENTITY_NAME,
                rows: refs.len(),
            });
        }
        self.session.run_fetches(&refs, &self.fetches)?;
        Ok(refs)
    }

    /// First result, if any.
    pub fn first(self) -> Result<Option<ModelRef<M>>> {
        Ok(self.take(1).list()?.into_iter().next())
    }

    /// Number of matching rows (limit and offset ignored).
    pub fn count(self) -> Result<i64> {
        let (sql, params) = self.select.build_count()?;
        let row = self.session.select_rows(&sql, &params)?.into_iter().next();
        row.map_or(Ok(0), |r| r.get_named::<i64>("count"))
    }
}

impl<C: Connection, M: ObjectGraph> fmt::Debug for SessionQuery<'_, C, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionQuery")
            .field("session", &self.session.id)
            .field("select", &self.select)
            .field("fetches", &self.fetches.len())
            .finish()
    }
}
