//! Collection loading, lazy and eager.
//!
//! Both paths go through [`load_children`]: the children of a set of parents
//! are read with one `WHERE fk IN (...)` statement per chunk of parent keys
//! and distributed to the parents' collections. A lazy load is the degenerate
//! case of a single parent; an eager fetch ([`FetchMany`]) passes every parent
//! of a result set at once and then recurses into the loaded children.

use crate::identity_map::hash_values;
use ormlessons_core::error::MappingError;
use ormlessons_core::{Cascade, Error, HasMany, Model, Result, Row, RowImage, Value};
use ormlessons_query::Select;
use std::collections::HashMap;
use std::fmt;

/// Parent keys per `IN (...)` list.
pub const MAX_IN_LIST: usize = 500;

/// What loading needs from a session.
pub trait LoadContext {
    /// Run a SELECT on behalf of the session.
    fn select(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Start tracking `children`, just loaded into a collection of `parent`.
    /// Children of a parent the session does not track stay untracked.
    fn adopt(&self, parent: &RowImage, children: Vec<RowImage>) -> Result<()>;
}

fn parent_key<P: Model>(parent: &P) -> Result<Value> {
    let mut pk = parent.primary_key_value();
    if pk.len() != 1 {
        return Err(Error::Custom(format!(
            "{} has a composite key; collections need a single-column parent key",
            P::ENTITY_NAME
        )));
    }
    Ok(pk.remove(0))
}

/// Load the `rel` collection of every parent whose collection is still
/// unloaded. Returns the number of statements issued (0 when everything was
/// already loaded).
pub fn load_children<P: Model, C: Model>(
    ctx: &dyn LoadContext,
    rel: HasMany<P, C>,
    parents: &[&P],
) -> Result<usize> {
    let pending: Vec<&P> = parents
        .iter()
        .copied()
        .filter(|p| !rel.collection(p).is_loaded())
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let keys = pending
        .iter()
        .map(|p| parent_key(*p))
        .collect::<Result<Vec<_>>>()?;

    let mut grouped: HashMap<u64, Vec<C>> = HashMap::new();
    let mut statements = 0;
    for chunk in keys.chunks(MAX_IN_LIST) {
        let (sql, params) = Select::<C>::new()
            .in_parents(rel.info, chunk.to_vec())
            .build()?;
        let rows = ctx.select(&sql, &params)?;
        statements += 1;

        for row in &rows {
            let fk = row.get_by_name(rel.info.foreign_key).ok_or_else(|| {
                Error::Mapping(MappingError {
                    table: rel.info.related_table,
                    column: rel.info.foreign_key,
                })
            })?;
            grouped
                .entry(hash_values(std::slice::from_ref(fk)))
                .or_default()
                .push(C::from_row(row)?);
        }
    }

    for (parent, key) in pending.iter().zip(&keys) {
        let children = grouped
            .remove(&hash_values(std::slice::from_ref(key)))
            .unwrap_or_default();
        let images: Vec<RowImage> = children.iter().map(RowImage::of).collect();
        if rel.collection(parent).set_loaded(children) && rel.info.cascade != Cascade::None {
            ctx.adopt(&RowImage::of(*parent), images)?;
        }
    }

    tracing::debug!(
        relationship = rel.name(),
        parents = pending.len(),
        statements,
        "loaded collections"
    );
    Ok(statements)
}

/// One level of an eager-fetch directive, erased over the child type.
pub trait FetchPlan<P>: Send + Sync {
    /// Load this level for `parents` and every nested level below it.
    fn run(&self, ctx: &dyn LoadContext, parents: &[&P]) -> Result<usize>;
}

/// Eagerly fetch a collection, then optionally its own collections.
///
/// ```ignore
/// session
///     .query::<Blog>()
///     .fetch(FetchMany::new(Blog::POSTS).then(FetchMany::new(Post::COMMENTS)))
///     .list()?;
/// ```
pub struct FetchMany<P, C> {
    rel: HasMany<P, C>,
    then: Vec<Box<dyn FetchPlan<C>>>,
}

impl<P: Model, C: Model> FetchMany<P, C> {
    pub fn new(rel: HasMany<P, C>) -> Self {
        Self {
            rel,
            then: Vec::new(),
        }
    }

    /// Also fetch a collection of the children.
    pub fn then<G: Model>(mut self, next: FetchMany<C, G>) -> Self {
        self.then.push(Box::new(next));
        self
    }
}

impl<P: Model, C: Model> FetchPlan<P> for FetchMany<P, C> {
    fn run(&self, ctx: &dyn LoadContext, parents: &[&P]) -> Result<usize> {
        let mut statements = load_children(ctx, self.rel, parents)?;
        if self.then.is_empty() {
            return Ok(statements);
        }

        let children: Vec<&C> = parents
            .iter()
            .flat_map(|p| self.rel.collection(*p).iter())
            .collect();
        for next in &self.then {
            statements += next.run(ctx, &children)?;
        }
        Ok(statements)
    }
}

impl<P, C> fmt::Debug for FetchMany<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchMany")
            .field("relationship", &self.rel.name())
            .field("then", &self.then.len())
            .finish()
    }
}
