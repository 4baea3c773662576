//! Identity map: one in-memory instance per persisted identity.
//!
//! Within a session each row corresponds to exactly one object. Getting or
//! querying the same identity twice hands back the same `Arc<RwLock<M>>`, so a
//! change made through one handle is visible through every other handle, and
//! a resident instance wins over whatever a later query returns for its row.
//!
//! Entries are kept in registration order. A flush walks them in that order,
//! which is what makes "parents before children" hold for aggregates that
//! reference each other (a `FooBar` saved after its `Foo` and `Bar`).
//!
//! # Example
//!
//! ```ignore
//! let mut map = IdentityMap::new();
//! let first = map.insert(blog);
//! let second = map.get::<Blog>(&pk).unwrap();
//! assert!(Arc::ptr_eq(&first, &second));
//! ```

use ormlessons_core::{Error, IdAllocator, ObjectGraph, Result, RowImage, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle on a resident model instance.
pub type ModelRef<M> = Arc<RwLock<M>>;

/// Read guard on a resident model.
pub type ModelReadGuard<'a, M> = RwLockReadGuard<'a, M>;

/// Write guard on a resident model.
pub type ModelWriteGuard<'a, M> = RwLockWriteGuard<'a, M>;

/// Hash a slice of values for use as an identity.
pub(crate) fn hash_values(values: &[Value]) -> u64 {
    use std::collections::hash_map::DefaultHasher;

    let mut hasher = DefaultHasher::new();
    for v in values {
        hash_value(v, &mut hasher);
    }
    hasher.finish()
}

fn hash_value(v: &Value, hasher: &mut impl Hasher) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Integer(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Real(f) => {
            3u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Text(s) => {
            4u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Blob(b) => {
            5u8.hash(hasher);
            b.hash(hasher);
        }
    }
}

/// Type-erased view of a resident aggregate.
pub(crate) trait Tracked: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Current row images of the aggregate. Fails instead of blocking when
    /// the instance is write-locked by the caller.
    fn row_images(&self) -> Result<Vec<RowImage>>;

    /// Give identifiers to rows added to the aggregate since it was attached.
    /// Takes the write lock only when some row still lacks a key.
    fn assign_new_ids(&self, ids: &mut dyn IdAllocator) -> Result<()>;

    fn entity_name(&self) -> &'static str;
}

impl<M: ObjectGraph> Tracked for ModelRef<M> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn row_images(&self) -> Result<Vec<RowImage>> {
        let guard = self.try_read().map_err(|_| {
            Error::Custom(format!(
                "{} is locked for writing; release the guard before flushing",
                M::ENTITY_NAME
            ))
        })?;
        Ok(guard.row_images())
    }

    fn assign_new_ids(&self, ids: &mut dyn IdAllocator) -> Result<()> {
        let pending = Tracked::row_images(self)?
            .iter()
            .any(|image| image.pk.iter().any(Value::is_null));
        if !pending {
            return Ok(());
        }
        let mut guard = self.try_write().map_err(|_| {
            Error::Custom(format!(
                "{} is locked; release every guard before flushing",
                M::ENTITY_NAME
            ))
        })?;
        guard.assign_ids(ids)
    }

    fn entity_name(&self) -> &'static str {
        M::ENTITY_NAME
    }
}

type EntryKey = (TypeId, u64);

struct IdentityEntry {
    /// Actually an `Arc<RwLock<M>>` for the entry's model type.
    object: Arc<dyn Tracked>,
    natural_id: Option<u64>,
}

/// Identity map keyed by (model type, primary key hash).
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<EntryKey, IdentityEntry>,
    /// Registration order
    order: Vec<EntryKey>,
    /// (model type, natural id hash) -> primary key hash
    natural_ids: HashMap<EntryKey, u64>,
}

impl IdentityMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a model, or return the instance already resident for its
    /// primary key (the new value is dropped in that case).
    pub fn insert<M: ObjectGraph>(&mut self, model: M) -> ModelRef<M> {
        let key = (TypeId::of::<M>(), hash_values(&model.primary_key_value()));
        if let Some(existing) = self.lookup::<M>(&key) {
            return existing;
        }

        let natural_id = model.natural_id().map(|v| hash_values(&[v]));
        let model_ref: ModelRef<M> = Arc::new(RwLock::new(model));
        if let Some(natural) = natural_id {
            self.natural_ids.insert((key.0, natural), key.1);
        }
        self.entries.insert(
            key,
            IdentityEntry {
                object: Arc::new(Arc::clone(&model_ref)),
                natural_id,
            },
        );
        self.order.push(key);
        model_ref
    }

    /// Get the resident instance for a primary key.
    pub fn get<M: ObjectGraph>(&self, pk_values: &[Value]) -> Option<ModelRef<M>> {
        self.lookup::<M>(&(TypeId::of::<M>(), hash_values(pk_values)))
    }

    /// Get the resident instance whose natural id equals `natural_id`.
    pub fn get_by_natural_id<M: ObjectGraph>(&self, natural_id: &Value) -> Option<ModelRef<M>> {
        let type_id = TypeId::of::<M>();
        let pk_hash = self
            .natural_ids
            .get(&(type_id, hash_values(std::slice::from_ref(natural_id))))?;
        self.lookup::<M>(&(type_id, *pk_hash))
    }

    fn lookup<M: ObjectGraph>(&self, key: &EntryKey) -> Option<ModelRef<M>> {
        let entry = self.entries.get(key)?;
        entry
            .object
            .as_any()
            .downcast_ref::<ModelRef<M>>()
            .map(Arc::clone)
    }

    pub fn contains<M: ObjectGraph>(&self, pk_values: &[Value]) -> bool {
        self.entries
            .contains_key(&(TypeId::of::<M>(), hash_values(pk_values)))
    }

    /// Whether this exact handle is the resident instance for its identity.
    pub fn contains_ref<M: ObjectGraph>(&self, model_ref: &ModelRef<M>, pk_values: &[Value]) -> bool {
        self.get::<M>(pk_values)
            .is_some_and(|resident| Arc::ptr_eq(&resident, model_ref))
    }

    /// Evict an identity. Returns `true` if it was resident.
    pub fn remove<M: ObjectGraph>(&mut self, pk_values: &[Value]) -> bool {
        let key = (TypeId::of::<M>(), hash_values(pk_values));
        let Some(entry) = self.entries.remove(&key) else {
            return false;
        };
        if let Some(natural) = entry.natural_id {
            self.natural_ids.remove(&(key.0, natural));
        }
        self.order.retain(|k| *k != key);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.natural_ids.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resident aggregates in registration order.
    pub(crate) fn aggregates(&self) -> Vec<Arc<dyn Tracked>> {
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k))
            .map(|e| Arc::clone(&e.object))
            .collect()
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entities: Vec<&'static str> = self
            .order
            .iter()
            .filter_map(|k| self.entries.get(k))
            .map(|e| e.object.entity_name())
            .collect();
        f.debug_struct("IdentityMap")
            .field("entries", &entities)
            .field("natural_ids", &self.natural_ids.len())
            .finish()
    }
}
