//! Relationship metadata and owned collections.
//!
//! Every relationship in the lesson domain is an owned one-to-many collection
//! (a blog owns its posts, a post owns its comments). The parent declares it as
//! static [`RelationshipInfo`] on its `Model` impl and holds the children in a
//! [`Collection`], which starts either loaded (a transient parent built in
//! memory) or unloaded (a parent materialized from a row, waiting for a lazy
//! load or an eager fetch).

use crate::field::FieldInfo;
use std::fmt;
use std::sync::OnceLock;

/// What happens to children when the parent is saved or deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cascade {
    /// Children are persisted separately.
    #[default]
    None,
    /// Saves and deletes flow from parent to children.
    All,
    /// As `All`, and children removed from the collection are deleted.
    AllDeleteOrphan,
}

impl Cascade {
    pub const fn deletes_children(self) -> bool {
        matches!(self, Cascade::All | Cascade::AllDeleteOrphan)
    }

    pub const fn deletes_orphans(self) -> bool {
        matches!(self, Cascade::AllDeleteOrphan)
    }
}

/// Static metadata describing a parent's owned collection.
#[derive(Clone, Copy)]
pub struct RelationshipInfo {
    /// Property name of the collection on the parent (`"posts"`).
    pub name: &'static str,
    /// Table holding the children.
    pub related_table: &'static str,
    /// Entity name of the children, for error messages.
    pub related_entity: &'static str,
    /// Column on the child table referencing the parent's primary key.
    pub foreign_key: &'static str,
    pub cascade: Cascade,
    /// Ordering applied when the collection is loaded.
    pub order_by: &'static str,
    /// The child model's mapped fields.
    pub related_fields: fn() -> &'static [FieldInfo],
    /// The child model's own relationships.
    pub related_relationships: fn() -> &'static [RelationshipInfo],
}

impl RelationshipInfo {
    fn no_fields() -> &'static [FieldInfo] {
        &[]
    }

    fn no_relationships() -> &'static [RelationshipInfo] {
        &[]
    }

    /// Declare a one-to-many owned collection.
    #[must_use]
    pub const fn one_to_many(
        name: &'static str,
        related_table: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            related_table,
            related_entity: related_table,
            foreign_key,
            cascade: Cascade::None,
            order_by: "id",
            related_fields: Self::no_fields,
            related_relationships: Self::no_relationships,
        }
    }

    #[must_use]
    pub const fn cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = cascade;
        self
    }

    #[must_use]
    pub const fn order_by(mut self, column: &'static str) -> Self {
        self.order_by = column;
        self
    }

    /// Provide the child model's entity name, `fields()` and
    /// `relationships()` so query translation can resolve predicates across
    /// the collection.
    #[must_use]
    pub const fn related(
        mut self,
        entity: &'static str,
        fields: fn() -> &'static [FieldInfo],
        relationships: fn() -> &'static [RelationshipInfo],
    ) -> Self {
        self.related_entity = entity;
        self.related_fields = fields;
        self.related_relationships = relationships;
        self
    }
}

impl fmt::Debug for RelationshipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationshipInfo")
            .field("name", &self.name)
            .field("related_table", &self.related_table)
            .field("related_entity", &self.related_entity)
            .field("foreign_key", &self.foreign_key)
            .field("cascade", &self.cascade)
            .finish_non_exhaustive()
    }
}

/// Find a relationship by property name.
pub fn find_relationship(
    relationships: &'static [RelationshipInfo],
    name: &str,
) -> Option<&'static RelationshipInfo> {
    relationships.iter().find(|r| r.name == name)
}

/// An owned child collection that may not have been loaded yet.
///
/// Loading goes through a shared reference and happens at most once, so a
/// session can populate the collections of parents it only holds read locks
/// on. Mutation needs `&mut` and a loaded collection.
#[derive(Clone)]
pub struct Collection<T> {
    items: OnceLock<Vec<T>>,
}

impl<T> Collection<T> {
    /// A loaded, empty collection (for parents built in memory).
    pub fn empty() -> Self {
        let items = OnceLock::new();
        let _ = items.set(Vec::new());
        Self { items }
    }

    /// A collection whose contents are still in the database.
    pub fn unloaded() -> Self {
        Self {
            items: OnceLock::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.items.get().is_some()
    }

    /// The loaded items, or `None` when the collection was never loaded.
    pub fn get(&self) -> Option<&[T]> {
        self.items.get().map(Vec::as_slice)
    }

    /// Number of loaded items (0 when unloaded).
    pub fn len(&self) -> usize {
        self.items.get().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the loaded items (nothing when unloaded).
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.get().map_or([].iter(), |v| v.iter())
    }

    /// Populate an unloaded collection. Returns `false` (and drops `items`) if
    /// the collection was already loaded.
    pub fn set_loaded(&self, items: Vec<T>) -> bool {
        self.items.set(items).is_ok()
    }

    /// Mutable access to the loaded items.
    pub fn get_mut(&mut self) -> Option<&mut Vec<T>> {
        self.items.get_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.items.get() {
            Some(items) => f.debug_list().entries(items).finish(),
            None => write!(f, "<unloaded>"),
        }
    }
}

/// A typed handle on a parent's owned collection.
///
/// Pairs the static relationship metadata with the accessor returning the
/// collection from a parent, which is all a session needs to lazy-load or
/// eager-fetch it.
pub struct HasMany<P, C> {
    pub info: &'static RelationshipInfo,
    accessor: fn(&P) -> &Collection<C>,
}

impl<P, C> HasMany<P, C> {
    pub const fn new(info: &'static RelationshipInfo, accessor: fn(&P) -> &Collection<C>) -> Self {
        Self { info, accessor }
    }

    /// The collection on `parent`.
    pub fn collection<'a>(&self, parent: &'a P) -> &'a Collection<C> {
        (self.accessor)(parent)
    }

    pub fn name(&self) -> &'static str {
        self.info.name
    }
}

impl<P, C> Clone for HasMany<P, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, C> Copy for HasMany<P, C> {}

impl<P, C> fmt::Debug for HasMany<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HasMany").field(&self.info.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collection_is_loaded() {
        let c: Collection<i32> = Collection::empty();
        assert!(c.is_loaded());
        assert_eq!(c.get(), Some(&[][..]));
    }

    #[test]
    fn unloaded_collection_loads_once() {
        let c: Collection<i32> = Collection::unloaded();
        assert!(!c.is_loaded());
        assert_eq!(c.len(), 0);
        assert!(c.get().is_none());

        assert!(c.set_loaded(vec![1, 2, 3]));
        assert!(!c.set_loaded(vec![9]));
        assert_eq!(c.get(), Some(&[1, 2, 3][..]));
        assert_eq!(c.iter().sum::<i32>(), 6);
    }

    #[test]
    fn mutation_requires_loaded_collection() {
        let mut unloaded: Collection<i32> = Collection::unloaded();
        assert!(unloaded.get_mut().is_none());

        let mut loaded: Collection<i32> = Collection::empty();
        loaded.get_mut().unwrap().push(4);
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn debug_marks_unloaded() {
        let c: Collection<i32> = Collection::unloaded();
        assert_eq!(format!("{c:?}"), "<unloaded>");
    }

    #[test]
    fn cascade_flags() {
        assert!(Cascade::AllDeleteOrphan.deletes_orphans());
        assert!(Cascade::All.deletes_children());
        assert!(!Cascade::All.deletes_orphans());
        assert!(!Cascade::None.deletes_children());
    }

    #[test]
    fn has_many_reads_collection() {
        struct Parent {
            children: Collection<u8>,
        }
        const CHILDREN: RelationshipInfo =
            RelationshipInfo::one_to_many("children", "children", "parent_id");
        let rel: HasMany<Parent, u8> = HasMany::new(&CHILDREN, |p| &p.children);
        let parent = Parent {
            children: Collection::empty(),
        };
        assert!(rel.collection(&parent).is_loaded());
        assert_eq!(rel.name(), "children");
        assert!(find_relationship(&[], "children").is_none());
    }
}
