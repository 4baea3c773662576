//! Mapping declarations: how each entity is stored.
//!
//! | Entity | Table | Key | Natural id |
//! |--------|-------|-----|------------|
//! | Blog | `blogs` | `id` (hi/lo) | `name` |
//! | Post | `posts` | `id` (hi/lo) | `title` |
//! | Comment | `comments` | `id` (hi/lo) | |
//! | Foo | `foos` | `id` (hi/lo) | `name` |
//! | Bar | `bars` | `id` (hi/lo) | `name` |
//! | FooBar | `foo_bars` | `(foo_id, bar_id)` | `name` |
//!
//! `Blog.posts` and `Post.comments` are owned collections: lazy unless a query
//! fetches them, cascading saves and deletes, and deleting orphans.

use crate::domain::{Bar, Blog, Comment, Foo, FooBar, Post};
use ormlessons::{
    Cascade, Collection, FieldInfo, HasMany, IdAllocator, Model, ObjectGraph, ReferentialAction,
    RelationshipInfo, Result, Row, RowImage, SqlType, Value,
};

// ============================================================================
// Blog
// ============================================================================

const BLOG_POSTS: RelationshipInfo = RelationshipInfo::one_to_many("posts", "posts", "blog_id")
    .cascade(Cascade::AllDeleteOrphan)
    .order_by("id")
    .related(
        <Post as Model>::ENTITY_NAME,
        <Post as Model>::fields,
        <Post as Model>::relationships,
    );

fn blog_posts(blog: &Blog) -> &Collection<Post> {
    &blog.posts
}

impl Blog {
    pub const POSTS: HasMany<Blog, Post> = HasMany::new(&BLOG_POSTS, blog_posts);
}

impl Model for Blog {
    const TABLE_NAME: &'static str = "blogs";
    const ENTITY_NAME: &'static str = "Blog";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[BLOG_POSTS];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 3] = [
            FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
            FieldInfo::new("name", "name", SqlType::Text).natural_id(),
            FieldInfo::new("is_active", "is_active", SqlType::Boolean),
        ];
        &FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.as_str().into()),
            ("is_active", self.is_active.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            is_active: row.get_named("is_active")?,
            posts: Collection::unloaded(),
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.id.into()]
    }

    fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

impl ObjectGraph for Blog {
    fn collect_rows(&self, out: &mut Vec<RowImage>) {
        out.push(RowImage::of(self));
        for post in self.posts.iter() {
            post.collect_rows(out);
        }
    }

    fn assign_ids(&mut self, ids: &mut dyn IdAllocator) -> Result<()> {
        if self.id.is_none() {
            self.id = Some(ids.next_id(Self::TABLE_NAME)?);
        }
        let blog_id = self.id;
        if let Some(posts) = self.posts.get_mut() {
            for post in posts {
                post.blog_id = blog_id;
                post.assign_ids(ids)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Post
// ============================================================================

const POST_COMMENTS: RelationshipInfo =
    RelationshipInfo::one_to_many("comments", "comments", "post_id")
        .cascade(Cascade::AllDeleteOrphan)
        .order_by("id")
        .related(
            <Comment as Model>::ENTITY_NAME,
            <Comment as Model>::fields,
            <Comment as Model>::relationships,
        );

fn post_comments(post: &Post) -> &Collection<Comment> {
    &post.comments
}

impl Post {
    pub const COMMENTS: HasMany<Post, Comment> = HasMany::new(&POST_COMMENTS, post_comments);
}

impl Model for Post {
    const TABLE_NAME: &'static str = "posts";
    const ENTITY_NAME: &'static str = "Post";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[POST_COMMENTS];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 4] = [
            FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
            FieldInfo::new("blog_id", "blog_id", SqlType::BigInt)
                .foreign_key("blogs.id")
                .on_delete(ReferentialAction::Cascade),
            FieldInfo::new("title", "title", SqlType::Text).natural_id(),
            FieldInfo::new("comments_enabled", "comments_enabled", SqlType::Boolean),
        ];
        &FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("blog_id", self.blog_id.into()),
            ("title", self.title.as_str().into()),
            ("comments_enabled", self.comments_enabled.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            blog_id: row.get_named("blog_id")?,
            title: row.get_named("title")?,
            comments_enabled: row.get_named("comments_enabled")?,
            comments: Collection::unloaded(),
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.id.into()]
    }

    fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

impl ObjectGraph for Post {
    fn collect_rows(&self, out: &mut Vec<RowImage>) {
        out.push(RowImage::of(self));
        out.extend(self.comments.iter().map(RowImage::of));
    }

    fn assign_ids(&mut self, ids: &mut dyn IdAllocator) -> Result<()> {
        if self.id.is_none() {
            self.id = Some(ids.next_id(Self::TABLE_NAME)?);
        }
        let post_id = self.id;
        if let Some(comments) = self.comments.get_mut() {
            for comment in comments {
                comment.post_id = post_id;
                comment.assign_ids(ids)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Comment
// ============================================================================

impl Model for Comment {
    const TABLE_NAME: &'static str = "comments";
    const ENTITY_NAME: &'static str = "Comment";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 5] = [
            FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
            FieldInfo::new("post_id", "post_id", SqlType::BigInt)
                .foreign_key("posts.id")
                .on_delete(ReferentialAction::Cascade),
            FieldInfo::new("commenter", "commenter", SqlType::Text),
            FieldInfo::new("text", "text", SqlType::Text),
            FieldInfo::new(
                "approved_by_moderator",
                "approved_by_moderator",
                SqlType::Boolean,
            ),
        ];
        &FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("post_id", self.post_id.into()),
            ("commenter", self.commenter.as_str().into()),
            ("text", self.text.as_str().into()),
            ("approved_by_moderator", self.approved_by_moderator.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            post_id: row.get_named("post_id")?,
            commenter: row.get_named("commenter")?,
            text: row.get_named("text")?,
            approved_by_moderator: row.get_named("approved_by_moderator")?,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.id.into()]
    }

    fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

impl ObjectGraph for Comment {
    fn assign_ids(&mut self, ids: &mut dyn IdAllocator) -> Result<()> {
        if self.id.is_none() {
            self.id = Some(ids.next_id(Self::TABLE_NAME)?);
        }
        Ok(())
    }
}

// ============================================================================
// Foo / Bar / FooBar
// ============================================================================

macro_rules! named_entity {
    ($ty:ident, $table:literal, $entity:literal) => {
        impl Model for $ty {
            const TABLE_NAME: &'static str = $table;
            const ENTITY_NAME: &'static str = $entity;
            const PRIMARY_KEY: &'static [&'static str] = &["id"];

            fn fields() -> &'static [FieldInfo] {
                static FIELDS: [FieldInfo; 2] = [
                    FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
                    FieldInfo::new("name", "name", SqlType::Text).natural_id(),
                ];
                &FIELDS
            }

            fn to_row(&self) -> Vec<(&'static str, Value)> {
                vec![("id", self.id.into()), ("name", self.name.as_str().into())]
            }

            fn from_row(row: &Row) -> Result<Self> {
                Ok(Self {
                    id: row.get_named("id")?,
                    name: row.get_named("name")?,
                })
            }

            fn primary_key_value(&self) -> Vec<Value> {
                vec![self.id.into()]
            }

            fn is_new(&self) -> bool {
                self.id.is_none()
            }
        }

        impl ObjectGraph for $ty {
            fn assign_ids(&mut self, ids: &mut dyn IdAllocator) -> Result<()> {
                if self.id.is_none() {
                    self.id = Some(ids.next_id(Self::TABLE_NAME)?);
                }
                Ok(())
            }
        }
    };
}

named_entity!(Foo, "foos", "Foo");
named_entity!(Bar, "bars", "Bar");

impl Model for FooBar {
    const TABLE_NAME: &'static str = "foo_bars";
    const ENTITY_NAME: &'static str = "FooBar";
    const PRIMARY_KEY: &'static [&'static str] = &["foo_id", "bar_id"];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 4] = [
            FieldInfo::new("foo_id", "foo_id", SqlType::BigInt)
                .primary_key(true)
                .foreign_key("foos.id"),
            FieldInfo::new("bar_id", "bar_id", SqlType::BigInt)
                .primary_key(true)
                .foreign_key("bars.id"),
            FieldInfo::new("name", "name", SqlType::Text).natural_id(),
            FieldInfo::new("flagged", "flagged", SqlType::Boolean),
        ];
        &FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("foo_id", self.foo_id.into()),
            ("bar_id", self.bar_id.into()),
            ("name", self.name.as_str().into()),
            ("flagged", self.flagged.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            foo_id: row.get_named("foo_id")?,
            bar_id: row.get_named("bar_id")?,
            name: row.get_named("name")?,
            flagged: row.get_named("flagged")?,
            persisted: true,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.foo_id.into(), self.bar_id.into()]
    }

    /// The key is assigned at construction, so newness is tracked apart.
    fn is_new(&self) -> bool {
        !self.persisted
    }
}

impl ObjectGraph for FooBar {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_ids_reaches_every_loaded_child() {
        struct Counter(i64);
        impl IdAllocator for Counter {
            fn next_id(&mut self, _table: &'static str) -> Result<i64> {
                self.0 += 1;
                Ok(self.0)
            }
        }

        let mut blog = Blog::new("pitfalls");
        blog.add_post("one")
            .unwrap()
            .add_comment("alice", "hi")
            .unwrap();
        blog.assign_ids(&mut Counter(0)).unwrap();

        let post = &blog.posts().get().unwrap()[0];
        assert_eq!(blog.id(), Some(1));
        assert_eq!(post.id(), Some(2));
        assert_eq!(post.blog_id(), Some(1));
        let comment = &post.comments().get().unwrap()[0];
        assert_eq!(comment.id(), Some(3));
        assert_eq!(comment.post_id(), Some(2));
    }

    #[test]
    fn test_row_images_are_parents_first() {
        let mut blog = Blog::new("pitfalls");
        let post = blog.add_post("one").unwrap();
        post.add_comment("alice", "a").unwrap();
        post.add_comment("bob", "b").unwrap();

        let tables: Vec<&str> = blog.row_images().iter().map(|i| i.table).collect();
        assert_eq!(tables, ["blogs", "posts", "comments", "comments"]);
    }

    #[test]
    fn test_unloaded_collections_contribute_no_rows() {
        let row = Row::new(
            vec!["id".into(), "name".into(), "is_active".into()],
            vec![Value::Integer(1), Value::Text("pitfalls".into()), Value::Bool(true)],
        );
        let blog = Blog::from_row(&row).unwrap();
        assert!(!blog.posts().is_loaded());
        assert_eq!(blog.row_images().len(), 1);
        assert_eq!(blog.natural_id(), Some(Value::Text("pitfalls".into())));
    }

    #[test]
    fn test_foo_bar_composite_key() {
        let foo = Foo {
            id: Some(4),
            name: "f".into(),
        };
        let bar = Bar {
            id: Some(9),
            name: "b".into(),
        };
        let pair = FooBar::new(&foo, &bar, "pair").unwrap();
        assert!(pair.is_new());
        assert_eq!(pair.primary_key_value(), vec![Value::Integer(4), Value::Integer(9)]);
    }

    #[test]
    fn test_relationship_handles() {
        assert_eq!(Blog::POSTS.name(), "posts");
        assert_eq!(Post::COMMENTS.info.foreign_key, "post_id");
        assert_eq!(Blog::POSTS.info.cascade, Cascade::AllDeleteOrphan);
    }
}
