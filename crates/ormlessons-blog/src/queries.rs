//! Named queries over blogs.

use crate::domain::{Blog, Post};
use ormlessons::{
    Connection, Error, Expr, FetchMany, ModelRef, OrderBy, QueryObject, Result, Session,
};

fn posts_and_comments() -> FetchMany<Blog, Post> {
    FetchMany::new(Blog::POSTS).then(FetchMany::new(Post::COMMENTS))
}

/// The blog with a given name, with its posts and their comments loaded.
///
/// A blog already resident in the session with everything loaded is returned
/// as is, without SQL.
pub struct BlogByName<'s, C: Connection> {
    session: &'s Session<C>,
    name: String,
}

impl<'s, C: Connection> BlogByName<'s, C> {
    pub fn new(session: &'s Session<C>, name: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
        }
    }

    fn fully_loaded(blog: &ModelRef<Blog>) -> Result<bool> {
        let blog = blog.read().map_err(|_| Error::poisoned("Blog"))?;
        Ok(blog
            .posts()
            .get()
            .is_some_and(|posts| posts.iter().all(|p| p.comments().is_loaded())))
    }
}

impl<C: Connection> QueryObject for BlogByName<'_, C> {
    type Output = Option<ModelRef<Blog>>;

    fn result(&self) -> Result<Self::Output> {
        if let Some(blog) = self
            .session
            .find_resident_by_natural_id::<Blog>(self.name.as_str())?
        {
            if Self::fully_loaded(&blog)? {
                tracing::debug!(name = %self.name, "blog served from the identity map");
                return Ok(Some(blog));
            }
        }

        self.session
            .query::<Blog>()
            .filter(Expr::prop("name").eq(self.name.as_str()))
            .fetch(posts_and_comments())
            .first()
    }
}

/// Blogs owning at least one post that has at least one comment, ordered by
/// id, one page at a time, with posts and comments loaded.
pub struct BlogsWithPostsThatHaveComments<'s, C: Connection> {
    session: &'s Session<C>,
    page_size: u64,
    page: u64,
}

impl<'s, C: Connection> BlogsWithPostsThatHaveComments<'s, C> {
    pub const DEFAULT_PAGE_SIZE: u64 = 25;

    /// SQLite reads OFFSET as a signed 64-bit integer.
    const MAX_OFFSET: u64 = i64::MAX as u64;

    pub fn new(session: &'s Session<C>) -> Self {
        Self {
            session,
            page_size: Self::DEFAULT_PAGE_SIZE,
            page: 0,
        }
    }

    #[must_use]
    pub fn page_size(mut self, rows: u64) -> Self {
        self.page_size = rows;
        self
    }

    /// Zero-based page.
    #[must_use]
    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }
}

impl<C: Connection> QueryObject for BlogsWithPostsThatHaveComments<'_, C> {
    type Output = Vec<ModelRef<Blog>>;

    fn result(&self) -> Result<Self::Output> {
        self.session
            .query::<Blog>()
            .filter(Expr::any("posts", Some(Expr::any("comments", None))))
            .order_by(OrderBy::asc("id"))
            .take(self.page_size)
            .skip(
                self.page
                    .saturating_mul(self.page_size)
                    .min(Self::MAX_OFFSET),
            )
            .fetch(posts_and_comments())
            .list()
    }
}
