use super::Post;
use super::not_loaded;
use ormlessons::{Collection, Result};
use std::io::Write;

/// A blog: the root of the blog aggregate.
///
/// Posts are owned. They are created through [`Blog::add_post`] and only
/// ever exposed read-only.
#[derive(Debug)]
pub struct Blog {
    pub(crate) id: Option<i64>,
    pub(crate) name: String,
    pub(crate) is_active: bool,
    pub(crate) posts: Collection<Post>,
}

impl Blog {
    /// A new, active blog without posts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            is_active: true,
            posts: Collection::empty(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Business identity: the name.
    pub fn key(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn posts(&self) -> &Collection<Post> {
        &self.posts
    }

    /// Create a post owned by this blog.
    pub fn add_post(&mut self, title: impl Into<String>) -> Result<&mut Post> {
        let blog_id = self.id;
        let posts = self
            .posts
            .get_mut()
            .ok_or_else(|| not_loaded("Blog", "posts"))?;
        posts.push(Post::new(blog_id, title.into()));
        let index = posts.len() - 1;
        Ok(&mut posts[index])
    }

    /// Remove the post with `title`. The removed post is an orphan and is
    /// deleted at the next flush.
    pub fn remove_post(&mut self, title: &str) -> Result<Option<Post>> {
        let posts = self
            .posts
            .get_mut()
            .ok_or_else(|| not_loaded("Blog", "posts"))?;
        Ok(posts
            .iter()
            .position(|p| p.title() == title)
            .map(|i| posts.remove(i)))
    }

    /// Render every comment of every post, one line each.
    pub fn print_post_comments(&self, out: &mut dyn Write) -> Result<()> {
        let posts = self.posts.get().ok_or_else(|| not_loaded("Blog", "posts"))?;
        for post in posts {
            post.print_comments(out)?;
        }
        Ok(())
    }

    /// Disable comments on every post.
    pub fn disable_comments(&mut self) -> Result<()> {
        let posts = self
            .posts
            .get_mut()
            .ok_or_else(|| not_loaded("Blog", "posts"))?;
        for post in posts {
            post.disable_comments();
        }
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn activate(&mut self) {
        self.is_active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlessons::DomainErrorKind;

    #[test]
    fn test_new_blog_is_active_and_empty() {
        let blog = Blog::new("pitfalls");
        assert!(blog.is_active());
        assert_eq!(blog.key(), "pitfalls");
        assert!(blog.posts().is_loaded());
        assert!(blog.posts().is_empty());
    }

    #[test]
    fn test_add_post_points_at_parent() {
        let mut blog = Blog::new("pitfalls");
        blog.id = Some(7);
        let post = blog.add_post("first").unwrap();
        assert_eq!(post.blog_id(), Some(7));
        assert_eq!(blog.posts().len(), 1);
    }

    #[test]
    fn test_unloaded_posts_refuse_mutation() {
        let mut blog = Blog::new("pitfalls");
        blog.posts = Collection::unloaded();

        let err = blog.add_post("first").unwrap_err();
        assert!(err.is_domain(DomainErrorKind::CollectionNotLoaded));
        assert!(blog.disable_comments().is_err());
        assert!(blog.print_post_comments(&mut Vec::new()).is_err());
    }

    #[test]
    fn test_remove_post() {
        let mut blog = Blog::new("pitfalls");
        blog.add_post("keep").unwrap();
        blog.add_post("drop").unwrap();

        let removed = blog.remove_post("drop").unwrap().unwrap();
        assert_eq!(removed.title(), "drop");
        assert!(blog.remove_post("missing").unwrap().is_none());
        assert_eq!(blog.posts().len(), 1);
    }

    #[test]
    fn test_print_post_comments_walks_every_post() {
        let mut blog = Blog::new("pitfalls");
        blog.add_post("one")
            .unwrap()
            .add_comment("alice", "hello")
            .unwrap();
        blog.add_post("two")
            .unwrap()
            .add_comment("bob", "world")
            .unwrap();

        let mut out = Vec::new();
        blog.print_post_comments(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "alice said: hello\nbob said: world\n"
        );
    }

    #[test]
    fn test_disable_comments_reaches_every_post() {
        let mut blog = Blog::new("pitfalls");
        blog.add_post("one").unwrap();
        blog.add_post("two").unwrap();
        blog.disable_comments().unwrap();
        assert!(blog.posts().iter().all(|p| !p.comments_enabled()));
    }

    #[test]
    fn test_deactivate() {
        let mut blog = Blog::new("pitfalls");
        blog.deactivate();
        assert!(!blog.is_active());
        blog.activate();
        assert!(blog.is_active());
    }
}
