use super::Comment;
use super::not_loaded;
use ormlessons::{Collection, DomainErrorKind, Error, Result};
use std::io::Write;

/// A post, owned by a blog.
#[derive(Debug)]
pub struct Post {
    pub(crate) id: Option<i64>,
    pub(crate) blog_id: Option<i64>,
    pub(crate) title: String,
    pub(crate) comments_enabled: bool,
    pub(crate) comments: Collection<Comment>,
}

impl Post {
    pub(crate) fn new(blog_id: Option<i64>, title: String) -> Self {
        Self {
            id: None,
            blog_id,
            title,
            comments_enabled: true,
            comments: Collection::empty(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn blog_id(&self) -> Option<i64> {
        self.blog_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Business identity: the title.
    pub fn key(&self) -> &str {
        &self.title
    }

    pub fn comments_enabled(&self) -> bool {
        self.comments_enabled
    }

    pub fn comments(&self) -> &Collection<Comment> {
        &self.comments
    }

    /// Add a comment. Fails when comments are disabled on this post; the
    /// collection is left untouched.
    pub fn add_comment(
        &mut self,
        commenter: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<&mut Comment> {
        if !self.comments_enabled {
            return Err(Error::domain(
                DomainErrorKind::CommentsDisabled,
                "Post",
                format!("comments are disabled on '{}'", self.title),
            ));
        }
        let post_id = self.id;
        let comments = self
            .comments
            .get_mut()
            .ok_or_else(|| not_loaded("Post", "comments"))?;
        comments.push(Comment::new(post_id, commenter.into(), text.into()));
        let index = comments.len() - 1;
        Ok(&mut comments[index])
    }

    /// Render each comment as `"<commenter> said: <text>"`.
    pub fn print_comments(&self, out: &mut dyn Write) -> Result<()> {
        let comments = self
            .comments
            .get()
            .ok_or_else(|| not_loaded("Post", "comments"))?;
        for comment in comments {
            writeln!(out, "{} said: {}", comment.commenter(), comment.text())?;
        }
        Ok(())
    }

    pub fn disable_comments(&mut self) {
        self.comments_enabled = false;
    }

    pub fn enable_comments(&mut self) {
        self.comments_enabled = true;
    }
}
