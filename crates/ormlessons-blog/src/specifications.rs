//! Business rules as specifications.
//!
//! Each rule is written once and serves both in memory (`is_satisfied_by`)
//! and in queries (`SessionQuery::matching`). Name matching ignores ASCII case
//! in memory because SQLite's `LIKE` does.

use crate::domain::{Blog, Comment, Post};
use ormlessons::{
    AdHocSpecification, AndSpecification, Expr, NotSpecification, OrSpecification,
    Specification, SpecificationExt,
};

const PREFIX: &str = "ABC";
const SUFFIX: &str = "XYZ";

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.is_char_boundary(s.len() - suffix.len())
        && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Rules over blogs.
pub struct BlogSpecifications;

impl BlogSpecifications {
    pub fn starts_with_abc() -> AdHocSpecification<Blog> {
        AdHocSpecification::new("name starts with ABC", |b: &Blog| {
            starts_with_ignore_case(b.name(), PREFIX)
        })
        .with_expr(Expr::prop("name").starts_with(PREFIX))
    }

    pub fn ends_with_xyz() -> AdHocSpecification<Blog> {
        AdHocSpecification::new("name ends with XYZ", |b: &Blog| {
            ends_with_ignore_case(b.name(), SUFFIX)
        })
        .with_expr(Expr::prop("name").ends_with(SUFFIX))
    }

    pub fn starts_with_abc_and_ends_with_xyz() -> AndSpecification<Blog> {
        Self::starts_with_abc().and(Self::ends_with_xyz())
    }

    pub fn starts_with_abc_or_ends_with_xyz() -> OrSpecification<Blog> {
        Self::starts_with_abc().or(Self::ends_with_xyz())
    }

    pub fn not_starts_with_abc() -> NotSpecification<Blog> {
        Self::starts_with_abc().not()
    }

    pub fn is_active() -> AdHocSpecification<Blog> {
        AdHocSpecification::new("blog is active", |b: &Blog| b.is_active())
            .with_expr(Expr::prop("is_active").eq(true))
    }

    /// In memory this reads the loaded posts; an unloaded collection counts
    /// as empty.
    pub fn has_posts() -> AdHocSpecification<Blog> {
        AdHocSpecification::new("blog has posts", |b: &Blog| !b.posts().is_empty())
            .with_expr(Expr::any("posts", None))
    }

    pub fn is_active_and_has_posts() -> AndSpecification<Blog> {
        Self::is_active().and(Self::has_posts())
    }
}

/// Rules over comments.
pub struct CommentSpecifications;

impl CommentSpecifications {
    /// Approved by a moderator and free of restricted language.
    ///
    /// Restricted language is computed from the text and never stored, so
    /// this rule cannot be turned into SQL: translating it fails with
    /// `Error::Translation`.
    pub fn is_printable() -> AdHocSpecification<Comment> {
        AdHocSpecification::new("comment is printable", |c: &Comment| {
            c.is_approved() && !c.contains_restricted_language()
        })
        .with_expr(
            Expr::prop("approved_by_moderator")
                .eq(true)
                .and(Expr::prop("contains_restricted_language").eq(false)),
        )
    }
}

/// Rules over posts.
pub struct PostSpecifications;

impl PostSpecifications {
    /// At least one loaded comment is printable.
    pub fn has_printable_comments() -> AdHocSpecification<Post> {
        let printable = CommentSpecifications::is_printable();
        let expr = Expr::any("comments", Some(printable.to_expr()));
        AdHocSpecification::new("post has printable comments", move |p: &Post| {
            p.comments().iter().any(|c| printable.is_satisfied_by(c))
        })
        .with_expr(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlessons::{Model, Select};

    fn blog(name: &str, active: bool, posts: usize) -> Blog {
        let mut blog = Blog::new(name);
        for i in 0..posts {
            blog.add_post(format!("{name} post {i}")).unwrap();
        }
        if !active {
            blog.deactivate();
        }
        blog
    }

    #[test]
    fn test_name_rules() {
        let both = blog("ABC and XYZ", true, 0);
        let prefix = blog("abc only", true, 0);
        let neither = blog("plain", true, 0);

        assert!(BlogSpecifications::starts_with_abc_and_ends_with_xyz().is_satisfied_by(&both));
        assert!(!BlogSpecifications::starts_with_abc_and_ends_with_xyz().is_satisfied_by(&prefix));
        assert!(BlogSpecifications::starts_with_abc_or_ends_with_xyz().is_satisfied_by(&prefix));
        assert!(!BlogSpecifications::starts_with_abc_or_ends_with_xyz().is_satisfied_by(&neither));
        assert!(BlogSpecifications::not_starts_with_abc().is_satisfied_by(&neither));
        assert!(!BlogSpecifications::not_starts_with_abc().is_satisfied_by(&prefix));
    }

    #[test]
    fn test_not_negates() {
        for b in [blog("ABC", true, 0), blog("ab", true, 0), blog("", true, 0)] {
            assert_eq!(
                BlogSpecifications::not_starts_with_abc().is_satisfied_by(&b),
                !BlogSpecifications::starts_with_abc().is_satisfied_by(&b)
            );
        }
    }

    #[test]
    fn test_multibyte_names_do_not_panic() {
        assert!(!BlogSpecifications::starts_with_abc().is_satisfied_by(&blog("ée", true, 0)));
        assert!(!BlogSpecifications::ends_with_xyz().is_satisfied_by(&blog("ée", true, 0)));
    }

    #[test]
    fn test_is_active_and_has_posts() {
        let spec = BlogSpecifications::is_active_and_has_posts();
        assert!(spec.is_satisfied_by(&blog("a", true, 1)));
        assert!(!spec.is_satisfied_by(&blog("b", false, 1)));
        assert!(!spec.is_satisfied_by(&blog("c", true, 0)));
    }

    #[test]
    fn test_blog_rules_translate() {
        let (sql, params) = Select::<Blog>::new()
            .filter(BlogSpecifications::is_active_and_has_posts().to_expr())
            .build()
            .unwrap();
        assert!(sql.contains("EXISTS"), "{sql}");
        assert_eq!(params.len(), 1);
        assert_eq!(Blog::TABLE_NAME, "blogs");
    }

    #[test]
    fn test_printable_comment_rules() {
        let mut blog = Blog::new("rules");
        let post = blog.add_post("p").unwrap();
        post.add_comment("alice", "heck no").unwrap().approve();
        post.add_comment("bob", "pending").unwrap();
        assert!(!PostSpecifications::has_printable_comments().is_satisfied_by(post));

        post.add_comment("carol", "lovely").unwrap().approve();
        assert!(PostSpecifications::has_printable_comments().is_satisfied_by(post));
    }

    #[test]
    fn test_unpersisted_property_does_not_translate() {
        let err = Select::<Comment>::new()
            .filter(CommentSpecifications::is_printable().to_expr())
            .build()
            .unwrap_err();
        assert!(err.is_translation(), "{err}");

        let err = Select::<Post>::new()
            .filter(PostSpecifications::has_printable_comments().to_expr())
            .build()
            .unwrap_err();
        assert!(err.is_translation(), "{err}");
    }
}
