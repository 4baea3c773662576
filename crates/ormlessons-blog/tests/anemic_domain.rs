//! Anemic domain: behavior pulled out of the entities into callers that walk
//! the collections themselves, each opening a session of its own.

mod common;

use common::{Factory, count_rows, factory, seed_blog};
use ormlessons::prelude::*;
use ormlessons_blog::{Blog, BlogByName, Post};
use std::sync::Arc;

type Conn = Arc<common::CountingConnection>;

fn fetch_blog(session: &Session<Conn>, name: &str) -> ModelRef<Blog> {
    session
        .query::<Blog>()
        .filter(Expr::prop("name").eq(name))
        .fetch(FetchMany::new(Blog::POSTS).then(FetchMany::new(Post::COMMENTS)))
        .first()
        .expect("query blog")
        .expect("blog exists")
}

/// Formatting done outside the entity, in a short-lived session.
fn comment_lines(factory: &Factory, name: &str) -> Vec<String> {
    let session = factory.open_session();
    let blog = fetch_blog(&session, name);
    let blog = blog.read().expect("read blog");
    let mut lines = Vec::new();
    for post in blog.posts().iter() {
        for comment in post.comments().iter() {
            lines.push(format!("{} said: {}", comment.commenter(), comment.text()));
        }
    }
    lines
}

#[test]
fn stolen_behavior_reloads_the_aggregate_per_call() {
    let (factory, conn) = factory(SessionConfig::default());
    seed_blog(&factory, &conn, "anemic", 3, 4);

    let first = comment_lines(&factory, "anemic");
    let second = comment_lines(&factory, "anemic");

    assert_eq!(first.len(), 12);
    assert_eq!(first, second);
    // blog, posts and comments, twice over
    assert_eq!(conn.selects().len(), 6);
    assert_eq!(conn.duplicate_selects().len(), 3);
}

#[test]
fn behavior_on_the_entity_uses_one_session() {
    let (factory, conn) = factory(SessionConfig::default());
    seed_blog(&factory, &conn, "rich", 3, 4);

    let uow = factory.start_unit_of_work().expect("start unit of work");
    let blog = BlogByName::new(&uow, "rich")
        .result()
        .expect("query blog")
        .expect("blog exists");

    let mut out = Vec::new();
    blog.read()
        .expect("read blog")
        .print_post_comments(&mut out)
        .expect("print comments");
    let mut again = Vec::new();
    BlogByName::new(&uow, "rich")
        .result()
        .expect("query blog")
        .expect("blog exists")
        .read()
        .expect("read blog")
        .print_post_comments(&mut again)
        .expect("print comments");
    uow.commit().expect("commit");

    let text = String::from_utf8(out).expect("utf8");
    assert_eq!(text.lines().count(), 12);
    assert!(text.lines().all(|l| l.contains(" said: ")));
    assert_eq!(out_len(&again), 12);
    assert_eq!(conn.selects().len(), 3);
    assert!(conn.duplicate_selects().is_empty());
}

fn out_len(out: &[u8]) -> usize {
    String::from_utf8_lossy(out).lines().count()
}

#[test]
fn disabled_comments_are_enforced_by_the_post() {
    let (factory, conn) = factory(SessionConfig::default());
    seed_blog(&factory, &conn, "guarded", 2, 1);

    let uow = factory.start_unit_of_work().expect("start unit of work");
    let blog = fetch_blog(&uow, "guarded");
    {
        let mut blog = blog.write().expect("write blog");
        blog.disable_comments().expect("disable comments");
        let post = blog.add_post("late post").expect("add post");
        post.disable_comments();
        let err = post.add_comment("mallory", "sneaky").unwrap_err();
        assert!(err.is_domain(DomainErrorKind::CommentsDisabled));
        assert!(post.comments().is_empty());
    }
    let result = uow.commit().expect("commit");

    assert_eq!(result.inserted, 1);
    assert_eq!(result.updated, 2);
    assert_eq!(count_rows(&factory, "comments"), 2);

    let session = factory.open_session();
    let blog = fetch_blog(&session, "guarded");
    let blog = blog.read().expect("read blog");
    assert_eq!(blog.posts().len(), 3);
    assert!(blog.posts().iter().all(|p| !p.comments_enabled()));
}
