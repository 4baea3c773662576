//! SELECT N+1: walking lazy collections issues one query per parent.

mod common;

use common::{blog_named, factory, seed_blog};
use ormlessons::prelude::*;
use ormlessons_blog::{Blog, Post};

#[test]
fn lazy_comments_per_post_issue_one_query_each() {
    let (factory, conn) = factory(SessionConfig::default());
    seed_blog(&factory, &conn, "lazy", 5, 10);

    let session = factory.open_session();
    let blog = blog_named(&session, "lazy");
    let blog = blog.read().expect("read blog");

    let posts = session.load(&*blog, Blog::POSTS).expect("load posts");
    let scope = session.n1_scope();
    let mut printed = 0;
    for post in posts {
        for comment in session.load(post, Post::COMMENTS).expect("load comments") {
            assert!(!comment.commenter().is_empty());
            printed += 1;
        }
    }
    let in_loop = scope.stats();
    drop(scope);

    assert_eq!(printed, 50);
    assert_eq!(in_loop.total_loads, 5);
    assert_eq!(in_loop.relationships_loaded, 1);
    assert_eq!(in_loop.potential_n1, 1);
    // blog, posts, then one per post
    assert_eq!(session.statement_count().expect("statement count"), 1 + 1 + 5);
    assert_eq!(session.n1_stats().expect("n1 stats").total_loads, 6);

    let alerts = factory.profiler().alerts();
    assert!(
        matches!(
            alerts.as_slice(),
            [Alert::SelectNPlusOne { parent: "Post", relationship: "comments", loads: 3, .. }]
        ),
        "{alerts:?}"
    );
}

#[test]
fn eager_fetch_issues_one_query_per_level() {
    for posts in [5, 20] {
        let (factory, conn) = factory(SessionConfig::default());
        seed_blog(&factory, &conn, "eager", posts, 3);

        let session = factory.open_session();
        let scope = session.n1_scope();
        let blog = session
            .query::<Blog>()
            .filter(Expr::prop("name").eq("eager"))
            .fetch(FetchMany::new(Blog::POSTS).then(FetchMany::new(Post::COMMENTS)))
            .first()
            .expect("query blog")
            .expect("blog exists");

        let mut out = Vec::new();
        blog.read()
            .expect("read blog")
            .print_post_comments(&mut out)
            .expect("print comments");
        let lines = String::from_utf8(out).expect("utf8").lines().count();

        assert_eq!(lines, posts * 3);
        assert_eq!(scope.stats().total_loads, 0);
        assert_eq!(session.statement_count().expect("statement count"), 3);
        assert_eq!(conn.selects().len(), 3);
        assert!(!factory.profiler().has_alert(AlertKind::SelectNPlusOne));
    }
}

#[test]
fn walking_unloaded_collections_is_refused() {
    let (factory, conn) = factory(SessionConfig::default());
    seed_blog(&factory, &conn, "unloaded", 1, 1);

    let session = factory.open_session();
    let blog = blog_named(&session, "unloaded");
    let err = blog
        .read()
        .expect("read blog")
        .print_post_comments(&mut Vec::new())
        .unwrap_err();
    assert!(err.is_domain(DomainErrorKind::CollectionNotLoaded));
}
