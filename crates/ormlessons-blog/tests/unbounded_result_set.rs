//! Unbounded result sets: a query without a row limit grows with the table.

mod common;

use common::{factory, seed_blogs};
use ormlessons::prelude::*;
use ormlessons_blog::{Blog, BlogSpecifications};

const BLOGS: usize = 50;
const PAGE: u64 = 25;

#[test]
fn listing_every_blog_raises_an_alert() {
    let (factory, conn) = factory(SessionConfig::default());
    seed_blogs(&factory, &conn, BLOGS);

    let session = factory.open_session();
    let blogs = session.query::<Blog>().list().expect("list blogs");

    assert_eq!(blogs.len(), BLOGS);
    let alerts = factory.profiler().alerts();
    assert!(
        matches!(
            alerts.as_slice(),
            [Alert::UnboundedResultSet { entity: "Blog", rows: BLOGS, .. }]
        ),
        "{alerts:?}"
    );
}

#[test]
fn paging_keeps_the_result_bounded() {
    let (factory, conn) = factory(SessionConfig::default());
    seed_blogs(&factory, &conn, BLOGS);

    let session = factory.open_session();
    let first = session
        .query::<Blog>()
        .order_by(OrderBy::asc("id"))
        .take(PAGE)
        .list()
        .expect("first page");
    let second = session
        .query::<Blog>()
        .order_by(OrderBy::asc("id"))
        .skip(PAGE)
        .take(PAGE)
        .list()
        .expect("second page");

    assert_eq!(first.len(), 25);
    assert_eq!(second.len(), 25);
    let last_of_first = first[24].read().expect("read").id();
    let first_of_second = second[0].read().expect("read").id();
    assert!(last_of_first < first_of_second);
    assert!(factory.profiler().alerts().is_empty());
}

#[test]
fn counting_does_not_materialize_rows() {
    let (factory, conn) = factory(SessionConfig::default());
    seed_blogs(&factory, &conn, BLOGS);

    let session = factory.open_session();
    let active = session
        .query::<Blog>()
        .matching(&BlogSpecifications::is_active())
        .count()
        .expect("count blogs");

    assert_eq!(active, 50);
    assert_eq!(session.resident_count().expect("resident count"), 0);
    assert!(!factory.profiler().has_alert(AlertKind::UnboundedResultSet));
}
