//! Test-data builders.
//!
//! Shapes are exact (a blog built with 5 posts and 10 comments per post has
//! exactly that); names and text are random.

use crate::domain::{Bar, Blog, Foo, FooBar};
use ormlessons::{Error, ModelRef, Result};
use rand::{Rng, distributions::Alphanumeric, seq::SliceRandom, thread_rng};

const LOREM: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat",
];

/// Random names and filler text.
pub struct RandomValueProvider;

impl RandomValueProvider {
    /// `len` random ASCII letters, lowercased when `lowercase` is set.
    pub fn random_string(len: usize, lowercase: bool) -> String {
        let s: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .map(char::from)
            .filter(char::is_ascii_alphabetic)
            .take(len)
            .collect();
        if lowercase {
            s.to_ascii_lowercase()
        } else {
            s.to_ascii_uppercase()
        }
    }

    /// `words` words of lorem ipsum, capitalized and ending with a period.
    pub fn lorem_ipsum(words: usize) -> String {
        let mut rng = thread_rng();
        let mut text = (0..words)
            .filter_map(|_| LOREM.choose(&mut rng).copied())
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(first) = text.get_mut(..1) {
            first.make_ascii_uppercase();
        }
        if !text.is_empty() {
            text.push('.');
        }
        text
    }
}

pub struct BlogMother;

impl BlogMother {
    pub const DEFAULT_POSTS: usize = 5;
    pub const DEFAULT_COMMENTS_PER_POST: usize = 10;

    /// A transient blog owning `posts` posts, each with `comments_per_post`
    /// comments.
    pub fn create_blog_with_posts_and_comments(
        name: impl Into<String>,
        posts: usize,
        comments_per_post: usize,
    ) -> Result<Blog> {
        let mut blog = Blog::new(name);
        for _ in 0..posts {
            let post = blog.add_post(RandomValueProvider::random_string(25, true))?;
            for _ in 0..comments_per_post {
                post.add_comment(
                    RandomValueProvider::random_string(10, true),
                    RandomValueProvider::lorem_ipsum(20),
                )?;
            }
        }
        tracing::trace!(blog = blog.name(), posts, comments_per_post, "built blog");
        Ok(blog)
    }

    /// `count` blogs with random names and the default shape.
    pub fn create_blogs_with_posts_and_comments(count: usize) -> Result<Vec<Blog>> {
        (0..count)
            .map(|_| {
                Self::create_blog_with_posts_and_comments(
                    RandomValueProvider::random_string(20, false),
                    Self::DEFAULT_POSTS,
                    Self::DEFAULT_COMMENTS_PER_POST,
                )
            })
            .collect()
    }
}

pub struct FooBarMother;

impl FooBarMother {
    pub fn create_foos(count: usize) -> Vec<Foo> {
        (0..count)
            .map(|_| Foo::new(RandomValueProvider::random_string(10, false)))
            .collect()
    }

    pub fn create_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|_| Bar::new(RandomValueProvider::random_string(10, false)))
            .collect()
    }

    /// Pair foos and bars position by position, up to the shorter list.
    /// Every foo and bar must already be saved.
    pub fn create_foo_bars(foos: &[ModelRef<Foo>], bars: &[ModelRef<Bar>]) -> Result<Vec<FooBar>> {
        foos.iter()
            .zip(bars)
            .map(|(foo, bar)| {
                let foo = foo.read().map_err(|_| Error::poisoned("Foo"))?;
                let bar = bar.read().map_err(|_| Error::poisoned("Bar"))?;
                FooBar::new(&foo, &bar, RandomValueProvider::random_string(10, false))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlessons::DomainErrorKind;
    use std::sync::{Arc, RwLock};

    #[test]
    fn test_random_string_shape() {
        let lower = RandomValueProvider::random_string(25, true);
        assert_eq!(lower.len(), 25);
        assert!(lower.chars().all(|c| c.is_ascii_lowercase()));

        let upper = RandomValueProvider::random_string(10, false);
        assert!(upper.chars().all(|c| c.is_ascii_uppercase()));
        assert!(RandomValueProvider::random_string(0, true).is_empty());
    }

    #[test]
    fn test_lorem_ipsum_word_count() {
        let text = RandomValueProvider::lorem_ipsum(20);
        assert_eq!(text.split(' ').count(), 20);
        assert!(text.ends_with('.'));
        assert!(text.starts_with(|c: char| c.is_ascii_uppercase()));
        assert_eq!(RandomValueProvider::lorem_ipsum(0), "");
    }

    #[test]
    fn test_blog_shape_is_exact() {
        let blog = BlogMother::create_blog_with_posts_and_comments("shape", 3, 4).unwrap();
        assert_eq!(blog.posts().len(), 3);
        assert!(blog.posts().iter().all(|p| p.comments().len() == 4));
    }

    #[test]
    fn test_many_blogs_use_defaults() {
        let blogs = BlogMother::create_blogs_with_posts_and_comments(2).unwrap();
        assert_eq!(blogs.len(), 2);
        assert_eq!(blogs[0].posts().len(), BlogMother::DEFAULT_POSTS);
        assert_ne!(blogs[0].name(), blogs[1].name());
    }

    #[test]
    fn test_foo_bars_pair_up_to_shorter_list() {
        let foos: Vec<_> = FooBarMother::create_foos(3)
            .into_iter()
            .enumerate()
            .map(|(i, mut f)| {
                f.id = Some(i as i64 + 1);
                Arc::new(RwLock::new(f))
            })
            .collect();
        let bars: Vec<_> = FooBarMother::create_bars(2)
            .into_iter()
            .enumerate()
            .map(|(i, mut b)| {
                b.id = Some(i as i64 + 10);
                Arc::new(RwLock::new(b))
            })
            .collect();

        let pairs = FooBarMother::create_foo_bars(&foos, &bars).unwrap();
        let keys: Vec<String> = pairs.iter().map(FooBar::key).collect();
        assert_eq!(keys, ["1/10", "2/11"]);
    }

    #[test]
    fn test_foo_bars_need_saved_ends() {
        let foos = vec![Arc::new(RwLock::new(Foo::new("f")))];
        let bars = vec![Arc::new(RwLock::new(Bar::new("b")))];
        let err = FooBarMother::create_foo_bars(&foos, &bars).unwrap_err();
        assert!(err.is_domain(DomainErrorKind::TransientReference));
    }
}
