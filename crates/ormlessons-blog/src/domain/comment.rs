use regex::Regex;
use std::sync::LazyLock;

/// Terms a comment may not contain to be printable.
pub const RESTRICTED_TERMS: &[&str] = &["darn", "heck", "frak", "gosh", "blimey"];

static RESTRICTED: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = RESTRICTED_TERMS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
        .expect("pattern is built from escaped literals")
});

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub(crate) id: Option<i64>,
    pub(crate) post_id: Option<i64>,
    pub(crate) commenter: String,
    pub(crate) text: String,
    pub(crate) approved_by_moderator: bool,
}

impl Comment {
    pub(crate) fn new(post_id: Option<i64>, commenter: String, text: String) -> Self {
        Self {
            id: None,
            post_id,
            commenter,
            text,
            approved_by_moderator: false,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn post_id(&self) -> Option<i64> {
        self.post_id
    }

    pub fn commenter(&self) -> &str {
        &self.commenter
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_approved(&self) -> bool {
        self.approved_by_moderator
    }

    pub fn approve(&mut self) {
        self.approved_by_moderator = true;
    }

    /// `"<commenter>:<first 20 characters of the text>"`.
    pub fn key(&self) -> String {
        let prefix: String = self.text.chars().take(20).collect();
        format!("{}:{}", self.commenter, prefix)
    }

    /// Whether the text contains a restricted term as a whole word, in any
    /// case. Derived from the text; not persisted.
    pub fn contains_restricted_language(&self) -> bool {
        RESTRICTED.is_match(&self.text)
    }
}
