use ormlessons::{DomainErrorKind, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Foo {
    pub(crate) id: Option<i64>,
    pub(crate) name: String,
}

impl Foo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub(crate) id: Option<i64>,
    pub(crate) name: String,
}

impl Bar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.name
    }
}

/// Association between a foo and a bar, identified by the pair of their
/// identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FooBar {
    pub(crate) foo_id: i64,
    pub(crate) bar_id: i64,
    pub(crate) name: String,
    pub(crate) flagged: bool,
    /// Loaded from the database (as opposed to built in memory).
    pub(crate) persisted: bool,
}

impl FooBar {
    /// Associate `foo` and `bar`. Both must already have an identity.
    pub fn new(foo: &Foo, bar: &Bar, name: impl Into<String>) -> Result<Self> {
        let identity = |id: Option<i64>, entity: &str| {
            id.ok_or_else(|| {
                Error::domain(
                    DomainErrorKind::TransientReference,
                    "FooBar",
                    format!("{entity} has no identity yet; save it first"),
                )
            })
        };
        Ok(Self {
            foo_id: identity(foo.id, "Foo")?,
            bar_id: identity(bar.id, "Bar")?,
            name: name.into(),
            flagged: false,
            persisted: false,
        })
    }

    pub fn foo_id(&self) -> i64 {
        self.foo_id
    }

    pub fn bar_id(&self) -> i64 {
        self.bar_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"<foo id>/<bar id>"`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.foo_id, self.bar_id)
    }

    pub fn is_flagged(&self) -> bool {
        self.flagged
    }

    pub fn toggle(&mut self) {
        self.flagged = !self.flagged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foo_bar_needs_persistent_ends() {
        let mut foo = Foo::new("foo");
        let bar = Bar {
            id: Some(2),
            name: "bar".into(),
        };
        let err = FooBar::new(&foo, &bar, "pair").unwrap_err();
        assert!(err.is_domain(DomainErrorKind::TransientReference));

        foo.id = Some(1);
        let pair = FooBar::new(&foo, &bar, "pair").unwrap();
        assert_eq!(pair.key(), "1/2");
    }

    #[test]
    fn test_toggle() {
        let foo = Foo {
            id: Some(1),
            name: "foo".into(),
        };
        let bar = Bar {
            id: Some(1),
            name: "bar".into(),
        };
        let mut pair = FooBar::new(&foo, &bar, "pair").unwrap();
        assert!(!pair.is_flagged());
        pair.toggle();
        assert!(pair.is_flagged());
        pair.toggle();
        assert!(!pair.is_flagged());
    }
}
