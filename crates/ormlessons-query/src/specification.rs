//! Composable business rules.
//!
//! A [`Specification`] is a named predicate over an entity that can be
//! evaluated in memory (`is_satisfied_by`) and, when it has a relational form,
//! handed to a query (`to_expr`). The same rule object serves both paths, so
//! the rule is written once.
//!
//! Rules whose in-memory form depends on something the mapping does not
//! persist return an expression naming that property; translating it fails
//! with `Error::Translation` instead of quietly evaluating elsewhere.

use crate::expr::Expr;
use std::fmt;

/// A reusable boolean rule over `T`.
///
/// Implementations must be free of side effects; they may be evaluated any
/// number of times.
pub trait Specification<T>: Send + Sync {
    /// Evaluate the rule against a loaded object.
    fn is_satisfied_by(&self, candidate: &T) -> bool;

    /// The rule as a property-level filter expression.
    fn to_expr(&self) -> Expr;
}

impl<T> Specification<T> for Box<dyn Specification<T>> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (**self).is_satisfied_by(candidate)
    }

    fn to_expr(&self) -> Expr {
        (**self).to_expr()
    }
}

/// Both children hold. The right child is not evaluated when the left fails.
pub struct AndSpecification<T> {
    left: Box<dyn Specification<T>>,
    right: Box<dyn Specification<T>>,
}

impl<T> AndSpecification<T> {
    pub fn new(
        left: impl Specification<T> + 'static,
        right: impl Specification<T> + 'static,
    ) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl<T> Specification<T> for AndSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) && self.right.is_satisfied_by(candidate)
    }

    fn to_expr(&self) -> Expr {
        self.left.to_expr().and(self.right.to_expr())
    }
}

/// Either child holds. The right child is not evaluated when the left holds.
pub struct OrSpecification<T> {
    left: Box<dyn Specification<T>>,
    right: Box<dyn Specification<T>>,
}

impl<T> OrSpecification<T> {
    pub fn new(
        left: impl Specification<T> + 'static,
        right: impl Specification<T> + 'static,
    ) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl<T> Specification<T> for OrSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.left.is_satisfied_by(candidate) || self.right.is_satisfied_by(candidate)
    }

    fn to_expr(&self) -> Expr {
        self.left.to_expr().or(self.right.to_expr())
    }
}

/// The negation of the wrapped rule.
pub struct NotSpecification<T> {
    inner: Box<dyn Specification<T>>,
}

impl<T> NotSpecification<T> {
    pub fn new(inner: impl Specification<T> + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl<T> Specification<T> for NotSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        !self.inner.is_satisfied_by(candidate)
    }

    fn to_expr(&self) -> Expr {
        self.inner.to_expr().not()
    }
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A rule built from a closure plus, optionally, its relational form.
///
/// Without an expression the rule still works in memory but translates to
/// `Expr::Opaque`, which no query accepts.
pub struct AdHocSpecification<T> {
    description: String,
    predicate: Predicate<T>,
    expr: Option<Expr>,
}

impl<T> AdHocSpecification<T> {
    pub fn new(
        description: impl Into<String>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            predicate: Box::new(predicate),
            expr: None,
        }
    }

    /// Attach the equivalent filter expression.
    pub fn with_expr(mut self, expr: Expr) -> Self {
        self.expr = Some(expr);
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl<T> Specification<T> for AdHocSpecification<T> {
    fn is_satisfied_by(&self, candidate: &T) -> bool {
        (self.predicate)(candidate)
    }

    fn to_expr(&self) -> Expr {
        self.expr
            .clone()
            .unwrap_or_else(|| Expr::opaque(self.description.clone()))
    }
}

impl<T> fmt::Debug for AdHocSpecification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdHocSpecification")
            .field("description", &self.description)
            .field("expr", &self.expr)
            .finish_non_exhaustive()
    }
}

/// Combinators available on every specification.
pub trait SpecificationExt<T>: Specification<T> + Sized + 'static {
    fn and(self, other: impl Specification<T> + 'static) -> AndSpecification<T> {
        AndSpecification::new(self, other)
    }

    fn or(self, other: impl Specification<T> + 'static) -> OrSpecification<T> {
        OrSpecification::new(self, other)
    }

    fn not(self) -> NotSpecification<T> {
        NotSpecification::new(self)
    }

    fn boxed(self) -> Box<dyn Specification<T>> {
        Box::new(self)
    }
}

impl<T, S: Specification<T> + Sized + 'static> SpecificationExt<T> for S {}
