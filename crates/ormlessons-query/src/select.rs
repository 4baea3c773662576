//! SELECT query builder.

use crate::clause::OrderBy;
use crate::expr::{Expr, Scope, quote_identifier};
use ormlessons_core::{Model, RelationshipInfo, Result, Value};
use std::fmt;
use std::marker::PhantomData;

/// Children of a set of parents, by foreign key.
#[derive(Debug, Clone)]
struct ParentFilter {
    foreign_key: &'static str,
    order_column: &'static str,
    parent_ids: Vec<Value>,
}

/// A SELECT query over one model's table.
///
/// Filters are property-level [`Expr`]s; they are translated when the query
/// is built, so an untranslatable predicate surfaces as an error from
/// [`Select::build`] rather than at construction.
pub struct Select<M: Model> {
    /// WHERE clause conditions
    filter: Option<Expr>,
    /// Restriction to the children of given parents (eager fetch)
    parents: Option<ParentFilter>,
    /// ORDER BY clauses
    order_by: Vec<OrderBy>,
    /// LIMIT clause
    limit: Option<u64>,
    /// OFFSET clause
    offset: Option<u64>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Select<M> {
    /// Create a new SELECT query for the model's table.
    pub fn new() -> Self {
        Self {
            filter: None,
            parents: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            _marker: PhantomData,
        }
    }

    /// Add a WHERE condition (ANDed with any existing one).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Add ORDER BY clause.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Restrict to the children, through `relationship`, of the given parent
    /// keys: `WHERE fk IN (...)`, ordered by parent then by the collection's
    /// ordering column.
    pub fn in_parents(mut self, relationship: &'static RelationshipInfo, parent_ids: Vec<Value>) -> Self {
        self.parents = Some(ParentFilter {
            foreign_key: relationship.foreign_key,
            order_column: relationship.order_by,
            parent_ids,
        });
        self
    }

    /// Whether a LIMIT was set.
    pub fn is_bounded(&self) -> bool {
        self.limit.is_some()
    }

    /// Build the SELECT statement and its parameters.
    pub fn build(&self) -> Result<(String, Vec<Value>)> {
        let scope = Scope::of::<M>();
        let columns: Vec<String> = M::fields()
            .iter()
            .map(|f| {
                let col = quote_identifier(f.column_name);
                format!("{}.{col} AS {col}", scope.alias)
            })
            .collect();

        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            columns.join(", "),
            quote_identifier(M::TABLE_NAME),
            scope.alias
        );
        self.push_where(&scope, &mut sql, &mut params)?;

        let mut order = Vec::new();
        if let Some(parents) = &self.parents {
            order.push(format!("{}.{}", scope.alias, quote_identifier(parents.foreign_key)));
            order.push(format!("{}.{}", scope.alias, quote_identifier(parents.order_column)));
        }
        for o in &self.order_by {
            order.push(o.to_sql(&scope)?);
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            if self.limit.is_none() {
                // SQLite requires a LIMIT before OFFSET
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok((sql, params))
    }

    /// Build a `SELECT COUNT(*)` with the same filters.
    pub fn build_count(&self) -> Result<(String, Vec<Value>)> {
        let scope = Scope::of::<M>();
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT COUNT(*) AS count FROM {} AS {}",
            quote_identifier(M::TABLE_NAME),
            scope.alias
        );
        self.push_where(&scope, &mut sql, &mut params)?;
        Ok((sql, params))
    }

    fn push_where(&self, scope: &Scope, sql: &mut String, params: &mut Vec<Value>) -> Result<()> {
        let mut conditions = Vec::new();
        if let Some(parents) = &self.parents {
            let fk = format!("{}.{}", scope.alias, quote_identifier(parents.foreign_key));
            if parents.parent_ids.is_empty() {
                conditions.push("1 = 0".to_string());
            } else {
                let placeholders = vec!["?"; parents.parent_ids.len()].join(", ");
                conditions.push(format!("{fk} IN ({placeholders})"));
                params.extend(parents.parent_ids.iter().cloned());
            }
        }
        if let Some(filter) = &self.filter {
            conditions.push(filter.translate(scope, params)?);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        Ok(())
    }
}

impl<M: Model> Default for Select<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Clone for Select<M> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            parents: self.parents.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset,
            _marker: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for Select<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("table", &M::TABLE_NAME)
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::tests::{Author, BOOKS, Book};

    #[test]
    fn test_simple_select() {
        let (sql, params) = Select::<Author>::new().build().unwrap();
        assert_eq!(
            sql,
            "SELECT t0.\"id\" AS \"id\", t0.\"name\" AS \"name\", t0.\"active\" AS \"active\" FROM \"authors\" AS t0"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_filter_order_limit_offset() {
        let query = Select::<Author>::new()
            .filter(Expr::prop("is_active").eq(true))
            .filter(Expr::prop("name").starts_with("a"))
            .order_by(OrderBy::desc("name"))
            .limit(25)
            .offset(50);
        assert!(query.is_bounded());
        let (sql, params) = query.build().unwrap();
        assert!(sql.ends_with(
            "WHERE (t0.\"active\" = ? AND t0.\"name\" LIKE ? ESCAPE '\\') ORDER BY t0.\"name\" DESC LIMIT 25 OFFSET 50"
        ));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_offset_without_limit() {
        let (sql, _) = Select::<Author>::new().offset(5).build().unwrap();
        assert!(sql.ends_with("LIMIT -1 OFFSET 5"));
    }

    #[test]
    fn test_in_parents() {
        let (sql, params) = Select::<Book>::new()
            .in_parents(&BOOKS, vec![Value::Integer(1), Value::Integer(2)])
            .build()
            .unwrap();
        assert!(sql.ends_with(
            "WHERE t0.\"author_id\" IN (?, ?) ORDER BY t0.\"author_id\", t0.\"id\""
        ));
        assert_eq!(params, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_count() {
        let (sql, params) = Select::<Author>::new()
            .filter(Expr::any("books", None))
            .limit(3)
            .build_count()
            .unwrap();
        assert!(sql.starts_with("SELECT COUNT(*) AS count FROM \"authors\" AS t0 WHERE EXISTS"));
        assert!(!sql.contains("LIMIT"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_untranslatable_order_by() {
        let err = Select::<Author>::new()
            .order_by(OrderBy::asc("popularity"))
            .build()
            .unwrap_err();
        assert!(err.is_translation());
    }
}
