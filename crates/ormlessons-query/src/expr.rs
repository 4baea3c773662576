//! Property-level filter expressions and their translation to SQL.
//!
//! Expressions name *properties*, not columns. Translation resolves every
//! property against the mapping metadata of the entity being queried (a
//! [`Scope`]), so a predicate over something the mapping does not persist
//! cannot silently turn into SQL: it fails with `Error::Translation`.
//!
//! ```ignore
//! let expr = Expr::prop("name").starts_with("abc")
//!     .and(Expr::prop("is_active").eq(true))
//!     .and(Expr::any("posts", None));
//! ```

use ormlessons_core::{
    Error, FieldInfo, Model, RelationshipInfo, Result, Value, find_field, find_relationship,
};

/// Escape character declared on every LIKE.
pub const LIKE_ESCAPE: char = '\\';

/// Escape LIKE wildcards (and the escape character itself) so `fragment`
/// matches literally.
pub fn escape_like(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A predicate (or operand) over the properties of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Mapped property of the entity in scope
    Property(String),

    /// Literal value, bound as a parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// NOT expr
    Not(Box<Expr>),

    /// IN / NOT IN a list of literals
    In {
        expr: Box<Expr>,
        values: Vec<Value>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE pattern, with `\\` as the escape character
    Like { expr: Box<Expr>, pattern: String },

    /// At least one element of an owned collection (optionally) satisfies a
    /// predicate; translated to a correlated EXISTS subquery
    Any {
        relationship: String,
        predicate: Option<Box<Expr>>,
    },

    /// A predicate that exists only in memory, with a description for errors
    Opaque(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

impl Expr {
    /// Reference a mapped property.
    pub fn prop(name: impl Into<String>) -> Self {
        Expr::Property(name.into())
    }

    /// A literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// A predicate with no relational form.
    pub fn opaque(description: impl Into<String>) -> Self {
        Expr::Opaque(description.into())
    }

    /// Some element of the named collection satisfies `predicate` (or simply
    /// exists, when `predicate` is `None`).
    pub fn any(relationship: impl Into<String>, predicate: Option<Expr>) -> Self {
        Expr::Any {
            relationship: relationship.into(),
            predicate: predicate.map(Box::new),
        }
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// Raw LIKE pattern. `%` and `_` are wildcards; `\\` escapes them.
    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
        }
    }

    /// LIKE 'prefix%'
    pub fn starts_with(self, prefix: impl AsRef<str>) -> Self {
        self.like(format!("{}%", escape_like(prefix.as_ref())))
    }

    /// LIKE '%suffix'
    pub fn ends_with(self, suffix: impl AsRef<str>) -> Self {
        self.like(format!("%{}", escape_like(suffix.as_ref())))
    }

    /// LIKE '%fragment%'
    pub fn contains(self, fragment: impl AsRef<str>) -> Self {
        self.like(format!("%{}%", escape_like(fragment.as_ref())))
    }

    /// Translate to SQL against `scope`, appending bound values to `params`.
    pub fn translate(&self, scope: &Scope, params: &mut Vec<Value>) -> Result<String> {
        match self {
            Expr::Property(name) => scope.column(name),

            Expr::Literal(value) => {
                params.push(value.clone());
                Ok("?".to_string())
            }

            Expr::Binary { left, op, right } => {
                let left_sql = left.translate(scope, params)?;
                let right_sql = right.translate(scope, params)?;
                match op {
                    BinaryOp::And | BinaryOp::Or => {
                        Ok(format!("({left_sql} {} {right_sql})", op.as_str()))
                    }
                    _ => Ok(format!("{left_sql} {} {right_sql}", op.as_str())),
                }
            }

            Expr::Not(inner) => Ok(format!("NOT ({})", inner.translate(scope, params)?)),

            Expr::In {
                expr,
                values,
                negated,
            } => {
                let expr_sql = expr.translate(scope, params)?;
                if values.is_empty() {
                    // IN () is not valid SQL
                    return Ok(if *negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                params.extend(values.iter().cloned());
                let not = if *negated { "NOT " } else { "" };
                Ok(format!("{expr_sql} {not}IN ({placeholders})"))
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.translate(scope, params)?;
                let not = if *negated { " NOT" } else { "" };
                Ok(format!("{expr_sql} IS{not} NULL"))
            }

            Expr::Like { expr, pattern } => {
                let expr_sql = expr.translate(scope, params)?;
                params.push(Value::Text(pattern.clone()));
                Ok(format!("{expr_sql} LIKE ? ESCAPE '{LIKE_ESCAPE}'"))
            }

            Expr::Any {
                relationship,
                predicate,
            } => {
                let (child, rel) = scope.child(relationship)?;
                let mut sql = format!(
                    "EXISTS (SELECT 1 FROM {} AS {} WHERE {}.{} = {}",
                    quote_identifier(rel.related_table),
                    child.alias,
                    child.alias,
                    quote_identifier(rel.foreign_key),
                    scope.pk_column()?,
                );
                if let Some(predicate) = predicate {
                    sql.push_str(" AND ");
                    sql.push_str(&predicate.translate(&child, params)?);
                }
                sql.push(')');
                Ok(sql)
            }

            Expr::Opaque(description) => Err(Error::unresolved_property(scope.entity, description)),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Literal(Value::Bool(value))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Literal(Value::Integer(value))
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Literal(Value::Text(value.to_string()))
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::Literal(Value::Text(value))
    }
}

/// The entity an expression is resolved against: its mapped fields and
/// relationships plus the table alias used in the statement.
#[derive(Debug, Clone)]
pub struct Scope {
    pub entity: &'static str,
    pub table: &'static str,
    pub alias: String,
    pub fields: &'static [FieldInfo],
    pub relationships: &'static [RelationshipInfo],
    depth: usize,
}

impl Scope {
    /// Root scope for a model, aliased `t0`.
    pub fn of<M: Model>() -> Self {
        Self {
            entity: M::ENTITY_NAME,
            table: M::TABLE_NAME,
            alias: "t0".to_string(),
            fields: M::fields(),
            relationships: M::relationships(),
            depth: 0,
        }
    }

    /// Qualified column for a mapped property.
    pub fn column(&self, property: &str) -> Result<String> {
        let field = find_field(self.fields, property)
            .ok_or_else(|| Error::unresolved_property(self.entity, property))?;
        Ok(format!(
            "{}.{}",
            self.alias,
            quote_identifier(field.column_name)
        ))
    }

    /// Qualified single-column primary key.
    pub fn pk_column(&self) -> Result<String> {
        let field = self
            .fields
            .iter()
            .find(|f| f.primary_key)
            .ok_or_else(|| Error::unresolved_property(self.entity, "<primary key>"))?;
        Ok(format!(
            "{}.{}",
            self.alias,
            quote_identifier(field.column_name)
        ))
    }

    /// Scope of the children of an owned collection.
    fn child(&self, relationship: &str) -> Result<(Scope, &'static RelationshipInfo)> {
        let rel = find_relationship(self.relationships, relationship)
            .ok_or_else(|| Error::unresolved_property(self.entity, relationship))?;
        let depth = self.depth + 1;
        let scope = Scope {
            entity: rel.related_entity,
            table: rel.related_table,
            alias: format!("t{depth}"),
            fields: (rel.related_fields)(),
            relationships: (rel.related_relationships)(),
            depth,
        };
        Ok((scope, rel))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ormlessons_core::{Cascade, Row, SqlType};

    pub(crate) struct Author;
    pub(crate) struct Book;

    static BOOK_FIELDS: [FieldInfo; 3] = [
        FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
        FieldInfo::new("title", "title", SqlType::Text).natural_id(),
        FieldInfo::new("author", "author_id", SqlType::BigInt).foreign_key("authors.id"),
    ];

    fn book_fields() -> &'static [FieldInfo] {
        &BOOK_FIELDS
    }

    fn no_relationships() -> &'static [RelationshipInfo] {
        &[]
    }

    pub(crate) const BOOKS: RelationshipInfo =
        RelationshipInfo::one_to_many("books", "books", "author_id")
            .cascade(Cascade::AllDeleteOrphan)
            .related("Book", book_fields, no_relationships);

    impl Model for Author {
        const TABLE_NAME: &'static str = "authors";
        const ENTITY_NAME: &'static str = "Author";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];
        const RELATIONSHIPS: &'static [RelationshipInfo] = &[BOOKS];

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: [FieldInfo; 3] = [
                FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
                FieldInfo::new("name", "name", SqlType::Text).natural_id(),
                FieldInfo::new("is_active", "active", SqlType::Boolean),
            ];
            &FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }

        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Author)
        }

        fn primary_key_value(&self) -> Vec<Value> {
            Vec::new()
        }

        fn is_new(&self) -> bool {
            true
        }
    }

    impl Model for Book {
        const TABLE_NAME: &'static str = "books";
        const ENTITY_NAME: &'static str = "Book";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];

        fn fields() -> &'static [FieldInfo] {
            &BOOK_FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }

        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Book)
        }

        fn primary_key_value(&self) -> Vec<Value> {
            Vec::new()
        }

        fn is_new(&self) -> bool {
            true
        }
    }

    fn translate(expr: &Expr) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let sql = expr.translate(&Scope::of::<Author>(), &mut params)?;
        Ok((sql, params))
    }

    #[test]
    fn test_property_resolves_to_mapped_column() {
        let (sql, params) = translate(&Expr::prop("is_active").eq(true)).unwrap();
        assert_eq!(sql, "t0.\"active\" = ?");
        assert_eq!(params, vec![Value::Bool(true)]);
    }

    #[test]
    fn test_like_helpers_bind_patterns() {
        let expr = Expr::prop("name")
            .starts_with("abc")
            .or(Expr::prop("name").ends_with("xyz"));
        let (sql, params) = translate(&expr).unwrap();
        assert_eq!(
            sql,
            "(t0.\"name\" LIKE ? ESCAPE '\\' OR t0.\"name\" LIKE ? ESCAPE '\\')"
        );
        assert_eq!(
            params,
            vec![Value::Text("abc%".into()), Value::Text("%xyz".into())]
        );
    }

    #[test]
    fn test_like_helpers_match_wildcards_literally() {
        let expr = Expr::prop("name")
            .starts_with("a_c")
            .and(Expr::prop("name").ends_with("10%"))
            .and(Expr::prop("name").contains("C:\\tmp"));
        let (_, params) = translate(&expr).unwrap();
        assert_eq!(
            params,
            vec![
                Value::Text("a\\_c%".into()),
                Value::Text("%10\\%".into()),
                Value::Text("%C:\\\\tmp%".into()),
            ]
        );

        // A raw pattern keeps its wildcards
        let (_, params) = translate(&Expr::prop("name").like("a_c%")).unwrap();
        assert_eq!(params, vec![Value::Text("a_c%".into())]);
    }

    #[test]
    fn test_in_list_and_empty_in() {
        let (sql, params) = translate(&Expr::prop("id").in_list([1_i64, 2])).unwrap();
        assert_eq!(sql, "t0.\"id\" IN (?, ?)");
        assert_eq!(params.len(), 2);

        let (sql, _) = translate(&Expr::prop("id").in_list(Vec::<i64>::new())).unwrap();
        assert_eq!(sql, "1 = 0");
    }

    #[test]
    fn test_not_and_is_null() {
        let (sql, _) = translate(&Expr::prop("name").is_null().not()).unwrap();
        assert_eq!(sql, "NOT (t0.\"name\" IS NULL)");
    }

    #[test]
    fn test_any_becomes_correlated_exists() {
        let expr = Expr::any("books", Some(Expr::prop("title").contains("Rust")));
        let (sql, params) = translate(&expr).unwrap();
        assert_eq!(
            sql,
            "EXISTS (SELECT 1 FROM \"books\" AS t1 WHERE t1.\"author_id\" = t0.\"id\" AND t1.\"title\" LIKE ? ESCAPE '\\')"
        );
        assert_eq!(params, vec![Value::Text("%Rust%".into())]);

        let (sql, _) = translate(&Expr::any("books", None)).unwrap();
        assert!(sql.ends_with("t1.\"author_id\" = t0.\"id\")"));
    }

    #[test]
    fn test_unmapped_property_is_translation_error() {
        let err = translate(&Expr::prop("is_prolific").eq(true)).unwrap_err();
        assert!(err.is_translation());
        match err {
            Error::Translation(t) => {
                assert_eq!(t.entity, "Author");
                assert_eq!(t.property, "is_prolific");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unmapped_property_inside_collection() {
        let expr = Expr::any("books", Some(Expr::prop("is_bestseller").eq(true)));
        let err = translate(&expr).unwrap_err();
        match err {
            Error::Translation(t) => {
                assert_eq!(t.entity, "Book");
                assert_eq!(t.property, "is_bestseller");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_opaque_never_translates() {
        let err = translate(&Expr::opaque("custom predicate")).unwrap_err();
        assert!(err.is_translation());
        assert!(err.to_string().contains("custom predicate"));
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
