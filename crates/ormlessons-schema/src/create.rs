//! CREATE TABLE statement builder.

use crate::quote_ident;
use ormlessons_core::{FieldInfo, Model};
use std::marker::PhantomData;

/// Builder for CREATE TABLE statements.
#[derive(Debug)]
pub struct CreateTable<M: Model> {
    if_not_exists: bool,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> CreateTable<M> {
    /// Create a new CREATE TABLE builder.
    pub fn new() -> Self {
        Self {
            if_not_exists: false,
            _marker: PhantomData,
        }
    }

    /// Add IF NOT EXISTS clause.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Build the CREATE TABLE SQL.
    pub fn build(&self) -> String {
        let mut sql = String::from("CREATE TABLE ");

        if self.if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }

        sql.push_str(&quote_ident(M::TABLE_NAME));
        sql.push_str(" (\n  ");

        let fields = M::fields();
        let mut column_defs = Vec::new();
        let mut constraints = Vec::new();

        for field in fields {
            column_defs.push(column_definition(field));

            if field.unique && !field.primary_key {
                constraints.push(format!(
                    "CONSTRAINT {} UNIQUE ({})",
                    quote_ident(&format!("uk_{}_{}", M::TABLE_NAME, field.column_name)),
                    quote_ident(field.column_name)
                ));
            }

            if let Some((table, column)) = field.foreign_key.and_then(|fk| fk.split_once('.')) {
                let mut fk = format!(
                    "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
                    quote_ident(&format!("fk_{}_{}", M::TABLE_NAME, field.column_name)),
                    quote_ident(field.column_name),
                    quote_ident(table),
                    quote_ident(column)
                );
                if let Some(action) = field.on_delete {
                    fk.push_str(" ON DELETE ");
                    fk.push_str(action.as_sql());
                }
                constraints.push(fk);
            }
        }

        // Composite keys are declared as a table constraint too.
        let pk_cols = M::PRIMARY_KEY;
        if !pk_cols.is_empty() {
            let cols: Vec<String> = pk_cols.iter().map(|c| quote_ident(c)).collect();
            constraints.insert(0, format!("PRIMARY KEY ({})", cols.join(", ")));
        }

        let all_parts: Vec<_> = column_defs.into_iter().chain(constraints).collect();

        sql.push_str(&all_parts.join(",\n  "));
        sql.push_str("\n)");

        sql
    }
}

fn column_definition(field: &FieldInfo) -> String {
    let mut def = format!(
        "{} {}",
        quote_ident(field.column_name),
        field.sql_type.sql_name()
    );
    if !field.nullable {
        def.push_str(" NOT NULL");
    }
    def
}

impl<M: Model> Default for CreateTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ormlessons_core::{ReferentialAction, Result, Row, SqlType, Value};

    pub(crate) struct Team;
    pub(crate) struct Hero;
    pub(crate) struct HeroTeam;

    macro_rules! model {
        ($ty:ty, $table:literal, $pk:expr, $fields:expr) => {
            impl Model for $ty {
                const TABLE_NAME: &'static str = $table;
                const ENTITY_NAME: &'static str = stringify!($ty);
                const PRIMARY_KEY: &'static [&'static str] = $pk;

                fn fields() -> &'static [FieldInfo] {
                    static FIELDS: &[FieldInfo] = $fields;
                    FIELDS
                }

                fn to_row(&self) -> Vec<(&'static str, Value)> {
                    vec![]
                }

                fn from_row(_row: &Row) -> Result<Self> {
                    Ok(Self)
                }

                fn primary_key_value(&self) -> Vec<Value> {
                    vec![]
                }

                fn is_new(&self) -> bool {
                    true
                }
            }
        };
    }

    model!(Team, "teams", &["id"], &[
        FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
        FieldInfo::new("name", "name", SqlType::Text).natural_id(),
    ]);

    model!(Hero, "heroes", &["id"], &[
        FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
        FieldInfo::new("name", "name", SqlType::Text).natural_id(),
        FieldInfo::new("age", "age", SqlType::Integer).nullable(true),
        FieldInfo::new("team", "team_id", SqlType::BigInt)
            .foreign_key("teams.id")
            .on_delete(ReferentialAction::Cascade),
    ]);

    model!(HeroTeam, "hero_teams", &["hero_id", "team_id"], &[
        FieldInfo::new("hero", "hero_id", SqlType::BigInt)
            .primary_key(true)
            .foreign_key("heroes.id"),
        FieldInfo::new("team", "team_id", SqlType::BigInt)
            .primary_key(true)
            .foreign_key("teams.id"),
    ]);

    #[test]
    fn test_create_table_columns() {
        let sql = CreateTable::<Hero>::new().build();
        assert!(sql.starts_with("CREATE TABLE \"heroes\""));
        assert!(sql.contains("\"id\" BIGINT NOT NULL"));
        assert!(sql.contains("\"name\" TEXT NOT NULL"));
        assert!(sql.contains("\"age\" INTEGER,"));
        assert!(sql.contains("\"team_id\" BIGINT NOT NULL"));
    }

    #[test]
    fn test_create_table_if_not_exists() {
        let sql = CreateTable::<Hero>::new().if_not_exists().build();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"heroes\""));
    }

    #[test]
    fn test_create_table_constraints() {
        let sql = CreateTable::<Hero>::new().build();
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
        assert!(sql.contains("CONSTRAINT \"uk_heroes_name\" UNIQUE (\"name\")"));
        assert!(sql.contains(
            "FOREIGN KEY (\"team_id\") REFERENCES \"teams\"(\"id\") ON DELETE CASCADE"
        ));
    }

    #[test]
    fn test_composite_primary_key() {
        let sql = CreateTable::<HeroTeam>::new().build();
        assert!(sql.contains("PRIMARY KEY (\"hero_id\", \"team_id\")"));
        assert!(!sql.contains("UNIQUE"));
    }
}
