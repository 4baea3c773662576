//! ORDER BY clause.

use crate::expr::Scope;
use ormlessons_core::Result;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// ORDER BY over a mapped property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    property: String,
    direction: OrderDirection,
}

impl OrderBy {
    /// Create an ascending order by clause.
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order by clause.
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Generate SQL for this ORDER BY clause.
    pub fn to_sql(&self, scope: &Scope) -> Result<String> {
        let mut sql = scope.column(&self.property)?;
        sql.push_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });
        Ok(sql)
    }
}
