//! SQL type definitions and mapping.

/// SQL column types used by the mapping declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    BigInt,
    Boolean,
    Real,
    Text,
    Blob,
}

impl SqlType {
    /// Get the SQL type name for this type.
    pub const fn sql_name(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_names() {
        assert_eq!(SqlType::BigInt.sql_name(), "BIGINT");
        assert_eq!(SqlType::Boolean.sql_name(), "BOOLEAN");
        assert_eq!(SqlType::Text.sql_name(), "TEXT");
    }
}
