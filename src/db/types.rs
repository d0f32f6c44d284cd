//! SQL Server data type names

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// SQL Server engine types, as reported by `sys.types` and used to declare parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlDbType {
    BigInt,
    Binary,
    Bit,
    Char,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Decimal,
    Float,
    Image,
    Int,
    Money,
    NChar,
    NText,
    NVarChar,
    Real,
    SmallDateTime,
    SmallInt,
    SmallMoney,
    Structured,
    Text,
    Time,
    Timestamp,
    TinyInt,
    Udt,
    UniqueIdentifier,
    VarBinary,
    VarChar,
    Variant,
    Xml,
}

const ALL_TYPES: &[SqlDbType] = &[
    SqlDbType::BigInt,
    SqlDbType::Binary,
    SqlDbType::Bit,
    SqlDbType::Char,
    SqlDbType::Date,
    SqlDbType::DateTime,
    SqlDbType::DateTime2,
    SqlDbType::DateTimeOffset,
    SqlDbType::Decimal,
    SqlDbType::Float,
    SqlDbType::Image,
    SqlDbType::Int,
    SqlDbType::Money,
    SqlDbType::NChar,
    SqlDbType::NText,
    SqlDbType::NVarChar,
    SqlDbType::Real,
    SqlDbType::SmallDateTime,
    SqlDbType::SmallInt,
    SqlDbType::SmallMoney,
    SqlDbType::Structured,
    SqlDbType::Text,
    SqlDbType::Time,
    SqlDbType::Timestamp,
    SqlDbType::TinyInt,
    SqlDbType::Udt,
    SqlDbType::UniqueIdentifier,
    SqlDbType::VarBinary,
    SqlDbType::VarChar,
    SqlDbType::Variant,
    SqlDbType::Xml,
];

impl SqlDbType {
    /// Lower-case T-SQL keyword for the type
    pub fn keyword(&self) -> &'static str {
        match self {
            SqlDbType::BigInt => "bigint",
            SqlDbType::Binary => "binary",
            SqlDbType::Bit => "bit",
            SqlDbType::Char => "char",
            SqlDbType::Date => "date",
            SqlDbType::DateTime => "datetime",
            SqlDbType::DateTime2 => "datetime2",
            SqlDbType::DateTimeOffset => "datetimeoffset",
            SqlDbType::Decimal => "decimal",
            SqlDbType::Float => "float",
            SqlDbType::Image => "image",
            SqlDbType::Int => "int",
            SqlDbType::Money => "money",
            SqlDbType::NChar => "nchar",
            SqlDbType::NText => "ntext",
            SqlDbType::NVarChar => "nvarchar",
            SqlDbType::Real => "real",
            SqlDbType::SmallDateTime => "smalldatetime",
            SqlDbType::SmallInt => "smallint",
            SqlDbType::SmallMoney => "smallmoney",
            SqlDbType::Structured => "structured",
            SqlDbType::Text => "text",
            SqlDbType::Time => "time",
            SqlDbType::Timestamp => "timestamp",
            SqlDbType::TinyInt => "tinyint",
            SqlDbType::Udt => "udt",
            SqlDbType::UniqueIdentifier => "uniqueidentifier",
            SqlDbType::VarBinary => "varbinary",
            SqlDbType::VarChar => "varchar",
            SqlDbType::Variant => "sql_variant",
            SqlDbType::Xml => "xml",
        }
    }

    /// Type text for a `DECLARE` statement.
    ///
    /// `size` applies to character and binary types, where `0` or a negative value
    /// means `(max)`. `precision`/`scale` apply to decimal types.
    pub fn declaration(&self, size: i32, precision: u8, scale: u8) -> String {
        match self {
            SqlDbType::VarChar | SqlDbType::NVarChar | SqlDbType::VarBinary => {
                if size <= 0 {
                    format!("{}(max)", self.keyword())
                } else {
                    format!("{}({})", self.keyword(), size)
                }
            }
            SqlDbType::Char | SqlDbType::NChar | SqlDbType::Binary => {
                format!("{}({})", self.keyword(), size.max(1))
            }
            SqlDbType::Decimal => {
                let precision = if precision == 0 { 18 } else { precision };
                format!("decimal({}, {})", precision, scale.min(precision))
            }
            // rowversion values can only be read back, declare them as raw bytes
            SqlDbType::Timestamp => "binary(8)".to_string(),
            _ => self.keyword().to_string(),
        }
    }
}

impl std::fmt::Display for SqlDbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// Raised when a catalog type name has no `SqlDbType` counterpart
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown SQL type '{0}'")]
pub struct UnknownSqlType(pub String);

impl FromStr for SqlDbType {
    type Err = UnknownSqlType;

    /// Case-insensitive. `numeric` and `sql_variant` are aliases the engine reports
    /// that have no variant of their own.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();

        if name.eq_ignore_ascii_case("numeric") {
            return Ok(SqlDbType::Decimal);
        }
        if name.eq_ignore_ascii_case("sql_variant") {
            return Ok(SqlDbType::Variant);
        }

        ALL_TYPES
            .iter()
            .copied()
            .find(|t| t.keyword().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownSqlType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("NVARCHAR".parse::<SqlDbType>(), Ok(SqlDbType::NVarChar));
        assert_eq!("DateTime2".parse::<SqlDbType>(), Ok(SqlDbType::DateTime2));
        assert_eq!("uniqueidentifier".parse::<SqlDbType>(), Ok(SqlDbType::UniqueIdentifier));
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("numeric".parse::<SqlDbType>(), Ok(SqlDbType::Decimal));
        assert_eq!("sql_variant".parse::<SqlDbType>(), Ok(SqlDbType::Variant));
    }

    #[test]
    fn test_parse_unknown() {
        assert!("geography".parse::<SqlDbType>().is_err());
        assert!("".parse::<SqlDbType>().is_err());
    }

    #[test]
    fn test_unknown_type_message() {
        let err = "geography".parse::<SqlDbType>().unwrap_err();
        assert_eq!(err, UnknownSqlType("geography".to_string()));
        assert_eq!(err.to_string(), "unknown SQL type 'geography'");
    }

    #[test]
    fn test_declaration() {
        assert_eq!(SqlDbType::NVarChar.declaration(-1, 0, 0), "nvarchar(max)");
        assert_eq!(SqlDbType::VarChar.declaration(50, 0, 0), "varchar(50)");
        assert_eq!(SqlDbType::Decimal.declaration(0, 0, 0), "decimal(18, 0)");
        assert_eq!(SqlDbType::Decimal.declaration(0, 10, 4), "decimal(10, 4)");
        assert_eq!(SqlDbType::Int.declaration(0, 0, 0), "int");
    }
}
