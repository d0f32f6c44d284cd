//! Table column metadata

use crate::db::SqlDbType;
use serde::Serialize;

/// Coarse classification of a column's engine type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BaseType {
    Integer,
    Float,
    String,
    Bool,
    Time,
    Guid,
    BinaryData,
    Unknown,
}

impl BaseType {
    pub fn of(sql_type: SqlDbType) -> Self {
        match sql_type {
            SqlDbType::BigInt | SqlDbType::Int | SqlDbType::SmallInt | SqlDbType::TinyInt => BaseType::Integer,
            SqlDbType::Decimal
            | SqlDbType::Float
            | SqlDbType::Money
            | SqlDbType::Real
            | SqlDbType::SmallMoney => BaseType::Float,
            SqlDbType::Char
            | SqlDbType::NChar
            | SqlDbType::NText
            | SqlDbType::NVarChar
            | SqlDbType::Structured
            | SqlDbType::Text
            | SqlDbType::Udt
            | SqlDbType::VarChar
            | SqlDbType::Variant
            | SqlDbType::Xml => BaseType::String,
            SqlDbType::Bit => BaseType::Bool,
            SqlDbType::Date
            | SqlDbType::DateTime
            | SqlDbType::DateTime2
            | SqlDbType::DateTimeOffset
            | SqlDbType::SmallDateTime
            | SqlDbType::Time => BaseType::Time,
            SqlDbType::UniqueIdentifier => BaseType::Guid,
            SqlDbType::Binary | SqlDbType::Image | SqlDbType::Timestamp | SqlDbType::VarBinary => {
                BaseType::BinaryData
            }
        }
    }
}

impl std::fmt::Display for BaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// A column of a user table
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Column {
    /// Name of the owning table
    pub table: String,
    pub name: String,
    /// Type name as reported by the catalog, e.g. `nvarchar`
    pub data_type: String,
    /// Storage length in bytes, -1 for `(max)` types
    pub length: i32,
    pub precision: i32,
    pub scale: i32,
    pub is_nullable: bool,
    pub is_pk: bool,
    pub is_identity: bool,
    pub ordinal: i32,
    /// Default expression with its wrapping parentheses and quotes removed
    pub default_value: String,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// The engine type, or `None` for names like `geography` that have no variant
    pub fn sql_data_type(&self) -> Option<SqlDbType> {
        self.data_type.parse().ok()
    }

    pub fn base_type(&self) -> BaseType {
        self.sql_data_type()
            .map(BaseType::of)
            .unwrap_or(BaseType::Unknown)
    }
}
