//! Named, typed command parameters

use crate::db::query::CellValue;
use crate::db::types::SqlDbType;

/// Name used for the return value of a stored procedure
pub const RETURN_VALUE_NAME: &str = "RETURN_VALUE";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the server sends a value back for this parameter
    pub fn is_written_back(&self) -> bool {
        !matches!(self, ParameterDirection::Input)
    }
}

/// A named parameter sent with a command.
///
/// After execution, parameters whose direction is not `Input` hold the value the
/// server returned for them.
#[derive(Clone, Debug, PartialEq)]
pub struct SqlParameter {
    /// Name without the leading `@`
    pub name: String,
    pub sql_type: SqlDbType,
    pub size: i32,
    pub precision: u8,
    pub scale: u8,
    pub value: CellValue,
    pub direction: ParameterDirection,
}

impl SqlParameter {
    /// Create an input parameter. A leading `@` in `name` is stripped.
    pub fn new(name: &str, sql_type: SqlDbType, value: impl Into<CellValue>) -> Self {
        Self {
            name: name.trim_start_matches('@').to_string(),
            sql_type,
            size: 0,
            precision: 0,
            scale: 0,
            value: value.into(),
            direction: ParameterDirection::Input,
        }
    }

    pub fn output(name: &str, sql_type: SqlDbType) -> Self {
        Self::new(name, sql_type, CellValue::Null).with_direction(ParameterDirection::Output)
    }

    pub fn return_value() -> Self {
        Self::new(RETURN_VALUE_NAME, SqlDbType::Int, CellValue::Null)
            .with_direction(ParameterDirection::ReturnValue)
    }

    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Type text used when the parameter is declared in a batch
    pub fn declaration(&self) -> String {
        self.sql_type.declaration(self.size, self.precision, self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_strips_at_sign() {
        let p = SqlParameter::new("@Skip", SqlDbType::Int, 10);
        assert_eq!(p.name, "Skip");
        assert_eq!(p.value, CellValue::Int(10));
        assert_eq!(p.direction, ParameterDirection::Input);
    }

    #[test]
    fn test_output_parameter() {
        let p = SqlParameter::output("Total", SqlDbType::BigInt);
        assert!(p.value.is_null());
        assert!(p.direction.is_written_back());
    }

    #[test]
    fn test_declaration_uses_size() {
        let p = SqlParameter::new("Name", SqlDbType::NVarChar, "x").with_size(100);
        assert_eq!(p.declaration(), "nvarchar(100)");
    }
}
