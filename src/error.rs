//! Error types for the data access layer

use thiserror::Error;

/// Errors raised while executing queries, mapping rows or loading catalog metadata.
#[derive(Error, Debug)]
pub enum DalError {
    /// The target type's mapping cannot be used as declared. Programmer error.
    #[error("Field '{field}' of type '{declared_type}' on '{target}' cannot be mapped: {reason}")]
    Mapping {
        target: &'static str,
        field: String,
        declared_type: String,
        reason: String,
    },

    /// Strict mapping found a result column with no matching field
    #[error("Cannot map result column '{column}' to a field on '{target}'")]
    UnmappedColumn { column: String, target: &'static str },

    /// A present cell could not be converted to the field's declared type
    #[error("Column '{column}' on '{target}': cannot convert {found} to '{declared_type}'{}", detail_suffix(.detail))]
    Conversion {
        column: String,
        target: &'static str,
        declared_type: String,
        found: &'static str,
        detail: Option<String>,
    },

    /// The same column twice in a table, or the same constraint name twice
    #[error("{kind} '{name}' already exists{}", owner_suffix(.owner))]
    DuplicateEntity {
        kind: &'static str,
        name: String,
        owner: Option<String>,
    },

    /// The server could not be reached or the session was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement level failure reported by the server
    #[error("Query error: {0}")]
    Query(String),

    /// A catalog result did not have the shape a load stage expects
    #[error("Catalog error in {stage}: {message}")]
    Catalog { stage: &'static str, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(" ({})", d)).unwrap_or_default()
}

fn owner_suffix(owner: &Option<String>) -> String {
    owner.as_ref().map(|o| format!(" in table {}", o)).unwrap_or_default()
}

impl DalError {
    pub fn duplicate_column(column: impl Into<String>, table: impl Into<String>) -> Self {
        DalError::DuplicateEntity {
            kind: "Column",
            name: column.into(),
            owner: Some(table.into()),
        }
    }

    pub fn duplicate_constraint(name: impl Into<String>) -> Self {
        DalError::DuplicateEntity {
            kind: "Constraint",
            name: name.into(),
            owner: None,
        }
    }

    pub fn catalog(stage: &'static str, message: impl Into<String>) -> Self {
        DalError::Catalog {
            stage,
            message: message.into(),
        }
    }
}

impl From<tiberius::error::Error> for DalError {
    fn from(e: tiberius::error::Error) -> Self {
        match e {
            tiberius::error::Error::Io { .. } => DalError::Connection(e.to_string()),
            other => DalError::Query(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_column_message() {
        let err = DalError::duplicate_column("Id", "Users");
        assert_eq!(err.to_string(), "Column 'Id' already exists in table Users");
    }

    #[test]
    fn test_duplicate_constraint_message() {
        let err = DalError::duplicate_constraint("FK_Orders_Users");
        assert_eq!(err.to_string(), "Constraint 'FK_Orders_Users' already exists");
    }

    #[test]
    fn test_conversion_message_with_detail() {
        let err = DalError::Conversion {
            column: "Age".into(),
            target: "Person",
            declared_type: "u8".into(),
            found: "Int",
            detail: Some("out of range".into()),
        };
        assert_eq!(
            err.to_string(),
            "Column 'Age' on 'Person': cannot convert Int to 'u8' (out of range)"
        );
    }
}
