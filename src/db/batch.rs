//! T-SQL batch generation for parameterized commands
//!
//! tiberius only binds positional `@P1..@Pn` placeholders, so named parameters
//! are declared as local variables initialised from the positional ones. Output
//! parameters are selected back as the last result set of the batch.

use crate::db::driver::{Command, CommandKind};
use crate::db::parameter::{ParameterDirection, SqlParameter};
use crate::db::query::{CellValue, QueryResult};
use crate::error::{DalError, Result};

/// Column carrying `@@ROWCOUNT` in the trailing result set of a non-query batch
pub const ROW_COUNT_COLUMN: &str = "__rows_affected";

/// A generated batch ready to be sent to the server
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub sql: String,
    /// Values for `@P1..@Pn`, in order
    pub binds: Vec<CellValue>,
    /// Indices into the parameter slice of parameters selected back by the trailer
    pub written_back: Vec<usize>,
    pub captures_row_count: bool,
}

impl Batch {
    /// Whether the last result set of the batch belongs to the batch itself
    pub fn has_trailer(&self) -> bool {
        !self.written_back.is_empty() || self.captures_row_count
    }

    /// Copy the values of the trailing result set into the written-back parameters.
    ///
    /// Returns the captured row count when the batch asked for one.
    pub fn apply_trailer(&self, params: &mut [SqlParameter], trailer: &QueryResult) -> Result<Option<u64>> {
        let row = trailer.rows.first().ok_or_else(|| {
            DalError::Query("output parameter result set is empty".to_string())
        })?;

        for &index in &self.written_back {
            let param = &mut params[index];
            let column = trailer.column_index(&param.name).ok_or_else(|| {
                DalError::Query(format!("no value returned for output parameter @{}", param.name))
            })?;
            param.value = row[column].clone();
        }

        if !self.captures_row_count {
            return Ok(None);
        }

        let rows = trailer
            .column_index(ROW_COUNT_COLUMN)
            .map(|i| &row[i])
            .and_then(|cell| match cell {
                CellValue::Int(v) => u64::try_from(*v).ok(),
                _ => None,
            })
            .unwrap_or(0);
        Ok(Some(rows))
    }
}

/// Quote an identifier with square brackets
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Reject anything that is not a plain T-SQL variable name.
///
/// The name is spliced into the batch text after `@`, so only letters, digits and
/// `_ @ # $` are allowed, and it must not start with a digit, `@` or `$`.
pub fn check_parameter_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_alphabetic() || first == '_' || first == '#')
                && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$'))
                && name.chars().count() <= 127
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DalError::InvalidArgument(format!("invalid parameter name '{}'", name)))
    }
}

/// Quote a possibly schema-qualified procedure name.
///
/// Parts already in brackets are kept when well formed; bare parts are quoted.
fn quote_procedure_name(name: &str) -> Result<String> {
    let invalid = || DalError::InvalidArgument(format!("invalid procedure name '{}'", name));
    let mut parts = Vec::new();
    let mut rest = name;

    loop {
        let (part, tail) = if let Some(inner) = rest.strip_prefix('[') {
            let end = closing_bracket(inner).ok_or_else(invalid)?;
            (format!("[{}]", &inner[..end]), &inner[end + 1..])
        } else {
            let end = rest.find('.').unwrap_or(rest.len());
            let bare = &rest[..end];
            if bare.is_empty() || bare.contains(['[', ']']) {
                return Err(invalid());
            }
            (quote_identifier(bare), &rest[end..])
        };
        parts.push(part);

        match tail.strip_prefix('.') {
            Some(next) => rest = next,
            None if tail.is_empty() => break,
            None => return Err(invalid()),
        }
    }

    Ok(parts.join("."))
}

/// Byte offset of the `]` closing a bracketed identifier, skipping `]]` escapes
fn closing_bracket(inner: &str) -> Option<usize> {
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b']' {
            if bytes.get(i + 1) == Some(&b']') {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Build the batch for `command`.
///
/// With `capture_row_count`, `@@ROWCOUNT` of the command body is returned as an
/// extra column of the trailing result set. Parameter and procedure names that
/// are not plain identifiers are rejected with `InvalidArgument`.
pub fn build_batch(command: &Command, params: &[SqlParameter], capture_row_count: bool) -> Result<Batch> {
    for param in params {
        check_parameter_name(&param.name)?;
    }

    let mut sql = String::new();
    let mut binds = Vec::new();
    let mut written_back = Vec::new();

    for (index, param) in params.iter().enumerate() {
        // a text batch has no return value
        if command.kind == CommandKind::Text && param.direction == ParameterDirection::ReturnValue {
            continue;
        }

        if param.direction == ParameterDirection::ReturnValue {
            sql.push_str(&format!("DECLARE @{} {};\n", param.name, param.declaration()));
        } else {
            binds.push(param.value.clone());
            sql.push_str(&format!(
                "DECLARE @{} {} = @P{};\n",
                param.name,
                param.declaration(),
                binds.len()
            ));
        }

        if param.direction.is_written_back() {
            written_back.push(index);
        }
    }

    let captures_row_count = capture_row_count && !written_back.is_empty();
    if captures_row_count {
        sql.push_str(&format!("DECLARE @{} int;\n", ROW_COUNT_COLUMN));
    }

    match command.kind {
        CommandKind::Text => {
            sql.push_str(command.text.trim_end().trim_end_matches(';'));
            sql.push_str(";\n");
        }
        CommandKind::StoredProcedure => {
            sql.push_str("EXEC ");
            if let Some(ret) = params.iter().find(|p| p.direction == ParameterDirection::ReturnValue) {
                sql.push_str(&format!("@{} = ", ret.name));
            }
            sql.push_str(&quote_procedure_name(command.text.trim())?);

            let arguments: Vec<String> = params
                .iter()
                .filter(|p| p.direction != ParameterDirection::ReturnValue)
                .map(|p| {
                    if p.direction.is_written_back() {
                        format!("@{0} = @{0} OUTPUT", p.name)
                    } else {
                        format!("@{0} = @{0}", p.name)
                    }
                })
                .collect();
            if !arguments.is_empty() {
                sql.push(' ');
                sql.push_str(&arguments.join(", "));
            }
            sql.push_str(";\n");
        }
    }

    if captures_row_count {
        sql.push_str(&format!("SET @{} = @@ROWCOUNT;\n", ROW_COUNT_COLUMN));
    }

    if !written_back.is_empty() {
        let mut selected: Vec<String> = written_back
            .iter()
            .map(|&i| format!("@{0} AS {1}", params[i].name, quote_identifier(&params[i].name)))
            .collect();
        if captures_row_count {
            selected.push(format!("@{0} AS {1}", ROW_COUNT_COLUMN, quote_identifier(ROW_COUNT_COLUMN)));
        }
        sql.push_str(&format!("SELECT {};\n", selected.join(", ")));
    }

    Ok(Batch {
        sql,
        binds,
        written_back,
        captures_row_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::SqlDbType;

    #[test]
    fn test_text_without_parameters_is_unchanged() {
        let batch = build_batch(&Command::text("SELECT 1"), &[], false).unwrap();
        assert_eq!(batch.sql, "SELECT 1;\n");
        assert!(batch.binds.is_empty());
        assert!(!batch.has_trailer());
    }

    #[test]
    fn test_text_declares_named_parameters() {
        let params = [SqlParameter::new("Skip", SqlDbType::Int, 5)];
        let batch = build_batch(&Command::text("SELECT * FROM T ORDER BY Id OFFSET @Skip ROWS"), &params, false).unwrap();
        assert_eq!(
            batch.sql,
            "DECLARE @Skip int = @P1;\nSELECT * FROM T ORDER BY Id OFFSET @Skip ROWS;\n"
        );
        assert_eq!(batch.binds, vec![CellValue::Int(5)]);
    }

    #[test]
    fn test_stored_procedure_with_output_and_return_value() {
        let params = [
            SqlParameter::new("UserId", SqlDbType::Int, 7),
            SqlParameter::output("Total", SqlDbType::BigInt),
            SqlParameter::return_value(),
        ];
        let batch = build_batch(&Command::stored_procedure("dbo.GetTotals"), &params, false).unwrap();

        assert_eq!(
            batch.sql,
            "DECLARE @UserId int = @P1;\n\
             DECLARE @Total bigint = @P2;\n\
             DECLARE @RETURN_VALUE int;\n\
             EXEC @RETURN_VALUE = [dbo].[GetTotals] @UserId = @UserId, @Total = @Total OUTPUT;\n\
             SELECT @Total AS [Total], @RETURN_VALUE AS [RETURN_VALUE];\n"
        );
        assert_eq!(batch.binds, vec![CellValue::Int(7), CellValue::Null]);
        assert_eq!(batch.written_back, vec![1, 2]);
    }

    #[test]
    fn test_return_value_ignored_for_text() {
        let params = [SqlParameter::return_value()];
        let batch = build_batch(&Command::text("SELECT 1"), &params, false).unwrap();
        assert_eq!(batch.sql, "SELECT 1;\n");
        assert!(batch.written_back.is_empty());
    }

    #[test]
    fn test_apply_trailer_writes_back() {
        let mut params = [
            SqlParameter::new("UserId", SqlDbType::Int, 7),
            SqlParameter::output("Total", SqlDbType::BigInt),
        ];
        let batch = build_batch(&Command::stored_procedure("GetTotals"), &params, true).unwrap();
        assert!(batch.captures_row_count);

        let trailer = QueryResult::from_rows(
            ["Total", ROW_COUNT_COLUMN],
            vec![vec![CellValue::Int(42), CellValue::Int(3)]],
        );
        let rows = batch.apply_trailer(&mut params, &trailer).unwrap();

        assert_eq!(rows, Some(3));
        assert_eq!(params[1].value, CellValue::Int(42));
        assert_eq!(params[0].value, CellValue::Int(7));
    }

    #[test]
    fn test_apply_trailer_missing_column() {
        let mut params = [SqlParameter::output("Total", SqlDbType::Int)];
        let batch = build_batch(&Command::stored_procedure("P"), &params, false).unwrap();
        let trailer = QueryResult::from_rows(["Other"], vec![vec![CellValue::Int(1)]]);
        assert!(matches!(
            batch.apply_trailer(&mut params, &trailer),
            Err(DalError::Query(_))
        ));
    }

    #[test]
    fn test_parameter_name_is_checked() {
        let params = [SqlParameter::new("id int = 1; DROP TABLE Users; --", SqlDbType::Int, 1)];
        let result = build_batch(&Command::text("SELECT 1"), &params, false);
        assert!(matches!(result, Err(DalError::InvalidArgument(_))));

        for name in ["", "1st", "a b", "a-b", "x'y", "a]"] {
            assert!(check_parameter_name(name).is_err(), "{name}");
        }
        for name in ["Id", "_tmp", "#t", "Total$2", "Année"] {
            assert!(check_parameter_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_procedure_names() {
        assert_eq!(quote_procedure_name("dbo.GetTotals").unwrap(), "[dbo].[GetTotals]");
        assert_eq!(quote_procedure_name("[dbo].[Get Totals]").unwrap(), "[dbo].[Get Totals]");
        assert_eq!(quote_procedure_name("[a]]b].P").unwrap(), "[a]]b].[P]");
        assert_eq!(quote_procedure_name("Get;Totals").unwrap(), "[Get;Totals]");

        for name in ["[dbo].[P]; DROP TABLE Users", "[unclosed", "dbo..P", "a[b]"] {
            assert!(
                matches!(quote_procedure_name(name), Err(DalError::InvalidArgument(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn test_quote_identifier_escapes_bracket() {
        assert_eq!(quote_identifier("a]b"), "[a]]b]");
    }
}
