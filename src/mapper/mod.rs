//! Generic relational mapper
//!
//! Turns a [`QueryResult`] into a `Vec<T>`, one `T` per row in cursor order. Each
//! result column is matched by exact, case-sensitive name against the descriptor
//! of `T`, and the cell is coerced with [`FromCell`] into the field's type.
//! Mapping is all-or-nothing: the first error aborts the call and no rows are
//! returned.

mod cell;
mod mapping;

pub use cell::*;
pub use mapping::*;

use crate::db::{CellValue, QueryResult};
use crate::error::{DalError, Result};
use std::collections::HashMap;
use tracing::trace;

/// What to do with a result column that no field maps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnmappedColumns {
    /// Fail with [`DalError::UnmappedColumn`]
    Strict,
    /// Skip the column
    Lenient,
}

/// A validated descriptor with its name lookup, reusable across results
pub struct RowMapper<T> {
    mapping: RowMapping<T>,
    lookup: HashMap<String, usize>,
}

impl<T: MapRow> RowMapper<T> {
    pub fn for_type() -> Result<Self> {
        Self::new(T::row_mapping())
    }
}

impl<T: Default> RowMapper<T> {
    /// Validate `mapping`. A column bound twice is a mapping error.
    pub fn new(mapping: RowMapping<T>) -> Result<Self> {
        let mut lookup = HashMap::with_capacity(mapping.fields().len());

        for (index, field) in mapping.fields().iter().enumerate() {
            if lookup.insert(field.column.clone(), index).is_some() {
                return Err(DalError::Mapping {
                    target: mapping.target(),
                    field: field.field.clone(),
                    declared_type: field.declared_type.clone(),
                    reason: format!("column '{}' is mapped more than once", field.column),
                });
            }
        }

        Ok(Self { mapping, lookup })
    }

    pub fn target(&self) -> &'static str {
        self.mapping.target()
    }

    /// Map every row of `result`
    pub fn map(&self, result: &QueryResult, policy: UnmappedColumns) -> Result<Vec<T>> {
        let fields = self.mapping.fields();
        let slots: Vec<Option<&FieldMapping<T>>> = result
            .columns
            .iter()
            .map(|c| self.lookup.get(c.name.as_str()).map(|&i| &fields[i]))
            .collect();

        let mut output = Vec::with_capacity(result.rows.len());

        for row in &result.rows {
            let mut item = T::default();

            for (index, column) in result.columns.iter().enumerate() {
                let Some(field) = slots[index] else {
                    if policy == UnmappedColumns::Strict {
                        return Err(DalError::UnmappedColumn {
                            column: column.name.clone(),
                            target: self.target(),
                        });
                    }
                    continue;
                };

                let cell = row.get(index).unwrap_or(&CellValue::Null);
                field
                    .apply(&mut item, cell)
                    .map_err(|e| self.cell_error(field, cell, e))?;
            }

            output.push(item);
        }

        trace!(target_type = self.target(), rows = output.len(), "mapped rows");
        Ok(output)
    }

    fn cell_error(&self, field: &FieldMapping<T>, cell: &CellValue, error: CellError) -> DalError {
        match error {
            CellError::Unsupported => DalError::Mapping {
                target: self.target(),
                field: field.field.clone(),
                declared_type: field.declared_type.clone(),
                reason: "unsupported data type".to_string(),
            },
            CellError::Incompatible => DalError::Conversion {
                column: field.column.clone(),
                target: self.target(),
                declared_type: field.declared_type.clone(),
                found: cell.kind(),
                detail: None,
            },
            CellError::Invalid(detail) => DalError::Conversion {
                column: field.column.clone(),
                target: self.target(),
                declared_type: field.declared_type.clone(),
                found: cell.kind(),
                detail: Some(detail),
            },
        }
    }
}

/// Map `result` onto `T` with a descriptor built for this call
pub fn map_rows<T: MapRow>(result: &QueryResult, policy: UnmappedColumns) -> Result<Vec<T>> {
    RowMapper::<T>::for_type()?.map(result, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    crate::sql_enum! {
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
        enum AccountState {
            #[default]
            Active = 1,
            Suspended = 2,
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Account {
        id: i64,
        name: String,
        balance: Option<f64>,
        state: AccountState,
        opened: Option<NaiveDateTime>,
    }

    crate::impl_map_row!(Account {
        id as "Id",
        name as "Name",
        balance as "Balance",
        state as "State",
        opened as "Opened",
    });

    fn accounts() -> QueryResult {
        QueryResult::from_rows(
            ["Id", "Name", "Balance", "State", "Opened"],
            vec![
                vec![
                    CellValue::Int(1),
                    CellValue::String("alpha".into()),
                    CellValue::Float(10.5),
                    CellValue::Int(1),
                    CellValue::DateTime("2023-01-02 03:04:05".into()),
                ],
                vec![
                    CellValue::Int(2),
                    CellValue::Null,
                    CellValue::Null,
                    CellValue::Int(2),
                    CellValue::Null,
                ],
            ],
        )
    }

    #[test]
    fn test_maps_every_row_in_order() {
        let rows: Vec<Account> = map_rows(&accounts(), UnmappedColumns::Strict).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].name, "alpha");
        assert_eq!(rows[0].balance, Some(10.5));
        assert_eq!(rows[0].state, AccountState::Active);
        assert_eq!(
            rows[0].opened.map(|d| d.to_string()),
            Some("2023-01-02 03:04:05".to_string())
        );

        assert_eq!(rows[1].id, 2);
        assert_eq!(rows[1].name, "");
        assert_eq!(rows[1].balance, None);
        assert_eq!(rows[1].state, AccountState::Suspended);
        assert_eq!(rows[1].opened, None);
    }

    #[test]
    fn test_strict_rejects_unknown_column() {
        let mut result = accounts();
        result.columns.push(crate::db::ColumnInfo::new("Extra", ""));
        for row in &mut result.rows {
            row.push(CellValue::Int(0));
        }

        let err = map_rows::<Account>(&result, UnmappedColumns::Strict).unwrap_err();
        match err {
            DalError::UnmappedColumn { column, target } => {
                assert_eq!(column, "Extra");
                assert_eq!(target, "Account");
            }
            other => panic!("unexpected error: {other}"),
        }

        let rows = map_rows::<Account>(&result, UnmappedColumns::Lenient).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "alpha");
        assert_eq!(rows[1].state, AccountState::Suspended);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let result = QueryResult::from_rows(["id"], vec![vec![CellValue::Int(5)]]);
        assert!(matches!(
            map_rows::<Account>(&result, UnmappedColumns::Strict),
            Err(DalError::UnmappedColumn { .. })
        ));
        let rows = map_rows::<Account>(&result, UnmappedColumns::Lenient).unwrap();
        assert_eq!(rows[0].id, 0);
    }

    #[test]
    fn test_conversion_failure_returns_no_rows() {
        let result = QueryResult::from_rows(
            ["Id", "State"],
            vec![
                vec![CellValue::Int(1), CellValue::Int(1)],
                vec![CellValue::Int(2), CellValue::Int(99)],
            ],
        );
        let err = map_rows::<Account>(&result, UnmappedColumns::Strict).unwrap_err();
        match err {
            DalError::Conversion { column, declared_type, found, .. } => {
                assert_eq!(column, "State");
                assert_eq!(declared_type, "AccountState");
                assert_eq!(found, "Int");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_incompatible_cell_names_column() {
        let result = QueryResult::from_rows(["Id"], vec![vec![CellValue::String("x".into())]]);
        let err = map_rows::<Account>(&result, UnmappedColumns::Lenient).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Column 'Id' on 'Account': cannot convert String to 'i64'"
        );
    }

    #[test]
    fn test_empty_result() {
        let result = QueryResult::from_rows(["Nope"], vec![]);
        let rows = map_rows::<Account>(&result, UnmappedColumns::Strict).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_duplicate_column_is_mapping_error() {
        let mapping = RowMapping::<Account>::new("Account")
            .field("Id", |a: &mut Account, v| a.id = v)
            .field("Id", |a: &mut Account, v: i64| a.id = v + 1);
        assert!(matches!(RowMapper::new(mapping), Err(DalError::Mapping { .. })));
    }

    #[derive(Default)]
    struct Geometry;

    struct Shape(Geometry);

    impl FromCell for Shape {
        fn from_value(_: &CellValue) -> std::result::Result<Self, CellError> {
            Err(CellError::Unsupported)
        }

        fn from_missing() -> std::result::Result<Self, CellError> {
            Ok(Shape(Geometry))
        }
    }

    #[derive(Default)]
    struct Parcel {
        outline: Option<Geometry>,
    }

    #[test]
    fn test_unsupported_type_is_mapping_error() {
        let mapping = RowMapping::<Parcel>::new("Parcel")
            .named_field("Outline", "outline", |p: &mut Parcel, v: Shape| p.outline = Some(v.0));
        let mapper = RowMapper::new(mapping).unwrap();
        let result = QueryResult::from_rows(["Outline"], vec![vec![CellValue::Binary(vec![1])]]);

        match mapper.map(&result, UnmappedColumns::Strict) {
            Err(DalError::Mapping { field, declared_type, .. }) => {
                assert_eq!(field, "outline");
                assert!(declared_type.ends_with("Shape"));
            }
            _ => panic!("expected mapping error"),
        }
    }

    #[test]
    fn test_mapper_is_reusable() {
        let mapper = RowMapper::<Account>::for_type().unwrap();
        let first = mapper.map(&accounts(), UnmappedColumns::Strict).unwrap();
        let second = mapper.map(&accounts(), UnmappedColumns::Strict).unwrap();
        assert_eq!(first, second);
    }
}
