//! Database metadata model and its load
//!
//! A load runs the five catalog stages in order. Each stage is isolated: its
//! failure is recorded in [`SqlDatabase::errors`] and the next stage still runs,
//! so a failed load leaves every entity it did parse in place.

use crate::db::{Command, DatabaseDriver};
use crate::error::{DalError, Result};
use crate::impl_map_row;
use crate::mapper::{MapRow, RowMapper, UnmappedColumns};
use crate::schema::catalog::Stage;
use crate::schema::{Column, Constraint, Table};
use serde::Serialize;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// A stored procedure or function body
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Routine {
    pub name: String,
    pub body: String,
}

/// Metadata of one database. Every map keeps the order the catalog returned its entries in.
#[derive(Debug, Default)]
pub struct SqlDatabase {
    pub name: String,
    pub tables: IndexMap<String, Table>,
    pub stored_procedures: IndexMap<String, Routine>,
    pub functions: IndexMap<String, Routine>,
    /// Keyed by constraint name
    pub constraints: IndexMap<String, Constraint>,
    /// Failures of the last load, in stage order
    pub errors: Vec<DalError>,
}

#[derive(Default)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    data_type: String,
    length: i32,
    precision: i32,
    scale: i32,
    is_nullable: bool,
    is_pk: bool,
    is_identity: bool,
    column_ordinal: i32,
}

impl_map_row!(ColumnRow {
    table_name as "TableName",
    column_name as "ColumnName",
    data_type as "DataType",
    length as "Length",
    precision as "Precision",
    scale as "Scale",
    is_nullable as "IsNullable",
    is_pk as "IsPK",
    is_identity as "IsIdentity",
    column_ordinal as "ColumnOrdinal",
});

#[derive(Default)]
struct RoutineRow {
    name: String,
    body: String,
}

impl_map_row!(RoutineRow { name as "Name", body as "Body" });

#[derive(Default)]
struct ConstraintRow {
    constraint_name: String,
    fk_table: String,
    fk_column: String,
    pk_table: String,
    pk_column: String,
}

impl_map_row!(ConstraintRow {
    constraint_name as "ConstraintName",
    fk_table as "FKTable",
    fk_column as "FKColumn",
    pk_table as "PKTable",
    pk_column as "PKColumn",
});

#[derive(Default)]
struct DefaultValueRow {
    table_name: String,
    column_name: String,
    default_value: String,
}

impl_map_row!(DefaultValueRow {
    table_name as "TableName",
    column_name as "ColumnName",
    default_value as "DefaultValue",
});

impl SqlDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything from a previous load
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Replace the model with the metadata of `database_name`.
    ///
    /// Returns true when every stage succeeded. Failures are in [`Self::errors`].
    pub async fn load(&mut self, driver: &dyn DatabaseDriver, database_name: &str) -> bool {
        self.reset();

        if database_name.trim().is_empty() {
            self.errors
                .push(DalError::InvalidArgument("Database name is null or empty".to_string()));
            return false;
        }
        self.name = database_name.to_string();

        for stage in Stage::ALL {
            let outcome = match stage {
                Stage::Columns => self.load_columns(driver).await,
                Stage::StoredProcedures | Stage::Functions => self.load_routines(driver, stage).await,
                Stage::Constraints => self.load_constraints(driver).await,
                Stage::DefaultValues => self.load_default_values(driver).await,
            };
            if let Err(e) = outcome {
                warn!(database = %self.name, stage = stage.name(), error = %e, "metadata stage failed");
                self.errors.push(e);
            }
        }

        info!(
            database = %self.name,
            tables = self.tables.len(),
            stored_procedures = self.stored_procedures.len(),
            functions = self.functions.len(),
            constraints = self.constraints.len(),
            errors = self.errors.len(),
            "metadata loaded"
        );
        self.errors.is_empty()
    }

    #[instrument(skip_all, fields(database = %self.name))]
    async fn load_columns(&mut self, driver: &dyn DatabaseDriver) -> Result<()> {
        let rows: Vec<ColumnRow> = fetch(driver, Stage::Columns, &self.name).await?;
        debug!(rows = rows.len(), "column rows");

        for row in rows {
            let table = self
                .tables
                .entry(row.table_name.clone())
                .or_insert_with(|| Table::new(self.name.clone(), row.table_name.clone()));

            if table.columns.contains_key(&row.column_name) {
                return Err(DalError::duplicate_column(row.column_name, row.table_name));
            }

            let column = Column {
                table: row.table_name,
                name: row.column_name.clone(),
                data_type: row.data_type,
                length: row.length,
                precision: row.precision,
                scale: row.scale,
                is_nullable: row.is_nullable,
                is_pk: row.is_pk,
                is_identity: row.is_identity,
                ordinal: row.column_ordinal,
                default_value: String::new(),
            };
            table.columns.insert(row.column_name, column);
        }

        Ok(())
    }

    #[instrument(skip(self, driver), fields(database = %self.name))]
    async fn load_routines(&mut self, driver: &dyn DatabaseDriver, stage: Stage) -> Result<()> {
        let rows: Vec<RoutineRow> = fetch(driver, stage, &self.name).await?;
        debug!(rows = rows.len(), "routine rows");

        let routines = match stage {
            Stage::Functions => &mut self.functions,
            _ => &mut self.stored_procedures,
        };

        // long bodies arrive as several fragments under one name
        for row in rows {
            routines
                .entry(row.name.clone())
                .or_insert_with(|| Routine {
                    name: row.name,
                    body: String::new(),
                })
                .body
                .push_str(&row.body);
        }

        Ok(())
    }

    #[instrument(skip_all, fields(database = %self.name))]
    async fn load_constraints(&mut self, driver: &dyn DatabaseDriver) -> Result<()> {
        let rows: Vec<ConstraintRow> = fetch(driver, Stage::Constraints, &self.name).await?;
        debug!(rows = rows.len(), "constraint rows");

        for row in rows {
            if self.constraints.contains_key(&row.constraint_name) {
                return Err(DalError::duplicate_constraint(row.constraint_name));
            }
            let constraint = Constraint::new(
                row.constraint_name.clone(),
                row.fk_table,
                row.fk_column,
                row.pk_table,
                row.pk_column,
            );
            self.constraints.insert(row.constraint_name, constraint);
        }

        Ok(())
    }

    #[instrument(skip_all, fields(database = %self.name))]
    async fn load_default_values(&mut self, driver: &dyn DatabaseDriver) -> Result<()> {
        let rows: Vec<DefaultValueRow> = fetch(driver, Stage::DefaultValues, &self.name).await?;
        debug!(rows = rows.len(), "default value rows");

        for row in rows {
            let column = self
                .tables
                .get_mut(&row.table_name)
                .and_then(|t| t.columns.get_mut(&row.column_name));
            // defaults of tables the column stage skipped are ignored
            if let Some(column) = column {
                column.default_value = strip_wrapping(&row.default_value).to_string();
            }
        }

        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Constraints that reference `table` on either side
    pub fn table_constraints(&self, table: &str) -> Vec<&Constraint> {
        self.constraints.values().filter(|c| c.involves(table)).collect()
    }

    /// Constraints with structural duplicates removed, first name wins
    pub fn unique_constraints(&self) -> Vec<&Constraint> {
        let mut seen = HashSet::new();
        self.constraints.values().filter(|c| seen.insert(*c)).collect()
    }
}

/// Run a stage query and map its rows.
///
/// A result without columns is an empty catalog. Otherwise every column the row
/// type maps must be present.
async fn fetch<T: MapRow>(driver: &dyn DatabaseDriver, stage: Stage, database: &str) -> Result<Vec<T>> {
    let command = Command::text(stage.query(database));
    let result = driver.execute(&command, &mut []).await?;

    if result.columns.is_empty() {
        return Ok(Vec::new());
    }

    let mapping = T::row_mapping();
    let missing: Vec<&str> = mapping
        .column_names()
        .filter(|c| result.column_index(c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(DalError::catalog(
            stage.name(),
            format!("result is missing column(s) {}", missing.join(", ")),
        ));
    }

    RowMapper::new(mapping)?.map(&result, UnmappedColumns::Lenient)
}

/// Remove up to two levels of wrapping parentheses or single quotes.
///
/// A level is stripped when the value starts with `(` or `'`; the first and last
/// characters are dropped without checking that they pair up.
pub fn strip_wrapping(input: &str) -> &str {
    let mut value = input;
    for _ in 0..2 {
        match strip_once(value) {
            Some(inner) => value = inner,
            None => break,
        }
    }
    value
}

fn strip_once(value: &str) -> Option<&str> {
    let mut chars = value.chars();
    match chars.next()? {
        '(' | '\'' => {}
        _ => return None,
    }
    chars.next_back()?;
    Some(chars.as_str())
}
