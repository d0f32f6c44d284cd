//! Tables of the metadata model
//!
//! Columns are kept in the order the catalog returned them, which is ordinal order.

use crate::schema::{Column, Constraint, SqlDatabase};
use indexmap::IndexMap;
use serde::Serialize;

/// A user table and its columns
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Table {
    /// Name of the owning database
    pub database: String,
    pub name: String,
    pub columns: IndexMap<String, Column>,
}

impl Table {
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            columns: IndexMap::new(),
        }
    }

    /// Columns flagged as part of the primary key, in ordinal order
    pub fn primary_keys(&self) -> Vec<&Column> {
        let mut keys: Vec<&Column> = self.columns.values().filter(|c| c.is_pk).collect();
        keys.sort_by_key(|c| c.ordinal);
        keys
    }

    /// Constraints of `database` that reference this table on either side
    pub fn constraints<'a>(&self, database: &'a SqlDatabase) -> Vec<&'a Constraint> {
        if database.name != self.database {
            return Vec::new();
        }
        database
            .constraints
            .values()
            .filter(|c| c.involves(&self.name))
            .collect()
    }

    /// Columns in ordinal order
    pub fn ordered_columns(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.values().collect();
        columns.sort_by_key(|c| c.ordinal);
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(table: &str, name: &str, ordinal: i32, is_pk: bool) -> Column {
        Column {
            ordinal,
            is_pk,
            ..Column::new(table, name)
        }
    }

    fn order_lines() -> Table {
        let mut table = Table::new("Shop", "OrderLines");
        for c in [
            column("OrderLines", "Quantity", 3, false),
            column("OrderLines", "OrderId", 1, true),
            column("OrderLines", "LineNo", 2, true),
        ] {
            table.columns.insert(c.name.clone(), c);
        }
        table
    }

    #[test]
    fn test_primary_keys() {
        let table = order_lines();
        let keys: Vec<&str> = table.primary_keys().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(keys, vec!["OrderId", "LineNo"]);
    }

    #[test]
    fn test_ordered_columns() {
        let table = order_lines();
        let names: Vec<&str> = table.ordered_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["OrderId", "LineNo", "Quantity"]);
    }

    #[test]
    fn test_related_constraints() {
        let mut db = SqlDatabase::new();
        db.name = "Shop".to_string();
        for c in [
            Constraint::new("FK_Lines_Orders", "OrderLines", "OrderId", "Orders", "Id"),
            Constraint::new("FK_Orders_Users", "Orders", "UserId", "Users", "Id"),
            Constraint::new("FK_Returns_Lines", "Returns", "LineId", "OrderLines", "Id"),
        ] {
            db.constraints.insert(c.name.clone(), c);
        }

        let table = order_lines();
        let names: Vec<&str> = table.constraints(&db).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["FK_Lines_Orders", "FK_Returns_Lines"]);

        let elsewhere = Table::new("Archive", "OrderLines");
        assert!(elsewhere.constraints(&db).is_empty());
    }
}
