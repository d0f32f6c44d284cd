//! Foreign key constraints

use crate::db::quote_identifier;
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// One foreign key relationship.
///
/// Equality and hashing cover the two table/column pairs only, so the same
/// relationship found under different names compares equal.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Constraint {
    pub name: String,
    /// Referencing side
    pub fk_table: String,
    pub fk_column: String,
    /// Referenced side
    pub pk_table: String,
    pub pk_column: String,
}

impl Constraint {
    pub fn new(
        name: impl Into<String>,
        fk_table: impl Into<String>,
        fk_column: impl Into<String>,
        pk_table: impl Into<String>,
        pk_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fk_table: fk_table.into(),
            fk_column: fk_column.into(),
            pk_table: pk_table.into(),
            pk_column: pk_column.into(),
        }
    }

    /// Deterministic across runs and platforms, unlike `std`'s hasher
    pub fn structural_hash(&self) -> u32 {
        (fnv1a(&self.fk_table).wrapping_mul(1709))
            ^ (fnv1a(&self.fk_column).wrapping_mul(1997))
            ^ (fnv1a(&self.pk_table).wrapping_mul(83))
            ^ (fnv1a(&self.pk_column).wrapping_mul(389))
    }

    /// Replace the name with `FK_<fk table>_<pk table>_<structural hash>`
    pub fn generate_constraint_name(&mut self) {
        self.name = format!("FK_{}_{}_{}", self.fk_table, self.pk_table, self.structural_hash());
    }

    /// Script that recreates this constraint
    pub fn generate_sql_script(&self) -> String {
        format!(
            "ALTER TABLE {}\nADD CONSTRAINT {}\nFOREIGN KEY ({})\nREFERENCES {} ({});\n",
            quote_identifier(&self.fk_table),
            quote_identifier(&self.name),
            quote_identifier(&self.fk_column),
            quote_identifier(&self.pk_table),
            quote_identifier(&self.pk_column),
        )
    }

    pub fn involves(&self, table: &str) -> bool {
        self.fk_table == table || self.pk_table == table
    }
}

fn fnv1a(text: &str) -> u32 {
    text.bytes()
        .fold(0x811c_9dc5u32, |hash, byte| (hash ^ byte as u32).wrapping_mul(0x0100_0193))
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.fk_table == other.fk_table
            && self.fk_column == other.fk_column
            && self.pk_table == other.pk_table
            && self.pk_column == other.pk_column
    }
}

impl Eq for Constraint {}

impl Hash for Constraint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fk_table.hash(state);
        self.fk_column.hash(state);
        self.pk_table.hash(state);
        self.pk_column.hash(state);
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}].[{}] = [{}].[{}]",
            self.pk_table, self.pk_column, self.fk_table, self.fk_column
        )
    }
}
