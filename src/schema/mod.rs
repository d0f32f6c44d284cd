//! Schema metadata model
//!
//! Tables, columns, routines and foreign keys of one database, read from the
//! SQL Server catalog. Back-references are held as names.

mod catalog;
mod column;
mod constraint;
mod database;
mod table;

pub use catalog::Stage;
pub use column::{BaseType, Column};
pub use constraint::Constraint;
pub use database::{strip_wrapping, Routine, SqlDatabase};
pub use table::Table;
