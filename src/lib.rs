//! SQL Server data access layer
//!
//! Runs parameterized statements and stored procedures, maps result rows onto
//! typed structs and reads a database's catalog into an in-memory model.

pub mod config;
pub mod db;
pub mod error;
pub mod mapper;
pub mod schema;

pub use db::{Database, DatabaseDriver, SqlDbType, SqlParameter};
pub use error::{DalError, Result};
pub use mapper::{map_rows, FromCell, MapRow, RowMapper, RowMapping, UnmappedColumns};
pub use schema::SqlDatabase;
