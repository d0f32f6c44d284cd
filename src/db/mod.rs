//! Database module: driver abstraction, SQL Server backend and the query facade

mod batch;
mod database;
mod driver;
mod parameter;
mod query;
pub mod sqlserver;
mod types;

pub use batch::*;
pub use database::*;
pub use driver::*;
pub use parameter::*;
pub use query::*;
pub use types::*;
