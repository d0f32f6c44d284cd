//! Query facade
//!
//! Wraps a [`DatabaseDriver`] with the typed entry points callers use: raw
//! results, rows mapped onto a [`MapRow`] type, row counts and single values.

use crate::db::driver::{Command, DatabaseDriver};
use crate::db::parameter::SqlParameter;
use crate::db::query::{CellValue, QueryResult};
use crate::error::{DalError, Result};
use crate::mapper::{short_type_name, CellError, FromCell, MapRow, RowMapper, UnmappedColumns};
use tracing::debug;

/// Typed access to one database connection
pub struct Database {
    driver: Box<dyn DatabaseDriver>,
}

impl Database {
    pub fn new(driver: Box<dyn DatabaseDriver>) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &dyn DatabaseDriver {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn DatabaseDriver {
        self.driver.as_mut()
    }

    /// Run a statement and return its first result set untouched
    pub async fn query_raw(&self, sql: &str, params: &mut [SqlParameter]) -> Result<QueryResult> {
        self.run(&command_for(sql, Command::text)?, params).await
    }

    /// Run a stored procedure and return its first result set untouched
    pub async fn query_raw_sp(&self, procedure: &str, params: &mut [SqlParameter]) -> Result<QueryResult> {
        self.run(&command_for(procedure, Command::stored_procedure)?, params)
            .await
    }

    /// Run a statement and map every row onto `T`. Unknown columns are an error.
    pub async fn query<T: MapRow>(&self, sql: &str, params: &mut [SqlParameter]) -> Result<Vec<T>> {
        let command = command_for(sql, Command::text)?;
        self.query_with_policy(&command, params, UnmappedColumns::Strict)
            .await
    }

    /// Run a stored procedure and map every row onto `T`. Unknown columns are an error.
    pub async fn query_sp<T: MapRow>(&self, procedure: &str, params: &mut [SqlParameter]) -> Result<Vec<T>> {
        let command = command_for(procedure, Command::stored_procedure)?;
        self.query_with_policy(&command, params, UnmappedColumns::Strict)
            .await
    }

    pub async fn query_with_policy<T: MapRow>(
        &self,
        command: &Command,
        params: &mut [SqlParameter],
        policy: UnmappedColumns,
    ) -> Result<Vec<T>> {
        let mapper = RowMapper::<T>::for_type()?;
        let result = self.run(command, params).await?;
        let rows = mapper.map(&result, policy)?;
        debug!(target_type = mapper.target(), rows = rows.len(), "mapped query result");
        Ok(rows)
    }

    /// Run a statement and hand the raw result to `processor`
    pub async fn query_with<R, F>(&self, sql: &str, params: &mut [SqlParameter], processor: F) -> Result<R>
    where
        F: FnOnce(&QueryResult) -> Result<R>,
    {
        let result = self.query_raw(sql, params).await?;
        processor(&result)
    }

    /// Run a statement and return the number of rows affected
    pub async fn non_query(&self, sql: &str, params: &mut [SqlParameter]) -> Result<u64> {
        let command = command_for(sql, Command::text)?;
        self.run_non_query(&command, params).await
    }

    pub async fn non_query_sp(&self, procedure: &str, params: &mut [SqlParameter]) -> Result<u64> {
        let command = command_for(procedure, Command::stored_procedure)?;
        self.run_non_query(&command, params).await
    }

    /// First cell of the first row, or `None` when the statement returned no rows
    pub async fn scalar<T: FromCell>(&self, sql: &str, params: &mut [SqlParameter]) -> Result<Option<T>> {
        let result = self.query_raw(sql, params).await?;
        first_cell(&result)
    }

    pub async fn scalar_sp<T: FromCell>(&self, procedure: &str, params: &mut [SqlParameter]) -> Result<Option<T>> {
        let result = self.query_raw_sp(procedure, params).await?;
        first_cell(&result)
    }

    async fn run(&self, command: &Command, params: &mut [SqlParameter]) -> Result<QueryResult> {
        debug!(kind = ?command.kind, text = %command.text, parameters = params.len(), "query");
        self.driver.execute(command, params).await
    }

    async fn run_non_query(&self, command: &Command, params: &mut [SqlParameter]) -> Result<u64> {
        debug!(kind = ?command.kind, text = %command.text, parameters = params.len(), "non-query");
        let affected = self.driver.execute_non_query(command, params).await?;
        debug!(affected, "non-query complete");
        Ok(affected)
    }
}

fn command_for(text: &str, build: fn(String) -> Command) -> Result<Command> {
    if text.trim().is_empty() {
        return Err(DalError::InvalidArgument("SQL text is null or empty".to_string()));
    }
    Ok(build(text.to_string()))
}

fn first_cell<T: FromCell>(result: &QueryResult) -> Result<Option<T>> {
    let Some(row) = result.rows.first() else {
        return Ok(None);
    };
    let cell = row.first().unwrap_or(&CellValue::Null);
    let column = result
        .columns
        .first()
        .map(|c| c.name.clone())
        .unwrap_or_default();
    let declared_type = short_type_name(std::any::type_name::<T>());

    T::from_cell(cell).map(Some).map_err(|e| match e {
        CellError::Unsupported => DalError::Mapping {
            target: "scalar",
            field: column,
            declared_type,
            reason: "unsupported data type".to_string(),
        },
        CellError::Incompatible => DalError::Conversion {
            column,
            target: "scalar",
            declared_type,
            found: cell.kind(),
            detail: None,
        },
        CellError::Invalid(detail) => DalError::Conversion {
            column,
            target: "scalar",
            declared_type,
            found: cell.kind(),
            detail: Some(detail),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CommandKind, SqlDbType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replays a canned result and counts stored procedure calls
    #[derive(Default)]
    struct FakeDriver {
        result: QueryResult,
        affected: u64,
        procedures: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DatabaseDriver for FakeDriver {
        async fn test_connection(&self) -> Result<bool> {
            Ok(true)
        }

        async fn reconnect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, command: &Command, params: &mut [SqlParameter]) -> Result<QueryResult> {
            if command.kind == CommandKind::StoredProcedure {
                self.procedures.fetch_add(1, Ordering::SeqCst);
            }
            for param in params.iter_mut().filter(|p| p.direction.is_written_back()) {
                param.value = CellValue::Int(42);
            }
            Ok(self.result.clone())
        }

        async fn execute_non_query(&self, command: &Command, _params: &mut [SqlParameter]) -> Result<u64> {
            if command.kind == CommandKind::StoredProcedure {
                self.procedures.fetch_add(1, Ordering::SeqCst);
            }
            Ok(self.affected)
        }

        fn database_name(&self) -> String {
            "fake".to_string()
        }

        async fn get_databases(&self) -> Result<Vec<String>> {
            Ok(vec!["fake".to_string()])
        }
    }

    #[derive(Debug, Default)]
    struct Product {
        id: i32,
        name: String,
    }

    crate::impl_map_row!(Product { id as "Id", name as "Name" });

    fn products() -> QueryResult {
        QueryResult::from_rows(
            ["Id", "Name"],
            vec![
                vec![CellValue::Int(1), CellValue::String("bolt".into())],
                vec![CellValue::Int(2), CellValue::String("nut".into())],
            ],
        )
    }

    fn database(result: QueryResult) -> Database {
        Database::new(Box::new(FakeDriver {
            result,
            affected: 3,
            ..FakeDriver::default()
        }))
    }

    #[tokio::test]
    async fn test_typed_query() {
        let db = database(products());
        let rows: Vec<Product> = db.query("SELECT Id, Name FROM Products", &mut []).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, 2);
        assert_eq!(rows[1].name, "nut");
    }

    #[tokio::test]
    async fn test_typed_query_is_strict() {
        let mut result = products();
        result.columns.push(crate::db::ColumnInfo::new("Price", "MONEY"));
        let db = database(result);

        let err = db.query::<Product>("SELECT * FROM Products", &mut []).await.unwrap_err();
        assert!(matches!(err, DalError::UnmappedColumn { .. }));

        let rows: Vec<Product> = db
            .query_with_policy(&Command::text("SELECT * FROM Products"), &mut [], UnmappedColumns::Lenient)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_stored_procedure_writes_back_output() {
        let db = database(products());
        let mut params = [
            SqlParameter::new("@category", SqlDbType::Int, 7),
            SqlParameter::output("total", SqlDbType::Int),
        ];

        let rows: Vec<Product> = db.query_sp("dbo.GetProducts", &mut params).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(params[0].value, CellValue::Int(7));
        assert_eq!(params[1].value, CellValue::Int(42));
    }

    #[tokio::test]
    async fn test_command_kind_per_entry_point() {
        let procedures = Arc::new(AtomicUsize::new(0));
        let driver = FakeDriver {
            result: products(),
            procedures: procedures.clone(),
            ..FakeDriver::default()
        };
        let db = Database::new(Box::new(driver));
        db.query_raw("SELECT 1", &mut []).await.unwrap();
        db.non_query("UPDATE Products SET Name = Name", &mut []).await.unwrap();
        assert_eq!(procedures.load(Ordering::SeqCst), 0);

        db.query_raw_sp("GetProducts", &mut []).await.unwrap();
        db.non_query_sp("Purge", &mut []).await.unwrap();
        assert_eq!(procedures.load(Ordering::SeqCst), 2);
        assert_eq!(db.driver().database_name(), "fake");
        assert!(db.driver().test_connection().await.unwrap());
    }

    #[tokio::test]
    async fn test_blank_sql_rejected() {
        let db = database(products());
        let err = db.query_raw("   ", &mut []).await.unwrap_err();
        assert!(matches!(err, DalError::InvalidArgument(_)));
        assert!(db.non_query("", &mut []).await.is_err());
    }

    #[tokio::test]
    async fn test_non_query_returns_affected_rows() {
        let db = database(QueryResult::empty());
        let affected = db.non_query("DELETE FROM Products", &mut []).await.unwrap();
        assert_eq!(affected, 3);
    }

    #[tokio::test]
    async fn test_scalar() {
        let db = database(products());
        let id: Option<i64> = db.scalar("SELECT Id FROM Products", &mut []).await.unwrap();
        assert_eq!(id, Some(1));

        let empty = database(QueryResult::from_rows(["Id"], vec![]));
        let none: Option<i64> = empty.scalar("SELECT Id FROM Products", &mut []).await.unwrap();
        assert_eq!(none, None);

        let err = database(QueryResult::from_rows(["Name"], vec![vec![CellValue::String("x".into())]]))
            .scalar::<i64>("SELECT Name FROM Products", &mut [])
            .await
            .unwrap_err();
        assert!(matches!(err, DalError::Conversion { .. }));
    }

    #[tokio::test]
    async fn test_processor_sees_raw_result() {
        let db = database(products());
        let names = db
            .query_with("SELECT Id, Name FROM Products", &mut [], |result| {
                Ok(result
                    .rows
                    .iter()
                    .map(|row| row[1].to_string())
                    .collect::<Vec<_>>())
            })
            .await
            .unwrap();
        assert_eq!(names, vec!["bolt", "nut"]);
    }

    #[test]
    fn test_command_for() {
        let command = command_for("Purge", Command::stored_procedure).unwrap();
        assert_eq!(command.kind, CommandKind::StoredProcedure);
        assert!(command_for("", Command::text).is_err());
    }
}
