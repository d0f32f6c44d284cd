//! SQL Server driver implementation using tiberius

use crate::db::batch::{build_batch, Batch};
use crate::db::driver::{Command, DatabaseDriver};
use crate::db::parameter::SqlParameter;
use crate::db::query::{CellValue, ColumnInfo, QueryResult};
use crate::error::{DalError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tiberius::time::chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{
    numeric::Numeric, AuthMethod, Client, Column, ColumnData, ColumnType, Config, IntoSql, Query, QueryItem, Row,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// Configuration specific to SQL Server connections
#[derive(Clone, Debug)]
pub struct SqlServerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub encrypt: bool,
    pub trust_cert: bool,
}

impl Default for SqlServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            user: "sa".to_string(),
            password: String::new(),
            database: "master".to_string(),
            encrypt: false,
            trust_cert: true,
        }
    }
}

/// SQL Server driver
pub struct SqlServerDriver {
    client: Arc<Mutex<Client<Compat<TcpStream>>>>,
    pub config: SqlServerConfig,
}

impl SqlServerDriver {
    /// Create a new SQL Server connection
    pub async fn new(config: SqlServerConfig) -> Result<Self> {
        let client = Self::connect_internal(&config).await?;
        info!(host = %config.host, port = config.port, database = %config.database, "connected to SQL Server");
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            config,
        })
    }

    /// Internal TCP + TDS connection
    async fn connect_internal(cfg: &SqlServerConfig) -> Result<Client<Compat<TcpStream>>> {
        let mut config = Config::new();
        config.host(&cfg.host);
        config.port(cfg.port);
        config.database(&cfg.database);
        config.authentication(AuthMethod::sql_server(&cfg.user, &cfg.password));

        if cfg.trust_cert {
            config.trust_cert();
        }
        if !cfg.encrypt {
            config.encryption(tiberius::EncryptionLevel::NotSupported);
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DalError::Connection(format!("Failed to connect to SQL Server: {}", e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| DalError::Connection(e.to_string()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| DalError::Connection(format!("Failed to authenticate with SQL Server: {}", e)))?;

        Ok(client)
    }

    fn prepare<'a>(batch: &'a Batch) -> Query<'a> {
        let mut query = Query::new(batch.sql.as_str());
        for value in &batch.binds {
            query.bind(bind_cell(value));
        }
        query
    }

    /// Drain a query stream into one `QueryResult` per result set
    async fn collect_results(mut stream: tiberius::QueryStream<'_>) -> Result<Vec<QueryResult>> {
        let mut results: Vec<QueryResult> = Vec::new();

        while let Some(item) = stream.try_next().await? {
            match item {
                QueryItem::Metadata(meta) => {
                    let columns = meta
                        .columns()
                        .iter()
                        .map(|c| ColumnInfo::new(c.name(), format_column_type(c)))
                        .collect();
                    results.push(QueryResult {
                        columns,
                        ..QueryResult::default()
                    });
                }
                QueryItem::Row(row) => {
                    let cells = row
                        .columns()
                        .iter()
                        .enumerate()
                        .map(|(i, col)| extract_cell_value(&row, i, col))
                        .collect();
                    match results.last_mut() {
                        Some(current) => current.rows.push(cells),
                        None => return Err(DalError::Query("row received before result metadata".to_string())),
                    }
                }
            }
        }

        Ok(results)
    }

    async fn run_batch(&self, batch: &Batch) -> Result<Vec<QueryResult>> {
        debug!(sql = %batch.sql, parameters = batch.binds.len(), "executing batch");
        let mut client = self.client.lock().await;
        let stream = Self::prepare(batch).query(&mut *client).await?;
        Self::collect_results(stream).await
    }
}

#[async_trait]
impl DatabaseDriver for SqlServerDriver {
    async fn test_connection(&self) -> Result<bool> {
        let mut client = self.client.lock().await;
        let ok = client.simple_query("SELECT 1").await.is_ok();
        Ok(ok)
    }

    async fn reconnect(&mut self) -> Result<()> {
        let client = Self::connect_internal(&self.config).await?;
        *self.client.lock().await = client;
        Ok(())
    }

    async fn execute(&self, command: &Command, params: &mut [SqlParameter]) -> Result<QueryResult> {
        let start = Instant::now();
        let batch = build_batch(command, params, false)?;
        let mut results = self.run_batch(&batch).await?;

        if batch.has_trailer() {
            let trailer = results
                .pop()
                .ok_or_else(|| DalError::Query("missing output parameter result set".to_string()))?;
            batch.apply_trailer(params, &trailer)?;
        }

        let mut result = results.into_iter().next().unwrap_or_default();
        result.execution_time = start.elapsed();
        debug!(rows = result.row_count(), elapsed_ms = result.execution_time.as_millis() as u64, "query complete");
        Ok(result)
    }

    async fn execute_non_query(&self, command: &Command, params: &mut [SqlParameter]) -> Result<u64> {
        let batch = build_batch(command, params, true)?;

        if batch.has_trailer() {
            let mut results = self.run_batch(&batch).await?;
            let trailer = results
                .pop()
                .ok_or_else(|| DalError::Query("missing output parameter result set".to_string()))?;
            return Ok(batch.apply_trailer(params, &trailer)?.unwrap_or(0));
        }

        debug!(sql = %batch.sql, parameters = batch.binds.len(), "executing non-query batch");
        let mut client = self.client.lock().await;
        let outcome = Self::prepare(&batch).execute(&mut *client).await?;
        Ok(outcome.total())
    }

    fn database_name(&self) -> String {
        self.config.database.clone()
    }

    async fn get_databases(&self) -> Result<Vec<String>> {
        let mut client = self.client.lock().await;
        let stream = client
            .simple_query("SELECT name FROM sys.databases WHERE state = 0 ORDER BY name")
            .await?;
        let rows = stream.into_first_result().await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<&str, _>(0).ok().flatten())
            .map(str::to_string)
            .collect())
    }
}

/// A parameter value already converted to its TDS form
struct BoundValue(ColumnData<'static>);

impl<'a> IntoSql<'a> for BoundValue {
    fn into_sql(self) -> ColumnData<'a> {
        self.0
    }
}

fn bind_cell(value: &CellValue) -> BoundValue {
    BoundValue(match value {
        CellValue::Null => ColumnData::String(None),
        CellValue::Bool(v) => ColumnData::Bit(Some(*v)),
        CellValue::Int(v) => ColumnData::I64(Some(*v)),
        CellValue::Float(v) => ColumnData::F64(Some(*v)),
        // sent as text and converted by the declared decimal variable
        CellValue::Decimal(v) => ColumnData::String(Some(v.to_string().into())),
        CellValue::String(v) | CellValue::DateTime(v) => ColumnData::String(Some(v.clone().into())),
        CellValue::Guid(v) => ColumnData::Guid(Some(*v)),
        CellValue::Binary(v) => ColumnData::Binary(Some(v.clone().into())),
    })
}

fn format_column_type(col: &Column) -> String {
    match col.column_type() {
        ColumnType::Null => "NULL".to_string(),
        ColumnType::Bit | ColumnType::Bitn => "BIT".to_string(),
        ColumnType::Int1 => "TINYINT".to_string(),
        ColumnType::Int2 => "SMALLINT".to_string(),
        ColumnType::Int4 => "INT".to_string(),
        ColumnType::Int8 => "BIGINT".to_string(),
        ColumnType::Intn => "INT".to_string(),
        ColumnType::Float4 => "REAL".to_string(),
        ColumnType::Float8 | ColumnType::Floatn => "FLOAT".to_string(),
        ColumnType::Datetime | ColumnType::Datetimen => "DATETIME".to_string(),
        ColumnType::Datetime4 => "SMALLDATETIME".to_string(),
        ColumnType::Datetime2 => "DATETIME2".to_string(),
        ColumnType::DatetimeOffsetn => "DATETIMEOFFSET".to_string(),
        ColumnType::Daten => "DATE".to_string(),
        ColumnType::Timen => "TIME".to_string(),
        ColumnType::Decimaln => "DECIMAL".to_string(),
        ColumnType::Numericn => "NUMERIC".to_string(),
        ColumnType::Money => "MONEY".to_string(),
        ColumnType::Money4 => "SMALLMONEY".to_string(),
        ColumnType::Guid => "UNIQUEIDENTIFIER".to_string(),
        ColumnType::BigVarChar => "VARCHAR".to_string(),
        ColumnType::BigChar => "CHAR".to_string(),
        ColumnType::NVarchar => "NVARCHAR".to_string(),
        ColumnType::NChar => "NCHAR".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::NText => "NTEXT".to_string(),
        ColumnType::BigVarBin => "VARBINARY".to_string(),
        ColumnType::BigBinary => "BINARY".to_string(),
        ColumnType::Image => "IMAGE".to_string(),
        ColumnType::Xml => "XML".to_string(),
        ColumnType::SSVariant => "SQL_VARIANT".to_string(),
        _ => "UNKNOWN".to_string(),
    }
}

/// Values outside `Decimal`'s range (scale above 28 or more than 96 bits) are kept as text
fn numeric_to_decimal(n: Numeric) -> CellValue {
    match Decimal::try_from_i128_with_scale(n.value(), n.scale() as u32) {
        Ok(v) => CellValue::Decimal(v),
        Err(_) => CellValue::String(numeric_text(n)),
    }
}

fn numeric_text(n: Numeric) -> String {
    let sign = if n.value() < 0 { "-" } else { "" };
    let digits = n.value().unsigned_abs().to_string();
    let scale = n.scale() as usize;
    if scale == 0 {
        return format!("{}{}", sign, digits);
    }
    let padded = format!("{:0>width$}", digits, width = scale + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    format!("{}{}.{}", sign, int_part, frac_part)
}

/// Read one cell. A value tiberius cannot decode as the expected type is reported as NULL.
fn extract_cell_value(row: &Row, index: usize, col: &Column) -> CellValue {
    match col.column_type() {
        ColumnType::Null => CellValue::Null,
        ColumnType::Bit | ColumnType::Bitn => row
            .try_get::<bool, _>(index)
            .ok()
            .flatten()
            .map(CellValue::Bool)
            .unwrap_or(CellValue::Null),
        ColumnType::Int1 => row
            .try_get::<u8, _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::Int(v as i64))
            .unwrap_or(CellValue::Null),
        ColumnType::Int2 => row
            .try_get::<i16, _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::Int(v as i64))
            .unwrap_or(CellValue::Null),
        ColumnType::Int4 => row
            .try_get::<i32, _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::Int(v as i64))
            .unwrap_or(CellValue::Null),
        ColumnType::Int8 => row
            .try_get::<i64, _>(index)
            .ok()
            .flatten()
            .map(CellValue::Int)
            .unwrap_or(CellValue::Null),
        ColumnType::Float4 => row
            .try_get::<f32, _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::Float(v as f64))
            .unwrap_or(CellValue::Null),
        ColumnType::Float8 | ColumnType::Money | ColumnType::Money4 => row
            .try_get::<f64, _>(index)
            .ok()
            .flatten()
            .map(CellValue::Float)
            .unwrap_or(CellValue::Null),
        ColumnType::Decimaln | ColumnType::Numericn => row
            .try_get::<Numeric, _>(index)
            .ok()
            .flatten()
            .map(numeric_to_decimal)
            .unwrap_or(CellValue::Null),
        ColumnType::Datetime | ColumnType::Datetime2 | ColumnType::Datetimen | ColumnType::Datetime4 => row
            .try_get::<NaiveDateTime, _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::DateTime(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or(CellValue::Null),
        ColumnType::Daten => row
            .try_get::<NaiveDate, _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::DateTime(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(CellValue::Null),
        ColumnType::Timen => row
            .try_get::<NaiveTime, _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::DateTime(v.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(CellValue::Null),
        ColumnType::DatetimeOffsetn => row
            .try_get::<DateTime<FixedOffset>, _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::DateTime(v.format("%Y-%m-%d %H:%M:%S%.f %:z").to_string()))
            .unwrap_or(CellValue::Null),
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText
        | ColumnType::Xml => row
            .try_get::<&str, _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::String(v.to_string()))
            .unwrap_or(CellValue::Null),
        ColumnType::Guid => row
            .try_get::<tiberius::Uuid, _>(index)
            .ok()
            .flatten()
            .map(CellValue::Guid)
            .unwrap_or(CellValue::Null),
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => row
            .try_get::<&[u8], _>(index)
            .ok()
            .flatten()
            .map(|v| CellValue::Binary(v.to_vec()))
            .unwrap_or(CellValue::Null),
        _ => {
            // nullable integer/float columns report the generic type, try each width
            if let Some(v) = row.try_get::<i64, _>(index).ok().flatten() {
                return CellValue::Int(v);
            }
            if let Some(v) = row.try_get::<i32, _>(index).ok().flatten() {
                return CellValue::Int(v as i64);
            }
            if let Some(v) = row.try_get::<i16, _>(index).ok().flatten() {
                return CellValue::Int(v as i64);
            }
            if let Some(v) = row.try_get::<u8, _>(index).ok().flatten() {
                return CellValue::Int(v as i64);
            }
            if let Some(v) = row.try_get::<f64, _>(index).ok().flatten() {
                return CellValue::Float(v);
            }
            if let Some(v) = row.try_get::<f32, _>(index).ok().flatten() {
                return CellValue::Float(v as f64);
            }
            if let Some(v) = row.try_get::<&str, _>(index).ok().flatten() {
                return CellValue::String(v.to_string());
            }
            if let Some(v) = row.try_get::<NaiveDateTime, _>(index).ok().flatten() {
                return CellValue::DateTime(v.format("%Y-%m-%d %H:%M:%S%.f").to_string());
            }
            if let Some(v) = row.try_get::<Numeric, _>(index).ok().flatten() {
                return numeric_to_decimal(v);
            }
            CellValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_in_range() {
        assert_eq!(
            numeric_to_decimal(Numeric::new_with_scale(12345, 2)),
            CellValue::Decimal(Decimal::new(12345, 2))
        );
        assert_eq!(
            numeric_to_decimal(Numeric::new_with_scale(-7, 0)),
            CellValue::Decimal(Decimal::from(-7))
        );
        assert_eq!(
            numeric_to_decimal(Numeric::new_with_scale(1, 28)),
            CellValue::Decimal(Decimal::new(1, 28))
        );
    }

    #[test]
    fn test_numeric_scale_above_28_is_text() {
        assert_eq!(
            numeric_to_decimal(Numeric::new_with_scale(1, 30)),
            CellValue::String(format!("0.{}1", "0".repeat(29)))
        );
        assert_eq!(
            numeric_to_decimal(Numeric::new_with_scale(-12_345, 31)),
            CellValue::String(format!("-0.{}12345", "0".repeat(26)))
        );
    }

    #[test]
    fn test_numeric_38_digits_is_text() {
        let n = Numeric::new_with_scale(99_999_999_999_999_999_999_999_999_999_999_999_999, 0);
        assert_eq!(
            numeric_to_decimal(n),
            CellValue::String("99999999999999999999999999999999999999".to_string())
        );
    }

    #[test]
    fn test_bind_cell_kinds() {
        assert_eq!(bind_cell(&CellValue::Null).0, ColumnData::String(None));
        assert_eq!(bind_cell(&CellValue::Bool(true)).0, ColumnData::Bit(Some(true)));
        assert_eq!(bind_cell(&CellValue::Int(42)).0, ColumnData::I64(Some(42)));
        assert_eq!(bind_cell(&CellValue::Float(1.5)).0, ColumnData::F64(Some(1.5)));
        assert_eq!(
            bind_cell(&CellValue::Decimal(Decimal::new(995, 2))).0,
            ColumnData::String(Some("9.95".into()))
        );
        assert_eq!(
            bind_cell(&CellValue::DateTime("2024-01-02 03:04:05".to_string())).0,
            ColumnData::String(Some("2024-01-02 03:04:05".into()))
        );
        assert_eq!(
            bind_cell(&CellValue::Binary(vec![1, 2])).0,
            ColumnData::Binary(Some(vec![1u8, 2].into()))
        );
    }

    #[test]
    fn test_bound_value_into_sql() {
        let data = bind_cell(&CellValue::String("abc".to_string())).into_sql();
        assert_eq!(data, ColumnData::String(Some("abc".into())));
    }
}
