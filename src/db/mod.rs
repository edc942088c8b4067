//! Database module for Noah Portal
//!
//! This module wraps the hosted database behind six generic operations.
//! Every call builds one `Request`, runs it through the configured
//! `Executor` and decodes the returned rows into the caller's record type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod executor;
pub mod filter;
pub mod memory;
pub mod rest;

pub use executor::{
    Action, Executor, OrderBy, Request, Response, SelectOptions, UpsertOptions, DEFAULT_PAGE_SIZE,
};
pub use filter::{Filter, Filters, Operator};
pub use memory::MemoryExecutor;
pub use rest::RestExecutor;

use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, SetupError};

/// Tables the portal reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Patients,
    Users,
    UsersSettings,
    PatientsViewSettings,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Patients,
        Table::Users,
        Table::UsersSettings,
        Table::PatientsViewSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Patients => "patients",
            Table::Users => "users",
            Table::UsersSettings => "users_settings",
            Table::PatientsViewSettings => "patients_view_settings",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows from a `select` together with the total number of matches
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub count: u64,
}

/// `{data, error}` envelope for handlers that return the uniform shape
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseResult<T> {
    pub data: Option<T>,
    pub error: Option<DatabaseError>,
}

impl<T> From<Result<T, DatabaseError>> for DatabaseResult<T> {
    fn from(result: Result<T, DatabaseError>) -> Self {
        match result {
            Ok(data) => Self { data: Some(data), error: None },
            Err(error) => Self { data: None, error: Some(error) },
        }
    }
}

/// `{data, error, count}` envelope for list results
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseListResult<T> {
    pub data: Option<Vec<T>>,
    pub error: Option<DatabaseError>,
    pub count: u64,
}

impl<T> From<Result<Page<T>, DatabaseError>> for DatabaseListResult<T> {
    fn from(result: Result<Page<T>, DatabaseError>) -> Self {
        match result {
            Ok(page) => Self { data: Some(page.rows), error: None, count: page.count },
            Err(error) => Self { data: None, error: Some(error), count: 0 },
        }
    }
}

/// Generic CRUD facade over the hosted database
#[derive(Clone)]
pub struct Database {
    executor: Arc<dyn Executor>,
    debug: bool,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("debug", &self.debug).finish_non_exhaustive()
    }
}

impl Database {
    /// Create a facade talking to the hosted service described by `config`
    pub fn connect(config: &DatabaseConfig) -> Result<Self, SetupError> {
        let executor = RestExecutor::new(config)?;
        info!(url = %config.url, "Database client ready");
        Ok(Self::with_executor(Arc::new(executor)).debug(config.debug))
    }

    /// Create a facade over any executor
    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self { executor, debug: false }
    }

    /// Log every operation with its parameters
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// The underlying executor, for requests the facade does not cover
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Shut the facade down. Clones that are still alive keep working.
    pub async fn close(self) {
        self.executor.close().await;
        info!("Database client closed");
    }

    fn log_operation(&self, operation: &str, table: Table, params: impl FnOnce() -> Value) {
        if self.debug {
            info!(operation, %table, params = %params(), "DB operation");
        }
    }

    #[instrument(level = "debug", skip_all, fields(table = %table))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: Table,
        columns: &str,
        filters: &Filters,
        options: &SelectOptions,
    ) -> Result<Page<T>, DatabaseError> {
        self.log_operation("SELECT", table, || {
            json!({ "columns": columns, "filters": filters, "options": options })
        });

        let (limit, offset) = options.window();
        let mut request = Request::new(table, Action::Select).columns(columns).filters(filters);
        request.order = options.order_by.clone();
        request.limit = limit;
        request.offset = offset;
        request.count = true;

        let response = self.executor.execute(request).await?;
        Ok(Page {
            rows: decode_rows(response.rows)?,
            count: response.count.unwrap_or(0),
        })
    }

    /// Fetch exactly one row. Zero or several matches are an error.
    #[instrument(level = "debug", skip_all, fields(table = %table))]
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: Table,
        columns: &str,
        filters: &Filters,
    ) -> Result<T, DatabaseError> {
        self.log_operation("SELECT_ONE", table, || {
            json!({ "columns": columns, "filters": filters })
        });

        // Two rows are enough to tell "one" from "several".
        let mut request = Request::new(table, Action::Select).columns(columns).filters(filters);
        request.limit = Some(2);

        let response = self.executor.execute(request).await?;
        single_row(response.rows)
    }

    /// Insert one record and return it as stored
    #[instrument(level = "debug", skip_all, fields(table = %table))]
    pub async fn insert<T, P>(&self, table: Table, data: &P) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.log_operation("INSERT", table, || json!({ "recordCount": 1 }));

        let request = Request::new(table, Action::Insert).body(serde_json::to_value(data)?);
        let response = self.executor.execute(request).await?;
        first_row(response.rows)
    }

    /// Insert a batch; all rows are stored or none are
    #[instrument(level = "debug", skip_all, fields(table = %table, records = data.len()))]
    pub async fn insert_many<T, P>(&self, table: Table, data: &[P]) -> Result<Vec<T>, DatabaseError>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        self.log_operation("INSERT", table, || json!({ "recordCount": data.len() }));

        let request = Request::new(table, Action::Insert).body(serde_json::to_value(data)?);
        let response = self.executor.execute(request).await?;
        decode_rows(response.rows)
    }

    /// Apply `data` to every row matching `filters`
    #[instrument(level = "debug", skip_all, fields(table = %table))]
    pub async fn update<T, P>(
        &self,
        table: Table,
        data: &P,
        filters: &Filters,
    ) -> Result<Vec<T>, DatabaseError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let body = serde_json::to_value(data)?;
        self.log_operation("UPDATE", table, || json!({ "data": &body, "filters": filters }));

        let request = Request::new(table, Action::Update).filters(filters).body(body);
        let response = self.executor.execute(request).await?;
        decode_rows(response.rows)
    }

    /// Remove every row matching `filters` and return what was removed
    #[instrument(level = "debug", skip_all, fields(table = %table))]
    pub async fn delete<T: DeserializeOwned>(
        &self,
        table: Table,
        filters: &Filters,
    ) -> Result<Vec<T>, DatabaseError> {
        self.log_operation("DELETE", table, || json!({ "filters": filters }));

        let request = Request::new(table, Action::Delete).filters(filters);
        let response = self.executor.execute(request).await?;
        decode_rows(response.rows)
    }

    /// Insert one record, or merge it into the row sharing its conflict key
    #[instrument(level = "debug", skip_all, fields(table = %table))]
    pub async fn upsert<T, P>(
        &self,
        table: Table,
        data: &P,
        options: &UpsertOptions,
    ) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.log_operation("UPSERT", table, || json!({ "recordCount": 1 }));

        let response = self
            .executor
            .execute(upsert_request(table, serde_json::to_value(data)?, options))
            .await?;
        first_row(response.rows)
    }

    #[instrument(level = "debug", skip_all, fields(table = %table, records = data.len()))]
    pub async fn upsert_many<T, P>(
        &self,
        table: Table,
        data: &[P],
        options: &UpsertOptions,
    ) -> Result<Vec<T>, DatabaseError>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        self.log_operation("UPSERT", table, || json!({ "recordCount": data.len() }));

        let response = self
            .executor
            .execute(upsert_request(table, serde_json::to_value(data)?, options))
            .await?;
        decode_rows(response.rows)
    }
}

fn upsert_request(table: Table, body: Value, options: &UpsertOptions) -> Request {
    let mut request = Request::new(table, Action::Upsert).body(body);
    request.on_conflict = options.on_conflict.clone();
    request
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, DatabaseError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(DatabaseError::from))
        .collect()
}

fn first_row<T: DeserializeOwned>(rows: Vec<Value>) -> Result<T, DatabaseError> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| DatabaseError::not_single_row(0))?;
    Ok(serde_json::from_value(row)?)
}

fn single_row<T: DeserializeOwned>(rows: Vec<Value>) -> Result<T, DatabaseError> {
    if rows.len() != 1 {
        return Err(DatabaseError::not_single_row(rows.len()));
    }
    first_row(rows)
}
