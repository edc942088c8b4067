//! Query requests and the executor seam
//!
//! The facade turns each call into a `Request` and hands it to an
//! `Executor`. `RestExecutor` sends it to the hosted service, and
//! `MemoryExecutor` answers it in-process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::filter::Filters;
use super::Table;
use crate::error::DatabaseError;

/// Rows requested when an offset is given without a limit
pub const DEFAULT_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: true }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: false }
    }
}

/// Ordering and pagination for `select`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectOptions {
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl SelectOptions {
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Resolve `(limit, offset)` for the request. Zero values count as unset;
    /// an offset without a limit reads one default page.
    pub fn window(&self) -> (Option<u64>, Option<u64>) {
        let limit = self.limit.filter(|l| *l > 0);
        match self.offset.filter(|o| *o > 0) {
            Some(offset) => (Some(limit.unwrap_or(DEFAULT_PAGE_SIZE)), Some(offset)),
            None => (limit, None),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertOptions {
    /// Column used to detect an existing row; the primary key when unset
    #[serde(default)]
    pub on_conflict: Option<String>,
}

impl UpsertOptions {
    pub fn on_conflict(column: impl Into<String>) -> Self {
        Self { on_conflict: Some(column.into()) }
    }
}

/// One fully described query against a single table
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub table: Table,
    pub action: Action,
    pub columns: String,
    pub filters: Filters,
    pub order: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Ask for the exact number of matching rows
    pub count: bool,
    /// Insert/update/upsert payload: an object or an array of objects
    pub body: Option<Value>,
    pub on_conflict: Option<String>,
}

impl Request {
    pub fn new(table: Table, action: Action) -> Self {
        Self {
            table,
            action,
            columns: "*".to_string(),
            filters: Filters::default(),
            order: None,
            limit: None,
            offset: None,
            count: false,
            body: None,
            on_conflict: None,
        }
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = if columns.trim().is_empty() { "*".to_string() } else { columns.to_string() };
        self
    }

    pub fn filters(mut self, filters: &Filters) -> Self {
        self.filters = filters.clone();
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Rows returned by the store, plus the total when one was requested
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub rows: Vec<Value>,
    pub count: Option<u64>,
}

impl Response {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows, count: None }
    }
}

/// Runs requests against a relational store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, DatabaseError>;

    /// Release resources held by the executor
    async fn close(&self) {}
}
