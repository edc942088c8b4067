//! In-memory executor
//!
//! Keeps every table as a list of JSON rows and answers requests with the
//! same filter, ordering and pagination rules as the hosted service. Used by
//! the test suite and for running the portal without a database.

use async_trait::async_trait;
use chrono::Utc;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::executor::{Action, Executor, Request, Response};
use super::filter::{render_scalar, Filter, Filters, Operator};
use super::Table;
use crate::error::DatabaseError;

type Row = Map<String, Value>;

const PRIMARY_KEY: &str = "id";

#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: Mutex<HashMap<Table, Vec<Row>>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table. Non-object values are skipped.
    pub fn with_rows(mut self, table: Table, rows: Vec<Value>) -> Self {
        let stored = self.tables.get_mut().entry(table).or_default();
        stored.extend(rows.into_iter().filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        }));
        self
    }

    /// Snapshot of a table's rows
    pub async fn rows(&self, table: Table) -> Vec<Value> {
        let tables = self.tables.lock().await;
        tables
            .get(&table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn execute(&self, request: Request) -> Result<Response, DatabaseError> {
        let mut tables = self.tables.lock().await;
        let rows = tables.entry(request.table).or_default();

        let (result, count) = match request.action {
            Action::Select => select(rows, &request),
            Action::Insert => (insert(rows, request.table, body_rows(&request)?)?, None),
            Action::Update => (update(rows, &request)?, None),
            Action::Delete => (delete(rows, &request.filters), None),
            Action::Upsert => {
                let conflict = request.on_conflict.as_deref().unwrap_or(PRIMARY_KEY);
                (upsert(rows, request.table, body_rows(&request)?, conflict)?, None)
            }
        };

        let rows = result.into_iter().map(|row| project(row, &request.columns)).collect();
        Ok(Response { rows, count })
    }
}

fn select(rows: &[Row], request: &Request) -> (Vec<Row>, Option<u64>) {
    let mut matched: Vec<Row> = rows
        .iter()
        .filter(|row| matches_all(row, &request.filters))
        .cloned()
        .collect();
    let count = request.count.then_some(matched.len() as u64);

    if let Some(order) = &request.order {
        matched.sort_by(|a, b| {
            let ordering = compare_for_sort(a.get(&order.column), b.get(&order.column));
            if order.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }

    let offset = request.offset.unwrap_or(0) as usize;
    let limit = request.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    let page = matched.into_iter().skip(offset).take(limit).collect();
    (page, count)
}

fn insert(rows: &mut Vec<Row>, table: Table, incoming: Vec<Row>) -> Result<Vec<Row>, DatabaseError> {
    let mut prepared = Vec::with_capacity(incoming.len());
    for row in incoming {
        let row = with_defaults(row);
        check_unique(rows.iter().chain(prepared.iter()), table, &row)?;
        prepared.push(row);
    }
    rows.extend(prepared.iter().cloned());
    Ok(prepared)
}

fn update(rows: &mut [Row], request: &Request) -> Result<Vec<Row>, DatabaseError> {
    let changes = match &request.body {
        Some(Value::Object(changes)) => changes,
        _ => return Err(invalid_body()),
    };

    let mut updated = Vec::new();
    for row in rows.iter_mut().filter(|row| matches_all(row, &request.filters)) {
        for (key, value) in changes {
            row.insert(key.clone(), value.clone());
        }
        updated.push(row.clone());
    }
    Ok(updated)
}

fn delete(rows: &mut Vec<Row>, filters: &Filters) -> Vec<Row> {
    let (removed, kept): (Vec<Row>, Vec<Row>) =
        rows.drain(..).partition(|row| matches_all(row, filters));
    *rows = kept;
    removed
}

fn upsert(
    rows: &mut Vec<Row>,
    table: Table,
    incoming: Vec<Row>,
    conflict: &str,
) -> Result<Vec<Row>, DatabaseError> {
    // Work on a copy so a failing row leaves the table untouched.
    let mut staged = rows.clone();
    let mut result = Vec::with_capacity(incoming.len());
    for row in incoming {
        let existing = row.get(conflict).filter(|v| !v.is_null()).and_then(|key| {
            staged
                .iter()
                .position(|r| r.get(conflict).is_some_and(|v| scalar_eq(v, key)))
        });

        match existing {
            Some(index) => {
                let mut merged = staged[index].clone();
                merged.extend(row);
                let others = staged
                    .iter()
                    .enumerate()
                    .filter(move |(i, _)| *i != index)
                    .map(|(_, r)| r);
                check_unique(others, table, &merged)?;
                staged[index] = merged.clone();
                result.push(merged);
            }
            None => {
                let row = with_defaults(row);
                check_unique(staged.iter(), table, &row)?;
                staged.push(row.clone());
                result.push(row);
            }
        }
    }
    *rows = staged;
    Ok(result)
}

fn body_rows(request: &Request) -> Result<Vec<Row>, DatabaseError> {
    match &request.body {
        Some(Value::Object(row)) => Ok(vec![row.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_object().cloned().ok_or_else(invalid_body))
            .collect(),
        _ => Err(invalid_body()),
    }
}

fn invalid_body() -> DatabaseError {
    DatabaseError::new("PGRST102", "Empty or invalid json")
}

fn with_defaults(mut row: Row) -> Row {
    let now = Value::String(Utc::now().to_rfc3339());
    row.entry(PRIMARY_KEY)
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    row.entry("created_at").or_insert_with(|| now.clone());
    row.entry("updated_at").or_insert(now);
    row
}

// One row per user in the settings tables, matching the database constraints.
fn unique_columns(table: Table) -> &'static [&'static str] {
    match table {
        Table::UsersSettings | Table::PatientsViewSettings => &[PRIMARY_KEY, "user_id"],
        Table::Users | Table::Patients => &[PRIMARY_KEY],
    }
}

fn check_unique<'a>(
    existing: impl Iterator<Item = &'a Row> + Clone,
    table: Table,
    row: &Row,
) -> Result<(), DatabaseError> {
    for column in unique_columns(table) {
        let Some(value) = row.get(*column).filter(|v| !v.is_null()) else {
            continue;
        };
        if existing
            .clone()
            .any(|r| r.get(*column).is_some_and(|v| scalar_eq(v, value)))
        {
            return Err(DatabaseError::new(
                "23505",
                format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\"",
                    table, column
                ),
            )
            .with_details(Value::String(format!(
                "Key ({})=({}) already exists.",
                column,
                render_scalar(value)
            ))));
        }
    }
    Ok(())
}

fn project(row: Row, columns: &str) -> Value {
    let wanted: Vec<&str> = columns.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();
    if wanted.is_empty() || wanted.contains(&"*") {
        return Value::Object(row);
    }
    let projected = wanted
        .iter()
        .filter_map(|column| row.get(*column).map(|v| (column.to_string(), v.clone())))
        .collect();
    Value::Object(projected)
}

fn matches_all(row: &Row, filters: &Filters) -> bool {
    filters
        .iter()
        .all(|(column, filter)| matches(row.get(column), filter))
}

fn matches(value: Option<&Value>, filter: &Filter) -> bool {
    let value = value.unwrap_or(&Value::Null);
    match filter {
        Filter::Equals(Value::Null) => value.is_null(),
        Filter::Equals(expected) => !value.is_null() && scalar_eq(value, expected),
        Filter::In(candidates) => {
            !value.is_null() && candidates.iter().any(|c| scalar_eq(value, c))
        }
        Filter::Compare { op, value: operand } => {
            if value.is_null() {
                return false;
            }
            match op {
                Operator::Like => like(&render_scalar(value), &render_scalar(operand), false),
                Operator::ILike => like(&render_scalar(value), &render_scalar(operand), true),
                Operator::Gt => compare(value, operand) == Some(Ordering::Greater),
                Operator::Gte => matches!(
                    compare(value, operand),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                Operator::Lt => compare(value, operand) == Some(Ordering::Less),
                Operator::Lte => {
                    matches!(compare(value, operand), Some(Ordering::Less | Ordering::Equal))
                }
            }
        }
    }
}

// Query values arrive as text, so `5` and `"5"` are the same value.
fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        _ => render_scalar(a) == render_scalar(b),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

// Nulls sort after everything else in ascending order.
fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
    }
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` is one character.
fn like(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    like_regex(pattern, case_insensitive)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

fn like_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut expr = String::from("^");
    let mut literal = String::new();
    for c in pattern.chars() {
        let wildcard = match c {
            '%' => ".*",
            '_' => ".",
            _ => {
                literal.push(c);
                continue;
            }
        };
        expr.push_str(&regex::escape(&literal));
        literal.clear();
        expr.push_str(wildcard);
    }
    expr.push_str(&regex::escape(&literal));
    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("Cohen", "Co%", false, true)]
    #[test_case("Cohen", "%he%", false, true)]
    #[test_case("Cohen", "C_hen", false, true)]
    #[test_case("Cohen", "co%", false, false)]
    #[test_case("Cohen", "co%", true, true)]
    #[test_case("Cohen", "Cohen_", false, false)]
    #[test_case("", "%", false, true)]
    #[test_case("a.b (c)", "a.b (%)", false, true)]
    #[test_case("axb", "a.b", false, false)]
    fn like_patterns(text: &str, pattern: &str, case_insensitive: bool, expected: bool) {
        assert_eq!(like(text, pattern, case_insensitive), expected);
    }

    #[test]
    fn numbers_compare_across_text() {
        assert_eq!(compare(&json!(10), &json!("9")), Some(Ordering::Greater));
        assert_eq!(compare(&json!("2024-01-02"), &json!("2024-01-10")), Some(Ordering::Less));
        assert_eq!(compare(&json!(true), &json!(3)), None);
    }

    #[test]
    fn equality_treats_text_and_numbers_alike() {
        assert!(matches(Some(&json!(25)), &Filter::Equals(json!("25"))));
        assert!(!matches(None, &Filter::Equals(json!("25"))));
        assert!(matches(None, &Filter::Equals(Value::Null)));
    }

    #[test]
    fn projection_picks_requested_columns() {
        let row = json!({ "id": "1", "email": "a@b.c", "clerk_id": "c" });
        let Value::Object(row) = row else { unreachable!() };
        assert_eq!(project(row.clone(), "id, email"), json!({ "id": "1", "email": "a@b.c" }));
        assert_eq!(project(row, "*").as_object().map(|r| r.len()), Some(3));
    }

    #[tokio::test]
    async fn duplicate_primary_key_is_rejected() {
        let exec = MemoryExecutor::new().with_rows(Table::Users, vec![json!({ "id": "u1" })]);
        let request = Request::new(Table::Users, Action::Insert).body(json!({ "id": "u1" }));
        let err = exec.execute(request).await.unwrap_err();
        assert_eq!(err.code, "23505");
        assert_eq!(exec.rows(Table::Users).await.len(), 1);
    }

    #[tokio::test]
    async fn failed_batch_inserts_nothing() {
        let exec = MemoryExecutor::new();
        let request = Request::new(Table::Users, Action::Insert)
            .body(json!([{ "id": "u1" }, { "id": "u1" }]));
        assert!(exec.execute(request).await.is_err());
        assert!(exec.rows(Table::Users).await.is_empty());
    }

    #[tokio::test]
    async fn failed_batch_upsert_changes_nothing() {
        let exec = MemoryExecutor::new().with_rows(
            Table::UsersSettings,
            vec![json!({ "id": "s1", "user_id": "u1", "theme": "light" })],
        );
        let request = Request::new(Table::UsersSettings, Action::Upsert).body(json!([
            { "id": "s1", "theme": "dark" },
            { "id": "s2", "user_id": "u1" }
        ]));

        let err = exec.execute(request).await.unwrap_err();
        assert_eq!(err.code, "23505");
        assert_eq!(
            exec.rows(Table::UsersSettings).await,
            vec![json!({ "id": "s1", "user_id": "u1", "theme": "light" })]
        );
    }

    #[tokio::test]
    async fn merge_cannot_duplicate_a_unique_column() {
        let exec = MemoryExecutor::new().with_rows(
            Table::UsersSettings,
            vec![json!({ "id": "s1", "user_id": "u1" }), json!({ "id": "s2", "user_id": "u2" })],
        );
        let request = Request::new(Table::UsersSettings, Action::Upsert)
            .body(json!({ "id": "s2", "user_id": "u1" }));

        let err = exec.execute(request).await.unwrap_err();
        assert_eq!(err.code, "23505");
        assert_eq!(exec.rows(Table::UsersSettings).await[1]["user_id"], "u2");
    }

    #[tokio::test]
    async fn merge_keeps_its_own_unique_values() {
        let exec = MemoryExecutor::new()
            .with_rows(Table::UsersSettings, vec![json!({ "id": "s1", "user_id": "u1" })]);
        let request = Request::new(Table::UsersSettings, Action::Upsert)
            .body(json!({ "id": "s1", "user_id": "u1", "theme": "dark" }));

        let response = exec.execute(request).await.unwrap();
        assert_eq!(response.rows[0]["theme"], "dark");
    }

    #[tokio::test]
    async fn insert_assigns_id_and_timestamps() {
        let exec = MemoryExecutor::new();
        let request = Request::new(Table::Users, Action::Insert).body(json!({ "email": "a@b.c" }));
        let response = exec.execute(request).await.unwrap();
        let row = &response.rows[0];
        assert!(row["id"].as_str().is_some_and(|id| Uuid::parse_str(id).is_ok()));
        assert!(row["created_at"].is_string());
        assert_eq!(row["created_at"], row["updated_at"]);
    }
}
