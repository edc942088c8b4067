//! Column filters
//!
//! A `Filters` value is an ordered list of `(column, Filter)` pairs. Every
//! pair narrows the query further, so the list reads as a chain of ANDs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operators supported on a single column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-sensitive pattern match (`%` and `_` wildcards)
    Like,
    /// Case-insensitive pattern match
    #[serde(rename = "ilike")]
    ILike,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Like => "like",
            Operator::ILike => "ilike",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gt" => Ok(Operator::Gt),
            "gte" => Ok(Operator::Gte),
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "like" => Ok(Operator::Like),
            "ilike" => Ok(Operator::ILike),
            other => Err(format!("unsupported operator: {}", other)),
        }
    }
}

/// Condition applied to one column
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equals(Value),
    In(Vec<Value>),
    Compare { op: Operator, value: Value },
}

/// Ordered set of column filters, combined with AND.
///
/// Columns named like a query parameter (`select`, `order`, `limit`,
/// `offset`, `on_conflict`) are rejected by the REST executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    conditions: Vec<(String, Filter)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, filter: Filter) -> Self {
        self.conditions.push((column.into(), filter));
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Filter::Equals(value.into()))
    }

    pub fn in_list<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(column, Filter::In(values))
    }

    pub fn compare(self, column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.with(column, Filter::Compare { op, value: value.into() })
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, Operator::Gt, value)
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, Operator::Gte, value)
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, Operator::Lt, value)
    }

    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.compare(column, Operator::Lte, value)
    }

    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.compare(column, Operator::Like, Value::String(pattern.into()))
    }

    pub fn ilike(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.compare(column, Operator::ILike, Value::String(pattern.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Filter)> {
        self.conditions.iter()
    }

    /// Build filters from a JSON object the way route handlers receive them.
    ///
    /// Arrays become membership tests, `{"operator": .., "value": ..}` objects
    /// become comparisons (an unrecognised operator compares for equality),
    /// objects lacking either key are ignored, and anything else is an
    /// equality test. Non-object input yields no filters.
    pub fn from_json(value: &Value) -> Self {
        let mut filters = Self::new();
        let Some(map) = value.as_object() else {
            return filters;
        };

        for (column, value) in map {
            match value {
                Value::Array(items) => {
                    filters = filters.with(column.clone(), Filter::In(items.clone()));
                }
                Value::Object(obj) => {
                    let operator = obj.get("operator").and_then(Value::as_str);
                    let operand = obj.get("value");
                    if let (Some(operator), Some(operand)) = (operator, operand) {
                        let filter = match operator.parse::<Operator>() {
                            Ok(op) => Filter::Compare { op, value: operand.clone() },
                            Err(_) => Filter::Equals(operand.clone()),
                        };
                        filters = filters.with(column.clone(), filter);
                    }
                }
                other => {
                    filters = filters.with(column.clone(), Filter::Equals(other.clone()));
                }
            }
        }

        filters
    }
}

impl<'a> IntoIterator for &'a Filters {
    type Item = &'a (String, Filter);
    type IntoIter = std::slice::Iter<'a, (String, Filter)>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}

impl Serialize for Filters {
    // Logged as `{"column": "eq.value", ...}`, the same text the REST API sees.
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.conditions.len()))?;
        for (column, filter) in &self.conditions {
            map.serialize_entry(column, &filter.to_query_value())?;
        }
        map.end()
    }
}

impl Filter {
    /// Render as a PostgREST query value, e.g. `gte.18` or `in.(a,b)`.
    pub fn to_query_value(&self) -> String {
        match self {
            Filter::Equals(Value::Null) => "is.null".to_string(),
            Filter::Equals(value) => format!("eq.{}", render_scalar(value)),
            Filter::In(values) => {
                let items: Vec<String> = values.iter().map(render_list_item).collect();
                format!("in.({})", items.join(","))
            }
            Filter::Compare { op, value } => format!("{}.{}", op, render_scalar(value)),
        }
    }
}

pub(crate) fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

// Values containing list punctuation must be quoted inside `in.(...)`.
fn render_list_item(value: &Value) -> String {
    let text = render_scalar(value);
    if matches!(value, Value::String(_)) && text.contains([',', '(', ')']) {
        format!("\"{}\"", text)
    } else {
        text
    }
}
