//! REST executor for the hosted database
//!
//! Speaks the PostgREST dialect served under `{url}/rest/v1/{table}`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::trace;
use url::Url;

use super::executor::{Action, Executor, Request, Response};
use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, SetupError};

const REST_PATH: &str = "rest/v1/";

/// Query parameters with a meaning of their own; a filter cannot use them
/// as column names.
pub const RESERVED_PARAMS: [&str; 5] = ["select", "order", "limit", "offset", "on_conflict"];

/// Executor backed by the hosted service's REST endpoint
#[derive(Debug, Clone)]
pub struct RestExecutor {
    client: Client,
    base: Url,
}

impl RestExecutor {
    /// Build a client for the configured service. Fails when the URL or the
    /// access key is missing or malformed.
    pub fn new(config: &DatabaseConfig) -> Result<Self, SetupError> {
        if config.url.trim().is_empty() {
            return Err(SetupError::MissingSetting("database.url"));
        }
        if config.anon_key.trim().is_empty() {
            return Err(SetupError::MissingSetting("database.anon_key"));
        }

        let mut root = Url::parse(config.url.trim())?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        let base = root.join(REST_PATH)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("apikey"),
            header_value("apikey", &config.anon_key)?,
        );
        headers.insert(
            AUTHORIZATION,
            header_value("authorization", &format!("Bearer {}", config.anon_key))?,
        );
        if let Some(schema) = config.schema.as_deref().filter(|s| !s.is_empty()) {
            let value = header_value("schema", schema)?;
            headers.insert(HeaderName::from_static("accept-profile"), value.clone());
            headers.insert(HeaderName::from_static("content-profile"), value);
        }

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self { client, base })
    }

    /// Endpoint URL for a request, including its query string
    pub fn url_for(&self, request: &Request) -> Result<Url, DatabaseError> {
        if let Some((column, _)) = request
            .filters
            .iter()
            .find(|(column, _)| RESERVED_PARAMS.contains(&column.as_str()))
        {
            return Err(DatabaseError::new(
                "PGRST100",
                format!("Cannot filter on reserved parameter \"{}\"", column),
            ));
        }

        let mut url = self
            .base
            .join(request.table.as_str())
            .map_err(|e| DatabaseError::from_parts(None, Some(e.to_string()), None, None))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", &request.columns);
            for (column, filter) in &request.filters {
                query.append_pair(column, &filter.to_query_value());
            }
            if let Some(order) = &request.order {
                let direction = if order.ascending { "asc" } else { "desc" };
                query.append_pair("order", &format!("{}.{}", order.column, direction));
            }
            if let Some(limit) = request.limit {
                query.append_pair("limit", &limit.to_string());
            }
            if let Some(offset) = request.offset {
                query.append_pair("offset", &offset.to_string());
            }
            if let Some(column) = &request.on_conflict {
                query.append_pair("on_conflict", column);
            }
        }

        Ok(url)
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, SetupError> {
    HeaderValue::from_str(value).map_err(|_| SetupError::InvalidHeader { name })
}

fn method_for(action: Action) -> Method {
    match action {
        Action::Select => Method::GET,
        Action::Insert | Action::Upsert => Method::POST,
        Action::Update => Method::PATCH,
        Action::Delete => Method::DELETE,
    }
}

fn prefer_for(request: &Request) -> Option<String> {
    let mut prefs = Vec::new();
    if request.action != Action::Select {
        prefs.push("return=representation");
    }
    if request.action == Action::Upsert {
        prefs.push("resolution=merge-duplicates");
    }
    if request.count {
        prefs.push("count=exact");
    }
    (!prefs.is_empty()).then(|| prefs.join(","))
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`
pub(crate) fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.parse().ok())
}

#[async_trait]
impl Executor for RestExecutor {
    async fn execute(&self, request: Request) -> Result<Response, DatabaseError> {
        let url = self.url_for(&request)?;
        let method = method_for(request.action);
        trace!(%method, %url, "Sending database request");

        let mut builder = self.client.request(method, url);
        if let Some(prefer) = prefer_for(&request) {
            builder = builder.header("Prefer", prefer);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let count = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let text = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<Value>(&text) {
                Ok(body) if body.is_object() => DatabaseError::from_body(&body),
                _ => DatabaseError::from_parts(
                    None,
                    Some(text).filter(|t| !t.trim().is_empty()),
                    Some(serde_json::json!({ "status": status.as_u16() })),
                    None,
                ),
            });
        }

        let rows = if text.trim().is_empty() {
            Vec::new()
        } else {
            match serde_json::from_str::<Value>(&text)? {
                Value::Array(rows) => rows,
                Value::Null => Vec::new(),
                row => vec![row],
            }
        };

        Ok(Response { rows, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Filters, OrderBy, Table};

    fn executor(url: &str) -> RestExecutor {
        RestExecutor::new(&DatabaseConfig {
            url: url.to_string(),
            anon_key: "anon".to_string(),
            ..DatabaseConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_missing_secrets() {
        let err = RestExecutor::new(&DatabaseConfig::default()).unwrap_err();
        assert!(matches!(err, SetupError::MissingSetting("database.url")));

        let err = RestExecutor::new(&DatabaseConfig {
            url: "https://example.supabase.co".to_string(),
            ..DatabaseConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, SetupError::MissingSetting("database.anon_key")));
    }

    #[test]
    fn rejects_malformed_url() {
        let err = RestExecutor::new(&DatabaseConfig {
            url: "not a url".to_string(),
            anon_key: "anon".to_string(),
            ..DatabaseConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, SetupError::InvalidUrl(_)));
    }

    #[test]
    fn builds_query_string() {
        let exec = executor("https://example.supabase.co");
        let mut request = Request::new(Table::Patients, Action::Select)
            .columns("id,first_name")
            .filters(&Filters::new().eq("user_id", "u1").in_list("gender", ["male", "other"]));
        request.order = Some(OrderBy::desc("created_at"));
        request.limit = Some(10);
        request.offset = Some(20);

        let url = exec.url_for(&request).unwrap();
        assert_eq!(url.path(), "/rest/v1/patients");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("select".into(), "id,first_name".into()),
                ("user_id".into(), "eq.u1".into()),
                ("gender".into(), "in.(male,other)".into()),
                ("order".into(), "created_at.desc".into()),
                ("limit".into(), "10".into()),
                ("offset".into(), "20".into()),
            ]
        );
    }

    #[test]
    fn reserved_parameter_cannot_be_filtered() {
        let exec = executor("https://example.supabase.co");
        let request = Request::new(Table::PatientsViewSettings, Action::Select)
            .filters(&Filters::new().eq("limit", 5));

        let err = exec.url_for(&request).unwrap_err();
        assert_eq!(err.code, "PGRST100");
        assert!(err.message.contains("limit"));
    }

    #[test]
    fn keeps_base_path() {
        let exec = executor("http://localhost:54321/project");
        let url = exec.url_for(&Request::new(Table::Users, Action::Select)).unwrap();
        assert_eq!(url.path(), "/project/rest/v1/users");
    }

    #[test]
    fn prefer_header_per_action() {
        let mut select = Request::new(Table::Users, Action::Select);
        assert_eq!(prefer_for(&select), None);
        select.count = true;
        assert_eq!(prefer_for(&select).as_deref(), Some("count=exact"));

        let upsert = Request::new(Table::Users, Action::Upsert);
        assert_eq!(
            prefer_for(&upsert).as_deref(),
            Some("return=representation,resolution=merge-duplicates")
        );
    }

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-9/*"), None);
    }
}
