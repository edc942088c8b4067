//! Facade against a mocked hosted REST API

use noah_portal::config::DatabaseConfig;
use noah_portal::db::{Database, Filters, OrderBy, Page, SelectOptions, Table, UpsertOptions};
use noah_portal::error::{NOT_SINGLE_ROW_CODE, UNKNOWN_ERROR_CODE};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "anon-test-key";

fn database(server: &MockServer) -> Database {
    Database::connect(&DatabaseConfig {
        url: server.uri(),
        anon_key: KEY.to_string(),
        ..DatabaseConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn select_sends_auth_filters_and_window() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(header("apikey", KEY))
        .and(header("authorization", format!("Bearer {}", KEY).as_str()))
        .and(header("prefer", "count=exact"))
        .and(query_param("select", "id,last_name"))
        .and(query_param("user_id", "eq.u1"))
        .and(query_param("gender", "in.(female,other)"))
        .and(query_param("order", "last_name.asc"))
        .and(query_param("limit", "100"))
        .and(query_param("offset", "200"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Range", "200-200/201")
                .set_body_json(json!([{ "id": "p201", "last_name": "Zur" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let filters = Filters::new().eq("user_id", "u1").in_list("gender", ["female", "other"]);
    let options = SelectOptions::default().order_by(OrderBy::asc("last_name")).offset(200);
    let page: Page<Value> = database(&server)
        .select(Table::Patients, "id,last_name", &filters, &options)
        .await
        .unwrap();

    assert_eq!(page.count, 201);
    assert_eq!(page.rows[0]["last_name"], "Zur");
}

#[tokio::test]
async fn every_operator_reaches_the_query_string() {
    let server = MockServer::start().await;
    let db = database(&server);

    let cases = [
        (Filters::new().gt("page_size", 10), "page_size", "gt.10"),
        (Filters::new().gte("page_size", 10), "page_size", "gte.10"),
        (Filters::new().lt("page_size", 10), "page_size", "lt.10"),
        (Filters::new().lte("page_size", 10), "page_size", "lte.10"),
        (Filters::new().like("sort_column", "last%"), "sort_column", "like.last%"),
        (Filters::new().ilike("sort_column", "LAST%"), "sort_column", "ilike.LAST%"),
    ];

    for (filters, column, expected) in cases {
        let guard = Mock::given(method("GET"))
            .and(path("/rest/v1/patients_view_settings"))
            .and(query_param(column, expected))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount_as_scoped(&server)
            .await;

        let page: Page<Value> = db
            .select(Table::PatientsViewSettings, "*", &filters, &SelectOptions::default())
            .await
            .unwrap();
        assert!(page.rows.is_empty());
        drop(guard);
    }
}

#[tokio::test]
async fn provider_error_body_is_normalized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "details": "Key (email)=(a@b.c) already exists.",
            "hint": null,
            "message": "duplicate key value violates unique constraint \"users_email_key\""
        })))
        .mount(&server)
        .await;

    let err = database(&server)
        .insert::<Value, _>(Table::Users, &json!({ "email": "a@b.c" }))
        .await
        .unwrap_err();

    assert_eq!(err.code, "23505");
    assert!(err.message.starts_with("duplicate key"));
    assert_eq!(err.details, Some(json!("Key (email)=(a@b.c) already exists.")));
    assert_eq!(err.hint, None);
}

#[tokio::test]
async fn non_json_failure_gets_unknown_code() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let err = database(&server)
        .select::<Value>(Table::Users, "*", &Filters::new(), &SelectOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code, UNKNOWN_ERROR_CODE);
    assert_eq!(err.message, "Bad Gateway");
    assert_eq!(err.details, Some(json!({ "status": 502 })));
}

#[tokio::test]
async fn unreachable_service_is_an_error_not_a_panic() {
    let db = Database::connect(&DatabaseConfig {
        url: "http://127.0.0.1:1".to_string(),
        anon_key: KEY.to_string(),
        ..DatabaseConfig::default()
    })
    .unwrap();

    let err = db
        .delete::<Value>(Table::Patients, &Filters::new().eq("id", "p1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, UNKNOWN_ERROR_CODE);
}

#[tokio::test]
async fn insert_returns_the_echoed_row() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .and(header("prefer", "return=representation"))
        .and(query_param("select", "*"))
        .and(body_json(json!({ "email": "a@b.c", "clerk_id": "user_1" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            { "id": "u1", "email": "a@b.c", "clerk_id": "user_1" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let row: Value = database(&server)
        .insert(Table::Users, &json!({ "email": "a@b.c", "clerk_id": "user_1" }))
        .await
        .unwrap();
    assert_eq!(row["id"], "u1");
}

#[tokio::test]
async fn upsert_names_conflict_column() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/users_settings"))
        .and(query_param("on_conflict", "user_id"))
        .and(header_exists("prefer"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            { "id": "s1", "user_id": "u1", "theme": "dark" },
            { "id": "s2", "user_id": "u2", "theme": "light" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows: Vec<Value> = database(&server)
        .upsert_many(
            Table::UsersSettings,
            &[
                json!({ "user_id": "u1", "theme": "dark" }),
                json!({ "user_id": "u2", "theme": "light" }),
            ],
            &UpsertOptions::on_conflict("user_id"),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn update_matching_nothing_is_empty() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", "eq.missing"))
        .and(body_json(json!({ "notes": "follow up" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let rows: Vec<Value> = database(&server)
        .update(
            Table::Patients,
            &json!({ "notes": "follow up" }),
            &Filters::new().eq("id", "missing"),
        )
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn select_one_with_two_rows_fails() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("limit", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": "u1" }, { "id": "u2" }])),
        )
        .mount(&server)
        .await;

    let err = database(&server)
        .select_one::<Value>(Table::Users, "*", &Filters::new().ilike("email", "%@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.code, NOT_SINGLE_ROW_CODE);
}
