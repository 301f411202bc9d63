// bigquery_select against a wiremock BigQuery REST API.

mod common;

use serde_json::{json, Value};
use wiremock::matchers::{any, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{app, bigquery_settings, bigquery_state, bigquery_state_with, call_tool, result_text};

fn dry_run_response(statement_type: &str, bytes: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "statistics": { "query": { "statementType": statement_type, "totalBytesProcessed": bytes } }
    }))
}

async fn mount_dry_run(server: &MockServer, statement_type: &str, bytes: &str) {
    Mock::given(method("POST"))
        .and(path("/projects/acme/jobs"))
        .respond_with(dry_run_response(statement_type, bytes))
        .mount(server)
        .await;
}

async fn mount_query(server: &MockServer, expected: Value) {
    Mock::given(method("POST"))
        .and(path("/projects/acme/queries"))
        .and(body_partial_json(expected))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": { "projectId": "acme", "jobId": "job_42", "location": "US" },
            "jobComplete": true,
            "schema": { "fields": [
                { "name": "repo", "type": "STRING", "mode": "NULLABLE" },
                { "name": "stars", "type": "INTEGER", "mode": "NULLABLE" },
                { "name": "score", "type": "NUMERIC", "mode": "NULLABLE" }
            ]},
            "rows": [
                { "f": [{ "v": "acme/api" }, { "v": "12" }, { "v": "1.50" }] },
                { "f": [{ "v": "acme/web" }, { "v": null }, { "v": "0.25" }] }
            ]
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/acme/jobs/job_42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": { "jobId": "job_42", "location": "US" },
            "statistics": { "query": {
                "statementType": "SELECT",
                "totalBytesProcessed": "4096",
                "totalBytesBilled": "10485760"
            }}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn select_returns_exactly_what_the_query_client_returned() {
    let server = MockServer::start().await;
    mount_dry_run(&server, "SELECT", "4096").await;
    mount_query(
        &server,
        json!({
            "query": "SELECT repo, stars, score FROM `acme.ds.t`",
            "useLegacySql": false,
            "maximumBytesBilled": "5000000000",
            "maxResults": 500,
            "location": "US"
        }),
    )
    .await;

    let result = call_tool(
        &app(bigquery_state(&server.uri())),
        "bigquery_select",
        json!({ "sql": "-- top repos\nSELECT repo, stars, score FROM `acme.ds.t`;" }),
    )
    .await;

    assert_eq!(result["isError"], false, "{}", result_text(&result));
    let payload = &result["structuredContent"];
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["query"], "SELECT repo, stars, score FROM `acme.ds.t`");
    assert_eq!(payload["dry_run"], json!({ "statement_type": "SELECT", "total_bytes_processed": 4096 }));
    assert_eq!(
        payload["job"],
        json!({
            "job_id": "job_42",
            "location": "US",
            "statement_type": "SELECT",
            "total_bytes_processed": 4096,
            "total_bytes_billed": 10485760
        })
    );
    assert_eq!(payload["result"]["max_rows"], 500);
    assert_eq!(payload["result"]["returned_rows"], 2);
    assert_eq!(
        payload["result"]["schema"],
        json!([
            { "name": "repo", "type": "STRING", "mode": "NULLABLE" },
            { "name": "stars", "type": "INTEGER", "mode": "NULLABLE" },
            { "name": "score", "type": "NUMERIC", "mode": "NULLABLE" }
        ])
    );
    assert_eq!(
        payload["result"]["rows"],
        json!([
            { "repo": "acme/api", "stars": 12, "score": "1.50" },
            { "repo": "acme/web", "stars": null, "score": "0.25" }
        ])
    );

    let text: Value = serde_json::from_str(&result_text(&result)).unwrap();
    assert_eq!(&text, payload);
}

#[tokio::test]
async fn non_select_queries_never_reach_bigquery() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(dry_run_response("SELECT", "0"))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(bigquery_state(&server.uri()));
    for sql in [
        "DELETE FROM ds.t WHERE true",
        "insert into ds.t values (1)",
        "/* SELECT */ DROP TABLE ds.t",
        "-- SELECT\nUPDATE ds.t SET a = 1 WHERE true",
        "WITH x AS (SELECT 1) SELECT * FROM x",
        "SELECT 1; DROP TABLE ds.t",
        "   ",
        "-- nothing but a comment",
    ] {
        let result = call_tool(&app, "bigquery_select", json!({ "sql": sql })).await;
        assert_eq!(result["isError"], true, "{sql}");
    }
}

#[tokio::test]
async fn rejection_messages_name_the_problem() {
    let app = app(bigquery_state(common::UNREACHABLE));

    let result = call_tool(&app, "bigquery_select", json!({ "sql": "MERGE t USING s ON true WHEN MATCHED THEN DELETE" })).await;
    assert!(result_text(&result).contains("Only SELECT queries are allowed"));

    let result = call_tool(&app, "bigquery_select", json!({ "sql": "SELECT 1; SELECT 2" })).await;
    assert!(result_text(&result).contains("Multiple statements are not allowed"));
}

#[tokio::test]
async fn dry_run_statement_type_must_be_select() {
    let server = MockServer::start().await;
    mount_dry_run(&server, "SCRIPT", "0").await;
    Mock::given(method("POST"))
        .and(path("/projects/acme/queries"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = call_tool(&app(bigquery_state(&server.uri())), "bigquery_select", json!({ "sql": "SELECT 1" })).await;
    assert_eq!(result["isError"], true);
    assert!(result_text(&result).contains("statement_type='SCRIPT'"));
}

#[tokio::test]
async fn estimate_over_cap_is_rejected_before_execution() {
    let server = MockServer::start().await;
    mount_dry_run(&server, "SELECT", "9000000000").await;
    Mock::given(method("POST"))
        .and(path("/projects/acme/queries"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = call_tool(
        &app(bigquery_state(&server.uri())),
        "bigquery_select",
        json!({ "sql": "SELECT * FROM huge" }),
    )
    .await;
    assert_eq!(result["isError"], true);
    assert!(result_text(&result).contains("exceeds cap (5000000000)"));
}

#[tokio::test]
async fn max_rows_is_capped_server_side() {
    let server = MockServer::start().await;
    mount_dry_run(&server, "SELECT", "10").await;
    mount_query(&server, json!({ "maxResults": 1000 })).await;

    let result = call_tool(
        &app(bigquery_state(&server.uri())),
        "bigquery_select",
        json!({ "sql": "SELECT 1", "max_rows": 1000000 }),
    )
    .await;
    assert_eq!(result["structuredContent"]["result"]["max_rows"], 1000);
}

#[tokio::test]
async fn small_max_rows_trims_the_returned_rows() {
    let server = MockServer::start().await;
    mount_dry_run(&server, "SELECT", "10").await;
    mount_query(&server, json!({ "maxResults": 1 })).await;

    let mut settings = bigquery_settings(&server.uri());
    settings.default_limit = 50;
    let result = call_tool(
        &app(bigquery_state_with(settings)),
        "bigquery_select",
        json!({ "sql": "SELECT repo FROM t", "max_rows": 1 }),
    )
    .await;
    let payload = &result["structuredContent"]["result"];
    assert_eq!(payload["max_rows"], 1);
    assert_eq!(payload["returned_rows"], 1);
    assert_eq!(payload["rows"][0]["repo"], "acme/api");
}

#[tokio::test]
async fn bigquery_errors_are_reported_as_tool_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/acme/jobs"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "Access Denied: Table acme:ds.t" }
        })))
        .mount(&server)
        .await;

    let result = call_tool(&app(bigquery_state(&server.uri())), "bigquery_select", json!({ "sql": "SELECT * FROM ds.t" })).await;
    assert_eq!(result["isError"], true);
    assert_eq!(
        result_text(&result),
        "Error: bigquery error (HTTP 403): Access Denied: Table acme:ds.t"
    );
}
