// ---------------------------------------------------------------------------
// bigquery - BigQuery REST client (dry run + bounded query execution)
// ---------------------------------------------------------------------------

pub mod rows;

pub use rows::SchemaField;

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Map, Value};
use url::Url;

use crate::config::BigQuerySettings;
use crate::error::ToolError;
use crate::gcp::{google_error, AccessTokenProvider};

const SERVICE: &str = "bigquery";
/// Upper bound for a single `jobs.query` / `getQueryResults` long poll.
const POLL_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DryRunResult {
    pub statement_type: Option<String>,
    pub total_bytes_processed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub job_id: String,
    pub location: Option<String>,
    pub statement_type: Option<String>,
    pub total_bytes_processed: Option<i64>,
    pub total_bytes_billed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub job: JobInfo,
    pub schema: Vec<SchemaField>,
    pub rows: Vec<Map<String, Value>>,
}

pub struct BigQueryService {
    client: Client,
    base_url: Url,
    project_id: String,
    location: Option<String>,
    max_bytes_billed: i64,
    query_timeout: Duration,
    credentials: Arc<AccessTokenProvider>,
}

impl BigQueryService {
    pub fn new(
        client: Client,
        settings: &BigQuerySettings,
        credentials: Arc<AccessTokenProvider>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            base_url: Url::parse(settings.api_base_url.trim_end_matches('/'))?,
            project_id: settings.project_id.clone(),
            location: settings.location.clone(),
            max_bytes_billed: settings.max_bytes_billed,
            query_timeout: settings.query_timeout,
            credentials,
        })
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["projects", self.project_id.as_str()])
                .extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Value, ToolError> {
        let token = self.credentials.token().await?;
        let resp = req
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ToolError::transport(SERVICE, e))?;
        if !resp.status().is_success() {
            return Err(google_error(SERVICE, resp).await);
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ToolError::transport(SERVICE, e))
    }

    /// Validate `sql` and estimate its cost without running it.
    pub async fn dry_run(&self, sql: &str) -> Result<DryRunResult, ToolError> {
        let mut job_ref = json!({ "projectId": self.project_id });
        if let Some(location) = &self.location {
            job_ref["location"] = json!(location);
        }
        let body = json!({
            "jobReference": job_ref,
            "configuration": {
                "dryRun": true,
                "query": {
                    "query": sql,
                    "useLegacySql": false,
                    "useQueryCache": false
                }
            }
        });

        let job = self
            .send(self.client.post(self.endpoint(&["jobs"], &[])).json(&body))
            .await?;

        let result = DryRunResult {
            statement_type: str_at(&job, "/statistics/query/statementType"),
            total_bytes_processed: int64_at(&job, "/statistics/query/totalBytesProcessed")
                .or_else(|| int64_at(&job, "/statistics/totalBytesProcessed")),
        };
        tracing::debug!(
            statement_type = ?result.statement_type,
            bytes = ?result.total_bytes_processed,
            "BigQuery dry run"
        );
        Ok(result)
    }

    /// Run `sql` with `maximumBytesBilled` set and return the first
    /// `max_rows` rows. Waits at most the configured query timeout.
    pub async fn execute_select(&self, sql: &str, max_rows: i64) -> Result<QueryResult, ToolError> {
        let deadline = Instant::now() + self.query_timeout;
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "useQueryCache": true,
            "maximumBytesBilled": self.max_bytes_billed.to_string(),
            "maxResults": max_rows,
            "timeoutMs": wait_ms(deadline),
            "formatOptions": { "useInt64Timestamp": true },
        });
        if let Some(location) = &self.location {
            body["location"] = json!(location);
        }

        let mut page = self
            .send(self.client.post(self.endpoint(&["queries"], &[])).json(&body))
            .await?;

        let job_id = str_at(&page, "/jobReference/jobId")
            .ok_or_else(|| ToolError::upstream(SERVICE, None, "response has no jobReference.jobId"))?;
        let location = str_at(&page, "/jobReference/location").or_else(|| self.location.clone());

        while !page["jobComplete"].as_bool().unwrap_or(false) {
            if Instant::now() >= deadline {
                return Err(ToolError::upstream(
                    SERVICE,
                    None,
                    format!(
                        "query {job_id} did not complete within {}s",
                        self.query_timeout.as_secs()
                    ),
                ));
            }
            tracing::debug!(job_id = %job_id, "waiting for BigQuery job");
            page = self.query_results(&job_id, location.as_deref(), max_rows, deadline).await?;
        }

        let schema: Vec<SchemaField> = page
            .pointer("/schema/fields")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ToolError::upstream(SERVICE, None, format!("unexpected schema: {e}")))?
            .unwrap_or_default();
        let raw_rows = page["rows"].as_array().map(Vec::as_slice).unwrap_or_default();
        let limit = usize::try_from(max_rows).unwrap_or(0);
        let rows: Vec<_> = rows::decode_rows(&schema, raw_rows).into_iter().take(limit).collect();

        let job = self.job_info(&job_id, location).await?;
        tracing::info!(
            job_id = %job.job_id,
            rows = rows.len(),
            bytes_billed = ?job.total_bytes_billed,
            "BigQuery query complete"
        );
        Ok(QueryResult { job, schema, rows })
    }

    async fn query_results(
        &self,
        job_id: &str,
        location: Option<&str>,
        max_rows: i64,
        deadline: Instant,
    ) -> Result<Value, ToolError> {
        let max_results = max_rows.to_string();
        let timeout_ms = wait_ms(deadline).to_string();
        let mut query = vec![
            ("maxResults", max_results.as_str()),
            ("timeoutMs", timeout_ms.as_str()),
            ("formatOptions.useInt64Timestamp", "true"),
        ];
        if let Some(location) = location {
            query.push(("location", location));
        }
        self.send(self.client.get(self.endpoint(&["queries", job_id], &query)))
            .await
    }

    /// Statement type and byte counters of a finished job.
    async fn job_info(&self, job_id: &str, location: Option<String>) -> Result<JobInfo, ToolError> {
        let query: Vec<(&str, &str)> = location.as_deref().map(|l| ("location", l)).into_iter().collect();
        let job = self
            .send(self.client.get(self.endpoint(&["jobs", job_id], &query)))
            .await?;

        Ok(JobInfo {
            job_id: job_id.to_string(),
            location: str_at(&job, "/jobReference/location").or(location),
            statement_type: str_at(&job, "/statistics/query/statementType"),
            total_bytes_processed: int64_at(&job, "/statistics/query/totalBytesProcessed"),
            total_bytes_billed: int64_at(&job, "/statistics/query/totalBytesBilled"),
        })
    }
}

fn wait_ms(deadline: Instant) -> u64 {
    let left = deadline.saturating_duration_since(Instant::now()).min(POLL_WAIT);
    left.as_millis().max(1) as u64
}

fn str_at(v: &Value, pointer: &str) -> Option<String> {
    v.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

/// int64 fields are JSON strings in the REST API.
fn int64_at(v: &Value, pointer: &str) -> Option<i64> {
    match v.pointer(pointer)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}
