//! `bigquery_select`: a single read-only query tool.
//!
//! Pipeline: normalize, refuse scripts, require a leading SELECT, dry run
//! (statement type must be SELECT), cost gate on the estimate, clamp the row
//! count, execute.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, tool_def};
use crate::bigquery::BigQueryService;
use crate::config::BigQuerySettings;
use crate::error::ToolError;
use crate::guardrails::{clamp_rows, enforce_estimated_bytes, ensure_select, normalize_sql, reject_multiple_statements};

pub const SELECT: &str = "bigquery_select";

pub struct BigQueryTools {
    service: BigQueryService,
    max_bytes_billed: i64,
    default_limit: i64,
    max_return_rows: i64,
}

#[derive(Debug, Deserialize)]
struct SelectArgs {
    sql: String,
    #[serde(default)]
    max_rows: Option<i64>,
}

impl BigQueryTools {
    pub fn new(service: BigQueryService, settings: &BigQuerySettings) -> Self {
        Self {
            service,
            max_bytes_billed: settings.max_bytes_billed,
            default_limit: settings.default_limit,
            max_return_rows: settings.max_return_rows,
        }
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        match name {
            SELECT => self.select(parse_args(arguments)?).await,
            other => Err(ToolError::invalid(format!("Unknown tool: {other}"))),
        }
    }

    async fn select(&self, args: SelectArgs) -> Result<Value, ToolError> {
        let cleaned = normalize_sql(&args.sql)?;
        let statement = reject_multiple_statements(&cleaned)?;
        ensure_select(statement)?;

        let dry = self.service.dry_run(statement).await?;
        let statement_type = dry.statement_type.as_deref().unwrap_or_default();
        if !statement_type.eq_ignore_ascii_case("SELECT") {
            return Err(ToolError::rejected(format!(
                "Only SELECT queries are allowed. Detected statement_type={}",
                dry.statement_type.as_deref().map_or("None".to_string(), |t| format!("'{t}'"))
            )));
        }

        enforce_estimated_bytes(dry.total_bytes_processed, self.max_bytes_billed)?;

        let max_rows = clamp_rows(args.max_rows, self.default_limit, self.max_return_rows);
        let result = self.service.execute_select(statement, max_rows).await?;

        Ok(json!({
            "ok": true,
            "query": statement,
            "dry_run": dry,
            "job": result.job,
            "result": {
                "max_rows": max_rows,
                "returned_rows": result.rows.len(),
                "schema": result.schema,
                "rows": result.rows,
            },
        }))
    }
}

pub fn definitions() -> Vec<Value> {
    vec![tool_def(
        SELECT,
        "Run a READ-ONLY BigQuery query (SELECT only). Scripts, DML and DDL are rejected; \
         the estimated bytes processed are capped server-side.",
        json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string", "description": "SQL query string. Only SELECT queries are allowed." },
                "max_rows": { "type": "integer", "description": "Maximum rows returned to the client (server-enforced cap)." }
            },
            "required": ["sql"]
        }),
    )]
}
