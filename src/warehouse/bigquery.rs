// src/warehouse/bigquery.rs

use anyhow::{anyhow, bail, Context, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    auth::TokenProvider,
    encode::batch_to_parquet,
    rows::{rows_to_batch, TableRow, TableSchema},
    TableSink, TableSource,
};
use crate::config::{Config, TableRef};

/// How long a single `queries` call may block server-side.
const QUERY_TIMEOUT_MS: u64 = 10_000;
const UPLOAD_BOUNDARY: &str = "incident_dashboard_load_boundary";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// Thin client over the BigQuery v2 REST API: one paged read, one
/// truncating load job.
pub struct BigQueryClient {
    http: Client,
    api_base: Url,
    project_id: String,
    tokens: TokenProvider,
    poll_interval: Duration,
    max_polls: u32,
}

impl BigQueryClient {
    pub fn new(http: Client, cfg: &Config, tokens: TokenProvider) -> Result<Self> {
        let api_base = Url::parse(&cfg.api_base)
            .with_context(|| format!("invalid api_base `{}`", cfg.api_base))?;
        Ok(Self {
            http,
            api_base,
            project_id: cfg.project_id.clone(),
            tokens,
            poll_interval: Duration::from_millis(cfg.write_back.poll_interval_ms),
            max_polls: cfg.write_back.max_polls,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .with_context(|| format!("building BigQuery URL for {}", path))
    }

    async fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        Ok(req.bearer_auth(self.tokens.token().await?))
    }

    /// Run `sql` and collect every result row, following job completion
    /// and page tokens.
    pub async fn query_all(&self, sql: &str) -> Result<RecordBatch> {
        let start = Instant::now();
        let url = self.endpoint(&format!("bigquery/v2/projects/{}/queries", self.project_id))?;
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
            "formatOptions": { "useInt64Timestamp": true },
        });
        debug!(sql, "submitting query");
        let mut resp: QueryResponse = self
            .authed(self.http.post(url).json(&body))
            .await?
            .send()
            .await
            .context("sending query")?
            .error_for_status()
            .context("query rejected")?
            .json()
            .await
            .context("decoding query response")?;

        let mut schema = None;
        let mut rows: Vec<TableRow> = Vec::new();
        loop {
            if resp.job_complete {
                if schema.is_none() {
                    schema = resp.schema.take();
                }
                rows.append(&mut resp.rows);
                if resp.page_token.is_none() {
                    break;
                }
            }
            let job = resp
                .job_reference
                .clone()
                .ok_or_else(|| anyhow!("query response has no jobReference"))?;
            let page_token = if resp.job_complete {
                resp.page_token.clone()
            } else {
                None
            };
            resp = self.query_results(&job, page_token.as_deref()).await?;
        }

        let schema = schema.ok_or_else(|| anyhow!("query finished without a schema"))?;
        let batch = rows_to_batch(&schema, &rows)?;
        info!(rows = batch.num_rows(), elapsed = ?start.elapsed(), "query complete");
        Ok(batch)
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let mut url = self.endpoint(&format!(
            "bigquery/v2/projects/{}/queries/{}",
            job.project_id, job.job_id
        ))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("timeoutMs", &QUERY_TIMEOUT_MS.to_string());
            q.append_pair("formatOptions.useInt64Timestamp", "true");
            if let Some(loc) = &job.location {
                q.append_pair("location", loc);
            }
            if let Some(tok) = page_token {
                q.append_pair("pageToken", tok);
            }
        }
        debug!(job_id = %job.job_id, page = page_token.is_some(), "fetching query results");
        self.authed(self.http.get(url))
            .await?
            .send()
            .await
            .context("fetching query results")?
            .error_for_status()
            .context("query results rejected")?
            .json()
            .await
            .context("decoding query results")
    }

    /// Upload `batch` as Parquet into a `WRITE_TRUNCATE` load job and wait
    /// for it to finish.
    pub async fn load_truncate(&self, table: &TableRef, batch: &RecordBatch) -> Result<u64> {
        let start = Instant::now();
        let parquet = batch_to_parquet(batch)?;
        let config = json!({
            "configuration": {
                "load": {
                    "destinationTable": table,
                    "sourceFormat": "PARQUET",
                    "writeDisposition": "WRITE_TRUNCATE",
                    "createDisposition": "CREATE_IF_NEEDED",
                }
            }
        });
        let body = multipart_related(&serde_json::to_vec(&config)?, &parquet);

        let mut url = self.endpoint(&format!(
            "upload/bigquery/v2/projects/{}/jobs",
            self.project_id
        ))?;
        url.query_pairs_mut().append_pair("uploadType", "multipart");

        info!(table = %table, rows = batch.num_rows(), bytes = parquet.len(), "starting load job");
        let mut job: Job = self
            .authed(
                self.http
                    .post(url)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/related; boundary={}", UPLOAD_BOUNDARY),
                    )
                    .body(body),
            )
            .await?
            .send()
            .await
            .context("uploading load job")?
            .error_for_status()
            .context("load job rejected")?
            .json()
            .await
            .context("decoding load job")?;

        let mut polls = 0;
        while job.status.state != "DONE" {
            if polls >= self.max_polls {
                bail!(
                    "load job {} still {} after {} polls",
                    job.job_reference.job_id,
                    job.status.state,
                    polls
                );
            }
            tokio::time::sleep(self.poll_interval).await;
            job = self.get_job(&job.job_reference).await?;
            polls += 1;
        }

        if let Some(err) = job.status.error_result {
            warn!(job_id = %job.job_reference.job_id, reason = %err.reason, "load job failed");
            bail!(
                "load job {} into {} failed: {}: {}",
                job.job_reference.job_id,
                table,
                err.reason,
                err.message
            );
        }

        info!(
            table = %table,
            job_id = %job.job_reference.job_id,
            elapsed = ?start.elapsed(),
            "load job done"
        );
        Ok(batch.num_rows() as u64)
    }

    async fn get_job(&self, job: &JobReference) -> Result<Job> {
        let mut url = self.endpoint(&format!(
            "bigquery/v2/projects/{}/jobs/{}",
            job.project_id, job.job_id
        ))?;
        if let Some(loc) = &job.location {
            url.query_pairs_mut().append_pair("location", loc);
        }
        self.authed(self.http.get(url))
            .await?
            .send()
            .await
            .context("polling load job")?
            .error_for_status()
            .context("load job poll rejected")?
            .json()
            .await
            .context("decoding load job status")
    }
}

/// Body for the `uploadType=multipart` endpoint: JSON metadata, then data.
fn multipart_related(metadata: &[u8], data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", UPLOAD_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{}\r\n", UPLOAD_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", UPLOAD_BOUNDARY).as_bytes());
    body
}

#[async_trait]
impl TableSource for BigQueryClient {
    async fn fetch_table(&self, table: &TableRef) -> Result<RecordBatch> {
        self.query_all(&format!("SELECT * FROM `{}`", table)).await
    }
}

#[async_trait]
impl TableSink for BigQueryClient {
    async fn replace_table(&self, table: &TableRef, batch: &RecordBatch) -> Result<u64> {
        self.load_truncate(table, batch).await
    }
}
