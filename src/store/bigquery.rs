// src/store/bigquery.rs
//! BigQuery over its REST API.
//!
//! Auth: a service-account key file signs an RS256 JWT which is exchanged at
//! the key's `token_uri` for a bearer token. Tokens are cached until shortly
//! before they expire.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use super::warehouse::{SchemaField, Warehouse, WarehouseTarget};
use super::ArticleCollection;
use crate::config::secrets::GOOGLE_APPLICATION_CREDENTIALS;
use crate::config::SecretResolver;
use crate::error::{error_chain, PipelineError, Result};

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const INSERT_CHUNK: usize = 500;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                PipelineError::NotFound(format!("service account key {}", path.display()))
            }
            _ => PipelineError::Io(e),
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| PipelineError::InvalidInput(format!("service account key: {e}")))
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

pub struct BigQueryClient {
    http: reqwest::Client,
    key: ServiceAccountKey,
    base_url: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl BigQueryClient {
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-sentiment-dashboard/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PipelineError::UploadFailed(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            key,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Key file from `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn from_secrets(secrets: &SecretResolver) -> Result<Self> {
        let path = secrets.require(GOOGLE_APPLICATION_CREDENTIALS)?;
        Self::new(ServiceAccountKey::from_file(Path::new(&path))?)
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = base.trim_end_matches('/').to_string();
        self
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some((tok, until)) = cached.as_ref() {
            if Instant::now() < *until {
                return Ok(tok.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| PipelineError::InvalidInput(format!("service account private key: {e}")))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| PipelineError::InvalidInput(format!("signing token request: {e}")))?;

        #[derive(Deserialize)]
        struct TokenResp {
            access_token: String,
            #[serde(default)]
            expires_in: Option<u64>,
        }

        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::UploadFailed(format!("token exchange: {}", error_chain(&e))))?;
        let resp = check(resp).await.map_err(|m| PipelineError::UploadFailed(format!("token exchange: {m}")))?;
        let body: TokenResp = resp
            .json()
            .await
            .map_err(|e| PipelineError::UploadFailed(format!("token exchange: {e}")))?;

        // refresh a minute early
        let ttl = body.expires_in.unwrap_or(3600).saturating_sub(60);
        *cached = Some((body.access_token.clone(), Instant::now() + Duration::from_secs(ttl)));
        tracing::debug!(account = %self.key.client_email, "bigquery token refreshed");
        Ok(body.access_token)
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response> {
        let token = self.access_token().await?;
        req.bearer_auth(token)
            .send()
            .await
            .map_err(|e| PipelineError::UploadFailed(error_chain(&e)))
    }

    fn dataset_url(&self, t: &WarehouseTarget) -> String {
        format!("{}/projects/{}/datasets/{}", self.base_url, t.project, t.dataset)
    }

    fn table_url(&self, t: &WarehouseTarget) -> String {
        format!("{}/tables/{}", self.dataset_url(t), t.table)
    }
}

/// Pass 2xx through; otherwise the API's own error message (or the raw body).
async fn check(resp: reqwest::Response) -> std::result::Result<reqwest::Response, String> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let msg = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(300).collect());
    Err(format!("HTTP {status}: {}", msg.trim()))
}

#[async_trait]
impl Warehouse for BigQueryClient {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    async fn dataset_exists(&self, target: &WarehouseTarget) -> Result<bool> {
        let resp = self.send(self.http.get(self.dataset_url(target))).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(resp).await.map_err(PipelineError::UploadFailed)?;
        Ok(true)
    }

    async fn create_dataset(&self, target: &WarehouseTarget) -> Result<()> {
        let body = json!({
            "datasetReference": { "projectId": target.project, "datasetId": target.dataset },
            "location": target.location,
        });
        let url = format!("{}/projects/{}/datasets", self.base_url, target.project);
        let resp = self.send(self.http.post(url).json(&body)).await?;
        // lost a race with another writer
        if resp.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        check(resp).await.map_err(PipelineError::UploadFailed)?;
        Ok(())
    }

    async fn ensure_table(&self, target: &WarehouseTarget, schema: &[SchemaField]) -> Result<()> {
        let resp = self.send(self.http.get(self.table_url(target))).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            let body = json!({
                "tableReference": {
                    "projectId": target.project,
                    "datasetId": target.dataset,
                    "tableId": target.table,
                },
                "schema": { "fields": schema },
            });
            let url = format!("{}/tables", self.dataset_url(target));
            let resp = self.send(self.http.post(url).json(&body)).await?;
            check(resp).await.map_err(PipelineError::UploadFailed)?;
            tracing::info!(table = %target.qualified(), columns = schema.len(), "table created");
            return Ok(());
        }

        let table: Value = check(resp)
            .await
            .map_err(PipelineError::UploadFailed)?
            .json()
            .await
            .map_err(|e| PipelineError::UploadFailed(format!("decoding table: {e}")))?;
        let mut fields: Vec<Value> = table
            .pointer("/schema/fields")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let missing: Vec<&SchemaField> = schema
            .iter()
            .filter(|f| !fields.iter().any(|e| e.get("name").and_then(Value::as_str) == Some(f.name.as_str())))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        for f in &missing {
            fields.push(json!(f));
        }
        let body = json!({ "schema": { "fields": fields } });
        let resp = self.send(self.http.patch(self.table_url(target)).json(&body)).await?;
        check(resp).await.map_err(PipelineError::UploadFailed)?;
        tracing::info!(table = %target.qualified(), added = missing.len(), "table schema extended");
        Ok(())
    }

    async fn append_rows(&self, target: &WarehouseTarget, rows: &[Map<String, Value>]) -> Result<usize> {
        let url = format!("{}/insertAll", self.table_url(target));
        let mut sent = 0usize;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let body = json!({
                "rows": chunk.iter().map(|r| json!({ "json": r })).collect::<Vec<_>>(),
            });
            let resp = self.send(self.http.post(&url).json(&body)).await?;
            let out: Value = check(resp)
                .await
                .map_err(PipelineError::UploadFailed)?
                .json()
                .await
                .map_err(|e| PipelineError::UploadFailed(format!("decoding insert reply: {e}")))?;

            if let Some(errs) = out.get("insertErrors").and_then(Value::as_array) {
                if !errs.is_empty() {
                    let first = errs[0]
                        .pointer("/errors/0/message")
                        .and_then(Value::as_str)
                        .unwrap_or("row rejected");
                    return Err(PipelineError::UploadFailed(format!(
                        "{} row(s) rejected after {sent} accepted: {first}",
                        errs.len()
                    )));
                }
            }
            sent += chunk.len();
        }
        Ok(sent)
    }

    async fn fetch_recent(&self, target: &WarehouseTarget, limit: usize) -> Result<ArticleCollection> {
        let sql = format!(
            "SELECT * FROM `{}` ORDER BY publishedAt DESC LIMIT {}",
            target.qualified(),
            limit.max(1)
        );
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "location": target.location,
            "timeoutMs": 20_000,
        });
        let url = format!("{}/projects/{}/queries", self.base_url, target.project);
        let resp = self
            .send(self.http.post(url).json(&body))
            .await
            .map_err(|e| PipelineError::FetchFailed(e.to_string()))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(PipelineError::NotFound(format!("table {}", target.qualified())));
        }
        let out: QueryResponse = check(resp)
            .await
            .map_err(PipelineError::FetchFailed)?
            .json()
            .await
            .map_err(|e| PipelineError::FetchFailed(format!("decoding query result: {e}")))?;
        query_to_collection(out)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    schema: Option<QuerySchema>,
    #[serde(default)]
    rows: Vec<QueryRow>,
}

#[derive(Debug, Deserialize)]
struct QuerySchema {
    fields: Vec<SchemaField>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    f: Vec<QueryCell>,
}

#[derive(Debug, Deserialize)]
struct QueryCell {
    v: Value,
}

fn query_to_collection(out: QueryResponse) -> Result<ArticleCollection> {
    if !out.job_complete {
        return Err(PipelineError::FetchFailed("query did not finish in time".into()));
    }
    let fields = out.schema.map(|s| s.fields).unwrap_or_default();
    let headers: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
    let rows = out
        .rows
        .into_iter()
        .map(|r| {
            r.f.into_iter()
                .zip(&fields)
                .map(|(cell, field)| cell_text(&cell.v, &field.field_type))
                .collect()
        })
        .collect();
    ArticleCollection::from_records(&headers, rows)
}

/// Query results carry every value as a string; TIMESTAMPs as epoch seconds.
fn cell_text(v: &Value, field_type: &str) -> String {
    let Some(s) = v.as_str() else {
        return String::new();
    };
    if field_type == "TIMESTAMP" {
        if let Ok(secs) = s.parse::<f64>() {
            let micros = (secs * 1_000_000.0).round() as i64;
            if let Some(dt) = DateTime::<Utc>::from_timestamp_micros(micros) {
                return crate::news::format_timestamp(&dt);
            }
        }
    }
    s.to_string()
}
