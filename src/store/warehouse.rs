// src/store/warehouse.rs
//! Warehouse upload: dataset/table identifiers, schema inference and the
//! create-if-absent-then-append flow shared by every [`Warehouse`] backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::collection::PUBLISHED_AT;
use super::ArticleCollection;
use crate::config::secrets::{DATASET_ID, GCP_PROJECT_ID, TABLE_ID};
use crate::config::{SecretResolver, Settings};
use crate::error::{PipelineError, Result};

pub const DEFAULT_DATASET: &str = "news_dataset_asia";
pub const DEFAULT_TABLE: &str = "news_with_sentiment";

static RE_PROJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9\-.:]{4,62}[a-z0-9]$").expect("project regex"));
static RE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,1023}$").expect("name regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseTarget {
    pub project: String,
    pub dataset: String,
    pub table: String,
    /// Region used when the dataset has to be created.
    pub location: String,
}

impl WarehouseTarget {
    pub fn new(project: &str, dataset: &str, table: &str, location: &str) -> Result<Self> {
        if !RE_PROJECT.is_match(project) {
            return Err(PipelineError::InvalidInput(format!("invalid project id '{project}'")));
        }
        for (what, v) in [("dataset", dataset), ("table", table)] {
            if !RE_NAME.is_match(v) {
                return Err(PipelineError::InvalidInput(format!("invalid {what} id '{v}'")));
            }
        }
        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
            location: location.to_string(),
        })
    }

    /// Project is required; dataset and table fall back to the defaults.
    pub fn from_secrets(secrets: &SecretResolver, settings: &Settings) -> Result<Self> {
        let project = secrets.require(GCP_PROJECT_ID)?;
        let dataset = secrets.get(DATASET_ID).unwrap_or_else(|| DEFAULT_DATASET.to_string());
        let table = secrets.get(TABLE_ID).unwrap_or_else(|| DEFAULT_TABLE.to_string());
        Self::new(&project, &dataset, &table, &settings.warehouse_location)
    }

    /// `project.dataset.table`
    pub fn qualified(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default = "nullable")]
    pub mode: String,
}

fn nullable() -> String {
    "NULLABLE".to_string()
}

impl SchemaField {
    fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            mode: nullable(),
        }
    }
}

/// `publishedAt` is a TIMESTAMP, every other column a STRING.
pub fn infer_schema(coll: &ArticleCollection) -> Vec<SchemaField> {
    coll.column_names()
        .iter()
        .map(|c| {
            let ty = if c == PUBLISHED_AT { "TIMESTAMP" } else { "STRING" };
            SchemaField::new(c, ty)
        })
        .collect()
}

/// One JSON object per row; empty cells become `null`.
pub fn row_objects(coll: &ArticleCollection) -> Vec<Map<String, Value>> {
    let names = coll.column_names();
    coll.rows()
        .map(|cells| {
            names
                .iter()
                .zip(cells)
                .map(|(n, v)| {
                    let v = if v.is_empty() { Value::Null } else { Value::String(v) };
                    (n.clone(), v)
                })
                .collect()
        })
        .collect()
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    fn name(&self) -> &'static str;
    async fn dataset_exists(&self, target: &WarehouseTarget) -> Result<bool>;
    async fn create_dataset(&self, target: &WarehouseTarget) -> Result<()>;
    /// Create the table, or add columns it is missing.
    async fn ensure_table(&self, target: &WarehouseTarget, schema: &[SchemaField]) -> Result<()>;
    /// Returns once the warehouse has accepted every row.
    async fn append_rows(&self, target: &WarehouseTarget, rows: &[Map<String, Value>]) -> Result<usize>;
    /// Newest rows first.
    async fn fetch_recent(&self, target: &WarehouseTarget, limit: usize) -> Result<ArticleCollection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub dataset_created: bool,
    pub rows: usize,
}

/// Create the dataset if absent, make sure the table fits the collection,
/// then append every row. Any warehouse error is an `UploadFailed`.
pub async fn upload(
    coll: &ArticleCollection,
    target: &WarehouseTarget,
    wh: &dyn Warehouse,
) -> Result<UploadReport> {
    if coll.is_empty() {
        return Err(PipelineError::InvalidInput("nothing to upload".into()));
    }
    let res = upload_inner(coll, target, wh).await;
    match &res {
        Ok(r) => {
            metrics::counter!("warehouse_upload_rows_total").increment(r.rows as u64);
            tracing::info!(
                warehouse = wh.name(),
                table = %target.qualified(),
                rows = r.rows,
                dataset_created = r.dataset_created,
                "warehouse upload complete"
            );
        }
        Err(e) => {
            metrics::counter!("warehouse_upload_errors_total").increment(1);
            tracing::warn!(warehouse = wh.name(), table = %target.qualified(), error = %e, "warehouse upload failed");
        }
    }
    res
}

async fn upload_inner(
    coll: &ArticleCollection,
    target: &WarehouseTarget,
    wh: &dyn Warehouse,
) -> Result<UploadReport> {
    let exists = wh.dataset_exists(target).await.map_err(as_upload)?;
    if !exists {
        tracing::info!(dataset = %target.dataset, location = %target.location, "creating dataset");
        wh.create_dataset(target).await.map_err(as_upload)?;
    }
    wh.ensure_table(target, &infer_schema(coll))
        .await
        .map_err(as_upload)?;
    let rows = wh
        .append_rows(target, &row_objects(coll))
        .await
        .map_err(as_upload)?;
    Ok(UploadReport {
        dataset_created: !exists,
        rows,
    })
}

fn as_upload(e: PipelineError) -> PipelineError {
    match e {
        PipelineError::UploadFailed(_) => e,
        other => PipelineError::UploadFailed(other.to_string()),
    }
}

// ------------------------------------------------------------
// In-process warehouse (tests, CLI --dry-run)
// ------------------------------------------------------------

#[derive(Debug, Default)]
struct MemTable {
    schema: Vec<SchemaField>,
    rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    datasets: Mutex<HashSet<String>>,
    tables: Mutex<HashMap<String, MemTable>>,
    dataset_creates: AtomicUsize,
    fail_appends: Option<String>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every append fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_appends: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn dataset_creates(&self) -> usize {
        self.dataset_creates.load(Ordering::SeqCst)
    }

    pub fn row_count(&self, target: &WarehouseTarget) -> usize {
        self.tables
            .lock()
            .expect("memory warehouse poisoned")
            .get(&target.qualified())
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    pub fn columns(&self, target: &WarehouseTarget) -> Vec<String> {
        self.tables
            .lock()
            .expect("memory warehouse poisoned")
            .get(&target.qualified())
            .map(|t| t.schema.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn dataset_exists(&self, target: &WarehouseTarget) -> Result<bool> {
        let key = format!("{}.{}", target.project, target.dataset);
        Ok(self.datasets.lock().expect("memory warehouse poisoned").contains(&key))
    }

    async fn create_dataset(&self, target: &WarehouseTarget) -> Result<()> {
        let key = format!("{}.{}", target.project, target.dataset);
        let mut ds = self.datasets.lock().expect("memory warehouse poisoned");
        if ds.insert(key) {
            self.dataset_creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn ensure_table(&self, target: &WarehouseTarget, schema: &[SchemaField]) -> Result<()> {
        let mut tables = self.tables.lock().expect("memory warehouse poisoned");
        let t = tables.entry(target.qualified()).or_default();
        for f in schema {
            if !t.schema.iter().any(|e| e.name == f.name) {
                t.schema.push(f.clone());
            }
        }
        Ok(())
    }

    async fn append_rows(&self, target: &WarehouseTarget, rows: &[Map<String, Value>]) -> Result<usize> {
        if let Some(msg) = &self.fail_appends {
            return Err(PipelineError::UploadFailed(msg.clone()));
        }
        let mut tables = self.tables.lock().expect("memory warehouse poisoned");
        let t = tables
            .get_mut(&target.qualified())
            .ok_or_else(|| PipelineError::NotFound(format!("table {}", target.qualified())))?;
        t.rows.extend(rows.iter().cloned());
        Ok(rows.len())
    }

    async fn fetch_recent(&self, target: &WarehouseTarget, limit: usize) -> Result<ArticleCollection> {
        let (headers, rows) = {
            let tables = self.tables.lock().expect("memory warehouse poisoned");
            let t = tables
                .get(&target.qualified())
                .ok_or_else(|| PipelineError::NotFound(format!("table {}", target.qualified())))?;
            let headers: Vec<String> = t.schema.iter().map(|f| f.name.clone()).collect();
            let rows: Vec<Vec<String>> = t
                .rows
                .iter()
                .map(|r| {
                    headers
                        .iter()
                        .map(|h| r.get(h).and_then(Value::as_str).unwrap_or("").to_string())
                        .collect()
                })
                .collect();
            (headers, rows)
        };
        let coll = ArticleCollection::from_records(&headers, rows)?.sorted_by_published_desc();
        let keep: Vec<usize> = (0..coll.len().min(limit)).collect();
        Ok(coll.select(&keep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::Article;
    use crate::sentiment::SentimentLabel;

    fn target() -> WarehouseTarget {
        WarehouseTarget::new("demo-project", DEFAULT_DATASET, DEFAULT_TABLE, "asia-south1").unwrap()
    }

    fn coll(n: usize) -> ArticleCollection {
        let articles = (0..n)
            .map(|i| Article {
                title: format!("t{i}"),
                description: None,
                published_at: None,
                source: Some("Wire".into()),
                url: format!("https://example.com/{i}"),
            })
            .collect();
        let mut c = ArticleCollection::new(articles);
        c.set_label_column("bert_sentiment", vec![Some(SentimentLabel::Positive); n])
            .unwrap();
        c
    }

    #[test]
    fn schema_types() {
        let s = infer_schema(&coll(1));
        assert_eq!(s.len(), 6);
        assert_eq!(s[2].name, "publishedAt");
        assert_eq!(s[2].field_type, "TIMESTAMP");
        assert!(s.iter().filter(|f| f.name != "publishedAt").all(|f| f.field_type == "STRING"));
    }

    #[test]
    fn rows_use_null_for_empty_cells() {
        let rows = row_objects(&coll(1));
        assert_eq!(rows[0]["description"], Value::Null);
        assert_eq!(rows[0]["bert_sentiment"], Value::String("Positive".into()));
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(WarehouseTarget::new("demo-project", "ok_ds", "tbl", "US").is_ok());
        assert!(WarehouseTarget::new("demo-project", "bad-ds", "tbl", "US").is_err());
        assert!(WarehouseTarget::new("x", "ds", "tbl", "US").is_err());
        assert!(WarehouseTarget::new("demo-project", "ds", "t`; DROP", "US").is_err());
    }

    #[tokio::test]
    async fn dataset_created_once() {
        let wh = MemoryWarehouse::new();
        let t = target();
        let first = upload(&coll(2), &t, &wh).await.unwrap();
        let second = upload(&coll(3), &t, &wh).await.unwrap();
        assert!(first.dataset_created);
        assert!(!second.dataset_created);
        assert_eq!(wh.dataset_creates(), 1);
        assert_eq!(wh.row_count(&t), 5);
    }

    #[tokio::test]
    async fn failures_are_upload_failed_verbatim() {
        let wh = MemoryWarehouse::failing("quota exceeded for table");
        let err = upload(&coll(1), &target(), &wh).await.unwrap_err();
        assert!(matches!(err, PipelineError::UploadFailed(ref m) if m == "quota exceeded for table"));
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let wh = MemoryWarehouse::new();
        let err = upload(&ArticleCollection::default(), &target(), &wh).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(wh.dataset_creates(), 0);
    }
}
