// src/dashboard/api.rs
//! HTTP surface of the dashboard: shared state, the HTML page and the JSON API.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, services::ServeDir};

use super::render::{render_page, Notice, PageContext};
use super::view::{build_view, DashboardView};
use crate::config::secrets::{GNEWS_API_KEY, GOOGLE_APPLICATION_CREDENTIALS, OPENAI_API_KEY};
use crate::config::{Capabilities, SecretResolver, Settings};
use crate::error::{PipelineError, Result};
use crate::news::{ArticleFetcher, FetchQuery, GNewsClient};
use crate::sentiment::llm::{build_provider, ChatProvider};
use crate::sentiment::model::{load_model, BinaryTextModel};
use crate::sentiment::{
    classify_collection, BatchOptions, BatchReport, LexiconAnalyzer, LlmClassifier,
    ModelClassifier, SentimentBackend, Strategy, TextField,
};
use crate::store::{
    upload, ArticleCollection, BigQueryClient, CsvStore, UploadReport, Warehouse, WarehouseTarget,
    FETCH_OUTPUT,
};

/// Files the page opens by default, most processed first.
const PREFERRED_FILES: [&str; 4] = [
    "news_with_sentiment.csv",
    "news_with_bert_sentiment.csv",
    "news_with_gpt_sentiment.csv",
    FETCH_OUTPUT,
];
const WAREHOUSE_RECENT_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: CsvStore,
    fetcher: Option<Arc<dyn ArticleFetcher>>,
    llm: Option<Arc<dyn ChatProvider>>,
    warehouse: Option<Arc<dyn Warehouse>>,
    target: Option<WarehouseTarget>,
    /// Features whose secrets are present but whose client could not be built.
    setup_errors: Arc<Vec<String>>,
    model: Arc<OnceCell<Arc<dyn BinaryTextModel>>>,
    last_fetched: Arc<RwLock<Option<ArticleCollection>>>,
}

impl AppState {
    /// Nothing optional configured: CSV browsing plus lexicon and model strategies.
    pub fn new(settings: Settings) -> Self {
        Self {
            store: CsvStore::new(settings.data_dir.clone()),
            settings: Arc::new(settings),
            fetcher: None,
            llm: None,
            warehouse: None,
            target: None,
            setup_errors: Arc::new(Vec::new()),
            model: Arc::new(OnceCell::new()),
            last_fetched: Arc::new(RwLock::new(None)),
        }
    }

    /// Wire every optional feature whose secrets resolve.
    /// A missing secret disables the feature; any other setup error is kept
    /// and shown on the page.
    pub fn from_config(settings: Settings, secrets: &SecretResolver) -> Self {
        let mut state = Self::new(settings);
        let mut errors = Vec::new();

        match GNewsClient::from_config(secrets, &state.settings) {
            Ok(c) => state.fetcher = Some(Arc::new(c)),
            Err(PipelineError::ConfigMissing(_)) => {}
            Err(e) => errors.push(format!("News search: {e}")),
        }
        match build_provider(secrets, &state.settings) {
            Ok(p) => state.llm = Some(p),
            Err(PipelineError::ConfigMissing(_)) => {}
            Err(e) => errors.push(format!("LLM: {e}")),
        }
        if secrets.capabilities().has_warehouse {
            let wired = WarehouseTarget::from_secrets(secrets, &state.settings).and_then(|t| {
                BigQueryClient::from_secrets(secrets).map(|c| (t, c))
            });
            match wired {
                Ok((t, c)) => {
                    state.target = Some(t);
                    state.warehouse = Some(Arc::new(c));
                }
                Err(e) => errors.push(format!("Warehouse: {e}")),
            }
        }

        for e in &errors {
            tracing::warn!(error = %e, "feature configured but unavailable");
        }
        state.setup_errors = Arc::new(errors);
        let caps = state.capabilities();
        tracing::info!(
            fetch = caps.has_fetch,
            llm = caps.has_llm,
            warehouse = caps.has_warehouse,
            data_dir = %state.settings.data_dir.display(),
            "dashboard state ready"
        );
        state
    }

    pub fn with_fetcher(mut self, f: Arc<dyn ArticleFetcher>) -> Self {
        self.fetcher = Some(f);
        self
    }

    pub fn with_llm(mut self, p: Arc<dyn ChatProvider>) -> Self {
        self.llm = Some(p);
        self
    }

    pub fn with_warehouse(mut self, wh: Arc<dyn Warehouse>, target: WarehouseTarget) -> Self {
        self.warehouse = Some(wh);
        self.target = Some(target);
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_fetch: self.fetcher.is_some(),
            has_llm: self.llm.is_some(),
            has_warehouse: self.warehouse.is_some() && self.target.is_some(),
        }
    }

    /// Loaded on first use, then shared.
    fn model(&self) -> Result<Arc<dyn BinaryTextModel>> {
        self.model
            .get_or_try_init(|| load_model(&self.settings))
            .cloned()
    }

    fn backend(&self, strategy: Strategy) -> Result<Box<dyn SentimentBackend>> {
        let backend: Box<dyn SentimentBackend> = match strategy {
            Strategy::Lexicon => Box::new(LexiconAnalyzer::new()),
            Strategy::Model => Box::new(ModelClassifier::new(self.model()?)),
            Strategy::Llm => {
                let p = self
                    .llm
                    .clone()
                    .ok_or_else(|| PipelineError::ConfigMissing(OPENAI_API_KEY.into()))?;
                Box::new(LlmClassifier::new(p, self.settings.llm_max_input_chars))
            }
        };
        Ok(backend)
    }

    fn warehouse(&self) -> Result<(Arc<dyn Warehouse>, WarehouseTarget)> {
        match (&self.warehouse, &self.target) {
            (Some(w), Some(t)) => Ok((w.clone(), t.clone())),
            _ => Err(PipelineError::ConfigMissing(GOOGLE_APPLICATION_CREDENTIALS.into())),
        }
    }

    async fn load(&self, name: &str) -> Result<ArticleCollection> {
        let store = self.store.clone();
        let name = name.to_string();
        blocking(move || store.load(&name)).await
    }

    async fn save(&self, coll: ArticleCollection, name: &str) -> Result<()> {
        let store = self.store.clone();
        let name = name.to_string();
        blocking(move || store.save(&coll, &name).map(|_| ())).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        let store = self.store.clone();
        blocking(move || store.list()).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/", get(index))
        .route("/api/config", get(config))
        .route("/api/files", get(files))
        .route("/api/articles", get(articles))
        .route("/api/download", get(download))
        .route("/api/fetch", post(fetch))
        .route("/api/classify", post(classify))
        .route("/api/upload", post(upload_file))
        .route("/api/warehouse/recent", get(warehouse_recent))
        .nest_service("/assets", ServeDir::new("assets"))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ------------------------------------------------------------
// Page
// ------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    column: Option<String>,
    /// `warehouse` to show the latest warehouse rows instead of a file.
    #[serde(default)]
    source: Option<String>,
}

async fn index(State(state): State<AppState>, Query(q): Query<PageQuery>) -> Html<String> {
    let caps = state.capabilities();
    let mut ctx = PageContext {
        caps,
        keyword: q.keyword.clone(),
        warehouse_table: state.target.as_ref().map(WarehouseTarget::qualified),
        default_max_items: state.settings.default_max_items,
        ..Default::default()
    };
    ctx.notices.extend(
        state
            .setup_errors
            .iter()
            .map(|e| Notice::Failed(format!("{e} (check the configured secrets)"))),
    );

    match state.list().await {
        Ok(f) => ctx.files = f,
        Err(e) => ctx.notices.push(Notice::Failed(format!("Listing data files failed: {e}"))),
    }

    if q.source.as_deref() == Some("warehouse") {
        match warehouse_view(&state, q.keyword.as_deref(), q.column.as_deref()).await {
            Ok(v) => ctx.view = Some(v),
            Err(e) => ctx.notices.push(notice_for(&e)),
        }
        return Html(render_page(&ctx));
    }

    let selected = q.file.clone().filter(|f| !f.is_empty()).or_else(|| {
        PREFERRED_FILES
            .iter()
            .map(|s| s.to_string())
            .find(|f| ctx.files.contains(f))
            .or_else(|| ctx.files.first().cloned())
    });
    let Some(file) = selected else {
        ctx.notices.push(Notice::NoData(
            "No data yet. Fetch news or run a classifier to create a CSV file.".into(),
        ));
        return Html(render_page(&ctx));
    };

    let loaded = state.load(&file).await.and_then(|c| {
        if c.is_empty() {
            ctx.notices
                .push(Notice::NoData(format!("No data found in {file}.")));
        }
        build_view(&c, &file, q.keyword.as_deref(), q.column.as_deref())
    });
    match loaded {
        Ok(v) => {
            if v.keyword.is_none() && v.total_rows > 0 {
                ctx.notices
                    .push(Notice::Info(format!("Loaded {} articles from {file}", v.total_rows)));
            }
            ctx.view = Some(v);
        }
        Err(e) => ctx.notices.push(notice_for(&e)),
    }
    ctx.selected_file = Some(file);
    Html(render_page(&ctx))
}

fn notice_for(e: &PipelineError) -> Notice {
    match e {
        PipelineError::ConfigMissing(k) => {
            Notice::NotConfigured(format!("{k} is not configured; this feature is disabled."))
        }
        PipelineError::NotFound(what) => Notice::NoData(format!(
            "{what} not found. Use fetch or analyze to create it."
        )),
        other => Notice::Failed(other.to_string()),
    }
}

async fn warehouse_view(
    state: &AppState,
    keyword: Option<&str>,
    column: Option<&str>,
) -> Result<DashboardView> {
    let (wh, target) = state.warehouse()?;
    let coll = wh.fetch_recent(&target, WAREHOUSE_RECENT_LIMIT).await?;
    build_view(&coll, &target.qualified(), keyword, column)
}

// ------------------------------------------------------------
// Read-only JSON
// ------------------------------------------------------------

#[derive(Serialize)]
struct ConfigOut {
    capabilities: Capabilities,
    data_dir: String,
    llm_model: String,
    warehouse_table: Option<String>,
    warehouse_location: String,
    default_max_items: usize,
    setup_errors: Vec<String>,
}

async fn config(State(state): State<AppState>) -> Json<ConfigOut> {
    Json(ConfigOut {
        capabilities: state.capabilities(),
        data_dir: state.settings.data_dir.display().to_string(),
        llm_model: state.settings.llm_model.clone(),
        warehouse_table: state.target.as_ref().map(WarehouseTarget::qualified),
        warehouse_location: state.settings.warehouse_location.clone(),
        default_max_items: state.settings.default_max_items,
        setup_errors: state.setup_errors.as_ref().clone(),
    })
}

#[derive(Serialize)]
struct FilesOut {
    files: Vec<String>,
}

async fn files(State(state): State<AppState>) -> Result<Json<FilesOut>> {
    Ok(Json(FilesOut {
        files: state.list().await?,
    }))
}

#[derive(Debug, Deserialize)]
struct ArticlesQuery {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    column: Option<String>,
}

/// `file` absent: the most recently fetched collection.
async fn articles(
    State(state): State<AppState>,
    Query(q): Query<ArticlesQuery>,
) -> Result<Json<DashboardView>> {
    let (coll, source) = match q.file.filter(|f| !f.is_empty()) {
        Some(f) => (state.load(&f).await?, f),
        None => (last_fetched(&state).await?, "last fetch".to_string()),
    };
    Ok(Json(build_view(&coll, &source, q.keyword.as_deref(), q.column.as_deref())?))
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    file: String,
}

async fn download(
    State(state): State<AppState>,
    Query(q): Query<DownloadQuery>,
) -> Result<impl IntoResponse> {
    let coll = state.load(&q.file).await?;
    let bytes = CsvStore::to_bytes(&coll)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", q.file),
            ),
        ],
        bytes,
    ))
}

async fn last_fetched(state: &AppState) -> Result<ArticleCollection> {
    state
        .last_fetched
        .read()
        .await
        .clone()
        .ok_or_else(|| PipelineError::NotFound("fetched articles (run a fetch first)".into()))
}

// ------------------------------------------------------------
// Actions
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FetchReq {
    query: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    max: Option<u32>,
    /// Output file; defaults to `gnews_output.csv`.
    #[serde(default)]
    file: Option<String>,
}

#[derive(Debug, Serialize)]
struct FetchOut {
    fetched: usize,
    file: Option<String>,
    message: String,
}

async fn fetch(State(state): State<AppState>, Json(req): Json<FetchReq>) -> Result<Json<FetchOut>> {
    let fetcher = state
        .fetcher
        .clone()
        .ok_or_else(|| PipelineError::ConfigMissing(GNEWS_API_KEY.into()))?;
    if req.query.trim().is_empty() {
        return Err(PipelineError::InvalidInput("query must not be empty".into()));
    }

    let mut query = FetchQuery::new(req.query.trim())
        .max(req.max.unwrap_or(state.settings.default_max_items as u32));
    if let Some(l) = req.lang.filter(|s| !s.is_empty()) {
        query = query.lang(l);
    }
    if let Some(c) = req.country.filter(|s| !s.is_empty()) {
        query = query.country(c);
    }

    let coll = fetcher.fetch(&query).await?.dedup_by_url();
    if coll.is_empty() {
        return Ok(Json(FetchOut {
            fetched: 0,
            file: None,
            message: format!("No articles found for '{}'", query.query),
        }));
    }

    let file = req.file.unwrap_or_else(|| FETCH_OUTPUT.to_string());
    state.save(coll.clone(), &file).await?;
    let fetched = coll.len();
    *state.last_fetched.write().await = Some(coll);

    Ok(Json(FetchOut {
        fetched,
        message: format!("Fetched {fetched} articles about '{}'", query.query),
        file: Some(file),
    }))
}

#[derive(Debug, Deserialize)]
struct ClassifyReq {
    strategy: Strategy,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    use_last_fetched: bool,
    #[serde(default)]
    field: TextField,
    #[serde(default)]
    max_items: Option<usize>,
    /// Output file; defaults to the strategy's usual file name.
    #[serde(default)]
    output: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClassifyOut {
    file: String,
    report: BatchReport,
}

async fn classify(
    State(state): State<AppState>,
    Json(req): Json<ClassifyReq>,
) -> Result<Json<ClassifyOut>> {
    let backend = state.backend(req.strategy)?;
    let mut coll = match (req.use_last_fetched, req.file.as_deref().filter(|f| !f.is_empty())) {
        (true, _) => last_fetched(&state).await?,
        (false, Some(f)) => state.load(f).await?,
        (false, None) => {
            return Err(PipelineError::InvalidInput(
                "give a file or set use_last_fetched".into(),
            ))
        }
    };

    let opts = BatchOptions {
        field: req.field,
        max_items: req
            .max_items
            .or_else(|| req.strategy.default_max_items(state.settings.default_max_items)),
        column: None,
    };
    let report = classify_collection(&mut coll, backend.as_ref(), &opts, |p| {
        tracing::debug!(row = p.index, total = p.total, label = %p.label, "classified");
    })
    .await?;

    let file = req
        .output
        .unwrap_or_else(|| req.strategy.default_output().to_string());
    state.save(coll, &file).await?;
    Ok(Json(ClassifyOut { file, report }))
}

#[derive(Debug, Deserialize)]
struct UploadReq {
    file: String,
}

#[derive(Debug, Serialize)]
struct UploadOut {
    table: String,
    report: UploadReport,
}

async fn upload_file(
    State(state): State<AppState>,
    Json(req): Json<UploadReq>,
) -> Result<Json<UploadOut>> {
    let (wh, target) = state.warehouse()?;
    let coll = state.load(&req.file).await?;
    let report = upload(&coll, &target, wh.as_ref()).await?;
    Ok(Json(UploadOut {
        table: target.qualified(),
        report,
    }))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    column: Option<String>,
}

async fn warehouse_recent(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Result<Json<DashboardView>> {
    Ok(Json(
        warehouse_view(&state, q.keyword.as_deref(), q.column.as_deref()).await?,
    ))
}
