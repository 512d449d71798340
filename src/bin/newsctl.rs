//! Batch command line for the pipeline: fetch, classify, upload, stats.
//! Every run is one independent batch over CSV files in the data directory.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use news_sentiment::config::secrets::GCP_PROJECT_ID;
use news_sentiment::config::{SecretResolver, Settings};
use news_sentiment::news::{ArticleFetcher, FetchQuery, GNewsClient};
use news_sentiment::sentiment::llm::build_provider;
use news_sentiment::sentiment::model::load_model;
use news_sentiment::sentiment::{
    classify_collection, BatchOptions, LexiconAnalyzer, LlmClassifier, ModelClassifier,
    SentimentBackend, SentimentLabel, Strategy, TextField,
};
use news_sentiment::store::warehouse::{DEFAULT_DATASET, DEFAULT_TABLE};
use news_sentiment::store::{
    upload, BigQueryClient, CsvStore, MemoryWarehouse, Warehouse, WarehouseTarget, FETCH_OUTPUT,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the CSV files (overrides settings).
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search GNews and save the articles as CSV.
    Fetch {
        #[arg(short, long, default_value = "India")]
        query: String,
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long, default_value = "in")]
        country: String,
        /// 1..=100; defaults to the configured item limit.
        #[arg(long)]
        max: Option<u32>,
        #[arg(short, long, default_value = FETCH_OUTPUT)]
        output: String,
    },
    /// Label every row of a CSV file with one strategy.
    Classify {
        #[arg(short, long, value_enum)]
        strategy: Strategy,
        #[arg(short, long, default_value = FETCH_OUTPUT)]
        input: String,
        /// Defaults to the strategy's usual file name.
        #[arg(short, long)]
        output: Option<String>,
        #[arg(long, value_enum, default_value_t = TextField::Description)]
        field: TextField,
        /// Rows past this stay unlabelled. Defaults to every row, or the
        /// configured limit for the LLM strategy.
        #[arg(long)]
        max_items: Option<usize>,
        /// Label column name; defaults to the strategy's column.
        #[arg(long)]
        column: Option<String>,
    },
    /// Append a CSV file to the warehouse table.
    Upload {
        #[arg(short, long, default_value = "news_with_bert_sentiment.csv")]
        input: String,
        /// Run against an in-memory warehouse; nothing leaves the machine.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print row count, date range and label counts of a CSV file.
    Stats {
        #[arg(short, long)]
        input: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    news_sentiment::logging::init_tracing();
    let cli = Cli::parse();

    let mut settings = Settings::load_default().context("loading settings")?;
    if let Some(d) = cli.data_dir {
        settings.data_dir = d;
    }
    let secrets = SecretResolver::from_env();
    let store = CsvStore::new(settings.data_dir.clone());

    match cli.command {
        Commands::Fetch {
            query,
            lang,
            country,
            max,
            output,
        } => {
            let client = GNewsClient::from_config(&secrets, &settings)?;
            let q = FetchQuery::new(query)
                .lang(lang)
                .country(country)
                .max(max.unwrap_or(settings.default_max_items as u32));
            let coll = client.fetch(&q).await?.dedup_by_url();
            if coll.is_empty() {
                println!("No articles found for '{}'", q.query);
                return Ok(());
            }
            let path = store.save(&coll, &output)?;
            println!("Saved {} articles to {}", coll.len(), path.display());
        }

        Commands::Classify {
            strategy,
            input,
            output,
            field,
            max_items,
            column,
        } => {
            let backend: Box<dyn SentimentBackend> = match strategy {
                Strategy::Lexicon => Box::new(LexiconAnalyzer::new()),
                Strategy::Model => Box::new(ModelClassifier::new(load_model(&settings)?)),
                Strategy::Llm => Box::new(LlmClassifier::new(
                    build_provider(&secrets, &settings)?,
                    settings.llm_max_input_chars,
                )),
            };
            let mut coll = store.load(&input)?;
            let opts = BatchOptions {
                field,
                max_items: max_items
                    .or_else(|| strategy.default_max_items(settings.default_max_items)),
                column,
            };
            let report = classify_collection(&mut coll, backend.as_ref(), &opts, |p| {
                eprint!("\r[{}/{}] {:<8}", p.index + 1, p.total, p.label);
                let _ = std::io::stderr().flush();
            })
            .await?;
            eprintln!();

            let output = output.unwrap_or_else(|| strategy.default_output().to_string());
            let path = store.save(&coll, &output)?;
            println!(
                "Labelled {} rows into '{}' ({} failed, {} skipped), saved to {}",
                report.processed,
                report.column,
                report.failures.len(),
                report.skipped,
                path.display()
            );
            for f in &report.failures {
                println!("  row {}: {}", f.index, f.error);
            }
        }

        Commands::Upload { input, dry_run } => {
            let coll = store.load(&input)?;
            let (wh, target): (Arc<dyn Warehouse>, WarehouseTarget) = if dry_run {
                let project = secrets
                    .get(GCP_PROJECT_ID)
                    .unwrap_or_else(|| "local-dry-run".to_string());
                let t = WarehouseTarget::new(
                    &project,
                    DEFAULT_DATASET,
                    DEFAULT_TABLE,
                    &settings.warehouse_location,
                )?;
                (Arc::new(MemoryWarehouse::new()), t)
            } else {
                (
                    Arc::new(BigQueryClient::from_secrets(&secrets)?),
                    WarehouseTarget::from_secrets(&secrets, &settings)?,
                )
            };
            info!(rows = coll.len(), table = %target.qualified(), dry_run, "uploading");
            let report = upload(&coll, &target, wh.as_ref()).await?;
            println!(
                "Uploaded {} rows to {}{}{}",
                report.rows,
                target.qualified(),
                if report.dataset_created { " (dataset created)" } else { "" },
                if dry_run { " [dry run]" } else { "" }
            );
        }

        Commands::Stats { input } => {
            let coll = store.load(&input)?;
            println!("File:    {input}");
            println!("Rows:    {}", coll.len());
            println!("Columns: {}", coll.column_names().join(", "));
            if let Some((lo, hi)) = coll.date_range() {
                println!("Dates:   {lo} to {hi}");
            }
            for col in coll.label_columns() {
                let counts = coll.label_counts(&col.name).unwrap_or_default();
                let parts: Vec<String> = SentimentLabel::ALL
                    .iter()
                    .map(|l| format!("{l}={}", counts.get(*l)))
                    .collect();
                println!(
                    "{}: {} (unlabelled={})",
                    col.name,
                    parts.join(" "),
                    counts.unlabeled
                );
            }
        }
    }
    Ok(())
}
