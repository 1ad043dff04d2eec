mod seeds;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sift_client::{HtmlTextCleaner, OpenAiProvider, ReqwestFetcher};
use sift_core::traits::{Cleaner, CompletionProvider, Fetcher};
use sift_core::{
    AppError, ExtractedData, ExtractionConfig, FlattenMode, Pipeline, RequestContext, SchemaRef,
    SchemaRegistry, SchemaResolver, Settings,
};

use crate::seeds::Seed;

type SiftPipeline = Pipeline<HtmlTextCleaner, OpenAiProvider>;

#[derive(Parser)]
#[command(name = "sift", version, about = "Schema-guided LLM extraction from web pages")]
struct Cli {
    #[command(flatten)]
    opts: ExtractionOpts,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every subcommand. Each one overrides the matching
/// `SIFT_*` environment variable.
#[derive(Args, Debug, Default)]
struct ExtractionOpts {
    /// Schema for this crawl (registry path, e.g. "dorm_capacity.DormItem")
    #[arg(long, global = true)]
    schema: Option<String>,

    /// Register a JSON schema descriptor file (repeatable)
    #[arg(long = "schema-file", global = true)]
    schema_files: Vec<PathBuf>,

    /// LLM model to use (e.g., "gpt-4o-mini")
    #[arg(long, global = true)]
    model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// API key (reads from SIFT_API_KEY env var if not provided)
    #[arg(long, env = "SIFT_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Sampling temperature
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Flatten nested records into flat rows
    #[arg(long, global = true)]
    unwrap_nested: bool,

    /// Flattening mode: "single" or "recursive"
    #[arg(long, global = true)]
    flatten_mode: Option<FlattenMode>,

    /// Keep link targets in the cleaned text
    #[arg(long, global = true)]
    keep_links: bool,

    /// Keep image references in the cleaned text
    #[arg(long, global = true)]
    keep_images: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract structured data from a single page
    Extract {
        /// Page to fetch (also the URL given to the model)
        #[arg(short, long, required_unless_present = "html_file")]
        url: Option<String>,

        /// Read HTML from a local file instead of fetching
        #[arg(long)]
        html_file: Option<PathBuf>,
    },

    /// Extract from every URL in a seeds CSV, writing JSON Lines
    Crawl {
        /// CSV with a `url` column and an optional `schema` column
        #[arg(long)]
        urls_file: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pages processed at once
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,

        /// Abort on the first failed page
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },

    /// List registered schemas
    Schemas {
        /// Print the JSON Schema of one registered schema
        #[arg(long)]
        show: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sift=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let resolver = build_resolver(&cli.opts.schema_files)?;

    match cli.command {
        Commands::Extract { url, html_file } => {
            let pipeline = build_pipeline(&cli.opts, resolver)?;
            cmd_extract(&pipeline, url.as_deref(), html_file.as_deref()).await?;
        }
        Commands::Crawl {
            urls_file,
            output,
            concurrency,
            fail_fast,
        } => {
            let pipeline = build_pipeline(&cli.opts, resolver)?;
            cmd_crawl(
                &pipeline,
                &urls_file,
                output.as_deref(),
                concurrency,
                fail_fast,
            )
            .await?;
        }
        Commands::Schemas { show } => cmd_schemas(resolver.registry(), show.as_deref())?,
    }

    Ok(())
}

/// Built-in catalog plus any descriptor files from the command line.
fn build_resolver(schema_files: &[PathBuf]) -> Result<SchemaResolver> {
    let mut registry = SchemaRegistry::with_builtin();
    for path in schema_files {
        let name = registry.register_file(path)?;
        tracing::info!(schema = %name, "Registered {}", path.display());
    }
    Ok(SchemaResolver::new(registry))
}

/// Apply command-line flags on top of environment settings.
fn apply_flags(mut settings: Settings, opts: &ExtractionOpts) -> Settings {
    if let Some(model) = &opts.model {
        settings.model = Some(model.clone());
    }
    if let Some(api_base) = &opts.api_base {
        settings.api_base = Some(api_base.clone());
    }
    if let Some(temperature) = opts.temperature {
        settings.temperature = Some(temperature);
    }
    if opts.unwrap_nested {
        settings.unwrap_nested = Some(true);
    }
    if let Some(mode) = opts.flatten_mode {
        settings.flatten_mode = Some(mode);
    }
    if opts.keep_links {
        settings.ignore_links = Some(false);
    }
    if opts.keep_images {
        settings.ignore_images = Some(false);
    }
    settings
}

fn build_pipeline(opts: &ExtractionOpts, resolver: SchemaResolver) -> Result<SiftPipeline> {
    let settings = apply_flags(
        Settings::from_env().context("Invalid SIFT_* environment settings")?,
        opts,
    );
    let source = opts.schema.clone().map(SchemaRef::Path);
    let config = ExtractionConfig::from_settings(&settings, source.as_ref(), &resolver)
        .context("Extraction is not configured")?;

    tracing::info!(
        schema = config.schema.as_ref().map_or("(per request)", |s| s.name.as_str()),
        model = %config.model_id,
        unwrap_nested = config.unwrap_nested,
        "Extraction configured"
    );

    let mut provider = OpenAiProvider::new().context("Failed to create LLM client")?;
    if let Some(key) = &opts.api_key {
        provider = provider.with_api_key(key);
    }

    Ok(Pipeline::new(
        HtmlTextCleaner::from_config(&config),
        provider,
        resolver,
        config,
    ))
}

async fn cmd_extract(
    pipeline: &SiftPipeline,
    url: Option<&str>,
    html_file: Option<&Path>,
) -> Result<()> {
    let url = match (url, html_file) {
        (Some(url), _) => url.to_string(),
        (None, Some(path)) => format!("file://{}", path.display()),
        (None, None) => anyhow::bail!("Either --url or --html-file is required"),
    };
    let mut ctx = RequestContext::new(url.clone());
    pipeline.schema_for(&ctx)?;

    let html = match html_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read HTML file: {}", path.display()))?,
        None => {
            tracing::info!("Fetching {}", url);
            let fetcher = ReqwestFetcher::new().context("Failed to create HTTP client")?;
            fetcher.fetch(&url).await?
        }
    };

    let data = pipeline.process(&html, &mut ctx).await?;

    println!("{}", serde_json::to_string_pretty(&data)?);

    Ok(())
}

async fn cmd_crawl(
    pipeline: &SiftPipeline,
    urls_file: &Path,
    output: Option<&Path>,
    concurrency: usize,
    fail_fast: bool,
) -> Result<()> {
    let seeds = seeds::read_seeds(urls_file)?;

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Failed to create output file: {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let fetcher = ReqwestFetcher::new().context("Failed to create HTTP client")?;
    let summary = run_crawl(
        &fetcher,
        pipeline,
        seeds,
        &mut out,
        concurrency,
        fail_fast,
        &cancel,
    )
    .await?;

    tracing::info!(
        pages = summary.pages,
        failed = summary.failed,
        records = summary.records,
        "Crawl complete"
    );

    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CrawlSummary {
    pages: usize,
    failed: usize,
    records: usize,
}

/// Every seed must resolve a schema (its own, the crawl's or the global
/// one) before the first page is fetched.
fn check_seed_schemas<C, P>(pipeline: &Pipeline<C, P>, seeds: &[Seed]) -> Result<()>
where
    C: Cleaner,
    P: CompletionProvider,
{
    for seed in seeds {
        pipeline
            .schema_for(&request_context(seed))
            .with_context(|| format!("No usable schema for {}", seed.url))?;
    }
    Ok(())
}

/// Fetch and extract every seed with bounded concurrency, writing one JSON
/// line per flat record to `out`.
async fn run_crawl<F, C, P, W>(
    fetcher: &F,
    pipeline: &Pipeline<C, P>,
    seeds: Vec<Seed>,
    out: &mut W,
    concurrency: usize,
    fail_fast: bool,
    cancel: &CancellationToken,
) -> Result<CrawlSummary>
where
    F: Fetcher,
    C: Cleaner,
    P: CompletionProvider,
    W: Write,
{
    check_seed_schemas(pipeline, &seeds)?;
    tracing::info!(pages = seeds.len(), concurrency, "Starting crawl");

    let mut pages = futures::stream::iter(seeds)
        .map(|seed| crawl_page(fetcher, pipeline, seed))
        .buffer_unordered(concurrency.max(1));

    let mut summary = CrawlSummary::default();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!("Crawl interrupted");
                break;
            }
            next = pages.next() => next,
        };
        let Some((url, result)) = next else {
            break;
        };

        match result {
            Ok(data) => {
                summary.pages += 1;
                for record in data.into_records() {
                    serde_json::to_writer(&mut *out, &record)?;
                    out.write_all(b"\n")?;
                    summary.records += 1;
                }
            }
            Err(e) if fail_fast => {
                out.flush()?;
                return Err(anyhow::Error::new(e).context(format!("Crawl aborted at {url}")));
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(%url, error = %e, "Page failed, skipping");
            }
        }
    }

    out.flush()?;
    Ok(summary)
}

fn request_context(seed: &Seed) -> RequestContext {
    let ctx = RequestContext::new(seed.url.clone());
    match &seed.schema {
        Some(schema) => ctx.with_schema(schema.as_str()),
        None => ctx,
    }
}

async fn crawl_page<F, C, P>(
    fetcher: &F,
    pipeline: &Pipeline<C, P>,
    seed: Seed,
) -> (String, Result<ExtractedData, AppError>)
where
    F: Fetcher,
    C: Cleaner,
    P: CompletionProvider,
{
    let mut ctx = request_context(&seed);
    let result = match fetcher.fetch(&seed.url).await {
        Ok(html) => pipeline.process(&html, &mut ctx).await,
        Err(e) => Err(e),
    };
    (seed.url, result)
}

fn cmd_schemas(registry: &SchemaRegistry, show: Option<&str>) -> Result<()> {
    match show {
        Some(path) => {
            let schema = registry.lookup(path)?;
            println!("{}", serde_json::to_string_pretty(&schema.json_schema())?);
        }
        None => {
            for name in registry.names() {
                println!("{name}");
            }
        }
    }
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
        cancel.cancel();
    }
}
