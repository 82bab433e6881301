//! Tipbot CLI - one scheduled posting cycle per invocation, plus maintenance commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use llm::{GenerateOptions, ProviderRegistry};
use tipbot::config::{Config, GeneratorBackend};
use tipbot::filter::ContentFilter;
use tipbot::generator::{Catalog, CatalogGenerator, ContentGenerator, LlmGenerator, PromptManager};
use tipbot::history::{HistoryStore, SqliteHistoryStore};
use tipbot::pipeline::{Pipeline, PipelineConfig, RunReport};
use tipbot::platform::{Platform, TwitterClient, TwitterCredentials, Unconfigured};
use tipbot::quota::{start_of_day, QuotaDecision, QuotaGuard, QuotaPolicy};

/// Tipbot - post programming tips to X/Twitter under rate limits.
#[derive(Parser)]
#[command(name = "tipbot")]
#[command(about = "Scheduled X/Twitter tip bot")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ./tipbot.toml when present)
    #[arg(long, global = true, env = "TIPBOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single posting cycle (for cron/systemd use)
    Run {
        /// Generate and filter a candidate without posting or recording anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show post totals by status
    Stats,

    /// Show the newest history records
    History {
        /// Number of records to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show whether a post would be allowed right now
    Quota,

    /// Verify platform credentials
    Verify,

    /// Delete failed and rejected records older than the given age
    Prune {
        /// Age in days
        #[arg(long, default_value = "30")]
        days: u32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    tracing::debug!(database = %config.database_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Run { dry_run } => run_cycle(&config, dry_run).await,
        Commands::Stats => run_stats(&config),
        Commands::History { limit } => run_history(&config, limit),
        Commands::Quota => run_quota(&config),
        Commands::Verify => run_verify(&config).await,
        Commands::Prune { days } => run_prune(&config, days),
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "tipbot=debug,llm=debug,info"
    } else {
        "tipbot=info,llm=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .with(filter)
        .init();
}

fn open_store(config: &Config) -> Result<Arc<dyn HistoryStore>> {
    let store = SqliteHistoryStore::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open history store at {}",
            config.database_path.display()
        )
    })?;
    Ok(Arc::new(store))
}

fn http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(concat!("tipbot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

fn build_generator(
    config: &Config,
    client: &reqwest::Client,
    store: &Arc<dyn HistoryStore>,
    filter: &ContentFilter,
) -> Result<Arc<dyn ContentGenerator>> {
    let settings = &config.generator;
    match settings.backend {
        GeneratorBackend::Llm => {
            let registry = ProviderRegistry::with_http_client(client);
            let provider = registry.require_for_model(&settings.model)?;
            let prompts = match &settings.prompt_template {
                Some(template) => PromptManager::with_template(template)?,
                None => PromptManager::new()?,
            };
            tracing::debug!(
                provider = provider.name(),
                model = %settings.model,
                "Using language model generator"
            );

            let generator = LlmGenerator::new(provider, settings.model.clone(), prompts)
                .with_style(settings.style.clone())
                .with_options(GenerateOptions {
                    temperature: Some(settings.temperature),
                    max_tokens: Some(settings.max_tokens),
                    stop_sequences: None,
                });
            Ok(Arc::new(generator))
        }
        GeneratorBackend::Catalog => {
            let catalog = match &settings.catalog_path {
                Some(path) => Catalog::load(path)?,
                None => Catalog::builtin()?,
            };
            // Each run starts one tip further along.
            let offset = store.stats()?.total as usize;
            tracing::debug!(offset, "Using catalog generator");
            let generator = CatalogGenerator::new(catalog)
                .with_offset(offset)
                .with_history(store.clone(), filter.clone());
            Ok(Arc::new(generator))
        }
    }
}

fn build_platform(
    config: &Config,
    client: &reqwest::Client,
    dry_run: bool,
) -> Result<Arc<dyn Platform>> {
    match TwitterCredentials::from_env() {
        Ok(credentials) => Ok(Arc::new(
            TwitterClient::new(credentials, client.clone())
                .with_base_url(&config.platform.api_base_url)
                .with_lookup_limit(config.platform.lookup_limit),
        )),
        Err(e) if dry_run => {
            tracing::warn!(error = %e, "No platform credentials, continuing dry run without them");
            Ok(Arc::new(Unconfigured))
        }
        Err(e) => Err(e).context("Platform credentials are required to post"),
    }
}

async fn run_cycle(config: &Config, dry_run: bool) -> Result<()> {
    let store = open_store(config)?;
    let client = http_client(config)?;
    let filter = ContentFilter::from_config(&config.content)?;
    let generator = build_generator(config, &client, &store, &filter)?;
    let platform = build_platform(config, &client, dry_run)?;

    let pipeline_config = PipelineConfig {
        dry_run,
        ..PipelineConfig::from_config(config)
    };
    let pipeline = Pipeline::new(pipeline_config, filter, store, generator, platform);
    let report = pipeline.run().await.context("Run aborted by a history store failure")?;

    match report {
        RunReport::Denied {
            reason,
            retry_after,
        } => {
            println!("\n⏸️  Posting not allowed: {reason}");
            println!("   Next opportunity: {}", retry_after.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        RunReport::Posted {
            record_id,
            platform_post_id,
            content,
            topic,
            attempts,
        } => {
            println!("\n✅ Posted ({topic})");
            println!("   Post ID: {platform_post_id}");
            println!("   Record: #{record_id}, attempts: {attempts}");
            println!("\n{content}");
        }
        RunReport::Failed {
            record_id,
            reason,
            attempts,
        } => {
            println!("\n❌ Run failed (record #{record_id}, attempts: {attempts})");
            println!("   {reason}");
        }
        RunReport::DryRun {
            topic,
            content,
            reason,
        } => {
            println!("\n🧪 Dry run ({topic})");
            match (content, reason) {
                (Some(content), _) => println!("\n{content}"),
                (None, Some(reason)) => println!("   {reason}"),
                (None, None) => println!("   No candidate produced"),
            }
        }
    }

    Ok(())
}

fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;

    println!("📊 Post statistics\n");
    println!("   Total: {}", stats.total);
    println!("   Success: {}", stats.success);
    println!("   Failed: {}", stats.failed);
    println!("   Rejected: {}", stats.rejected);

    if let Some(last) = store.last_success()? {
        println!(
            "\n   Last post: {} ({})",
            last.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            last.topic
        );
    }

    Ok(())
}

fn run_history(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let records = store.recent(limit)?;

    if records.is_empty() {
        println!("No history records found.");
        return Ok(());
    }

    for record in &records {
        println!(
            "#{} [{}] {} ({})",
            record.id,
            record.status,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.topic
        );
        let preview: String = record.content.chars().take(80).collect();
        println!("   {}", preview.replace('\n', " "));
        if let Some(id) = &record.platform_post_id {
            println!("   Post ID: {id}");
        }
        if let Some(error) = &record.error_message {
            println!("   {error}");
        }
        println!();
    }

    println!("Showing: {} records", records.len());
    Ok(())
}

fn run_quota(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let policy = QuotaPolicy::from_config(&config.quota);
    let now = Utc::now();
    let today = store.count_since(start_of_day(now))?;
    let cap = policy.effective_daily_cap();
    let guard = QuotaGuard::new(store, policy);

    println!("📈 Quota\n");
    println!("   Posted today: {today}/{cap}");

    match guard.check_at(now)? {
        QuotaDecision::Allowed => println!("   ✅ Posting allowed now"),
        QuotaDecision::Denied {
            reason,
            retry_after,
        } => {
            println!("   ⏸️  Denied: {reason}");
            println!("   Next opportunity: {}", retry_after.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }

    Ok(())
}

async fn run_verify(config: &Config) -> Result<()> {
    let client = http_client(config)?;
    let platform = build_platform(config, &client, false)?;

    println!("🔐 Verifying {} credentials...", platform.name());
    let handle = platform.verify_credentials().await?;
    println!("✅ Authenticated as {handle}");

    Ok(())
}

fn run_prune(config: &Config, days: u32) -> Result<()> {
    let store = open_store(config)?;
    let cutoff = Utc::now() - TimeDelta::days(i64::from(days));
    let removed = store.prune_before(cutoff)?;

    println!("🧹 Removed {removed} failed/rejected records older than {days} days");
    Ok(())
}
