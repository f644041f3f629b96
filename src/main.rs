//! Promsink Server
//!
//! Prometheus remote storage adapter for Elasticsearch.
//!
//! Run with: cargo run -- --config promsink.toml
//!
//! Environment variables override file settings, see
//! [`config::generate_default_config`] for the full list.

use clap::Parser;
use promsink::api::{serve, serve_admin, AppState, ListenConfig};
use promsink::config::Config;
use promsink::elastic::{ensure_template, ElasticApi, EsClient};
use promsink::lifecycle::{DailyIndex, IndexLifecycle, RolloverManager};
use promsink::pipeline::WritePipeline;
use promsink::read::{ReadConfig, ReadService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "promsink", version, about = "Prometheus remote storage adapter for Elasticsearch")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "PROMSINK_CONFIG")]
    config: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", promsink::config::generate_default_config());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::from_env()?,
    };

    init_tracing(&config);

    tracing::info!("Starting promsink v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Elasticsearch URL: {}", config.elasticsearch.url);
    tracing::info!("Index alias: {}", config.index.alias);

    // A storage connection is a startup requirement; keep retrying per
    // the configured policy and fail hard after that.
    let client = EsClient::connect(
        config.elasticsearch.client_config(),
        config.elasticsearch.retry_policy(),
    )
    .await?;
    let elastic: Arc<dyn ElasticApi> = Arc::new(client);

    if config.index.load_template {
        ensure_template(
            elastic.as_ref(),
            &config.index.alias,
            config.index.shards,
            config.index.replicas,
        )
        .await?;
        tracing::info!("Index template installed");
    }

    let lifecycle = if config.index.daily {
        tracing::info!("Using fixed daily indices");
        Arc::new(IndexLifecycle::Daily(DailyIndex::new(
            Arc::clone(&elastic),
            config.index.alias.as_str(),
        )))
    } else {
        let manager = RolloverManager::new(
            Arc::clone(&elastic),
            config.index.alias.as_str(),
            config.index.rollover_policy()?,
        );
        Arc::new(IndexLifecycle::Rollover(manager))
    };
    lifecycle.prepare().await?;
    let _evaluation = lifecycle.start_background_evaluation(Duration::from_secs(
        config.index.evaluation_interval_secs,
    ));

    let pipeline = Arc::new(WritePipeline::new(
        Arc::clone(&elastic),
        Arc::clone(&lifecycle),
        config
            .batch
            .pipeline_config(Duration::from_secs(config.server.shutdown_timeout_secs)),
    ));

    let reader = Arc::new(ReadService::new(
        Arc::clone(&elastic),
        ReadConfig {
            alias: config.index.alias.clone(),
            max_docs: config.search.max_docs,
        },
    ));

    let state = Arc::new(AppState::new(pipeline, reader, elastic));

    let admin_config = ListenConfig::new(config.server.host.clone(), config.server.admin_port);
    let admin_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = serve_admin(admin_state, &admin_config).await {
            tracing::error!(error = %e, "Admin listener failed");
        }
    });

    let listen = ListenConfig::new(config.server.host.clone(), config.server.port);
    serve(state, &listen).await?;

    tracing::info!("Promsink stopped");
    Ok(())
}

/// Initialize tracing from the logging section; RUST_LOG wins when set.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "promsink={},tower_http=info",
            config.logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
