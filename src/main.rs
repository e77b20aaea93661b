use std::{path::Path, sync::Arc};

use anyhow::Context;
use api::{AppConfig, AppState};
use llm_service::LlmClient;
use review_pipeline::forge::ForgeClient;
use review_pipeline::review::Reviewer;
use review_pipeline::{spawn_workers, Orchestrator, PostingConfig};
use storage::Database;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from a .env file when present.
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Arc::new(AppConfig::from_env().context("loading configuration")?);

    let db = Arc::new(Database::open(Path::new(&config.database_url)).context("opening database")?);
    db.initialize().context("creating tables")?;

    let llm = Arc::new(LlmClient::from_env().context("building llm client")?);
    if !llm.is_enabled() {
        tracing::warn!("LLM credentials not configured; reviews will be marked SKIPPED");
    }
    if config.webhook_secret.is_none() {
        tracing::warn!("FORGE_WEBHOOK_SECRET not configured; inbound webhooks are disabled");
    }

    let forge =
        ForgeClient::new(&config.forge_host, &config.forge_token).context("building forge client")?;

    let orchestrator = Arc::new(Orchestrator {
        db: db.clone(),
        forge,
        reviewer: Reviewer::new(llm),
        posting: PostingConfig {
            dry_run: config.dry_run,
            ..PostingConfig::default()
        },
    });

    let workers = spawn_workers(config.review_workers, db.clone(), orchestrator);
    tracing::info!(workers = workers.len(), "review workers running");

    let state = Arc::new(AppState::new(config, db));
    api::start(state).await.context("http server")?;

    for worker in workers {
        worker.abort();
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,review_pipeline=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
