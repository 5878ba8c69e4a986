use anyhow::Context;
use background_service::{CommandHandler, MonitorService, Scheduler, SharedState};
use chrono::Local;
use matcher::{load_keyword_file, Classifier, CompetitorCatalogue, KeywordSet};
use monitor_core::{AlertSink, CommandSource, ErrorExt, LogSink, MonitorConfig, PostSource};
use reddit_client::auth::RedditCredentials;
use reddit_client::RedditClient;
use state_store::StatePaths;
use std::sync::Arc;
use std::time::Duration;
use telegram_client::TelegramClient;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, reload, EnvFilter};

/// Upper bound on waiting for in-flight fetches and polls after ctrl-c.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{},reqwest=warn,hyper=warn", level))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG wins over the configured level
    let rust_log = std::env::var("RUST_LOG").ok();
    let initial = match &rust_log {
        Some(directives) => EnvFilter::new(directives),
        None => filter_for(&std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())),
    };
    let (filter, filter_handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting opportunity monitor");

    let config = match MonitorConfig::load() {
        Ok(config) => config,
        Err(e) => {
            e.log_error();
            return Err(e).context("invalid configuration");
        }
    };
    if rust_log.is_none() {
        if let Err(e) = filter_handle.reload(filter_for(&config.log_level)) {
            warn!(error = %e, "Could not apply configured log level");
        }
    }

    let entries = load_keyword_file(&config.keyword_file).with_context(|| {
        format!("failed to load keywords from {}", config.keyword_file.display())
    })?;
    let competitors = CompetitorCatalogue::from_specs(&config.rules.competitors);
    let keywords = Arc::new(KeywordSet::from_entries(
        entries,
        config.scan.primary_keyword_count,
        competitors,
        config.scan.secondary_chunk_size,
    ));
    info!(
        primary = keywords.primary().len(),
        secondary = keywords.secondary().len(),
        windows = keywords.window_count(),
        competitors = keywords.competitors().len(),
        "Keywords loaded"
    );
    let classifier = Arc::new(Classifier::from_rules(&config.rules)?);

    std::fs::create_dir_all(&config.state_dir).with_context(|| {
        format!("failed to create state directory {}", config.state_dir.display())
    })?;
    let shared = SharedState::open(&StatePaths::new(&config.state_dir), Local::now().date_naive());

    let reddit = Arc::new(RedditClient::new(
        RedditCredentials {
            client_id: config.reddit.client_id.clone(),
            client_secret: config.reddit.client_secret.clone(),
            user_agent: config.reddit.user_agent.clone(),
        },
        &config.reddit.tuning,
    )?);
    if let Err(e) = reddit.authenticate().await {
        // Transient at startup; the scan loop keeps retrying
        e.log_warn();
    }

    let (sink, commands): (Arc<dyn AlertSink>, Option<Arc<dyn CommandSource>>) =
        match &config.telegram {
            Some(settings) => {
                let client = Arc::new(TelegramClient::new(
                    settings,
                    config.scan.send_timeout(),
                    &config.state_dir,
                )?);
                if let Err(e) = client.clear_webhook().await {
                    e.log_warn();
                }
                (client.clone(), Some(client))
            }
            None => (Arc::new(LogSink), None),
        };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let source: Arc<dyn PostSource> = reddit;
    let scheduler = Scheduler::new(
        source,
        sink.clone(),
        keywords.clone(),
        classifier,
        shared.clone(),
        config.scan.clone(),
        config.retry.clone(),
        shutdown_rx.clone(),
    )?;
    let handler = CommandHandler::new(shared, keywords, config.scan.report_top_n);
    let service = MonitorService::new(
        scheduler,
        handler,
        commands,
        sink,
        config.scan.send_timeout(),
        shutdown_rx,
    );

    let mut service_task = tokio::spawn(service.run());
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("Shutdown requested");
        }
        finished = &mut service_task => {
            error!("Monitor service exited unexpectedly");
            return finished.context("monitor service panicked")?.map_err(Into::into);
        }
    }

    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(SHUTDOWN_GRACE, service_task).await {
        Ok(finished) => finished.context("monitor service panicked")??,
        Err(_) => warn!("Timed out waiting for tasks to stop"),
    }

    info!("Opportunity monitor stopped");
    Ok(())
}
