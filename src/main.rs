use disaster_alerts::config::AppConfig;
use disaster_alerts::db::{self, store::PgStore};
use disaster_alerts::feed::FeedClient;
use disaster_alerts::processor::danger::DangerScorer;
use disaster_alerts::processor::dispatcher::{DispatchSettings, NotificationDispatcher};
use disaster_alerts::processor::ingestion::Ingestor;
use disaster_alerts::push::{FcmGateway, ServiceAccountKey, ServiceAccountTokens};
use disaster_alerts::scheduler::{self, SchedulerSettings};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const FEED_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Disaster Alerts Service...");

    // Init DB
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    info!("Connected to database");
    let store = PgStore::new(pool);

    // Init push gateway
    let key = ServiceAccountKey::from_file(Path::new(&config.fcm_credentials_file))?;
    let tokens = ServiceAccountTokens::new(key, config.push_timeout())?;
    let project_id = config
        .fcm_project_id
        .clone()
        .unwrap_or_else(|| tokens.project_id().to_string());
    let gateway = FcmGateway::new(
        &config.fcm_endpoint,
        &project_id,
        tokens,
        config.push_timeout(),
    )?;
    info!("Sending pushes through {}", gateway.send_url());

    let scorer = DangerScorer::new(config.server_scoring());
    info!(
        "Dispatch falloff radius {} m (client re-ranking uses {} m)",
        scorer.falloff_radius_m(),
        config.client_scoring().falloff_radius_m
    );

    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        store.clone(),
        gateway,
        scorer,
        DispatchSettings {
            page_size: config.scan_page_size,
            max_in_flight: config.push_max_in_flight,
        },
    ));

    let feed = FeedClient::new(&config.feed_url, FEED_TIMEOUT)?;
    let ingestor = Ingestor::new(feed, store, dispatcher.clone());

    // Start polling
    let settings = SchedulerSettings::from_config(&config);
    info!(
        "Polling {} every {} seconds",
        config.feed_url,
        settings.interval.as_secs()
    );
    scheduler::run_scheduler(settings, &ingestor, &dispatcher, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await;

    Ok(())
}
