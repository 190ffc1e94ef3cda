use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_digest::aggregator::{start_background_refresh, Aggregator};
use feed_digest::cache::CacheStore;
use feed_digest::config::Config;
use feed_digest::debounce::SearchDebouncer;
use feed_digest::fetcher::Fetcher;
use feed_digest::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feed_digest=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("FEEDS_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} feeds and {} proxies from configuration",
        config.feeds.len(),
        config.proxies.len()
    );

    // Initialize cache storage
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:feed_digest.db?mode=rwc".to_string());
    let cache = CacheStore::new(&database_url, config.cache_max_age()).await?;
    cache.initialize().await?;
    info!("Cache initialized");

    let fetcher = Arc::new(Fetcher::new(
        config.proxies.clone(),
        config.request_timeout(),
    )?);
    let aggregator = Arc::new(Aggregator::new(
        config.feeds.clone(),
        fetcher,
        Arc::new(cache),
    ));

    if aggregator.restore_from_cache().await {
        info!("Serving cached feeds until the first refresh completes");
    }

    // Start background refresh task
    let bg_aggregator = aggregator.clone();
    let refresh_every = config.refresh_every();
    tokio::spawn(async move {
        start_background_refresh(bg_aggregator, refresh_every).await;
    });

    let search_target = aggregator.clone();
    let search = SearchDebouncer::spawn(config.search_debounce(), move |query| {
        let aggregator = search_target.clone();
        async move { aggregator.set_search_query(query).await }
    });

    let state = Arc::new(AppState { aggregator, search });
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
