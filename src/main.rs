use anyhow::Result;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use ishortn::analytics::{GeoIpService, UsageMeter, VisitRecorder};
use ishortn::api::{self, ApiState};
use ishortn::cache::{LinkCache, MokaLinkCache};
use ishortn::config::Config;
use ishortn::links::LinkService;
use ishortn::redirect::{self, RedirectState};
use ishortn::resolver::LinkResolver;
use ishortn::storage::{LinkStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let store: Arc<dyn LinkStore> = Arc::new(
        SqliteStore::new(&config.database.url, config.database.max_connections).await?,
    );
    info!("Using SQLite storage: {}", config.database.url);

    info!("Initializing database...");
    store.init().await?;
    info!("Database initialized successfully");

    let cache: Arc<dyn LinkCache> = Arc::new(MokaLinkCache::new(
        config.cache.max_entries,
        Duration::from_secs(config.cache.ttl_secs),
    ));

    let geoip = match config.analytics.geoip_city_db.as_deref() {
        Some(path) => {
            info!("GeoIP fallback enabled: {}", path);
            Some(Arc::new(GeoIpService::new(path)?))
        }
        None => None,
    };

    if config.analytics.enabled {
        info!("Analytics ingestion enabled");
    } else {
        info!("Analytics ingestion disabled - redirects only");
    }

    let meter = UsageMeter::new(Arc::clone(&store));
    let recorder = Arc::new(VisitRecorder::new(
        Arc::clone(&store),
        meter,
        geoip,
        config.analytics.enabled,
    ));

    let resolver = Arc::new(LinkResolver::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        recorder,
    ));
    let service = Arc::new(LinkService::new(Arc::clone(&store), Arc::clone(&cache)));

    let api_router = api::create_api_router(Arc::new(ApiState {
        service,
        resolver: Arc::clone(&resolver),
        store: Arc::clone(&store),
    }));
    let redirect_router = redirect::create_redirect_router(Arc::new(RedirectState {
        resolver,
        default_domain: config.default_domain.clone(),
    }));

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("API server listening on http://{}", api_addr);

    let redirect_addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr).await?;
    info!(
        "Redirect server listening on http://{} (default domain: {})",
        redirect_addr, config.default_domain
    );

    tokio::try_join!(
        axum::serve(api_listener, api_router).into_future(),
        axum::serve(
            redirect_listener,
            redirect_router.into_make_service_with_connect_info::<SocketAddr>()
        )
        .into_future(),
    )?;

    Ok(())
}
