use crate::cache::{CacheEngine, CachePolicy, InMemorySharedCache, RedisSharedCache, SharedCache};
use crate::config::Settings;
use crate::identity::IdentityMapper;
use crate::infrastructure::log_messages;
use crate::origin::{ReqwestTransport, UpstreamApiClient};
use crate::proxy::{ProxyHandler, ProxyService, SiteRegistry};
use crate::storage::{BufferedContentStore, FsContentStore};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// How often expired entries are swept from the in-process tiers
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
    service: ProxyService,
    cache: Arc<CacheEngine>,
    in_memory_shared: Option<Arc<InMemorySharedCache>>,
}

impl Application {
    #[instrument]
    pub async fn new() -> Result<Self> {
        let settings = Settings::new()?;
        info!("{}", log_messages::configuration::CONFIG_LOADED);
        Self::build(settings)
    }

    /// Wire every component from `settings`
    pub fn build(settings: Settings) -> Result<Self> {
        if settings.proxy.proxy_key.is_empty() {
            warn!("{}", log_messages::configuration::MISSING_PROXY_KEY);
        }

        let (shared, in_memory_shared): (Arc<dyn SharedCache>, _) = match &settings.cache.redis_url
        {
            Some(url) => {
                info!("{}", log_messages::cache::USING_REDIS);
                let redis = RedisSharedCache::connect(url, settings.cache.redis_pool_size)?;
                (Arc::new(redis), None)
            }
            None => {
                info!("{}", log_messages::cache::USING_IN_MEMORY);
                let memory = Arc::new(InMemorySharedCache::new());
                (memory.clone(), Some(memory))
            }
        };

        let api = Arc::new(UpstreamApiClient::new(&settings.proxy)?);
        let cache = Arc::new(CacheEngine::new(
            shared.clone(),
            api.clone(),
            CachePolicy::from(&settings.cache),
        ));
        let identity = Arc::new(IdentityMapper::new(
            cache.clone(),
            api,
            settings.claims.clone(),
            &settings.cache,
        ));

        info!(
            root = %settings.storage.content_root.display(),
            "{}",
            log_messages::storage::CONTENT_ROOT
        );
        let store = Arc::new(BufferedContentStore::new(
            FsContentStore::new(settings.storage.content_root.clone()),
            shared,
            settings.cache.multimedia_buffer_max_bytes,
            settings.cache.multimedia_buffer_sliding(),
        ));
        let transport = Arc::new(ReqwestTransport::new(settings.proxy.request_timeout())?);

        let sites = SiteRegistry::from_settings(&settings)
            .map_err(|e| Error::invalid_config(format!("Site address pattern: {e}")))?;
        if sites.is_empty() {
            warn!("{}", log_messages::application::NO_SITES_CONFIGURED);
        } else {
            let hosts: Vec<String> = settings
                .sites
                .values()
                .map(|site| site.proxy_host.to_string())
                .collect();
            info!(sites = ?hosts, "{}", log_messages::application::SERVING_SITES);
        }

        let handler = ProxyHandler::new(
            sites,
            cache.clone(),
            identity,
            transport,
            store,
            settings.proxy.clone(),
            settings.locale.clone(),
            &settings.cache,
        );
        let service = ProxyService::new(handler, settings.proxy.max_request_size);

        Ok(Self {
            settings,
            service,
            cache,
            in_memory_shared,
        })
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let address = format!(
            "{}:{}",
            self.settings.application.host, self.settings.application.port
        );
        let listener = TcpListener::bind(&address).await?;
        info!(address = %address, "{}", log_messages::application::STARTED_SUCCESSFULLY);

        let purge = spawn_purge_task(self.cache.clone(), self.in_memory_shared.clone());
        let served = axum::serve(listener, self.service.into_router())
            .with_graceful_shutdown(shutdown_signal())
            .await;
        purge.abort();

        info!("{}", log_messages::application::STOPPED);
        served.map_err(Error::from)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

fn spawn_purge_task(
    cache: Arc<CacheEngine>,
    shared: Option<Arc<InMemorySharedCache>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let local = cache.purge_expired();
            let shared = shared.as_ref().map_or(0, |shared| shared.purge_expired());
            debug!(local, shared, "{}", log_messages::cache::PURGED_EXPIRED);
        }
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("{}", log_messages::application::SHUTDOWN_SIGNAL),
        Err(error) => {
            warn!(error = %error, "{}", log_messages::application::SHUTDOWN_SIGNAL_FAILED);
            std::future::pending::<()>().await;
        }
    }
}
