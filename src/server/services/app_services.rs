use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::config::AppConfig;
use crate::server::utils::cache_utils::EvictionPolicy;

use super::{
    bandwidth_services::{BandwidthEstimator, DynBandwidthEstimator},
    browser_services::{ChromiumDriver, DynBrowserDriver},
    catalog_services::{CatalogService, DynCatalogService},
    download_services::DownloadManager,
    episode_scraper_services::EpisodeScraper,
    media_cache_services::MediaCache,
    media_resolver_services::{BrowserMediaResolver, DynMediaResolver},
    playback_services::PlaybackService,
    stream_services::StreamService,
};

/// everything the controllers need, cloned into each request through an Extension
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub browser: DynBrowserDriver,
    pub catalog: DynCatalogService,
    pub media_cache: Arc<MediaCache>,
    pub bandwidth: DynBandwidthEstimator,
    pub resolver: DynMediaResolver,
    pub streams: Arc<StreamService>,
    pub playback: Arc<PlaybackService>,
    pub scraper: Arc<EpisodeScraper>,
    pub downloads: Arc<DownloadManager>,
}

impl AppServices {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let browser =
            Arc::new(ChromiumDriver::chromium(config.chrome_executable.clone())) as DynBrowserDriver;
        let catalog = Arc::new(CatalogService::new(&config.catalog_base_url)?) as DynCatalogService;

        Self::with_parts(config, browser, catalog)
    }

    /// same wiring with the browser and catalog swapped out, which is how the tests run it
    pub fn with_parts(
        config: Arc<AppConfig>,
        browser: DynBrowserDriver,
        catalog: DynCatalogService,
    ) -> anyhow::Result<Self> {
        info!("starting services...");

        // media hosts get plain http/1.1 with a large keep-alive pool and no client timeout,
        // streams can run for as long as someone is watching
        let http = reqwest::Client::builder()
            .http1_only()
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("failed to build media http client")?;

        let referer = format!("{}/", config.catalog_base_url.trim_end_matches('/'));
        let streams = Arc::new(StreamService::new(http.clone(), referer.clone()));

        let media_cache = Arc::new(MediaCache::with_policy(EvictionPolicy::from_limits(
            config.media_cache_capacity,
            config.media_cache_ttl_secs,
        )));

        let bandwidth = Arc::new(BandwidthEstimator::new(
            http,
            referer,
            EvictionPolicy::from_limits(
                config.bandwidth_cache_capacity,
                config.bandwidth_cache_ttl_secs,
            ),
        )) as DynBandwidthEstimator;

        let resolver = Arc::new(BrowserMediaResolver::new(
            browser.clone(),
            Duration::from_secs(config.resolve_timeout_secs),
        )) as DynMediaResolver;

        let playback = Arc::new(PlaybackService::new(
            media_cache.clone(),
            resolver.clone(),
            bandwidth.clone(),
            streams.clone(),
        ));

        let scraper = Arc::new(EpisodeScraper::new(
            browser.clone(),
            catalog.clone(),
            config.scraper_concurrency,
            Duration::from_secs(config.episode_timeout_secs),
            config.proxy_base_url(),
        ));

        let downloads = Arc::new(DownloadManager::new(
            &config.download_dir,
            streams.clone(),
            EvictionPolicy::from_limits(
                config.download_history_capacity,
                config.download_history_ttl_secs,
            ),
        ));

        info!("services ok");

        Ok(Self {
            config,
            browser,
            catalog,
            media_cache,
            bandwidth,
            resolver,
            streams,
            playback,
            scraper,
            downloads,
        })
    }
}
