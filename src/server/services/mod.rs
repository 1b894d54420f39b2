pub mod app_services;
pub mod bandwidth_services;
pub mod browser_services;
pub mod catalog_services;
pub mod download_services;
pub mod episode_scraper_services;
pub mod media_cache_services;
pub mod media_resolver_services;
pub mod playback_services;
pub mod stream_services;

pub use bandwidth_services::DynBandwidthEstimator;
pub use browser_services::DynBrowserDriver;
pub use catalog_services::DynCatalogService;
pub use media_resolver_services::DynMediaResolver;
pub use app_services::AppServices;
