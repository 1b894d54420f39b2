use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;

use crate::server::dtos::health_dto::{
    BrowserHealth, CacheHealth, HealthResponse, HealthStatus, ServiceHealthDetails,
};
use crate::server::services::AppServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// The browser launches lazily, so "not launched yet" is still healthy. Pages piling up past
/// the scraper bound means something stopped closing them.
pub async fn health_endpoint(
    Extension(services): Extension<AppServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let browser = browser_health(&services);

    let response = HealthResponse {
        status: browser.status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            browser,
            caches: CacheHealth {
                media_entries: services.media_cache.len(),
                bandwidth_entries: services.bandwidth.cached_profiles(),
            },
            active_downloads: services.downloads.active(),
            finished_downloads: services.downloads.finished(),
        },
    };

    let http_status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

fn browser_health(services: &AppServices) -> BrowserHealth {
    let open_pages = services.browser.open_pages();
    // media resolution for the mp4 and download routes opens pages on top of the scraper's
    let expected = services.config.scraper_concurrency * 2;

    let status = if open_pages > expected {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    BrowserHealth {
        status,
        launched: services.browser.is_launched(),
        open_pages,
    }
}
