use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowserHealth {
    pub status: HealthStatus,
    pub launched: bool,
    pub open_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub media_entries: usize,
    pub bandwidth_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealthDetails {
    pub browser: BrowserHealth,
    pub caches: CacheHealth,
    pub active_downloads: usize,
    pub finished_downloads: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub environment: String,
    pub services: ServiceHealthDetails,
}
