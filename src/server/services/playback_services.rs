use std::sync::Arc;

use tracing::{info, warn};

use crate::server::error::{AppResult, Error};
use crate::server::services::bandwidth_services::DynBandwidthEstimator;
use crate::server::services::media_cache_services::MediaCache;
use crate::server::services::media_resolver_services::DynMediaResolver;
use crate::server::services::stream_services::StreamService;

/// how many times a cached media url may turn out stale before giving up
pub const MAX_STALE_RETRIES: usize = 1;

#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub page_url: String,
    pub client_ip: String,
    /// forwarded verbatim when the client sent one
    pub range: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub media_url: String,
    pub from_cache: bool,
}

pub struct PlaybackStream {
    pub media_url: String,
    pub range: String,
    pub upstream: reqwest::Response,
    pub attempts: usize,
}

/// cache, resolver, bandwidth estimate and the upstream fetch glued together for the mp4 route
pub struct PlaybackService {
    cache: Arc<MediaCache>,
    resolver: DynMediaResolver,
    bandwidth: DynBandwidthEstimator,
    streams: Arc<StreamService>,
}

impl PlaybackService {
    pub fn new(
        cache: Arc<MediaCache>,
        resolver: DynMediaResolver,
        bandwidth: DynBandwidthEstimator,
        streams: Arc<StreamService>,
    ) -> Self {
        Self {
            cache,
            resolver,
            bandwidth,
            streams,
        }
    }

    pub async fn resolve_media(&self, page_url: &str) -> AppResult<ResolvedMedia> {
        if let Some(media_url) = self.cache.lookup(page_url) {
            return Ok(ResolvedMedia {
                media_url,
                from_cache: true,
            });
        }

        let media_url = self.resolver.resolve(page_url).await?;
        self.cache.store(page_url, &media_url);

        Ok(ResolvedMedia {
            media_url,
            from_cache: false,
        })
    }

    async fn range_for(&self, request: &PlaybackRequest, media_url: &str) -> String {
        if let Some(range) = &request.range {
            info!("[client range preserved] {}", range);
            return range.clone();
        }

        let chunk_size = self.bandwidth.estimate(&request.client_ip, media_url).await;
        let range = format!("bytes=0-{}", chunk_size.saturating_sub(1));
        info!(
            "[adaptive range] {} -> {} MB",
            request.client_ip,
            chunk_size / (1024 * 1024)
        );
        range
    }

    /// Opens the upstream media for a page.
    ///
    /// A transport error or a status >= 400 invalidates the cached url and goes round once more
    /// with a fresh resolution. Resolution errors are returned straight away.
    pub async fn open_stream(&self, request: &PlaybackRequest) -> AppResult<PlaybackStream> {
        let mut last_failure = String::new();

        for attempt in 0..=MAX_STALE_RETRIES {
            let media = self.resolve_media(&request.page_url).await?;
            let range = self.range_for(request, &media.media_url).await;

            match self
                .streams
                .fetch_media(&media.media_url, request.user_agent.as_deref(), Some(&range))
                .await
            {
                Ok(upstream) if upstream.status().as_u16() < 400 => {
                    return Ok(PlaybackStream {
                        media_url: media.media_url,
                        range,
                        upstream,
                        attempts: attempt + 1,
                    });
                }
                Ok(upstream) => last_failure = format!("upstream status {}", upstream.status()),
                Err(e) => last_failure = e.to_string(),
            }

            warn!(
                "failed proxy request for {} (attempt {}): {}",
                media.media_url,
                attempt + 1,
                last_failure
            );
            self.cache.invalidate(&request.page_url);

            if attempt < MAX_STALE_RETRIES {
                metrics::counter!("media_stale_retries_total").increment(1);
                info!("re-resolving {} after a failed fetch", request.page_url);
            }
        }

        Err(Error::UpstreamFetchFailed(last_failure))
    }
}
