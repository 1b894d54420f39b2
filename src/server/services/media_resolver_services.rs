use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use mockall::automock;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::server::error::{AppResult, Error};
use crate::server::services::browser_services::{BrowserPage, DynBrowserDriver, NetworkEvent};
use crate::server::utils::media_utils::{classify_media, is_media_url};

pub type DynMediaResolver = Arc<dyn MediaResolverTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait MediaResolverTrait {
    /// drives a page until it requests something that looks like video and returns that url
    async fn resolve(&self, page_url: &str) -> AppResult<String>;
}

/// Correlates cdp network events by request id and remembers the first media url.
///
/// A request counts once it finished loading and its url or response mime passes the media
/// predicate. Events of one request can arrive in any order, so a finished request is checked
/// again whenever its url or mime shows up later.
#[derive(Debug, Default)]
pub struct MediaSniffer {
    urls: HashMap<String, String>,
    mime_types: HashMap<String, String>,
    finished: HashSet<String>,
    found: OnceLock<String>,
}

impl MediaSniffer {
    pub fn observe(&mut self, event: NetworkEvent) -> Option<&str> {
        match event {
            NetworkEvent::RequestWillBeSent { request_id, url } => {
                self.urls.insert(request_id.clone(), url);
                self.recheck_finished(&request_id);
            }
            NetworkEvent::ResponseReceived {
                request_id,
                url,
                mime_type,
            } => {
                self.mime_types.insert(request_id.clone(), mime_type);
                self.urls.entry(request_id.clone()).or_insert(url);
                self.recheck_finished(&request_id);
            }
            NetworkEvent::LoadingFinished { request_id } => {
                self.check(&request_id);
                self.finished.insert(request_id);
            }
        }

        self.found()
    }

    pub fn found(&self) -> Option<&str> {
        self.found.get().map(String::as_str)
    }

    fn recheck_finished(&self, request_id: &str) {
        if self.finished.contains(request_id) {
            self.check(request_id);
        }
    }

    fn check(&self, request_id: &str) {
        let Some(url) = self.urls.get(request_id) else {
            return;
        };
        let mime = self.mime_types.get(request_id).map(String::as_str);

        if classify_media(url, mime).is_some() && self.found.set(url.clone()).is_ok() {
            info!(">>> found media url: {}", url);
        }
    }
}

pub struct BrowserMediaResolver {
    driver: DynBrowserDriver,
    timeout: Duration,
}

impl BrowserMediaResolver {
    pub fn new(driver: DynBrowserDriver, timeout: Duration) -> Self {
        Self { driver, timeout }
    }

    async fn sniff(&self, page: &dyn BrowserPage, page_url: &str) -> AppResult<String> {
        let deadline = Instant::now() + self.timeout;

        let mut events = page.network_events(false).await.map_err(|e| {
            error!("failed to enable network interception: {}", e);
            Error::BrowserLaunchFailed(e.to_string())
        })?;

        let navigation = page.navigate(page_url);
        tokio::pin!(navigation);
        let mut navigating = true;
        let mut sniffer = MediaSniffer::default();

        loop {
            tokio::select! {
                biased;

                _ = sleep_until(deadline) => {
                    warn!("no media request for {} within {}s", page_url, self.timeout.as_secs());
                    metrics::counter!("media_resolution_timeouts_total").increment(1);
                    return Err(Error::ResolutionTimeout(self.timeout.as_secs()));
                }

                result = &mut navigation, if navigating => {
                    navigating = false;
                    // a failed load can still have fired the media request, keep listening
                    if let Err(e) = result {
                        warn!("navigation failed, still listening: {}", e);
                    }
                }

                event = events.next() => match event {
                    Some(event) => {
                        if let Some(url) = sniffer.observe(event) {
                            return Ok(url.to_string());
                        }
                    }
                    None => {
                        warn!("network events closed before any media for {}", page_url);
                        return Err(Error::NoMediaFound(page_url.to_string()));
                    }
                },
            }
        }
    }
}

#[async_trait]
impl MediaResolverTrait for BrowserMediaResolver {
    async fn resolve(&self, page_url: &str) -> AppResult<String> {
        if is_media_url(page_url) {
            debug!("{} is already a media url, skipping the browser", page_url);
            return Ok(page_url.to_string());
        }

        info!("resolving media for {}", page_url);
        metrics::counter!("media_resolutions_total").increment(1);

        let page = self.driver.open_page().await.map_err(|e| {
            error!("failed to open browser page: {:#}", e);
            Error::BrowserLaunchFailed(e.to_string())
        })?;

        let outcome = AssertUnwindSafe(self.sniff(page.as_ref(), page_url))
            .catch_unwind()
            .await;

        if let Err(e) = page.close().await {
            warn!("failed to close page for {}: {}", page_url, e);
        }

        match outcome {
            Ok(result) => result,
            Err(_) => {
                error!("media resolution for {} panicked", page_url);
                Err(Error::InternalServerErrorWithContext(
                    "media resolution panicked".to_string(),
                ))
            }
        }
    }
}
