use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{FutureExt, StreamExt, future::join_all};
use tokio::sync::{Semaphore, mpsc};
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, error, info, warn};

use crate::server::dtos::catalog_dto::{Episode, SeriesDetail};
use crate::server::services::browser_services::{BrowserPage, DynBrowserDriver, NetworkEvent};
use crate::server::services::catalog_services::{CatalogSession, DynCatalogService};
use crate::server::utils::media_utils::{
    MediaKind, classify_media, hls_proxy_source, mp4_proxy_source, subtitle_proxy_source,
};

/// the page's own subtitle call, `.../api/Sub/<episode id>` with the id as a whole segment
pub fn is_subtitle_request(url: &str, episode_id: i64) -> bool {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or_default().to_string());
    let id = episode_id.to_string();

    path.split('/')
        .collect::<Vec<_>>()
        .windows(3)
        .any(|segments| segments[0] == "api" && segments[1] == "Sub" && segments[2] == id)
}

/// Where one episode worker is. The last four are terminal and say what was found when the
/// worker stopped, `Failed` means the page never got going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    Navigating,
    AwaitingEvent,
    VideoFound,
    SubtitleFound,
    Both,
    TimedOut,
    Failed,
}

impl EpisodeState {
    fn settled(episode: &Episode) -> Self {
        match (episode.source.is_some(), !episode.subtitles.is_empty()) {
            (true, true) => Self::Both,
            (true, false) => Self::VideoFound,
            (false, true) => Self::SubtitleFound,
            (false, false) => Self::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeProgress {
    pub completed: usize,
    pub total: usize,
}

impl ScrapeProgress {
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        self.completed * 100 / self.total
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub complete: usize,
    pub partial: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Fills source and subtitles of every episode by opening its watch page and listening for
/// the player's requests. The semaphore is shared by every caller, so it bounds open pages for
/// the whole process.
pub struct EpisodeScraper {
    driver: DynBrowserDriver,
    catalog: DynCatalogService,
    pages: Arc<Semaphore>,
    episode_timeout: Duration,
    proxy_base: String,
}

impl EpisodeScraper {
    pub fn new(
        driver: DynBrowserDriver,
        catalog: DynCatalogService,
        concurrency: usize,
        episode_timeout: Duration,
        proxy_base: String,
    ) -> Self {
        Self {
            driver,
            catalog,
            pages: Arc::new(Semaphore::new(concurrency.max(1))),
            episode_timeout,
            proxy_base,
        }
    }

    pub async fn scrape(
        &self,
        detail: &mut SeriesDetail,
        session: &CatalogSession,
        progress: Option<mpsc::UnboundedSender<ScrapeProgress>>,
    ) -> ScrapeSummary {
        let total = detail.episodes.len();
        let series_id = detail.id;
        let title = detail.title.clone();
        info!("deep scraping {} episodes of {}", total, title);

        let completed = AtomicUsize::new(0);
        let completed = &completed;
        let progress = &progress;

        // each worker owns exactly one episode through its &mut, no locking on the detail
        let workers = detail.episodes.iter_mut().map(|episode| {
            let watch_url =
                self.catalog
                    .episode_watch_url(&title, series_id, episode.id, episode.number);

            async move {
                let state = match self.pages.acquire().await {
                    Ok(_permit) => self.scrape_episode(episode, &watch_url, session).await,
                    Err(e) => {
                        error!("page semaphore closed: {}", e);
                        EpisodeState::Failed
                    }
                };

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(tx) = progress {
                    let _ = tx.send(ScrapeProgress { completed: done, total });
                }
                state
            }
        });

        let states = join_all(workers).await;

        let mut summary = ScrapeSummary::default();
        for state in states {
            match state {
                EpisodeState::Both => summary.complete += 1,
                EpisodeState::VideoFound | EpisodeState::SubtitleFound => summary.partial += 1,
                EpisodeState::TimedOut => summary.empty += 1,
                _ => summary.failed += 1,
            }
        }

        info!("deep scrape of {} done: {:?}", title, summary);
        summary
    }

    async fn scrape_episode(
        &self,
        episode: &mut Episode,
        watch_url: &str,
        session: &CatalogSession,
    ) -> EpisodeState {
        debug!(episode = episode.number, state = ?EpisodeState::Navigating, "navigating to {}", watch_url);

        let page = match self.driver.open_page().await {
            Ok(page) => page,
            Err(e) => {
                error!("failed to open page for episode {}: {:#}", episode.number, e);
                return EpisodeState::Failed;
            }
        };

        let number = episode.number;
        let outcome = AssertUnwindSafe(self.sniff_episode(page.as_ref(), episode, watch_url, session))
            .catch_unwind()
            .await;

        if let Err(e) = page.close().await {
            warn!("failed to close page for episode {}: {}", number, e);
        }

        match outcome {
            Ok(state) => state,
            Err(_) => {
                error!("worker for episode {} panicked", number);
                EpisodeState::Failed
            }
        }
    }

    async fn sniff_episode(
        &self,
        page: &dyn BrowserPage,
        episode: &mut Episode,
        watch_url: &str,
        session: &CatalogSession,
    ) -> EpisodeState {
        let deadline = Instant::now() + self.episode_timeout;

        let mut events = match page.network_events(true).await {
            Ok(events) => events,
            Err(e) => {
                warn!("failed to watch network for episode {}: {}", episode.number, e);
                return EpisodeState::Failed;
            }
        };

        let navigation = page.navigate(watch_url);
        tokio::pin!(navigation);
        let mut navigating = true;

        loop {
            tokio::select! {
                biased;

                _ = sleep_until(deadline) => {
                    warn!("timeout for episode {}", episode.number);
                    metrics::counter!("episode_scrape_timeouts_total").increment(1);
                    break;
                }

                result = &mut navigation, if navigating => {
                    navigating = false;
                    match result {
                        Ok(()) => debug!(episode = episode.number, state = ?EpisodeState::AwaitingEvent),
                        Err(e) => warn!("navigation for episode {} failed, still listening: {}", episode.number, e),
                    }
                }

                event = events.next() => match event {
                    Some(NetworkEvent::ResponseReceived { url, mime_type, .. }) => {
                        self.on_response(episode, &url, &mime_type, watch_url, session, deadline).await;
                        if episode.is_complete() {
                            break;
                        }
                    }
                    Some(_) => {}
                    None => {
                        debug!("network events closed for episode {}", episode.number);
                        break;
                    }
                },
            }
        }

        EpisodeState::settled(episode)
    }

    async fn on_response(
        &self,
        episode: &mut Episode,
        url: &str,
        mime_type: &str,
        watch_url: &str,
        session: &CatalogSession,
        deadline: Instant,
    ) {
        if episode.source.is_none() {
            let source = match classify_media(url, Some(mime_type)) {
                Some(MediaKind::Playlist) => Some(hls_proxy_source(&self.proxy_base, url)),
                Some(MediaKind::Mp4) => Some(mp4_proxy_source(&self.proxy_base, url)),
                _ => None,
            };

            if let Some(source) = source {
                info!("found video for ep {}: {}", episode.number, source);
                episode.source = Some(source);
            }
        }

        if !episode.subtitles.is_empty() || !is_subtitle_request(url, episode.id) {
            return;
        }

        match timeout_at(deadline, self.catalog.fetch_subtitles(url, watch_url, session)).await {
            Ok(Ok(mut tracks)) => {
                for track in tracks.iter_mut() {
                    track.src = subtitle_proxy_source(&self.proxy_base, &track.src);
                }
                info!("parsed {} subtitles for ep {}", tracks.len(), episode.number);
                episode.subtitles = tracks;
            }
            Ok(Err(e)) => warn!("failed to fetch subtitles for ep {}: {}", episode.number, e),
            Err(_) => warn!("subtitle fetch for ep {} ran past the deadline", episode.number),
        }
    }
}
