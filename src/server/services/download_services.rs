use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::server::error::{AppResult, Error};
use crate::server::services::stream_services::StreamService;
use crate::server::utils::cache_utils::{
    CacheStore, DynCacheStore, EvictionPolicy, MemoryCacheStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadState {
    Pending,
    Running { bytes: u64, total: Option<u64> },
    Completed { bytes: u64 },
    Failed { reason: String },
}

impl DownloadState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub id: String,
    pub page_url: String,
    pub media_url: String,
    pub file: String,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: DownloadState,
}

/// Server side downloads. Each job writes its own `<id>.mp4` and reports through the job table,
/// which is what the status route reads. Jobs move to the bounded history once they end.
pub struct DownloadManager {
    jobs: Arc<DashMap<String, DownloadJob>>,
    history: DynCacheStore<DownloadJob>,
    dir: PathBuf,
    streams: Arc<StreamService>,
}

impl DownloadManager {
    pub fn new(
        dir: impl Into<PathBuf>,
        streams: Arc<StreamService>,
        history: EvictionPolicy,
    ) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            history: Arc::new(MemoryCacheStore::<DownloadJob>::new(history)),
            dir: dir.into(),
            streams,
        }
    }

    pub fn status(&self, id: &str) -> Option<DownloadJob> {
        self.jobs
            .get(id)
            .map(|job| job.clone())
            .or_else(|| self.history.get(id))
    }

    pub fn active(&self) -> usize {
        self.jobs.len()
    }

    pub fn finished(&self) -> usize {
        self.history.len()
    }

    pub async fn start(
        &self,
        page_url: &str,
        media_url: &str,
        range: Option<String>,
    ) -> AppResult<DownloadJob> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            error!("failed to create download dir {}: {}", self.dir.display(), e);
            Error::InternalServerErrorWithContext("failed to create download dir".to_string())
        })?;

        let id = nanoid::nanoid!();
        let file = self.dir.join(format!("{}.mp4", id));
        let job = DownloadJob {
            id: id.clone(),
            page_url: page_url.to_string(),
            media_url: media_url.to_string(),
            file: file.display().to_string(),
            started_at: Utc::now(),
            state: DownloadState::Pending,
        };
        self.jobs.insert(id.clone(), job.clone());
        info!("starting download {} for {}", id, page_url);

        let jobs = self.jobs.clone();
        let history = self.history.clone();
        let streams = self.streams.clone();
        let media_url = media_url.to_string();

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(Self::run(&jobs, &streams, &id, &media_url, range, &file))
                .catch_unwind()
                .await;

            let state = match outcome {
                Ok(Ok(bytes)) => {
                    info!("download {} finished, {} bytes", id, bytes);
                    DownloadState::Completed { bytes }
                }
                Ok(Err(reason)) => {
                    error!("download {} failed: {}", id, reason);
                    DownloadState::Failed { reason }
                }
                Err(_) => {
                    error!("download {} panicked", id);
                    DownloadState::Failed {
                        reason: "download task panicked".to_string(),
                    }
                }
            };

            // into the history first so the status route never sees a gap
            if let Some(mut job) = jobs.get(&id).map(|job| job.clone()) {
                job.state = state;
                history.insert(&id, job);
            }
            jobs.remove(&id);
        });

        Ok(job)
    }

    async fn run(
        jobs: &DashMap<String, DownloadJob>,
        streams: &StreamService,
        id: &str,
        media_url: &str,
        range: Option<String>,
        file: &Path,
    ) -> Result<u64, String> {
        let response = streams
            .fetch_media(media_url, None, range.as_deref())
            .await
            .map_err(|e| e.to_string())?;

        if response.status().as_u16() >= 400 {
            return Err(format!("upstream status {}", response.status()));
        }

        let total = response.content_length();
        let mut out = tokio::fs::File::create(file)
            .await
            .map_err(|e| format!("failed to create {}: {}", file.display(), e))?;

        let mut body = response.bytes_stream();
        let mut written: u64 = 0;
        let mut last_decile = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            out.write_all(&chunk).await.map_err(|e| e.to_string())?;
            written += chunk.len() as u64;

            if let Some(mut job) = jobs.get_mut(id) {
                job.state = DownloadState::Running {
                    bytes: written,
                    total,
                };
            }

            match total.filter(|t| *t > 0) {
                Some(total) => {
                    let decile = written * 10 / total;
                    if decile > last_decile {
                        last_decile = decile;
                        info!("downloading {}: {}%", id, decile * 10);
                    }
                }
                None => debug!("downloaded {} bytes of {}", written, id),
            }
        }

        out.flush().await.map_err(|e| e.to_string())?;
        Ok(written)
    }
}
