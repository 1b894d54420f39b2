use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use mockall::automock;
use tracing::{info, warn};

use crate::server::services::stream_services::{DEFAULT_USER_AGENT, media_request};
use crate::server::utils::cache_utils::{
    CacheStore, DynCacheStore, EvictionPolicy, MemoryCacheStore,
};

const MIB: u64 = 1024 * 1024;

/// size of the throughput probe, the first MiB of the media
pub const PROBE_BYTES: u64 = MIB;

/// used whenever the probe fails, never cached
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * MIB;

/// `<2 Mbps` 2MiB, `<5` 4MiB, `<10` 8MiB, anything faster 16MiB
pub fn chunk_size_for_throughput(mbps: f64) -> u64 {
    if mbps < 2.0 {
        2 * MIB
    } else if mbps < 5.0 {
        4 * MIB
    } else if mbps < 10.0 {
        8 * MIB
    } else {
        16 * MIB
    }
}

pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let mut seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        seconds = 0.1;
    }

    (bytes * 8) as f64 / (seconds * 1_000_000.0)
}

pub type DynBandwidthEstimator = Arc<dyn BandwidthEstimatorTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait BandwidthEstimatorTrait {
    /// chunk size in bytes for requests from `client_ip` that come without a range
    async fn estimate(&self, client_ip: &str, media_url: &str) -> u64;

    fn cached_profiles(&self) -> usize;
}

pub struct BandwidthEstimator {
    http: reqwest::Client,
    referer: String,
    profiles: DynCacheStore<u64>,
}

impl BandwidthEstimator {
    pub fn new(http: reqwest::Client, referer: String, policy: EvictionPolicy) -> Self {
        Self {
            http,
            referer,
            profiles: Arc::new(MemoryCacheStore::<u64>::new(policy)),
        }
    }

    /// Bytes read and time taken, or `None` when the probe could not start.
    /// A body that breaks off midway still counts what arrived. Reading stops at
    /// [`PROBE_BYTES`] even when the upstream ignores the range and sends the whole file.
    pub async fn probe(&self, media_url: &str) -> Option<(u64, Duration)> {
        let range = format!("bytes=0-{}", PROBE_BYTES - 1);
        let started = Instant::now();

        let response = match media_request(
            &self.http,
            media_url,
            &self.referer,
            Some(DEFAULT_USER_AGENT),
            Some(&range),
        )
        .send()
        .await
        {
            Ok(response) if response.status().as_u16() < 400 => response,
            Ok(response) => {
                warn!("speed probe got status {}", response.status());
                return None;
            }
            Err(e) => {
                warn!("speed probe failed: {}", e);
                return None;
            }
        };

        let mut body = response.bytes_stream();
        let mut read: u64 = 0;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => read = (read + chunk.len() as u64).min(PROBE_BYTES),
                Err(_) => break,
            }
            if read >= PROBE_BYTES {
                break;
            }
        }

        Some((read, started.elapsed()))
    }
}

#[async_trait]
impl BandwidthEstimatorTrait for BandwidthEstimator {
    async fn estimate(&self, client_ip: &str, media_url: &str) -> u64 {
        if let Some(chunk_size) = self.profiles.get(client_ip) {
            info!(
                "[speed cache hit] ip={} -> {} MB chunk",
                client_ip,
                chunk_size / MIB
            );
            return chunk_size;
        }

        let Some((bytes, elapsed)) = self.probe(media_url).await else {
            warn!("[speed test fail] using default 4MB chunk for {}", client_ip);
            metrics::counter!("bandwidth_probe_failures_total").increment(1);
            return DEFAULT_CHUNK_SIZE;
        };

        let mbps = throughput_mbps(bytes, elapsed);
        let chunk_size = chunk_size_for_throughput(mbps);
        info!(
            "[speed test] {} -> {:.2} Mbps, {} MB chunk",
            client_ip,
            mbps,
            chunk_size / MIB
        );

        self.profiles.insert(client_ip, chunk_size);
        chunk_size
    }

    fn cached_profiles(&self) -> usize {
        self.profiles.len()
    }
}
