use std::sync::Arc;

use tracing::{debug, info};

use crate::server::utils::cache_utils::{
    CacheStore, DynCacheStore, EvictionPolicy, MemoryCacheStore,
};

/// page url -> resolved media url, so a page only goes through the browser once while its
/// media url keeps working
pub struct MediaCache {
    store: DynCacheStore<String>,
}

impl MediaCache {
    pub fn new(store: DynCacheStore<String>) -> Self {
        Self { store }
    }

    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self::new(Arc::new(MemoryCacheStore::<String>::new(policy)))
    }

    pub fn lookup(&self, page_url: &str) -> Option<String> {
        match self.store.get(page_url) {
            Some(media_url) => {
                info!("[cache hit] {}", page_url);
                metrics::counter!("media_cache_hits_total").increment(1);
                Some(media_url)
            }
            None => {
                debug!("[cache miss] {}", page_url);
                metrics::counter!("media_cache_misses_total").increment(1);
                None
            }
        }
    }

    pub fn store(&self, page_url: &str, media_url: &str) {
        self.store.insert(page_url, media_url.to_string());
    }

    /// drop a stale entry so the next lookup goes back to the browser
    pub fn invalidate(&self, page_url: &str) -> bool {
        let removed = self.store.remove(page_url).is_some();
        if removed {
            info!("[cache invalid] {}", page_url);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
