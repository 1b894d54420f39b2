#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use rerng_api::server::services::browser_services::{
    BrowserDriver, BrowserPage, NetworkEvent, NetworkEventStream,
};

/// what a page does once navigated: emit these events (each after its delay), then either
/// hang open or end the event stream
#[derive(Clone, Default)]
pub struct PageScript {
    pub events: Vec<(Duration, NetworkEvent)>,
    pub keep_open: bool,
}

impl PageScript {
    pub fn silent() -> Self {
        Self {
            events: Vec::new(),
            keep_open: true,
        }
    }

    pub fn emitting(events: Vec<NetworkEvent>) -> Self {
        Self {
            events: events.into_iter().map(|e| (Duration::ZERO, e)).collect(),
            keep_open: true,
        }
    }

    pub fn ending(mut self) -> Self {
        self.keep_open = false;
        self
    }
}

type Script = Arc<dyn Fn(&str) -> PageScript + Send + Sync>;

#[derive(Default)]
pub struct BrowserStats {
    pub opened: AtomicUsize,
    pub open_now: AtomicUsize,
    pub max_open: AtomicUsize,
    pub closed: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
}

/// scripted stand-in for chromium, keyed by the url each page navigates to
pub struct FakeBrowser {
    script: Script,
    fail_open: bool,
    pub stats: Arc<BrowserStats>,
}

impl FakeBrowser {
    pub fn new(script: impl Fn(&str) -> PageScript + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            fail_open: false,
            stats: Arc::new(BrowserStats::default()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(|_| PageScript::silent())
        }
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn open_page(&self) -> anyhow::Result<Box<dyn BrowserPage>> {
        if self.fail_open {
            return Err(anyhow!("chromium not installed"));
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_open.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(FakePage {
            script: self.script.clone(),
            stats: self.stats.clone(),
            events: Mutex::new(None),
        }))
    }

    fn is_launched(&self) -> bool {
        !self.fail_open
    }

    fn open_pages(&self) -> usize {
        self.stats.open_now.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {}
}

struct FakePage {
    script: Script,
    stats: Arc<BrowserStats>,
    events: Mutex<Option<mpsc::UnboundedSender<NetworkEvent>>>,
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn network_events(&self, _disable_cache: bool) -> anyhow::Result<NetworkEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.stats.navigations.lock().unwrap().push(url.to_string());

        let Some(tx) = self.events.lock().unwrap().take() else {
            return Ok(());
        };
        let script = (self.script)(url);

        tokio::spawn(async move {
            for (delay, event) in script.events {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(event).is_err() {
                    return;
                }
            }
            if script.keep_open {
                tx.closed().await;
            }
        });

        Ok(())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.stats.open_now.fetch_sub(1, Ordering::SeqCst);
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn request(id: &str, url: &str) -> NetworkEvent {
    NetworkEvent::RequestWillBeSent {
        request_id: id.to_string(),
        url: url.to_string(),
    }
}

pub fn response(id: &str, url: &str, mime: &str) -> NetworkEvent {
    NetworkEvent::ResponseReceived {
        request_id: id.to_string(),
        url: url.to_string(),
        mime_type: mime.to_string(),
    }
}

pub fn finished(id: &str) -> NetworkEvent {
    NetworkEvent::LoadingFinished {
        request_id: id.to_string(),
    }
}
