// everything that talks CDP lives here, the resolver and the scraper only see the traits so
// they can be driven by a fake browser in tests
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    SetCacheDisabledParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// the three network events the sniffers care about, flattened out of the cdp types
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    RequestWillBeSent {
        request_id: String,
        url: String,
    },
    ResponseReceived {
        request_id: String,
        url: String,
        mime_type: String,
    },
    LoadingFinished {
        request_id: String,
    },
}

pub type NetworkEventStream = BoxStream<'static, NetworkEvent>;

pub type DynBrowserDriver = Arc<dyn BrowserDriver + Send + Sync>;

/// a single tab, owned by exactly one task which has to call `close` on every exit path
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// turns on network interception and subscribes. call before `navigate` or the first
    /// requests of the page are gone
    async fn network_events(&self, disable_cache: bool) -> anyhow::Result<NetworkEventStream>;

    async fn navigate(&self, url: &str) -> anyhow::Result<()>;

    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait BrowserDriver {
    async fn open_page(&self) -> anyhow::Result<Box<dyn BrowserPage>>;

    fn is_launched(&self) -> bool;

    fn open_pages(&self) -> usize;

    async fn shutdown(&self);
}

/// a launched browser process
#[async_trait]
pub trait BrowserInstance: Send + Sync {
    async fn new_page(&self) -> anyhow::Result<Box<dyn BrowserPage>>;

    /// false once the process or its event loop is gone
    fn is_alive(&self) -> bool;

    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// pages opened by the instance keep `open_pages` up to date
    async fn launch(
        &self,
        open_pages: Arc<AtomicUsize>,
    ) -> anyhow::Result<Box<dyn BrowserInstance>>;
}

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// One browser for the whole process, launched on first use and reused after that.
///
/// An instance that died or refuses new pages is closed and replaced by a fresh launch, at most
/// once per `open_page` call.
pub struct SupervisedBrowser<L> {
    launcher: L,
    instance: RwLock<Option<Box<dyn BrowserInstance>>>,
    launched: AtomicBool,
    open_pages: Arc<AtomicUsize>,
}

pub type ChromiumDriver = SupervisedBrowser<ChromiumLauncher>;

impl ChromiumDriver {
    pub fn chromium(executable: Option<String>) -> Self {
        SupervisedBrowser::new(ChromiumLauncher { executable })
    }
}

impl<L: BrowserLauncher> SupervisedBrowser<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            instance: RwLock::new(None),
            launched: AtomicBool::new(false),
            open_pages: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn discard(&self, instance: Box<dyn BrowserInstance>) {
        self.launched.store(false, Ordering::SeqCst);
        if timeout(CLOSE_TIMEOUT, instance.close()).await.is_err() {
            warn!("browser did not close within {}s", CLOSE_TIMEOUT.as_secs());
        }
    }
}

#[async_trait]
impl<L: BrowserLauncher> BrowserDriver for SupervisedBrowser<L> {
    async fn open_page(&self) -> anyhow::Result<Box<dyn BrowserPage>> {
        {
            let guard = self.instance.read().await;
            if let Some(instance) = guard.as_ref().filter(|i| i.is_alive()) {
                match instance.new_page().await {
                    Ok(page) => return Ok(page),
                    Err(e) => warn!("browser refused a new page: {:#}", e),
                }
            }
        }

        let mut guard = self.instance.write().await;
        // someone else may have relaunched while we waited for the write lock
        if let Some(instance) = guard.as_ref().filter(|i| i.is_alive()) {
            if let Ok(page) = instance.new_page().await {
                return Ok(page);
            }
        }

        if let Some(dead) = guard.take() {
            warn!("replacing unusable browser");
            self.discard(dead).await;
        }

        let instance = self.launcher.launch(self.open_pages.clone()).await?;
        self.launched.store(true, Ordering::SeqCst);
        let page = instance.new_page().await;
        *guard = Some(instance);
        page
    }

    fn is_launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }

    fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        let Some(instance) = self.instance.write().await.take() else {
            return;
        };

        info!("closing browser ({} pages still open)", self.open_pages());
        self.discard(instance).await;
    }
}

pub struct ChromiumLauncher {
    executable: Option<String>,
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        open_pages: Arc<AtomicUsize>,
    ) -> anyhow::Result<Box<dyn BrowserInstance>> {
        info!("launching headless chromium...");

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--mute-audio")
            .arg("--autoplay-policy=no-user-gesture-required");

        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("invalid browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch chromium")?;

        // the handler has to be polled for the whole browser lifetime or every command hangs
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {}", e);
                }
            }
            warn!("chromium event loop ended");
        });

        info!("chromium is up");

        Ok(Box::new(ChromiumInstance {
            browser,
            handler,
            open_pages,
        }))
    }
}

struct ChromiumInstance {
    browser: Browser,
    handler: JoinHandle<()>,
    open_pages: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserInstance for ChromiumInstance {
    async fn new_page(&self) -> anyhow::Result<Box<dyn BrowserPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to open browser page")?;

        self.open_pages.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ChromiumPage {
            page: Some(page),
            open_pages: self.open_pages.clone(),
        }))
    }

    fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn close(mut self: Box<Self>) {
        if let Err(e) = self.browser.close().await {
            warn!("failed to close chromium cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("failed to wait for chromium to exit: {}", e);
        }
        self.handler.abort();
    }
}

struct ChromiumPage {
    page: Option<Page>,
    open_pages: Arc<AtomicUsize>,
}

impl ChromiumPage {
    fn page(&self) -> anyhow::Result<&Page> {
        self.page.as_ref().ok_or_else(|| anyhow!("page already closed"))
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn network_events(&self, disable_cache: bool) -> anyhow::Result<NetworkEventStream> {
        let page = self.page()?;

        if disable_cache {
            page.execute(SetCacheDisabledParams::new(true))
                .await
                .context("failed to disable page cache")?;
        }
        page.execute(EnableParams::default())
            .await
            .context("failed to enable network domain")?;

        let requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to listen for requests")?
            .map(|e| NetworkEvent::RequestWillBeSent {
                request_id: e.request_id.inner().clone(),
                url: e.request.url.clone(),
            });

        let responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to listen for responses")?
            .map(|e| NetworkEvent::ResponseReceived {
                request_id: e.request_id.inner().clone(),
                url: e.response.url.clone(),
                mime_type: e.response.mime_type.clone(),
            });

        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .context("failed to listen for finished loads")?
            .map(|e| NetworkEvent::LoadingFinished {
                request_id: e.request_id.inner().clone(),
            });

        // three separate channels, so ordering between event kinds of the same request is not
        // guaranteed. the sniffers cope with a finish arriving before its request
        Ok(futures::stream::select_all([
            requests.boxed(),
            responses.boxed(),
            finished.boxed(),
        ])
        .boxed())
    }

    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.page()?
            .goto(url)
            .await
            .with_context(|| format!("navigation to {} failed", url))?;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> anyhow::Result<()> {
        if let Some(page) = self.page.take() {
            page.close().await.context("failed to close page")?;
        }
        Ok(())
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
    }
}
