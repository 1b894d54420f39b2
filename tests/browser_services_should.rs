use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use futures::StreamExt;
use rerng_api::server::services::browser_services::{
    BrowserDriver, BrowserInstance, BrowserLauncher, BrowserPage, NetworkEvent, NetworkEventStream,
    SupervisedBrowser,
};

struct BlankPage {
    open_pages: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserPage for BlankPage {
    async fn network_events(&self, _disable_cache: bool) -> anyhow::Result<NetworkEventStream> {
        Ok(futures::stream::empty::<NetworkEvent>().boxed())
    }

    async fn navigate(&self, _url: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// flags shared between a test and every instance the launcher hands out
#[derive(Default)]
struct InstanceHealth {
    crashed: AtomicBool,
    refusing: AtomicBool,
    closed: AtomicUsize,
}

struct FakeInstance {
    health: Arc<InstanceHealth>,
    open_pages: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserInstance for FakeInstance {
    async fn new_page(&self) -> anyhow::Result<Box<dyn BrowserPage>> {
        if self.health.refusing.load(Ordering::SeqCst) {
            return Err(anyhow!("target closed"));
        }
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(BlankPage {
            open_pages: self.open_pages.clone(),
        }))
    }

    fn is_alive(&self) -> bool {
        !self.health.crashed.load(Ordering::SeqCst)
    }

    async fn close(self: Box<Self>) {
        self.health.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeLauncher {
    launches: AtomicUsize,
    fail: AtomicBool,
    /// health of the most recent launch
    current: std::sync::Mutex<Arc<InstanceHealth>>,
}

impl FakeLauncher {
    fn current(&self) -> Arc<InstanceHealth> {
        self.current.lock().unwrap().clone()
    }
}

struct SharedLauncher(Arc<FakeLauncher>);

#[async_trait]
impl BrowserLauncher for SharedLauncher {
    async fn launch(&self, open_pages: Arc<AtomicUsize>) -> anyhow::Result<Box<dyn BrowserInstance>> {
        let launcher = &self.0;
        if launcher.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("no chromium here"));
        }
        launcher.launches.fetch_add(1, Ordering::SeqCst);

        let health = Arc::new(InstanceHealth::default());
        *launcher.current.lock().unwrap() = health.clone();
        Ok(Box::new(FakeInstance { health, open_pages }))
    }
}

fn driver() -> (Arc<FakeLauncher>, SupervisedBrowser<SharedLauncher>) {
    let launcher = Arc::new(FakeLauncher::default());
    (launcher.clone(), SupervisedBrowser::new(SharedLauncher(launcher)))
}

#[tokio::test]
async fn test_launches_once_and_reuses_the_browser() {
    let (launcher, driver) = driver();
    assert!(!driver.is_launched());

    let first = driver.open_page().await.unwrap();
    let second = driver.open_page().await.unwrap();

    assert!(driver.is_launched());
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    assert_eq!(driver.open_pages(), 2);

    first.close().await.unwrap();
    second.close().await.unwrap();
    assert_eq!(driver.open_pages(), 0);
}

#[tokio::test]
async fn test_relaunches_after_the_browser_dies() {
    let (launcher, driver) = driver();
    driver.open_page().await.unwrap().close().await.unwrap();

    let crashed = launcher.current();
    crashed.crashed.store(true, Ordering::SeqCst);

    driver.open_page().await.unwrap().close().await.unwrap();

    assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
    assert_eq!(crashed.closed.load(Ordering::SeqCst), 1);
    assert!(driver.is_launched());
}

#[tokio::test]
async fn test_relaunches_when_pages_are_refused() {
    let (launcher, driver) = driver();
    driver.open_page().await.unwrap().close().await.unwrap();

    let stuck = launcher.current();
    stuck.refusing.store(true, Ordering::SeqCst);

    assert!(driver.open_page().await.is_ok());
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
    assert_eq!(stuck.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_launch_failure_is_reported_and_retried_next_time() {
    let (launcher, driver) = driver();
    launcher.fail.store(true, Ordering::SeqCst);

    assert!(driver.open_page().await.is_err());
    assert!(!driver.is_launched());

    launcher.fail.store(false, Ordering::SeqCst);
    assert!(driver.open_page().await.is_ok());
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_closes_the_browser() {
    let (launcher, driver) = driver();
    driver.open_page().await.unwrap().close().await.unwrap();

    driver.shutdown().await;

    assert_eq!(launcher.current().closed.load(Ordering::SeqCst), 1);
    assert!(!driver.is_launched());
}
