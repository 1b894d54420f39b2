use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rerng_api::server::services::download_services::{DownloadManager, DownloadState};
use rerng_api::server::services::stream_services::StreamService;
use rerng_api::server::utils::cache_utils::EvictionPolicy;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("rerng-downloads-{}", nanoid::nanoid!(8)))
}

fn manager(dir: &PathBuf) -> DownloadManager {
    manager_keeping(dir, EvictionPolicy::Unbounded)
}

fn manager_keeping(dir: &PathBuf, history: EvictionPolicy) -> DownloadManager {
    let streams = Arc::new(StreamService::new(
        reqwest::Client::new(),
        "https://kisskh.co/".to_string(),
    ));
    DownloadManager::new(dir.clone(), streams, history)
}

async fn wait_until_settled(manager: &DownloadManager, id: &str) -> DownloadState {
    for _ in 0..100 {
        let job = manager.status(id).unwrap();
        if !job.state.is_active() {
            return job.state;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("download {} never finished", id);
}

#[tokio::test]
async fn test_download_writes_its_own_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ep.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![42u8; 4096]))
        .mount(&server)
        .await;

    let dir = scratch_dir();
    let manager = manager(&dir);

    let job = manager
        .start(
            "https://kisskh.co/Drama/x/Episode-1",
            &format!("{}/ep.mp4", server.uri()),
            None,
        )
        .await
        .unwrap();

    assert_eq!(job.state, DownloadState::Pending);
    assert!(job.file.ends_with(&format!("{}.mp4", job.id)));

    let state = wait_until_settled(&manager, &job.id).await;

    assert_eq!(state, DownloadState::Completed { bytes: 4096 });
    assert_eq!(std::fs::read(&job.file).unwrap().len(), 4096);
    assert_eq!(manager.active(), 0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_concurrent_downloads_do_not_share_a_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ep.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 128]))
        .mount(&server)
        .await;

    let dir = scratch_dir();
    let manager = manager(&dir);
    let media = format!("{}/ep.mp4", server.uri());

    let first = manager.start("https://kisskh.co/a", &media, None).await.unwrap();
    let second = manager.start("https://kisskh.co/a", &media, None).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.file, second.file);

    wait_until_settled(&manager, &first.id).await;
    wait_until_settled(&manager, &second.id).await;

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_upstream_error_marks_the_job_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.mp4"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let dir = scratch_dir();
    let manager = manager(&dir);

    let job = manager
        .start("https://kisskh.co/b", &format!("{}/gone.mp4", server.uri()), None)
        .await
        .unwrap();

    let state = wait_until_settled(&manager, &job.id).await;

    assert!(matches!(state, DownloadState::Failed { reason } if reason.contains("410")));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_finished_jobs_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ep.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![3u8; 64]))
        .mount(&server)
        .await;

    let dir = scratch_dir();
    let manager = manager_keeping(&dir, EvictionPolicy::Capacity(1));
    let media = format!("{}/ep.mp4", server.uri());

    let first = manager.start("https://kisskh.co/a", &media, None).await.unwrap();
    wait_until_settled(&manager, &first.id).await;
    let second = manager.start("https://kisskh.co/b", &media, None).await.unwrap();
    wait_until_settled(&manager, &second.id).await;

    assert!(manager.status(&first.id).is_none());
    assert_eq!(
        manager.status(&second.id).unwrap().state,
        DownloadState::Completed { bytes: 64 }
    );
    assert_eq!(manager.active(), 0);
    assert_eq!(manager.finished(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_job_state_is_flattened_into_the_json() {
    let state = serde_json::to_value(DownloadState::Running {
        bytes: 10,
        total: Some(100),
    })
    .unwrap();

    assert_eq!(
        state,
        serde_json::json!({ "state": "running", "bytes": 10, "total": 100 })
    );
}

#[test]
fn test_unknown_job_has_no_status() {
    let manager = manager(&scratch_dir());

    assert!(manager.status("nope").is_none());
}
