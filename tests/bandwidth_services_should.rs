use std::time::Duration;

use rerng_api::server::services::bandwidth_services::{
    BandwidthEstimator, BandwidthEstimatorTrait, DEFAULT_CHUNK_SIZE, PROBE_BYTES, chunk_size_for_throughput,
    throughput_mbps,
};
use rerng_api::server::utils::cache_utils::EvictionPolicy;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MIB: u64 = 1024 * 1024;

fn estimator() -> BandwidthEstimator {
    BandwidthEstimator::new(
        reqwest::Client::new(),
        "https://kisskh.co/".to_string(),
        EvictionPolicy::Unbounded,
    )
}

#[test]
fn test_chunk_size_tiers() {
    assert_eq!(chunk_size_for_throughput(0.5), 2 * MIB);
    assert_eq!(chunk_size_for_throughput(1.99), 2 * MIB);
    assert_eq!(chunk_size_for_throughput(2.0), 4 * MIB);
    assert_eq!(chunk_size_for_throughput(4.9), 4 * MIB);
    assert_eq!(chunk_size_for_throughput(5.0), 8 * MIB);
    assert_eq!(chunk_size_for_throughput(9.99), 8 * MIB);
    assert_eq!(chunk_size_for_throughput(10.0), 16 * MIB);
    assert_eq!(chunk_size_for_throughput(250.0), 16 * MIB);
}

#[test]
fn test_throughput_in_megabits() {
    assert_eq!(throughput_mbps(MIB, Duration::from_secs(1)), 8.388608);
    assert_eq!(throughput_mbps(125_000, Duration::from_millis(500)), 2.0);
}

#[test]
fn test_zero_elapsed_counts_as_a_tenth_of_a_second() {
    assert_eq!(throughput_mbps(125_000, Duration::ZERO), 10.0);
}

#[tokio::test]
async fn test_failed_probe_falls_back_without_caching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let estimator = estimator();
    let url = format!("{}/v.mp4", server.uri());

    assert_eq!(estimator.estimate("1.2.3.4", &url).await, DEFAULT_CHUNK_SIZE);
    assert_eq!(estimator.estimate("1.2.3.4", &url).await, DEFAULT_CHUNK_SIZE);
    assert_eq!(estimator.cached_profiles(), 0);
}

#[tokio::test]
async fn test_successful_probe_is_cached_per_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .and(header("range", "bytes=0-1048575"))
        .and(header("referer", "https://kisskh.co/"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![7u8; 64]))
        .expect(1)
        .mount(&server)
        .await;

    let estimator = estimator();
    let url = format!("{}/v.mp4", server.uri());

    let first = estimator.estimate("5.6.7.8", &url).await;
    let second = estimator.estimate("5.6.7.8", &url).await;

    assert_eq!(first, second);
    assert_eq!(estimator.cached_profiles(), 1);
}

#[tokio::test]
async fn test_unreachable_probe_falls_back() {
    let estimator = estimator();

    let chunk = estimator
        .estimate("9.9.9.9", "http://127.0.0.1:9/v.mp4")
        .await;

    assert_eq!(chunk, DEFAULT_CHUNK_SIZE);
    assert_eq!(estimator.cached_profiles(), 0);
}

#[tokio::test]
async fn test_probe_stops_at_a_mebibyte_when_range_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whole.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 6 * MIB as usize]))
        .expect(1)
        .mount(&server)
        .await;

    let (bytes, _) = estimator()
        .probe(&format!("{}/whole.mp4", server.uri()))
        .await
        .unwrap();

    assert_eq!(bytes, PROBE_BYTES);
}
