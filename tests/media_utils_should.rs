use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rerng_api::server::error::Error;
use rerng_api::server::utils::media_utils::{
    MediaKind, classify_media, decode_url_param, hls_proxy_source, is_media_url, mp4_proxy_source,
    strip_scheme, subtitle_proxy_source,
};

const PROXY: &str = "http://localhost:8585/api/v1/admin/proxy";

#[test]
fn test_classifies_by_url() {
    assert_eq!(
        classify_media("https://cdn.example.com/v/master.m3u8?t=1", None),
        Some(MediaKind::Playlist)
    );
    assert_eq!(
        classify_media("https://cdn.example.com/video.mp4/token/abc", None),
        Some(MediaKind::Mp4)
    );
    assert_eq!(
        classify_media("https://cdn.example.com/seg-001.ts?x=1", None),
        Some(MediaKind::Segment)
    );
}

#[test]
fn test_classifies_by_mime() {
    assert_eq!(
        classify_media("https://cdn.example.com/stream", Some("Application/Vnd.Apple.MpegURL")),
        Some(MediaKind::Playlist)
    );
    assert_eq!(
        classify_media("https://cdn.example.com/file", Some("video/mp4")),
        Some(MediaKind::Mp4)
    );
}

#[test]
fn test_ts_must_be_the_extension() {
    assert_eq!(classify_media("https://kisskh.co/static/app.tsx", None), None);
    assert_eq!(classify_media("https://kisskh.co/posts", None), None);
    assert!(!is_media_url("https://kisskh.co/api/DramaList/Drama/1"));
}

#[test]
fn test_only_playlists_and_files_are_sources() {
    assert!(MediaKind::Playlist.is_video_source());
    assert!(MediaKind::Mp4.is_video_source());
    assert!(!MediaKind::Segment.is_video_source());
}

#[test]
fn test_proxy_sources() {
    assert_eq!(strip_scheme("http://a.b/c"), "a.b/c");
    assert_eq!(
        hls_proxy_source(PROXY, "https://hls.example.com/1/index.m3u8?t=2"),
        "http://localhost:8585/api/v1/admin/proxy/m3u8/hls.example.com/1/index.m3u8?t=2"
    );
    assert_eq!(
        mp4_proxy_source(PROXY, "https://a.example.com/v.mp4"),
        "http://localhost:8585/api/v1/admin/proxy/mp4?url=https%3A%2F%2Fa.example.com%2Fv.mp4"
    );
    assert_eq!(
        subtitle_proxy_source(PROXY, "https://sub.example.com/en.srt"),
        "http://localhost:8585/api/v1/admin/proxy/subtitle/sub.example.com/en.srt"
    );
}

#[test]
fn test_decodes_plain_and_percent_encoded_urls() {
    assert_eq!(
        decode_url_param("https://kisskh.co/Drama/x?id=1").unwrap(),
        "https://kisskh.co/Drama/x?id=1"
    );
    assert_eq!(
        decode_url_param("https%3A%2F%2Fkisskh.co%2FDrama%2Fx%3Fid%3D1").unwrap(),
        "https://kisskh.co/Drama/x?id=1"
    );
}

#[test]
fn test_plain_urls_keep_their_escapes() {
    assert_eq!(
        decode_url_param("https://cdn.example.com/v.mp4?sig=a%2Bb%3D&p=%25").unwrap(),
        "https://cdn.example.com/v.mp4?sig=a%2Bb%3D&p=%25"
    );
}

#[test]
fn test_decodes_unpadded_base64_urls() {
    let url = "https://kisskh.co/Drama/Some-Show/Episode-1?id=1&ep=2";
    let encoded = URL_SAFE_NO_PAD.encode(url);

    assert_eq!(decode_url_param(&encoded).unwrap(), url);
}

#[test]
fn test_rejects_bad_params() {
    assert!(matches!(
        decode_url_param("   "),
        Err(Error::MissingParameter(_))
    ));
    assert!(matches!(
        decode_url_param("not base64 at all!"),
        Err(Error::BadRequest(_))
    ));
    assert!(matches!(
        decode_url_param(&URL_SAFE_NO_PAD.encode("ftp://files.example.com/x.mp4")),
        Err(Error::BadRequest(_))
    ));
}
