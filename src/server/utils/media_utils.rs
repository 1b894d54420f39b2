use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use tracing::error;

use crate::server::error::{AppResult, Error};

pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";
pub const MP4_MIME: &str = "video/mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Playlist,
    Mp4,
    Segment,
}

impl MediaKind {
    /// playlists and whole files are what a player can start from, a lone segment is not
    pub fn is_video_source(&self) -> bool {
        matches!(self, Self::Playlist | Self::Mp4)
    }
}

/// Media predicate shared by the resolver and the episode scraper.
///
/// `.m3u8` and `.mp4` are matched anywhere in the url since cdn links like to bury them before
/// a token path. `.ts` only counts as the path extension, otherwise every `.tsx` bundle and
/// `/posts` route would look like video.
pub fn classify_media(url: &str, mime: Option<&str>) -> Option<MediaKind> {
    let mime = mime.map(|m| m.to_ascii_lowercase());
    let lower = url.to_ascii_lowercase();

    if lower.contains(".m3u8") || mime.as_deref().is_some_and(|m| m == HLS_MIME) {
        return Some(MediaKind::Playlist);
    }
    if lower.contains(".mp4") || mime.as_deref().is_some_and(|m| m == MP4_MIME) {
        return Some(MediaKind::Mp4);
    }

    let path = url::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| lower.split(['?', '#']).next().unwrap_or_default().to_string());
    if path.ends_with(".ts") {
        return Some(MediaKind::Segment);
    }

    None
}

pub fn is_media_url(url: &str) -> bool {
    classify_media(url, None).is_some()
}

pub fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// path style source, the m3u8 route rebuilds the upstream url from the path
pub fn hls_proxy_source(proxy_base: &str, media_url: &str) -> String {
    format!("{}/m3u8/{}", proxy_base, strip_scheme(media_url))
}

/// query style source, the mp4 route takes the url as is
pub fn mp4_proxy_source(proxy_base: &str, media_url: &str) -> String {
    format!("{}/mp4?url={}", proxy_base, urlencoding::encode(media_url))
}

pub fn subtitle_proxy_source(proxy_base: &str, subtitle_url: &str) -> String {
    format!("{}/subtitle/{}", proxy_base, strip_scheme(subtitle_url))
}

/// `url` params come in plain, still percent encoded, or as unpadded url safe base64.
/// The query extractor has already decoded once, a plain url is taken as it is so escapes in
/// signed cdn links survive
pub fn decode_url_param(url_param: &str) -> AppResult<String> {
    let url_param = url_param.trim();
    if url_param.is_empty() {
        return Err(Error::MissingParameter("url".to_string()));
    }

    let lower = url_param.to_ascii_lowercase();
    let decoded = if lower.starts_with("http://") || lower.starts_with("https://") {
        url_param.to_string()
    } else if lower.starts_with("http%3a") || lower.starts_with("https%3a") {
        urlencoding::decode(url_param)
            .map(|s| s.to_string())
            .map_err(|e| {
                error!("failed to decode url: {}", e);
                Error::BadRequest("invalid url encoding".to_string())
            })?
    } else {
        let mut padded = url_param.to_string();
        while padded.len() % 4 != 0 {
            padded.push('=');
        }

        let bytes = URL_SAFE.decode(&padded).map_err(|e| {
            error!("failed to decode base64 url: {}", e);
            Error::BadRequest("invalid url encoding".to_string())
        })?;

        String::from_utf8(bytes).map_err(|e| {
            error!("failed to parse url as utf-8: {}", e);
            Error::BadRequest("invalid url encoding".to_string())
        })?
    };

    if !decoded.starts_with("http://") && !decoded.starts_with("https://") {
        return Err(Error::BadRequest("invalid url format".to_string()));
    }

    Ok(decoded)
}
