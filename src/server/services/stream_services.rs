use std::io::{self, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use futures::{Stream, StreamExt, TryStreamExt, stream::BoxStream};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::server::error::{AppResult, Error};
use crate::server::utils::hls_utils::rewrite_playlist;
use crate::server::utils::media_utils::HLS_MIME;
use crate::server::utils::subtitle_utils::{is_srt, srt_to_vtt};

/// read buffer for relaying upstream bodies, bytes are forwarded as soon as a read returns
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

const MEDIA_ACCEPT: &str = "video/*,audio/*,*/*";
const MEDIA_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";
const PASSTHROUGH_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const VTT_MIME: &str = "text/vtt; charset=utf-8";

/// never copied from upstream, they describe the upstream connection and not the body
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
];

/// the request the site's own player would make for the media file
pub fn media_request(
    http: &reqwest::Client,
    media_url: &str,
    referer: &str,
    user_agent: Option<&str>,
    range: Option<&str>,
) -> reqwest::RequestBuilder {
    let mut request = http
        .get(media_url)
        .header(header::USER_AGENT, user_agent.unwrap_or(DEFAULT_USER_AGENT))
        .header(header::REFERER, referer)
        .header(header::ACCEPT, MEDIA_ACCEPT)
        .header(header::ACCEPT_LANGUAGE, MEDIA_ACCEPT_LANGUAGE)
        .header(header::ACCEPT_ENCODING, "identity");

    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }

    request
}

/// wildcard cors, players load from anywhere
pub fn apply_cors(headers: &mut HeaderMap) {
    let any = HeaderValue::from_static("*");
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, any.clone());
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, any.clone());
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, any);
}

pub fn preflight_response() -> Response {
    let mut headers = HeaderMap::new();
    apply_cors(&mut headers);
    (StatusCode::NO_CONTENT, headers).into_response()
}

/// Supported compression encodings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// hls players that send `identity` must get plain text back
    pub fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        match accept_encoding {
            Some(v) => {
                if v == "identity" || v.starts_with("identity,") {
                    return Self::None;
                }
                if v.contains("zstd") {
                    Self::Zstd
                } else if v.contains("gzip") {
                    Self::Gzip
                } else {
                    Self::None
                }
            }
            None => Self::None,
        }
    }

    /// what an upstream `Content-Encoding` says the body is packed with
    pub fn from_content_encoding(content_encoding: Option<&str>) -> Self {
        match content_encoding.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("zstd") => Self::Zstd,
            Some("gzip") => Self::Gzip,
            _ => Self::None,
        }
    }

    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    pub fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Self::Zstd => zstd::decode_all(data),
            Self::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut decompressed = Vec::new();
                decoder.read_to_end(&mut decompressed)?;
                Ok(decompressed)
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}

type UpstreamBody = BoxStream<'static, io::Result<Bytes>>;

/// One client connection being fed from one upstream body.
///
/// Counts what went out and logs how it ended when dropped, which is also how a client
/// disconnect shows up: hyper drops the body and the upstream connection goes with it.
pub struct StreamSession {
    upstream: ReaderStream<StreamReader<UpstreamBody, Bytes>>,
    target: String,
    range: Option<String>,
    written: u64,
    finished: bool,
}

impl StreamSession {
    pub fn new(upstream: reqwest::Response, target: &str, range: Option<String>) -> Self {
        let body: UpstreamBody = upstream.bytes_stream().map_err(io::Error::other).boxed();

        Self {
            upstream: ReaderStream::with_capacity(StreamReader::new(body), COPY_BUFFER_SIZE),
            target: target.to_string(),
            range,
            written: 0,
            finished: false,
        }
    }
}

impl Stream for StreamSession {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match Pin::new(&mut this.upstream).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.written += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                error!("[stream read error] {}: {}", this.target, e);
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        metrics::counter!("proxy_bytes_streamed_total").increment(self.written);

        let range = self.range.as_deref().unwrap_or("-");
        if self.finished {
            debug!(
                "streamed {} bytes of {} (range {})",
                self.written, self.target, range
            );
        } else {
            info!(
                "[client closed] {} after {} bytes (range {})",
                self.target, self.written, range
            );
        }
    }
}

/// mirrors upstream status and headers, swaps in our cors headers and streams the body
pub fn relay_response(upstream: reqwest::Response, target: &str, range: Option<String>) -> Response {
    let status = upstream.status();
    let mut headers = HeaderMap::with_capacity(upstream.headers().len() + 3);

    for (name, value) in upstream.headers() {
        if HOP_BY_HOP.contains(name) || name.as_str().starts_with("access-control-") {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    apply_cors(&mut headers);

    let body = Body::from_stream(StreamSession::new(upstream, target, range));
    (status, headers, body).into_response()
}

/// Buffers a playlist, rewrites it through the proxy and answers in the client's preferred
/// encoding. Error answers are relayed untouched.
pub async fn relay_playlist(
    upstream: reqwest::Response,
    playlist_url: &Url,
    proxy_base: &str,
    accept_encoding: Option<&str>,
) -> AppResult<Response> {
    let status = upstream.status();
    if !status.is_success() {
        warn!("playlist {} answered {}, relaying as is", playlist_url, status);
        return Ok(relay_response(upstream, playlist_url.as_str(), None));
    }
    let upstream_encoding = ContentEncoding::from_content_encoding(
        upstream
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok()),
    );

    let bytes = upstream.bytes().await.map_err(|e| {
        error!("failed to read playlist body: {}", e);
        Error::UpstreamFetchFailed(e.to_string())
    })?;

    let raw = upstream_encoding.decompress(&bytes).map_err(|e| {
        error!("failed to decompress {:?} playlist: {}", upstream_encoding, e);
        Error::ParseFailure("failed to decompress playlist".to_string())
    })?;

    let text = String::from_utf8(raw).map_err(|e| {
        error!("playlist is not utf-8: {}", e);
        Error::ParseFailure("playlist is not utf-8".to_string())
    })?;

    let rewritten = rewrite_playlist(&text, playlist_url, proxy_base);

    let encoding = ContentEncoding::from_accept_encoding(accept_encoding);
    let body = encoding.compress(rewritten.as_bytes()).map_err(|e| {
        error!("failed to compress response with {:?}: {}", encoding, e);
        Error::InternalServerErrorWithContext("failed to compress response".to_string())
    })?;
    debug!(
        "playlist {} rewritten, {} -> {} bytes ({:?})",
        playlist_url,
        rewritten.len(),
        body.len(),
        encoding
    );

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(HLS_MIME));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Some(value) = encoding.as_header_value() {
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(value));
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    apply_cors(&mut headers);

    Ok((status, headers, body).into_response())
}

/// srt bodies become webvtt, anything else goes out as the subtitle host sent it
pub async fn relay_subtitle(upstream: reqwest::Response, path: &str) -> AppResult<Response> {
    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = upstream.bytes().await.map_err(|e| {
        error!("failed to read subtitle body: {}", e);
        Error::UpstreamFetchFailed(e.to_string())
    })?;

    let mut headers = HeaderMap::new();
    apply_cors(&mut headers);

    if is_srt(path, content_type.as_deref()) {
        let vtt = srt_to_vtt(&String::from_utf8_lossy(&bytes));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(VTT_MIME));
        return Ok((status, headers, vtt).into_response());
    }

    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    Ok((status, headers, bytes).into_response())
}

/// Talks to media hosts. Bodies are never decompressed on the way through, so relayed
/// `Content-Length` and `Content-Range` stay valid.
pub struct StreamService {
    http: reqwest::Client,
    referer: String,
}

impl StreamService {
    pub fn new(http: reqwest::Client, referer: String) -> Self {
        Self { http, referer }
    }

    pub fn referer(&self) -> &str {
        &self.referer
    }

    pub async fn fetch_media(
        &self,
        media_url: &str,
        user_agent: Option<&str>,
        range: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        media_request(&self.http, media_url, &self.referer, user_agent, range)
            .send()
            .await
    }

    /// playlist, key or segment through the m3u8 route. Referer and origin are the upstream
    /// host itself
    pub async fn fetch_passthrough(
        &self,
        target: &Url,
        client_headers: &HeaderMap,
        client_ip: &str,
    ) -> AppResult<reqwest::Response> {
        let origin = target.origin().ascii_serialization();
        let forwarded = |name: &HeaderName, fallback: &'static str| {
            client_headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(fallback)
                .to_string()
        };

        let mut request = self
            .http
            .get(target.as_str())
            .header(header::USER_AGENT, forwarded(&header::USER_AGENT, DEFAULT_USER_AGENT))
            .header(header::ACCEPT, "*/*")
            .header(
                header::ACCEPT_LANGUAGE,
                forwarded(&header::ACCEPT_LANGUAGE, PASSTHROUGH_ACCEPT_LANGUAGE),
            )
            .header(header::REFERER, origin.as_str())
            .header(header::ORIGIN, origin.as_str())
            .header("x-forwarded-for", client_ip);

        if let Some(range) = client_headers.get(header::RANGE) {
            request = request.header(header::RANGE, range.clone());
        }

        request.send().await.map_err(|e| {
            error!("error fetching upstream {}: {}", target, e);
            Error::UpstreamFetchFailed(e.to_string())
        })
    }

    pub async fn fetch_subtitle(&self, target: &Url) -> AppResult<reqwest::Response> {
        self.http
            .get(target.as_str())
            .header(header::USER_AGENT, DEFAULT_USER_AGENT)
            .header(header::REFERER, self.referer.as_str())
            .send()
            .await
            .map_err(|e| {
                error!("error fetching subtitle {}: {}", target, e);
                Error::UpstreamFetchFailed(e.to_string())
            })
    }
}
