// every route here answers with wildcard cors headers of its own, errors included. players
// and download managers call them from any origin
use axum::{
    Extension, Json, Router,
    extract::{Path, RawQuery},
    http::{HeaderMap, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{error, info};
use validator::Validate;

use crate::server::{
    dtos::response_dto::ApiResponse,
    error::{ApiResult, Error},
    extractors::{ClientContext, ValidatedQuery},
    services::{
        AppServices,
        download_services::DownloadJob,
        playback_services::PlaybackRequest,
        stream_services::{
            apply_cors, preflight_response, relay_playlist, relay_response, relay_subtitle,
        },
    },
    utils::{
        hls_utils::{is_playlist, upstream_url_from_proxy_path},
        media_utils::decode_url_param,
        translate_utils::translate,
    },
};

pub const DOWNLOAD_STATUS_CODE: i32 = 2002;

const M3U8_ROUTE: &str = "/m3u8/";
const SUBTITLE_ROUTE: &str = "/subtitle/";

#[derive(Debug, Deserialize, Validate)]
pub struct UrlQuery {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub url: String,
}

/// the wildcard capture with its escapes intact, `Path` would turn `%3F` into a query
fn raw_capture<'a>(uri: &'a Uri, route: &str) -> &'a str {
    uri.path().strip_prefix(route).unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new()
            .route("/m3u8/{*path}", get(Self::m3u8).options(Self::preflight))
            .route("/mp4", get(Self::mp4).options(Self::preflight))
            .route("/subtitle/{*path}", get(Self::subtitle).options(Self::preflight))
            .route("/download", get(Self::download).options(Self::preflight))
            .route("/download/{id}", get(Self::download_status))
            .layer(middleware::map_response(Self::with_cors))
    }

    async fn with_cors(mut response: Response) -> Response {
        apply_cors(response.headers_mut());
        response
    }

    async fn preflight() -> Response {
        preflight_response()
    }

    /// playlists get rewritten, keys and segments stream straight through
    async fn m3u8(
        Extension(services): Extension<AppServices>,
        ctx: ClientContext,
        uri: Uri,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
    ) -> ApiResult<Response> {
        let locale = ctx.locale;
        let path = raw_capture(&uri, M3U8_ROUTE);
        let target =
            upstream_url_from_proxy_path(path, query.as_deref()).map_err(|e| e.localized(locale))?;
        info!(client = %ctx.client_id, "fetching upstream {}", target);

        let upstream = services
            .streams
            .fetch_passthrough(&target, &headers, &ctx.client_ip)
            .await
            .map_err(|e| e.localized(locale))?;

        let content_type = header_str(upstream.headers(), &header::CONTENT_TYPE)
            .unwrap_or_default()
            .to_string();

        if is_playlist(&content_type, path) {
            let hls_base = format!("{}/m3u8", services.config.proxy_base_url());
            return relay_playlist(
                upstream,
                &target,
                &hls_base,
                header_str(&headers, &header::ACCEPT_ENCODING),
            )
            .await
            .map_err(|e| e.localized(locale));
        }

        let range = header_str(&headers, &header::RANGE).map(str::to_string);
        Ok(relay_response(upstream, target.as_str(), range))
    }

    async fn mp4(
        Extension(services): Extension<AppServices>,
        ctx: ClientContext,
        ValidatedQuery(query): ValidatedQuery<UrlQuery>,
        headers: HeaderMap,
    ) -> ApiResult<Response> {
        let locale = ctx.locale;
        let page_url = decode_url_param(&query.url).map_err(|e| e.localized(locale))?;
        info!("starting browser-proxy for {} from {}", page_url, ctx.client_ip);

        let request = PlaybackRequest {
            page_url,
            client_ip: ctx.client_ip.clone(),
            range: header_str(&headers, &header::RANGE).map(str::to_string),
            user_agent: ctx.user_agent.clone(),
        };

        let stream = services
            .playback
            .open_stream(&request)
            .await
            .map_err(|e| e.localized(locale))?;

        info!(
            "streaming {} with range {} after {} attempt(s)",
            stream.media_url, stream.range, stream.attempts
        );
        Ok(relay_response(stream.upstream, &stream.media_url, Some(stream.range)))
    }

    /// srt is served as webvtt, other formats pass through
    async fn subtitle(
        Extension(services): Extension<AppServices>,
        ctx: ClientContext,
        uri: Uri,
        RawQuery(query): RawQuery,
    ) -> ApiResult<Response> {
        let locale = ctx.locale;
        let path = raw_capture(&uri, SUBTITLE_ROUTE);
        let target =
            upstream_url_from_proxy_path(path, query.as_deref()).map_err(|e| e.localized(locale))?;
        info!(client = %ctx.client_id, "fetching subtitle {}", target);

        let upstream = services
            .streams
            .fetch_subtitle(&target)
            .await
            .map_err(|e| e.localized(locale))?;

        relay_subtitle(upstream, target.path())
            .await
            .map_err(|e| e.localized(locale))
    }

    /// resolves now, downloads in the background, answers right away with the job id
    async fn download(
        Extension(services): Extension<AppServices>,
        ctx: ClientContext,
        ValidatedQuery(query): ValidatedQuery<UrlQuery>,
        headers: HeaderMap,
    ) -> ApiResult<Response> {
        let locale = ctx.locale;
        let page_url = decode_url_param(&query.url).map_err(|e| e.localized(locale))?;
        info!("starting download for {}", page_url);

        let media = services
            .playback
            .resolve_media(&page_url)
            .await
            .map_err(|e| e.localized(locale))?;

        let range = header_str(&headers, &header::RANGE).map(str::to_string);
        let job = services
            .downloads
            .start(&page_url, &media.media_url, range)
            .await
            .map_err(|e| {
                error!("failed to start download for {}: {}", page_url, e);
                e.localized(locale)
            })?;

        Ok(translate("download_started", &[("id", job.id.as_str())], locale).into_response())
    }

    async fn download_status(
        Extension(services): Extension<AppServices>,
        ctx: ClientContext,
        Path(id): Path<String>,
    ) -> ApiResult<Json<ApiResponse<DownloadJob>>> {
        let job = services
            .downloads
            .status(&id)
            .ok_or_else(|| Error::NotFound(format!("download {}", id)).localized(ctx.locale))?;

        Ok(Json(ApiResponse::new(
            translate("download_status", &[], ctx.locale),
            DOWNLOAD_STATUS_CODE,
            job,
        )))
    }
}
