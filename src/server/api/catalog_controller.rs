use std::convert::Infallible;

use axum::{
    Extension, Json, Router,
    extract::Path,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{error, info};
use validator::Validate;

use crate::server::{
    dtos::{
        catalog_dto::{SeriesDeepDetailsResponse, SeriesDetailsResponse, SeriesResponse},
        response_dto::ApiResponse,
    },
    error::{ApiResult, AppResult, Error},
    extractors::{ClientContext, ValidatedQuery},
    services::{AppServices, episode_scraper_services::ScrapeProgress},
    utils::translate_utils::{Locale, translate},
};

pub const SEARCH_SUCCESS_CODE: i32 = 2000;
pub const DETAIL_SUCCESS_CODE: i32 = 2001;

const PROGRESS_CELLS: usize = 20;

#[derive(Debug, Deserialize, Validate)]
pub struct SearchQuery {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub keyword: String,
}

/// `[#########...........] 45%`, twenty cells
pub fn progress_bar(percent: usize) -> String {
    let percent = percent.min(100);
    let filled = percent * PROGRESS_CELLS / 100;
    format!(
        "[{}{}] {}%",
        "#".repeat(filled),
        ".".repeat(PROGRESS_CELLS - filled),
        percent
    )
}

fn required_key(key: String) -> AppResult<String> {
    let key = key.trim().to_string();
    if key.is_empty() {
        return Err(Error::MissingParameter("key".to_string()));
    }
    Ok(key)
}

pub struct CatalogController;

impl CatalogController {
    pub fn app() -> Router {
        Router::new()
            .route("/search", get(Self::search))
            .route("/detail/{key}", get(Self::detail))
            .route("/deep/detail/{key}", get(Self::deep_detail))
    }

    async fn search(
        Extension(services): Extension<AppServices>,
        ctx: ClientContext,
        ValidatedQuery(query): ValidatedQuery<SearchQuery>,
    ) -> ApiResult<Json<ApiResponse<SeriesResponse>>> {
        info!(client = %ctx.client_id, "search {:?}", query.keyword);
        let locale = ctx.locale;

        let session = services
            .catalog
            .bootstrap_session()
            .await
            .map_err(|e| e.localized(locale))?;
        let series = services
            .catalog
            .search(&query.keyword, &session)
            .await
            .map_err(|e| e.localized(locale))?;

        Ok(Json(ApiResponse::new(
            translate("scraping_success", &[], locale),
            SEARCH_SUCCESS_CODE,
            SeriesResponse { series },
        )))
    }

    async fn detail(
        Extension(services): Extension<AppServices>,
        ctx: ClientContext,
        Path(key): Path<String>,
    ) -> ApiResult<Json<ApiResponse<SeriesDetailsResponse>>> {
        let locale = ctx.locale;
        let key = required_key(key).map_err(|e| e.localized(locale))?;
        info!(client = %ctx.client_id, "detail {}", key);

        let session = services
            .catalog
            .bootstrap_session()
            .await
            .map_err(|e| e.localized(locale))?;
        let detail = services
            .catalog
            .get_detail(&key, &session)
            .await
            .map_err(|e| e.localized(locale))?;

        Ok(Json(ApiResponse::new(
            translate("scraping_success", &[], locale),
            DETAIL_SUCCESS_CODE,
            SeriesDetailsResponse {
                series_details: vec![detail],
            },
        )))
    }

    /// Server sent events: progress frames while the episodes are scraped, then one frame
    /// with the json envelope and a closing `done` event.
    async fn deep_detail(
        Extension(services): Extension<AppServices>,
        ctx: ClientContext,
        Path(key): Path<String>,
    ) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
        let locale = ctx.locale;
        let key = required_key(key).map_err(|e| e.localized(locale))?;
        info!(client = %ctx.client_id, "deep detail {}", key);

        let (tx, rx) = mpsc::channel::<Event>(32);
        tokio::spawn(Self::run_deep_detail(services, key, locale, tx));

        let stream = ReceiverStream::new(rx).map(Ok);
        Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
    }

    async fn run_deep_detail(
        services: AppServices,
        key: String,
        locale: Locale,
        tx: mpsc::Sender<Event>,
    ) {
        let _ = tx.send(Event::default().data(progress_bar(0))).await;

        match Self::deep_detail_payload(&services, &key, locale, &tx).await {
            Ok(payload) => {
                let _ = tx.send(Event::default().data(progress_bar(100))).await;
                let _ = tx.send(Event::default().data(payload)).await;
                let _ = tx.send(Event::default().event("done").data("complete")).await;
            }
            Err(e) => {
                error!("deep detail for {} failed: {}", key, e);
                let _ = tx
                    .send(Event::default().event("error").data(e.translated(locale)))
                    .await;
                let _ = tx.send(Event::default().event("done").data("error")).await;
            }
        }
    }

    async fn deep_detail_payload(
        services: &AppServices,
        key: &str,
        locale: Locale,
        tx: &mpsc::Sender<Event>,
    ) -> AppResult<String> {
        let session = services.catalog.bootstrap_session().await?;
        let mut detail = services.catalog.get_detail(key, &session).await?;

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ScrapeProgress>();
        let scrape = services
            .scraper
            .scrape(&mut detail, &session, Some(progress_tx));

        // 100% is only sent once the payload is ready
        let forward = async {
            while let Some(progress) = progress_rx.recv().await {
                if progress.completed < progress.total {
                    let _ = tx
                        .send(Event::default().data(progress_bar(progress.percent())))
                        .await;
                }
            }
        };

        let (summary, ()) = tokio::join!(scrape, forward);
        info!("deep detail {} scraped: {:?}", key, summary);

        let response = ApiResponse::new(
            translate("scraping_success", &[], locale),
            DETAIL_SUCCESS_CODE,
            SeriesDeepDetailsResponse {
                series_deep_details: vec![detail],
            },
        );

        serde_json::to_string(&response).map_err(|e| {
            error!("failed to serialize deep detail: {}", e);
            Error::ParseFailure(e.to_string())
        })
    }
}
