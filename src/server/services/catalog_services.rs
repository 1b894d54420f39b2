use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::server::dtos::catalog_dto::{Series, SeriesDetail, SubtitleTrack};
use crate::server::error::{AppResult, Error};
use crate::server::services::stream_services::DEFAULT_USER_AGENT;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/115.0 Safari/537.36";

static DASH_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new("-+").expect("static regex should compile"));

/// spaces and parentheses become dashes, runs of dashes collapse into one
pub fn slugify(title: &str) -> String {
    let slug = title.trim().replace([' ', '(', ')'], "-");
    DASH_RUNS.replace_all(&slug, "-").into_owned()
}

/// `name=value; name=value` out of raw `Set-Cookie` headers, attributes dropped
pub fn cookie_header(set_cookies: &[String]) -> String {
    set_cookies
        .iter()
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| format!("{}={}", name, value.trim()))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// cookies the catalog hands out on its landing page, required by its json api
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSession {
    pub cookies: String,
}

pub type DynCatalogService = Arc<dyn CatalogServiceTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait CatalogServiceTrait {
    async fn bootstrap_session(&self) -> AppResult<CatalogSession>;

    async fn search(&self, keyword: &str, session: &CatalogSession) -> AppResult<Vec<Series>>;

    async fn get_detail(&self, key: &str, session: &CatalogSession) -> AppResult<SeriesDetail>;

    /// the subtitle list an episode page asked for, fetched again with the page as referer
    async fn fetch_subtitles(
        &self,
        url: &str,
        referer: &str,
        session: &CatalogSession,
    ) -> AppResult<Vec<SubtitleTrack>>;

    fn episode_watch_url(&self, title: &str, series_id: i64, episode_id: i64, number: f64) -> String;
}

pub struct CatalogService {
    http: reqwest::Client,
    base_url: String,
}

impl CatalogService {
    pub fn new(base_url: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(CATALOG_TIMEOUT)
            .build()
            .map_err(|e| {
                error!("failed to build catalog client: {}", e);
                Error::InternalServerErrorWithContext("failed to build catalog client".to_string())
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn landing_url(&self) -> String {
        format!("{}/", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> AppResult<T> {
        let response = request.send().await.map_err(|e| {
            error!("failed to fetch {}: {}", what, e);
            Error::UpstreamUnreachable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            error!("catalog answered {} for {}", status, what);
            return Err(Error::UpstreamUnreachable(format!("{} returned {}", what, status)));
        }

        let body = response.bytes().await.map_err(|e| {
            error!("failed to read {}: {}", what, e);
            Error::UpstreamUnreachable(e.to_string())
        })?;

        serde_json::from_slice(&body).map_err(|e| {
            error!("failed to parse {}: {}", what, e);
            Error::ParseFailure(e.to_string())
        })
    }

    fn api_request(&self, url: &str, session: &CatalogSession) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .header(header::REFERER, self.landing_url())
            .header(header::COOKIE, session.cookies.as_str())
    }
}

#[async_trait]
impl CatalogServiceTrait for CatalogService {
    async fn bootstrap_session(&self) -> AppResult<CatalogSession> {
        let response = self
            .http
            .get(self.landing_url())
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                error!("failed to reach catalog landing page: {}", e);
                Error::UpstreamUnreachable(e.to_string())
            })?;

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        let cookies = cookie_header(&set_cookies);
        debug!("catalog session with {} cookies", set_cookies.len());

        Ok(CatalogSession { cookies })
    }

    async fn search(&self, keyword: &str, session: &CatalogSession) -> AppResult<Vec<Series>> {
        info!("searching catalog for {:?}", keyword);
        let url = format!(
            "{}/api/DramaList/Search?q={}&type=0",
            self.base_url,
            urlencoding::encode(keyword)
        );

        self.get_json(self.api_request(&url, session), "search results")
            .await
    }

    async fn get_detail(&self, key: &str, session: &CatalogSession) -> AppResult<SeriesDetail> {
        info!("fetching catalog detail {}", key);
        let url = format!(
            "{}/api/DramaList/Drama/{}",
            self.base_url,
            urlencoding::encode(key)
        );

        self.get_json(self.api_request(&url, session), "series detail")
            .await
    }

    async fn fetch_subtitles(
        &self,
        url: &str,
        referer: &str,
        session: &CatalogSession,
    ) -> AppResult<Vec<SubtitleTrack>> {
        let request = self
            .http
            .get(url)
            .header(header::USER_AGENT, DEFAULT_USER_AGENT)
            .header(header::REFERER, referer)
            .header(header::COOKIE, session.cookies.as_str());

        self.get_json(request, "subtitle list").await
    }

    fn episode_watch_url(&self, title: &str, series_id: i64, episode_id: i64, number: f64) -> String {
        format!(
            "{}/Drama/{}/Episode-{}?id={}&ep={}&page=0&pageSize=100",
            self.base_url,
            slugify(title),
            number.trunc() as i64,
            series_id,
            episode_id
        )
    }
}
