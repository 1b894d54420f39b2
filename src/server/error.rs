use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::server::dtos::response_dto::ApiErrorResponse;
use crate::server::utils::translate_utils::{Locale, translate};

pub type AppResult<T> = Result<T, Error>;

/// handlers return this so the error body can be translated for the caller
pub type ApiResult<T> = Result<T, LocalizedError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// catalog or media host unreachable, timed out or answered with garbage status
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// the browser saw no media request before the deadline (seconds)
    #[error("no media found within {0}s")]
    ResolutionTimeout(u64),

    #[error("no media found: {0}")]
    NoMediaFound(String),

    #[error("browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    /// media fetch failed even after the stale cache retry
    #[error("upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal server error: {0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UpstreamUnreachable(_) | Self::ParseFailure(_) | Self::UpstreamFetchFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::ResolutionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::NoMediaFound(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BrowserLaunchFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingParameter(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// stable codes, the frontend switches on these so never renumber them
    pub fn code(&self) -> i32 {
        match self {
            Self::MissingParameter(_) => -1000,
            Self::BadRequest(_) => -1001,
            Self::NotFound(_) => -1004,
            Self::UpstreamUnreachable(_) => -2000,
            Self::ParseFailure(_) => -2001,
            Self::ResolutionTimeout(_) => -3000,
            Self::NoMediaFound(_) => -3001,
            Self::BrowserLaunchFailed(_) => -3002,
            Self::UpstreamFetchFailed(_) => -3003,
            Self::InternalServerErrorWithContext(_) => -5000,
        }
    }

    pub fn message_id(&self) -> &'static str {
        match self {
            Self::UpstreamUnreachable(_) => "original_source_error",
            Self::ParseFailure(_) => "parse_data_failed",
            Self::ResolutionTimeout(_) => "media_timeout",
            Self::NoMediaFound(_) => "no_media_found",
            Self::BrowserLaunchFailed(_) => "browser_launch_failed",
            Self::UpstreamFetchFailed(_) => "upstream_fetch_failed",
            Self::MissingParameter(_) => "missing_parameter",
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::InternalServerErrorWithContext(_) => "internal_error",
        }
    }

    /// user facing text for this error in the given locale
    pub fn translated(&self, locale: Locale) -> String {
        match self {
            Self::MissingParameter(name) => {
                translate(self.message_id(), &[("name", name.as_str())], locale)
            }
            _ => translate(self.message_id(), &[], locale),
        }
    }

    pub fn localized(self, locale: Locale) -> LocalizedError {
        LocalizedError {
            error: self,
            locale,
        }
    }
}

#[derive(Debug)]
pub struct LocalizedError {
    pub error: Error,
    pub locale: Locale,
}

impl From<Error> for LocalizedError {
    fn from(error: Error) -> Self {
        error.localized(Locale::default())
    }
}

impl IntoResponse for LocalizedError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            message: self.error.translated(self.locale),
            code: self.error.code(),
            error: self.error.to_string(),
        };

        (self.error.status(), Json(body)).into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        LocalizedError::from(self).into_response()
    }
}
