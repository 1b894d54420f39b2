use axum::extract::{FromRequestParts, Query};
use axum::http::header::ACCEPT_LANGUAGE;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use tracing::debug;
use validator::Validate;

use crate::server::error::{Error, LocalizedError};
use crate::server::utils::translate_utils::Locale;

/// Query string deserialized and validated in one go. Missing or empty required fields come
/// back as `MissingParameter` naming the fields, in the caller's language.
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = LocalizedError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let locale = Locale::from_accept_language(
            parts
                .headers
                .get(ACCEPT_LANGUAGE)
                .and_then(|h| h.to_str().ok()),
        );

        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                debug!("query rejected: {}", rejection.body_text());
                Error::BadRequest(rejection.body_text()).localized(locale)
            })?;

        value.validate().map_err(|errors| {
            let mut fields: Vec<String> = errors
                .field_errors()
                .keys()
                .map(|field| field.to_string())
                .collect();
            fields.sort();
            Error::MissingParameter(fields.join(", ")).localized(locale)
        })?;

        Ok(ValidatedQuery(value))
    }
}
