use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{ACCEPT_LANGUAGE, USER_AGENT};
use axum::http::request::Parts;
use tracing::debug;

use crate::server::error::Error;
use crate::server::utils::translate_utils::Locale;

/// who is asking: ip for the bandwidth profile, user agent for upstream requests and the
/// locale for error messages
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub client_id: String,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub locale: Locale,
}

/// generates a client identifier from IP address and user-agent
pub fn generate_client_id(ip: Option<&str>, user_agent: Option<&str>) -> String {
    let mut hasher = DefaultHasher::new();
    ip.unwrap_or("unknown").hash(&mut hasher);
    user_agent.unwrap_or("unknown").hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// X-Forwarded-For first hop, then X-Real-IP, then the socket
pub fn client_ip_from_parts(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
}

impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        let locale = Locale::from_accept_language(
            parts
                .headers
                .get(ACCEPT_LANGUAGE)
                .and_then(|h| h.to_str().ok()),
        );

        let client_ip = client_ip_from_parts(parts);
        let client_id = generate_client_id(client_ip.as_deref(), user_agent.as_deref());
        debug!("client {} from ip {:?}", client_id, client_ip);

        Ok(ClientContext {
            client_id,
            client_ip: client_ip.unwrap_or_else(|| "unknown".to_string()),
            user_agent,
            locale,
        })
    }
}
