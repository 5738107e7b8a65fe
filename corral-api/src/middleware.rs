//! Client identification and rate limiting middleware.
//!
//! Clients are identified by IP address, taken from proxy headers when
//! present and from the connection otherwise. A request whose client cannot
//! be identified fails with 500: every rate limited route needs an identity.

use std::net::{IpAddr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::{retry_after_secs, ApiError};
use crate::rate_limit::RateDecision;
use crate::state::AppState;

/// The rate limiter key of the calling client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let connection = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        extract_client_ip(&parts.headers, connection)
            .map(|ip| ClientIdentity(ip.to_string()))
            .ok_or_else(|| ApiError::internal_error("Could not identify client"))
    }
}

/// Extract client IP, considering proxy headers.
pub fn extract_client_ip(headers: &HeaderMap, connection: Option<SocketAddr>) -> Option<IpAddr> {
    // X-Forwarded-For can contain multiple IPs, take the first one
    if let Some(forwarded_for) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first_ip) = forwarded_for.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse() {
                return Some(ip);
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse() {
            return Some(ip);
        }
    }

    connection.map(|addr| addr.ip())
}

/// Rate limiting middleware.
///
/// Charges one token per request to the calling client. When rate limited,
/// returns 429 Too Many Requests with a Retry-After header.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ClientIdentity(client): ClientIdentity,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match state.service.check_rate(&client)? {
        RateDecision::Allow => Ok(next.run(request).await),
        RateDecision::Deny { retry_after } => {
            debug!(client = %client, path = %request.uri().path(), "Request rate limited");
            Err(ApiError::too_many_requests(retry_after_secs(retry_after)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_forwarded_for_takes_first_entry() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(
            extract_client_ip(&map, None),
            Some("203.0.113.7".parse().unwrap())
        );
    }

    #[test]
    fn test_real_ip_used_when_forwarded_for_is_garbage() {
        let map = headers(&[("x-forwarded-for", "unknown"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(
            extract_client_ip(&map, None),
            Some("198.51.100.2".parse().unwrap())
        );
    }

    #[test]
    fn test_falls_back_to_connection() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(
            extract_client_ip(&HeaderMap::new(), Some(addr)),
            Some(addr.ip())
        );
        assert_eq!(extract_client_ip(&HeaderMap::new(), None), None);
    }
}
