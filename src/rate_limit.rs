//! Per-client rate limiting for the authenticated MCP routes.
//!
//! The managed platform's load balancer appends the address it received the
//! connection from to `X-Forwarded-For`, so only the rightmost entry is
//! trustworthy. Everything left of it is whatever the client sent.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use tower_governor::key_extractor::KeyExtractor;
use tower_governor::GovernorError;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Burst size and replenish interval, from `RATE_LIMIT_BURST` and
/// `RATE_LIMIT_REPLENISH_SECONDS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub burst: u32,
    pub replenish_seconds: u64,
}

/// Keys on the proxy-appended client address, falling back to the peer
/// address when the request did not come through a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIpKeyExtractor;

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        client_ip(req.headers(), peer).ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rightmost parseable `X-Forwarded-For` entry across all header lines,
/// else `peer`.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|entry| entry.trim().parse::<IpAddr>().ok())
        .last()
        .or(peer)
}
