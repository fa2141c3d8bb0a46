//! Request extractors

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::config::Config;
use crate::state::AppState;

/// Client address and scheme of the current request
///
/// Behind a reverse proxy (`server.trust_forwarded_headers`), the first
/// `X-Forwarded-For` hop and `X-Forwarded-Proto` win over the socket peer and
/// the configured `auth.https`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOrigin {
    pub ip: IpAddr,
    pub secure: bool,
}

impl RequestOrigin {
    pub fn from_parts(parts: &Parts, config: &Config) -> Self {
        let mut ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let mut secure = config.auth.https;

        if config.server.trust_forwarded_headers {
            let forwarded_for = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
            if let Some(forwarded) = forwarded_for {
                ip = forwarded;
            }

            if let Some(proto) = parts
                .headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
            {
                secure = proto.trim().eq_ignore_ascii_case("https");
            }
        }

        Self { ip, secure }
    }
}

impl FromRequestParts<AppState> for RequestOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state.config()))
    }
}
