//! Request tracking middleware
//!
//! Request ID generation and propagation, plus masking of the credential
//! headers this gateway reads.

use axum::http::HeaderName;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
};

/// Header carrying the management token
pub const MANAGE_TOKEN_HEADER: &str = "x-manage-token";

/// Header carrying the bridge shared secret
pub const BRIDGE_TOKEN_HEADER: &str = "x-bridge-token";

/// Sensitive headers that should be masked in logs
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    MANAGE_TOKEN_HEADER,
    BRIDGE_TOKEN_HEADER,
];

/// Create a request ID layer that stamps each request with a UUID
pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Create a request ID propagation layer
pub fn request_id_propagation_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Create a sensitive headers layer
pub fn sensitive_headers_layer() -> SetSensitiveRequestHeadersLayer {
    let headers = SENSITIVE_HEADERS
        .iter()
        .map(|h| HeaderName::from_static(h))
        .collect::<Vec<_>>();

    SetSensitiveRequestHeadersLayer::new(headers)
}
