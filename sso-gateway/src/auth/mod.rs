//! Third-party sign-in
//!
//! [`OAuthFlowController`] drives the provider round trip: it asks a
//! registered [`AuthProvider`] for an authorization URL, verifies the state
//! that comes back, exchanges the code and hands the resulting identifier to
//! [`IdentityResolver`]. Known identities get a session from
//! [`SessionIssuer`]; unknown ones get a signup token.
//!
//! [`ExternalBridgeIssuer`] issues the same sessions for identities a trusted
//! partner has already verified.

pub mod bridge;
pub mod flow;
pub mod identity;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod session;
pub mod state;

pub use bridge::{BridgeAssertion, BridgeSession, ExternalBridgeIssuer};
pub use flow::{CallbackParams, CallbackResponse, FlowOutcome, OAuthFlowController};
pub use identity::{IdentityResolver, Resolution};
pub use provider::{AuthProvider, ProviderError};
pub use registry::AuthServiceRegistry;
pub use session::{SessionIssuer, SetCookies};
pub use state::{AuthAttemptState, CompletionMode};

/// Compare two secrets without short-circuiting on the first differing byte
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
