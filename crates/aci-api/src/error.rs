use thiserror::Error;

use crate::reply::Rejection;

/// Top-level error type for the `aci-api` crate.
///
/// Everything in here is fatal for the call that produced it. Recoverable
/// controller rejections (HTTP 400 and friends) are *not* errors -- they
/// surface as [`Reply::Rejected`](crate::Reply::Rejected) instead.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// A data operation was attempted on a password session that has no
    /// live transport (never logged in, logged out, or refresh failed).
    #[error("Not authenticated -- login required")]
    NotAuthenticated,

    /// `aaaRefresh` was refused. The token has been dropped and
    /// auto-refresh disabled; the caller must log in again.
    #[error("Token refresh failed (HTTP {status}): {message}")]
    RefreshFailed { status: u16, message: String },

    /// The private key for certificate auth could not be loaded.
    #[error("Invalid private key: {0}")]
    PrivateKey(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The controller answered with a status the operation treats as fatal.
    #[error("HTTP {status} from controller: {message}")]
    Status { status: u16, message: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A request URI that would leave the controller's REST root.
    #[error("URI resolves outside the API root: {uri}")]
    OutsideApiRoot { uri: String },

    /// A cookie or header value contained characters HTTP forbids.
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Controller ──────────────────────────────────────────────────
    /// A rejection promoted to an error via [`Reply::into_result`](crate::Reply::into_result).
    #[error("Rejected by controller: {0}")]
    Rejected(Rejection),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A well-formed response lacked a field the protocol requires.
    #[error("Unexpected response: missing {path}")]
    MissingField { path: &'static str },
}

impl Error {
    /// Returns `true` for failures of the HTTP exchange itself: network
    /// errors, fatal status codes, and a refused token refresh.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::RefreshFailed { .. }
        )
    }

    /// Returns `true` if re-running `login()` might resolve this error.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::NotAuthenticated | Self::RefreshFailed { .. } => true,
            Self::Status { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Status { status: 404, .. } => true,
            Self::Rejected(r) => r.status == 404,
            _ => false,
        }
    }

    /// The HTTP status that caused this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::RefreshFailed { status, .. } => Some(*status),
            Self::Rejected(r) => Some(r.status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
