// Sessions
//
// One authenticated conversation with an APIC. The credential kind picks
// the implementation: password sessions log in and hold a token, while
// certificate sessions sign each request and need no login.

mod cert;
mod password;

pub use cert::CertSession;
pub use password::PasswordSession;

use serde_json::Value;

use crate::auth::{AuthStrategy, Credentials};
use crate::config::SessionConfig;
use crate::error::Error;
use crate::reply::Reply;

/// A session of either kind, chosen from [`Credentials`].
///
/// Reads come back as [`Reply`] for both kinds; for certificate sessions
/// the reply is always `Success` since their failures are errors.
#[derive(Debug, Clone)]
pub enum Session {
    Password(PasswordSession),
    Certificate(CertSession),
}

impl Session {
    pub fn new(config: SessionConfig, credentials: Credentials) -> Result<Self, Error> {
        match credentials {
            Credentials::Password { username, password } => {
                PasswordSession::new(config, username, password).map(Self::Password)
            }
            Credentials::Certificate {
                private_key,
                certificate_dn,
            } => CertSession::new(&config, &private_key, certificate_dn).map(Self::Certificate),
        }
    }

    pub fn strategy(&self) -> AuthStrategy {
        match self {
            Self::Password(_) => AuthStrategy::Password,
            Self::Certificate(_) => AuthStrategy::Certificate,
        }
    }

    /// Log in if the session kind needs it. Certificate sessions are
    /// always ready.
    pub async fn connect(&self) -> Result<bool, Error> {
        match self {
            Self::Password(s) => s.login().await,
            Self::Certificate(_) => Ok(true),
        }
    }

    /// Log out if the session kind has anything to end.
    pub async fn close(&self) -> Result<(), Error> {
        match self {
            Self::Password(s) => s.logout().await,
            Self::Certificate(_) => Ok(()),
        }
    }

    pub async fn get_json(&self, uri: &str) -> Result<Reply<Vec<Value>>, Error> {
        match self {
            Self::Password(s) => s.get_json(uri).await,
            Self::Certificate(s) => s.get_json(uri).await.map(Reply::Success),
        }
    }

    pub async fn get_json_paged(&self, uri: &str) -> Result<Reply<Vec<Value>>, Error> {
        match self {
            Self::Password(s) => s.get_json_paged(uri).await,
            Self::Certificate(s) => s.get_json_paged(uri).await.map(Reply::Success),
        }
    }

    pub async fn post_json(&self, payload: &Value) -> Result<Reply<u16>, Error> {
        match self {
            Self::Password(s) => s.post_json(payload).await,
            Self::Certificate(s) => s.post_json(payload).await,
        }
    }

    pub async fn post_json_to(&self, path: &str, payload: &Value) -> Result<Reply<u16>, Error> {
        match self {
            Self::Password(s) => s.post_json_to(path, payload).await,
            Self::Certificate(s) => s.post_json_to(path, payload).await,
        }
    }

    pub async fn delete_mo(&self, dn: &str) -> Result<u16, Error> {
        match self {
            Self::Password(s) => s.delete_mo(dn).await,
            Self::Certificate(s) => s.delete_mo(dn).await,
        }
    }
}
