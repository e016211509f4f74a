// aci-api: Async Rust client for the Cisco APIC REST API (password + certificate auth)

pub mod auth;
pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod paginate;
pub mod reply;
pub mod session;
pub mod signing;
pub mod transport;
pub mod wire;

mod refresh;

pub use auth::{AuthStrategy, Credentials};
pub use config::SessionConfig;
pub use error::Error;
pub use executor::RequestExecutor;
pub use models::DATASET_TOO_BIG;
pub use paginate::{PAGE_SIZE, PageCursor, Paginator};
pub use refresh::{MIN_REFRESH_DELAY, refresh_delay};
pub use reply::{Rejection, Reply};
pub use session::{CertSession, PasswordSession, Session};
pub use signing::{CertificateCookies, RequestSigner};
pub use transport::{TlsMode, TransportConfig};
