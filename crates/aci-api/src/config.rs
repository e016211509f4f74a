// ── Runtime session configuration ──
//
// Describes *how* to talk to one APIC. Carries connection tuning only;
// credentials live in `Credentials` and nothing here touches disk.
// `aci-config` builds one of these from a TOML profile.

use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::transport::{TlsMode, TransportConfig};

/// Connection settings shared by password and certificate sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Controller address: a bare host (`10.0.0.1`, `apic.example.net:8443`)
    /// or a full URL (`https://apic.example.net`).
    pub controller: String,
    /// TLS verification strategy.
    pub tls: TlsMode,
    /// Timeout for every request except login.
    pub timeout: Duration,
    /// Connect/response timeout for `aaaLogin`.
    pub login_timeout: Duration,
    /// Renew the token in the background before it expires.
    pub auto_refresh: bool,
    /// How long before `refreshTimeoutSeconds` elapses to renew.
    pub refresh_offset: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            controller: String::new(),
            tls: TlsMode::default(),
            timeout: Duration::from_secs(30),
            login_timeout: Duration::from_secs(5),
            auto_refresh: false,
            refresh_offset: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            ..Self::default()
        }
    }

    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    pub fn with_refresh_offset(mut self, offset: Duration) -> Self {
        self.refresh_offset = offset;
        self
    }

    pub fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// The REST root, always ending in `/api/`.
    ///
    /// Bare hosts get `https://`; an explicit scheme is kept as-is.
    pub fn base_url(&self) -> Result<Url, Error> {
        let raw = self.controller.trim();
        let mut url = if raw.contains("://") {
            Url::parse(raw)?
        } else {
            Url::parse(&format!("https://{raw}"))?
        };

        let path = url.path().trim_end_matches('/').to_owned();
        if path.ends_with("/api") {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}/api/"));
        }
        url.set_query(None);
        Ok(url)
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.timeout,
            cookie_jar: None,
        }
    }
}
