//! Configuration for APIC clients.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to [`aci_api::SessionConfig`] / [`aci_api::Credentials`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use aci_api::{Credentials, SessionConfig, TlsMode};

const KEYRING_SERVICE: &str = "aci-client";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    UnknownProfile { profile: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("credential error: {0}")]
    Credential(#[from] aci_api::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named APIC profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Settings every profile inherits unless it overrides them.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Skip certificate verification. APICs usually run self-signed.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Login timeout in seconds.
    #[serde(default = "default_login_timeout")]
    pub login_timeout: u64,

    #[serde(default)]
    pub auto_refresh: bool,

    /// Seconds before token expiry at which the refresh fires.
    #[serde(default = "default_refresh_offset")]
    pub refresh_offset: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: default_insecure(),
            timeout: default_timeout(),
            login_timeout: default_login_timeout(),
            auto_refresh: false,
            refresh_offset: default_refresh_offset(),
        }
    }
}

fn default_insecure() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}
fn default_login_timeout() -> u64 {
    5
}
fn default_refresh_offset() -> u64 {
    30
}

/// A named APIC profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// APIC address: bare host (`10.0.0.1`) or URL (`https://apic1:8443`).
    pub controller: String,

    /// Auth mode: "password" or "certificate".
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,

    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or `password_env`).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// PEM private key for certificate auth.
    pub private_key: Option<PathBuf>,

    /// DN of the user certificate, e.g. `uni/userext/user-admin/usercert-admin`.
    pub certificate_dn: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    pub insecure: Option<bool>,
    pub timeout: Option<u64>,
    pub login_timeout: Option<u64>,
    pub auto_refresh: Option<bool>,
    pub refresh_offset: Option<u64>,
}

fn default_auth_mode() -> String {
    "password".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("ch", "netcloud", "aci-client").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("aci-client");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + `ACI_` environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ACI_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a profile's password: `password_env`, then the system
/// keyring (`<profile>/password`), then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            debug!(profile = profile_name, "password taken from environment");
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            debug!(profile = profile_name, "password taken from keyring");
            return Ok(SecretString::from(pw));
        }
    }

    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Build [`Credentials`] from a profile's `auth_mode`.
pub fn resolve_credentials(profile: &Profile, profile_name: &str) -> Result<Credentials, ConfigError> {
    match profile.auth_mode.as_str() {
        "password" => {
            let username = profile
                .username
                .clone()
                .ok_or_else(|| ConfigError::NoCredentials {
                    profile: profile_name.into(),
                })?;
            let password = resolve_password(profile, profile_name)?;
            Ok(Credentials::Password { username, password })
        }
        "certificate" => {
            let key = profile.private_key.as_ref().ok_or_else(|| ConfigError::Validation {
                field: "private_key".into(),
                reason: "required for certificate auth".into(),
            })?;
            let dn = profile.certificate_dn.clone().ok_or_else(|| ConfigError::Validation {
                field: "certificate_dn".into(),
                reason: "required for certificate auth".into(),
            })?;
            Ok(Credentials::certificate_from_file(key, dn)?)
        }
        other => Err(ConfigError::Validation {
            field: "auth_mode".into(),
            reason: format!("expected 'password' or 'certificate', got '{other}'"),
        }),
    }
}

/// Build a [`SessionConfig`] from a profile, falling back to `defaults`.
pub fn profile_to_session_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let controller = profile.controller.trim();
    if controller.is_empty() {
        return Err(ConfigError::Validation {
            field: "controller".into(),
            reason: "must not be empty".into(),
        });
    }

    let tls = if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else {
        TlsMode::System
    };

    let config = SessionConfig {
        controller: controller.to_owned(),
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        login_timeout: Duration::from_secs(profile.login_timeout.unwrap_or(defaults.login_timeout)),
        auto_refresh: profile.auto_refresh.unwrap_or(defaults.auto_refresh),
        refresh_offset: Duration::from_secs(profile.refresh_offset.unwrap_or(defaults.refresh_offset)),
    };
    // Reject hosts the URL parser can't take before anything connects.
    config.base_url()?;
    Ok(config)
}

/// Session settings and credentials for a named (or the default) profile.
pub fn resolve_session(
    cfg: &Config,
    profile_name: Option<&str>,
) -> Result<(SessionConfig, Credentials), ConfigError> {
    let (name, profile) = cfg.profile(profile_name)?;
    let session = profile_to_session_config(profile, &cfg.defaults)?;
    let credentials = resolve_credentials(profile, name)?;
    Ok((session, credentials))
}
