use std::path::Path;

use secrecy::SecretString;

use crate::error::Error;

/// Which authentication strategy a session uses.
///
/// Marker enum (no data) -- the actual secrets live in [`Credentials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// `aaaLogin` token, kept alive with `aaaRefresh`.
    Password,
    /// Every request signed with the user's X.509 private key.
    Certificate,
}

/// Credentials for authenticating with an APIC. Immutable once built.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Local or remote AAA user.
    Password {
        username: String,
        password: SecretString,
    },

    /// Certificate-based auth. `private_key` is the PEM (PKCS#8 or PKCS#1)
    /// matching the certificate attached to the user at `certificate_dn`,
    /// e.g. `uni/userext/user-admin/usercert-admin`.
    Certificate {
        private_key: SecretString,
        certificate_dn: String,
    },
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn certificate(private_key_pem: impl Into<String>, certificate_dn: impl Into<String>) -> Self {
        Self::Certificate {
            private_key: SecretString::from(private_key_pem.into()),
            certificate_dn: certificate_dn.into(),
        }
    }

    /// Certificate credentials with the key read from a PEM file.
    pub fn certificate_from_file(
        key_path: impl AsRef<Path>,
        certificate_dn: impl Into<String>,
    ) -> Result<Self, Error> {
        let path = key_path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            Error::PrivateKey(format!("failed to read {}: {e}", path.display()))
        })?;
        Ok(Self::certificate(pem, certificate_dn))
    }

    pub fn strategy(&self) -> AuthStrategy {
        match self {
            Self::Password { .. } => AuthStrategy::Password,
            Self::Certificate { .. } => AuthStrategy::Certificate,
        }
    }
}
