// Certificate request signing
//
// APIC certificate auth has no login step. Each request carries four
// cookies naming the user certificate and an RSA-SHA256 (PKCS#1 v1.5)
// signature over `<METHOD><path>[?query][body]`. The signature differs
// per request, so it is computed fresh every time.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::Error;

pub const FINGERPRINT_COOKIE: &str = "APIC-Certificate-Fingerprint";
pub const ALGORITHM_COOKIE: &str = "APIC-Certificate-Algorithm";
pub const DN_COOKIE: &str = "APIC-Certificate-DN";
pub const SIGNATURE_COOKIE: &str = "APIC-Request-Signature";

/// The controller ignores the fingerprint value but requires the cookie.
const FINGERPRINT: &str = "fingerprint";
const ALGORITHM: &str = "v1.0";

/// Signs request content with a user's private key.
#[derive(Clone)]
pub struct RequestSigner {
    key: SigningKey<Sha256>,
    certificate_dn: String,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("certificate_dn", &self.certificate_dn)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Load a PEM private key (`BEGIN PRIVATE KEY` or `BEGIN RSA PRIVATE KEY`).
    pub fn from_pem(pem: &SecretString, certificate_dn: impl Into<String>) -> Result<Self, Error> {
        let pem = pem.expose_secret();
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| Error::PrivateKey(format!("expected an RSA key in PEM form: {e}")))?;
        Ok(Self::from_key(key, certificate_dn))
    }

    pub fn from_key(key: RsaPrivateKey, certificate_dn: impl Into<String>) -> Self {
        Self {
            key: SigningKey::<Sha256>::new(key),
            certificate_dn: certificate_dn.into(),
        }
    }

    pub fn certificate_dn(&self) -> &str {
        &self.certificate_dn
    }

    /// Base64 RSA-SHA256 signature over `content`.
    pub fn sign(&self, content: &str) -> String {
        let signature = self.key.sign(content.as_bytes());
        STANDARD.encode(signature.to_bytes())
    }

    /// Build the cookie set for one request whose signed content is `content`.
    pub fn pack_cookies(&self, content: &str) -> CertificateCookies {
        CertificateCookies {
            fingerprint: FINGERPRINT.to_owned(),
            algorithm: ALGORITHM.to_owned(),
            certificate_dn: self.certificate_dn.clone(),
            signature: self.sign(content),
        }
    }
}

/// The four cookies attached to a certificate-signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateCookies {
    pub fingerprint: String,
    pub algorithm: String,
    pub certificate_dn: String,
    pub signature: String,
}

impl CertificateCookies {
    /// `(name, value)` pairs in the order the controller documents them.
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            (FINGERPRINT_COOKIE, &self.fingerprint),
            (ALGORITHM_COOKIE, &self.algorithm),
            (DN_COOKIE, &self.certificate_dn),
            (SIGNATURE_COOKIE, &self.signature),
        ]
    }

    /// Render as a single `Cookie` header value.
    pub fn header_value(&self) -> String {
        self.pairs()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
