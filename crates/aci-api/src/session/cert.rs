// Certificate session
//
// Stateless: there is no login, token, or refresh. Every request is signed
// on its own with the user's private key and carries the signature in the
// `APIC-*` cookies. Non-2xx reads are errors here. Writes succeed only on
// 200; a 400 is a rejection.

use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::SessionConfig;
use crate::error::Error;
use crate::executor::{Method, RawResponse, RequestExecutor, classify_write};
use crate::paginate::Paginator;
use crate::reply::Reply;
use crate::signing::{CertificateCookies, RequestSigner};
use crate::wire::{self, KeyOrder};

const DEFAULT_POST_PATH: &str = "mo.json";

/// Certificate-signed session against one APIC.
#[derive(Debug, Clone)]
pub struct CertSession {
    executor: RequestExecutor,
    signer: RequestSigner,
}

impl CertSession {
    /// Build a session from a PEM private key and the DN of the matching
    /// user certificate.
    pub fn new(
        config: &SessionConfig,
        private_key: &SecretString,
        certificate_dn: impl Into<String>,
    ) -> Result<Self, Error> {
        let signer = RequestSigner::from_pem(private_key, certificate_dn)?;
        Self::with_signer(config, signer)
    }

    pub fn with_signer(config: &SessionConfig, signer: RequestSigner) -> Result<Self, Error> {
        let base_url = config.base_url()?;
        let http = config.transport().build_client()?;
        debug!(
            base_url = %base_url,
            certificate_dn = signer.certificate_dn(),
            "certificate session created"
        );
        Ok(Self {
            executor: RequestExecutor::new(http, base_url),
            signer,
        })
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    pub fn base_url(&self) -> &url::Url {
        self.executor.base_url()
    }

    /// Sign `content` and return the cookie set for one request.
    pub fn pack_cookies(&self, content: &str) -> CertificateCookies {
        self.signer.pack_cookies(content)
    }

    /// GET `/api/<uri>` and return its `imdata`. Any non-2xx is an error.
    pub async fn get_json(&self, uri: &str) -> Result<Vec<Value>, Error> {
        self.send_signed(Method::Get, uri, None)
            .await?
            .require_success()?
            .imdata()
    }

    /// Fetch every page of `uri`, each page signed separately.
    pub async fn get_json_paged(&self, uri: &str) -> Result<Vec<Value>, Error> {
        Paginator::fetch_all(uri, |page_uri| async move {
            self.get_json(&page_uri).await.map(Reply::Success)
        })
        .await?
        .into_result()
    }

    /// POST a managed-object document to `/api/mo.json`.
    pub async fn post_json(&self, payload: &Value) -> Result<Reply<u16>, Error> {
        self.post_json_to(DEFAULT_POST_PATH, payload).await
    }

    /// POST to `/api/<path>`.
    ///
    /// The body goes out with sorted keys, but the signature covers the
    /// document in its given key order; the controller accepts this pairing.
    /// Any status other than 200 or 400 is an error, other 2xx included.
    pub async fn post_json_to(&self, path: &str, payload: &Value) -> Result<Reply<u16>, Error> {
        let body = wire::encode(payload, KeyOrder::Sorted);
        let signed = wire::encode(payload, KeyOrder::AsGiven);
        let resp = self
            .send_signed(Method::Post, path, Some((body, signed)))
            .await?;
        if resp.is_success() && resp.status != StatusCode::OK {
            error!(status = resp.status.as_u16(), body = %resp.body, "unexpected status for signed POST");
            return Err(resp.into_status_error());
        }
        classify_write(resp)
    }

    /// DELETE the managed object at `dn`. Any non-2xx is an error.
    pub async fn delete_mo(&self, dn: &str) -> Result<u16, Error> {
        let resp = self
            .send_signed(Method::Delete, &format!("mo/{dn}.json"), None)
            .await?
            .require_success()?;
        Ok(resp.status.as_u16())
    }

    /// `body` is `(sent, signed)`.
    async fn send_signed(
        &self,
        method: Method,
        uri: &str,
        body: Option<(String, String)>,
    ) -> Result<RawResponse, Error> {
        let url = self.executor.url(uri)?;
        let target = RequestExecutor::target(&url);
        let (sent, signed) = body.unzip();
        let content = format!(
            "{}{target}{}",
            method.as_str(),
            signed.as_deref().unwrap_or_default()
        );
        let cookies = self.signer.pack_cookies(&content);
        self.executor
            .execute(method, url, sent, Some(cookies.header_value()), None)
            .await
    }
}
