// Request executor
//
// Wraps `reqwest::Client` with APIC URL construction and one-shot response
// classification. Both session kinds build requests through this type and
// decide success, rejection, or failure exactly once per response.

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderValue};
use serde_json::Value;
use tracing::{debug, error, trace};
use url::Url;

use crate::error::Error;
use crate::models::{Imdata, error_text, parse_json};
use crate::reply::{Rejection, Reply};

/// HTTP verbs the APIC REST API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

/// Raw HTTP executor for the APIC REST root (`https://<apic>/api/`).
///
/// Cheaply cloneable; the inner `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    http: reqwest::Client,
    base_url: Url,
}

impl RequestExecutor {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The REST root, always ending in `/api/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path relative to the REST root (`mo/uni.json`,
    /// `class/fvTenant.json?query-target-filter=...`).
    ///
    /// Query strings pass through untouched apart from the minimal
    /// escaping the URL parser applies; `|` survives as-is. Absolute URLs
    /// and `..` segments that leave the REST root are refused.
    pub fn url(&self, uri: &str) -> Result<Url, Error> {
        let url = self.base_url.join(uri.trim_start_matches('/'))?;
        if url.origin() != self.base_url.origin() || !url.path().starts_with(self.base_url.path()) {
            return Err(Error::OutsideApiRoot { uri: uri.to_owned() });
        }
        Ok(url)
    }

    /// The request target (`/api/...?...`) as it goes on the wire.
    pub(crate) fn target(url: &Url) -> String {
        match url.query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_owned(),
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send one request and buffer the response.
    ///
    /// `body` is sent verbatim as JSON; `cookie` overrides the jar for
    /// certificate-signed requests.
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
        cookie: Option<String>,
        timeout: Option<std::time::Duration>,
    ) -> Result<RawResponse, Error> {
        debug!("{} {}", method.as_str(), url);

        let mut req = match method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
            Method::Delete => self.http.delete(url),
        };
        if let Some(body) = body {
            req = req
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body);
        }
        if let Some(cookie) = cookie {
            let mut value = HeaderValue::from_str(&cookie)?;
            value.set_sensitive(true);
            req = req.header(COOKIE, value);
        }
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        trace!(%status, body = %body, "response received");
        Ok(RawResponse { status, body })
    }
}

// ── Responses ────────────────────────────────────────────────────────

/// A fully buffered response, ready for classification.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON, `Value::Null` if it isn't.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }

    /// The `imdata` array of a successful read.
    pub fn imdata(&self) -> Result<Vec<Value>, Error> {
        let envelope: Imdata = parse_json(&self.body)?;
        Ok(envelope.imdata)
    }

    /// The controller's explanation: `imdata[0].error.attributes.text`,
    /// else the raw body, else the status reason.
    pub fn error_message(&self) -> String {
        let decoded = self.json();
        if let Some(text) = error_text(&decoded) {
            return text.to_owned();
        }
        let raw = self.body.trim();
        if raw.is_empty() {
            self.status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_owned()
        } else {
            raw.to_owned()
        }
    }

    pub fn rejection(&self) -> Rejection {
        Rejection {
            status: self.status.as_u16(),
            text: self.error_message(),
            body: self.json(),
        }
    }

    pub fn into_status_error(self) -> Error {
        Error::Status {
            status: self.status.as_u16(),
            message: self.error_message(),
        }
    }

    /// Pass 2xx responses through; everything else becomes [`Error::Status`].
    pub fn require_success(self) -> Result<Self, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_status_error())
        }
    }
}

// ── Shared classification ────────────────────────────────────────────

/// Classify a write (POST): 2xx yields the status code, 400 is a
/// rejection carrying the controller's text, anything else is fatal.
pub(crate) fn classify_write(resp: RawResponse) -> Result<Reply<u16>, Error> {
    if resp.is_success() {
        debug!(status = resp.status.as_u16(), "posted data to APIC");
        return Ok(Reply::Success(resp.status.as_u16()));
    }
    if resp.status == StatusCode::BAD_REQUEST {
        let rejection = resp.rejection();
        error!(%rejection, "controller rejected POST");
        return Ok(Reply::Rejected(rejection));
    }
    error!(status = resp.status.as_u16(), body = %resp.body, "error during POST");
    Err(resp.into_status_error())
}

/// Classify one page of a paginated read: 2xx yields its objects, 400 is a
/// rejection, anything else is fatal.
pub(crate) fn classify_page(resp: RawResponse) -> Result<Reply<Vec<Value>>, Error> {
    if resp.is_success() {
        return resp.imdata().map(Reply::Success);
    }
    if resp.status == StatusCode::BAD_REQUEST {
        let rejection = resp.rejection();
        error!(%rejection, "controller rejected page request");
        return Ok(Reply::Rejected(rejection));
    }
    Err(resp.into_status_error())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_owned(),
        }
    }

    fn executor() -> RequestExecutor {
        RequestExecutor::new(
            reqwest::Client::new(),
            Url::parse("https://apic.example.net/api/").unwrap(),
        )
    }

    #[test]
    fn url_keeps_pipe_in_query() {
        let url = executor()
            .url("class/faultInst.json?order-by=faultInst.lastTransition|asc")
            .unwrap();
        assert_eq!(
            RequestExecutor::target(&url),
            "/api/class/faultInst.json?order-by=faultInst.lastTransition|asc"
        );
    }

    #[test]
    fn leading_slash_stays_under_api_root() {
        let url = executor().url("/mo/uni/tn-common.json").unwrap();
        assert_eq!(url.as_str(), "https://apic.example.net/api/mo/uni/tn-common.json");
    }

    #[test]
    fn uri_cannot_leave_api_root() {
        let exec = executor();
        for uri in [
            "https://other.example.net/api/mo/uni.json",
            "http://apic.example.net/api/mo/uni.json",
            "../login.html",
            "mo/../../evil.json",
        ] {
            let err = exec.url(uri).unwrap_err();
            assert!(matches!(err, Error::OutsideApiRoot { .. }), "{uri} -> {err}");
        }

        let url = exec.url("//other.example.net/mo/uni.json").unwrap();
        assert_eq!(url.host_str(), Some("apic.example.net"));
        assert!(url.path().starts_with("/api/"));
    }

    #[test]
    fn write_classification() {
        assert_eq!(
            classify_write(raw(200, r#"{"imdata":[]}"#)).unwrap(),
            Reply::Success(200)
        );

        let body = json!({"imdata": [{"error": {"attributes": {"text": "bad class"}}}]});
        let reply = classify_write(raw(400, &body.to_string())).unwrap();
        assert_eq!(reply.rejection().unwrap().to_string(), "400: bad class");

        let err = classify_write(raw(403, &body.to_string())).unwrap_err();
        assert!(matches!(err, Error::Status { status: 403, .. }));
        assert!(err.is_transport_failure());
    }

    #[test]
    fn error_message_falls_back_to_raw_body_then_reason() {
        assert_eq!(raw(404, r#"{"error": "Not found"}"#).error_message(), r#"{"error": "Not found"}"#);
        assert_eq!(raw(502, "").error_message(), "Bad Gateway");
    }
}
