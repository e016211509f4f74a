// APIC response envelope types
//
// Every APIC response is wrapped in `{ "imdata": [...] }`. Reads carry
// managed objects keyed by class name, errors carry
// `{ "error": { "attributes": { "text": ... } } }`, and `aaaLogin` /
// `aaaRefresh` carry the session token. Only the fields this crate needs
// are modelled; managed objects themselves stay as raw JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::Error;

/// The exact text APIC returns when a query would exceed its result limit.
pub const DATASET_TOO_BIG: &str = "Unable to process the query, result dataset is too big";

// ── Generic envelope ─────────────────────────────────────────────────

/// Standard APIC read envelope.
#[derive(Debug, Deserialize)]
pub struct Imdata {
    #[serde(default)]
    pub imdata: Vec<Value>,
}

/// Response to a `?subscription=yes` read.
#[derive(Debug, Deserialize)]
pub struct SubscriptionResponse {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
    #[serde(default)]
    pub imdata: Vec<Value>,
}

// ── aaaLogin / aaaRefresh ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginEnvelope {
    imdata: Vec<LoginRecord>,
}

#[derive(Debug, Deserialize)]
struct LoginRecord {
    #[serde(rename = "aaaLogin")]
    aaa_login: Option<LoginObject>,
}

#[derive(Debug, Deserialize)]
struct LoginObject {
    attributes: LoginAttributes,
}

/// Attributes of the `aaaLogin` object returned by login and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginAttributes {
    pub token: String,
    #[serde(
        default,
        rename = "refreshTimeoutSeconds",
        deserialize_with = "lenient_u64"
    )]
    pub refresh_timeout_seconds: Option<u64>,
}

impl LoginAttributes {
    /// Extract `imdata[0].aaaLogin.attributes` from a login/refresh body.
    pub fn from_body(body: &str) -> Result<Self, Error> {
        let envelope: LoginEnvelope = parse_json(body)?;
        envelope
            .imdata
            .into_iter()
            .next()
            .and_then(|record| record.aaa_login)
            .map(|login| login.attributes)
            .ok_or(Error::MissingField {
                path: "imdata[0].aaaLogin.attributes",
            })
    }
}

/// APIC encodes numbers as strings (`"600"`); accept either form.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

// ── Error bodies ─────────────────────────────────────────────────────

/// Pull `imdata[0].error.attributes.text` out of an error body.
pub fn error_text(body: &Value) -> Option<&str> {
    body.pointer("/imdata/0/error/attributes/text")
        .and_then(Value::as_str)
}

// ── Parsing helpers ──────────────────────────────────────────────────

/// Deserialize a response body, keeping a preview of it on failure.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.to_owned(),
        }
    })
}
