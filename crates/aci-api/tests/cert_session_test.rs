#![allow(clippy::unwrap_used)]
// Integration tests for `CertSession` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use aci_api::{CertSession, Credentials, Error, Reply, RequestSigner, Session, SessionConfig};

const KEY_PEM: &str = include_str!("fixtures/apic-user.key");
const PKCS1_KEY_PEM: &str = include_str!("fixtures/apic-user-pkcs1.key");
const GOLDEN_SIGNATURE: &str = include_str!("fixtures/get-tn-common.sig");
const DN: &str = "uni/userext/user-admin/usercert-admin";

// ── Helpers ─────────────────────────────────────────────────────────

fn signer() -> RequestSigner {
    RequestSigner::from_pem(&SecretString::from(KEY_PEM.to_owned()), DN).unwrap()
}

async fn setup() -> (MockServer, CertSession) {
    let server = MockServer::start().await;
    let session = CertSession::with_signer(&SessionConfig::new(server.uri()), signer()).unwrap();
    (server, session)
}

/// Matches requests whose cookies are the ones `signer()` produces for `content`.
fn signed_for(content: &str) -> impl Fn(&Request) -> bool + Send + Sync + 'static {
    let expected = signer().pack_cookies(content).header_value();
    move |req: &Request| {
        req.headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }
}

// ── Signing ─────────────────────────────────────────────────────────

#[test]
fn test_signature_matches_openssl_golden() {
    assert_eq!(signer().sign("GET/api/mo/uni/tn-common.json"), GOLDEN_SIGNATURE.trim());
}

#[test]
fn test_pkcs1_key_signs_identically() {
    let pkcs1 = RequestSigner::from_pem(&SecretString::from(PKCS1_KEY_PEM.to_owned()), DN).unwrap();
    let content = "GET/api/class/fvTenant.json";
    assert_eq!(pkcs1.sign(content), signer().sign(content));
}

#[test]
fn test_bad_key_fails_construction() {
    let config = SessionConfig::new("apic.example.net");
    let result = CertSession::new(&config, &SecretString::from("not a key".to_owned()), DN);
    assert!(matches!(result, Err(Error::PrivateKey(_))));
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_sends_signed_cookies() {
    let (server, session) = setup().await;

    let tenant = json!({"fvTenant": {"attributes": {"dn": "uni/tn-common"}}});
    Mock::given(method("GET"))
        .and(path("/api/mo/uni/tn-common.json"))
        .and(signed_for("GET/api/mo/uni/tn-common.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imdata": [tenant.clone()]})))
        .expect(1)
        .mount(&server)
        .await;

    let data = session.get_json("mo/uni/tn-common.json").await.unwrap();
    assert_eq!(data, vec![tenant]);
}

#[tokio::test]
async fn test_signature_covers_query_string() {
    let (server, session) = setup().await;

    let uri = "class/fvTenant.json?query-target-filter=eq(fvTenant.name,\"common\")";
    Mock::given(method("GET"))
        .and(path("/api/class/fvTenant.json"))
        .and(signed_for(
            "GET/api/class/fvTenant.json?query-target-filter=eq(fvTenant.name,%22common%22)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imdata": []})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(session.get_json(uri).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_non_success_is_error() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/mo/uni/tn-missing.json"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    let err = session.get_json("mo/uni/tn-missing.json").await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_paged_read_signs_every_page() {
    let (server, session) = setup().await;

    let ep = json!({"fvCEp": {"attributes": {"mac": "00:50:56:AA:BB:CC"}}});
    Mock::given(method("GET"))
        .and(path("/api/class/fvCEp.json"))
        .and(query_param("page", "0"))
        .and(signed_for("GET/api/class/fvCEp.json?page=0&page-size=50000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imdata": [ep.clone()]})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/class/fvCEp.json"))
        .and(query_param("page", "1"))
        .and(signed_for("GET/api/class/fvCEp.json?page=1&page-size=50000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imdata": []})))
        .expect(1)
        .mount(&server)
        .await;

    let data = session.get_json_paged("class/fvCEp.json").await.unwrap();
    assert_eq!(data, vec![ep]);
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_post_signs_given_order_but_sends_sorted() {
    let (server, session) = setup().await;

    let payload = json!({"fvTenant": {"attributes": {"name": "x", "dn": "uni/tn-x"}}});
    Mock::given(method("POST"))
        .and(path("/api/mo.json"))
        .and(wiremock::matchers::body_string(
            r#"{"fvTenant": {"attributes": {"dn": "uni/tn-x", "name": "x"}}}"#,
        ))
        .and(signed_for(
            r#"POST/api/mo.json{"fvTenant": {"attributes": {"name": "x", "dn": "uni/tn-x"}}}"#,
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imdata": []})))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(session.post_json(&payload).await.unwrap(), Reply::Success(200));
}

#[tokio::test]
async fn test_post_classification() {
    let (server, session) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/mo.json"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "imdata": [{"error": {"attributes": {"code": "121", "text": "Invalid DN"}}}]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/mo.json"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let payload = json!({"fvTenant": {"attributes": {"dn": "bad"}}});
    let reply = session.post_json(&payload).await.unwrap();
    assert_eq!(reply.rejection().unwrap().to_string(), "400: Invalid DN");

    let err = session.post_json(&payload).await.unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_post_other_2xx_is_error() {
    let (server, session) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/mo.json"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"imdata": []})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/mo.json"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let payload = json!({"fvTenant": {"attributes": {"name": "common"}}});
    let err = session.post_json(&payload).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 201, .. }));

    let err = session.post_json(&payload).await.unwrap_err();
    assert_eq!(err.status(), Some(204));
}

#[tokio::test]
async fn test_delete_signs_dn_path() {
    let (server, session) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/mo/uni/tn-x.json"))
        .and(signed_for("DELETE/api/mo/uni/tn-x.json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(session.delete_mo("uni/tn-x").await.unwrap(), 200);
}

// ── Session enum ────────────────────────────────────────────────────

#[tokio::test]
async fn test_session_from_certificate_credentials_needs_no_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/mo/uni.json"))
        .and(signed_for("GET/api/mo/uni.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imdata": []})))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::new(
        SessionConfig::new(server.uri()),
        Credentials::certificate(KEY_PEM, DN),
    )
    .unwrap();

    assert!(session.connect().await.unwrap());
    assert_eq!(session.get_json("mo/uni.json").await.unwrap(), Reply::Success(Vec::new()));
    session.close().await.unwrap();
}
