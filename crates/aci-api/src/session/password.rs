// Password session
//
// `aaaLogin` token auth. The controller sets the `APIC-cookie` session
// cookie on login; the token is also seeded into the jar so a refreshed
// token takes effect on the very next request. An optional background
// timer renews the token before `refreshTimeoutSeconds` runs out.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::StatusCode;
use reqwest::cookie::Jar;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::executor::{Method, RequestExecutor, classify_page, classify_write};
use crate::models::{DATASET_TOO_BIG, LoginAttributes, SubscriptionResponse, parse_json};
use crate::paginate::Paginator;
use crate::refresh::{RefreshSchedule, refresh_delay};
use crate::reply::Reply;
use crate::wire::{self, KeyOrder};

const LOGIN_PATH: &str = "aaaLogin.json";
const REFRESH_PATH: &str = "aaaRefresh.json";
const LOGOUT_PATH: &str = "aaaLogout.json";
const DEFAULT_POST_PATH: &str = "mo.json";
const TOKEN_COOKIE: &str = "APIC-cookie";

/// Username/password session against one APIC.
///
/// Cheaply cloneable via `Arc`; clones share the same login state. The
/// session starts unauthenticated, becomes authenticated on a successful
/// [`login`](Self::login), and drops back on [`logout`](Self::logout) or a
/// failed token refresh.
#[derive(Clone)]
pub struct PasswordSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    base_url: Url,
    username: String,
    password: SecretString,
    state: RwLock<SessionState>,
    auto_refresh: AtomicBool,
    timer: Mutex<Option<RefreshSchedule>>,
    next_timer_id: AtomicU64,
}

/// Everything a login produces. Guarded as one unit so a refresh can
/// check the epoch and install its token atomically.
#[derive(Default)]
struct SessionState {
    /// The transport handle. `None` means unauthenticated.
    executor: Option<RequestExecutor>,
    jar: Option<Arc<Jar>>,
    token: Option<SecretString>,
    /// Last `refreshTimeoutSeconds` the controller advertised.
    refresh_timeout_secs: Option<u64>,
    /// Runtime the last login ran on; refresh timers are spawned here.
    runtime: Option<Handle>,
    /// Bumped on login, logout, and refresh failure; results from an older
    /// epoch are discarded.
    epoch: u64,
}

impl std::fmt::Debug for PasswordSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordSession")
            .field("base_url", &self.inner.base_url.as_str())
            .field("username", &self.inner.username)
            .field("authenticated", &self.is_authenticated())
            .field("auto_refresh", &self.auto_refresh_enabled())
            .finish_non_exhaustive()
    }
}

impl PasswordSession {
    /// Create an unauthenticated session. Nothing is sent until
    /// [`login`](Self::login).
    pub fn new(
        config: SessionConfig,
        username: impl Into<String>,
        password: SecretString,
    ) -> Result<Self, Error> {
        let base_url = config.base_url()?;
        let username = username.into();
        debug!(base_url = %base_url, username = %username, "password session created");

        Ok(Self {
            inner: Arc::new(SessionInner {
                auto_refresh: AtomicBool::new(config.auto_refresh),
                config,
                base_url,
                username,
                password,
                state: RwLock::new(SessionState::default()),
                timer: Mutex::new(None),
                next_timer_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The REST root, e.g. `https://10.0.0.1/api/`.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    /// The current session token (for websocket subscriptions), if logged in.
    pub fn token(&self) -> Option<SecretString> {
        self.state().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().executor.is_some()
    }

    pub fn auto_refresh_enabled(&self) -> bool {
        self.inner.auto_refresh.load(Ordering::SeqCst)
    }

    /// Whether a refresh timer is currently armed.
    pub fn refresh_pending(&self) -> bool {
        self.timer_slot().is_some()
    }

    /// Turn background refresh on or off. Enabling it on a live session
    /// arms the timer right away, on the runtime that ran the login; this
    /// works from outside that runtime too.
    pub fn set_auto_refresh(&self, enabled: bool) {
        self.inner.auto_refresh.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.cancel_refresh();
            return;
        }
        let epoch = self.state().epoch;
        self.schedule_refresh(epoch);
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Authenticate with `aaaLogin`.
    ///
    /// Returns `Ok(false)` if the controller answers 401 (bad credentials);
    /// the session stays unauthenticated. Any other non-2xx status is an
    /// error. On success the token is stored and, with auto-refresh on, the
    /// first refresh is scheduled.
    pub async fn login(&self) -> Result<bool, Error> {
        let epoch = {
            let mut st = self.state_mut();
            st.epoch += 1;
            st.executor = None;
            st.jar = None;
            st.token = None;
            st.refresh_timeout_secs = None;
            st.runtime = None;
            st.epoch
        };
        self.cancel_refresh();
        self.inner
            .auto_refresh
            .store(self.inner.config.auto_refresh, Ordering::SeqCst);

        let jar = Arc::new(Jar::default());
        let http = self
            .inner
            .config
            .transport()
            .with_cookie_jar(Arc::clone(&jar))
            .build_client()?;
        let executor = RequestExecutor::new(http, self.inner.base_url.clone());

        let body = json!({"aaaUser": {"attributes": {
            "name": self.inner.username,
            "pwd": self.inner.password.expose_secret(),
        }}});
        let url = executor.url(LOGIN_PATH)?;
        info!(url = %url, username = %self.inner.username, "logging in to APIC");

        let resp = executor
            .execute(
                Method::Post,
                url,
                Some(wire::encode(&body, KeyOrder::AsGiven)),
                None,
                Some(self.inner.config.login_timeout),
            )
            .await?;

        if resp.status == StatusCode::UNAUTHORIZED {
            error!(message = %resp.error_message(), "login refused by APIC");
            return Ok(false);
        }
        let resp = resp.require_success()?;
        let attrs = LoginAttributes::from_body(&resp.body)?;

        {
            let mut st = self.state_mut();
            if st.epoch != epoch {
                debug!("login superseded while in flight");
                return Err(Error::NotAuthenticated);
            }
            seed_token(&jar, &self.inner.base_url, &attrs.token);
            st.executor = Some(executor);
            st.jar = Some(jar);
            st.token = Some(SecretString::from(attrs.token.clone()));
            st.refresh_timeout_secs = attrs.refresh_timeout_seconds;
            st.runtime = Handle::try_current().ok();
        }
        info!("successfully obtained token from APIC");

        self.schedule_refresh(epoch);
        Ok(true)
    }

    /// Renew the token with `aaaRefresh`.
    ///
    /// Any failure is fatal for the session: the token is dropped,
    /// auto-refresh is disabled, and the caller has to log in again.
    pub async fn renew_cookie(&self) -> Result<(), Error> {
        let epoch = self.state().epoch;
        self.renew_for_epoch(epoch).await
    }

    /// End the session.
    ///
    /// Auto-refresh is disabled and any pending timer cancelled before the
    /// logout request goes out, so no refresh can resurrect the token. The
    /// controller's answer is only logged; only a failed delivery is an error.
    pub async fn logout(&self) -> Result<(), Error> {
        self.inner.auto_refresh.store(false, Ordering::SeqCst);
        let executor = {
            let mut st = self.state_mut();
            st.epoch += 1;
            st.token = None;
            st.jar = None;
            st.refresh_timeout_secs = None;
            st.runtime = None;
            st.executor.take()
        };
        self.cancel_refresh();
        let Some(executor) = executor else {
            debug!("logout on unauthenticated session");
            return Ok(());
        };

        debug!("logging out of APIC");
        let body = json!({"aaaUser": {"attributes": {"name": self.inner.username}}});
        match post_with(&executor, LOGOUT_PATH, &body).await {
            Ok(Reply::Success(_)) => info!("logged out of APIC"),
            Ok(Reply::Rejected(rejection)) => warn!(%rejection, "APIC rejected logout"),
            Err(e @ Error::Status { .. }) => warn!(error = %e, "APIC refused logout"),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// GET `/api/<uri>` and return its `imdata`.
    ///
    /// A 400 saying the result set is too big is retried transparently
    /// through [`get_json_paged`](Self::get_json_paged). Other 400s and
    /// non-2xx statuses come back as [`Reply::Rejected`].
    pub async fn get_json(&self, uri: &str) -> Result<Reply<Vec<Value>>, Error> {
        let resp = self.get(uri).await?;

        if resp.is_success() {
            let data = resp.imdata()?;
            debug!(objects = data.len(), "got data from APIC");
            return Ok(Reply::Success(data));
        }

        let rejection = resp.rejection();
        if rejection.is_bad_request() {
            error!(%rejection, "error 400 during GET");
            if rejection.text == DATASET_TOO_BIG {
                info!(uri, "result set too big, retrying with pagination");
                return self.get_json_paged(uri).await;
            }
        } else {
            error!(status = rejection.status, body = %resp.body, "error during GET");
        }
        Ok(Reply::Rejected(rejection))
    }

    /// Register a push subscription for `uri` and return its id.
    ///
    /// The id is the caller's handle for refreshing the subscription; the
    /// updates themselves arrive over the controller's websocket.
    pub async fn subscribe(&self, uri: &str) -> Result<Reply<String>, Error> {
        let sep = if uri.contains('?') { '&' } else { '?' };
        let resp = self.get(&format!("{uri}{sep}subscription=yes")).await?;

        if resp.is_success() {
            let sub: SubscriptionResponse = parse_json(&resp.body)?;
            info!(subscription_id = %sub.subscription_id, "subscription registered");
            return Ok(Reply::Success(sub.subscription_id));
        }

        let rejection = resp.rejection();
        error!(%rejection, "subscription request failed");
        Ok(Reply::Rejected(rejection))
    }

    /// Fetch every page of `uri` and concatenate the results.
    pub async fn get_json_paged(&self, uri: &str) -> Result<Reply<Vec<Value>>, Error> {
        Paginator::fetch_all(uri, |page_uri| self.get_page(page_uri)).await
    }

    async fn get_page(&self, uri: String) -> Result<Reply<Vec<Value>>, Error> {
        classify_page(self.get(&uri).await?)
    }

    async fn get(&self, uri: &str) -> Result<crate::executor::RawResponse, Error> {
        let executor = self.executor()?;
        let url = executor.url(uri)?;
        executor.execute(Method::Get, url, None, None, None).await
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// POST a managed-object document to `/api/mo.json`.
    pub async fn post_json(&self, payload: &Value) -> Result<Reply<u16>, Error> {
        self.post_json_to(DEFAULT_POST_PATH, payload).await
    }

    /// POST a managed-object document to `/api/<path>`.
    ///
    /// The body is serialized with sorted keys. 2xx yields the status code,
    /// 400 a rejection (`"400: <text>"`), anything else an error.
    pub async fn post_json_to(&self, path: &str, payload: &Value) -> Result<Reply<u16>, Error> {
        let executor = self.executor()?;
        post_with(&executor, path, payload).await
    }

    /// DELETE the managed object at `dn`.
    pub async fn delete_mo(&self, dn: &str) -> Result<u16, Error> {
        debug!(dn, "deleting managed object");
        let executor = self.executor()?;
        let url = executor.url(&format!("mo/{dn}.json"))?;
        let resp = executor
            .execute(Method::Delete, url, None, None, None)
            .await?
            .require_success()?;
        Ok(resp.status.as_u16())
    }

    /// Trigger a configuration snapshot of `target_dn` (empty for the whole
    /// fabric). Returns `true` only if the controller answered 200.
    pub async fn snapshot(&self, description: &str, target_dn: &str) -> Result<bool, Error> {
        let payload = json!({"configExportP": {"attributes": {
            "adminSt": "triggered",
            "descr": format!("by aci-api - {description}"),
            "dn": "uni/fabric/configexp-aciclient",
            "format": "json",
            "includeSecureFields": "yes",
            "maxSnapshotCount": "global-limit",
            "name": "aciclient",
            "nameAlias": "",
            "snapshot": "yes",
            "targetDn": target_dn,
        }}});

        match self.post_json(&payload).await? {
            Reply::Success(200) => {
                info!(target_dn, "snapshot triggered");
                Ok(true)
            }
            Reply::Success(status) => {
                warn!(status, "unexpected status for snapshot");
                Ok(false)
            }
            Reply::Rejected(rejection) => {
                error!(%rejection, "snapshot rejected");
                Ok(false)
            }
        }
    }

    // ── Refresh internals ────────────────────────────────────────────

    async fn renew_for_epoch(&self, epoch: u64) -> Result<(), Error> {
        debug!(epoch, "renewing token");
        let executor = {
            let st = self.state();
            if st.epoch != epoch {
                return Err(Error::NotAuthenticated);
            }
            st.executor.clone().ok_or(Error::NotAuthenticated)?
        };

        let attrs = match exchange_refresh(&executor).await {
            Ok(attrs) => attrs,
            Err(e) => {
                error!(error = %e, "token refresh failed, session is no longer usable");
                self.fail_refresh(epoch);
                return Err(e);
            }
        };

        {
            let mut st = self.state_mut();
            if st.epoch != epoch {
                debug!(epoch, "discarding refresh result from a closed session");
                return Err(Error::NotAuthenticated);
            }
            if let Some(jar) = &st.jar {
                seed_token(jar, &self.inner.base_url, &attrs.token);
            }
            st.token = Some(SecretString::from(attrs.token.clone()));
            st.refresh_timeout_secs = attrs.refresh_timeout_seconds;
        }
        info!("successfully renewed the token");

        self.schedule_refresh(epoch);
        Ok(())
    }

    fn fail_refresh(&self, epoch: u64) {
        {
            let mut st = self.state_mut();
            if st.epoch != epoch {
                return;
            }
            st.epoch += 1;
            st.executor = None;
            st.jar = None;
            st.token = None;
            st.refresh_timeout_secs = None;
            st.runtime = None;
        }
        self.inner.auto_refresh.store(false, Ordering::SeqCst);
        self.cancel_refresh();
    }

    /// Arm the next refresh for `epoch`.
    ///
    /// The epoch is checked and the timer installed while the state lock is
    /// held, so a logout or re-login that bumps the epoch either happens
    /// first (and nothing is armed) or cancels the timer afterwards.
    fn schedule_refresh(&self, epoch: u64) {
        if !self.auto_refresh_enabled() {
            return;
        }
        let st = self.state();
        if st.epoch != epoch || st.executor.is_none() {
            debug!(epoch, current = st.epoch, "not arming refresh for a closed session");
            return;
        }
        let Some(timeout) = st.refresh_timeout_secs else {
            warn!("controller did not advertise refreshTimeoutSeconds, auto-refresh inactive");
            return;
        };
        let Some(runtime) = st.runtime.as_ref() else {
            warn!("no runtime recorded for this session, auto-refresh inactive");
            return;
        };

        let delay = refresh_delay(timeout, self.inner.config.refresh_offset);
        let id = self.inner.next_timer_id.fetch_add(1, Ordering::SeqCst);
        let schedule = RefreshSchedule::spawn(runtime, id, epoch, delay, &self.inner, move |inner| {
            PasswordSession { inner }.on_timer(id, epoch)
        });

        let previous = self.timer_slot().replace(schedule);
        drop(st);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    async fn on_timer(self, id: u64, epoch: u64) {
        {
            let mut slot = self.timer_slot();
            match slot.take() {
                Some(own) if own.id == id => own.release(),
                Some(other) => {
                    *slot = Some(other);
                    return;
                }
                None => return,
            }
        }
        if !self.auto_refresh_enabled() {
            return;
        }
        if let Err(e) = self.renew_for_epoch(epoch).await {
            warn!(error = %e, "automatic token refresh did not complete");
        }
    }

    fn cancel_refresh(&self) {
        let pending = self.timer_slot().take();
        if let Some(schedule) = pending {
            debug!(timer = schedule.id, epoch = schedule.epoch, "cancelling refresh timer");
            schedule.cancel();
        }
    }

    // ── State access ─────────────────────────────────────────────────

    fn executor(&self) -> Result<RequestExecutor, Error> {
        self.state().executor.clone().ok_or(Error::NotAuthenticated)
    }

    fn state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().expect("session lock poisoned")
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().expect("session lock poisoned")
    }

    fn timer_slot(&self) -> std::sync::MutexGuard<'_, Option<RefreshSchedule>> {
        self.inner.timer.lock().expect("refresh timer lock poisoned")
    }
}

/// POST `payload` with sorted keys and classify the answer.
async fn post_with(
    executor: &RequestExecutor,
    path: &str,
    payload: &Value,
) -> Result<Reply<u16>, Error> {
    debug!(path, "posting JSON to APIC");
    let url = executor.url(path)?;
    let body = wire::encode(payload, KeyOrder::Sorted);
    let resp = executor
        .execute(Method::Post, url, Some(body), None, None)
        .await?;
    classify_write(resp)
}

/// `aaaRefresh` round trip. Anything but a 200 carrying a token is a failure.
async fn exchange_refresh(executor: &RequestExecutor) -> Result<LoginAttributes, Error> {
    let url = executor.url(REFRESH_PATH)?;
    let resp = executor
        .execute(Method::Post, url, None, None, None)
        .await?;
    if resp.status != StatusCode::OK {
        return Err(Error::RefreshFailed {
            status: resp.status.as_u16(),
            message: resp.error_message(),
        });
    }
    LoginAttributes::from_body(&resp.body)
}

fn seed_token(jar: &Jar, base_url: &Url, token: &str) {
    jar.add_cookie_str(&format!("{TOKEN_COOKIE}={token}; Path=/"), base_url);
}
