//! Session client: the in-memory auth state machine
//!
//! One `SessionClient` instance is the authoritative session view for a
//! running client. It wraps the session store with a circuit breaker, a
//! request debounce, a TTL cache, and in-flight deduplication, and broadcasts
//! identity changes to subscribers through a debounced watch channel.
//!
//! # Usage
//!
//! ```ignore
//! use ensina_session::{SessionClient, SessionConfig};
//!
//! let client = Arc::new(SessionClient::connect(
//!     SessionConfig::new("https://app.ensina.dev"),
//! )?);
//!
//! let user = client.sign_in("ana@ensina.app", "secret").await?;
//! let mut watcher = client.subscribe();
//! while let Some(snapshot) = watcher.changed().await {
//!     render(snapshot);
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use ensina_types::{Credentials, SignUpRequest, User};

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::config::SessionConfig;
use crate::error::{AuthError, ErrorKind};
use crate::metrics::{self, Operation, OperationTimer};
use crate::notify::DebouncedPublisher;
use crate::transport::{HttpSessionStore, SessionStore};

/// Point-in-time view of the auth state.
///
/// Published to subscribers on identity changes; also available on demand
/// through [`SessionClient::snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    /// Last known user, if any
    pub user: Option<User>,
    /// Whether a session operation is currently in flight
    pub is_loading: bool,
    /// User present and the cache unexpired
    pub is_authenticated: bool,
    /// Last operation error, if any
    pub error: Option<AuthError>,
}

/// Read-only user source for consistency validation.
#[async_trait]
pub trait UserSource: Send + Sync {
    /// Short stable name used in reports ("cache", "broadcast", "server").
    fn name(&self) -> &'static str;

    /// The user this source currently believes in.
    async fn current_user(&self) -> Result<Option<User>, AuthError>;
}

/// Resynchronization capability exposed to the consistency validator.
///
/// The validator only reads auth state and invokes these; it never mutates
/// state fields directly.
#[async_trait]
pub trait SessionSync: Send + Sync {
    /// Mark the cached user stale so the next check refetches.
    fn invalidate(&self);

    /// Clear all local auth state.
    fn reset(&self);

    /// Fetch the server record now, bypassing the debounce and TTL gates,
    /// and overwrite the cache with the result.
    async fn refresh(&self) -> Result<Option<User>, AuthError>;
}

type CheckResult = Result<Option<User>, AuthError>;
type CheckFuture = Shared<BoxFuture<'static, CheckResult>>;

struct ClientState {
    user: Option<User>,
    loading: bool,
    error: Option<AuthError>,
    last_checked: Option<Instant>,
    cache_expiry: Option<Instant>,
    // When the last real fetch was issued; short-circuited checks do not move it.
    last_check_request: Option<Instant>,
    breaker: CircuitBreaker,
    in_flight: Option<CheckFuture>,
    // Bumped by reset/sign-out so a stale in-flight result cannot resurrect state.
    epoch: u64,
}

struct Inner {
    config: SessionConfig,
    state: Mutex<ClientState>,
    publisher: DebouncedPublisher<AuthSnapshot>,
}

impl Inner {
    /// Run `f` against the locked state, then propagate the new snapshot.
    ///
    /// An identity change (a different user id, including to and from
    /// logged-out) wakes subscribers through the debounce window. A
    /// same-identity content change updates the broadcast value silently.
    /// The lock is never held across an await.
    fn mutate<R>(&self, f: impl FnOnce(&mut ClientState) -> R) -> R {
        let (result, wake, silent) = {
            let mut state = self.state.lock();
            let before = state.user.clone();
            let result = f(&mut state);
            let before_id = before.as_ref().map(|u| u.id.as_str());
            let after_id = state.user.as_ref().map(|u| u.id.as_str());
            let identity_changed = before_id != after_id;
            let content_changed = !identity_changed && before != state.user;
            let snapshot = (identity_changed || content_changed)
                .then(|| self.snapshot_locked(&state));
            match snapshot {
                Some(snap) if identity_changed => (result, Some(snap), None),
                Some(snap) => (result, None, Some(snap)),
                None => (result, None, None),
            }
        };
        if let Some(snapshot) = wake {
            self.publisher.publish(snapshot);
        } else if let Some(snapshot) = silent {
            self.publisher.set_silently(snapshot);
        }
        result
    }

    fn snapshot_locked(&self, state: &ClientState) -> AuthSnapshot {
        let fresh = state
            .cache_expiry
            .map(|expiry| Instant::now() < expiry)
            .unwrap_or(false);
        AuthSnapshot {
            user: state.user.clone(),
            is_loading: state.loading,
            is_authenticated: state.user.is_some() && fresh,
            error: state.error.clone(),
        }
    }

    fn snapshot(&self) -> AuthSnapshot {
        let state = self.state.lock();
        self.snapshot_locked(&state)
    }
}

/// The session client.
///
/// Explicitly constructed and injected; tests build isolated instances over
/// a mock store. Cheap to clone; clones share one underlying state.
#[derive(Clone)]
pub struct SessionClient {
    store: Arc<dyn SessionStore>,
    inner: Arc<Inner>,
}

impl SessionClient {
    /// Build a client over the production HTTP store.
    pub fn connect(config: SessionConfig) -> Result<Self, AuthError> {
        let store = Arc::new(HttpSessionStore::new(&config)?);
        Self::new(store, config)
    }

    /// Build a client over any session store.
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let breaker = CircuitBreaker::new(config.breaker_threshold, config.breaker_cooldown);
        // Loading until the first check completes, so the UI does not flash
        // a logged-out state on startup.
        let initial = AuthSnapshot {
            user: None,
            is_loading: true,
            is_authenticated: false,
            error: None,
        };
        let publisher = DebouncedPublisher::new(initial, config.notify_debounce);

        Ok(Self {
            store,
            inner: Arc::new(Inner {
                state: Mutex::new(ClientState {
                    user: None,
                    loading: true,
                    error: None,
                    last_checked: None,
                    cache_expiry: None,
                    last_check_request: None,
                    breaker,
                    in_flight: None,
                    epoch: 0,
                }),
                publisher,
                config,
            }),
        })
    }

    // =====================================================================
    // Sign-in / sign-up / sign-out
    // =====================================================================

    /// Exchange credentials for a session.
    ///
    /// Rejects empty input with a credentials error before any network call.
    /// On success the breaker resets and subscribers are notified if the
    /// user identity changed.
    #[instrument(skip(self, password), level = "debug")]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            let err = AuthError::Credentials("email and password are required".to_string());
            self.inner.mutate(|s| s.error = Some(err.clone()));
            return Err(err);
        }

        let timer = OperationTimer::start(Operation::SignIn);
        self.inner.mutate(|s| {
            s.loading = true;
            s.error = None;
        });

        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        match self.store.sign_in(&credentials).await {
            Ok(user) => {
                self.apply_authenticated(user.clone());
                timer.success();
                debug!(user = %user.id, "signed in");
                Ok(user)
            }
            Err(err) => {
                self.inner.mutate(|s| {
                    s.loading = false;
                    s.error = Some(err.clone());
                });
                timer.error();
                Err(err)
            }
        }
    }

    /// Create an account and start a session.
    ///
    /// Same state handling as [`sign_in`]; a 409 from the server (email
    /// already registered) surfaces as a credentials error with the server's
    /// own message.
    ///
    /// [`sign_in`]: Self::sign_in
    #[instrument(skip(self, password), level = "debug")]
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<User, AuthError> {
        if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            let err = AuthError::Credentials("name, email and password are required".to_string());
            self.inner.mutate(|s| s.error = Some(err.clone()));
            return Err(err);
        }

        let timer = OperationTimer::start(Operation::SignUp);
        self.inner.mutate(|s| {
            s.loading = true;
            s.error = None;
        });

        let request = SignUpRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        match self.store.sign_up(&request).await {
            Ok(user) => {
                self.apply_authenticated(user.clone());
                timer.success();
                debug!(user = %user.id, "signed up");
                Ok(user)
            }
            Err(err) => {
                self.inner.mutate(|s| {
                    s.loading = false;
                    s.error = Some(err.clone());
                });
                timer.error();
                Err(err)
            }
        }
    }

    /// End the session.
    ///
    /// Local state is cleared unconditionally; a failure of the remote
    /// sign-out is logged and swallowed so logout never blocks on the server.
    #[instrument(skip(self), level = "debug")]
    pub async fn sign_out(&self) {
        let timer = OperationTimer::start(Operation::SignOut);
        match self.store.sign_out().await {
            Ok(()) => {
                timer.success();
            }
            Err(err) => {
                warn!(error = %err, "remote sign-out failed; clearing local session anyway");
                timer.error();
            }
        }

        self.inner.mutate(|s| {
            s.epoch += 1;
            s.user = None;
            s.loading = false;
            s.error = None;
            s.last_checked = None;
            s.cache_expiry = None;
            s.in_flight = None;
        });
    }

    // =====================================================================
    // Session recovery
    // =====================================================================

    /// Recover the session from the store, serving cached state when a
    /// network round trip is not warranted.
    ///
    /// Short-circuit gates: an open breaker, an identical request already in
    /// flight (awaited, not duplicated), the request debounce window, and a
    /// still-valid cache. A 401 resolves to `Ok(None)` and is not a breaker
    /// failure; connectivity-class failures force the breaker open
    /// immediately.
    pub async fn check_session(&self) -> CheckResult {
        let fut = {
            let mut state = self.inner.state.lock();
            let now = Instant::now();

            if !state.breaker.allow_request() {
                metrics::record_short_circuit("breaker_open");
                debug!("circuit open; serving cached user");
                return Ok(state.user.clone());
            }

            // Callers arriving mid-fetch resolve with that fetch's result.
            // Consulted ahead of the debounce, whose anchor the fetch moved.
            if let Some(existing) = state.in_flight.clone() {
                metrics::record_short_circuit("coalesced");
                existing
            } else {
                if let Some(requested_at) = state.last_check_request {
                    if now.duration_since(requested_at) < self.inner.config.check_debounce {
                        metrics::record_short_circuit("debounced");
                        return Ok(state.user.clone());
                    }
                }

                let cache_fresh = state.cache_expiry.map(|expiry| now < expiry).unwrap_or(false);
                if state.user.is_some() && cache_fresh {
                    metrics::record_short_circuit("cache_valid");
                    return Ok(state.user.clone());
                }

                self.start_fetch(&mut state, now)
            }
        };

        fut.await
    }

    /// Start a fetch and park it in `in_flight`. Caller holds the state lock.
    fn start_fetch(&self, state: &mut ClientState, now: Instant) -> CheckFuture {
        state.last_check_request = Some(now);
        state.loading = true;

        let store = Arc::clone(&self.store);
        let inner = Arc::clone(&self.inner);
        let epoch = state.epoch;

        let fut = async move {
            let timer = OperationTimer::start(Operation::CheckSession);
            let result = store.current_session().await;

            inner.mutate(|s| {
                if s.epoch != epoch {
                    // Superseded by sign-out/reset; drop the result.
                    return;
                }
                s.in_flight = None;
                s.loading = false;

                match &result {
                    Ok(Some(user)) => {
                        let now = Instant::now();
                        s.user = Some(user.clone());
                        s.error = None;
                        s.last_checked = Some(now);
                        s.cache_expiry = Some(now + inner.config.session_ttl);
                        s.breaker.record_success();
                    }
                    Ok(None) => {
                        // 401: clean unauthenticated state, not a failure.
                        let now = Instant::now();
                        s.user = None;
                        s.error = None;
                        s.last_checked = Some(now);
                        s.cache_expiry = None;
                        s.breaker.record_success();
                    }
                    Err(err) => {
                        s.error = Some(err.clone());
                        match err.kind() {
                            ErrorKind::Network | ErrorKind::Cors => s.breaker.force_open(),
                            _ => s.breaker.record_failure(),
                        }
                    }
                }
            });

            match &result {
                Ok(Some(_)) => {
                    timer.success();
                }
                Ok(None) => {
                    timer.unauthenticated();
                }
                Err(_) => {
                    timer.error();
                }
            }
            result
        }
        .boxed()
        .shared();

        state.in_flight = Some(fut.clone());
        fut
    }

    // =====================================================================
    // State access
    // =====================================================================

    /// Last known user, fresh or stale.
    pub fn current_user(&self) -> Option<User> {
        self.inner.state.lock().user.clone()
    }

    /// User present and cache unexpired.
    pub fn is_authenticated(&self) -> bool {
        self.inner.snapshot().is_authenticated
    }

    /// Whether a session operation is in flight.
    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    /// Last operation error, if any.
    pub fn last_error(&self) -> Option<AuthError> {
        self.inner.state.lock().error.clone()
    }

    /// Clear the current error without touching user or loading state.
    pub fn clear_error(&self) {
        self.inner.mutate(|s| s.error = None);
    }

    /// Current state, computed now (not the last broadcast value).
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.snapshot()
    }

    /// Circuit breaker state.
    pub fn breaker_state(&self) -> BreakerState {
        self.inner.state.lock().breaker.state()
    }

    /// Consecutive breaker failure count.
    pub fn breaker_failure_count(&self) -> u32 {
        self.inner.state.lock().breaker.failure_count()
    }

    /// Time left before an open breaker allows a probe.
    pub fn breaker_cooldown_remaining(&self) -> Option<std::time::Duration> {
        self.inner.state.lock().breaker.cooldown_remaining()
    }

    /// Whether the session store is reachable at all.
    ///
    /// Any HTTP response counts, including 401; only a connectivity-class
    /// failure reports offline.
    pub async fn connectivity(&self) -> bool {
        self.store.probe().await.is_ok()
    }

    /// Subscribe to identity changes.
    ///
    /// The watcher yields a snapshot whenever the signed-in user identity
    /// changes (including to and from logged-out), coalesced within the
    /// notification debounce window.
    pub fn subscribe(&self) -> AuthWatcher {
        AuthWatcher {
            rx: self.inner.publisher.subscribe(),
        }
    }

    /// The snapshot subscribers last received.
    pub fn last_broadcast(&self) -> AuthSnapshot {
        self.inner.publisher.last_published()
    }

    /// The named read-only sources used for consistency validation: the
    /// in-memory cache, the last broadcast snapshot, and the server record.
    pub fn user_sources(&self) -> Vec<Arc<dyn UserSource>> {
        vec![
            Arc::new(self.clone()) as Arc<dyn UserSource>,
            Arc::new(BroadcastSource {
                client: self.clone(),
            }),
            Arc::new(ServerSource {
                store: Arc::clone(&self.store),
            }),
        ]
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.inner.config.base_url)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    fn apply_authenticated(&self, user: User) {
        self.inner.mutate(|s| {
            let now = Instant::now();
            // A check still in flight predates this session; bump the epoch
            // so its eventual result cannot clobber the fresh user.
            s.epoch += 1;
            s.in_flight = None;
            s.user = Some(user);
            s.loading = false;
            s.error = None;
            s.last_checked = Some(now);
            s.cache_expiry = Some(now + self.inner.config.session_ttl);
            s.breaker.record_success();
        });
    }

    fn fetch_bypassing_gates(&self) -> CheckFuture {
        let mut state = self.inner.state.lock();
        if let Some(existing) = state.in_flight.clone() {
            metrics::record_short_circuit("coalesced");
            existing
        } else {
            let now = Instant::now();
            self.start_fetch(&mut state, now)
        }
    }
}

#[async_trait]
impl UserSource for SessionClient {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn current_user(&self) -> Result<Option<User>, AuthError> {
        Ok(SessionClient::current_user(self))
    }
}

#[async_trait]
impl SessionSync for SessionClient {
    fn invalidate(&self) {
        debug!("session cache invalidated");
        self.inner.mutate(|s| {
            s.cache_expiry = None;
            s.last_check_request = None;
        });
    }

    fn reset(&self) {
        debug!("session state reset");
        self.inner.mutate(|s| {
            s.epoch += 1;
            s.user = None;
            s.loading = false;
            s.error = None;
            s.last_checked = None;
            s.cache_expiry = None;
            s.last_check_request = None;
            s.in_flight = None;
        });
    }

    async fn refresh(&self) -> Result<Option<User>, AuthError> {
        let timer = OperationTimer::start(Operation::Refresh);
        let result = self.fetch_bypassing_gates().await;
        match &result {
            Ok(_) => {
                timer.success();
            }
            Err(_) => {
                timer.error();
            }
        }
        result
    }
}

/// The last snapshot broadcast to subscribers, as a validation source.
///
/// Lags the cache while a notification is pending in the debounce window,
/// which is exactly the divergence the validator looks for.
struct BroadcastSource {
    client: SessionClient,
}

#[async_trait]
impl UserSource for BroadcastSource {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn current_user(&self) -> Result<Option<User>, AuthError> {
        Ok(self.client.last_broadcast().user)
    }
}

/// The server's authoritative record, fetched fresh on every read.
struct ServerSource {
    store: Arc<dyn SessionStore>,
}

#[async_trait]
impl UserSource for ServerSource {
    fn name(&self) -> &'static str {
        "server"
    }

    async fn current_user(&self) -> Result<Option<User>, AuthError> {
        self.store.current_session().await
    }
}

/// Subscriber handle for identity-change notifications.
#[derive(Debug, Clone)]
pub struct AuthWatcher {
    rx: watch::Receiver<AuthSnapshot>,
}

impl AuthWatcher {
    /// The most recently published snapshot.
    pub fn current(&self) -> AuthSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot.
    ///
    /// Returns `None` once the client has been dropped.
    pub async fn changed(&mut self) -> Option<AuthSnapshot> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Whether a snapshot was published since the last `changed`/`current` read.
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
