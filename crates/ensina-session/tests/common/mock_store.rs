//! Scriptable in-memory session store for integration tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use ensina_session::{AuthError, SessionStore};
use ensina_types::{Credentials, Role, SignUpRequest, User};

/// A fixed user for tests; callers mutate fields to build drifted variants.
pub fn sample_user(id: &str) -> User {
    let at = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
    User {
        id: id.to_string(),
        name: "Ana Souza".to_string(),
        email: "ana@ensina.app".to_string(),
        role: Role::Aluno,
        created_at: at,
        updated_at: at,
        avatar_path: None,
        phone: None,
        bio: None,
    }
}

/// Outcome the store serves for one `current_session` call.
#[derive(Clone)]
pub enum MeOutcome {
    User(User),
    Unauthenticated,
    ServerError(u16),
    NetworkDown,
}

/// In-memory session store with scripted outcomes and per-endpoint call
/// counters.
///
/// `current_session` consumes from the script queue first; with the queue
/// empty it serves whatever `set_session` left behind, the way a real server
/// serves its session record.
pub struct MockSessionStore {
    accounts: DashMap<String, (String, User)>,
    session: Mutex<Option<User>>,
    script: Mutex<VecDeque<MeOutcome>>,
    me_delay: Mutex<Option<Duration>>,
    online: AtomicBool,
    pub me_calls: AtomicU32,
    pub signin_calls: AtomicU32,
    pub signup_calls: AtomicU32,
    pub signout_calls: AtomicU32,
    pub probe_calls: AtomicU32,
}

impl MockSessionStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            session: Mutex::new(None),
            script: Mutex::new(VecDeque::new()),
            me_delay: Mutex::new(None),
            online: AtomicBool::new(true),
            me_calls: AtomicU32::new(0),
            signin_calls: AtomicU32::new(0),
            signup_calls: AtomicU32::new(0),
            signout_calls: AtomicU32::new(0),
            probe_calls: AtomicU32::new(0),
        }
    }

    /// Register an account that `sign_in` will accept.
    pub fn register(&self, email: &str, password: &str, user: User) {
        self.accounts
            .insert(email.to_string(), (password.to_string(), user));
    }

    /// Queue one scripted outcome for `current_session`.
    pub fn script_me(&self, outcome: MeOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Overwrite the server-side session record.
    pub fn set_session(&self, user: Option<User>) {
        *self.session.lock() = user;
    }

    /// Simulate the whole store going unreachable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Make every `current_session` call take this long.
    pub fn set_me_delay(&self, delay: Duration) {
        *self.me_delay.lock() = Some(delay);
    }

    pub fn me_calls(&self) -> u32 {
        self.me_calls.load(Ordering::SeqCst)
    }

    pub fn signin_calls(&self) -> u32 {
        self.signin_calls.load(Ordering::SeqCst)
    }

    pub fn signup_calls(&self) -> u32 {
        self.signup_calls.load(Ordering::SeqCst)
    }

    pub fn signout_calls(&self) -> u32 {
        self.signout_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), AuthError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthError::Network("connection refused".to_string()))
        }
    }
}

impl Default for MockSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn current_session(&self) -> Result<Option<User>, AuthError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let delay = *self.me_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(MeOutcome::User(user)) => Ok(Some(user)),
            Some(MeOutcome::Unauthenticated) => Ok(None),
            Some(MeOutcome::ServerError(status)) => Err(AuthError::server(status, "internal error")),
            Some(MeOutcome::NetworkDown) => Err(AuthError::Network("connection reset".to_string())),
            None => Ok(self.session.lock().clone()),
        }
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<User, AuthError> {
        self.signin_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        match self.accounts.get(&credentials.email) {
            Some(entry) if entry.value().0 == credentials.password => {
                let user = entry.value().1.clone();
                *self.session.lock() = Some(user.clone());
                Ok(user)
            }
            _ => Err(AuthError::Credentials(
                "invalid email or password".to_string(),
            )),
        }
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<User, AuthError> {
        self.signup_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        if self.accounts.contains_key(&request.email) {
            return Err(AuthError::Credentials("email already registered".to_string()));
        }

        let mut user = sample_user(&format!("u-{}", self.accounts.len() + 1));
        user.name = request.name.clone();
        user.email = request.email.clone();
        self.accounts.insert(
            request.email.clone(),
            (request.password.clone(), user.clone()),
        );
        *self.session.lock() = Some(user.clone());
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.signout_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        *self.session.lock() = None;
        Ok(())
    }

    async fn probe(&self) -> Result<(), AuthError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }
}
