//! Token cache shared by every request of one account.
//!
//! At most one login runs at a time. Callers arriving while it is in flight
//! park on a `watch` channel and receive the very same outcome, token or
//! error, once the login resolves.

use crate::api::Error;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

type LoginOutcome = Option<Result<String, Error>>;

#[derive(Default)]
struct State {
    token: Option<String>,
    /// Present exactly while a login is outstanding.
    login: Option<watch::Receiver<LoginOutcome>>,
}

enum Role {
    Cached(String),
    Leader(watch::Sender<LoginOutcome>),
    Waiter(watch::Receiver<LoginOutcome>),
}

pub struct Session {
    state: Mutex<State>,
    login_timeout: Duration,
}

/// Clears the in-flight mark when the leader finishes or is dropped mid-login.
struct InFlight<'a>(&'a Session);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().login = None;
    }
}

impl Session {
    pub fn new(login_timeout: Duration) -> Self {
        Session {
            state: Mutex::new(State::default()),
            login_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn login_in_flight(&self) -> bool {
        self.lock().login.is_some()
    }

    /// Drop the cached token only if it is still `stale`. A newer token
    /// obtained by a concurrent re-login is left alone.
    pub fn invalidate_token(&self, stale: &str) {
        let mut state = self.lock();
        if state.token.as_deref() == Some(stale) {
            state.token = None;
            log::info!("session token rejected by API, invalidated");
        }
    }

    /// Return the cached token, or obtain one through `login`.
    ///
    /// `login` is only invoked when no token is cached and no other login is
    /// in flight. Both the login and the wait for someone else's login are
    /// bounded by the session's login timeout.
    pub async fn ensure<F, Fut>(&self, login: F) -> Result<String, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, Error>>,
    {
        let role = {
            let mut state = self.lock();
            if let Some(token) = &state.token {
                Role::Cached(token.clone())
            } else if let Some(rx) = &state.login {
                Role::Waiter(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                state.login = Some(rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Cached(token) => Ok(token),
            Role::Leader(tx) => self.lead(tx, login).await,
            Role::Waiter(rx) => self.wait(rx).await,
        }
    }

    async fn lead<F, Fut>(&self, tx: watch::Sender<LoginOutcome>, login: F) -> Result<String, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, Error>>,
    {
        let in_flight = InFlight(self);

        log::info!("logging in");
        let outcome = match tokio::time::timeout(self.login_timeout, login()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::AuthError(String::from("login timed out"))),
        };

        match &outcome {
            Ok(token) => {
                self.lock().token = Some(token.clone());
                log::info!("login succeeded");
            }
            Err(e) => log::error!("login failed: {}", e),
        }

        drop(in_flight);
        tx.send_replace(Some(outcome.clone()));
        outcome
    }

    async fn wait(&self, mut rx: watch::Receiver<LoginOutcome>) -> Result<String, Error> {
        log::debug!("login already in flight, waiting for it");

        let outcome = match tokio::time::timeout(self.login_timeout, rx.wait_for(Option::is_some))
            .await
        {
            Err(_) => return Err(Error::AuthError(String::from("login timed out"))),
            Ok(Err(_)) => {
                return Err(Error::AuthError(String::from(
                    "login was abandoned before completing",
                )))
            }
            Ok(Ok(outcome)) => (*outcome).clone(),
        };

        outcome.unwrap_or_else(|| Err(Error::AuthError(String::from("login produced no result"))))
    }
}
