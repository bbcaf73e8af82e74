//! Single-flight token refresh.
//!
//! The first request that hits a 401 starts a refresh cycle; every request
//! that fails while the cycle is running is parked in a FIFO queue. When the
//! cycle settles the queue is drained in arrival order, with the request
//! that started the cycle last:
//!
//! - success: each request is replayed with the new access token
//! - failure: each request is rejected with [`AuthError::SessionExpired`],
//!   the store is cleared and the navigator is sent to the login page once
//!
//! A proactive refresh ([`RefreshCoordinator::try_refresh`]) shares the same
//! flight but its failure is not fatal: the session is kept, nothing is
//! redirected and parked requests get the refresh error back.
//!
//! At most one backend refresh call is outstanding. The cycle runs in its own
//! task, so a caller that stops waiting cannot leave the coordinator stuck in
//! the refreshing state. A logout detaches the running call; requests parked
//! after it get a fresh cycle once that call returns.

use crate::backend::AuthBackend;
use crate::capabilities::CapabilityModel;
use crate::expiry::RefreshTrigger;
use crate::navigation::{Location, Navigator};
use crate::session::{Session, SessionStore};
use crate::tenant::TenantResolver;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Outcome of a refresh cycle, reported to the session callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent<C> {
    Refreshed(Session<C>),
    Expired { redirect: String },
}

pub type SessionCallback<C> = Arc<dyn Fn(SessionEvent<C>) + Send + Sync>;

/// A parked request. Called once with the new token or the rejection.
type Replay = Box<dyn FnOnce(AuthResult<String>) -> BoxFuture<'static, ()> + Send>;

/// How a failed cycle is handled. Decided by whoever starts the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// A request was rejected with 401; failure ends the session.
    Required,
    /// Ahead of expiry; failure is only logged.
    Proactive,
}

struct Parked {
    mode: Mode,
    replay: Replay,
}

struct Cycle {
    epoch: u64,
    mode: Mode,
    own: Replay,
}

#[derive(Default)]
struct RefreshState {
    /// A backend refresh call is outstanding.
    in_flight: bool,
    queue: VecDeque<Parked>,
    /// Bumped by logout so a cycle that settles afterwards is ignored.
    epoch: u64,
}

enum Settled<C> {
    /// Logout happened during the call. Carries the cycle owed to requests
    /// parked since then.
    Superseded(Option<Cycle>),
    Refreshed(Vec<Replay>, Session<C>),
    Expired(Vec<Replay>, AuthError, String),
    Failed(Vec<Replay>, AuthError),
}

struct Inner<C: CapabilityModel> {
    backend: Arc<dyn AuthBackend<C>>,
    store: Arc<SessionStore<C>>,
    resolver: TenantResolver,
    location: Arc<Location>,
    navigator: Arc<dyn Navigator>,
    state: Mutex<RefreshState>,
    callback: RwLock<Option<SessionCallback<C>>>,
}

pub struct RefreshCoordinator<C: CapabilityModel> {
    inner: Arc<Inner<C>>,
}

impl<C: CapabilityModel> Clone for RefreshCoordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: CapabilityModel> RefreshCoordinator<C> {
    pub fn new(
        backend: Arc<dyn AuthBackend<C>>,
        store: Arc<SessionStore<C>>,
        resolver: TenantResolver,
        location: Arc<Location>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                resolver,
                location,
                navigator,
                state: Mutex::new(RefreshState::default()),
                callback: RwLock::new(None),
            }),
        }
    }

    pub fn set_session_callback(&self, callback: SessionCallback<C>) {
        *self.inner.callback.write() = Some(callback);
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    /// Requests parked behind the running cycle.
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Park a request that failed with 401 and replay it through `retry` once
    /// a refresh settles. Starts a refresh cycle if none is running.
    pub async fn handle_unauthenticated<T, F, Fut>(&self, retry: F) -> AuthResult<T>
    where
        T: Send + 'static,
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = AuthResult<T>> + Send + 'static,
    {
        self.enqueue(Mode::Required, retry).await
    }

    /// Refresh now, joining a running cycle if there is one. A failure ends
    /// the session.
    pub async fn refresh_now(&self) -> AuthResult<()> {
        self.enqueue(Mode::Required, |_token| async { Ok(()) })
            .await
    }

    /// Refresh ahead of expiry, joining a running cycle if there is one. A
    /// failure of a cycle started here leaves the session in place.
    pub async fn try_refresh(&self) -> AuthResult<()> {
        self.enqueue(Mode::Proactive, |_token| async { Ok(()) })
            .await
    }

    async fn enqueue<T, F, Fut>(&self, mode: Mode, retry: F) -> AuthResult<T>
    where
        T: Send + 'static,
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = AuthResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<AuthResult<T>>();
        let replay: Replay = Box::new(move |token: AuthResult<String>| match token {
            Ok(token) => {
                let request = retry(token);
                async move {
                    let _ = tx.send(request.await);
                }
                .boxed()
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                async {}.boxed()
            }
        });

        let leader = {
            let mut state = self.inner.state.lock();
            if state.in_flight {
                state.queue.push_back(Parked { mode, replay });
                debug!(queued = state.queue.len(), ?mode, "Request parked behind running refresh");
                None
            } else {
                state.in_flight = true;
                Some(Cycle {
                    epoch: state.epoch,
                    mode,
                    own: replay,
                })
            }
        };

        if let Some(cycle) = leader {
            let inner = self.inner.clone();
            tokio::spawn(inner.run_cycle(cycle));
        }

        rx.await.unwrap_or(Err(AuthError::SessionExpired))
    }

    /// Reject every parked request with [`AuthError::NotLoggedIn`] and
    /// detach the running cycle, if any. Used on logout.
    ///
    /// The detached backend call still counts as outstanding; requests that
    /// arrive before it returns wait for it and then get a cycle of their own.
    pub fn reject_pending(&self) -> usize {
        let queue = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            std::mem::take(&mut state.queue)
        };

        let rejected = queue.len();
        for parked in queue {
            drop((parked.replay)(Err(AuthError::NotLoggedIn)));
        }
        if rejected > 0 {
            debug!(rejected, "Rejected parked requests");
        }
        rejected
    }
}

impl<C: CapabilityModel> Inner<C> {
    async fn run_cycle(self: Arc<Self>, first: Cycle) {
        let mut next = Some(first);

        while let Some(Cycle { epoch, mode, own }) = next.take() {
            info!(?mode, "Refreshing access token");

            let outcome = self
                .backend
                .refresh_token()
                .await
                .and_then(|grant| Session::new(grant.token, grant.principal));

            match self.settle(epoch, mode, outcome) {
                Settled::Superseded(follow_up) => {
                    debug!(
                        follow_up = follow_up.is_some(),
                        "Discarding refresh result after logout"
                    );
                    drop(own(Err(AuthError::NotLoggedIn)));
                    next = follow_up;
                }
                Settled::Refreshed(queue, session) => {
                    info!(
                        user_id = %session.principal().id,
                        expires_at = %session.expires_at(),
                        replayed = queue.len() + 1,
                        "Access token refreshed"
                    );
                    let token = session.access_token().to_string();
                    let replays: Vec<_> = queue
                        .into_iter()
                        .chain(std::iter::once(own))
                        .map(|replay| replay(Ok(token.clone())))
                        .collect();

                    self.emit(SessionEvent::Refreshed(session));
                    join_all(replays).await;
                }
                Settled::Expired(queue, e, redirect) => {
                    warn!(error = %e, rejected = queue.len() + 1, "Token refresh failed, session cleared");
                    for replay in queue.into_iter().chain(std::iter::once(own)) {
                        drop(replay(Err(AuthError::SessionExpired)));
                    }

                    self.navigator.go_to(&redirect);
                    self.emit(SessionEvent::Expired { redirect });
                }
                Settled::Failed(queue, e) => {
                    warn!(error = %e, rejected = queue.len() + 1, "Proactive token refresh failed, session kept");
                    for replay in queue.into_iter().chain(std::iter::once(own)) {
                        drop(replay(Err(e.clone())));
                    }
                }
            }
        }
    }

    /// Decide what a finished backend call means. The store is only touched
    /// while the cycle is still current, so a logout that raced the call
    /// cannot be undone here.
    fn settle(&self, epoch: u64, mode: Mode, outcome: AuthResult<Session<C>>) -> Settled<C> {
        let mut state = self.state.lock();

        if state.epoch != epoch {
            let current = state.epoch;
            let follow_up = state.queue.pop_front().map(|parked| Cycle {
                epoch: current,
                mode: parked.mode,
                own: parked.replay,
            });
            if follow_up.is_none() {
                state.in_flight = false;
            }
            return Settled::Superseded(follow_up);
        }

        state.in_flight = false;
        let queue: Vec<Replay> = std::mem::take(&mut state.queue)
            .into_iter()
            .map(|parked| parked.replay)
            .collect();

        let outcome = match outcome {
            Ok(session) => self.store.save(&session).map(|()| session),
            Err(e) => Err(e),
        };

        match (outcome, mode) {
            (Ok(session), _) => Settled::Refreshed(queue, session),
            (Err(e), Mode::Proactive) => Settled::Failed(queue, e),
            (Err(e), Mode::Required) => {
                let redirect = self
                    .resolver
                    .resolve(&self.location.current())
                    .login_path(self.store.branding_hint().as_deref());
                if let Err(clear_err) = self.store.clear() {
                    warn!(error = %clear_err, "Failed to clear session after refresh failure");
                }
                Settled::Expired(queue, e, redirect)
            }
        }
    }

    fn emit(&self, event: SessionEvent<C>) {
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

#[async_trait]
impl<C: CapabilityModel> RefreshTrigger for RefreshCoordinator<C> {
    async fn trigger_refresh(&self) -> AuthResult<()> {
        self.try_refresh().await
    }
}
