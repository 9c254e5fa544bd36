//! Request lifecycle middleware
//!
//! The layer publishes an empty per-request slot. The [`Db`](crate::Db)
//! extractor connects on first use and borrows the session for as long as
//! the handle lives; dropping the handle puts the session back. Once the
//! inner service has produced a response the layer commits or rolls back
//! and closes whatever the handler opened.
//!
//! Requests that never extract `Db` leave the slot empty and never touch
//! the pool. They still allocate the slot and box the response future;
//! apply the layer per route when that overhead matters.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use reqdb_core::{Database, Session};

use crate::error::{DatabaseError, PluginError};
use crate::plugin::Keyword;

/// Where the request session is.
#[derive(Debug, Default)]
enum SlotState {
    /// Nothing has connected yet.
    #[default]
    Vacant,
    /// A `Db` handle owns the session.
    Lent,
    /// The session is parked here between handles, or after the last one.
    Returned(Session),
}

/// Per-request session holder shared by the layer and the extractor.
pub(crate) struct Slot<K> {
    pub(crate) db: Database,
    state: Arc<Mutex<SlotState>>,
    _keyword: PhantomData<fn() -> K>,
}

impl<K> Clone for Slot<K> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            state: Arc::clone(&self.state),
            _keyword: PhantomData,
        }
    }
}

impl<K: Keyword> Slot<K> {
    fn new(db: Database) -> Self {
        Self {
            db,
            state: Arc::new(Mutex::new(SlotState::Vacant)),
            _keyword: PhantomData,
        }
    }

    // Never held across an await
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand the session to a new `Db`, connecting on first use.
    pub(crate) async fn lend(&self) -> Result<Session, PluginError> {
        let previous = std::mem::replace(&mut *self.lock(), SlotState::Lent);
        match previous {
            SlotState::Returned(session) => Ok(session),
            SlotState::Lent => Err(PluginError::OverlappingExtractors { keyword: K::NAME }),
            SlotState::Vacant => match self.db.connect().await {
                Ok(session) => {
                    tracing::debug!(keyword = K::NAME, "connected for request");
                    Ok(session)
                }
                Err(err) => {
                    *self.lock() = SlotState::Vacant;
                    Err(err.into())
                }
            },
        }
    }

    pub(crate) fn give_back(&self, session: Session) {
        *self.lock() = SlotState::Returned(session);
    }

    fn take(&self) -> Option<Session> {
        match std::mem::take(&mut *self.lock()) {
            SlotState::Returned(session) => Some(session),
            SlotState::Lent => {
                // The handle outlived the response; its session is dropped
                // with it and sqlx rolls the transaction back.
                tracing::warn!(keyword = K::NAME, "database handle still alive after response");
                None
            }
            SlotState::Vacant => None,
        }
    }
}

/// Tower layer produced by [`Plugin::layer`](crate::Plugin::layer).
pub struct PluginLayer<K> {
    db: Database,
    _keyword: PhantomData<fn() -> K>,
}

impl<K> PluginLayer<K> {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            _keyword: PhantomData,
        }
    }
}

impl<K> Clone for PluginLayer<K> {
    fn clone(&self) -> Self {
        Self::new(self.db.clone())
    }
}

impl<S, K> tower::Layer<S> for PluginLayer<K> {
    type Service = PluginService<S, K>;

    fn layer(&self, inner: S) -> Self::Service {
        PluginService {
            inner,
            db: self.db.clone(),
            _keyword: PhantomData,
        }
    }
}

/// Service wrapping a route with connect / commit-or-rollback / close.
pub struct PluginService<S, K> {
    inner: S,
    db: Database,
    _keyword: PhantomData<fn() -> K>,
}

impl<S: Clone, K> Clone for PluginService<S, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            db: self.db.clone(),
            _keyword: PhantomData,
        }
    }
}

impl<S, K> tower::Service<Request> for PluginService<S, K>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    K: Keyword,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let slot = Slot::<K>::new(self.db.clone());
        // A route-level plugin for the same keyword replaces this slot
        req.extensions_mut().insert(slot.clone());

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let autocommit = self.db.autocommit();

        Box::pin(async move {
            let response = inner.call(req).await?;
            match slot.take() {
                Some(session) => Ok(finish::<K>(session, response, autocommit).await),
                None => Ok(response),
            }
        })
    }
}

/// Resolve the request transaction based on the response and close.
async fn finish<K: Keyword>(
    mut session: Session,
    response: Response,
    autocommit: bool,
) -> Response {
    let status = response.status();
    let succeeded = status.is_success() || status.is_redirection();

    let response = if succeeded {
        if !autocommit {
            response
        } else {
            match session.commit().await {
                Ok(()) => response,
                Err(err) => {
                    if let Err(rollback) = session.rollback().await {
                        tracing::warn!(
                            keyword = K::NAME,
                            error = %rollback,
                            "rollback after failed commit failed"
                        );
                    }
                    DatabaseError::from(err).into_response()
                }
            }
        }
    } else {
        tracing::debug!(keyword = K::NAME, %status, "handler failed, rolling back");
        if let Err(err) = session.rollback().await {
            tracing::error!(keyword = K::NAME, error = %err, "rollback failed");
        }
        response
    };

    if let Err(err) = session.close().await {
        tracing::warn!(keyword = K::NAME, error = %err, "closing database session failed");
    }
    response
}
