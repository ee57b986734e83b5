use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{error, warn};

use crate::error::XError;

use super::ActionFuture;

/// The eventual result of a dispatch.
///
/// The action runs whether or not the `Deferred` is awaited: dispatching
/// inside a tokio runtime spawns it, dispatching outside one drives it to
/// completion before `dispatch` returns. Dispatching from inside another
/// blocking executor (an action awaiting a nested dispatch) keeps the future
/// and runs it when awaited.
pub struct Deferred {
    state: DeferredState,
}

enum DeferredState {
    Ready(Option<Result<Value, XError>>),
    Lazy {
        name: String,
        future: ActionFuture,
    },
    Pending {
        name: String,
        rx: oneshot::Receiver<Result<Value, XError>>,
    },
}

impl Deferred {
    /// An already-settled result.
    pub fn ready(result: Result<Value, XError>) -> Self {
        Self {
            state: DeferredState::Ready(Some(result)),
        }
    }

    /// Start `future` now and return a handle to its result.
    pub fn spawn(name: &str, future: ActionFuture) -> Self {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = oneshot::channel();
                let action = name.to_string();
                handle.spawn(async move {
                    let result = future.await;
                    if let Err(Err(err)) = tx.send(result) {
                        error!(action = %action, error = %err, "detached action failed");
                    }
                });
                Self {
                    state: DeferredState::Pending {
                        name: name.to_string(),
                        rx,
                    },
                }
            }
            Err(_) => match futures::executor::enter() {
                Ok(enter) => {
                    drop(enter);
                    Self::ready(futures::executor::block_on(future))
                }
                Err(_) => Self {
                    state: DeferredState::Lazy {
                        name: name.to_string(),
                        future,
                    },
                },
            },
        }
    }

    /// Whether the result is already available without polling.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, DeferredState::Ready(_))
    }

    /// Stop caring about the result.
    ///
    /// An error that is already known is returned. A spawned action keeps
    /// running and logs its own failure.
    pub fn detach(self) -> Result<(), XError> {
        match self.state {
            DeferredState::Ready(Some(result)) => result.map(|_| ()),
            DeferredState::Ready(None) | DeferredState::Pending { .. } => Ok(()),
            DeferredState::Lazy { name, future } => match future.now_or_never() {
                Some(result) => result.map(|_| ()),
                None => {
                    warn!(action = %name, "action detached before completing outside a runtime");
                    Ok(())
                }
            },
        }
    }
}

impl Future for Deferred {
    type Output = Result<Value, XError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            DeferredState::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(XError::ActionDropped("<consumed>".to_string()))),
            ),
            DeferredState::Lazy { future, .. } => future.as_mut().poll(cx),
            DeferredState::Pending { name, rx } => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or_else(|_| Err(XError::ActionDropped(name.clone())))),
        }
    }
}
