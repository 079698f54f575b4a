//! Completion handles for "wait for N updates".
//!
//! A [`VariableState`](crate::VariableState) keeps one [`Waiter`] per
//! outstanding `next` call. The caller holds the matching [`UpdateWait`],
//! which resolves with the value written by the assignment that reached the
//! target count.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use revar_core::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, RuntimeError};

/// Variable-side half of a pending wait.
#[derive(Debug)]
pub(crate) struct Waiter {
    pub(crate) target: u64,
    tx: oneshot::Sender<Value>,
}

impl Waiter {
    /// Whether the caller dropped its [`UpdateWait`].
    pub(crate) fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Deliver the value. A caller that already went away is ignored.
    pub(crate) fn resolve(self, value: Value) {
        let _ = self.tx.send(value);
    }
}

/// Create a linked waiter / wait pair for `name` targeting `target` updates.
pub(crate) fn pending(name: &str, target: u64) -> (Waiter, UpdateWait) {
    let (tx, rx) = oneshot::channel();
    (
        Waiter { target, tx },
        UpdateWait {
            name: name.to_owned(),
            state: WaitState::Pending(rx),
        },
    )
}

#[derive(Debug)]
enum WaitState {
    Ready(Option<Value>),
    Pending(oneshot::Receiver<Value>),
}

/// Future returned by `next`.
///
/// Resolves exactly once, with the value set by the assignment that brought
/// the variable's update count to the requested target. Dropping it cancels
/// the wait. If the variable itself is dropped first the wait fails with
/// [`RuntimeError::WaitAbandoned`].
#[derive(Debug)]
#[must_use = "an UpdateWait does nothing unless awaited"]
pub struct UpdateWait {
    name: String,
    state: WaitState,
}

impl UpdateWait {
    /// A wait that is already satisfied.
    pub(crate) fn ready(name: &str, value: Value) -> Self {
        Self {
            name: name.to_owned(),
            state: WaitState::Ready(Some(value)),
        }
    }

    /// Name of the variable being waited on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the wait was satisfied at creation.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, WaitState::Ready(_))
    }

    /// Wait at most `limit`, failing with [`RuntimeError::Timeout`].
    pub async fn timeout(self, limit: Duration) -> Result<Value> {
        let name = self.name.clone();
        tokio::time::timeout(limit, self)
            .await
            .unwrap_or(Err(RuntimeError::Timeout(name)))
    }

    /// Wait until the update arrives or `cancel` fires, failing with
    /// [`RuntimeError::Cancelled`] in the latter case.
    pub async fn until(self, cancel: &CancellationToken) -> Result<Value> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RuntimeError::Cancelled),
            result = self => result,
        }
    }
}

impl Future for UpdateWait {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            WaitState::Ready(value) => Poll::Ready(Ok(value.take().unwrap_or_default())),
            WaitState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.map_err(|_| RuntimeError::WaitAbandoned(this.name.clone()))),
        }
    }
}
