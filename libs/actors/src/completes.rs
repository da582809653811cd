//! Single-shot result channels for ask-style messages.
//!
//! [`completes`] returns a pair: the [`CompletesEventually`] half travels
//! inside the message to the actor, the [`Completes`] half goes back to the
//! caller. The caller can `.await` it or block with a timeout.

use crate::error::{ActorError, Result};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// Caller side of a result channel
#[derive(Debug)]
pub struct Completes<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

/// Actor side of a result channel
#[derive(Debug)]
pub struct CompletesEventually<T> {
    sender: oneshot::Sender<Result<T>>,
}

/// Create a connected result channel
pub fn completes<T>() -> (CompletesEventually<T>, Completes<T>) {
    let (sender, receiver) = oneshot::channel();
    (CompletesEventually { sender }, Completes { receiver })
}

impl<T> CompletesEventually<T> {
    /// Complete with a value; returns false when the caller went away
    pub fn with(self, value: T) -> bool {
        self.sender.send(Ok(value)).is_ok()
    }

    /// Complete with an error; returns false when the caller went away
    pub fn fail(self, error: ActorError) -> bool {
        self.sender.send(Err(error)).is_ok()
    }

    /// Check whether the caller still waits for the outcome
    pub fn is_awaited(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl<T> Completes<T> {
    /// Already completed outcome, without waiting
    pub fn try_outcome(&mut self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(ActorError::abandoned("completes")))
            }
        }
    }

    /// Block the calling thread until the outcome arrives or `timeout` passes
    ///
    /// Must not be called from inside an async runtime; `.await` the value there.
    pub fn await_timeout(self, timeout: Duration) -> Result<T> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| ActorError::failure_with_source("failed to build completes runtime", e))?;

        runtime
            .block_on(async { tokio::time::timeout(timeout, self).await })
            .map_err(|_| ActorError::timeout("completes", timeout.as_millis() as u64))?
    }
}

impl<T> Future for Completes<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ActorError::abandoned("completes"))),
            Poll::Pending => Poll::Pending,
        }
    }
}
