//! Close-once guard for the session
//!
//! The first caller of [`Lifecycle::close_with`] starts the release sequence on its own task;
//! every caller, the first included, waits for that task and gets a clone of its result.
//! Dropping a waiting caller does not cancel the release.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::ShutdownError;

pub type CloseResult = Result<(), ShutdownError>;

const NOT_CLOSED: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotClosed,
    Closing,
    Closed,
}

pub struct Lifecycle {
    state: Arc<AtomicU8>,
    result_tx: Arc<watch::Sender<Option<CloseResult>>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (result_tx, _) = watch::channel(None);
        Self {
            state: Arc::new(AtomicU8::new(NOT_CLOSED)),
            result_tx: Arc::new(result_tx),
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            NOT_CLOSED => LifecycleState::NotClosed,
            CLOSING => LifecycleState::Closing,
            _ => LifecycleState::Closed,
        }
    }

    /// True as soon as shutdown has started
    pub fn is_closed(&self) -> bool {
        self.state() != LifecycleState::NotClosed
    }

    /// Run `release` unless another caller already has, then wait for its result
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn close_with<F, Fut>(&self, release: F) -> CloseResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CloseResult> + Send + 'static,
    {
        let won = self
            .state
            .compare_exchange(NOT_CLOSED, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if won {
            let release = tokio::spawn(release());
            let state = self.state.clone();
            let result_tx = self.result_tx.clone();

            tokio::spawn(async move {
                let result = release
                    .await
                    .unwrap_or_else(|e| Err(ShutdownError::Release(e.to_string())));
                state.store(CLOSED, Ordering::Release);
                result_tx.send_replace(Some(result));
            });
        }

        let mut result_rx = self.result_tx.subscribe();
        match result_rx.wait_for(Option::is_some).await {
            Ok(result) => result.clone().unwrap_or(Ok(())),
            Err(_) => Err(ShutdownError::Release("close result channel dropped".to_string())),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
