//! Structured task groups with a shared cancellation signal.
//!
//! A [`TaskGroup`] owns a set of tasks spawned on a [`JoinSet`] and a
//! [`CancellationToken`] they all observe. The first task to fail with
//! anything other than [`Error::Cancelled`] cancels the token, so its
//! siblings unwind, and that error is what [`TaskGroup::wait`] returns.
//!
//! Both the validator cluster and the load bot run their concurrent units
//! through this type.

use crate::error::{Error, Result};
use std::future::Future;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A set of tasks sharing one cancellation signal and one aggregated result.
#[derive(Debug)]
pub struct TaskGroup {
    name: &'static str,
    tasks: JoinSet<Result<()>>,
    cancel: CancellationToken,
}

impl TaskGroup {
    /// Create a group whose signal is a child of `parent`.
    ///
    /// Cancelling `parent` cancels the group; a failure inside the group
    /// never cancels `parent`.
    #[must_use]
    pub fn new(name: &'static str, parent: &CancellationToken) -> Self {
        Self {
            name,
            tasks: JoinSet::new(),
            cancel: parent.child_token(),
        }
    }

    /// The group's cancellation signal.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of tasks spawned and not yet joined.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the group has no outstanding tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn a task that receives the group's signal.
    ///
    /// If the task returns an error other than [`Error::Cancelled`] the
    /// signal is triggered before the task finishes, so siblings start
    /// unwinding right away.
    pub fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let fut = task(cancel.clone());
        self.tasks.spawn(async move {
            let result = fut.await;
            if let Err(ref e) = result {
                if !e.is_cancelled() {
                    cancel.cancel();
                }
            }
            result
        });
    }

    /// Wait for every task to finish.
    ///
    /// Returns the first failure in completion order. If no task failed but
    /// the signal was triggered (the caller cancelled the parent), returns
    /// [`Error::Cancelled`]. Returns `Ok(())` only when every task finished
    /// cleanly without cancellation.
    ///
    /// # Errors
    ///
    /// The first non-cancellation error of any task, a [`Error::Task`] if a
    /// task panicked, or [`Error::Cancelled`].
    pub async fn wait(mut self) -> Result<()> {
        let mut first: Option<Error> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(Error::Task(e.to_string())),
            };
            match outcome {
                Ok(()) => {}
                Err(Error::Cancelled) => {}
                Err(e) => {
                    if first.is_none() {
                        error!("{} group failed: {e}", self.name);
                        self.cancel.cancel();
                        first = Some(e);
                    } else {
                        debug!("{} group: suppressed later error: {e}", self.name);
                    }
                }
            }
        }

        match first {
            Some(e) => Err(e),
            None if self.cancel.is_cancelled() => Err(Error::Cancelled),
            None => Ok(()),
        }
    }
}

/// Sleep for `duration`, returning early with [`Error::Cancelled`] if `cancel` fires.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if the signal fires before the sleep completes.
pub async fn sleep_or_cancel(
    cancel: &CancellationToken,
    duration: std::time::Duration,
) -> Result<()> {
    tokio::select! {
        () = cancel.cancelled() => Err(Error::Cancelled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}
