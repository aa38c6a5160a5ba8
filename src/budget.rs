// Deadlines and cancellation threaded through every external call.
// A tick owns one root budget; each call narrows it with `child`.

use std::future::Future;
use thiserror::Error;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetExceeded {
    #[error("deadline exceeded")]
    TimedOut,
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CallBudget {
    deadline: Instant,
    cancel: CancellationToken,
}

impl CallBudget {
    pub fn new(within: Duration) -> Self {
        Self::with_token(within, CancellationToken::new())
    }

    pub fn with_token(within: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + within,
            cancel,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_spent(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Budget for one call: at most `max` from now and never past the parent's
    /// deadline. Cancelling the parent cancels the child, not the reverse.
    pub fn child(&self, max: Duration) -> Self {
        Self {
            deadline: self.deadline.min(Instant::now() + max),
            cancel: self.cancel.child_token(),
        }
    }

    /// Drive `fut` until it completes, the deadline passes, or the budget is cancelled.
    /// The future is dropped on either failure, which cancels any I/O it owns.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, BudgetExceeded> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BudgetExceeded::Cancelled),
            r = tokio::time::timeout_at(self.deadline, fut) => r.map_err(|_| BudgetExceeded::TimedOut),
        }
    }
}
