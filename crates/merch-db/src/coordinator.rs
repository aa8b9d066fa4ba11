//! # Transaction Coordinator
//!
//! Runs a unit of work inside a transaction, commits it, and re-runs it from
//! the top when the database reports a serialization conflict.
//!
//! ## State Machine (one `run` call)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Idle ──► Attempting ──┬──► Committed                      (terminal)  │
//! │               ▲         │                                               │
//! │               │         ├──► RetryableConflict ─┐                       │
//! │               │         │    (serializable and  │                       │
//! │               │         │     budget remains)   │                       │
//! │               └─────────┼───────────────────────┘                       │
//! │                         │                                               │
//! │                         └──► Failed                         (terminal)  │
//! │                                                                         │
//! │  RetryableConflict never leaves this module. When the budget runs out   │
//! │  the caller sees LedgerError::Conflict.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Composition
//! When the caller already holds a transaction it passes it as `scope`; the
//! unit of work then runs on that transaction and no new one is opened. The
//! outer `run` owns commit, rollback and retry.
//!
//! ## Re-execution
//! The closure is called once per attempt and must re-read everything it
//! depends on. It must not perform side effects outside the transaction
//! (HTTP calls, messages), because an attempt may be discarded after they
//! happened.

use std::time::Duration;

use futures_util::future::BoxFuture;
use merch_core::{IsolationLevel, TxOptions};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerTx, TxStore};

/// Outcome of a single attempt.
enum Attempt<T> {
    Committed(T),
    /// Serialization failure; the transaction is already gone.
    Conflict(LedgerError),
    /// The attempt ran past its time bound and was dropped (rolled back).
    Expired,
    Failed(LedgerError),
}

/// Executes units of work against a [`TxStore`].
///
/// ## Usage
/// ```rust,ignore
/// let transfer = coordinator
///     .run(None, &TxOptions::money_moving(), move |tx| {
///         Box::pin(async move {
///             tx.apply_delta(from, -amount).await?;
///             tx.apply_delta(to, amount).await?;
///             tx.record_transfer(from, to, amount).await
///         })
///     })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Coordinator<S> {
    store: S,
}

impl<S: TxStore> Coordinator<S> {
    /// Creates a coordinator over `store`.
    pub fn new(store: S) -> Self {
        Coordinator { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs `work` atomically.
    ///
    /// ## Arguments
    /// * `scope` - an already open transaction to join, or `None`
    /// * `options` - isolation, retry budget, attempt timeout, deadline
    /// * `work` - the unit of work, called once per attempt
    ///
    /// ## Errors
    /// * errors from `work`, unchanged, when not retryable
    /// * `Conflict` - serialization failures exhausted the budget
    /// * `TimedOut` - the deadline passed, or every attempt timed out
    pub async fn run<T, F>(
        &self,
        scope: Option<&mut S::Tx>,
        options: &TxOptions,
        mut work: F,
    ) -> LedgerResult<T>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut S::Tx) -> BoxFuture<'t, LedgerResult<T>> + Send,
    {
        if let Some(tx) = scope {
            return work(tx).await;
        }

        let deadline = options.deadline.map(Instant::from_std);
        let max_attempts = options.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let remaining = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => {
                        warn!(attempt, "Deadline passed before attempt started");
                        return Err(LedgerError::TimedOut {
                            attempts: attempt - 1,
                        });
                    }
                },
                None => None,
            };

            let limit = shortest(options.attempt_timeout, remaining);

            debug!(attempt, isolation = %options.isolation, "Transaction attempt started");

            let retryable = match self.attempt(&mut work, options.isolation, limit).await {
                Attempt::Committed(value) => {
                    debug!(attempt, "Transaction committed");
                    return Ok(value);
                }
                Attempt::Failed(err) => {
                    debug!(attempt, error = %err, "Transaction failed");
                    return Err(err);
                }
                Attempt::Conflict(err) => {
                    if options.isolation != IsolationLevel::Serializable {
                        warn!(attempt, error = %err, "Serialization failure outside SERIALIZABLE, not retrying");
                        return Err(LedgerError::Conflict { attempts: attempt });
                    }
                    if attempt >= max_attempts {
                        warn!(attempt, "Retry budget exhausted on serialization conflicts");
                        return Err(LedgerError::Conflict { attempts: attempt });
                    }
                    err
                }
                Attempt::Expired => {
                    let deadline_hit = deadline.is_some_and(|d| Instant::now() >= d);
                    if deadline_hit || attempt >= max_attempts {
                        warn!(attempt, deadline_hit, "Transaction attempt timed out, giving up");
                        return Err(LedgerError::TimedOut { attempts: attempt });
                    }
                    LedgerError::TimedOut { attempts: attempt }
                }
            };

            debug!(attempt, reason = %retryable, "Retrying transaction");
        }
    }

    /// Runs one attempt: begin, work, commit.
    ///
    /// The time bound covers begin and the unit of work. Commit is not cut
    /// short once it has started, so a timeout never leaves the caller
    /// unsure whether the writes landed.
    async fn attempt<T, F>(
        &self,
        work: &mut F,
        isolation: IsolationLevel,
        limit: Option<Duration>,
    ) -> Attempt<T>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut S::Tx) -> BoxFuture<'t, LedgerResult<T>> + Send,
    {
        let unit = async {
            let mut tx = match self.store.begin(isolation).await {
                Ok(tx) => tx,
                Err(err) => return Err(err),
            };
            match work(&mut tx).await {
                Ok(value) => Ok((tx, value)),
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback failed");
                    }
                    Err(err)
                }
            }
        };

        let outcome = match limit {
            Some(limit) => match tokio::time::timeout(limit, unit).await {
                Ok(outcome) => outcome,
                Err(_) => return Attempt::Expired,
            },
            None => unit.await,
        };

        let (tx, value) = match outcome {
            Ok(pair) => pair,
            Err(err) => return classify(err),
        };

        match tx.commit().await {
            Ok(()) => Attempt::Committed(value),
            Err(err) => classify(err),
        }
    }
}

fn classify<T>(err: LedgerError) -> Attempt<T> {
    if err.is_serialization_failure() {
        Attempt::Conflict(err)
    } else {
        Attempt::Failed(err)
    }
}

fn shortest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
