use std::{future::Future, sync::Arc};

use log::warn;

use crate::{
    error::ReviewError,
    store::{Store, StoreSession},
};

/// Runs operations in atomic scopes and retries them on transaction conflicts.
pub struct TransactionCoordinator<S> {
    store: Arc<S>,
    max_attempts: u32,
}

impl<S: Store> TransactionCoordinator<S> {
    pub fn new(store: Arc<S>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Executes `operation` with a fresh session and commits its writes if it succeeds.
    ///
    /// The operation receives the session and hands it back together with its outcome. On
    /// failure the session is aborted and the error is returned. `TransactionConflict`,
    /// raised by the operation or by the commit, reruns the operation on a new session
    /// until `max_attempts` is reached.
    pub async fn run_atomic<T, F, Fut>(&self, mut operation: F) -> Result<T, ReviewError>
    where
        F: FnMut(S::Session) -> Fut,
        Fut: Future<Output = (S::Session, Result<T, ReviewError>)>,
    {
        let mut attempt = 1;
        loop {
            let session = self.store.begin().await?;
            let (mut session, outcome) = operation(session).await;
            let outcome = match outcome {
                Ok(value) => session.commit().await.map(|()| value),
                Err(error) => {
                    if let Err(abort_error) = session.abort().await {
                        warn!("Rolling back transaction failed: {}", abort_error);
                    }
                    Err(error)
                }
            };
            drop(session);
            match outcome {
                Err(ReviewError::TransactionConflict) if attempt < self.max_attempts => {
                    warn!(
                        "Transaction conflict on attempt {}/{}, retrying.",
                        attempt, self.max_attempts
                    );
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}
