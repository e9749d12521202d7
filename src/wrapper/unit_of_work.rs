use std::sync::Arc;

use crate::error::{DbError, DriverResultExt};
use crate::link::{Link, LinkProvider};

/// One transaction on one freshly acquired link.
///
/// `ACQUIRE → work → {COMMIT | ROLLBACK} → RELEASE`. [`finish`](Self::finish) commits or
/// rolls back depending on the outcome of the work and then closes the link, whatever
/// happened before. If the unit is dropped unfinished (the future was cancelled or the work
/// panicked) the link is rolled back and closed on the provider's background context.
pub struct UnitOfWork {
    link: Option<Box<dyn Link>>,
    /// commit or rollback has completed; only the close is left
    settled: bool,
    provider: Arc<dyn LinkProvider>,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("open", &self.link.is_some())
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

impl UnitOfWork {
    /// Acquire a fresh link.
    ///
    /// # Errors
    /// Returns [`DbError::Operation`] if the provider fails, or [`DbError::ConfigError`] if the
    /// link cannot execute statements (the link is closed before returning).
    pub async fn begin(provider: &Arc<dyn LinkProvider>) -> Result<Self, DbError> {
        let mut link = provider
            .new_link()
            .await
            .or_db(|| "Failed to obtain a database link".to_string())?;
        if !link.supports_statements() {
            if let Err(err) = link.close().await {
                tracing::debug!(error = %err, "closing unsupported link failed");
            }
            return Err(DbError::config(
                "Cannot execute SQL statement: the data link does not support statement execution",
            ));
        }
        Ok(Self {
            link: Some(link),
            settled: false,
            provider: Arc::clone(provider),
        })
    }

    /// The link this unit runs on.
    ///
    /// # Errors
    /// Returns [`DbError::ConfigError`] if the unit has already been finished.
    pub fn link(&mut self) -> Result<&mut dyn Link, DbError> {
        match self.link.as_deref_mut() {
            Some(link) => Ok(link),
            None => Err(DbError::config("unit of work already finished")),
        }
    }

    /// Commit if `outcome` is `Ok`, roll back otherwise, then close the link.
    ///
    /// The link stays owned by the unit until it is closed, so cancelling this future at any
    /// await still releases it: before the commit or rollback has completed the link is rolled
    /// back and closed in the background, afterwards it is only closed.
    ///
    /// # Errors
    /// A failed rollback replaces the error that caused it. A failed commit is returned
    /// instead of the value. A failure to close the link is logged, not returned.
    pub async fn finish<R>(mut self, outcome: Result<R, DbError>) -> Result<R, DbError> {
        let Some(link) = self.link.as_deref_mut() else {
            return outcome;
        };

        let result = match outcome {
            Ok(value) => link
                .commit()
                .await
                .or_db(|| "Failed to commit a database link".to_string())
                .map(|()| value),
            Err(err) => match link.rollback().await {
                Ok(()) => Err(err),
                Err(rollback_err) => {
                    tracing::error!(error = %err, "rollback failed while handling an error");
                    Err(DbError::operation(
                        "Failed to roll back a database link",
                        rollback_err,
                    ))
                }
            },
        };
        self.settled = true;

        self.release().await;
        result
    }

    /// # Errors
    /// Returns [`DbError::Operation`] if the commit fails.
    pub async fn commit(self) -> Result<(), DbError> {
        self.finish(Ok(())).await
    }

    /// Roll back and close the link without a triggering error.
    ///
    /// # Errors
    /// Returns [`DbError::Operation`] if the rollback fails.
    pub async fn rollback(mut self) -> Result<(), DbError> {
        let Some(link) = self.link.as_deref_mut() else {
            return Ok(());
        };
        let result = link
            .rollback()
            .await
            .or_db(|| "Failed to roll back a database link".to_string());
        self.settled = true;
        self.release().await;
        result
    }

    /// Close the link, giving it up only once the close has completed.
    async fn release(&mut self) {
        if let Some(link) = self.link.as_deref_mut() {
            if let Err(err) = link.close().await {
                tracing::warn!(error = %err, "closing the database link failed");
            }
        }
        self.link = None;
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        let Some(mut link) = self.link.take() else {
            return;
        };
        let settled = self.settled;
        if settled {
            tracing::warn!("unit of work dropped while closing its link; closing in the background");
        } else {
            tracing::warn!("unit of work dropped before finishing; rolling back in the background");
        }
        self.provider.run_async(Box::pin(async move {
            if !settled {
                if let Err(err) = link.rollback().await {
                    tracing::warn!(error = %err, "background rollback of an abandoned unit failed");
                }
            }
            if let Err(err) = link.close().await {
                tracing::warn!(error = %err, "closing the link of an abandoned unit failed");
            }
        }));
    }
}
