//! Finalize a handed-back statement before it re-enters the idle collection.
//!
//! Steps: close the finished statement handle, commit the link, prepare the SQL again on the
//! same link. Only if all three succeed does the entry become idle. Any failure leaves the
//! link in an unknown state, so it is closed and never pooled again. That includes a driver
//! panic partway through. Nobody waits on this task; failures are logged.

use std::sync::Arc;

use super::{PoolEntry, PoolShared};
use crate::error::{DbError, DriverResultExt};
use crate::link::{Link, PreparedHandle};

/// Owns the entry while housekeeping runs. If the task unwinds or is dropped before the entry
/// was handed on, the link is retired from a fresh background task.
struct InFlight {
    shared: Arc<PoolShared>,
    entry: Option<PoolEntry>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        tracing::error!(
            label = self.shared.label(),
            statement_id = entry.id,
            "housekeeping interrupted; retiring the link"
        );
        let label = self.shared.label().to_string();
        let PoolEntry { id, mut link, .. } = entry;
        self.shared.provider.run_async(Box::pin(async move {
            close_retired(link.as_mut(), &label, id).await;
        }));
    }
}

pub(super) async fn run(shared: Arc<PoolShared>, entry: PoolEntry) {
    let id = entry.id;
    let mut in_flight = InFlight {
        shared: Arc::clone(&shared),
        entry: Some(entry),
    };

    let refreshed = match in_flight.entry.as_mut() {
        Some(entry) => refresh(&shared.sql, entry.link.as_mut(), entry.handle.as_mut()).await,
        None => return,
    };
    let Some(mut entry) = in_flight.entry.take() else {
        return;
    };

    match refreshed {
        Ok(fresh) => {
            tracing::trace!(label = shared.label(), statement_id = id, "pooled statement refreshed");
            entry.handle = fresh;
            shared.return_entry(entry).await;
        }
        Err(err) => {
            tracing::error!(
                label = shared.label(),
                statement_id = id,
                error = %err,
                "housekeeping failed; retiring the link"
            );
            close_retired(entry.link.as_mut(), shared.label(), id).await;
        }
    }
}

/// The statement handle is left alone: its state is unknown once a step has failed.
async fn close_retired(link: &mut dyn Link, label: &str, id: u64) {
    if let Err(err) = link.close().await {
        tracing::warn!(label, statement_id = id, error = %err, "closing the retired link failed");
    }
}

async fn refresh(
    sql: &str,
    link: &mut dyn Link,
    handle: &mut dyn PreparedHandle,
) -> Result<Box<dyn PreparedHandle>, DbError> {
    handle
        .close()
        .await
        .or_db(|| format!("Failed to close a prepared statement; SQL: {sql}"))?;
    link.commit()
        .await
        .or_db(|| "Failed to commit a database link".to_string())?;
    link.prepare_statement(sql)
        .await
        .or_db(|| format!("Failed to prepare a statement; SQL: {sql}"))
}
