//! Async access to the shared local store.
//!
//! The recorder and the sync engine share one [`Store`] behind a tokio
//! mutex. Store calls are short and synchronous, so they run while the lock
//! is held and the guard is never kept across a network await.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use walklog_store::{DataStats, Store};
use walklog_types::LastPosition;

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};

pub type SharedStore = Arc<Mutex<Store>>;

pub fn shared(store: Store) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Make sure the store answers, reopening it once if it does not.
pub async fn ensure_available(store: &SharedStore) -> Result<()> {
    let mut guard = store.lock().await;
    if let Err(e) = guard.ping() {
        warn!("Local store not responding ({}), reopening", e);
        if let Err(e) = guard.reopen().and_then(|()| guard.ping()) {
            return Err(Error::StoreUnavailable(e));
        }
        info!("Local store reopened");
    }
    Ok(())
}

/// Delete all tracks and photos, keeping the last position.
///
/// Transient failures (another connection holding the database) are
/// retried with `retry`. Returns the position that was kept.
pub async fn wipe_local(
    store: &SharedStore,
    fallback: &LastPosition,
    retry: &RetryConfig,
) -> Result<LastPosition> {
    let kept = with_retry(retry, "wipe_local", || {
        let store = Arc::clone(store);
        let fallback = *fallback;
        async move {
            let mut guard = store.lock().await;
            Ok(guard.wipe(&fallback)?)
        }
    })
    .await?;
    info!("Local data cleared, kept position {:.5},{:.5}", kept.lat, kept.lng);
    Ok(kept)
}

pub async fn data_stats(store: &SharedStore) -> Result<DataStats> {
    Ok(store.lock().await.data_stats()?)
}
