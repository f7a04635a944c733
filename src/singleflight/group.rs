use crate::error::{CacheError, Result};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// `None` while the call runs, then the shared outcome.
type Outcome<T> = Option<Result<T>>;

type CallMap<T> = DashMap<String, Arc<Call<T>>>;

struct Call<T> {
    tx: watch::Sender<Outcome<T>>,
}

pub struct CallGroup<T> {
    calls: Arc<CallMap<T>>,
}

/// Owned by the task running a call. Removes the entry when the task finishes or panics.
struct CallGuard<T> {
    calls: Arc<CallMap<T>>,
    key: String,
    call: Arc<Call<T>>,
}

impl<T> Drop for CallGuard<T> {
    fn drop(&mut self) {
        self.calls
            .remove_if(&self.key, |_, call| Arc::ptr_eq(call, &self.call));
    }
}

impl<T> CallGroup<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
        }
    }

    /// Runs `work` unless a call for `key` is already in flight, in which case
    /// this waits for that call and returns its outcome.
    ///
    /// The work runs in its own task, so it completes and reaches every waiter
    /// even if the caller that started it is dropped.
    pub async fn work<F, Fut>(&self, key: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        // The map guard must be released before the work is created or awaited.
        let (mut rx, started) = match self.calls.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!("Joined in-flight call for {}", key);
                (entry.get().tx.subscribe(), None)
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                let call = Arc::new(Call { tx });
                entry.insert(call.clone());
                let guard = CallGuard {
                    calls: self.calls.clone(),
                    key: key.to_string(),
                    call,
                };
                (rx, Some(guard))
            }
        };

        if let Some(guard) = started {
            let fut = work();
            tokio::spawn(async move {
                let result = fut.await;
                guard.call.tx.send_replace(Some(result));
                drop(guard);
            });
        }

        let result = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or_else(|| {
                Err(CacheError::Internal(format!(
                    "call for {} woke without an outcome",
                    key
                )))
            }),
            Err(_) => Err(CacheError::Unavailable(format!(
                "in-flight call for {} was abandoned",
                key
            ))),
        };
        result
    }

    /// Number of keys with a call currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }

    /// Callers currently parked on the in-flight call for `key`, including the
    /// one that started it.
    pub fn waiters(&self, key: &str) -> usize {
        self.calls
            .get(key)
            .map(|call| call.tx.receiver_count())
            .unwrap_or(0)
    }
}

impl<T> Default for CallGroup<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
