use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;

use super::tool::ToolError;

/// A media URL resolved for one broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub url: String,
    pub resolved_at: DateTime<Utc>,
}

/**
    Resolved media URLs keyed by broadcast id.

    Keying by broadcast rather than channel means a URL from a previous
    broadcast of the same channel can never be served. Concurrent requests
    for the same broadcast share a single resolution.
*/
pub struct ResolutionCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<ResolvedStream>>>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, broadcast_id: &str) -> Option<ResolvedStream> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(broadcast_id)
            .and_then(|cell| cell.get().cloned())
    }

    /**
        Return the cached URL for `broadcast_id`, or run `resolve` to get one.

        Callers arriving while a resolution is in flight wait for it instead
        of starting their own. A failed resolution stores nothing.
    */
    pub async fn get_or_resolve<F, Fut>(
        &self,
        broadcast_id: &str,
        resolve: F,
    ) -> Result<(ResolvedStream, bool), ToolError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ToolError>>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(broadcast_id.to_string()).or_default())
        };

        let mut resolved_here = false;
        let result = cell
            .get_or_try_init(|| async {
                resolved_here = true;
                let url = resolve().await?;
                Ok(ResolvedStream {
                    url,
                    resolved_at: crate::util::time::now(),
                })
            })
            .await
            .cloned();

        if result.is_err() {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(current) = entries.get(broadcast_id)
                && Arc::ptr_eq(current, &cell)
                && current.get().is_none()
            {
                entries.remove(broadcast_id);
            }
        }

        result.map(|stream| (stream, !resolved_here))
    }

    pub fn remove(&self, broadcast_id: &str) -> Option<ResolvedStream> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(broadcast_id)
            .and_then(|cell| cell.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}
