//! Lazy creation of the backend session.

use crate::api::Backend;
use crate::error::{Error, Result};
use crate::store::TaskStore;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Creates the backend session on first use and caches it in the store.
///
/// Concurrent callers are coalesced: creation runs under an async mutex,
/// so at most one `create_session` request is in flight and everyone
/// waiting on it gets the same id. A failed creation is retried by the
/// next caller.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    store: TaskStore,
    creating: Mutex<()>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn Backend>, store: TaskStore) -> Self {
        Self {
            backend,
            store,
            creating: Mutex::new(()),
        }
    }

    /// Return the ready session id, creating a session if needed.
    pub async fn ensure_session(&self) -> Result<String> {
        if let Some(id) = self.store.session().ready_id() {
            return Ok(id.to_string());
        }

        let _guard = self.creating.lock().await;
        // Someone else may have finished while we waited
        if let Some(id) = self.store.session().ready_id() {
            return Ok(id.to_string());
        }

        self.store.set_session_creating();
        match self.backend.create_session().await {
            Ok(resp) => {
                tracing::info!(session.id = %resp.session_id, "Session created");
                self.store.set_session_ready(resp.session_id.clone());
                Ok(resp.session_id)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(error = %message, "Session creation failed");
                self.store.set_session_error(message.clone());
                Err(Error::Session(message))
            }
        }
    }
}
