//! Per-task status polling.
//!
//! Each polled task gets one spawned loop and one [`CancellationToken`].
//! The loop sleeps, fetches status, folds it into the [`TaskStore`], and
//! either stops on a terminal status or sleeps again for a jittered delay.
//! Delays come from `tokio::time`, so a paused test clock drives it.

use crate::api::{Backend, TaskId, TaskStatus};
use crate::store::{NotificationLevel, TaskStore, TaskUpdate};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use stormconf::PollingConfig;
use tokio_util::sync::CancellationToken;

/// Poll timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub first_delay: Duration,
    /// Inclusive.
    pub jitter_min: Duration,
    /// Exclusive.
    pub jitter_max: Duration,
}

impl PollSchedule {
    /// Uniform delay in `[jitter_min, jitter_max)`; `jitter_min` when the
    /// window is empty.
    pub fn next_delay(&self) -> Duration {
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        if max <= min {
            return self.jitter_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..max))
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSchedule {
    fn from(config: &PollingConfig) -> Self {
        Self {
            first_delay: Duration::from_millis(config.first_delay_ms),
            jitter_min: Duration::from_millis(config.jitter_min_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
        }
    }
}

struct PollHandle {
    token: CancellationToken,
    generation: u64,
}

#[derive(Default)]
struct Registry {
    handles: HashMap<TaskId, PollHandle>,
    next_generation: u64,
}

struct PollerInner {
    backend: Arc<dyn Backend>,
    store: TaskStore,
    schedule: PollSchedule,
    registry: Mutex<Registry>,
}

impl PollerInner {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop bookkeeping for `task_id` if it still belongs to `generation`.
    fn finish(&self, task_id: &TaskId, generation: u64) {
        let mut registry = self.registry();
        if registry
            .handles
            .get(task_id)
            .is_some_and(|h| h.generation == generation)
        {
            registry.handles.remove(task_id);
        }
    }
}

/// Owns every running poll loop.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<PollerInner>,
}

impl Poller {
    pub fn new(backend: Arc<dyn Backend>, store: TaskStore, schedule: PollSchedule) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                backend,
                store,
                schedule,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Start polling `task_id`. Returns false (and does nothing) if it is
    /// already being polled.
    pub fn start_polling(&self, task_id: TaskId) -> bool {
        let (token, generation) = {
            let mut registry = self.inner.registry();
            if registry.handles.contains_key(&task_id) {
                tracing::debug!(task.id = %task_id, "Already polling");
                return false;
            }
            let generation = registry.next_generation;
            registry.next_generation += 1;
            let token = CancellationToken::new();
            registry.handles.insert(
                task_id.clone(),
                PollHandle {
                    token: token.clone(),
                    generation,
                },
            );
            (token, generation)
        };

        tracing::debug!(task.id = %task_id, "Polling started");
        tokio::spawn(poll_loop(self.inner.clone(), task_id, token, generation));
        true
    }

    /// Stop polling `task_id`. Idempotent.
    ///
    /// A request already on the wire is not aborted, but its response is
    /// discarded.
    pub fn stop_polling(&self, task_id: &TaskId) {
        if let Some(handle) = self.inner.registry().handles.remove(task_id) {
            handle.token.cancel();
            tracing::debug!(task.id = %task_id, "Polling stopped");
        }
    }

    pub fn stop_all(&self) {
        let handles: Vec<(TaskId, PollHandle)> = self.inner.registry().handles.drain().collect();
        for (task_id, handle) in handles {
            handle.token.cancel();
            tracing::debug!(task.id = %task_id, "Polling stopped");
        }
    }

    pub fn is_polling(&self, task_id: &TaskId) -> bool {
        self.inner.registry().handles.contains_key(task_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.registry().handles.len()
    }
}

async fn poll_loop(inner: Arc<PollerInner>, task_id: TaskId, token: CancellationToken, generation: u64) {
    let mut delay = inner.schedule.first_delay;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let result = inner.backend.get_task(&task_id).await;

        if token.is_cancelled() {
            tracing::debug!(task.id = %task_id, "Discarding poll response for stopped task");
            return;
        }

        match result {
            Ok(resp) => {
                let status = resp.status;
                tracing::debug!(task.id = %task_id, task.status = %status, "Polled task");
                let task = inner.store.upsert(TaskUpdate::from_status(&resp));

                if status.is_terminal() {
                    match status {
                        TaskStatus::Succeeded => {
                            tracing::info!(
                                task.id = %task_id,
                                artifacts = task.artifacts.len(),
                                "Task succeeded"
                            );
                            if let Some(instrument) = task.instrument {
                                inner
                                    .store
                                    .set_active_task_for_instrument(instrument, task_id.clone());
                            }
                        }
                        TaskStatus::Failed => {
                            let message = task.error.clone().unwrap_or_else(|| "task failed".to_string());
                            tracing::error!(task.id = %task_id, task.error = %message, "Task failed");
                            inner.store.notify(NotificationLevel::Error, message);
                        }
                        _ => {
                            tracing::info!(task.id = %task_id, task.status = %status, "Task ended");
                        }
                    }
                    inner.finish(&task_id, generation);
                    return;
                }
            }
            Err(e) => {
                // Transient: the task is not marked failed and polling goes on
                tracing::warn!(task.id = %task_id, error = %e, "Poll failed, will retry");
            }
        }

        delay = inner.schedule.next_delay();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_in_window() {
        let schedule = PollSchedule::default();
        for _ in 0..200 {
            let d = schedule.next_delay();
            assert!(d >= Duration::from_millis(700));
            assert!(d < Duration::from_millis(1300));
        }
    }

    #[test]
    fn test_empty_window_uses_min() {
        let schedule = PollSchedule {
            first_delay: Duration::ZERO,
            jitter_min: Duration::from_millis(500),
            jitter_max: Duration::from_millis(500),
        };
        assert_eq!(schedule.next_delay(), Duration::from_millis(500));
    }
}
