//! Task and artifact state, shared across the orchestrator, the poll loop
//! and whatever is presenting results.
//!
//! [`TaskStore`] is a cheap cloneable handle. Every mutation happens under a
//! single lock and is published on a broadcast channel after the lock is
//! released, so subscribers only ever see whole records.

use crate::api::{Artifact, Instrument, TaskId, TaskKind, TaskStatus, TaskStatusResponse};
use chrono::{DateTime, Utc};
use notespan::BarRange;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Creating,
    Ready,
    Error,
}

/// The process-wide backend session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub id: Option<String>,
    pub status: SessionStatus,
    pub error: Option<String>,
}

impl SessionState {
    pub fn ready_id(&self) -> Option<&str> {
        match self.status {
            SessionStatus::Ready => self.id.as_deref(),
            _ => None,
        }
    }
}

/// A submitted task as last reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub session_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub artifacts: Vec<Artifact>,
    pub instrument: Option<Instrument>,
    /// Bar count the request was built for.
    pub input_bars: Option<u32>,
    pub input_chords: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial task record for [`TaskStore::upsert`].
///
/// `status`, `artifacts` and the input fields only overwrite when set;
/// `error` always overwrites.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub session_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub error: Option<String>,
    pub artifacts: Option<Vec<Artifact>>,
    pub instrument: Option<Instrument>,
    pub input_bars: Option<u32>,
    pub input_chords: Option<Vec<String>>,
}

impl TaskUpdate {
    pub fn new(task_id: TaskId, kind: TaskKind) -> Self {
        Self {
            task_id,
            kind,
            session_id: None,
            status: None,
            error: None,
            artifacts: None,
            instrument: None,
            input_bars: None,
            input_chords: None,
        }
    }

    pub fn from_status(resp: &TaskStatusResponse) -> Self {
        Self {
            session_id: Some(resp.session_id.clone()),
            status: Some(resp.status),
            error: resp.error_message(),
            artifacts: Some(resp.artifacts.clone()),
            instrument: resp.instrument(),
            ..Self::new(resp.task_id.clone(), resp.kind)
        }
    }
}

/// Transient per-artifact progress, cleared by whoever set it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactOpState {
    pub downloading: bool,
    pub importing: bool,
    pub error: Option<String>,
}

impl ArtifactOpState {
    pub fn downloading() -> Self {
        Self {
            downloading: true,
            ..Self::default()
        }
    }

    pub fn importing() -> Self {
        Self {
            importing: true,
            ..Self::default()
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            error: Some(msg.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// A message meant for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// What subscribers receive.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    SessionChanged(SessionState),
    TaskUpserted(Task),
    ActiveTaskChanged {
        instrument: Option<Instrument>,
        task_id: TaskId,
    },
    SelectedArtifactChanged {
        instrument: Instrument,
        artifact_id: Option<String>,
    },
    ArtifactOpChanged {
        artifact_id: String,
        op: Option<ArtifactOpState>,
    },
    Notification(Notification),
}

#[derive(Default)]
struct StoreInner {
    session: SessionState,
    tasks: HashMap<TaskId, Task>,
    /// Most recent first.
    order: Vec<TaskId>,
    active_task: Option<TaskId>,
    active_by_instrument: HashMap<Instrument, TaskId>,
    selected_artifact: HashMap<Instrument, String>,
    artifact_ops: HashMap<String, ArtifactOpState>,
    last_selection: Option<BarRange>,
}

/// Shared task/artifact registry.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<RwLock<StoreInner>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // --- session ---

    pub fn session(&self) -> SessionState {
        self.read().session.clone()
    }

    pub fn set_session_creating(&self) {
        let state = {
            let mut inner = self.write();
            inner.session.status = SessionStatus::Creating;
            inner.session.error = None;
            inner.session.clone()
        };
        self.publish(StoreEvent::SessionChanged(state));
    }

    pub fn set_session_ready(&self, session_id: String) {
        let state = {
            let mut inner = self.write();
            inner.session = SessionState {
                id: Some(session_id),
                status: SessionStatus::Ready,
                error: None,
            };
            inner.session.clone()
        };
        self.publish(StoreEvent::SessionChanged(state));
    }

    pub fn set_session_error(&self, message: String) {
        let state = {
            let mut inner = self.write();
            inner.session.status = SessionStatus::Error;
            inner.session.error = Some(message);
            inner.session.clone()
        };
        self.publish(StoreEvent::SessionChanged(state));
    }

    // --- tasks ---

    /// Insert or merge a task record and return the result.
    ///
    /// New ids go to the front of the recency list. Existing records keep
    /// their place and creation time; `updated_at` is always refreshed.
    pub fn upsert(&self, update: TaskUpdate) -> Task {
        let now = Utc::now();
        let task = {
            let mut inner = self.write();
            let task = match inner.tasks.get(&update.task_id) {
                Some(prev) => {
                    let mut task = prev.clone();
                    task.kind = update.kind;
                    if let Some(session_id) = update.session_id {
                        task.session_id = session_id;
                    }
                    if let Some(status) = update.status {
                        task.status = status;
                    }
                    task.error = update.error;
                    if let Some(artifacts) = update.artifacts {
                        task.artifacts = artifacts;
                    }
                    if update.instrument.is_some() {
                        task.instrument = update.instrument;
                    }
                    if update.input_bars.is_some() {
                        task.input_bars = update.input_bars;
                    }
                    if update.input_chords.is_some() {
                        task.input_chords = update.input_chords;
                    }
                    task.updated_at = now;
                    task
                }
                None => {
                    inner.order.insert(0, update.task_id.clone());
                    Task {
                        task_id: update.task_id.clone(),
                        session_id: update.session_id.unwrap_or_default(),
                        kind: update.kind,
                        status: update.status.unwrap_or(TaskStatus::Queued),
                        error: update.error,
                        artifacts: update.artifacts.unwrap_or_default(),
                        instrument: update.instrument,
                        input_bars: update.input_bars,
                        input_chords: update.input_chords,
                        created_at: now,
                        updated_at: now,
                    }
                }
            };
            inner.tasks.insert(task.task_id.clone(), task.clone());
            task
        };

        tracing::debug!(
            task.id = %task.task_id,
            task.kind = %task.kind,
            task.status = %task.status,
            artifacts = task.artifacts.len(),
            "Task upserted"
        );
        self.publish(StoreEvent::TaskUpserted(task.clone()));
        task
    }

    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.read().tasks.get(task_id).cloned()
    }

    pub fn tasks_recent_first(&self) -> Vec<Task> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    pub fn set_active_task(&self, task_id: TaskId) {
        self.write().active_task = Some(task_id.clone());
        self.publish(StoreEvent::ActiveTaskChanged {
            instrument: None,
            task_id,
        });
    }

    /// The most recently submitted task.
    pub fn active_task(&self) -> Option<Task> {
        let inner = self.read();
        inner
            .active_task
            .as_ref()
            .and_then(|id| inner.tasks.get(id).cloned())
    }

    pub fn set_active_task_for_instrument(&self, instrument: Instrument, task_id: TaskId) {
        self.write()
            .active_by_instrument
            .insert(instrument, task_id.clone());
        self.publish(StoreEvent::ActiveTaskChanged {
            instrument: Some(instrument),
            task_id,
        });
    }

    pub fn active_task_id_for(&self, instrument: Instrument) -> Option<TaskId> {
        self.read().active_by_instrument.get(&instrument).cloned()
    }

    pub fn active_task_for(&self, instrument: Instrument) -> Option<Task> {
        let inner = self.read();
        inner
            .active_by_instrument
            .get(&instrument)
            .and_then(|id| inner.tasks.get(id).cloned())
    }

    // --- artifacts ---

    pub fn set_selected_artifact_for_instrument(&self, instrument: Instrument, artifact_id: String) {
        self.write()
            .selected_artifact
            .insert(instrument, artifact_id.clone());
        self.publish(StoreEvent::SelectedArtifactChanged {
            instrument,
            artifact_id: Some(artifact_id),
        });
    }

    pub fn clear_selected_artifact_for(&self, instrument: Instrument) {
        let removed = self.write().selected_artifact.remove(&instrument);
        if removed.is_some() {
            self.publish(StoreEvent::SelectedArtifactChanged {
                instrument,
                artifact_id: None,
            });
        }
    }

    pub fn selected_artifact_for(&self, instrument: Instrument) -> Option<String> {
        self.read().selected_artifact.get(&instrument).cloned()
    }

    /// Find an artifact by id across all known tasks, with its owning task.
    pub fn find_artifact(&self, artifact_id: &str) -> Option<(Task, Artifact)> {
        let inner = self.read();
        inner.order.iter().find_map(|id| {
            let task = inner.tasks.get(id)?;
            let artifact = task
                .artifacts
                .iter()
                .find(|a| a.artifact_id == artifact_id)?;
            Some((task.clone(), artifact.clone()))
        })
    }

    pub fn set_artifact_op(&self, artifact_id: &str, op: ArtifactOpState) {
        self.write()
            .artifact_ops
            .insert(artifact_id.to_string(), op.clone());
        self.publish(StoreEvent::ArtifactOpChanged {
            artifact_id: artifact_id.to_string(),
            op: Some(op),
        });
    }

    pub fn clear_artifact_op(&self, artifact_id: &str) {
        self.write().artifact_ops.remove(artifact_id);
        self.publish(StoreEvent::ArtifactOpChanged {
            artifact_id: artifact_id.to_string(),
            op: None,
        });
    }

    pub fn artifact_op(&self, artifact_id: &str) -> Option<ArtifactOpState> {
        self.read().artifact_ops.get(artifact_id).cloned()
    }

    // --- selection ---

    pub fn set_last_selection(&self, selection: Option<BarRange>) {
        self.write().last_selection = selection;
    }

    pub fn last_selection(&self) -> Option<BarRange> {
        self.read().last_selection.clone()
    }

    // --- notifications ---

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.publish(StoreEvent::Notification(Notification {
            level,
            message: message.into(),
        }));
    }

    /// Wait until `task_id` reaches a terminal status.
    ///
    /// Returns immediately if it already has. There is no timeout; callers
    /// that need one wrap this in `tokio::time::timeout`.
    pub async fn wait_for_terminal(&self, task_id: &TaskId) -> Option<Task> {
        let mut rx = self.subscribe();
        if let Some(task) = self.task(task_id).filter(|t| t.status.is_terminal()) {
            return Some(task);
        }

        loop {
            match rx.recv().await {
                Ok(StoreEvent::TaskUpserted(task))
                    if &task.task_id == task_id && task.status.is_terminal() =>
                {
                    return Some(task);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Store subscriber lagged, rechecking task");
                    if let Some(task) = self.task(task_id).filter(|t| t.status.is_terminal()) {
                        return Some(task);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
