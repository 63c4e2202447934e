//! Shared fixtures: a scripted in-memory backend and MIDI builders.

#![allow(dead_code)]

use async_trait::async_trait;
use barnstorm::api::{
    Artifact, Backend, ChordsToMidisRequest, CreateSessionResponse, MixSetRequest,
    RefMidiToMidiRequest, TaskId, TaskKind, TaskStatus, TaskStatusResponse, TaskSubmitResponse,
};
use barnstorm::{Error, Result};
use notespan::{notes_to_smf, Note};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted answer to `get_task`.
#[derive(Debug, Clone)]
pub enum Step {
    Status {
        status: TaskStatus,
        artifacts: Vec<Artifact>,
        error: Option<String>,
        inst: Option<String>,
    },
    /// The request fails at the transport level.
    Unreachable,
}

impl Step {
    pub fn status(status: TaskStatus) -> Self {
        Step::Status {
            status,
            artifacts: Vec::new(),
            error: None,
            inst: None,
        }
    }

    pub fn succeeded(artifacts: Vec<Artifact>, inst: Option<&str>) -> Self {
        Step::Status {
            status: TaskStatus::Succeeded,
            artifacts,
            error: None,
            inst: inst.map(str::to_string),
        }
    }

    pub fn failed(error: &str) -> Self {
        Step::Status {
            status: TaskStatus::Failed,
            artifacts: Vec::new(),
            error: Some(error.to_string()),
            inst: None,
        }
    }
}

/// What a submit call carried.
#[derive(Debug, Clone)]
pub enum Submitted {
    Chords(ChordsToMidisRequest),
    RefMidi(RefMidiToMidiRequest),
    MixSet(MixSetRequest),
}

/// Backend fake driven by per-task scripts.
///
/// Task ids are handed out as `task-1`, `task-2`, ... The last step of a
/// script repeats once the script runs out.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<TaskId, VecDeque<Step>>>,
    kinds: Mutex<HashMap<TaskId, TaskKind>>,
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
    submitted: Mutex<Vec<Submitted>>,
    next_task: AtomicUsize,
    pub sessions_created: AtomicUsize,
    pub polls: AtomicUsize,
    pub downloads: AtomicUsize,
    pub fail_sessions: AtomicBool,
    /// Added latency on every `get_task`.
    pub poll_latency: Mutex<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, task_id: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(TaskId::from(task_id), steps.into());
    }

    pub fn put_artifact(&self, artifact_id: &str, bytes: Vec<u8>) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(artifact_id.to_string(), bytes);
    }

    pub fn set_poll_latency(&self, latency: Duration) {
        *self.poll_latency.lock().unwrap() = latency;
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.submitted.lock().unwrap().clone()
    }

    fn accept(&self, kind: TaskKind, submitted: Submitted) -> TaskSubmitResponse {
        let n = self.next_task.fetch_add(1, Ordering::SeqCst) + 1;
        let task_id = TaskId::from(format!("task-{n}"));
        self.kinds.lock().unwrap().insert(task_id.clone(), kind);
        self.submitted.lock().unwrap().push(submitted);
        TaskSubmitResponse {
            status_url: Some(format!("/tasks/{task_id}")),
            task_id,
        }
    }

    fn next_step(&self, task_id: &TaskId) -> Option<Step> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.get_mut(task_id)?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn health(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({"status": "ok"}))
    }

    async fn create_session(&self) -> Result<CreateSessionResponse> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(Error::Http {
                status: 503,
                body: "model not loaded".to_string(),
            });
        }
        let n = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreateSessionResponse {
            session_id: format!("session-{n}"),
        })
    }

    async fn submit_chords_to_midis(&self, req: &ChordsToMidisRequest) -> Result<TaskSubmitResponse> {
        Ok(self.accept(TaskKind::ChordsToMidis, Submitted::Chords(req.clone())))
    }

    async fn submit_ref_midi_to_midi(&self, req: &RefMidiToMidiRequest) -> Result<TaskSubmitResponse> {
        Ok(self.accept(TaskKind::RefMidiToMidi, Submitted::RefMidi(req.clone())))
    }

    async fn submit_ref_midis_mix_set(&self, req: &MixSetRequest) -> Result<TaskSubmitResponse> {
        Ok(self.accept(TaskKind::RefMidisMixSet, Submitted::MixSet(req.clone())))
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<TaskStatusResponse> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.poll_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let kind = self
            .kinds
            .lock()
            .unwrap()
            .get(task_id)
            .copied()
            .unwrap_or(TaskKind::ChordsToMidis);

        match self.next_step(task_id) {
            None => Err(Error::Http {
                status: 404,
                body: format!("unknown task {task_id}"),
            }),
            Some(Step::Unreachable) => Err(Error::Session("connection refused".to_string())),
            Some(Step::Status {
                status,
                artifacts,
                error,
                inst,
            }) => Ok(TaskStatusResponse {
                task_id: task_id.clone(),
                session_id: "session-1".to_string(),
                kind,
                status,
                error: error.map(serde_json::Value::String),
                artifacts,
                inst,
            }),
        }
    }

    async fn download_artifact(&self, artifact_id: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.artifacts
            .lock()
            .unwrap()
            .get(artifact_id)
            .cloned()
            .ok_or_else(|| Error::Http {
                status: 404,
                body: format!("unknown artifact {artifact_id}"),
            })
    }

    async fn download_artifact_by_url(&self, relative_url: &str) -> Result<Vec<u8>> {
        let id = relative_url.rsplit('/').next().unwrap_or(relative_url);
        self.download_artifact(id).await
    }
}

pub fn artifact(id: &str, filename: &str) -> Artifact {
    Artifact {
        artifact_id: id.to_string(),
        kind: "midi".to_string(),
        filename: filename.to_string(),
        url: format!("/tasks/artifacts/content/{id}"),
    }
}

pub fn chords(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// One quarter note at the start of each bar, 4/4.
pub fn one_note_per_bar(bars: u64, timebase: u32) -> Vec<u8> {
    let bar = timebase as u64 * 4;
    let notes: Vec<Note> = (0..bars)
        .map(|i| Note::new(i * bar, timebase as u64, 60 + i as u8, 100))
        .collect();
    notes_to_smf(&notes, timebase, "generated").unwrap()
}
