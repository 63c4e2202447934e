//! Submitting generation tasks and tracking them to completion.

use crate::api::{
    Backend, ChordsToMidisRequest, MixSetRequest as MixSetWire, RefMidiToMidiRequest, TaskId,
    TaskStatus,
};
use crate::error::{Error, Result};
use crate::poller::{PollSchedule, Poller};
use crate::requests::{
    check_mix_bars, ChordsRequest, MixSetRequest, PreparedFields, RefMidiRequest, TaskRequest,
};
use crate::session::SessionManager;
use crate::store::{NotificationLevel, Task, TaskStore, TaskUpdate};
use std::sync::Arc;
use stormconf::{DefaultsConfig, StormConfig};

/// Ties the session, the store and the poll loop together.
///
/// Dropping the orchestrator stops every poll it started.
pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    store: TaskStore,
    sessions: SessionManager,
    poller: Poller,
    defaults: DefaultsConfig,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn Backend>, store: TaskStore, config: &StormConfig) -> Self {
        Self::with_schedule(
            backend,
            store,
            config.defaults.clone(),
            PollSchedule::from(&config.polling),
        )
    }

    pub fn with_schedule(
        backend: Arc<dyn Backend>,
        store: TaskStore,
        defaults: DefaultsConfig,
        schedule: PollSchedule,
    ) -> Self {
        Self {
            sessions: SessionManager::new(backend.clone(), store.clone()),
            poller: Poller::new(backend.clone(), store.clone(), schedule),
            backend,
            store,
            defaults,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn defaults(&self) -> &DefaultsConfig {
        &self.defaults
    }

    pub async fn ensure_session(&self) -> Result<String> {
        self.sessions.ensure_session().await
    }

    /// Validate, submit, register and start polling. Returns the task id.
    ///
    /// Local checks run before the session is touched. Any failure is also
    /// published as an error notification.
    #[tracing::instrument(skip(self, request), fields(task.kind = %request.kind()))]
    pub async fn submit_task(&self, request: TaskRequest) -> Result<TaskId> {
        match self.submit_inner(request).await {
            Ok(task_id) => Ok(task_id),
            Err(e) => {
                tracing::error!(error = %e, "Task submission failed");
                self.store.notify(NotificationLevel::Error, e.to_string());
                Err(e)
            }
        }
    }

    pub async fn submit_chords(&self, request: ChordsRequest) -> Result<TaskId> {
        self.submit_task(TaskRequest::Chords(request)).await
    }

    pub async fn submit_ref_midi(&self, request: RefMidiRequest) -> Result<TaskId> {
        self.submit_task(TaskRequest::RefMidi(request)).await
    }

    pub async fn submit_mix_set(&self, request: MixSetRequest) -> Result<TaskId> {
        self.submit_task(TaskRequest::MixSet(request)).await
    }

    async fn submit_inner(&self, request: TaskRequest) -> Result<TaskId> {
        let kind = request.kind();

        let (fields, instrument) = match &request {
            TaskRequest::Chords(req) => {
                let fields = self.prepare(&req.chords, req.chord_beats.as_deref(), req.bars, req.bpm)?;
                let instrument = match req.instrument {
                    Some(inst) => Some(inst),
                    None => Some(self.default_instrument()?),
                };
                (fields, instrument)
            }
            TaskRequest::RefMidi(req) => {
                let fields = self.prepare(&req.chords, req.chord_beats.as_deref(), req.bars, req.bpm)?;
                notespan::parse_first_track(&req.ref_midi.bytes)?;
                (fields, req.instrument)
            }
            TaskRequest::MixSet(req) => {
                let fields = self.prepare(&req.chords, req.chord_beats.as_deref(), req.bars, req.bpm)?;
                let a = notespan::parse_first_track(&req.midi_a.bytes)?;
                let b = notespan::parse_first_track(&req.midi_b.bytes)?;
                check_mix_bars(req.bars_a.unwrap_or(a.bars), req.bars_b.unwrap_or(b.bars))?;
                (fields, None)
            }
        };

        let session_id = self.sessions.ensure_session().await?;

        let resp = match request {
            TaskRequest::Chords(req) => {
                let wire = ChordsToMidisRequest {
                    session_id: session_id.clone(),
                    chords: fields.chords.clone(),
                    chord_beats: Some(fields.chord_beats.clone()),
                    segmentation: fields.segmentation.clone(),
                    bpm: fields.bpm.clone(),
                    n_midi: req.n_midi.unwrap_or(self.defaults.n_midi),
                    inst: instrument,
                };
                self.backend.submit_chords_to_midis(&wire).await?
            }
            TaskRequest::RefMidi(req) => {
                let wire = RefMidiToMidiRequest {
                    session_id: session_id.clone(),
                    chords: fields.chords.clone(),
                    chord_beats: Some(fields.chord_beats.clone()),
                    segmentation: fields.segmentation.clone(),
                    bpm: fields.bpm.clone(),
                    ref_midi: req.ref_midi,
                    inst: instrument,
                };
                self.backend.submit_ref_midi_to_midi(&wire).await?
            }
            TaskRequest::MixSet(req) => {
                let wire = MixSetWire {
                    session_id: session_id.clone(),
                    chords: fields.chords.clone(),
                    chord_beats: fields.chord_beats.clone(),
                    segmentation: fields.segmentation.clone(),
                    bpm: fields.bpm.clone(),
                    alphas: req.alphas.unwrap_or_else(|| self.defaults.mix_alphas.clone()),
                    midi_a: req.midi_a,
                    midi_b: req.midi_b,
                };
                self.backend.submit_ref_midis_mix_set(&wire).await?
            }
        };

        let task_id = resp.task_id;
        self.store.upsert(TaskUpdate {
            session_id: Some(session_id.clone()),
            status: Some(TaskStatus::Queued),
            artifacts: Some(Vec::new()),
            instrument,
            input_bars: Some(fields.bars),
            input_chords: Some(fields.chords),
            ..TaskUpdate::new(task_id.clone(), kind)
        });
        if let Some(instrument) = instrument {
            self.store
                .set_active_task_for_instrument(instrument, task_id.clone());
        }
        self.store.set_active_task(task_id.clone());

        tracing::info!(
            task.id = %task_id,
            task.kind = %kind,
            session.id = %session_id,
            bars = fields.bars,
            segmentation = %fields.segmentation,
            "Task submitted"
        );

        self.poller.start_polling(task_id.clone());
        Ok(task_id)
    }

    fn prepare(
        &self,
        chords: &[String],
        chord_beats: Option<&[u32]>,
        bars: Option<u32>,
        bpm: Option<f64>,
    ) -> Result<PreparedFields> {
        PreparedFields::prepare(chords, chord_beats, bars, bpm, &self.defaults)
    }

    fn default_instrument(&self) -> Result<crate::api::Instrument> {
        self.defaults
            .instrument
            .parse()
            .map_err(Error::Precondition)
    }

    /// Fetch a task once and fold it into the store, without polling.
    pub async fn refresh_task(&self, task_id: &TaskId) -> Result<Task> {
        let resp = self.backend.get_task(task_id).await?;
        Ok(self.store.upsert(TaskUpdate::from_status(&resp)))
    }

    /// Resolve once the task is terminal.
    pub async fn wait_for_terminal(&self, task_id: &TaskId) -> Result<Task> {
        self.store
            .wait_for_terminal(task_id)
            .await
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    pub fn start_polling(&self, task_id: TaskId) -> bool {
        self.poller.start_polling(task_id)
    }

    pub fn stop_polling(&self, task_id: &TaskId) {
        self.poller.stop_polling(task_id);
    }

    pub fn stop_all_polling(&self) {
        self.poller.stop_all();
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.poller.stop_all();
    }
}
