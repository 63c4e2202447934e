//! The generation backend: wire types, the [`Backend`] seam and its HTTP client.

mod http;
pub mod types;

pub use http::{join_url, HttpBackend};
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;

/// Operations the orchestrator needs from the backend.
///
/// [`HttpBackend`] talks to the real service; tests substitute scripted fakes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn health(&self) -> Result<serde_json::Value>;

    async fn create_session(&self) -> Result<CreateSessionResponse>;

    async fn submit_chords_to_midis(&self, req: &ChordsToMidisRequest) -> Result<TaskSubmitResponse>;

    async fn submit_ref_midi_to_midi(&self, req: &RefMidiToMidiRequest) -> Result<TaskSubmitResponse>;

    async fn submit_ref_midis_mix_set(&self, req: &MixSetRequest) -> Result<TaskSubmitResponse>;

    async fn get_task(&self, task_id: &TaskId) -> Result<TaskStatusResponse>;

    async fn download_artifact(&self, artifact_id: &str) -> Result<Vec<u8>>;

    /// Download using an artifact's relative `url` field.
    async fn download_artifact_by_url(&self, relative_url: &str) -> Result<Vec<u8>>;
}
