//! Wire types for the generation backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend-assigned task identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The three job kinds the backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ChordsToMidis,
    RefMidiToMidi,
    RefMidisMixSet,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ChordsToMidis => "chords_to_midis",
            TaskKind::RefMidiToMidi => "ref_midi_to_midi",
            TaskKind::RefMidisMixSet => "ref_midis_mix_set",
        }
    }

    /// Submission path, relative to the base URL.
    pub fn submit_path(&self) -> String {
        format!("/tasks/{}", self.as_str())
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Instrument tag used to address "the latest result for piano" and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Piano,
    Guitar,
    Bass,
}

impl Instrument {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::Piano => "piano",
            Instrument::Guitar => "guitar",
            Instrument::Bass => "bass",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "piano" => Ok(Instrument::Piano),
            "guitar" => Ok(Instrument::Guitar),
            "bass" => Ok(Instrument::Bass),
            other => Err(format!("unknown instrument '{other}' (expected piano, guitar or bass)")),
        }
    }
}

/// One output file of a finished task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub kind: String,
    pub filename: String,
    /// Relative download path, e.g. `/tasks/artifacts/content/<id>`.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmitResponse {
    pub task_id: TaskId,
    #[serde(default)]
    pub status_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: TaskId,
    pub session_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Echoed instrument tag; values outside the known set are ignored.
    #[serde(default)]
    pub inst: Option<String>,
}

impl TaskStatusResponse {
    pub fn instrument(&self) -> Option<Instrument> {
        self.inst.as_deref().and_then(|s| s.parse().ok())
    }

    /// Backend error as display text. Strings pass through, anything else is
    /// rendered as JSON.
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordsToMidisRequest {
    pub session_id: String,
    pub chords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chord_beats: Option<Vec<u32>>,
    pub segmentation: String,
    /// Tempo with two decimals, e.g. `"120.00"`.
    pub bpm: String,
    pub n_midi: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inst: Option<Instrument>,
}

/// A MIDI file to upload as a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl MidiFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefMidiToMidiRequest {
    pub session_id: String,
    pub chords: Vec<String>,
    pub chord_beats: Option<Vec<u32>>,
    pub segmentation: String,
    pub bpm: String,
    pub ref_midi: MidiFile,
    pub inst: Option<Instrument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixSetRequest {
    pub session_id: String,
    pub chords: Vec<String>,
    pub chord_beats: Vec<u32>,
    pub segmentation: String,
    pub bpm: String,
    pub alphas: Vec<f64>,
    pub midi_a: MidiFile,
    pub midi_b: MidiFile,
}
