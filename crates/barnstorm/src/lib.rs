//! Barnstorm - client for a remote MIDI generation service.
//!
//! Submits generation jobs, tracks them to completion and writes the
//! resulting clips into a bar-aligned project.

pub mod api;
pub mod error;
pub mod import;
pub mod mix;
pub mod orchestrator;
pub mod poller;
pub mod project;
pub mod requests;
pub mod segmentation;
pub mod session;
pub mod store;
pub mod telemetry;

pub use api::{Backend, HttpBackend, Instrument, TaskId, TaskKind, TaskStatus};
pub use error::{Error, Result};
pub use import::{ApplyReport, ArtifactImporter, ImportReport};
pub use orchestrator::Orchestrator;
pub use project::{MidiProject, Project};
pub use requests::{ChordsRequest, MixSetRequest, RefMidiRequest, TaskRequest};
pub use store::{Notification, NotificationLevel, StoreEvent, Task, TaskStore};
