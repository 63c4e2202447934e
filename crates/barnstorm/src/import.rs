//! Bringing a generated artifact into the project: as a new track, or
//! overwriting the selected bars of an existing one.

use crate::api::Backend;
use crate::error::{Error, Result};
use crate::project::Project;
use crate::requests::validate_selection;
use crate::store::{ArtifactOpState, NotificationLevel, TaskStore};
use notespan::{
    parse_first_track, reconcile_length, BarRange, replace_in_range, rescale, write_notes_at, NoteTrack,
    ParsedMidi, Reconciliation, TickRange, WriteOptions,
};
use std::sync::Arc;

/// Result of [`ArtifactImporter::import_artifact_as_new_track`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub track_index: usize,
    pub notes_written: usize,
}

/// Result of [`ArtifactImporter::apply_artifact_to_selection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub range: TickRange,
    pub reconciliation: Reconciliation,
    pub notes_removed: usize,
    pub notes_written: usize,
}

/// Downloads artifacts and writes them into a [`Project`].
///
/// Progress is mirrored in the store's artifact op flags; failures set the
/// op error and publish an error notification.
pub struct ArtifactImporter {
    backend: Arc<dyn Backend>,
    store: TaskStore,
}

impl ArtifactImporter {
    pub fn new(backend: Arc<dyn Backend>, store: TaskStore) -> Self {
        Self { backend, store }
    }

    /// Download, parse and add the artifact's first note track as a new
    /// track, inserted before the last one.
    #[tracing::instrument(skip(self, project), fields(artifact.id = %artifact_id))]
    pub async fn import_artifact_as_new_track<P: Project + ?Sized>(
        &self,
        project: &mut P,
        artifact_id: &str,
        filename_hint: Option<&str>,
    ) -> Result<ImportReport> {
        let result = self.import_inner(project, artifact_id, filename_hint).await;
        self.finish_op(artifact_id, result, "Imported as a new track.")
    }

    async fn import_inner<P: Project + ?Sized>(
        &self,
        project: &mut P,
        artifact_id: &str,
        filename_hint: Option<&str>,
    ) -> Result<ImportReport> {
        let parsed = self.fetch_parsed(artifact_id).await?;

        let insert_index = project.track_count().saturating_sub(1);
        let channel = insert_index.min(0x0F) as u8;
        let name = filename_hint
            .map(track_name_from_filename)
            .unwrap_or_else(|| parsed.track_name.clone());
        let mut track = NoteTrack::new(name, channel);

        project.push_history();
        let notes_written = write_notes_at(
            &mut track,
            &parsed.payload,
            0,
            WriteOptions::scaled(project.timebase()),
        );
        project.insert_track(track, insert_index);
        project.update_end_of_song();
        project.jump_to_tick(0);

        tracing::info!(
            track.index = insert_index,
            notes = notes_written,
            "Artifact imported as new track"
        );
        Ok(ImportReport {
            track_index: insert_index,
            notes_written,
        })
    }

    /// Overwrite the store's last selection on `track_index` with the
    /// artifact, looping or cutting it to the selection length.
    ///
    /// The clip's bar count comes from the task that produced it, or is
    /// estimated from its notes when that task is unknown. Nothing is
    /// downloaded unless a selection, a destination track and a non-empty
    /// range are all present.
    pub async fn apply_artifact_to_selection<P: Project + ?Sized>(
        &self,
        project: &mut P,
        artifact_id: &str,
        track_index: usize,
    ) -> Result<ApplyReport> {
        self.apply_artifact_with_bars(project, artifact_id, track_index, None)
            .await
    }

    /// As [`Self::apply_artifact_to_selection`], with the clip's bar count
    /// given by the caller when known.
    #[tracing::instrument(skip(self, project), fields(artifact.id = %artifact_id))]
    pub async fn apply_artifact_with_bars<P: Project + ?Sized>(
        &self,
        project: &mut P,
        artifact_id: &str,
        track_index: usize,
        artifact_bars: Option<u32>,
    ) -> Result<ApplyReport> {
        let selection = self.store.last_selection();
        let checked = validate_selection(selection.as_ref())
            .and_then(|sel| {
                if track_index >= project.track_count() {
                    return Err(Error::precondition("select a destination track first"));
                }
                if sel.is_empty() {
                    return Err(Error::precondition(
                        "selection range is invalid (to_tick must be greater than from_tick)",
                    ));
                }
                Ok(sel.clone())
            });
        let selection = match checked {
            Ok(sel) => sel,
            Err(e) => {
                self.store.notify(NotificationLevel::Error, e.to_string());
                return Err(e);
            }
        };

        let result = self
            .apply_inner(project, artifact_id, track_index, &selection, artifact_bars)
            .await;

        self.finish_op(
            artifact_id,
            result,
            "Overwrote the selected bars on the destination track.",
        )
    }

    async fn apply_inner<P: Project + ?Sized>(
        &self,
        project: &mut P,
        artifact_id: &str,
        track_index: usize,
        selection: &BarRange,
        artifact_bars: Option<u32>,
    ) -> Result<ApplyReport> {
        let parsed = self.fetch_parsed(artifact_id).await?;
        let timebase = project.timebase();
        let range = selection.tick_range();

        let artifact_bars = artifact_bars.or_else(|| {
            self.store
                .find_artifact(artifact_id)
                .and_then(|(task, _)| task.input_bars)
        });
        let bar_ticks = project.meter().bar_ticks_at(range.from);
        let payload = rescale(&parsed.payload, timebase);
        let (fitted, reconciliation) =
            reconcile_length(&payload, artifact_bars, selection, bar_ticks);

        if fitted.is_empty() {
            return Err(Error::precondition(
                "nothing to write inside the selection (it may be too short)",
            ));
        }

        project.push_history();
        let track = project
            .track_mut(track_index)
            .ok_or_else(|| Error::precondition("destination track is not available"))?;
        let stats = replace_in_range(track, &fitted, range, WriteOptions::scaled(timebase));
        project.update_end_of_song();
        project.jump_to_tick(range.from);

        tracing::info!(
            range.from = range.from,
            range.to = range.to,
            removed = stats.removed,
            written = stats.written,
            ?reconciliation,
            "Artifact applied to selection"
        );
        Ok(ApplyReport {
            range,
            reconciliation,
            notes_removed: stats.removed,
            notes_written: stats.written,
        })
    }

    async fn fetch_parsed(&self, artifact_id: &str) -> Result<ParsedMidi> {
        self.store
            .set_artifact_op(artifact_id, ArtifactOpState::downloading());
        let bytes = self.backend.download_artifact(artifact_id).await?;

        self.store
            .set_artifact_op(artifact_id, ArtifactOpState::importing());
        let parsed = parse_first_track(&bytes)?;
        if parsed.payload.is_empty() {
            return Err(Error::precondition("the MIDI file has no note events to import"));
        }
        Ok(parsed)
    }

    fn finish_op<T>(&self, artifact_id: &str, result: Result<T>, success: &str) -> Result<T> {
        match result {
            Ok(value) => {
                self.store.clear_artifact_op(artifact_id);
                self.store.notify(NotificationLevel::Success, success);
                Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(error = %message, "Artifact import failed");
                self.store
                    .set_artifact_op(artifact_id, ArtifactOpState::failed(message.clone()));
                self.store.notify(NotificationLevel::Error, message);
                Err(e)
            }
        }
    }
}

/// `"mix_a0.25.mid"` becomes `"mix_a0.25"`.
fn track_name_from_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.strip_suffix(".mid")
        .or_else(|| base.strip_suffix(".midi"))
        .unwrap_or(base)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_name_from_filename() {
        assert_eq!(track_name_from_filename("mix_a0.25.mid"), "mix_a0.25");
        assert_eq!(track_name_from_filename("out/take.midi"), "take");
        assert_eq!(track_name_from_filename("plain"), "plain");
    }
}
