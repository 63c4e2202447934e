use super::types::*;
use super::Backend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::time::Duration;
use stormconf::BackendConfig;

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{base}/{path}")
}

/// [`Backend`] over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self::with_client(&config.base_url, client))
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    // Helper to inject traceparent header for distributed tracing
    fn inject_trace_context(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        use opentelemetry::trace::TraceContextExt;
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let span = tracing::Span::current();
        let context = span.context();
        let ctx_span = context.span();
        let span_context = ctx_span.span_context();

        if span_context.is_valid() {
            let flags = if span_context.is_sampled() { "01" } else { "00" };
            let traceparent = format!(
                "00-{}-{}-{}",
                span_context.trace_id(),
                span_context.span_id(),
                flags
            );
            builder.header("traceparent", traceparent)
        } else {
            builder
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = self.inject_trace_context(builder).send().await?;
        check_status(resp).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let resp = self.send(builder).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let resp = self.send(self.client.get(self.url(path))).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Turn a non-success response into [`Error::Http`], keeping the body.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let is_json = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));

    let body = if is_json {
        match resp.json::<serde_json::Value>().await {
            Ok(serde_json::Value::String(s)) => s,
            Ok(value) => value.to_string(),
            Err(_) => "<failed to read error body>".to_string(),
        }
    } else {
        resp.text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string())
    };

    tracing::warn!(
        http.status = status.as_u16(),
        error_body = %body,
        "Backend returned an error status"
    );

    Err(Error::Http {
        status: status.as_u16(),
        body,
    })
}

fn midi_part(file: &MidiFile) -> Result<Part> {
    Ok(Part::bytes(file.bytes.clone())
        .file_name(file.filename.clone())
        .mime_str("audio/midi")?)
}

#[async_trait]
impl Backend for HttpBackend {
    async fn health(&self) -> Result<serde_json::Value> {
        self.send_json(self.client.get(self.url("/health"))).await
    }

    #[tracing::instrument(skip(self))]
    async fn create_session(&self) -> Result<CreateSessionResponse> {
        self.send_json(self.client.post(self.url("/sessions"))).await
    }

    #[tracing::instrument(skip(self, req), fields(task.kind = "chords_to_midis", session.id = %req.session_id))]
    async fn submit_chords_to_midis(&self, req: &ChordsToMidisRequest) -> Result<TaskSubmitResponse> {
        let path = TaskKind::ChordsToMidis.submit_path();
        self.send_json(self.client.post(self.url(&path)).json(req)).await
    }

    #[tracing::instrument(skip(self, req), fields(task.kind = "ref_midi_to_midi", session.id = %req.session_id))]
    async fn submit_ref_midi_to_midi(&self, req: &RefMidiToMidiRequest) -> Result<TaskSubmitResponse> {
        let mut form = Form::new()
            .text("session_id", req.session_id.clone())
            .text("chords", serde_json::to_string(&req.chords)?);
        if let Some(beats) = &req.chord_beats {
            form = form.text("chord_beats", serde_json::to_string(beats)?);
        }
        form = form
            .text("segmentation", req.segmentation.clone())
            .text("bpm", req.bpm.clone())
            .part("ref_midi", midi_part(&req.ref_midi)?);
        if let Some(inst) = req.inst {
            form = form.text("inst", inst.as_str());
        }

        let path = TaskKind::RefMidiToMidi.submit_path();
        self.send_json(self.client.post(self.url(&path)).multipart(form)).await
    }

    #[tracing::instrument(skip(self, req), fields(task.kind = "ref_midis_mix_set", session.id = %req.session_id))]
    async fn submit_ref_midis_mix_set(&self, req: &MixSetRequest) -> Result<TaskSubmitResponse> {
        let form = Form::new()
            .text("session_id", req.session_id.clone())
            .text("chords", serde_json::to_string(&req.chords)?)
            .text("chord_beats", serde_json::to_string(&req.chord_beats)?)
            .text("segmentation", req.segmentation.clone())
            .text("bpm", req.bpm.clone())
            .text("alphas", serde_json::to_string(&req.alphas)?)
            .part("midi_a", midi_part(&req.midi_a)?)
            .part("midi_b", midi_part(&req.midi_b)?);

        let path = TaskKind::RefMidisMixSet.submit_path();
        self.send_json(self.client.post(self.url(&path)).multipart(form)).await
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<TaskStatusResponse> {
        let path = format!("/tasks/{task_id}");
        self.send_json(self.client.get(self.url(&path))).await
    }

    #[tracing::instrument(skip(self), fields(artifact.id = %artifact_id))]
    async fn download_artifact(&self, artifact_id: &str) -> Result<Vec<u8>> {
        self.get_bytes(&format!("/tasks/artifacts/content/{artifact_id}"))
            .await
    }

    async fn download_artifact_by_url(&self, relative_url: &str) -> Result<Vec<u8>> {
        self.get_bytes(relative_url).await
    }
}
