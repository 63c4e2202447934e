//! HttpBackend against a mock server.

use barnstorm::api::{
    Backend, ChordsToMidisRequest, HttpBackend, Instrument, MidiFile, MixSetRequest,
    RefMidiToMidiRequest, TaskId, TaskStatus,
};
use barnstorm::poller::PollSchedule;
use barnstorm::{ChordsRequest, Error, Orchestrator, TaskStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stormconf::{BackendConfig, DefaultsConfig};
use wiremock::matchers::{body_partial_json, body_string_contains, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn backend(server: &MockServer) -> HttpBackend {
    // trailing slash on purpose: paths must not double it
    HttpBackend::new(&BackendConfig {
        base_url: format!("{}/", server.uri()),
        timeout_ms: 5_000,
    })
    .unwrap()
}

fn status_json(task_id: &str, status: &str) -> serde_json::Value {
    json!({
        "task_id": task_id,
        "session_id": "s-1",
        "kind": "chords_to_midis",
        "status": status,
        "error": null,
        "artifacts": [],
        "inst": null
    })
}

#[tokio::test]
async fn test_create_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_id": "s-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let resp = backend(&server).await.create_session().await.unwrap();
    assert_eq!(resp.session_id, "s-1");
}

#[tokio::test]
async fn test_chords_submission_is_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tasks/chords_to_midis"))
        .and(body_partial_json(json!({
            "session_id": "s-1",
            "chords": ["Am", "F"],
            "segmentation": "A2",
            "bpm": "120.00",
            "n_midi": 3,
            "inst": "guitar"
        })))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({"task_id": "t-1", "status_url": "/tasks/t-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let req = ChordsToMidisRequest {
        session_id: "s-1".to_string(),
        chords: vec!["Am".to_string(), "F".to_string()],
        chord_beats: None,
        segmentation: "A2".to_string(),
        bpm: "120.00".to_string(),
        n_midi: 3,
        inst: Some(Instrument::Guitar),
    };
    let resp = backend(&server).await.submit_chords_to_midis(&req).await.unwrap();
    assert_eq!(resp.task_id, TaskId::from("t-1"));
}

#[tokio::test]
async fn test_ref_midi_submission_is_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tasks/ref_midi_to_midi"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("name=\"ref_midi\"; filename=\"ref_selection.mid\""))
        .and(body_string_contains("[\"C\",\"G\"]"))
        .and(body_string_contains("audio/midi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-2"})))
        .expect(1)
        .mount(&server)
        .await;

    let req = RefMidiToMidiRequest {
        session_id: "s-1".to_string(),
        chords: vec!["C".to_string(), "G".to_string()],
        chord_beats: Some(vec![4, 4]),
        segmentation: "A2".to_string(),
        bpm: "100.00".to_string(),
        ref_midi: MidiFile::new("ref_selection.mid", b"MThd".to_vec()),
        inst: None,
    };
    let resp = backend(&server).await.submit_ref_midi_to_midi(&req).await.unwrap();
    assert_eq!(resp.task_id.as_str(), "t-2");
    assert_eq!(resp.status_url, None);
}

#[tokio::test]
async fn test_mix_set_carries_both_files_and_alphas() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tasks/ref_midis_mix_set"))
        .and(body_string_contains("name=\"midi_a\""))
        .and(body_string_contains("name=\"midi_b\""))
        .and(body_string_contains("[0.0,0.5,1.0]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-3"})))
        .expect(1)
        .mount(&server)
        .await;

    let req = MixSetRequest {
        session_id: "s-1".to_string(),
        chords: vec!["C".to_string()],
        chord_beats: vec![4],
        segmentation: "A1".to_string(),
        bpm: "120.00".to_string(),
        alphas: vec![0.0, 0.5, 1.0],
        midi_a: MidiFile::new("a.mid", b"MThd-a".to_vec()),
        midi_b: MidiFile::new("b.mid", b"MThd-b".to_vec()),
    };
    backend(&server).await.submit_ref_midis_mix_set(&req).await.unwrap();
}

#[tokio::test]
async fn test_error_bodies_are_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/json-object"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "boom"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/json-string"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!("queue full")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/plain"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let backend = backend(&server).await;

    let err = backend.get_task(&TaskId::from("json-object")).await.unwrap_err();
    assert_eq!(err.to_string(), r#"HTTP 500: {"detail":"boom"}"#);

    let err = backend.get_task(&TaskId::from("json-string")).await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP 503: queue full");

    let err = backend.get_task(&TaskId::from("plain")).await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 502, .. }));
    assert_eq!(err.to_string(), "HTTP 502: bad gateway");
}

#[tokio::test]
async fn test_unknown_status_fails_decoding() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json("t-1", "exploded")))
        .mount(&server)
        .await;

    let err = backend(&server)
        .await
        .get_task(&TaskId::from("t-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[tokio::test]
async fn test_download_by_id_and_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/artifacts/content/a1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .expect(2)
        .mount(&server)
        .await;

    let backend = backend(&server).await;
    assert_eq!(backend.download_artifact("a1").await.unwrap(), vec![1, 2, 3]);
    assert_eq!(
        backend
            .download_artifact_by_url("/tasks/artifacts/content/a1")
            .await
            .unwrap(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_orchestrator_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_id": "s-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks/chords_to_midis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t-1",
            "session_id": "s-1",
            "kind": "chords_to_midis",
            "status": "succeeded",
            "artifacts": [
                {"artifact_id": "a1", "kind": "midi", "filename": "out_0.mid", "url": "/tasks/artifacts/content/a1"}
            ],
            "inst": "piano"
        })))
        .mount(&server)
        .await;

    let schedule = PollSchedule {
        first_delay: Duration::from_millis(10),
        jitter_min: Duration::from_millis(10),
        jitter_max: Duration::from_millis(20),
    };
    let backend: Arc<dyn Backend> = Arc::new(backend(&server).await);
    let orchestrator =
        Orchestrator::with_schedule(backend, TaskStore::new(), DefaultsConfig::default(), schedule);

    let task_id = orchestrator
        .submit_chords(ChordsRequest {
            chords: vec!["C".to_string(), "G".to_string()],
            ..ChordsRequest::default()
        })
        .await
        .unwrap();

    let task = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.wait_for_terminal(&task_id),
    )
    .await
    .expect("task did not finish")
    .unwrap();
    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(task.artifacts[0].artifact_id, "a1");
    assert_eq!(task.input_bars, Some(2));
}
