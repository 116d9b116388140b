//! Unit tests for status event snapshots and the wire status mapping.

use std::path::PathBuf;

use chalkboard::models::event::{EventStatus, StatusEvent};
use chalkboard::models::session::{ErrorKind, Session, SessionError, SessionStatus};

fn running_session() -> Session {
    let mut session = Session::new("Explain bubble sort".into(), Vec::new());
    session.status = SessionStatus::Running;
    session.current_stage = Some("content".into());
    session.progress = 0.25;
    session.message = "Running content stage".into();
    session
}

#[test]
fn pending_and_running_both_map_to_processing() {
    assert_eq!(
        EventStatus::from(SessionStatus::Pending),
        EventStatus::Processing
    );
    assert_eq!(
        EventStatus::from(SessionStatus::Running),
        EventStatus::Processing
    );
}

#[test]
fn terminal_statuses_map_to_completed_and_error() {
    assert_eq!(
        EventStatus::from(SessionStatus::Completed),
        EventStatus::Completed
    );
    assert_eq!(EventStatus::from(SessionStatus::Failed), EventStatus::Error);
}

#[test]
fn wire_status_values_are_exactly_the_contract_strings() {
    assert_eq!(
        serde_json::to_string(&EventStatus::Processing).expect("serialize"),
        "\"processing\""
    );
    assert_eq!(
        serde_json::to_string(&EventStatus::Completed).expect("serialize"),
        "\"completed\""
    );
    assert_eq!(
        serde_json::to_string(&EventStatus::Error).expect("serialize"),
        "\"error\""
    );
}

#[test]
fn snapshot_of_running_session_carries_stage_and_progress() {
    let session = running_session();
    let event = StatusEvent::snapshot(&session);
    assert_eq!(event.session_id, session.id);
    assert_eq!(event.status, EventStatus::Processing);
    assert_eq!(event.current_agent.as_deref(), Some("content"));
    assert!((event.progress - 0.25).abs() < f64::EPSILON);
    assert!(event.video_url.is_none());
    assert!(event.error.is_none());
    assert!(!event.is_terminal());
}

#[test]
fn snapshot_of_completed_session_links_the_video() {
    let mut session = running_session();
    session.status = SessionStatus::Completed;
    session.progress = 1.0;
    session.video_path = Some(PathBuf::from("/media/abc.mp4"));

    let event = StatusEvent::snapshot(&session);
    assert_eq!(event.status, EventStatus::Completed);
    assert_eq!(
        event.video_url.as_deref(),
        Some(format!("/api/video/{}", session.id).as_str())
    );
    assert!(event.is_terminal());
}

#[test]
fn snapshot_of_failed_session_carries_structured_error() {
    let mut session = running_session();
    session.status = SessionStatus::Failed;
    session.error = Some(SessionError {
        stage: Some("code_generation".into()),
        kind: ErrorKind::Generation,
        summary: "generation failed: retry budget exhausted".into(),
    });

    let event = StatusEvent::snapshot(&session);
    assert_eq!(event.status, EventStatus::Error);
    assert!(event.is_terminal());
    let error = event.error.expect("error present");
    assert_eq!(error.stage.as_deref(), Some("code_generation"));
    assert_eq!(error.kind, ErrorKind::Generation);
}

#[test]
fn video_url_absent_unless_completed() {
    // A video path on a non-completed session must not leak into the event.
    let mut session = running_session();
    session.video_path = Some(PathBuf::from("/media/partial.mp4"));
    let event = StatusEvent::snapshot(&session);
    assert!(event.video_url.is_none());
}

#[test]
fn event_serialization_omits_absent_optional_fields() {
    let session = Session::new("topic".into(), Vec::new());
    let event = StatusEvent::snapshot(&session);
    let json = serde_json::to_string(&event).expect("serialize");
    assert!(!json.contains("video_url"));
    assert!(!json.contains("\"error\""));
    assert!(!json.contains("details"));
    assert!(!json.contains("current_agent"));
}

#[test]
fn with_details_attaches_detail_text() {
    let session = running_session();
    let event = StatusEvent::snapshot(&session).with_details("Creating 1-minute video");
    assert_eq!(event.details.as_deref(), Some("Creating 1-minute video"));
}
