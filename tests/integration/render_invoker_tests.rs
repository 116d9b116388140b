//! Direct tests of the render engine invoker against shell stand-ins.

use std::time::{Duration, Instant};

use chalkboard::config::RenderConfig;
use chalkboard::render::{RenderError, RenderInvoker};

use super::test_helpers::STUB_RENDER_OK;

fn invoker(media_dir: &std::path::Path, command: &str, args: &[&str]) -> RenderInvoker {
    let config = RenderConfig {
        command: command.to_owned(),
        args: args.iter().map(|arg| (*arg).to_owned()).collect(),
    };
    RenderInvoker::new(config, media_dir.to_owned(), Duration::from_secs(30))
}

const SCENE: &str = "from manim import *\n\nclass Explainer(Scene):\n    pass\n";

#[tokio::test]
async fn successful_render_lands_in_the_media_dir() {
    let media = tempfile::tempdir().expect("tempdir");
    let invoker = invoker(media.path(), "sh", &["-c", STUB_RENDER_OK]);

    let path = invoker.render(SCENE, "abc123").await.expect("rendered");
    assert_eq!(path, media.path().join("abc123.mp4"));
    assert_eq!(std::fs::read(&path).expect("readable"), b"video");
}

#[tokio::test]
async fn nonzero_exit_is_a_crash_with_the_exit_code() {
    let media = tempfile::tempdir().expect("tempdir");
    let invoker = invoker(media.path(), "sh", &["-c", "echo boom >&2; exit 3"]);

    let err = invoker.render(SCENE, "abc123").await.expect_err("crashed");
    match err {
        RenderError::Crash { exit_code, stderr } => {
            assert_eq!(exit_code, Some(3));
            assert!(stderr.contains("boom"));
        }
        other => panic!("expected crash, got {other:?}"),
    }
}

#[tokio::test]
async fn crash_display_omits_stderr() {
    let err = RenderError::Crash {
        exit_code: Some(1),
        stderr: "Traceback (most recent call last): secret internals".into(),
    };
    let shown = err.to_string();
    assert!(!shown.contains("Traceback"));
    assert!(shown.contains('1'));
}

#[tokio::test]
async fn missing_command_is_a_crash() {
    let media = tempfile::tempdir().expect("tempdir");
    let invoker = invoker(media.path(), "definitely-not-a-render-engine", &[]);

    let err = invoker.render(SCENE, "abc123").await.expect_err("no binary");
    assert!(matches!(err, RenderError::Crash { exit_code: None, .. }));
}

#[tokio::test]
async fn timeout_kills_the_engine_and_bounds_the_wait() {
    let media = tempfile::tempdir().expect("tempdir");
    let config = RenderConfig {
        command: "sh".into(),
        args: vec!["-c".into(), "sleep 30".into()],
    };
    let invoker = RenderInvoker::new(config, media.path().to_owned(), Duration::from_secs(1));

    let started = Instant::now();
    let err = invoker.render(SCENE, "abc123").await.expect_err("timed out");
    assert_eq!(err, RenderError::Timeout);
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "timeout must not wait out the full sleep"
    );
}

#[tokio::test]
async fn empty_artifact_is_rejected_without_spawning() {
    let media = tempfile::tempdir().expect("tempdir");
    // A command that would fail loudly if it ever ran.
    let invoker = invoker(media.path(), "sh", &["-c", "exit 97"]);

    let err = invoker.render("   \n", "abc123").await.expect_err("rejected");
    assert!(matches!(err, RenderError::InvalidArtifact(_)));
}

#[tokio::test]
async fn engine_success_without_a_video_is_an_invalid_artifact() {
    let media = tempfile::tempdir().expect("tempdir");
    let invoker = invoker(media.path(), "true", &[]);

    let err = invoker.render(SCENE, "abc123").await.expect_err("no video");
    assert!(matches!(err, RenderError::InvalidArtifact(_)));
}

#[tokio::test]
async fn video_is_found_in_nested_media_directories() {
    let media = tempfile::tempdir().expect("tempdir");
    // Mimic the engine's nested videos/<scene>/<quality>/ layout.
    let script = r#"mkdir -p "$1/videos/scene/720p30" && printf nested > "$1/videos/scene/720p30/Explainer.mp4""#;
    let invoker = invoker(media.path(), "sh", &["-c", script]);

    let path = invoker.render(SCENE, "nested1").await.expect("rendered");
    assert_eq!(std::fs::read(&path).expect("readable"), b"nested");
}
