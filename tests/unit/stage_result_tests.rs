//! Unit tests for stage result classification and context feedback.

use chalkboard::models::session::ModelChoice;
use chalkboard::models::stage::{
    GenerationConfig, StageContext, StageResult, StageStatus,
};
use serde_json::json;

fn test_config() -> GenerationConfig {
    GenerationConfig {
        model: ModelChoice::Sonnet,
        duration_minutes: 1,
    }
}

#[test]
fn ok_result_carries_payload_without_error() {
    let result = StageResult::ok("content", json!({"outline": []}));
    assert_eq!(result.stage_name, "content");
    assert_eq!(result.status, StageStatus::Ok);
    assert!(result.error.is_none());
    assert!(result.payload.get("outline").is_some());
}

#[test]
fn retry_result_carries_error_detail() {
    let result = StageResult::retry("code_generation", "malformed output");
    assert_eq!(result.status, StageStatus::Retry);
    assert_eq!(result.error.as_deref(), Some("malformed output"));
    assert!(result.payload.is_null());
}

#[test]
fn fatal_result_carries_error_detail() {
    let result = StageResult::fatal("content", "invalid configuration");
    assert_eq!(result.status, StageStatus::Fatal);
    assert_eq!(result.error.as_deref(), Some("invalid configuration"));
}

#[test]
fn stage_status_serializes_to_snake_case() {
    assert_eq!(
        serde_json::to_string(&StageStatus::Ok).expect("serialize"),
        "\"ok\""
    );
    assert_eq!(
        serde_json::to_string(&StageStatus::Retry).expect("serialize"),
        "\"retry\""
    );
    assert_eq!(
        serde_json::to_string(&StageStatus::Fatal).expect("serialize"),
        "\"fatal\""
    );
}

#[test]
fn fresh_context_has_no_feedback() {
    let ctx = StageContext::new(Vec::new(), test_config());
    assert!(ctx.previous_error.is_none());
    assert!(ctx.history.is_empty());
}

#[test]
fn with_feedback_preserves_history_and_config() {
    let ctx = StageContext::new(Vec::new(), test_config());
    let retried = ctx.with_feedback("attempt 1 produced malformed output");
    assert_eq!(
        retried.previous_error.as_deref(),
        Some("attempt 1 produced malformed output")
    );
    assert_eq!(retried.config, ctx.config);
}
