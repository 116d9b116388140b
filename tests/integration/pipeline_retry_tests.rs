//! Integration tests for pipeline retry semantics.
//!
//! Validates:
//! - a stage returning `retry` up to the budget then `ok` succeeds
//! - exhausting the budget fails the pipeline naming the stage
//! - `fatal` aborts immediately without consuming retries
//! - retried invocations see the prior attempt's error detail
//! - stage timeouts count as transient failures

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chalkboard::models::session::ModelChoice;
use chalkboard::models::stage::{GenerationConfig, StageContext, StageResult};
use chalkboard::pipeline::runner::PipelineRunner;
use chalkboard::pipeline::{FnStage, Stage};
use serde_json::json;

fn test_ctx() -> StageContext {
    StageContext::new(
        Vec::new(),
        GenerationConfig {
            model: ModelChoice::Sonnet,
            duration_minutes: 1,
        },
    )
}

/// Stage that fails transiently `failures` times, then succeeds.
fn flaky_stage(name: &'static str, failures: usize) -> (Box<dyn Stage>, Arc<AtomicUsize>) {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let stage = FnStage::new(name, move |input, _ctx| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < failures {
                StageResult::retry(name, format!("transient failure on attempt {attempt}"))
            } else {
                StageResult::ok(name, input)
            }
        }
    });
    (Box::new(stage), attempts)
}

#[tokio::test]
async fn retry_budget_then_ok_succeeds() {
    // Budget R = 2: two retries then ok is within budget.
    let (stage, attempts) = flaky_stage("flaky", 2);
    let runner = PipelineRunner::new(vec![stage], 2, Duration::from_secs(5));

    let result = runner
        .run(json!({"topic": "t"}), &test_ctx(), |_, _, _| {})
        .await;

    assert!(result.is_ok(), "expected success, got {result:?}");
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "initial + 2 retries");
}

#[tokio::test]
async fn exhausted_retry_budget_fails_naming_the_stage() {
    let (stage, attempts) = flaky_stage("unreliable", 10);
    let runner = PipelineRunner::new(vec![stage], 2, Duration::from_secs(5));

    let failure = runner
        .run(json!({"topic": "t"}), &test_ctx(), |_, _, _| {})
        .await
        .expect_err("budget must be exhausted");

    assert_eq!(failure.stage, "unreliable");
    assert!(failure.summary.contains("retry budget exhausted"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "initial + 2 retries only");
}

#[tokio::test]
async fn fatal_aborts_immediately() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let stage = FnStage::new("broken", move |_input, _ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { StageResult::fatal("broken", "invalid configuration") }
    });
    let runner = PipelineRunner::new(vec![Box::new(stage)], 2, Duration::from_secs(5));

    let failure = runner
        .run(json!({}), &test_ctx(), |_, _, _| {})
        .await
        .expect_err("fatal must abort");

    assert_eq!(failure.stage, "broken");
    assert_eq!(failure.summary, "invalid configuration");
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "no retries after fatal");
}

#[tokio::test]
async fn retried_invocation_sees_previous_error_detail() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::<Option<String>>::new()));
    let sink = Arc::clone(&seen);
    let stage = FnStage::new("feedback", move |input, ctx| {
        let sink = Arc::clone(&sink);
        async move {
            let mut guard = sink.lock().expect("lock");
            guard.push(ctx.previous_error.clone());
            if guard.len() == 1 {
                StageResult::retry("feedback", "malformed output: missing scene")
            } else {
                StageResult::ok("feedback", input)
            }
        }
    });
    let runner = PipelineRunner::new(vec![Box::new(stage)], 2, Duration::from_secs(5));

    runner
        .run(json!({}), &test_ctx(), |_, _, _| {})
        .await
        .expect("second attempt succeeds");

    let observed = seen.lock().expect("lock");
    assert_eq!(observed.len(), 2);
    assert!(observed[0].is_none(), "first attempt has no feedback");
    assert_eq!(
        observed[1].as_deref(),
        Some("malformed output: missing scene")
    );
}

#[tokio::test]
async fn stage_timeout_counts_against_the_retry_budget() {
    let stage = FnStage::new("slow", |_input, _ctx| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        StageResult::ok("slow", json!({}))
    });
    let runner = PipelineRunner::new(vec![Box::new(stage)], 0, Duration::from_millis(100));

    let started = tokio::time::Instant::now();
    let failure = runner
        .run(json!({}), &test_ctx(), |_, _, _| {})
        .await
        .expect_err("timeout must fail the stage");

    assert_eq!(failure.stage, "slow");
    assert!(failure.summary.contains("timed out"));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "runner must not hang on a slow stage"
    );
}

#[tokio::test]
async fn stages_run_in_order_feeding_payloads_forward() {
    let first = FnStage::new("first", |_input, _ctx| async {
        StageResult::ok("first", json!({"step": 1}))
    });
    let second = FnStage::new("second", |input, _ctx| async move {
        assert_eq!(input["step"], 1, "second stage sees first stage's payload");
        StageResult::ok("second", json!({"step": 2}))
    });
    let runner = PipelineRunner::new(
        vec![Box::new(first), Box::new(second)],
        0,
        Duration::from_secs(5),
    );

    let mut callbacks = Vec::new();
    let payload = runner
        .run(json!({}), &test_ctx(), |stage, fraction, _msg| {
            callbacks.push((stage.to_owned(), fraction));
        })
        .await
        .expect("pipeline succeeds");

    assert_eq!(payload["step"], 2);
    // Before/after callbacks per stage: 0, 0.5, 0.5, 1.0.
    assert_eq!(callbacks.len(), 4);
    assert!((callbacks[0].1 - 0.0).abs() < f64::EPSILON);
    assert!((callbacks[1].1 - 0.5).abs() < f64::EPSILON);
    assert!((callbacks[3].1 - 1.0).abs() < f64::EPSILON);
    let fractions: Vec<f64> = callbacks.iter().map(|(_, f)| *f).collect();
    let mut sorted = fractions.clone();
    sorted.sort_by(f64::total_cmp);
    assert_eq!(fractions, sorted, "progress fractions never decrease");
}
