//! Ordered stage execution with bounded retries and progress callbacks.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::models::stage::{StageContext, StageStatus};
use crate::pipeline::Stage;

/// Failure report naming the stage that aborted the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    /// Name of the failing stage.
    pub stage: String,
    /// Human-readable failure summary.
    pub summary: String,
}

/// Runs an ordered list of stages, feeding each stage's payload to the next.
///
/// Owns no state across runs: every call to [`PipelineRunner::run`] starts
/// from the supplied input and the stages' own behavior.
pub struct PipelineRunner {
    stages: Vec<Box<dyn Stage>>,
    max_retries: u32,
    stage_timeout: Duration,
}

impl PipelineRunner {
    /// Build a runner over `stages` with the given retry budget and
    /// per-attempt timeout.
    #[must_use]
    pub fn new(stages: Vec<Box<dyn Stage>>, max_retries: u32, stage_timeout: Duration) -> Self {
        Self {
            stages,
            max_retries,
            stage_timeout,
        }
    }

    /// Number of stages in the fixed execution order.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Execute all stages in order, returning the final payload.
    ///
    /// Each stage is attempted up to `1 + max_retries` times on `Retry`
    /// results; the prior attempt's error detail is fed back through the
    /// stage context. A `Fatal` result, an exhausted retry budget, or a
    /// timed-out final attempt aborts immediately.
    ///
    /// `on_progress(stage_name, fraction, message)` fires before each stage
    /// starts (`index / total`) and after it completes (`(index + 1) / total`).
    ///
    /// # Errors
    ///
    /// Returns a [`StageFailure`] naming the stage and cause when any stage
    /// fails past its retry budget or fatally.
    pub async fn run(
        &self,
        initial: Value,
        ctx: &StageContext,
        mut on_progress: impl FnMut(&str, f64, &str) + Send,
    ) -> std::result::Result<Value, StageFailure> {
        #[allow(clippy::cast_precision_loss)]
        let total = self.stages.len() as f64;
        let mut payload = initial;

        for (index, stage) in self.stages.iter().enumerate() {
            let name = stage.name();
            #[allow(clippy::cast_precision_loss)]
            let started_fraction = index as f64 / total;
            on_progress(name, started_fraction, &format!("Running {name} stage"));

            payload = self
                .run_stage(stage.as_ref(), payload, ctx, &mut on_progress, index)
                .await?;

            #[allow(clippy::cast_precision_loss)]
            let done_fraction = (index + 1) as f64 / total;
            on_progress(name, done_fraction, &format!("Stage {name} complete"));
        }

        Ok(payload)
    }

    /// Attempt one stage with retries, returning its `Ok` payload.
    async fn run_stage(
        &self,
        stage: &dyn Stage,
        input: Value,
        ctx: &StageContext,
        on_progress: &mut (impl FnMut(&str, f64, &str) + Send),
        index: usize,
    ) -> std::result::Result<Value, StageFailure> {
        let name = stage.name().to_owned();
        #[allow(clippy::cast_precision_loss)]
        let fraction = index as f64 / self.stages.len() as f64;

        let mut attempt_ctx = ctx.clone();
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            let outcome =
                tokio::time::timeout(self.stage_timeout, stage.run(input.clone(), &attempt_ctx))
                    .await;

            let result = match outcome {
                Ok(result) => result,
                Err(_) => {
                    // Timeouts count as transient failures against the budget.
                    warn!(stage = %name, attempt, "stage attempt timed out");
                    last_error = format!("stage timed out after {:?}", self.stage_timeout);
                    on_progress(&name, fraction, &format!("Retrying {name} after timeout"));
                    attempt_ctx = ctx.with_feedback(&last_error);
                    continue;
                }
            };

            match result.status {
                StageStatus::Ok => {
                    if attempt > 0 {
                        info!(stage = %name, attempt, "stage succeeded after retry");
                    }
                    return Ok(result.payload);
                }
                StageStatus::Retry => {
                    last_error = result.error.unwrap_or_else(|| "unspecified".into());
                    warn!(stage = %name, attempt, error = %last_error, "transient stage failure");
                    on_progress(&name, fraction, &format!("Retrying {name} stage"));
                    attempt_ctx = ctx.with_feedback(&last_error);
                }
                StageStatus::Fatal => {
                    let summary = result.error.unwrap_or_else(|| "unspecified".into());
                    warn!(stage = %name, attempt, error = %summary, "fatal stage failure");
                    return Err(StageFailure {
                        stage: name,
                        summary,
                    });
                }
            }
        }

        Err(StageFailure {
            stage: name,
            summary: format!(
                "retry budget exhausted after {} attempts: {last_error}",
                self.max_retries + 1
            ),
        })
    }
}
