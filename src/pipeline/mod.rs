//! Agent pipeline: stage abstraction and ordered execution.
//!
//! The [`Stage`] trait decouples the pipeline runner from the concrete
//! LLM-backed transformations. All four stages (content research, visual
//! design, code generation, quality check) expose the same surface, so the
//! runner treats them uniformly: invoke, classify the result, retry or abort.

pub mod runner;
pub mod stages;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::models::stage::{StageContext, StageResult};

/// One transformation step in the generation pipeline.
///
/// A stage is a pure function over its inputs: it must not touch shared
/// state, and it must not block indefinitely — the runner applies the
/// configured timeout around every invocation.
pub trait Stage: Send + Sync {
    /// Stable stage name used in progress events and failure reports.
    fn name(&self) -> &str;

    /// Run the stage over `input`, producing a classified [`StageResult`].
    ///
    /// `input` is the previous stage's payload, or the initial request
    /// payload for the first stage. Retried invocations see the prior
    /// attempt's error detail in `ctx.previous_error`.
    fn run<'a>(
        &'a self,
        input: Value,
        ctx: &'a StageContext,
    ) -> Pin<Box<dyn Future<Output = StageResult> + Send + 'a>>;
}

/// Adapter turning an async closure into a [`Stage`].
///
/// Used by tests to script stage behavior without a backend.
pub struct FnStage<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnStage<F>
where
    F: Fn(Value, StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = StageResult> + Send + 'static,
{
    /// Wrap `func` as a stage named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F, Fut> Stage for FnStage<F>
where
    F: Fn(Value, StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = StageResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        input: Value,
        ctx: &'a StageContext,
    ) -> Pin<Box<dyn Future<Output = StageResult> + Send + 'a>> {
        Box::pin((self.func)(input, ctx.clone()))
    }
}
