//! Concrete pipeline stages and the LLM boundary they sit on.
//!
//! The fixed stage order is `content` → `visual_design` → `code_generation`
//! → `quality_check`. The first three delegate to a [`GenerationBackend`],
//! the opaque seam behind which the actual LLM calls live; the quality check
//! is a local structural pass over the generated scene source that repairs
//! what it can and rejects what it cannot.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::models::stage::{StageContext, StageResult};
use crate::pipeline::Stage;

/// Content research stage name.
pub const STAGE_CONTENT: &str = "content";
/// Visual design stage name.
pub const STAGE_VISUAL_DESIGN: &str = "visual_design";
/// Code generation stage name.
pub const STAGE_CODE_GENERATION: &str = "code_generation";
/// Quality check stage name.
pub const STAGE_QUALITY_CHECK: &str = "quality_check";

/// Opaque boundary to the LLM serving the generation stages.
///
/// Implementations receive the stage name, the accumulated input payload,
/// and the stage context (history, model, duration, retry feedback), and
/// return the stage's raw output. An `Err` is treated as a transient
/// failure by the calling stage.
pub trait GenerationBackend: Send + Sync {
    /// Invoke the model behind `stage` over `input`.
    fn invoke<'a>(
        &'a self,
        stage: &'a str,
        input: &'a Value,
        ctx: &'a StageContext,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Value, String>> + Send + 'a>>;
}

/// A stage that forwards its input to the [`GenerationBackend`] and merges
/// the backend's output into the accumulated payload under `output_key`.
struct BackendStage {
    name: &'static str,
    output_key: &'static str,
    backend: Arc<dyn GenerationBackend>,
}

impl Stage for BackendStage {
    fn name(&self) -> &str {
        self.name
    }

    fn run<'a>(
        &'a self,
        input: Value,
        ctx: &'a StageContext,
    ) -> Pin<Box<dyn Future<Output = StageResult> + Send + 'a>> {
        Box::pin(async move {
            match self.backend.invoke(self.name, &input, ctx).await {
                Ok(output) => {
                    let mut accumulated = match input {
                        Value::Object(map) => Value::Object(map),
                        other => json!({ "input": other }),
                    };
                    if let Value::Object(ref mut map) = accumulated {
                        map.insert(self.output_key.to_owned(), output);
                    }
                    StageResult::ok(self.name, accumulated)
                }
                Err(detail) => StageResult::retry(self.name, detail),
            }
        })
    }
}

/// Structural quality pass over the generated scene source.
///
/// Repairs the defects the render engine most commonly chokes on
/// (unbalanced delimiters, deprecated animation names) and fails fatally
/// when the source is structurally unusable, since re-running a
/// deterministic check cannot change its outcome.
struct QualityCheckStage;

impl Stage for QualityCheckStage {
    fn name(&self) -> &str {
        STAGE_QUALITY_CHECK
    }

    fn run<'a>(
        &'a self,
        input: Value,
        _ctx: &'a StageContext,
    ) -> Pin<Box<dyn Future<Output = StageResult> + Send + 'a>> {
        Box::pin(async move {
            let Some(code) = input.get("code").and_then(Value::as_str) else {
                return StageResult::fatal(
                    STAGE_QUALITY_CHECK,
                    "code generation produced no source",
                );
            };

            if code.trim().is_empty() {
                return StageResult::fatal(STAGE_QUALITY_CHECK, "generated source is empty");
            }

            let repaired = repair_source(code);

            if !repaired.contains("Scene") {
                return StageResult::fatal(
                    STAGE_QUALITY_CHECK,
                    "generated source defines no Scene class",
                );
            }

            let mut accumulated = input;
            if let Value::Object(ref mut map) = accumulated {
                map.insert("code".into(), Value::String(repaired));
            }
            StageResult::ok(STAGE_QUALITY_CHECK, accumulated)
        })
    }
}

/// Replacements for animation classes removed from current Manim releases.
const DEPRECATED_ANIMATIONS: [(&str, &str); 4] = [
    ("ShowCreation(", "Create("),
    ("ShowIncreasingSubsets(", "Create("),
    ("CircleIndicate(", "Indicate("),
    ("WiggleOutThenIn(", "Wiggle("),
];

/// Apply mechanical repairs to generated scene source.
///
/// Balances trailing delimiters and swaps deprecated animation names for
/// their modern equivalents. Returns the repaired source.
#[must_use]
pub fn repair_source(code: &str) -> String {
    let mut repaired = code.to_owned();

    for (old, new) in DEPRECATED_ANIMATIONS {
        if repaired.contains(old) {
            info!(deprecated = old, replacement = new, "replaced deprecated animation");
            repaired = repaired.replace(old, new);
        }
    }

    for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
        let opens = repaired.matches(open).count();
        let closes = repaired.matches(close).count();
        if opens > closes {
            info!(
                delimiter = %open,
                missing = opens - closes,
                "balanced unclosed delimiters"
            );
            repaired.extend(std::iter::repeat_n(close, opens - closes));
        }
    }

    repaired
}

/// Build the fixed four-stage pipeline over `backend`.
#[must_use]
pub fn default_stages(backend: Arc<dyn GenerationBackend>) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(BackendStage {
            name: STAGE_CONTENT,
            output_key: "outline",
            backend: Arc::clone(&backend),
        }),
        Box::new(BackendStage {
            name: STAGE_VISUAL_DESIGN,
            output_key: "design",
            backend: Arc::clone(&backend),
        }),
        Box::new(BackendStage {
            name: STAGE_CODE_GENERATION,
            output_key: "code",
            backend,
        }),
        Box::new(QualityCheckStage),
    ]
}

/// Deterministic backend producing canned stage outputs.
///
/// Stands in for the LLM at the [`GenerationBackend`] seam: end-to-end flows
/// (and the test suite) exercise the full pipeline shape without network
/// calls. The generated scene source is a minimal but renderable Manim scene
/// titled after the topic.
#[derive(Debug, Default, Clone)]
pub struct ScriptedBackend;

impl GenerationBackend for ScriptedBackend {
    fn invoke<'a>(
        &'a self,
        stage: &'a str,
        input: &'a Value,
        ctx: &'a StageContext,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Value, String>> + Send + 'a>> {
        Box::pin(async move {
            let topic = input
                .get("topic")
                .and_then(Value::as_str)
                .unwrap_or("the topic")
                .to_owned();

            match stage {
                STAGE_CONTENT => Ok(json!({
                    "topic": topic,
                    "sections": [
                        format!("Introduce {topic}"),
                        format!("Walk through {topic} step by step"),
                        "Summarize the key idea",
                    ],
                    "target_minutes": ctx.config.duration_minutes,
                })),
                STAGE_VISUAL_DESIGN => Ok(json!({
                    "scenes": [
                        { "name": "Title", "elements": ["title text"] },
                        { "name": "Walkthrough", "elements": ["step animation"] },
                    ],
                })),
                STAGE_CODE_GENERATION => Ok(Value::String(scene_source(&topic))),
                other => Err(format!("scripted backend has no output for stage {other}")),
            }
        })
    }
}

/// Minimal Manim scene source for `topic`.
fn scene_source(topic: &str) -> String {
    let title = topic.replace('"', "'");
    format!(
        "from manim import *\n\n\
         class Explainer(Scene):\n\
         \x20   def construct(self):\n\
         \x20       title = Text(\"{title}\")\n\
         \x20       self.play(Write(title))\n\
         \x20       self.wait(2)\n"
    )
}
