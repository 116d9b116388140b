#![forbid(unsafe_code)]

//! `chalkboard` — educational animation generation server.
//!
//! Orchestrates a pipeline of LLM-backed agent stages (content research,
//! visual design, code generation, quality check) into Manim scene source,
//! renders it through the external engine, and streams progress events to
//! subscribers.

pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod render;
pub mod server;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
