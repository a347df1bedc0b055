//! rigchat - classification-aware routing and streaming core for LLM chat
//!
//! This library decides where each query runs (response cache, local Ollama
//! model, or an OpenRouter cloud tier), streams the answer through a batching
//! buffer and a change-detecting redraw gate, and keeps classified data on
//! the local machine under every code path.

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod router;
pub mod security;
pub mod session;
pub mod stats;
pub mod stream;
pub mod telemetry;
