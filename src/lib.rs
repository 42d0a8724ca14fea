//! Conversational memory and context assembly for LLM agents.
//!
//! Two operations drive everything:
//! - `commit_turn`: append a turn's events, run memory candidates
//!   through retention gates, reconcile them against the store and
//!   refresh the working summary
//! - `compose_context`: plan retrieval, gather local and external
//!   evidence, fuse it under diversity and budget caps, and emit a
//!   `ContextPackage` for the LLM-calling layer
//!
//! State is in-memory and session-scoped. Wire shapes carry a contract
//! version and are validated at every pipeline boundary.

pub mod composer;
pub mod consolidator;
pub mod contracts;
pub mod core;
pub mod extractor;
pub mod fusion;
pub mod logging;
pub mod models;
pub mod observability;
pub mod planner;
pub mod resource;
pub mod retrievers;
pub mod runtime;
pub mod server;
pub mod store;
pub mod text;

pub use crate::core::config::Config;
pub use crate::core::errors::EngineError;
pub use crate::runtime::Runtime;
