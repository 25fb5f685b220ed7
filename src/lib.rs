//! Kiln - Reproducible, Cached, Sandboxed Build-Artifact Optimizer
//!
//! Orchestrates an opaque compile-and-optimize pipeline inside a container
//! sandbox with persistent cache volumes and per-cache build serialization.

pub mod artifact;
pub mod cache;
pub mod cancel;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod engine;
pub mod error;
pub mod provision;
pub mod runtime;
pub mod sandbox;

pub use error::{KilnError, KilnResult};
