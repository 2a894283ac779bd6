//! ConsentForge Core - Consent Banner Compiler
//!
//! # The Rules (Non-Negotiable)
//! 1. Templates Are Contracts: nothing is generated from an invalid tree
//! 2. Every Banner Can Be Refused: `accept_all` and `reject_all` are required
//! 3. Generated Text Never Escapes Its Context
//! 4. A Broken Stage Degrades, It Does Not Fail
//! 5. The Script Is the Runtime: `runtime` models exactly what it does

pub mod config;
pub mod consent;
pub mod hashing;
pub mod markup;
pub mod minify;
pub mod panel;
pub mod pipeline;
pub mod runtime;
pub mod script;
pub mod style;
pub mod templates;
pub mod tree;
pub mod validation;

pub use config::{EngineConfig, ValidationLimits};
pub use consent::{Category, ConsentState};
pub use hashing::{canonical_json, compute_request_hash, sri_integrity};
pub use pipeline::{
    GeneratedArtifacts, GenerationError, GenerationOptions, GenerationPipeline, OutputFormat,
    PipelineError, Stage,
};
pub use runtime::{ConsentRuntime, RuntimeConfig, RuntimeError, UserAction};
pub use templates::{normalize_positions, BannerTemplate, Component};
pub use tree::{BannerModel, ModelError};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
