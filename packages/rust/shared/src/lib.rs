//! Shared types, error model, and configuration for Euclid.
//!
//! This crate is the foundation depended on by all other Euclid crates.
//! It provides:
//! - [`EuclidError`] — the unified error type
//! - Domain types ([`PipelineStatus`], [`Stage`], [`DatasetRow`], [`ExportFormat`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, DEFAULT_BASE_URL, ExportConfig, PreviewConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_base_url,
};
pub use error::{EuclidError, Result};
pub use types::{
    DatasetPreview, DatasetRow, DatasetSnapshot, DatasetStats, ExportFormat,
    PIPELINE_COMPLETED_MESSAGE, PipelineStatus, PipelineStep, READY_MESSAGE, Stage, StageOutcome,
    StageState,
};
