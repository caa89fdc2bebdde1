//! Shared types, error model, and configuration for JobPilot.
//!
//! This crate is the foundation depended on by all other JobPilot crates.
//! It provides:
//! - [`JobPilotError`]: the unified error type
//! - Domain types ([`JobPosting`], [`ProfileCriteria`], [`MatchResult`], [`ApplicationAttempt`])
//! - Scheduling primitives ([`TimeWindow`], [`WeekdayPolicy`])
//! - Configuration ([`AppConfig`], [`RunOptions`], config loading)
//! - The [`Persistence`] contract

pub mod config;
pub mod error;
pub mod persistence;
pub mod schedule;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, Credentials, ExecutorConfig, MatchWeights, ProfileConfig, RunConfig, RunOptions,
    ScheduleConfig, SessionConfig, SiteConfig, StorageConfig, WindowConfig, config_dir,
    config_file_path, db_path, init_config, load_config, load_config_from, load_credentials,
    state_dir,
};
pub use error::{ErrorCategory, JobPilotError, Result};
pub use persistence::Persistence;
pub use schedule::{TimeWindow, WeekdayPolicy, parse_weekday};
pub use types::{
    ApplicationAttempt, FailureReason, JobPosting, MatchResult, Outcome, PostingId,
    ProfileCriteria, QuotaCounter, RunId, SubScores,
};
