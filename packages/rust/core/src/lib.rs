//! Automation engine for JobPilot.
//!
//! This crate ties the session, extractor and persistence layers together
//! into a single sequential run:
//! - [`scorer`]: weighted match between a posting and the profile
//! - [`quota`]: daily limit, time window and weekday gate
//! - [`navigator`]: search and incremental result loading
//! - [`executor`]: the per-posting Easy Apply state machine
//! - [`orchestrator`]: the end-to-end run and its summary

pub mod context;
pub mod executor;
pub mod interruption;
pub mod navigator;
pub mod orchestrator;
pub mod quota;
pub mod scorer;

#[cfg(test)]
mod testing;

pub use context::{Clock, EventKind, FixedClock, RunContext, RunEvent, SkipReason, SystemClock};
pub use executor::{ApplicationExecutor, ApplyFlow, ApplyState, ExecutionReport};
pub use navigator::{Discovery, Navigator, NavigatorOptions, StopReason, build_search_url};
pub use orchestrator::{HaltReason, Orchestrator, RunSummary, SkipCounts};
pub use quota::{Decision, DenyReason, decide, next_allowed};
pub use scorer::MatchScorer;
