//! Persistence contract consumed by the orchestrator.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{ApplicationAttempt, JobPosting};

/// Minimal storage interface the automation engine writes through.
///
/// The engine never reads postings back; it only needs the succeeded-attempt
/// count for a local day to seed (and re-seed on rollover) the quota counter.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Insert or refresh a discovered posting, keyed by its identity.
    async fn upsert_posting(&self, posting: &JobPosting) -> Result<()>;

    /// Append one application attempt.
    async fn record_attempt(&self, attempt: &ApplicationAttempt) -> Result<()>;

    /// Number of SUCCEEDED attempts whose local day is `date`.
    async fn today_count(&self, date: NaiveDate) -> Result<u32>;
}
