//! Core domain types shared by the automation engine.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Stable identity of a posting: its canonical source URL.
///
/// Query strings and fragments are dropped because job boards decorate the
/// same posting link with tracking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingId(String);

impl PostingId {
    pub fn from_url(url: &Url) -> Self {
        let mut canonical = url.clone();
        canonical.set_query(None);
        canonical.set_fragment(None);
        let mut s = canonical.to_string();
        if s.ends_with('/') && canonical.path() != "/" {
            s.pop();
        }
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// JobPosting
// ---------------------------------------------------------------------------

/// A job posting as extracted from a result card. Read-only after extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: PostingId,
    /// Absolute URL of the posting page.
    pub url: Url,
    pub title: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Whether the posting can be applied to without leaving the platform.
    pub easy_apply: bool,
    /// Raw requirement text (card snippet or description).
    pub requirements: String,
    pub discovered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ProfileCriteria
// ---------------------------------------------------------------------------

/// Candidate profile the postings are matched against. Immutable during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileCriteria {
    /// Search keywords.
    pub keywords: Vec<String>,
    /// Skills, normalized to lowercase.
    pub skills: BTreeSet<String>,
    pub experience_years: u32,
    /// Education tags (e.g. "bachelor computer science").
    pub education: Vec<String>,
    /// Preferred location, matched as a case-insensitive substring.
    pub location: Option<String>,
    /// Whether remote postings satisfy the location preference.
    pub remote_ok: bool,
    pub industries: Vec<String>,
    /// Companies never applied to.
    pub blacklisted_companies: Vec<String>,
}

impl ProfileCriteria {
    pub fn is_blacklisted(&self, company: &str) -> bool {
        let company = company.trim().to_lowercase();
        self.blacklisted_companies
            .iter()
            .any(|c| c.trim().to_lowercase() == company)
    }
}

// ---------------------------------------------------------------------------
// MatchResult
// ---------------------------------------------------------------------------

/// Per-dimension sub-scores, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub skills: f64,
    pub experience: f64,
    pub education: f64,
    pub location: f64,
    pub industry: f64,
}

/// Compatibility between a posting and the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub posting_id: PostingId,
    /// Weighted score in `[0, 100]`.
    pub score: f64,
    pub matched_skills: BTreeSet<String>,
    pub missing_skills: BTreeSet<String>,
    pub breakdown: SubScores,
}

// ---------------------------------------------------------------------------
// ApplicationAttempt
// ---------------------------------------------------------------------------

/// Terminal outcome of one application attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    /// The post-submission page could not be classified; needs a human.
    Indeterminate,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Indeterminate => "indeterminate",
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "indeterminate" => Ok(Self::Indeterminate),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ElementNotFound,
    ValidationError,
    UnexpectedRedirect,
    Timeout,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ElementNotFound => "element_not_found",
            Self::ValidationError => "validation_error",
            Self::UnexpectedRedirect => "unexpected_redirect",
            Self::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "element_not_found" => Ok(Self::ElementNotFound),
            "validation_error" => Ok(Self::ValidationError),
            "unexpected_redirect" => Ok(Self::UnexpectedRedirect),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("unknown failure reason '{other}'")),
        }
    }
}

/// A recorded application attempt. Only created after the quota gate allowed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationAttempt {
    pub id: Uuid,
    pub posting_id: PostingId,
    pub run_id: RunId,
    pub attempted_at: DateTime<Utc>,
    /// Local calendar day the attempt counts against.
    pub day: NaiveDate,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Set for indeterminate outcomes.
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
}

// ---------------------------------------------------------------------------
// QuotaCounter
// ---------------------------------------------------------------------------

/// Count of succeeded applications for one local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub date: NaiveDate,
    pub count: u32,
    pub limit: u32,
}

impl QuotaCounter {
    pub fn new(date: NaiveDate, count: u32, limit: u32) -> Self {
        Self { date, count, limit }
    }

    /// Record one confirmed success. The only way `count` changes within a day.
    pub fn record_success(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}
