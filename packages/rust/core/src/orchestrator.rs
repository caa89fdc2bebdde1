//! End-to-end run: authenticate → discover → filter → gate → apply → record.
//!
//! Candidates are processed one at a time in discovery order. Per-job
//! failures never stop the run; auth challenges and fatal session errors do.
//! The session is closed on every exit path.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use jobpilot_extractor::JobCardExtractor;
use jobpilot_session::SessionManager;
use jobpilot_shared::{
    AppConfig, ApplicationAttempt, Credentials, JobPilotError, JobPosting, MatchResult, Outcome,
    Persistence, ProfileCriteria, QuotaCounter, Result, RunId, RunOptions,
};

use crate::context::{EventKind, RunContext, SkipReason};
use crate::executor::{ApplicationExecutor, ExecutionReport};
use crate::navigator::Navigator;
use crate::quota::{self, Decision, DenyReason};
use crate::scorer::MatchScorer;

/// Poll interval while waiting for a human to clear a login challenge.
const CHALLENGE_POLL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Why a run stopped before the candidate list was exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    QuotaReached {
        count: u32,
        limit: u32,
    },
    ScheduleDenied {
        reason: DenyReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_allowed: Option<NaiveDateTime>,
    },
    MaxApplicationsReached {
        limit: u32,
    },
    Cancelled,
    AuthChallengeRequired {
        url: String,
    },
    FatalSession {
        message: String,
    },
}

impl HaltReason {
    /// Whether the halt needs operator attention.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::AuthChallengeRequired { .. } | Self::FatalSession { .. })
    }

    fn from_error(e: &JobPilotError) -> Option<Self> {
        match e {
            JobPilotError::AuthChallengeRequired { url } => {
                Some(Self::AuthChallengeRequired { url: url.clone() })
            }
            e if e.halts_run() => Some(Self::FatalSession {
                message: e.to_string(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuotaReached { count, limit } => {
                write!(f, "daily quota reached ({count}/{limit})")
            }
            Self::ScheduleDenied {
                reason,
                next_allowed: Some(next),
            } => write!(f, "{reason}; next allowed at {}", next.format("%a %Y-%m-%d %H:%M")),
            Self::ScheduleDenied { reason, .. } => write!(f, "{reason}"),
            Self::MaxApplicationsReached { limit } => {
                write!(f, "max applications for this run reached ({limit})")
            }
            Self::Cancelled => f.write_str("cancelled"),
            Self::AuthChallengeRequired { url } => {
                write!(f, "authentication challenge at {url}")
            }
            Self::FatalSession { message } => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub duplicate: u32,
    pub not_easy_apply: u32,
    pub blacklisted: u32,
    pub below_threshold: u32,
    pub extraction_failed: u32,
}

impl SkipCounts {
    pub fn total(&self) -> u32 {
        self.duplicate
            + self.not_easy_apply
            + self.blacklisted
            + self.below_threshold
            + self.extraction_failed
    }

    fn bump(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Duplicate => self.duplicate += 1,
            SkipReason::NotEasyApply => self.not_easy_apply += 1,
            SkipReason::Blacklisted => self.blacklisted += 1,
            SkipReason::BelowThreshold => self.below_threshold += 1,
            SkipReason::ExtractionFailed => self.extraction_failed += 1,
            SkipReason::DryRun => {}
        }
    }
}

/// Structured result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    /// Postings discovered (before filtering).
    pub candidates: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub indeterminate: u32,
    pub skipped: SkipCounts,
    /// Postings a dry run would have applied to.
    pub dry_run_eligible: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<MatchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt: Option<HaltReason>,
}

impl RunSummary {
    pub fn new(run_id: RunId, started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: None,
            dry_run,
            candidates: 0,
            succeeded: 0,
            failed: 0,
            indeterminate: 0,
            skipped: SkipCounts::default(),
            dry_run_eligible: 0,
            matches: Vec::new(),
            halt: None,
        }
    }

    pub fn attempted(&self) -> u32 {
        self.succeeded + self.failed + self.indeterminate
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    options: RunOptions,
    scorer: MatchScorer,
    navigator: Navigator,
    executor: ApplicationExecutor,
    persistence: Arc<dyn Persistence>,
}

impl Orchestrator {
    pub fn new(
        options: RunOptions,
        scorer: MatchScorer,
        navigator: Navigator,
        executor: ApplicationExecutor,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            scorer,
            navigator,
            executor,
            persistence,
        })
    }

    /// Build every component from the config file, with `options` already
    /// merged from file and command line.
    pub fn from_config(
        config: &AppConfig,
        options: RunOptions,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self> {
        let profile = ProfileCriteria::from(&config.profile);
        let scorer = MatchScorer::new(profile.clone(), config.scoring)?;
        let navigator = Navigator::for_profile(
            Arc::new(JobCardExtractor::builtin()?),
            &config.site.search_url()?,
            &profile,
            &options,
        );
        let executor = ApplicationExecutor::new(config.executor.clone(), profile);
        Self::new(options, scorer, navigator, executor, persistence)
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Drive one run to completion. Halts (quota, schedule, auth, fatal
    /// session errors) are reported in the summary; only collaborator
    /// failures such as storage errors come back as `Err`.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, dry_run = self.options.dry_run))]
    pub async fn run(
        &mut self,
        session: &mut SessionManager,
        credentials: &Credentials,
        ctx: &RunContext,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::new(ctx.run_id, ctx.clock.now(), self.options.dry_run);
        info!("run started");

        let driven = self.drive(session, credentials, ctx, &mut summary).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "session could not be released cleanly");
        }
        summary.finished_at = Some(ctx.clock.now());

        let outcome = match driven {
            Ok(()) => Ok(()),
            Err(e) => match HaltReason::from_error(&e) {
                Some(halt) => {
                    warn!(error = %e, "run halted");
                    ctx.emit(EventKind::SessionError {
                        message: e.to_string(),
                        halted: true,
                    });
                    summary.halt = Some(halt);
                    Ok(())
                }
                None => Err(e),
            },
        };

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            indeterminate = summary.indeterminate,
            skipped = summary.skipped.total(),
            dry_run_eligible = summary.dry_run_eligible,
            halt = summary.halt.as_ref().map(|h| h.to_string()),
            "run finished"
        );
        ctx.emit(EventKind::RunFinished {
            summary: Box::new(summary.clone()),
        });
        outcome.map(|()| summary)
    }

    async fn drive(
        &mut self,
        session: &mut SessionManager,
        credentials: &Credentials,
        ctx: &RunContext,
        summary: &mut RunSummary,
    ) -> Result<()> {
        session.open().await?;
        match session.authenticate(credentials).await {
            Ok(()) => {}
            Err(e @ JobPilotError::AuthChallengeRequired { .. }) => {
                ctx.emit(EventKind::SessionError {
                    message: e.to_string(),
                    halted: false,
                });
                if !self.await_challenge(session, ctx).await? {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }

        let discovery = self.navigator.discover(session, ctx).await?;
        if ctx.is_cancelled() {
            summary.halt = Some(HaltReason::Cancelled);
            return Ok(());
        }
        summary.candidates = discovery.postings.len() as u32;
        summary.skipped.extraction_failed += discovery.failures.len() as u32;
        for posting in &discovery.postings {
            self.persistence.upsert_posting(posting).await?;
        }

        let today = ctx.clock.local_now().date();
        let mut counter = QuotaCounter::new(
            today,
            self.persistence.today_count(today).await?,
            self.options.daily_limit,
        );
        debug!(count = counter.count, limit = counter.limit, "quota counter seeded");

        let mut seen = HashSet::new();
        let mut taken: u32 = 0;
        // Dry-run picks for the current day. Gated like real successes, never persisted.
        let mut simulated: u32 = 0;

        for posting in discovery.postings {
            if ctx.is_cancelled() {
                info!("cancellation requested, stopping between jobs");
                summary.halt = Some(HaltReason::Cancelled);
                return Ok(());
            }
            if !seen.insert(posting.id.clone()) {
                self.skip(ctx, summary, &posting, SkipReason::Duplicate, None);
                continue;
            }
            if self.options.easy_apply_only && !posting.easy_apply {
                self.skip(ctx, summary, &posting, SkipReason::NotEasyApply, None);
                continue;
            }
            if self.scorer.profile().is_blacklisted(&posting.company) {
                self.skip(ctx, summary, &posting, SkipReason::Blacklisted, None);
                continue;
            }

            let matched = self.scorer.score(&posting);
            summary.matches.push(matched.clone());
            if let Some(threshold) = self.options.match_threshold {
                if matched.score < threshold {
                    let detail = format!("score {:.2} < {threshold:.2}", matched.score);
                    self.skip(ctx, summary, &posting, SkipReason::BelowThreshold, Some(detail));
                    continue;
                }
            }

            let now = ctx.clock.local_now();
            if now.date() != counter.date {
                let count = self.persistence.today_count(now.date()).await?;
                debug!(day = %now.date(), count, "local day rolled over, quota counter reseeded");
                counter = QuotaCounter::new(now.date(), count, self.options.daily_limit);
                simulated = 0;
            }
            let count = counter.count + simulated;
            match quota::decide(
                now,
                count,
                counter.limit,
                &self.options.allowed_windows,
                &self.options.weekday_policy,
            ) {
                Decision::Allow => {}
                Decision::Deny(DenyReason::DailyLimitReached) => {
                    info!(count, limit = counter.limit, "daily quota reached");
                    ctx.emit(EventKind::QuotaReached {
                        count,
                        limit: counter.limit,
                    });
                    summary.halt = Some(HaltReason::QuotaReached {
                        count,
                        limit: counter.limit,
                    });
                    return Ok(());
                }
                Decision::Deny(reason) => {
                    let next_allowed = quota::next_allowed(
                        now,
                        &self.options.allowed_windows,
                        &self.options.weekday_policy,
                    );
                    info!(%reason, ?next_allowed, "outside the allowed schedule");
                    summary.halt = Some(HaltReason::ScheduleDenied {
                        reason,
                        next_allowed,
                    });
                    return Ok(());
                }
            }

            if self.options.dry_run {
                summary.dry_run_eligible += 1;
                simulated += 1;
                taken += 1;
                info!(posting = %posting.id, score = matched.score, "dry run: would apply");
                ctx.emit(EventKind::JobSkipped {
                    posting_id: Some(posting.id.clone()),
                    reason: SkipReason::DryRun,
                    detail: Some(format!("score {:.2}", matched.score)),
                });
            } else if self
                .attempt(session, ctx, summary, &posting, &matched, counter.date)
                .await?
            {
                counter.record_success();
                taken += 1;
                if taken < self.options.max_applications {
                    self.cool_down(ctx).await;
                }
            }

            if taken >= self.options.max_applications {
                info!(limit = self.options.max_applications, "max applications reached");
                summary.halt = Some(HaltReason::MaxApplicationsReached {
                    limit: self.options.max_applications,
                });
                return Ok(());
            }
        }
        Ok(())
    }

    /// Apply to one posting and record the attempt. Returns whether it
    /// succeeded. A halting error is recorded as INDETERMINATE, then returned.
    async fn attempt(
        &self,
        session: &SessionManager,
        ctx: &RunContext,
        summary: &mut RunSummary,
        posting: &JobPosting,
        matched: &MatchResult,
        day: chrono::NaiveDate,
    ) -> Result<bool> {
        ctx.emit(EventKind::ApplicationAttempted {
            posting_id: posting.id.clone(),
            title: posting.title.clone(),
            company: posting.company.clone(),
            score: Some(matched.score),
        });
        let attempted_at = ctx.clock.now();

        let (report, halt) = match self.executor.apply(session, ctx, posting, Some(matched)).await {
            Ok(report) => (report, None),
            Err(e) => (
                ExecutionReport {
                    outcome: Outcome::Indeterminate,
                    failure: None,
                    detail: Some(e.to_string()),
                    last_state: crate::executor::ApplyState::Detected,
                    tries: Vec::new(),
                },
                Some(e),
            ),
        };

        let attempt = ApplicationAttempt {
            id: Uuid::now_v7(),
            posting_id: posting.id.clone(),
            run_id: ctx.run_id,
            attempted_at,
            day,
            outcome: report.outcome,
            failure: report.failure,
            detail: report.detail.clone(),
            needs_review: report.needs_review(),
            match_score: Some(matched.score),
        };
        self.persistence.record_attempt(&attempt).await?;

        match report.outcome {
            Outcome::Succeeded => summary.succeeded += 1,
            Outcome::Failed => summary.failed += 1,
            Outcome::Indeterminate => summary.indeterminate += 1,
        }
        ctx.emit(EventKind::ApplicationResult {
            posting_id: posting.id.clone(),
            outcome: report.outcome,
            reason: report.failure,
        });

        match halt {
            Some(e) => Err(e),
            None => Ok(report.outcome == Outcome::Succeeded),
        }
    }

    fn skip(
        &self,
        ctx: &RunContext,
        summary: &mut RunSummary,
        posting: &JobPosting,
        reason: SkipReason,
        detail: Option<String>,
    ) {
        debug!(posting = %posting.id, ?reason, "skipping candidate");
        summary.skipped.bump(reason);
        ctx.emit(EventKind::JobSkipped {
            posting_id: Some(posting.id.clone()),
            reason,
            detail,
        });
    }

    async fn cool_down(&self, ctx: &RunContext) {
        let pause = self.options.cooldown;
        if pause.is_zero() {
            return;
        }
        debug!(?pause, "cooling down");
        tokio::select! {
            _ = ctx.cancel.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    }

    /// Wait up to the configured grace period for a human to clear a login
    /// challenge. Returns `true` once the session is active.
    async fn await_challenge(&self, session: &mut SessionManager, ctx: &RunContext) -> Result<bool> {
        let grace = self.options.auth_challenge_grace;
        if grace.is_zero() {
            return Ok(false);
        }
        info!(?grace, "waiting for the login challenge to be resolved");
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep(CHALLENGE_POLL.min(grace)) => {}
            }
            match session.confirm_authenticated().await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) if e.is_retryable() => debug!(error = %e, "challenge check failed"),
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }
}
