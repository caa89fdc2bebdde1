//! Run context threaded through the orchestrator, navigator and executor.
//!
//! Carries the run identity, a clock, the cancellation token, and an optional
//! event sink. Events are sent over an unbounded channel so emitting never
//! blocks the control loop.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_util::sync::CancellationToken;

use jobpilot_shared::{FailureReason, JobPosting, Outcome, PostingId, RunId};

use crate::executor::ApplyState;
use crate::orchestrator::RunSummary;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of time for quota decisions and timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local wall-clock time used by the scheduling gate.
    fn local_now(&self) -> NaiveDateTime;
}

/// The host clock, in the host's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A settable clock. Local time equals UTC.
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self { at: Mutex::new(at) }
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.at.lock().unwrap_or_else(|p| p.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut at = self.at.lock().unwrap_or_else(|p| p.into_inner());
        *at += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.local_now().and_utc()
    }

    fn local_now(&self) -> NaiveDateTime {
        *self.at.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Why a candidate was passed over without an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Duplicate,
    NotEasyApply,
    Blacklisted,
    BelowThreshold,
    ExtractionFailed,
    /// Eligible, but the run does not submit.
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    JobFound {
        posting: JobPosting,
    },
    JobSkipped {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        posting_id: Option<PostingId>,
        reason: SkipReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    ApplicationAttempted {
        posting_id: PostingId,
        title: String,
        company: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
    },
    ApplicationResult {
        posting_id: PostingId,
        outcome: Outcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<FailureReason>,
    },
    /// The executor entered a new state for this posting.
    ApplyStep {
        posting_id: PostingId,
        state: ApplyState,
    },
    QuotaReached {
        count: u32,
        limit: u32,
    },
    SessionError {
        message: String,
        halted: bool,
    },
    RunFinished {
        summary: Box<RunSummary>,
    },
}

/// A timestamped progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub at: DateTime<Utc>,
    pub run_id: RunId,
    #[serde(flatten)]
    pub kind: EventKind,
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancellationToken,
    events: Option<UnboundedSender<RunEvent>>,
}

impl RunContext {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            run_id: RunId::new(),
            clock,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Attach an event channel and return its receiving end.
    pub fn with_events(mut self) -> (Self, UnboundedReceiver<RunEvent>) {
        let (tx, rx) = unbounded_channel();
        self.events = Some(tx);
        (self, rx)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send an event. A dropped receiver is ignored.
    pub fn emit(&self, kind: EventKind) {
        let Some(tx) = &self.events else {
            return;
        };
        let event = RunEvent {
            at: self.clock.now(),
            run_id: self.run_id,
            kind,
        };
        if tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("events", &self.events.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2026, 3, 2)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        ))
    }

    #[test]
    fn events_are_timestamped_and_tagged() {
        let clock = clock();
        let (ctx, mut rx) = RunContext::new(clock.clone()).with_events();
        ctx.emit(EventKind::QuotaReached { count: 2, limit: 2 });
        clock.advance(chrono::Duration::minutes(5));
        ctx.emit(EventKind::SessionError {
            message: "gone".into(),
            halted: true,
        });

        let first = rx.try_recv().unwrap();
        assert_eq!(first.run_id, ctx.run_id);
        assert_eq!(first.at.to_rfc3339(), "2026-03-02T09:30:00+00:00");
        let json = serde_json::to_value(&first).unwrap();
        assert_eq!(json["type"], "quota_reached");
        assert_eq!(json["count"], 2);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.at.to_rfc3339(), "2026-03-02T09:35:00+00:00");
    }

    #[test]
    fn emit_without_receiver_is_silent() {
        let ctx = RunContext::new(clock());
        ctx.emit(EventKind::QuotaReached { count: 0, limit: 1 });

        let (ctx, rx) = RunContext::new(clock()).with_events();
        drop(rx);
        ctx.emit(EventKind::QuotaReached { count: 0, limit: 1 });
    }
}
