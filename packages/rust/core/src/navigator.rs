//! Search construction and incremental result loading.
//!
//! The navigator reads the rendered results, asks the session for more
//! content, and stops when a bound is hit: enough candidates,
//! `stale_load_limit` consecutive loads with nothing new, or
//! `max_load_attempts` loads in total. Transient load or read errors are
//! retried; after `MAX_TRANSIENT_FAILURES` in a row loading stops and the
//! postings already read are kept.
//!
//! Loading appends cards to the list, so a card is new when its position is
//! past everything read so far. Identity dedup is left to the orchestrator.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use jobpilot_extractor::{JobCardExtractor, PartialExtractionFailure};
use jobpilot_session::SessionManager;
use jobpilot_shared::{JobPosting, ProfileCriteria, Result, RunOptions};

use crate::context::{EventKind, RunContext, SkipReason};
use crate::interruption;

/// Consecutive transient load or read errors tolerated before giving up.
pub const MAX_TRANSIENT_FAILURES: u32 = 3;

/// Build the search URL for the profile's keywords and location.
pub fn build_search_url(
    base: &Url,
    keywords: &[String],
    location: Option<&str>,
    easy_apply_only: bool,
) -> Url {
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.append_pair("keywords", &keywords.join(" "));
        if let Some(location) = location {
            query.append_pair("location", location);
        }
        if easy_apply_only {
            query.append_pair("f_AL", "true");
        }
    }
    url
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigatorOptions {
    pub target_candidates: usize,
    pub max_load_attempts: u32,
    pub stale_load_limit: u32,
}

impl From<&RunOptions> for NavigatorOptions {
    fn from(options: &RunOptions) -> Self {
        Self {
            target_candidates: options.target_candidates,
            max_load_attempts: options.max_load_attempts,
            stale_load_limit: options.stale_load_limit.max(1),
        }
    }
}

/// Why loading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    Stalled,
    LoadLimit,
    /// Loading kept failing with transient errors.
    LoadFailed,
    Cancelled,
}

/// Cards that were new in one read of the results.
#[derive(Debug, Default)]
pub struct Batch {
    pub postings: Vec<JobPosting>,
    pub failures: Vec<PartialExtractionFailure>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty() && self.failures.is_empty()
    }
}

/// Everything discovered by one search.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Postings in discovery order.
    pub postings: Vec<JobPosting>,
    pub failures: Vec<PartialExtractionFailure>,
    pub loads: u32,
    pub stop: Option<StopReason>,
}

pub struct Navigator {
    extractor: Arc<JobCardExtractor>,
    search_url: Url,
    options: NavigatorOptions,
    /// Cards already read, by position.
    consumed: usize,
    found: usize,
    loads: u32,
    stale: u32,
    failures: u32,
    read_once: bool,
    started: bool,
    stop: Option<StopReason>,
}

impl Navigator {
    pub fn new(extractor: Arc<JobCardExtractor>, search_url: Url, options: NavigatorOptions) -> Self {
        Self {
            extractor,
            search_url,
            options,
            consumed: 0,
            found: 0,
            loads: 0,
            stale: 0,
            failures: 0,
            read_once: false,
            started: false,
            stop: None,
        }
    }

    /// Navigator for the profile's search.
    pub fn for_profile(
        extractor: Arc<JobCardExtractor>,
        base: &Url,
        profile: &ProfileCriteria,
        options: &RunOptions,
    ) -> Self {
        let url = build_search_url(
            base,
            &profile.keywords,
            profile.location.as_deref(),
            options.easy_apply_only,
        );
        Self::new(extractor, url, NavigatorOptions::from(options))
    }

    pub fn search_url(&self) -> &Url {
        &self.search_url
    }

    pub fn loads(&self) -> u32 {
        self.loads
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Open the search page.
    #[instrument(skip_all, fields(url = %self.search_url))]
    pub async fn start(&mut self, session: &SessionManager) -> Result<()> {
        session.navigate(&self.search_url).await?;
        interruption::check(session).await?;
        self.started = true;
        Ok(())
    }

    /// Next batch of new cards, or `None` once loading has stopped.
    pub async fn next_batch(&mut self, session: &SessionManager) -> Result<Option<Batch>> {
        if self.stop.is_none() && !self.started {
            self.start(session).await?;
        }
        loop {
            if self.stop.is_some() {
                return Ok(None);
            }
            if self.found >= self.options.target_candidates {
                self.halt(StopReason::TargetReached);
                continue;
            }

            let fresh_read = !self.read_once;
            if !fresh_read {
                if self.loads >= self.options.max_load_attempts {
                    self.halt(StopReason::LoadLimit);
                    continue;
                }
                let loaded = session.load_more().await;
                self.loads += 1;
                if self.absorb(loaded)?.is_none() {
                    continue;
                }
            }

            let read = self.read(session).await;
            let Some(batch) = self.absorb(read)? else {
                continue;
            };
            self.read_once = true;

            if !batch.is_empty() {
                self.stale = 0;
                return Ok(Some(batch));
            }
            if !fresh_read {
                self.stale += 1;
                debug!(stale = self.stale, limit = self.options.stale_load_limit, "load found nothing new");
                if self.stale >= self.options.stale_load_limit {
                    self.halt(StopReason::Stalled);
                }
            }
        }
    }

    async fn read(&mut self, session: &SessionManager) -> Result<Batch> {
        let (url, html) = interruption::check(session).await?;
        let extraction = self.extractor.extract_document(&html, &url);

        let total = extraction.cards.len();
        let mut batch = Batch::default();
        for card in extraction.cards.into_iter().skip(self.consumed) {
            match card {
                Ok(extracted) => {
                    self.found += 1;
                    batch.postings.push(extracted.posting);
                }
                Err(failure) => batch.failures.push(failure),
            }
        }
        self.consumed = self.consumed.max(total);
        Ok(batch)
    }

    /// Pass a step's result through. A retryable error yields `None` and
    /// counts toward `MAX_TRANSIENT_FAILURES`; anything else propagates.
    fn absorb<T>(&mut self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => {
                self.failures = 0;
                Ok(Some(value))
            }
            Err(e) if e.is_retryable() => {
                self.failures += 1;
                warn!(error = %e, failures = self.failures, "result loading step failed");
                if self.failures >= MAX_TRANSIENT_FAILURES {
                    self.halt(StopReason::LoadFailed);
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn halt(&mut self, reason: StopReason) {
        debug!(?reason, found = self.found, loads = self.loads, "result loading stopped");
        self.stop = Some(reason);
    }

    /// Load results until a bound is hit, emitting `JobFound` for every new
    /// posting. Cancellation is checked between loads.
    #[instrument(skip_all, fields(run_id = %ctx.run_id))]
    pub async fn discover(&mut self, session: &SessionManager, ctx: &RunContext) -> Result<Discovery> {
        let mut discovery = Discovery::default();
        loop {
            if ctx.is_cancelled() {
                self.halt(StopReason::Cancelled);
            }
            let Some(batch) = self.next_batch(session).await? else {
                break;
            };
            for posting in &batch.postings {
                ctx.emit(EventKind::JobFound {
                    posting: posting.clone(),
                });
            }
            for failure in &batch.failures {
                ctx.emit(EventKind::JobSkipped {
                    posting_id: None,
                    reason: SkipReason::ExtractionFailed,
                    detail: Some(failure.to_string()),
                });
            }
            discovery.postings.extend(batch.postings);
            discovery.failures.extend(batch.failures);
        }
        discovery.loads = self.loads;
        discovery.stop = self.stop;
        info!(
            candidates = discovery.postings.len(),
            failed = discovery.failures.len(),
            loads = discovery.loads,
            stop = ?discovery.stop,
            "discovery finished"
        );
        Ok(discovery)
    }
}
