//! Per-posting Easy Apply state machine.
//!
//! ```text
//! DETECTED ─▶ OPENING_FORM ─▶ FILLING ─▶ SUBMITTING ─▶ SUCCEEDED
//!     │             │             │            ├──────▶ INDETERMINATE
//!     └─────────────┴─────────────┴────────────┴──────▶ FAILED
//! ```
//!
//! Every transition gets `step_retries + 1` tries. Only retryable UI errors
//! are retried. Auth interruptions and fatal session errors are returned as
//! `Err` so the orchestrator can halt the run.

use std::future::Future;

use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use jobpilot_session::SessionManager;
use jobpilot_shared::{
    ExecutorConfig, FailureReason, JobPilotError, JobPosting, MatchResult, Outcome, PostingId,
    ProfileCriteria, Result,
};

use crate::context::{EventKind, RunContext};
use crate::interruption;

/// Ordered selector lists for the apply dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFlow {
    pub apply: Vec<String>,
    pub next: Vec<String>,
    pub submit: Vec<String>,
    pub phone: Vec<String>,
    pub email: Vec<String>,
    pub resume: Vec<String>,
    pub cover_letter: Vec<String>,
    pub validation_markers: Vec<String>,
    pub success_markers: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ApplyFlow {
    fn default() -> Self {
        Self {
            apply: owned(&[
                "button[aria-label*='Easy Apply']",
                "button.jobs-apply-button",
            ]),
            next: owned(&[
                "button[aria-label='Continue to next step']",
                "button[aria-label='Review your application']",
            ]),
            submit: owned(&["button[aria-label='Submit application']"]),
            phone: owned(&["input[type='tel']", "input[name*='phone']"]),
            email: owned(&["input[type='email']"]),
            resume: owned(&["input[type='file']"]),
            cover_letter: owned(&["textarea"]),
            validation_markers: owned(&[
                ".artdeco-inline-feedback--error",
                "[role='alert'][class*='error']",
            ]),
            success_markers: owned(&[
                "[data-test-modal-id='post-apply-modal']",
                ".jobs-apply-success",
                ".artdeco-inline-feedback--success",
            ]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyState {
    Detected,
    OpeningForm,
    Filling,
    Submitting,
    Succeeded,
    Failed,
    Indeterminate,
}

impl ApplyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "DETECTED",
            Self::OpeningForm => "OPENING_FORM",
            Self::Filling => "FILLING",
            Self::Submitting => "SUBMITTING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Indeterminate => "INDETERMINATE",
        }
    }
}

impl std::fmt::Display for ApplyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tries spent on one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTries {
    pub state: ApplyState,
    pub tries: u32,
}

/// How one posting's flow ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub outcome: Outcome,
    pub failure: Option<FailureReason>,
    pub detail: Option<String>,
    /// State the flow was in when it ended.
    pub last_state: ApplyState,
    pub tries: Vec<StepTries>,
}

impl ExecutionReport {
    pub fn final_state(&self) -> ApplyState {
        match self.outcome {
            Outcome::Succeeded => ApplyState::Succeeded,
            Outcome::Failed => ApplyState::Failed,
            Outcome::Indeterminate => ApplyState::Indeterminate,
        }
    }

    /// Most tries spent on `state` (form pages are counted separately).
    pub fn tries_for(&self, state: ApplyState) -> u32 {
        self.tries
            .iter()
            .filter(|t| t.state == state)
            .map(|t| t.tries)
            .max()
            .unwrap_or(0)
    }

    pub fn needs_review(&self) -> bool {
        self.outcome == Outcome::Indeterminate
    }
}

/// What one form page led to.
enum PageStep<'a> {
    Advanced,
    ReadyToSubmit(&'a str),
}

/// Transitions taken so far. Entering a state is reported on the run's
/// event channel.
struct Trace<'a> {
    ctx: &'a RunContext,
    posting_id: &'a PostingId,
    state: Option<ApplyState>,
    tries: Vec<StepTries>,
}

impl<'a> Trace<'a> {
    fn new(ctx: &'a RunContext, posting_id: &'a PostingId) -> Self {
        Self {
            ctx,
            posting_id,
            state: None,
            tries: Vec::new(),
        }
    }

    fn enter(&mut self, state: ApplyState) {
        self.state = Some(state);
        self.tries.push(StepTries { state, tries: 0 });
        self.ctx.emit(EventKind::ApplyStep {
            posting_id: self.posting_id.clone(),
            state,
        });
    }

    fn tick(&mut self) -> u32 {
        match self.tries.last_mut() {
            Some(step) => {
                step.tries += 1;
                step.tries
            }
            None => 1,
        }
    }

    fn finish(
        self,
        outcome: Outcome,
        failure: Option<FailureReason>,
        detail: Option<String>,
    ) -> ExecutionReport {
        ExecutionReport {
            outcome,
            failure,
            detail,
            last_state: self.state.unwrap_or(ApplyState::Detected),
            tries: self.tries,
        }
    }
}

fn first_present<'a>(html: &str, selectors: &'a [String]) -> Option<&'a str> {
    let doc = Html::parse_document(html);
    selectors
        .iter()
        .find(|s| {
            scraper::Selector::parse(s)
                .map(|sel| doc.select(&sel).next().is_some())
                .unwrap_or(false)
        })
        .map(String::as_str)
}

fn not_found(selectors: &[String]) -> JobPilotError {
    JobPilotError::element_not_found(selectors.join(", "))
}

/// Drives the apply flow for one posting at a time.
pub struct ApplicationExecutor {
    flow: ApplyFlow,
    config: ExecutorConfig,
    profile: ProfileCriteria,
}

impl ApplicationExecutor {
    pub fn new(config: ExecutorConfig, profile: ProfileCriteria) -> Self {
        Self {
            flow: ApplyFlow::default(),
            config,
            profile,
        }
    }

    pub fn with_flow(mut self, flow: ApplyFlow) -> Self {
        self.flow = flow;
        self
    }

    fn max_tries(&self) -> u32 {
        self.config.step_retries + 1
    }

    /// Render the cover letter template for `posting`.
    pub fn cover_letter(&self, posting: &JobPosting, matched: Option<&MatchResult>) -> String {
        let skills: Vec<&str> = match matched {
            Some(m) if !m.matched_skills.is_empty() => {
                m.matched_skills.iter().map(String::as_str).take(3).collect()
            }
            _ => self.profile.skills.iter().map(String::as_str).take(3).collect(),
        };
        self.config
            .cover_letter
            .replace("{title}", &posting.title)
            .replace("{company}", &posting.company)
            .replace("{skills}", &skills.join(", "))
            .replace("{years}", &self.profile.experience_years.to_string())
    }

    /// Run the flow for `posting`. Per-job failures come back as a FAILED or
    /// INDETERMINATE report; `Err` means the run has to halt.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, posting = %posting.id))]
    pub async fn apply(
        &self,
        session: &SessionManager,
        ctx: &RunContext,
        posting: &JobPosting,
        matched: Option<&MatchResult>,
    ) -> Result<ExecutionReport> {
        let mut trace = Trace::new(ctx, &posting.id);
        match self.drive(session, posting, matched, &mut trace).await {
            Ok((outcome, detail)) => {
                info!(outcome = outcome.as_str(), "application flow finished");
                Ok(trace.finish(outcome, None, detail))
            }
            Err(e) if e.halts_run() => Err(e),
            Err(e) => {
                let failed_in = trace.state.unwrap_or(ApplyState::Detected);
                warn!(state = %failed_in, error = %e, "application failed");
                Ok(trace.finish(Outcome::Failed, e.failure_reason(), Some(e.to_string())))
            }
        }
    }

    async fn drive(
        &self,
        session: &SessionManager,
        posting: &JobPosting,
        matched: Option<&MatchResult>,
        trace: &mut Trace<'_>,
    ) -> Result<(Outcome, Option<String>)> {
        trace.enter(ApplyState::Detected);
        self.step(trace, move || async move {
            session.navigate(&posting.url).await?;
            interruption::check(session).await.map(|_| ())
        })
        .await?;

        trace.enter(ApplyState::OpeningForm);
        self.step(trace, move || self.open_form(session, posting)).await?;

        let mut submit = None;
        for page in 1..=self.config.max_form_pages.max(1) {
            trace.enter(ApplyState::Filling);
            debug!(page, "filling form page");
            match self
                .step(trace, move || self.fill_page(session, posting, matched))
                .await?
            {
                PageStep::ReadyToSubmit(selector) => {
                    submit = Some(selector);
                    break;
                }
                PageStep::Advanced => {}
            }
        }
        let submit = submit.ok_or_else(|| not_found(&self.flow.submit))?;

        trace.enter(ApplyState::Submitting);
        self.submit(session, submit, trace).await
    }

    /// Run `f` up to the retry ceiling, retrying only retryable errors.
    async fn step<T, F, Fut>(&self, trace: &mut Trace<'_>, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            let attempt = trace.tick();
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_tries() => {
                    debug!(attempt, error = %e, "step failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn open_form(&self, session: &SessionManager, posting: &JobPosting) -> Result<()> {
        let html = session.page_source().await?;
        let selector = first_present(&html, &self.flow.apply).ok_or_else(|| not_found(&self.flow.apply))?;
        session.click(selector).await?;

        let (url, _) = interruption::check(session).await?;
        if url.host_str() != posting.url.host_str() {
            return Err(JobPilotError::UnexpectedRedirect {
                url: url.to_string(),
            });
        }
        Ok(())
    }

    /// Fill the fields present on the current page, then advance or report
    /// that the page can be submitted.
    async fn fill_page(
        &self,
        session: &SessionManager,
        posting: &JobPosting,
        matched: Option<&MatchResult>,
    ) -> Result<PageStep<'_>> {
        let html = session.page_source().await?;
        let fields = [
            (&self.flow.phone, self.config.phone.clone()),
            (&self.flow.email, self.config.email.clone()),
            (&self.flow.resume, self.config.resume_path.clone()),
            (
                &self.flow.cover_letter,
                Some(self.cover_letter(posting, matched)),
            ),
        ];
        let plan: Vec<(&str, String)> = fields
            .into_iter()
            .filter_map(|(selectors, value)| Some((first_present(&html, selectors)?, value?)))
            .collect();
        let submit = first_present(&html, &self.flow.submit);
        let next = first_present(&html, &self.flow.next);

        for (selector, value) in plan {
            session.fill(selector, &value).await?;
        }
        if let Some(submit) = submit {
            return Ok(PageStep::ReadyToSubmit(submit));
        }

        let next = next.ok_or_else(|| not_found(&self.flow.next))?;
        session.click(next).await?;
        let (_, html) = interruption::check(session).await?;
        if first_present(&html, &self.flow.validation_markers).is_some() {
            return Err(JobPilotError::FormValidation {
                message: "form page rejected the entered values".into(),
            });
        }
        Ok(PageStep::Advanced)
    }

    /// Submit and classify the page that follows. A submit click that timed
    /// out may have landed, so it is never repeated.
    async fn submit(
        &self,
        session: &SessionManager,
        selector: &str,
        trace: &mut Trace<'_>,
    ) -> Result<(Outcome, Option<String>)> {
        loop {
            let attempt = trace.tick();
            match session.click(selector).await {
                Ok(()) => {}
                Err(e @ JobPilotError::Timeout { .. }) => {
                    warn!(error = %e, "submit did not complete; outcome unknown");
                    return Ok((Outcome::Indeterminate, Some(e.to_string())));
                }
                Err(e) if e.is_retryable() && attempt < self.max_tries() => continue,
                Err(e) => return Err(e),
            }

            let html = match interruption::check(session).await {
                Ok((_, html)) => html,
                Err(e) if e.is_retryable() => {
                    return Ok((
                        Outcome::Indeterminate,
                        Some(format!("could not read page after submit: {e}")),
                    ));
                }
                Err(e) => return Err(e),
            };

            if first_present(&html, &self.flow.success_markers).is_some() {
                return Ok((Outcome::Succeeded, None));
            }
            if first_present(&html, &self.flow.validation_markers).is_some() {
                if attempt < self.max_tries() {
                    debug!(attempt, "submission rejected, retrying");
                    continue;
                }
                return Err(JobPilotError::FormValidation {
                    message: "submission rejected by the form".into(),
                });
            }
            return Ok((
                Outcome::Indeterminate,
                Some("post-submission page not recognized".into()),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{FixedClock, RunEvent};
    use crate::testing::{self, posting_url};
    use chrono::{NaiveDate, Utc};
    use jobpilot_session::testing::{ClickEffect, ScriptedBrowser, ScriptedPage};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use url::Url;

    const APPLY: &str = "button[aria-label*='Easy Apply']";
    const NEXT: &str = "button[aria-label='Continue to next step']";
    const SUBMIT: &str = "button[aria-label='Submit application']";

    const POSTING_PAGE: &str =
        r#"<button class="jobs-apply-button" aria-label="Easy Apply to Data Analyst">Easy Apply</button>"#;

    fn posting(id: u32) -> JobPosting {
        let url = Url::parse(&posting_url(id)).unwrap();
        JobPosting {
            id: PostingId::from_url(&url),
            url,
            title: "Data Analyst".into(),
            company: "Acme".into(),
            location: None,
            easy_apply: true,
            requirements: "SQL".into(),
            discovered_at: Utc::now(),
        }
    }

    fn executor() -> ApplicationExecutor {
        let config = ExecutorConfig {
            phone: Some("+49 30 1234567".into()),
            cover_letter: "{title} at {company}: {skills}, {years}y".into(),
            ..ExecutorConfig::default()
        };
        let profile = ProfileCriteria {
            skills: ["python", "sql"].into_iter().map(String::from).collect(),
            experience_years: 4,
            ..ProfileCriteria::default()
        };
        ApplicationExecutor::new(config, profile)
    }

    fn ctx() -> RunContext {
        let at = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        RunContext::new(Arc::new(FixedClock::new(at)))
    }

    fn steps(rx: &mut UnboundedReceiver<RunEvent>) -> Vec<ApplyState> {
        let mut steps = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EventKind::ApplyStep { state, .. } = event.kind {
                steps.push(state);
            }
        }
        steps
    }

    fn with_posting(browser: ScriptedBrowser, id: u32, apply: ClickEffect) -> ScriptedBrowser {
        browser.page(
            &posting_url(id),
            ScriptedPage::new(POSTING_PAGE).on_click(APPLY, apply),
        )
    }

    fn form_url(id: u32, page: &str) -> String {
        format!("{}{page}", posting_url(id))
    }

    #[tokio::test]
    async fn multi_page_form_succeeds() {
        let browser = with_posting(testing::site(), 1, ClickEffect::Navigate(form_url(1, "p1")))
            .page(
                &form_url(1, "p1"),
                ScriptedPage::new(
                    r#"<input type="tel"><button aria-label="Continue to next step">Next</button>"#,
                )
                .on_click(NEXT, ClickEffect::Navigate(form_url(1, "p2"))),
            )
            .page(
                &form_url(1, "p2"),
                ScriptedPage::new(r#"<textarea></textarea><button aria-label="Submit application">Submit</button>"#)
                    .on_click(SUBMIT, ClickEffect::Navigate(form_url(1, "done"))),
            )
            .page(
                &form_url(1, "done"),
                ScriptedPage::new(r#"<div data-test-modal-id="post-apply-modal"></div>"#),
            );
        let mut session = testing::active_session(&browser).await;

        let report = executor().apply(&session, &ctx(), &posting(1), None).await.unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert_eq!(report.final_state(), ApplyState::Succeeded);
        assert_eq!(report.last_state, ApplyState::Submitting);
        assert!(!report.needs_review());

        let fills = browser.fills();
        assert!(fills.contains(&("input[type='tel']".to_string(), "+49 30 1234567".to_string())));
        assert!(fills.contains(&(
            "textarea".to_string(),
            "Data Analyst at Acme: python, sql, 4y".to_string()
        )));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn each_state_entered_is_reported() {
        let browser = with_posting(testing::site(), 1, ClickEffect::Navigate(form_url(1, "p1")))
            .page(
                &form_url(1, "p1"),
                ScriptedPage::new(
                    r#"<input type="tel"><button aria-label="Continue to next step">Next</button>"#,
                )
                .on_click(NEXT, ClickEffect::Navigate(form_url(1, "p2"))),
            )
            .page(
                &form_url(1, "p2"),
                ScriptedPage::new(r#"<textarea></textarea><button aria-label="Submit application">Submit</button>"#)
                    .on_click(SUBMIT, ClickEffect::Navigate(form_url(1, "done"))),
            )
            .page(
                &form_url(1, "done"),
                ScriptedPage::new(r#"<div data-test-modal-id="post-apply-modal"></div>"#),
            );
        let mut session = testing::active_session(&browser).await;
        let (ctx, mut rx) = ctx().with_events();

        let report = executor().apply(&session, &ctx, &posting(1), None).await.unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert_eq!(
            steps(&mut rx),
            vec![
                ApplyState::Detected,
                ApplyState::OpeningForm,
                ApplyState::Filling,
                ApplyState::Filling,
                ApplyState::Submitting,
            ]
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn retry_ceiling_is_never_exceeded() {
        let browser = with_posting(
            testing::site(),
            2,
            ClickEffect::Flaky {
                failures: 10,
                then: form_url(2, "p1"),
            },
        );
        let mut session = testing::active_session(&browser).await;

        let report = executor().apply(&session, &ctx(), &posting(2), None).await.unwrap();
        assert_eq!(report.outcome, Outcome::Failed);
        assert_eq!(report.failure, Some(FailureReason::ElementNotFound));
        assert_eq!(report.last_state, ApplyState::OpeningForm);
        assert_eq!(report.tries_for(ApplyState::OpeningForm), 3);
        assert_eq!(browser.click_attempts(APPLY), 3);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn flaky_control_recovers_within_ceiling() {
        let browser = with_posting(
            testing::site(),
            3,
            ClickEffect::Flaky {
                failures: 2,
                then: form_url(3, "p1"),
            },
        )
        .page(
            &form_url(3, "p1"),
            ScriptedPage::new(r#"<button aria-label="Submit application">Submit</button>"#)
                .on_click(SUBMIT, ClickEffect::Navigate(form_url(3, "done"))),
        )
        .page(
            &form_url(3, "done"),
            ScriptedPage::new(r#"<p class="jobs-apply-success"></p>"#),
        );
        let mut session = testing::active_session(&browser).await;

        let report = executor().apply(&session, &ctx(), &posting(3), None).await.unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert_eq!(report.tries_for(ApplyState::OpeningForm), 3);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn external_redirect_fails_without_retry() {
        let browser = with_posting(
            testing::site(),
            4,
            ClickEffect::Navigate("https://careers.acme.example/apply".into()),
        );
        let mut session = testing::active_session(&browser).await;

        let report = executor().apply(&session, &ctx(), &posting(4), None).await.unwrap();
        assert_eq!(report.outcome, Outcome::Failed);
        assert_eq!(report.failure, Some(FailureReason::UnexpectedRedirect));
        assert_eq!(browser.click_attempts(APPLY), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn validation_errors_exhaust_retries() {
        let invalid = form_url(5, "invalid");
        let page = r#"<input type="tel"><div class="artdeco-inline-feedback--error">Enter a valid phone</div>
            <button aria-label="Continue to next step">Next</button>"#;
        let browser = with_posting(testing::site(), 5, ClickEffect::Navigate(form_url(5, "p1")))
            .page(
                &form_url(5, "p1"),
                ScriptedPage::new(page).on_click(NEXT, ClickEffect::Navigate(invalid.clone())),
            )
            .page(
                &invalid,
                ScriptedPage::new(page).on_click(NEXT, ClickEffect::Navigate(invalid.clone())),
            );
        let mut session = testing::active_session(&browser).await;

        let report = executor().apply(&session, &ctx(), &posting(5), None).await.unwrap();
        assert_eq!(report.outcome, Outcome::Failed);
        assert_eq!(report.failure, Some(FailureReason::ValidationError));
        assert_eq!(report.last_state, ApplyState::Filling);
        assert_eq!(browser.click_attempts(NEXT), 3);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn hanging_submit_is_indeterminate() {
        let browser = with_posting(testing::site(), 6, ClickEffect::Navigate(form_url(6, "p1")))
            .page(
                &form_url(6, "p1"),
                ScriptedPage::new(r#"<button aria-label="Submit application">Submit</button>"#)
                    .on_click(SUBMIT, ClickEffect::Hang),
            );
        let mut session = testing::active_session(&browser).await;

        let report = executor().apply(&session, &ctx(), &posting(6), None).await.unwrap();
        assert_eq!(report.outcome, Outcome::Indeterminate);
        assert!(report.needs_review());
        assert_eq!(report.failure, None);
        assert_eq!(browser.click_attempts(SUBMIT), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn unrecognized_confirmation_is_indeterminate() {
        let browser = with_posting(testing::site(), 7, ClickEffect::Navigate(form_url(7, "p1")))
            .page(
                &form_url(7, "p1"),
                ScriptedPage::new(r#"<button aria-label="Submit application">Submit</button>"#)
                    .on_click(SUBMIT, ClickEffect::Navigate(form_url(7, "after"))),
            )
            .page(&form_url(7, "after"), ScriptedPage::new("<p>Thanks?</p>"));
        let mut session = testing::active_session(&browser).await;

        let report = executor().apply(&session, &ctx(), &posting(7), None).await.unwrap();
        assert_eq!(report.outcome, Outcome::Indeterminate);
        assert_eq!(browser.click_attempts(SUBMIT), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn login_wall_halts() {
        let browser = with_posting(
            testing::site(),
            8,
            ClickEffect::Navigate(testing::LOGIN.into()),
        );
        let mut session = testing::active_session(&browser).await;

        let err = executor().apply(&session, &ctx(), &posting(8), None).await.unwrap_err();
        assert!(matches!(err, JobPilotError::AuthChallengeRequired { .. }));
        session.close().await.unwrap();
    }

    #[test]
    fn cover_letter_prefers_matched_skills() {
        let p = posting(9);
        let matched = MatchResult {
            posting_id: p.id.clone(),
            score: 80.0,
            matched_skills: ["sql"].into_iter().map(String::from).collect(),
            missing_skills: Default::default(),
            breakdown: jobpilot_shared::SubScores {
                skills: 50.0,
                experience: 100.0,
                education: 100.0,
                location: 75.0,
                industry: 75.0,
            },
        };
        assert_eq!(
            executor().cover_letter(&p, Some(&matched)),
            "Data Analyst at Acme: sql, 4y"
        );
    }
}
