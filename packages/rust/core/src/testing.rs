//! Shared helpers for the engine's tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use url::Url;
use uuid::Uuid;

use jobpilot_session::testing::{ClickEffect, ScriptedBackend, ScriptedBrowser, ScriptedPage};
use jobpilot_session::{SessionManager, SessionOptions};
use jobpilot_shared::{
    ApplicationAttempt, Credentials, JobPosting, Outcome, Persistence, Result, SiteConfig,
};

pub const LOGIN: &str = "https://www.linkedin.com/login";
pub const FEED: &str = "https://www.linkedin.com/feed/";
pub const SEARCH: &str = "https://www.linkedin.com/jobs/search/";

const LOGIN_FORM: &str = r#"<html><body><form>
    <input id="username"><input id="password" type="password">
    <button type="submit">Sign in</button></form></body></html>"#;

/// Monday 2026-03-02 at `h:m`.
pub fn monday(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn creds() -> Credentials {
    Credentials {
        username: "ada@example.com".into(),
        password: "secret".into(),
    }
}

/// Scripted browser with a working login flow.
pub fn site() -> ScriptedBrowser {
    ScriptedBrowser::new()
        .page(
            LOGIN,
            ScriptedPage::new(LOGIN_FORM)
                .on_click("button[type='submit']", ClickEffect::Navigate(FEED.into())),
        )
        .page(FEED, ScriptedPage::new(r#"<div class="feed-container"></div>"#))
}

pub fn session_options(lock_dir: PathBuf) -> SessionOptions {
    SessionOptions {
        op_timeout: Duration::from_millis(200),
        login_attempts: 2,
        lock_dir,
        login_url: Url::parse(LOGIN).unwrap(),
        site: SiteConfig::default(),
    }
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("jp-core-test-{}", Uuid::now_v7()))
}

/// An unopened session over `browser`.
pub fn session(browser: &ScriptedBrowser) -> SessionManager {
    let backend = Arc::new(ScriptedBackend::new(browser.clone()));
    SessionManager::new(backend, session_options(temp_dir()))
}

/// An authenticated session over `browser`.
pub async fn active_session(browser: &ScriptedBrowser) -> SessionManager {
    let mut session = session(browser);
    session.open().await.unwrap();
    session.authenticate(&creds()).await.unwrap();
    session
}

/// One result card in the primary layout.
pub fn card(id: u32, title: &str, company: &str, easy_apply: bool) -> String {
    card_with(
        id,
        title,
        company,
        easy_apply,
        "Python and SQL. 2 years of experience.",
    )
}

pub fn card_with(
    id: u32,
    title: &str,
    company: &str,
    easy_apply: bool,
    requirements: &str,
) -> String {
    let apply = if easy_apply {
        format!(r#"<button aria-label="Easy Apply to {title}">Easy Apply</button>"#)
    } else {
        r#"<button class="jobs-apply-button--external">Apply</button>"#.to_string()
    };
    format!(
        r#"<div class="job-card-container">
          <a class="job-card-list__title" href="/jobs/view/{id}/?trk=search">{title}</a>
          <span class="job-card-container__company-name">{company}</span>
          <p class="job-card-container__description">{requirements}</p>
          {apply}
        </div>"#
    )
}

pub fn results(cards: &[String]) -> String {
    format!("<html><body><ul>{}</ul></body></html>", cards.concat())
}

pub fn posting_url(id: u32) -> String {
    format!("https://www.linkedin.com/jobs/view/{id}/")
}

/// Register a posting whose Easy Apply flow is a single page that submits
/// successfully.
pub fn with_easy_apply(browser: ScriptedBrowser, id: u32) -> ScriptedBrowser {
    let form = format!("{}apply", posting_url(id));
    let done = format!("{}done", posting_url(id));
    browser
        .page(
            &posting_url(id),
            ScriptedPage::new(
                r#"<button class="jobs-apply-button" aria-label="Easy Apply to this job">Easy Apply</button>"#,
            )
            .on_click(
                "button[aria-label*='Easy Apply']",
                ClickEffect::Navigate(form.clone()),
            ),
        )
        .page(
            &form,
            ScriptedPage::new(
                r#"<form><input type="tel" name="phone">
                <button aria-label="Submit application">Submit</button></form>"#,
            )
            .on_click(
                "button[aria-label='Submit application']",
                ClickEffect::Navigate(done.clone()),
            ),
        )
        .page(
            &done,
            ScriptedPage::new(r#"<div class="jobs-apply-success">Application sent</div>"#),
        )
}

/// In-memory persistence.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    pub postings: Mutex<Vec<JobPosting>>,
    pub attempts: Mutex<Vec<ApplicationAttempt>>,
    /// Succeeded attempts recorded before the run, per day.
    pub seeded: Mutex<Vec<(NaiveDate, u32)>>,
}

impl MemoryPersistence {
    pub fn attempts(&self) -> Vec<ApplicationAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn postings(&self) -> Vec<JobPosting> {
        self.postings.lock().unwrap().clone()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn upsert_posting(&self, posting: &JobPosting) -> Result<()> {
        let mut postings = self.postings.lock().unwrap();
        postings.retain(|p| p.id != posting.id);
        postings.push(posting.clone());
        Ok(())
    }

    async fn record_attempt(&self, attempt: &ApplicationAttempt) -> Result<()> {
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(())
    }

    async fn today_count(&self, date: NaiveDate) -> Result<u32> {
        let seeded: u32 = self
            .seeded
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| *d == date)
            .map(|(_, n)| n)
            .sum();
        let recorded = self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.day == date && a.outcome == Outcome::Succeeded)
            .count() as u32;
        Ok(seeded + recorded)
    }
}
