//! Session lifecycle: acquire, authenticate, bounded operations, release.
//!
//! ```text
//! NEW ──open──▶ NEW(opened) ──authenticate──▶ AUTHENTICATING ──▶ ACTIVE
//!                                                   │               │
//!                                                   └──── close ────┴──▶ CLOSING ──▶ CLOSED
//! any failure to release ──▶ ERROR (lock kept for the next open)
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use jobpilot_shared::{AppConfig, Credentials, JobPilotError, Result, SiteConfig, state_dir};

use crate::browser::{Browser, BrowserBackend};
use crate::lock::SessionLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Authenticating,
    Active,
    Closing,
    Closed,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a page looks after a login step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Challenge,
    LoggedIn,
    Unknown,
}

/// Classify the current page using the site's markers. Challenge wins over
/// logged-in when both are present.
pub fn classify_page(site: &SiteConfig, url: &Url, html: &str) -> PageKind {
    let url_str = url.as_str().to_lowercase();
    let doc = Html::parse_document(html);
    let present = |selectors: &[String]| {
        selectors
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .any(|sel| doc.select(&sel).next().is_some())
    };

    if site
        .challenge_markers
        .iter()
        .any(|m| url_str.contains(&m.to_lowercase()))
        || present(&site.challenge_selectors)
    {
        PageKind::Challenge
    } else if site
        .logged_in_url_markers
        .iter()
        .any(|m| url_str.contains(&m.to_lowercase()))
        || present(&site.logged_in_selectors)
    {
        PageKind::LoggedIn
    } else {
        PageKind::Unknown
    }
}

/// Settings the manager needs, resolved from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub op_timeout: Duration,
    pub login_attempts: u32,
    pub lock_dir: PathBuf,
    pub login_url: Url,
    pub site: SiteConfig,
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            op_timeout: Duration::from_secs(config.session.op_timeout_secs.max(1)),
            login_attempts: config.session.login_attempts.max(1),
            lock_dir: state_dir(&config.session)?,
            login_url: config.site.login_url()?,
            site: config.site.clone(),
        })
    }
}

/// Owns the browser resource for one run.
pub struct SessionManager {
    id: Uuid,
    created_at: DateTime<Utc>,
    state: SessionState,
    backend: Arc<dyn BrowserBackend>,
    browser: Option<Box<dyn Browser>>,
    handle: Option<crate::browser::ResourceHandle>,
    options: SessionOptions,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn BrowserBackend>, options: SessionOptions) -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            state: SessionState::New,
            backend,
            browser: None,
            handle: None,
            options,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn op_timeout(&self) -> Duration {
        self.options.op_timeout
    }

    pub fn site(&self) -> &SiteConfig {
        &self.options.site
    }

    pub fn login_url(&self) -> &Url {
        &self.options.login_url
    }

    fn invalid(&self, expected: &'static str) -> JobPilotError {
        JobPilotError::InvalidState {
            expected,
            actual: self.state.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Reclaim any orphaned resource, acquire a fresh one and write the lock.
    #[instrument(skip_all, fields(session_id = %self.id, backend = self.backend.name()))]
    pub async fn open(&mut self) -> Result<()> {
        if self.state != SessionState::New || self.browser.is_some() {
            return Err(self.invalid("new"));
        }

        if let Some(orphan) = reclaim_orphan(self.backend.as_ref(), &self.options).await? {
            info!(
                orphan_session = %orphan.session_id,
                orphan_pid = orphan.pid,
                "reclaimed orphaned browser session"
            );
        }

        let acquired = tokio::time::timeout(self.options.op_timeout * 3, self.backend.acquire())
            .await
            .map_err(|_| JobPilotError::timeout("acquire browser", self.options.op_timeout * 3))
            .and_then(|r| r);
        let (browser, handle) = match acquired {
            Ok(pair) => pair,
            Err(e) => {
                self.state = SessionState::Error;
                return Err(match e {
                    JobPilotError::FatalSession(_) => e,
                    other => JobPilotError::FatalSession(format!("could not acquire browser: {other}")),
                });
            }
        };

        if let Err(e) = SessionLock::new(self.id, handle.clone()).write(&self.options.lock_dir) {
            let _ = browser.quit().await;
            self.state = SessionState::Error;
            return Err(e);
        }

        debug!(resource = %handle.id, "browser acquired");
        self.browser = Some(browser);
        self.handle = Some(handle);
        Ok(())
    }

    /// Log in. A verification checkpoint yields `AuthChallengeRequired` and
    /// leaves the session in AUTHENTICATING; it is never retried automatically.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        if self.state != SessionState::New || self.browser.is_none() {
            return Err(self.invalid("new (opened)"));
        }
        self.state = SessionState::Authenticating;

        let attempts = self.options.login_attempts;
        for attempt in 1..=attempts {
            match self.login_once(credentials).await {
                Ok(PageKind::LoggedIn) => {
                    self.state = SessionState::Active;
                    info!(attempt, "authenticated");
                    return Ok(());
                }
                Ok(PageKind::Challenge) => {
                    let url = self.current_url().await.map(String::from).unwrap_or_default();
                    warn!(%url, "login interrupted by a verification challenge");
                    return Err(JobPilotError::AuthChallengeRequired { url });
                }
                Ok(PageKind::Unknown) => {
                    warn!(attempt, attempts, "login did not reach a logged-in page");
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt, attempts, error = %e, "login step failed");
                }
                Err(e) => {
                    self.state = SessionState::Error;
                    return Err(e);
                }
            }
        }

        self.state = SessionState::Error;
        Err(JobPilotError::FatalSession(format!(
            "login failed after {attempts} attempts"
        )))
    }

    async fn login_once(&self, credentials: &Credentials) -> Result<PageKind> {
        let site = &self.options.site;
        self.navigate(&self.options.login_url).await?;
        self.fill(&site.username_selector, &credentials.username).await?;
        self.fill(&site.password_selector, &credentials.password).await?;
        self.click(&site.submit_selector).await?;
        self.classify_current().await
    }

    /// Classify the page currently loaded.
    pub async fn classify_current(&self) -> Result<PageKind> {
        let url = self.current_url().await?;
        let html = self.page_source().await?;
        Ok(classify_page(&self.options.site, &url, &html))
    }

    /// Resume after a human resolved a challenge. Returns `true` once the
    /// session is ACTIVE.
    pub async fn confirm_authenticated(&mut self) -> Result<bool> {
        match self.state {
            SessionState::Active => return Ok(true),
            SessionState::Authenticating => {}
            _ => return Err(self.invalid("authenticating")),
        }
        if self.classify_current().await? == PageKind::LoggedIn {
            self.state = SessionState::Active;
            info!(session_id = %self.id, "challenge resolved, session active");
            return Ok(true);
        }
        Ok(false)
    }

    /// Release the resource and remove the lock. Idempotent once CLOSED.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closing;
        let limit = self.options.op_timeout;

        let released = match (self.browser.take(), &self.handle) {
            (Some(browser), _) => bounded("quit", limit, browser.quit()).await,
            (None, Some(handle)) => bounded("reclaim", limit, self.backend.reclaim(handle)).await,
            (None, None) => {
                self.state = SessionState::Closed;
                return Ok(());
            }
        };

        match released {
            Ok(()) => {
                self.handle = None;
                SessionLock::remove(&self.options.lock_dir)?;
                self.state = SessionState::Closed;
                info!("session closed");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Error;
                warn!(error = %e, "failed to release browser; lock kept for reclamation");
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Bounded browser operations
    // -----------------------------------------------------------------------

    fn browser(&self) -> Result<&dyn Browser> {
        if !matches!(
            self.state,
            SessionState::Authenticating | SessionState::Active
        ) {
            return Err(self.invalid("authenticating or active"));
        }
        self.browser
            .as_deref()
            .ok_or_else(|| JobPilotError::FatalSession("no browser resource".into()))
    }

    pub async fn navigate(&self, url: &Url) -> Result<()> {
        let browser = self.browser()?;
        bounded("navigate", self.options.op_timeout, browser.navigate(url)).await
    }

    pub async fn current_url(&self) -> Result<Url> {
        let browser = self.browser()?;
        bounded("current_url", self.options.op_timeout, browser.current_url()).await
    }

    pub async fn page_source(&self) -> Result<String> {
        let browser = self.browser()?;
        bounded("page_source", self.options.op_timeout, browser.page_source()).await
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        let browser = self.browser()?;
        bounded("click", self.options.op_timeout, browser.click(selector)).await
    }

    pub async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let browser = self.browser()?;
        bounded("fill", self.options.op_timeout, browser.fill(selector, value)).await
    }

    /// Request more content (scroll to the bottom of the page).
    pub async fn load_more(&self) -> Result<()> {
        let browser = self.browser()?;
        bounded("load_more", self.options.op_timeout, browser.scroll_to_bottom()).await
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if self.handle.is_some() && self.state != SessionState::Closed {
            warn!(
                session_id = %self.id,
                state = %self.state,
                "session dropped without close; the next open will reclaim it"
            );
        }
    }
}

async fn bounded<T>(
    operation: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(JobPilotError::timeout(operation, limit)),
    }
}

/// Reclaim the resource recorded in an orphaned lock, then remove the lock.
/// Reclamation is best effort; the lock is removed either way.
pub async fn reclaim_orphan(
    backend: &dyn BrowserBackend,
    options: &SessionOptions,
) -> Result<Option<SessionLock>> {
    let Some(lock) = SessionLock::read(&options.lock_dir)? else {
        return Ok(None);
    };

    if lock.handle.backend != backend.name() {
        warn!(
            lock_backend = %lock.handle.backend,
            backend = backend.name(),
            "orphaned lock belongs to another backend; discarding"
        );
    } else {
        match bounded("reclaim", options.op_timeout, backend.reclaim(&lock.handle)).await {
            Ok(()) => debug!(resource = %lock.handle.id, "orphaned resource released"),
            Err(e) => warn!(error = %e, resource = %lock.handle.id, "could not release orphaned resource"),
        }
    }

    SessionLock::remove(&options.lock_dir)?;
    Ok(Some(lock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ResourceHandle;
    use crate::testing::{ClickEffect, ScriptedBackend, ScriptedBrowser, ScriptedPage};

    const LOGIN: &str = "https://www.linkedin.com/login";
    const LOGIN_FORM: &str = r#"<html><body><form>
        <input id="username"><input id="password" type="password">
        <button type="submit">Sign in</button></form></body></html>"#;

    fn options(dir: &std::path::Path) -> SessionOptions {
        SessionOptions {
            op_timeout: Duration::from_millis(200),
            login_attempts: 3,
            lock_dir: dir.to_path_buf(),
            login_url: Url::parse(LOGIN).unwrap(),
            site: SiteConfig::default(),
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("jp-session-test-{}", Uuid::now_v7()))
    }

    fn creds() -> Credentials {
        Credentials {
            username: "ada@example.com".into(),
            password: "secret".into(),
        }
    }

    fn login_to(target: &str) -> ScriptedBrowser {
        ScriptedBrowser::new().page(
            LOGIN,
            ScriptedPage::new(LOGIN_FORM)
                .on_click("button[type='submit']", ClickEffect::Navigate(target.into())),
        )
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let dir = temp_dir();
        let browser = login_to("https://www.linkedin.com/feed/").page(
            "https://www.linkedin.com/feed/",
            ScriptedPage::new(r#"<div class="feed-container"></div>"#),
        );
        let backend = Arc::new(ScriptedBackend::new(browser.clone()));
        let mut session = SessionManager::new(backend.clone(), options(&dir));

        session.open().await.unwrap();
        assert_eq!(session.state(), SessionState::New);
        assert!(SessionLock::path(&dir).exists());

        session.authenticate(&creds()).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(
            browser.fills(),
            vec![
                ("#username".to_string(), "ada@example.com".to_string()),
                ("#password".to_string(), "secret".to_string()),
            ]
        );

        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!SessionLock::path(&dir).exists());
        assert_eq!(browser.quits(), 1);

        // Idempotent.
        session.close().await.unwrap();
        assert_eq!(browser.quits(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn operations_require_authentication() {
        let dir = temp_dir();
        let backend = Arc::new(ScriptedBackend::new(ScriptedBrowser::new()));
        let mut session = SessionManager::new(backend, options(&dir));
        let err = session.page_source().await.unwrap_err();
        assert!(matches!(err, JobPilotError::InvalidState { .. }));

        let err = session.authenticate(&creds()).await.unwrap_err();
        assert!(matches!(err, JobPilotError::InvalidState { .. }));

        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.open().await.unwrap_err(),
            JobPilotError::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn challenge_is_surfaced_and_resumable() {
        let dir = temp_dir();
        let checkpoint = "https://www.linkedin.com/checkpoint/challenge/abc";
        let browser = login_to(checkpoint).page(
            checkpoint,
            ScriptedPage::new(r#"<form id="captcha-challenge"></form>"#),
        );
        let backend = Arc::new(ScriptedBackend::new(browser.clone()));
        let mut session = SessionManager::new(backend, options(&dir));
        session.open().await.unwrap();

        let err = session.authenticate(&creds()).await.unwrap_err();
        assert!(matches!(err, JobPilotError::AuthChallengeRequired { ref url } if url == checkpoint));
        assert_eq!(session.state(), SessionState::Authenticating);
        // Never retried automatically.
        assert_eq!(browser.click_attempts("button[type='submit']"), 1);

        assert!(!session.confirm_authenticated().await.unwrap());

        // A human resolves the challenge.
        session
            .navigate(&Url::parse("https://www.linkedin.com/feed/").unwrap())
            .await
            .unwrap();
        assert!(session.confirm_authenticated().await.unwrap());
        assert_eq!(session.state(), SessionState::Active);
        session.close().await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bounded_login_attempts() {
        let dir = temp_dir();
        let browser = login_to("https://www.linkedin.com/login?error=1");
        let backend = Arc::new(ScriptedBackend::new(browser.clone()));
        let mut session = SessionManager::new(backend, options(&dir));
        session.open().await.unwrap();

        let err = session.authenticate(&creds()).await.unwrap_err();
        assert!(matches!(err, JobPilotError::FatalSession(_)));
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(browser.click_attempts("button[type='submit']"), 3);

        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn operation_timeout_is_transient() {
        let dir = temp_dir();
        let browser = ScriptedBrowser::new()
            .page(
                LOGIN,
                ScriptedPage::new(LOGIN_FORM)
                    .on_click("button[type='submit']", ClickEffect::Hang),
            );
        let backend = Arc::new(ScriptedBackend::new(browser));
        let mut session = SessionManager::new(backend, options(&dir));
        session.open().await.unwrap();

        // Every attempt times out on submit, so login eventually gives up.
        let err = session.authenticate(&creds()).await.unwrap_err();
        assert!(matches!(err, JobPilotError::FatalSession(_)));

        session.close().await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_release_keeps_lock_and_next_open_reclaims() {
        let dir = temp_dir();
        let browser = ScriptedBrowser::new().fail_quit();
        let backend = Arc::new(ScriptedBackend::new(browser));

        let mut first = SessionManager::new(backend.clone(), options(&dir));
        first.open().await.unwrap();
        assert!(first.close().await.is_err());
        assert_eq!(first.state(), SessionState::Error);
        assert!(SessionLock::path(&dir).exists());
        let orphan_id = SessionLock::read(&dir).unwrap().unwrap().handle.id;
        drop(first);

        let mut second = SessionManager::new(backend.clone(), options(&dir));
        second.open().await.unwrap();
        let reclaimed: Vec<ResourceHandle> = backend.reclaimed();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, orphan_id);

        let lock = SessionLock::read(&dir).unwrap().unwrap();
        assert_eq!(lock.session_id, second.id());
        assert_eq!(lock.pid, std::process::id());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn reclaim_orphan_without_lock_is_noop() {
        let dir = temp_dir();
        let backend = ScriptedBackend::new(ScriptedBrowser::new());
        assert!(reclaim_orphan(&backend, &options(&dir)).await.unwrap().is_none());
        assert!(backend.reclaimed().is_empty());
    }

    #[test]
    fn classify_prefers_challenge() {
        let site = SiteConfig::default();
        let url = Url::parse("https://www.linkedin.com/feed/").unwrap();
        assert_eq!(
            classify_page(&site, &url, "<html></html>"),
            PageKind::LoggedIn
        );
        assert_eq!(
            classify_page(&site, &url, r#"<iframe src="https://x/captcha/v2"></iframe>"#),
            PageKind::Challenge
        );
        let login = Url::parse(LOGIN).unwrap();
        assert_eq!(classify_page(&site, &login, LOGIN_FORM), PageKind::Unknown);
    }
}
