//! Scripted in-memory browser for tests.
//!
//! Pages are keyed by URL without query or fragment. Each page holds one or
//! more document snapshots (advanced by scrolling) and optional click
//! effects. Clicks and fills succeed only when the selector matches the
//! current snapshot, like a real browser.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use jobpilot_shared::{JobPilotError, Result};

use crate::browser::{Browser, BrowserBackend, ResourceHandle};

/// What happens when a matching element is clicked.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Load another page.
    Navigate(String),
    /// Never complete (exercises operation timeouts).
    Hang,
    /// Fail with a stale-element error `failures` times, then navigate.
    Flaky { failures: u32, then: String },
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    snapshots: Vec<String>,
    clicks: HashMap<String, ClickEffect>,
}

impl ScriptedPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            snapshots: vec![html.into()],
            clicks: HashMap::new(),
        }
    }

    /// Document shown after one more scroll to the bottom.
    pub fn then_after_scroll(mut self, html: impl Into<String>) -> Self {
        self.snapshots.push(html.into());
        self
    }

    pub fn on_click(mut self, selector: &str, effect: ClickEffect) -> Self {
        self.clicks.insert(selector.to_string(), effect);
        self
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    pages: HashMap<String, ScriptedPage>,
    current: Option<Url>,
    snapshot: usize,
    navigations: Vec<String>,
    clicks: Vec<String>,
    click_attempts: HashMap<String, usize>,
    fills: Vec<(String, String)>,
    scrolls: usize,
    hanging_scrolls: usize,
    quits: usize,
    fail_quit: bool,
}

fn page_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_query(None);
    key.set_fragment(None);
    key.to_string()
}

fn matches(html: &str, selector: &str) -> bool {
    let Ok(sel) = Selector::parse(selector) else {
        return false;
    };
    Html::parse_document(html).select(&sel).next().is_some()
}

const BLANK: &str = "<html><body></body></html>";

/// In-memory browser. Clones share state, so a test can keep one handle
/// for assertions while the engine drives another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBrowser {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register a page at `url` (query string ignored).
    pub fn page(self, url: &str, page: ScriptedPage) -> Self {
        let key = Url::parse(url).map(|u| page_key(&u)).unwrap_or_else(|_| url.to_string());
        self.state().pages.insert(key, page);
        self
    }

    /// The next `n` scrolls never complete and leave the page as it was.
    pub fn hang_scrolls(self, n: usize) -> Self {
        self.state().hanging_scrolls = n;
        self
    }

    pub fn fail_quit(self) -> Self {
        self.state().fail_quit = true;
        self
    }

    /// Successful clicks in order.
    pub fn clicks(&self) -> Vec<String> {
        self.state().clicks.clone()
    }

    /// Times a click on `selector` was attempted, successful or not.
    pub fn click_attempts(&self, selector: &str) -> usize {
        self.state().click_attempts.get(selector).copied().unwrap_or(0)
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state().fills.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn scrolls(&self) -> usize {
        self.state().scrolls
    }

    pub fn quits(&self) -> usize {
        self.state().quits
    }

    fn current_html(state: &ScriptState) -> String {
        state
            .current
            .as_ref()
            .and_then(|u| state.pages.get(&page_key(u)))
            .and_then(|p| {
                p.snapshots
                    .get(state.snapshot.min(p.snapshots.len().saturating_sub(1)))
                    .cloned()
            })
            .unwrap_or_else(|| BLANK.to_string())
    }

    fn load(state: &mut ScriptState, url: &str) -> Result<()> {
        let url = Url::parse(url).map_err(|e| JobPilotError::parse(e.to_string()))?;
        state.navigations.push(url.to_string());
        state.current = Some(url);
        state.snapshot = 0;
        Ok(())
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn navigate(&self, url: &Url) -> Result<()> {
        Self::load(&mut self.state(), url.as_str())
    }

    async fn current_url(&self) -> Result<Url> {
        self.state()
            .current
            .clone()
            .ok_or_else(|| JobPilotError::FatalSession("no page loaded".into()))
    }

    async fn page_source(&self) -> Result<String> {
        Ok(Self::current_html(&self.state()))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let effect = {
            let mut state = self.state();
            *state.click_attempts.entry(selector.to_string()).or_default() += 1;
            if !matches(&Self::current_html(&state), selector) {
                return Err(JobPilotError::element_not_found(selector));
            }
            let key = state.current.as_ref().map(page_key).unwrap_or_default();
            let effect = state
                .pages
                .get_mut(&key)
                .and_then(|p| p.clicks.get_mut(selector));
            match effect {
                Some(ClickEffect::Flaky { failures, .. }) if *failures > 0 => {
                    *failures -= 1;
                    return Err(JobPilotError::element_not_found(selector));
                }
                Some(effect) => Some(effect.clone()),
                None => None,
            }
        };

        match effect {
            Some(ClickEffect::Hang) => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Some(ClickEffect::Navigate(to)) | Some(ClickEffect::Flaky { then: to, .. }) => {
                let mut state = self.state();
                state.clicks.push(selector.to_string());
                Self::load(&mut state, &to)
            }
            None => {
                self.state().clicks.push(selector.to_string());
                Ok(())
            }
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.state();
        if !matches(&Self::current_html(&state), selector) {
            return Err(JobPilotError::element_not_found(selector));
        }
        state.fills.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        let hang = {
            let mut state = self.state();
            state.scrolls += 1;
            if state.hanging_scrolls > 0 {
                state.hanging_scrolls -= 1;
                true
            } else {
                state.snapshot += 1;
                false
            }
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        let mut state = self.state();
        state.quits += 1;
        if state.fail_quit {
            return Err(JobPilotError::FatalSession("browser did not exit".into()));
        }
        Ok(())
    }
}

/// Backend handing out clones of one scripted browser.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    browser: ScriptedBrowser,
    acquired: Mutex<usize>,
    reclaimed: Mutex<Vec<ResourceHandle>>,
}

impl ScriptedBackend {
    pub fn new(browser: ScriptedBrowser) -> Self {
        Self {
            browser,
            ..Self::default()
        }
    }

    pub fn acquired(&self) -> usize {
        *self.acquired.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn reclaimed(&self) -> Vec<ResourceHandle> {
        self.reclaimed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl BrowserBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn acquire(&self) -> Result<(Box<dyn Browser>, ResourceHandle)> {
        let n = {
            let mut acquired = self.acquired.lock().unwrap_or_else(|p| p.into_inner());
            *acquired += 1;
            *acquired
        };
        let handle = ResourceHandle {
            backend: "scripted".into(),
            id: format!("scripted-{n}"),
            endpoint: "memory".into(),
        };
        Ok((Box::new(self.browser.clone()), handle))
    }

    async fn reclaim(&self, handle: &ResourceHandle) -> Result<()> {
        self.reclaimed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(handle.clone());
        Ok(())
    }
}
