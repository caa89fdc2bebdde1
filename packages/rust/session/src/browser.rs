//! Automation backend traits.
//!
//! A [`BrowserBackend`] hands out [`Browser`] resources and can reclaim one
//! left behind by a previous process, identified by its [`ResourceHandle`].

use async_trait::async_trait;
use jobpilot_shared::Result;
use serde::{Deserialize, Serialize};
use url::Url;

/// Identifies an acquired browser resource so it can be released later,
/// possibly by another process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Backend that produced the handle.
    pub backend: String,
    /// Backend-specific resource id (e.g. a WebDriver session id).
    pub id: String,
    /// Where the resource lives (e.g. the WebDriver endpoint).
    pub endpoint: String,
}

/// A live browser controlled by the engine.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, url: &Url) -> Result<()>;

    async fn current_url(&self) -> Result<Url>;

    /// The rendered document.
    async fn page_source(&self) -> Result<String>;

    /// Click the first element matching a CSS selector.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Replace the value of the first element matching a CSS selector.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Scroll to the bottom of the page to trigger incremental loading.
    async fn scroll_to_bottom(&self) -> Result<()>;

    /// Release the underlying resource.
    async fn quit(&self) -> Result<()>;
}

/// Produces browsers and reclaims orphaned ones.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn acquire(&self) -> Result<(Box<dyn Browser>, ResourceHandle)>;

    /// Release a resource acquired by a previous process. Releasing a
    /// resource that no longer exists is not an error.
    async fn reclaim(&self, handle: &ResourceHandle) -> Result<()>;
}
