//! Browser session management for JobPilot.
//!
//! This crate provides:
//! - [`Browser`] / [`BrowserBackend`]: the automation backend seam
//! - [`WebDriverBackend`]: W3C WebDriver client over HTTP
//! - [`SessionManager`]: lifecycle, authentication, bounded operations
//! - [`SessionLock`]: lock file used to reclaim orphaned resources

pub mod browser;
pub mod lock;
pub mod manager;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod webdriver;

pub use browser::{Browser, BrowserBackend, ResourceHandle};
pub use lock::SessionLock;
pub use manager::{
    PageKind, SessionManager, SessionOptions, SessionState, classify_page, reclaim_orphan,
};
pub use webdriver::{WebDriverBackend, WebDriverSession};
