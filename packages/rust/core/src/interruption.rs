//! Detects when the site bounced the session to a login or verification page.

use url::Url;

use jobpilot_session::{PageKind, SessionManager, classify_page};
use jobpilot_shared::{JobPilotError, Result};

/// Whether `url` is the login page or `html` shows a verification challenge.
pub fn is_auth_interruption(session: &SessionManager, url: &Url, html: &str) -> bool {
    let login = session.login_url();
    (url.host_str() == login.host_str() && url.path() == login.path())
        || classify_page(session.site(), url, html) == PageKind::Challenge
}

/// Fail with `AuthChallengeRequired` if the current page is a login wall.
/// Returns the page URL and document otherwise.
pub async fn check(session: &SessionManager) -> Result<(Url, String)> {
    let url = session.current_url().await?;
    let html = session.page_source().await?;
    if is_auth_interruption(session, &url, &html) {
        tracing::warn!(%url, "redirected to a login or verification page");
        return Err(JobPilotError::AuthChallengeRequired {
            url: url.to_string(),
        });
    }
    Ok((url, html))
}
