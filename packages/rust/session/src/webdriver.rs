//! W3C WebDriver backend over HTTP.
//!
//! Talks to chromedriver/geckodriver/selenium with `reqwest`. Protocol error
//! codes are mapped onto [`JobPilotError`] so callers can tell transient UI
//! failures from a dead session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use jobpilot_shared::{JobPilotError, Result, SessionConfig};

use crate::browser::{Browser, BrowserBackend, ResourceHandle};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const BACKEND_NAME: &str = "webdriver";

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Map a WebDriver error code onto the error taxonomy.
fn map_error(code: &str, message: &str, context: &str) -> JobPilotError {
    match code {
        "no such element"
        | "stale element reference"
        | "element not interactable"
        | "element click intercepted" => JobPilotError::element_not_found(context),
        "timeout" | "script timeout" => JobPilotError::Timeout {
            operation: context.to_string(),
            after_ms: 0,
        },
        "invalid session id" | "session not created" | "no such window" => {
            JobPilotError::FatalSession(format!("{code}: {message}"))
        }
        _ => JobPilotError::Network(format!("webdriver {code}: {message}")),
    }
}

fn map_transport(e: reqwest::Error, context: &str) -> JobPilotError {
    if e.is_timeout() {
        JobPilotError::Timeout {
            operation: context.to_string(),
            after_ms: 0,
        }
    } else if e.is_connect() {
        JobPilotError::FatalSession(format!("webdriver unreachable: {e}"))
    } else {
        JobPilotError::Network(e.to_string())
    }
}

/// Shared HTTP plumbing for the backend and its sessions.
#[derive(Clone)]
struct Wire {
    client: Client,
    endpoint: String,
}

impl Wire {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    /// Send a command and return the `value` member of the response.
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        context: &str,
    ) -> Result<Value> {
        let mut request = self.client.request(method.clone(), self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|e| map_transport(e, context))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .unwrap_or_else(|_| json!({ "value": null }));
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(value);
        }

        let code = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        debug!(%method, path, %status, code, "webdriver command failed");
        if status == StatusCode::NOT_FOUND && code == "unknown error" {
            return Err(JobPilotError::FatalSession(format!(
                "webdriver endpoint {path} not found"
            )));
        }
        Err(map_error(code, message, context))
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Backend that creates sessions on a WebDriver server.
pub struct WebDriverBackend {
    wire: Wire,
    browser: String,
    headless: bool,
}

impl WebDriverBackend {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.webdriver_url)
            .map_err(|e| JobPilotError::config(format!("invalid webdriver_url: {e}")))?;

        // Page loads can legitimately take longer than a single UI operation.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.op_timeout_secs.max(1) * 3))
            .build()
            .map_err(|e| JobPilotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            wire: Wire {
                client,
                endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            },
            browser: config.browser.clone(),
            headless: config.headless,
        })
    }

    fn capabilities(&self) -> Value {
        let mut always = json!({ "browserName": self.browser });
        if self.headless {
            match self.browser.as_str() {
                "firefox" => {
                    always["moz:firefoxOptions"] = json!({ "args": ["-headless"] });
                }
                _ => {
                    always["goog:chromeOptions"] =
                        json!({ "args": ["--headless=new", "--window-size=1920,1080"] });
                }
            }
        }
        json!({ "capabilities": { "alwaysMatch": always } })
    }
}

#[async_trait]
impl BrowserBackend for WebDriverBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    #[instrument(skip_all, fields(endpoint = %self.wire.endpoint))]
    async fn acquire(&self) -> Result<(Box<dyn Browser>, ResourceHandle)> {
        let value = self
            .wire
            .command(Method::POST, "/session", Some(self.capabilities()), "new session")
            .await
            .map_err(|e| match e {
                JobPilotError::FatalSession(_) => e,
                other => JobPilotError::FatalSession(format!("session not created: {other}")),
            })?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| JobPilotError::FatalSession("response missing sessionId".into()))?
            .to_string();
        debug!(session_id, "webdriver session created");

        let handle = ResourceHandle {
            backend: BACKEND_NAME.to_string(),
            id: session_id.clone(),
            endpoint: self.wire.endpoint.clone(),
        };
        let session = WebDriverSession {
            wire: self.wire.clone(),
            session_id,
        };
        Ok((Box::new(session), handle))
    }

    async fn reclaim(&self, handle: &ResourceHandle) -> Result<()> {
        let wire = Wire {
            client: self.wire.client.clone(),
            endpoint: handle.endpoint.clone(),
        };
        let path = format!("/session/{}", handle.id);
        match wire.command(Method::DELETE, &path, None, "reclaim").await {
            Ok(_) => Ok(()),
            // Already gone.
            Err(JobPilotError::FatalSession(msg)) if msg.starts_with("invalid session id") => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One WebDriver session.
pub struct WebDriverSession {
    wire: Wire,
    session_id: String,
}

impl WebDriverSession {
    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{suffix}", self.session_id)
    }

    async fn find(&self, selector: &str) -> Result<String> {
        let value = self
            .wire
            .command(
                Method::POST,
                &self.path("/element"),
                Some(json!({ "using": "css selector", "value": selector })),
                selector,
            )
            .await?;
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| JobPilotError::element_not_found(selector))
    }
}

#[async_trait]
impl Browser for WebDriverSession {
    async fn navigate(&self, url: &Url) -> Result<()> {
        self.wire
            .command(
                Method::POST,
                &self.path("/url"),
                Some(json!({ "url": url.as_str() })),
                "navigate",
            )
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Url> {
        let value = self
            .wire
            .command(Method::GET, &self.path("/url"), None, "current url")
            .await?;
        let raw = value
            .as_str()
            .ok_or_else(|| JobPilotError::parse("current url is not a string"))?;
        Url::parse(raw).map_err(|e| JobPilotError::parse(format!("invalid current url: {e}")))
    }

    async fn page_source(&self) -> Result<String> {
        let value = self
            .wire
            .command(Method::GET, &self.path("/source"), None, "page source")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.find(selector).await?;
        self.wire
            .command(
                Method::POST,
                &self.path(&format!("/element/{element}/click")),
                Some(json!({})),
                selector,
            )
            .await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.find(selector).await?;
        // File inputs reject clear; the upload path is simply typed.
        let _ = self
            .wire
            .command(
                Method::POST,
                &self.path(&format!("/element/{element}/clear")),
                Some(json!({})),
                selector,
            )
            .await;
        self.wire
            .command(
                Method::POST,
                &self.path(&format!("/element/{element}/value")),
                Some(json!({ "text": value })),
                selector,
            )
            .await?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.wire
            .command(
                Method::POST,
                &self.path("/execute/sync"),
                Some(json!({ "script": SCROLL_SCRIPT, "args": [] })),
                "scroll",
            )
            .await?;
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        self.wire
            .command(Method::DELETE, &self.path(""), None, "quit")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> SessionConfig {
        SessionConfig {
            webdriver_url: server.uri(),
            op_timeout_secs: 2,
            ..SessionConfig::default()
        }
    }

    async fn mount_new_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "abc123", "capabilities": {} }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn acquire_navigate_and_read() {
        let server = MockServer::start().await;
        mount_new_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/url"))
            .and(body_partial_json(json!({ "url": "https://jobs.example.com/search" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/abc123/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": "https://jobs.example.com/search?page=2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/abc123/source"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": "<html><body>results</body></html>"
            })))
            .mount(&server)
            .await;

        let backend = WebDriverBackend::new(&config_for(&server)).unwrap();
        let (browser, handle) = backend.acquire().await.unwrap();
        assert_eq!(handle.id, "abc123");
        assert_eq!(handle.backend, "webdriver");
        assert_eq!(handle.endpoint, server.uri());

        browser
            .navigate(&Url::parse("https://jobs.example.com/search").unwrap())
            .await
            .unwrap();
        let current = browser.current_url().await.unwrap();
        assert_eq!(current.query(), Some("page=2"));
        assert!(browser.page_source().await.unwrap().contains("results"));
    }

    #[tokio::test]
    async fn click_finds_then_clicks() {
        let server = MockServer::start().await;
        mount_new_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/element"))
            .and(body_partial_json(json!({ "using": "css selector", "value": "button.apply" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { ELEMENT_KEY: "el-1" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/abc123/element/el-1/click"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = WebDriverBackend::new(&config_for(&server)).unwrap();
        let (browser, _) = backend.acquire().await.unwrap();
        browser.click("button.apply").await.unwrap();
    }

    #[tokio::test]
    async fn maps_protocol_errors() {
        let server = MockServer::start().await;
        mount_new_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/element"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "no such element", "message": "Unable to locate element" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/abc123/source"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "invalid session id", "message": "session deleted" }
            })))
            .mount(&server)
            .await;

        let backend = WebDriverBackend::new(&config_for(&server)).unwrap();
        let (browser, _) = backend.acquire().await.unwrap();

        let err = browser.click("button.missing").await.unwrap_err();
        assert!(matches!(err, JobPilotError::ElementNotFound { ref selector } if selector == "button.missing"));
        assert!(err.is_retryable());

        let err = browser.page_source().await.unwrap_err();
        assert!(matches!(err, JobPilotError::FatalSession(_)));
        assert!(err.halts_run());
    }

    #[tokio::test]
    async fn acquire_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": { "error": "session not created", "message": "chrome not reachable" }
            })))
            .mount(&server)
            .await;

        let backend = WebDriverBackend::new(&config_for(&server)).unwrap();
        let err = backend.acquire().await.err().expect("acquire must fail");
        assert!(matches!(err, JobPilotError::FatalSession(_)));
    }

    #[tokio::test]
    async fn reclaim_tolerates_missing_session() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/session/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "invalid session id", "message": "no such session" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = WebDriverBackend::new(&config_for(&server)).unwrap();
        let handle = ResourceHandle {
            backend: "webdriver".into(),
            id: "gone".into(),
            endpoint: server.uri(),
        };
        backend.reclaim(&handle).await.unwrap();
    }
}
