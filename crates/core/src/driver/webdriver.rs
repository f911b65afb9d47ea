//! W3C WebDriver implementation (chromedriver, geckodriver, Selenium).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{BrowserKind, WebDriverConfig};

use super::{BrowserDriver, DriverError, ElementHandle};

/// Key under which WebDriver serializes element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Unicode private-use code point WebDriver maps to the Enter key.
const ENTER_KEY: &str = "\u{E007}";

/// WebDriver client holding one browser session.
pub struct WebDriverClient {
    client: Client,
    config: WebDriverConfig,
    /// Session ID assigned by the remote end (cleared on close).
    session: RwLock<Option<String>>,
}

impl WebDriverClient {
    /// Connect to the WebDriver endpoint and open a browser session.
    pub async fn connect(config: WebDriverConfig, headless: bool) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| DriverError::ConnectionFailed(e.to_string()))?;

        let driver = Self {
            client,
            config,
            session: RwLock::new(None),
        };
        driver.new_session(headless).await?;
        Ok(driver)
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn capabilities(&self, headless: bool) -> Value {
        match self.config.browser {
            BrowserKind::Chrome => {
                let mut args = vec!["--window-size=1366,900"];
                if headless {
                    args.push("--headless=new");
                }
                json!({
                    "capabilities": {
                        "alwaysMatch": {
                            "browserName": "chrome",
                            "goog:chromeOptions": { "args": args }
                        }
                    }
                })
            }
            BrowserKind::Firefox => {
                let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
                json!({
                    "capabilities": {
                        "alwaysMatch": {
                            "browserName": "firefox",
                            "moz:firefoxOptions": { "args": args }
                        }
                    }
                })
            }
        }
    }

    async fn new_session(&self, headless: bool) -> Result<(), DriverError> {
        let url = format!("{}/session", self.base_url());
        let response = self
            .client
            .post(&url)
            .json(&self.capabilities(headless))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Protocol(format!("Failed to parse response: {}", e)))?;

        if !status.is_success() {
            return Err(map_wire_error(&body["value"]));
        }

        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| DriverError::Protocol("new session response without sessionId".into()))?
            .to_string();

        debug!(session_id = %session_id, browser = ?self.config.browser, "WebDriver session created");
        *self.session.write().await = Some(session_id);
        Ok(())
    }

    async fn session_id(&self) -> Result<String, DriverError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| DriverError::SessionLost("no active WebDriver session".into()))
    }

    /// Issue a session-scoped command and return its `value`.
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let session_id = self.session_id().await?;
        let url = format!("{}/session/{}{}", self.base_url(), session_id, path);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let mut body: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Protocol(format!("Failed to parse response: {}", e)))?;

        if !status.is_success() {
            return Err(map_wire_error(&body["value"]));
        }

        Ok(body["value"].take())
    }

    async fn find_from(
        &self,
        path: String,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let value = self
            .command(
                Method::POST,
                &path,
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;

        let elements = value
            .as_array()
            .ok_or_else(|| DriverError::Protocol("find elements did not return a list".into()))?;

        elements.iter().map(element_from_value).collect()
    }
}

/// Extract an element reference from a WebDriver element object.
fn element_from_value(value: &Value) -> Result<ElementHandle, DriverError> {
    value[ELEMENT_KEY]
        .as_str()
        .map(ElementHandle::new)
        .ok_or_else(|| DriverError::Protocol(format!("not an element reference: {}", value)))
}

fn map_transport_error(e: reqwest::Error) -> DriverError {
    if e.is_timeout() {
        DriverError::Timeout(e.to_string())
    } else if e.is_connect() {
        DriverError::ConnectionFailed(e.to_string())
    } else {
        DriverError::Protocol(e.to_string())
    }
}

/// Map a WebDriver error object (`{"error": ..., "message": ...}`) to a driver error.
fn map_wire_error(value: &Value) -> DriverError {
    let code = value["error"].as_str().unwrap_or("unknown error");
    let message = value["message"]
        .as_str()
        .unwrap_or_default()
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();

    match code {
        "no such element" => DriverError::ElementNotFound { selector: message },
        "stale element reference" | "detached shadow root" => DriverError::StaleElement(message),
        "element not interactable" | "element click intercepted" => {
            DriverError::NotInteractable(message)
        }
        "timeout" | "script timeout" => DriverError::Timeout(message),
        "invalid session id" | "session not created" => DriverError::SessionLost(message),
        "unknown error" if message.contains("net::ERR_") => DriverError::Navigation(message),
        _ => DriverError::Protocol(format!("{}: {}", code, message)),
    }
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        debug!(url = url, "Navigating");
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| DriverError::Protocol("current url is not a string".into()))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        self.find_from("/elements".to_string(), selector).await
    }

    async fn find_in(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        self.find_from(format!("/element/{}/elements", parent.id()), selector)
            .await
    }

    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        let started = Instant::now();
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            match self.find_all(selector).await {
                Ok(found) => {
                    if let Some(first) = found.into_iter().next() {
                        return Ok(first);
                    }
                }
                Err(e) if e.is_transient() => {
                    debug!(selector = selector, error = %e, "Transient error while waiting");
                }
                Err(e) => return Err(e),
            }

            if started.elapsed() >= timeout {
                return Err(DriverError::Timeout(format!(
                    "{} did not appear within {:?}",
                    selector, timeout
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            &format!("/element/{}/click", element.id()),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            &format!("/element/{}/clear", element.id()),
            Some(json!({})),
        )
        .await?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.id()),
            Some(json!({ "text": value })),
        )
        .await
        .map(|_| ())
    }

    async fn submit(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.id()),
            Some(json!({ "text": ENTER_KEY })),
        )
        .await
        .map(|_| ())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self
            .command(Method::GET, &format!("/element/{}/text", element.id()), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/attribute/{}", element.id(), name),
                None,
            )
            .await?;
        Ok(value.as_str().map(String::from))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/displayed", element.id()),
                None,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/enabled", element.id()),
                None,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("screenshot is not a string".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Protocol(format!("invalid screenshot payload: {}", e)))
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        let value = self.command(Method::GET, "/source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> Result<(), DriverError> {
        let Some(session_id) = self.session.write().await.take() else {
            return Ok(());
        };

        let url = format!("{}/session/{}", self.base_url(), session_id);
        if let Err(e) = self.client.delete(&url).send().await {
            warn!("Failed to close WebDriver session {}: {}", session_id, e);
            return Err(map_transport_error(e));
        }
        debug!(session_id = %session_id, "WebDriver session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_from_value() {
        let value = json!({ ELEMENT_KEY: "f.1.e.42" });
        let handle = element_from_value(&value).unwrap();
        assert_eq!(handle.id(), "f.1.e.42");
    }

    #[test]
    fn test_element_from_value_rejects_other_objects() {
        let value = json!({ "id": "f.1.e.42" });
        assert!(matches!(
            element_from_value(&value),
            Err(DriverError::Protocol(_))
        ));
    }

    #[test]
    fn test_map_wire_error_codes() {
        let stale = map_wire_error(&json!({
            "error": "stale element reference",
            "message": "element is not attached to the page document\n  (Session info: chrome=120)"
        }));
        assert_eq!(
            stale,
            DriverError::StaleElement("element is not attached to the page document".into())
        );

        let intercepted = map_wire_error(&json!({
            "error": "element click intercepted",
            "message": "other element would receive the click"
        }));
        assert!(matches!(intercepted, DriverError::NotInteractable(_)));

        let lost = map_wire_error(&json!({ "error": "invalid session id", "message": "" }));
        assert!(lost.is_session_lost());

        let nav = map_wire_error(&json!({
            "error": "unknown error",
            "message": "net::ERR_NAME_NOT_RESOLVED"
        }));
        assert!(matches!(nav, DriverError::Navigation(_)));

        let other = map_wire_error(&json!({ "error": "invalid argument", "message": "bad" }));
        assert_eq!(other, DriverError::Protocol("invalid argument: bad".into()));
    }

    #[test]
    fn test_map_wire_error_missing_fields() {
        let err = map_wire_error(&Value::Null);
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[test]
    fn test_chrome_headless_capabilities() {
        let client = WebDriverClient {
            client: Client::new(),
            config: WebDriverConfig::default(),
            session: RwLock::new(None),
        };
        let caps = client.capabilities(true);
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));

        let caps = client.capabilities(false);
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(!args.iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn test_firefox_capabilities() {
        let client = WebDriverClient {
            client: Client::new(),
            config: WebDriverConfig {
                browser: BrowserKind::Firefox,
                ..Default::default()
            },
            session: RwLock::new(None),
        };
        let caps = client.capabilities(true);
        assert_eq!(caps["capabilities"]["alwaysMatch"]["browserName"], "firefox");
        assert_eq!(
            caps["capabilities"]["alwaysMatch"]["moz:firefoxOptions"]["args"][0],
            "-headless"
        );
    }

    #[tokio::test]
    async fn test_command_without_session_is_session_lost() {
        let client = WebDriverClient {
            client: Client::new(),
            config: WebDriverConfig::default(),
            session: RwLock::new(None),
        };
        let result = client.current_url().await;
        assert!(matches!(result, Err(DriverError::SessionLost(_))));
        assert!(client.close().await.is_ok());
    }
}
