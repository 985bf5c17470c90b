//! Chrome DevTools session backed by chromiumoxide.
//!
//! Each crawl direction gets its own tab. Sessions either launch a private
//! browser process (with its own profile directory) or open a tab in a
//! remote browser given by `remote_url`.

#[cfg(feature = "browser")]
use std::time::{Duration, Instant};

#[cfg(feature = "browser")]
use async_trait::async_trait;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info};

#[cfg(feature = "browser")]
use super::{BrowsingSession, Locator, SessionFactory, SessionResult};
use crate::config::BrowserEngineConfig;
#[cfg(feature = "browser")]
use crate::error::SessionError;
#[cfg(feature = "browser")]
use crate::models::Direction;

#[cfg(feature = "browser")]
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Returns the selector of the element covering `this` at its center, or
/// null when `this` would receive a click there.
#[cfg(feature = "browser")]
const INTERCEPT_CHECK_JS: &str = r#"function() {
    this.scrollIntoView({block: 'center', inline: 'center'});
    const r = this.getBoundingClientRect();
    const top = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
    if (top === null || top === this || this.contains(top)) { return null; }
    let desc = '<' + top.tagName.toLowerCase();
    if (top.id) { desc += ' id="' + top.id + '"'; }
    if (top.className && typeof top.className === 'string') { desc += ' class="' + top.className + '"'; }
    return desc + '>';
}"#;

#[cfg(feature = "browser")]
const FORCE_CLICK_JS: &str = "function() { this.click(); }";

#[cfg(feature = "browser")]
const IS_DISPLAYED_JS: &str = r#"function() {
    const style = window.getComputedStyle(this);
    if (style.visibility === 'hidden' || style.display === 'none') { return false; }
    return !!(this.offsetWidth || this.offsetHeight || this.getClientRects().length);
}"#;

/// Launches or connects to Chrome, one tab per direction.
pub struct ChromeSessionFactory {
    config: BrowserEngineConfig,
}

impl ChromeSessionFactory {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrowserEngineConfig {
        &self.config
    }
}

#[cfg(feature = "browser")]
impl ChromeSessionFactory {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    fn find_chrome(&self) -> SessionResult<std::path::PathBuf> {
        if let Some(path) = &self.config.chrome_path {
            return Ok(path.clone());
        }

        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                debug!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        debug!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(SessionError::Launch(
            "Chrome/Chromium not found. Install it or set browser.chrome_path \
             (or connect to a running browser with BROWSER_URL)"
                .to_string(),
        ))
    }

    async fn launch(&self, direction: Direction) -> SessionResult<(Browser, JoinHandle<()>)> {
        info!(
            "Launching browser for {} crawl (headless={})",
            direction, self.config.headless
        );

        let chrome_path = self.find_chrome()?;
        let profile_dir = std::env::temp_dir().join(format!(
            "dircrawl-{}-{}",
            direction,
            std::process::id()
        ));

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(profile_dir)
            .request_timeout(Duration::from_secs(self.config.timeout));

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| SessionError::Launch(format!("Failed to build browser config: {}", e)))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(format!("Failed to launch browser: {}", e)))?;

        Ok((browser, spawn_handler(handler)))
    }

    async fn connect_remote(&self, url: &str) -> SessionResult<(Browser, JoinHandle<()>)> {
        info!("Connecting to remote browser at {}", url);

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let client = reqwest::Client::new();
        let resp: serde_json::Value = client
            .get(&version_url)
            .timeout(Duration::from_secs(self.config.timeout))
            .send()
            .await
            .map_err(|e| SessionError::Launch(format!("Failed to reach remote browser: {}", e)))?
            .json()
            .await
            .map_err(|e| {
                SessionError::Launch(format!("Failed to parse browser version info: {}", e))
            })?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SessionError::Launch("No webSocketDebuggerUrl in response".to_string()))?;

        debug!("Connecting to WebSocket: {}", ws_url);

        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| SessionError::Launch(format!("Failed to connect to remote browser: {}", e)))?;

        Ok((browser, spawn_handler(handler)))
    }
}

#[cfg(feature = "browser")]
fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}

#[cfg(feature = "browser")]
fn protocol(e: impl std::fmt::Display) -> SessionError {
    SessionError::Protocol(e.to_string())
}

#[cfg(feature = "browser")]
#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    type Session = ChromeSession;

    async fn create(&self, direction: Direction) -> SessionResult<ChromeSession> {
        let owned = self.config.remote_url.is_none();
        let (browser, handler) = match &self.config.remote_url {
            Some(url) => self.connect_remote(url).await?,
            None => self.launch(direction).await?,
        };

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Launch(format!("Failed to open tab: {}", e)))?;

        Ok(ChromeSession {
            browser,
            page,
            handler,
            owned,
            closed: false,
        })
    }
}

/// One Chrome tab.
#[cfg(feature = "browser")]
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    /// Whether this session launched the browser process (and must close it).
    owned: bool,
    closed: bool,
}

#[cfg(feature = "browser")]
impl ChromeSession {
    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    async fn xpath_count(&self, xpath: &str) -> SessionResult<usize> {
        let script = format!(
            "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
            serde_json::Value::String(xpath.to_string())
        );
        let count: usize = self
            .page
            .evaluate(script)
            .await
            .map_err(protocol)?
            .into_value()
            .map_err(protocol)?;
        Ok(count)
    }

    async fn query(&self, locator: &Locator) -> SessionResult<Vec<Element>> {
        match locator.to_xpath() {
            None => self
                .page
                .find_elements(locator.to_string())
                .await
                .map_err(protocol),
            Some(xpath) => {
                if self.xpath_count(&xpath).await? == 0 {
                    return Ok(Vec::new());
                }
                self.page.find_xpaths(xpath).await.map_err(protocol)
            }
        }
    }

    async fn call_bool(&self, element: &Element, function: &str) -> SessionResult<bool> {
        let ret = element
            .call_js_fn(function, false)
            .await
            .map_err(protocol)?;
        Ok(ret
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl BrowsingSession for ChromeSession {
    type Element = Element;

    async fn open(&mut self, url: &str) -> SessionResult<()> {
        self.ensure_open()?;
        debug!("Opening {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| SessionError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn find_all(&mut self, locator: &Locator) -> SessionResult<Vec<Element>> {
        self.ensure_open()?;
        self.query(locator).await
    }

    async fn find(&mut self, locator: &Locator) -> SessionResult<Option<Element>> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    async fn find_within(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> SessionResult<Option<Element>> {
        Ok(self.find_all_within(parent, locator).await?.into_iter().next())
    }

    async fn find_all_within(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> SessionResult<Vec<Element>> {
        self.ensure_open()?;
        match locator {
            Locator::Css(css) => parent.find_elements(css.as_str()).await.map_err(protocol),
            other => Err(SessionError::Protocol(format!(
                "relative lookups must use CSS selectors: {}",
                other
            ))),
        }
    }

    async fn text(&mut self, element: &Element) -> SessionResult<String> {
        self.ensure_open()?;
        Ok(element
            .inner_text()
            .await
            .map_err(protocol)?
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn outer_html(&mut self, element: &Element) -> SessionResult<String> {
        self.ensure_open()?;
        Ok(element
            .outer_html()
            .await
            .map_err(protocol)?
            .unwrap_or_default())
    }

    async fn is_displayed(&mut self, element: &Element) -> SessionResult<bool> {
        self.ensure_open()?;
        self.call_bool(element, IS_DISPLAYED_JS).await
    }

    async fn click(&mut self, element: &Element) -> SessionResult<()> {
        self.ensure_open()?;
        let ret = element
            .call_js_fn(INTERCEPT_CHECK_JS, false)
            .await
            .map_err(protocol)?;
        if let Some(interceptor) = ret.result.value.as_ref().and_then(|v| v.as_str()) {
            return Err(SessionError::ClickIntercepted(format!(
                "element {} would receive the click",
                interceptor
            )));
        }
        element.click().await.map_err(protocol)?;
        Ok(())
    }

    async fn force_click(&mut self, element: &Element) -> SessionResult<()> {
        self.ensure_open()?;
        element
            .call_js_fn(FORCE_CLICK_JS, false)
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: &Element) -> SessionResult<()> {
        self.ensure_open()?;
        element.scroll_into_view().await.map_err(protocol)?;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn back(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.page
            .evaluate("window.history.back()")
            .await
            .map_err(|e| SessionError::Navigation(format!("history.back failed: {}", e)))?;
        Ok(())
    }

    async fn wait_until_present(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> SessionResult<()> {
        self.ensure_open()?;
        let started = Instant::now();
        loop {
            // Lookups can fail transiently while a navigation is in flight
            match self.query(locator).await {
                Ok(found) if !found.is_empty() => return Ok(()),
                Ok(_) => {}
                Err(e) => debug!("Lookup of {} failed while waiting: {}", locator, e),
            }
            if started.elapsed() >= timeout {
                return Err(SessionError::Timeout {
                    what: locator.to_string(),
                    secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn close(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.closed = true;
        let page_result = self.page.clone().close().await.map_err(protocol);
        if self.owned {
            if let Err(e) = self.browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            let _ = self.browser.wait().await;
        }
        self.handler.abort();
        page_result
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
mod disabled {
    use async_trait::async_trait;

    use super::ChromeSessionFactory;
    use crate::error::SessionError;
    use crate::models::Direction;
    use crate::session::memory::MemorySession;
    use crate::session::{SessionFactory, SessionResult};

    #[async_trait]
    impl SessionFactory for ChromeSessionFactory {
        type Session = MemorySession;

        async fn create(&self, _direction: Direction) -> SessionResult<MemorySession> {
            Err(SessionError::Launch(
                "Browser support not compiled. Rebuild with: cargo build --features browser"
                    .to_string(),
            ))
        }
    }
}
