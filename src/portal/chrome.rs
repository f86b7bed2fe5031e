//! Chrome-backed [`PortalDriver`] over the DevTools protocol.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Locator, PortalDriver};
use crate::config::BrowserSettings;

/// The portal serves a self-signed certificate on an internal address.
const PORTAL_ARGS: &[&str] = &[
    "--ignore-certificate-errors",
    "--ignore-ssl-errors",
    "--allow-running-insecure-content",
    "--disable-web-security",
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--no-first-run",
    "--no-default-browser-check",
];

pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromeDriver {
    /// Start Chrome with downloads routed to `download_dir`.
    pub async fn launch(settings: &BrowserSettings, download_dir: &Path) -> Result<Self> {
        let chrome_path = match &settings.chrome_path {
            Some(path) => path.display().to_string(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Install Chrome or set browser.chrome_path in the config.",
            )?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .viewport(None);
        if !settings.headless {
            builder = builder.with_head();
        }
        for arg in PORTAL_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &settings.extra_args {
            builder = builder.arg(arg.as_str());
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Browser handler error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser tab")?;
        setup_download_handling(&page, download_dir).await?;

        info!(headless = settings.headless, "Browser started");
        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Close the browser and stop the event handler.
    pub async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        closed.context("Failed to close browser")?;
        info!("Browser closed");
        Ok(())
    }

    async fn eval_on(&self, element: &Element, function: String) -> Result<serde_json::Value> {
        let returns = element
            .call_js_fn(function, false)
            .await
            .context("Script call on element failed")?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }
}

async fn setup_download_handling(page: &Page, download_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(download_dir)?;

    let download_params = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(download_dir.display().to_string())
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build download params: {e}"))?;

    page.execute(download_params).await?;
    debug!(dir = %download_dir.display(), "Downloads routed");
    Ok(())
}

/// Errors the page answers with when a node is absent or a search comes back
/// empty. Anything else means the session itself is unusable.
fn is_lookup_miss(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Chrome(_) | CdpError::NotFound | CdpError::ChromeMessage(_)
    )
}

#[async_trait]
impl PortalDriver for ChromeDriver {
    type Element = Element;

    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<Element>> {
        let found = match locator {
            Locator::Css(selector) => self.page.find_elements(selector.as_str()).await,
            Locator::XPath(expr) => self.page.find_xpaths(expr.as_str()).await,
        };
        match found {
            Ok(elements) => Ok(elements.into_iter().next()),
            Err(err) if is_lookup_miss(&err) => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Lookup failed: {}", locator.as_str())),
        }
    }

    async fn clear(&self, element: &Element) -> Result<()> {
        element.focus().await?;
        self.eval_on(
            element,
            "function() { this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); }"
                .to_string(),
        )
        .await?;
        Ok(())
    }

    async fn type_text(&self, element: &Element, text: &str) -> Result<()> {
        element.focus().await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> Result<()> {
        element.click().await?;
        Ok(())
    }

    async fn script_click(&self, element: &Element) -> Result<()> {
        self.eval_on(element, "function() { this.click(); }".to_string())
            .await?;
        Ok(())
    }

    async fn hover(&self, element: &Element) -> Result<()> {
        element.hover().await?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &Element) -> Result<()> {
        element.scroll_into_view().await?;
        Ok(())
    }

    async fn select_by_text(&self, element: &Element, label: &str) -> Result<bool> {
        let label = serde_json::to_string(label)?;
        let function = format!(
            "function() {{
                const label = {label};
                const index = Array.from(this.options).findIndex(o => o.text.trim() === label);
                if (index < 0) return false;
                this.selectedIndex = index;
                this.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }}"
        );
        let value = self.eval_on(element, function).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn select_by_index(&self, element: &Element, index: usize) -> Result<Option<String>> {
        let function = format!(
            "function() {{
                if (this.options.length <= {index}) return null;
                this.selectedIndex = {index};
                this.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return this.options[{index}].text.trim();
            }}"
        );
        let value = self.eval_on(element, function).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn current_url(&self) -> Result<Option<String>> {
        Ok(self.page.url().await?)
    }
}

/// Find a Chrome/Chromium executable on PATH or in the usual install locations.
pub fn find_chrome() -> Option<String> {
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // NixOS
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Windows
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];

    candidates
        .into_iter()
        .find(|candidate| Path::new(candidate).exists())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_errors_are_misses_and_transport_errors_are_not() {
        let empty_search = CdpError::Chrome(chromiumoxide::types::Error {
            code: -32000,
            message: "Invalid search result range".to_string(),
        });
        assert!(is_lookup_miss(&empty_search));
        assert!(is_lookup_miss(&CdpError::NotFound));

        assert!(!is_lookup_miss(&CdpError::NoResponse));
        assert!(!is_lookup_miss(&CdpError::Timeout));
        assert!(!is_lookup_miss(&CdpError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "browser gone"
        ))));
    }
}
