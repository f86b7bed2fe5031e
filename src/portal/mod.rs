//! Browser-driven interaction with the sales portal.
//!
//! Everything that touches the page goes through [`PortalDriver`], so the
//! login, menu and export flows can run against Chrome ([`ChromeDriver`]) or
//! a scripted double in tests.

#[cfg(feature = "browser")]
mod chrome;
mod export;
mod menu;
mod session;

#[cfg(feature = "browser")]
pub use chrome::{find_chrome, ChromeDriver};
pub use export::{export_period, ExportContext};
pub use menu::{
    locate_step, menu_path, navigate, strategies_for_label, MenuAction, MenuStep, NavigationError,
};
pub use session::{login, select_branch};

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::config::TimingConfig;

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    /// The raw selector or expression.
    pub fn as_str(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{s}"),
            Locator::XPath(s) => write!(f, "xpath:{s}"),
        }
    }
}

/// Quote `text` as an XPath string literal.
///
/// XPath 1.0 has no escape sequences, so text containing both quote kinds is
/// split into a `concat()` call.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts: Vec<String> = text
            .split('\'')
            .map(|part| format!("'{part}'"))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

pub(crate) fn input_by_placeholder(placeholder: &str) -> Locator {
    Locator::xpath(format!("//input[@placeholder={}]", xpath_literal(placeholder)))
}

pub(crate) fn input_by_name(name: &str) -> Locator {
    Locator::xpath(format!("//input[@name={}]", xpath_literal(name)))
}

/// Page operations used by the portal flows.
///
/// `find` is a single attempt: a missing element is `Ok(None)`, and `Err` is
/// reserved for a broken session. Polling is layered on top by [`wait_for`].
#[async_trait]
pub trait PortalDriver: Send + Sync {
    type Element: Send + Sync;

    async fn goto(&self, url: &str) -> Result<()>;

    async fn find(&self, locator: &Locator) -> Result<Option<Self::Element>>;

    /// Empty a text input.
    async fn clear(&self, element: &Self::Element) -> Result<()>;

    async fn type_text(&self, element: &Self::Element, text: &str) -> Result<()>;

    /// Native (mouse) click.
    async fn click(&self, element: &Self::Element) -> Result<()>;

    /// `element.click()` from page script; works on obscured elements.
    async fn script_click(&self, element: &Self::Element) -> Result<()>;

    async fn hover(&self, element: &Self::Element) -> Result<()>;

    async fn scroll_into_view(&self, element: &Self::Element) -> Result<()>;

    /// Choose the option of a `<select>` whose visible text equals `label`.
    /// Returns `false` when no option matches.
    async fn select_by_text(&self, element: &Self::Element, label: &str) -> Result<bool>;

    /// Choose the option at `index`, returning its text, or `None` if the
    /// select has no such option.
    async fn select_by_index(&self, element: &Self::Element, index: usize)
        -> Result<Option<String>>;

    async fn current_url(&self) -> Result<Option<String>>;
}

/// Poll `locator` until it is present or `timeout` passes.
///
/// Always makes at least one attempt, so a zero timeout is a plain lookup.
pub async fn wait_for<D: PortalDriver + ?Sized>(
    driver: &D,
    locator: &Locator,
    timeout: Duration,
    poll: Duration,
) -> Result<Option<D::Element>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(element) = driver.find(locator).await? {
            return Ok(Some(element));
        }
        if Instant::now() >= deadline {
            debug!(%locator, "Element not found before timeout");
            return Ok(None);
        }
        tokio::time::sleep(poll.max(Duration::from_millis(10))).await;
    }
}

/// Try each locator in order; the first one that finds an element wins.
///
/// Returns the index of the winning locator with the element.
pub async fn first_match<D: PortalDriver + ?Sized>(
    driver: &D,
    locators: &[Locator],
    timing: &TimingConfig,
) -> Result<Option<(usize, D::Element)>> {
    for (index, locator) in locators.iter().enumerate() {
        if let Some(element) =
            wait_for(driver, locator, timing.locate_timeout, timing.locate_poll).await?
        {
            return Ok(Some((index, element)));
        }
    }
    Ok(None)
}

/// How a click was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMethod {
    Native,
    Script,
}

/// Native click, falling back to a scripted click when the native one fails.
pub async fn click_with_fallback<D: PortalDriver + ?Sized>(
    driver: &D,
    element: &D::Element,
) -> Result<ClickMethod> {
    match driver.click(element).await {
        Ok(()) => Ok(ClickMethod::Native),
        Err(err) => {
            debug!(error = %err, "Native click failed; using script click");
            driver.script_click(element).await?;
            Ok(ClickMethod::Script)
        }
    }
}

/// Sleep unless the pause is zero.
pub(crate) async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
