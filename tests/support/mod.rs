#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sales_export::config::{DownloadConfig, ResolvedConfig, TimingConfig, CONFIG_FILE_NAME};
use sales_export::portal::{Locator, PortalDriver};
use sales_export::table::{write_xlsx, Cell, Table};

/// Something the code under test did to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Goto(String),
    Clear(String),
    Type(String, String),
    Click(String),
    ScriptClick(String),
    Hover(String),
    Scroll(String),
    Select(String, String),
}

type Matcher = Box<dyn Fn(&Locator) -> bool + Send + Sync>;
type ClickHook = Box<dyn Fn() + Send + Sync>;

/// An element on the fake page, found by any locator its matcher accepts.
pub struct MockNode {
    name: String,
    matcher: Matcher,
    options: Vec<String>,
    failing_selects: Vec<String>,
    native_click_fails: bool,
    on_click: Option<ClickHook>,
}

impl MockNode {
    pub fn new(
        name: impl Into<String>,
        matcher: impl Fn(&Locator) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            matcher: Box::new(matcher),
            options: Vec::new(),
            failing_selects: Vec::new(),
            native_click_fails: false,
            on_click: None,
        }
    }

    /// Matches any locator whose text contains `needle`.
    pub fn containing(name: impl Into<String>, needle: &str) -> Self {
        let needle = needle.to_string();
        Self::new(name, move |locator| locator.as_str().contains(&needle))
    }

    /// Matches exactly one locator.
    pub fn exactly(name: impl Into<String>, locator: Locator) -> Self {
        Self::new(name, move |candidate| *candidate == locator)
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    /// Selecting `label` by text errors instead of answering.
    pub fn failing_select(mut self, label: &str) -> Self {
        self.failing_selects.push(label.to_string());
        self
    }

    pub fn failing_native_click(mut self) -> Self {
        self.native_click_fails = true;
        self
    }

    pub fn on_click(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_click = Some(Box::new(hook));
        self
    }
}

/// Scripted stand-in for the browser.
#[derive(Default)]
pub struct MockDriver {
    nodes: Vec<MockNode>,
    actions: Mutex<Vec<Action>>,
    values: Mutex<HashMap<String, String>>,
    url: Mutex<Option<String>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: MockNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    /// Current text of an input, after clears and typing.
    pub fn value(&self, name: &str) -> Option<String> {
        self.values.lock().unwrap().get(name).cloned()
    }

    fn record(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }

    fn node(&self, name: &str) -> Result<&MockNode> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| anyhow::anyhow!("stale element {name}"))
    }

    fn fire_click(&self, name: &str) -> Result<()> {
        if let Some(hook) = &self.node(name)?.on_click {
            hook();
        }
        Ok(())
    }
}

#[async_trait]
impl PortalDriver for MockDriver {
    type Element = String;

    async fn goto(&self, url: &str) -> Result<()> {
        self.record(Action::Goto(url.to_string()));
        *self.url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<String>> {
        Ok(self
            .nodes
            .iter()
            .find(|node| (node.matcher)(locator))
            .map(|node| node.name.clone()))
    }

    async fn clear(&self, element: &String) -> Result<()> {
        self.record(Action::Clear(element.clone()));
        self.values.lock().unwrap().insert(element.clone(), String::new());
        Ok(())
    }

    async fn type_text(&self, element: &String, text: &str) -> Result<()> {
        self.record(Action::Type(element.clone(), text.to_string()));
        self.values
            .lock()
            .unwrap()
            .entry(element.clone())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn click(&self, element: &String) -> Result<()> {
        if self.node(element)?.native_click_fails {
            anyhow::bail!("element {element} is not clickable at point");
        }
        self.record(Action::Click(element.clone()));
        self.fire_click(element)
    }

    async fn script_click(&self, element: &String) -> Result<()> {
        self.record(Action::ScriptClick(element.clone()));
        self.fire_click(element)
    }

    async fn hover(&self, element: &String) -> Result<()> {
        self.record(Action::Hover(element.clone()));
        Ok(())
    }

    async fn scroll_into_view(&self, element: &String) -> Result<()> {
        self.record(Action::Scroll(element.clone()));
        Ok(())
    }

    async fn select_by_text(&self, element: &String, label: &str) -> Result<bool> {
        let node = self.node(element)?;
        if node.failing_selects.iter().any(|o| o == label) {
            anyhow::bail!("select {element} detached while choosing {label}");
        }
        if node.options.iter().any(|o| o == label) {
            self.record(Action::Select(element.clone(), label.to_string()));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn select_by_index(&self, element: &String, index: usize) -> Result<Option<String>> {
        let node = self.node(element)?;
        let chosen = node.options.get(index).cloned();
        if let Some(label) = &chosen {
            self.record(Action::Select(element.clone(), label.clone()));
        }
        Ok(chosen)
    }

    async fn current_url(&self) -> Result<Option<String>> {
        Ok(self.url.lock().unwrap().clone())
    }
}

/// Short real-time limits so watcher timeouts stay fast.
pub fn fast_download() -> DownloadConfig {
    DownloadConfig {
        timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(10),
        partial_suffix: ".crdownload".to_string(),
    }
}

/// Default config rooted in `dir`, with no pauses.
pub fn test_config(dir: &Path) -> Result<ResolvedConfig> {
    let mut config = ResolvedConfig::load_or_default(&dir.join(CONFIG_FILE_NAME))?;
    config.timing = TimingConfig::immediate();
    config.download = fast_download();
    Ok(config)
}

/// Small sales sheet with a `fecha` column.
pub fn write_sales_sheet(path: &Path, rows: &[(&str, f64)]) -> Result<()> {
    let mut table = Table::new(vec!["fecha".to_string(), "importe".to_string()]);
    for (fecha, importe) in rows {
        table.push_row(vec![Cell::from_text(*fecha), Cell::Float(*importe)]);
    }
    write_xlsx(&table, path)
}

/// Nodes for the login form, branch selector and menu of the default config.
pub fn portal_shell(driver: MockDriver) -> MockDriver {
    driver
        .with_node(MockNode::containing("username", "@placeholder='Usuario'"))
        .with_node(MockNode::containing("password", "@placeholder='Password'"))
        .with_node(MockNode::containing("login", "contains(text(), 'Ingresar')"))
        .with_node(
            MockNode::exactly("branch", Locator::xpath("//select"))
                .with_options(&["Seleccione", "304 - SUCURSAL IZÚCAR DE MATAMOROS, SADO DE ORIENTE ATLIXCO"]),
        )
        .with_node(MockNode::exactly("body", Locator::css("body")))
        .with_node(MockNode::containing("menu-reportes", "'Reportes'"))
        .with_node(MockNode::containing("menu-ventas", "'Ventas'"))
        .with_node(MockNode::containing("menu-consulta", "'Consulta de Venta'"))
}
