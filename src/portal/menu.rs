//! Hover/click navigation through the portal's three-level menu.

use anyhow::Result;
use tracing::{debug, info};

use super::{click_with_fallback, first_match, pause, wait_for, xpath_literal, Locator, PortalDriver};
use crate::config::{MenuConfig, TimingConfig};

/// No menu item matched the label or any of its synonyms.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Could not find menu item {label:?} (also tried {synonyms:?})")]
pub struct NavigationError {
    pub label: String,
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// Open an intermediate level.
    Hover,
    /// Activate the terminal item.
    Click,
}

/// One menu level: labels in priority order and what to do once found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuStep {
    pub labels: Vec<String>,
    pub action: MenuAction,
}

impl MenuStep {
    pub fn new(labels: Vec<String>, action: MenuAction) -> Self {
        Self { labels, action }
    }

    /// The label normally shown by the portal.
    pub fn primary(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or_default()
    }

    fn not_found(&self) -> NavigationError {
        NavigationError {
            label: self.primary().to_string(),
            synonyms: self.labels.iter().skip(1).cloned().collect(),
        }
    }
}

/// Top menu and submenu are hovered; the leaf is clicked.
pub fn menu_path(menu: &MenuConfig) -> Vec<MenuStep> {
    vec![
        MenuStep::new(menu.top.clone(), MenuAction::Hover),
        MenuStep::new(menu.submenu.clone(), MenuAction::Hover),
        MenuStep::new(menu.leaf.clone(), MenuAction::Click),
    ]
}

/// Locators tried for one label, most specific first.
pub fn strategies_for_label(label: &str) -> Vec<Locator> {
    let text = xpath_literal(label);
    vec![
        Locator::xpath(format!("//a[contains(text(), {text})]")),
        Locator::xpath(format!("//a[normalize-space(text())={text}]")),
        Locator::xpath(format!("//li//a[contains(text(), {text})]")),
        Locator::xpath(format!("//span[contains(text(), {text})]/..")),
        // Partial and exact link text match the whole rendered text,
        // including text inside child elements.
        Locator::xpath(format!("//a[contains(normalize-space(.), {text})]")),
        Locator::xpath(format!("//a[normalize-space(.)={text}]")),
    ]
}

/// Find the element for `step`, trying every strategy for each label in turn.
///
/// Returns the label that matched along with the element.
pub async fn locate_step<D: PortalDriver + ?Sized>(
    driver: &D,
    step: &MenuStep,
    timing: &TimingConfig,
) -> Result<(String, D::Element)> {
    for label in &step.labels {
        if let Some((strategy, element)) =
            first_match(driver, &strategies_for_label(label), timing).await?
        {
            debug!(label = %label, strategy = strategy + 1, "Found menu item");
            return Ok((label.clone(), element));
        }
        debug!(label = %label, "Menu label not found; trying next variant");
    }
    Err(step.not_found().into())
}

/// Walk the menu from the landing page to the report screen.
///
/// Any level that cannot be found fails with [`NavigationError`]; this is
/// fatal for a run since no period can be exported without the report screen.
pub async fn navigate<D: PortalDriver + ?Sized>(
    driver: &D,
    menu: &MenuConfig,
    timing: &TimingConfig,
) -> Result<()> {
    info!("Navigating to the report screen");
    wait_for(driver, &Locator::css("body"), timing.locate_timeout, timing.locate_poll).await?;
    pause(timing.menu_settle).await;

    for step in menu_path(menu) {
        let (label, element) = locate_step(driver, &step, timing).await?;

        driver.scroll_into_view(&element).await?;
        pause(timing.after_scroll).await;

        match step.action {
            MenuAction::Hover => {
                driver.hover(&element).await?;
                info!(label = %label, "Hovered menu item");
                pause(timing.after_hover).await;
            }
            MenuAction::Click => {
                let method = click_with_fallback(driver, &element).await?;
                info!(label = %label, ?method, "Clicked menu item");
                pause(timing.after_navigation).await;
            }
        }
    }

    if let Ok(Some(url)) = driver.current_url().await {
        info!(url = %url, "Navigation complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_hovers_then_clicks() {
        let path = menu_path(&MenuConfig::default());
        let actions: Vec<MenuAction> = path.iter().map(|s| s.action).collect();
        assert_eq!(
            actions,
            vec![MenuAction::Hover, MenuAction::Hover, MenuAction::Click]
        );
        assert_eq!(path[2].primary(), "Consulta de Venta");
    }

    #[test]
    fn strategies_quote_label() {
        let strategies = strategies_for_label("Reportes");
        assert_eq!(strategies.len(), 6);
        assert_eq!(
            strategies[0],
            Locator::xpath("//a[contains(text(), 'Reportes')]")
        );
        assert!(strategies
            .iter()
            .all(|locator| locator.as_str().contains("'Reportes'")));
    }

    #[test]
    fn not_found_error_names_label_and_synonyms() {
        let step = MenuStep::new(
            vec!["Ventas".to_string(), "Sales".to_string()],
            MenuAction::Hover,
        );
        let err = step.not_found();
        assert_eq!(err.label, "Ventas");
        assert_eq!(err.synonyms, vec!["Sales"]);
        assert!(err.to_string().contains("\"Ventas\""));
    }
}
