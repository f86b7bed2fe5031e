use anyhow::Result;
use sales_export::config::{MenuConfig, TimingConfig};
use sales_export::portal::{locate_step, navigate, Locator, MenuAction, MenuStep, NavigationError};

mod support;
use support::{Action, MockDriver, MockNode};

fn menu_page() -> MockDriver {
    MockDriver::new()
        .with_node(MockNode::exactly("body", Locator::css("body")))
        .with_node(MockNode::containing("reportes", "'Reportes'"))
        .with_node(MockNode::containing("ventas", "'Ventas'"))
}

#[tokio::test]
async fn hovers_levels_and_clicks_leaf() -> Result<()> {
    let driver = menu_page().with_node(MockNode::containing("consulta", "'Consulta de Venta'"));

    navigate(&driver, &MenuConfig::default(), &TimingConfig::immediate()).await?;

    let actions = driver.actions();
    assert_eq!(
        actions,
        vec![
            Action::Scroll("reportes".into()),
            Action::Hover("reportes".into()),
            Action::Scroll("ventas".into()),
            Action::Hover("ventas".into()),
            Action::Scroll("consulta".into()),
            Action::Click("consulta".into()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn synonym_is_used_when_primary_label_is_missing() -> Result<()> {
    // Only the plural wording exists on this page; `'Consulta de Venta'` is
    // not a substring of `'Consulta de Ventas'` once quoted.
    let driver = menu_page().with_node(MockNode::containing("consulta", "'Consulta de Ventas'"));

    navigate(&driver, &MenuConfig::default(), &TimingConfig::immediate()).await?;
    assert!(driver
        .actions()
        .contains(&Action::Click("consulta".into())));
    Ok(())
}

#[tokio::test]
async fn later_strategy_finds_nested_label() -> Result<()> {
    let driver = MockDriver::new().with_node(MockNode::new("nested", |locator| {
        locator.as_str() == "//span[contains(text(), 'Reportes')]/.."
    }));
    let step = MenuStep::new(vec!["Reportes".into()], MenuAction::Hover);

    let (label, element) = locate_step(&driver, &step, &TimingConfig::immediate()).await?;
    assert_eq!(label, "Reportes");
    assert_eq!(element, "nested");
    Ok(())
}

#[tokio::test]
async fn missing_level_is_a_navigation_error() -> Result<()> {
    let driver = menu_page();

    let err = navigate(&driver, &MenuConfig::default(), &TimingConfig::immediate())
        .await
        .expect_err("leaf is missing");
    let nav = err
        .downcast_ref::<NavigationError>()
        .expect("navigation error");
    assert_eq!(nav.label, "Consulta de Venta");
    assert!(nav.synonyms.contains(&"Consulta de Ventas".to_string()));
    assert!(!driver
        .actions()
        .iter()
        .any(|a| matches!(a, Action::Click(_) | Action::ScriptClick(_))));
    Ok(())
}

#[tokio::test]
async fn failing_native_click_falls_back_to_script() -> Result<()> {
    let driver = menu_page().with_node(
        MockNode::containing("consulta", "'Consulta de Venta'").failing_native_click(),
    );

    navigate(&driver, &MenuConfig::default(), &TimingConfig::immediate()).await?;

    let actions = driver.actions();
    assert_eq!(actions.last(), Some(&Action::ScriptClick("consulta".into())));
    assert!(!actions.contains(&Action::Click("consulta".into())));
    Ok(())
}
