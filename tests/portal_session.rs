use anyhow::Result;
use sales_export::config::{PortalConfig, TimingConfig};
use sales_export::credentials::PortalAccess;
use sales_export::portal::{login, select_branch, Locator};
use secrecy::SecretString;

mod support;
use support::{Action, MockDriver, MockNode};

fn access() -> PortalAccess {
    PortalAccess {
        username: "jdoe".to_string(),
        password: SecretString::from("hunter2".to_string()),
        login_url: "https://portal.test/Security/Login".to_string(),
        branch: "307 - SADO DE ORIENTE".to_string(),
    }
}

fn login_page() -> MockDriver {
    MockDriver::new()
        .with_node(MockNode::containing("username", "@placeholder='Usuario'"))
        .with_node(MockNode::containing("password", "@placeholder='Password'"))
        .with_node(MockNode::containing("login", "contains(text(), 'Ingresar')"))
}

#[tokio::test]
async fn login_types_credentials_and_submits() -> Result<()> {
    let driver = login_page();

    login(
        &driver,
        &access(),
        &PortalConfig::default(),
        &TimingConfig::immediate(),
    )
    .await?;

    assert_eq!(driver.value("username").as_deref(), Some("jdoe"));
    assert_eq!(driver.value("password").as_deref(), Some("hunter2"));
    let actions = driver.actions();
    assert_eq!(
        actions.first(),
        Some(&Action::Goto("https://portal.test/Security/Login".into()))
    );
    assert_eq!(actions.last(), Some(&Action::Click("login".into())));
    Ok(())
}

#[tokio::test]
async fn login_without_form_is_fatal() {
    let driver = MockDriver::new();

    let err = login(
        &driver,
        &access(),
        &PortalConfig::default(),
        &TimingConfig::immediate(),
    )
    .await
    .expect_err("no login form");
    assert!(err.to_string().contains("Usuario"), "{err}");
}

#[tokio::test]
async fn branch_is_selected_by_visible_text() {
    let driver = MockDriver::new().with_node(
        MockNode::exactly("branch", Locator::xpath("//select"))
            .with_options(&["Seleccione", "307 - SADO DE ORIENTE"]),
    );

    assert!(select_branch(&driver, "307 - SADO DE ORIENTE", &TimingConfig::immediate()).await);
    assert_eq!(
        driver.actions(),
        vec![Action::Select("branch".into(), "307 - SADO DE ORIENTE".into())]
    );
}

#[tokio::test]
async fn missing_branch_is_not_fatal() {
    let no_selector = MockDriver::new();
    assert!(!select_branch(&no_selector, "307", &TimingConfig::immediate()).await);

    let other_options = MockDriver::new().with_node(
        MockNode::exactly("branch", Locator::xpath("//select")).with_options(&["100 - CENTRO"]),
    );
    assert!(!select_branch(&other_options, "307", &TimingConfig::immediate()).await);
    assert!(other_options.actions().is_empty());
}
