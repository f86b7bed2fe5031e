//! Login and account-context selection.

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use super::{input_by_placeholder, pause, wait_for, xpath_literal, Locator, PortalDriver};
use crate::config::{PortalConfig, TimingConfig};
use crate::credentials::PortalAccess;

/// Open the login page, fill in the credentials and submit.
///
/// Fails when the login form cannot be found; nothing else can run without a
/// session.
pub async fn login<D: PortalDriver + ?Sized>(
    driver: &D,
    access: &PortalAccess,
    portal: &PortalConfig,
    timing: &TimingConfig,
) -> Result<()> {
    info!(url = %access.login_url, "Opening login page");
    driver
        .goto(&access.login_url)
        .await
        .with_context(|| format!("Failed to open login page {}", access.login_url))?;

    let username_field = wait_for(
        driver,
        &input_by_placeholder(&portal.username_placeholder),
        timing.locate_timeout,
        timing.locate_poll,
    )
    .await?
    .with_context(|| {
        format!(
            "Login field with placeholder {:?} not found",
            portal.username_placeholder
        )
    })?;
    let password_field = driver
        .find(&input_by_placeholder(&portal.password_placeholder))
        .await?
        .with_context(|| {
            format!(
                "Password field with placeholder {:?} not found",
                portal.password_placeholder
            )
        })?;

    driver.clear(&username_field).await?;
    driver.type_text(&username_field, &access.username).await?;
    driver.clear(&password_field).await?;
    driver
        .type_text(&password_field, access.password.expose_secret())
        .await?;

    let submit = Locator::xpath(format!(
        "//button[contains(text(), {})]",
        xpath_literal(&portal.submit_text)
    ));
    let submit = driver
        .find(&submit)
        .await?
        .with_context(|| format!("Login button containing {:?} not found", portal.submit_text))?;
    driver
        .click(&submit)
        .await
        .context("Failed to submit login form")?;

    info!("Login submitted; waiting for the portal to load");
    pause(timing.after_login).await;
    Ok(())
}

/// Choose the account/branch context from the post-login selector.
///
/// Best-effort: the portal may already default to the right context, so a
/// failure is logged and reported as `false`.
pub async fn select_branch<D: PortalDriver + ?Sized>(
    driver: &D,
    branch: &str,
    timing: &TimingConfig,
) -> bool {
    match try_select_branch(driver, branch, timing).await {
        Ok(()) => {
            info!(branch = %branch, "Selected branch");
            pause(timing.after_branch).await;
            true
        }
        Err(err) => {
            warn!(branch = %branch, error = %err, "Could not select branch; continuing with the default");
            false
        }
    }
}

async fn try_select_branch<D: PortalDriver + ?Sized>(
    driver: &D,
    branch: &str,
    timing: &TimingConfig,
) -> Result<()> {
    let select = wait_for(
        driver,
        &Locator::xpath("//select"),
        timing.locate_timeout,
        timing.locate_poll,
    )
    .await?
    .context("No branch selector on the page")?;

    if !driver.select_by_text(&select, branch).await? {
        anyhow::bail!("Branch option {branch:?} not found");
    }
    Ok(())
}
