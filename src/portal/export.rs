//! Filling the report form and collecting one period's download.

use std::path::Path;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use super::{
    click_with_fallback, input_by_name, input_by_placeholder, pause, wait_for, xpath_literal,
    Locator, PortalDriver,
};
use crate::config::{DownloadConfig, ExportFormConfig, TimingConfig};
use crate::download::{rename_download, DownloadRecord, DownloadWatch};
use crate::period::Period;

/// Settings shared by every period of a run.
#[derive(Debug, Clone, Copy)]
pub struct ExportContext<'a> {
    pub form: &'a ExportFormConfig,
    pub timing: &'a TimingConfig,
    pub download: &'a DownloadConfig,
    pub download_dir: &'a Path,
}

/// Export one period from the report screen.
///
/// Never fails: any problem is recorded in the returned [`DownloadRecord`]
/// so the run can move on to the next period.
pub async fn export_period<D: PortalDriver + ?Sized>(
    driver: &D,
    ctx: &ExportContext<'_>,
    period: &Period,
) -> DownloadRecord {
    match run_export(driver, ctx, period).await {
        Ok(record) => record,
        Err(err) => {
            warn!(period = %period.name, error = %format!("{err:#}"), "Export failed");
            DownloadRecord::failed(period.clone(), format!("{err:#}"))
        }
    }
}

async fn run_export<D: PortalDriver + ?Sized>(
    driver: &D,
    ctx: &ExportContext<'_>,
    period: &Period,
) -> Result<DownloadRecord> {
    info!(
        period = %period.name,
        from = %period.start_label,
        to = %period.end_label,
        "Exporting period"
    );

    fill_date(
        driver,
        ctx,
        &ctx.form.start_placeholder,
        &ctx.form.start_name,
        &period.start_label,
    )
    .await?;
    fill_date(
        driver,
        ctx,
        &ctx.form.end_placeholder,
        &ctx.form.end_name,
        &period.end_label,
    )
    .await?;

    choose_date_type(driver, ctx).await;

    let trigger = Locator::xpath(format!(
        "//button[contains(text(), {}) or contains(@class, {})]",
        xpath_literal(&ctx.form.trigger_text),
        xpath_literal(&ctx.form.trigger_class),
    ));
    let Some(button) = wait_for(
        driver,
        &trigger,
        ctx.timing.locate_timeout,
        ctx.timing.locate_poll,
    )
    .await?
    else {
        bail!("Export button not found");
    };
    driver.scroll_into_view(&button).await?;
    pause(ctx.timing.after_scroll).await;

    let watch = DownloadWatch::start(ctx.download_dir, ctx.download)?;
    let method = click_with_fallback(driver, &button).await?;
    debug!(?method, "Export triggered");

    let Some(downloaded) = watch.wait().await else {
        return Ok(DownloadRecord::failed(
            period.clone(),
            "No download completed before the timeout",
        ));
    };

    let name = rename_download(ctx.download_dir, &downloaded, &period.name);
    Ok(DownloadRecord::saved(
        period.clone(),
        ctx.download_dir.join(name),
    ))
}

/// Type `value` into the date input found by placeholder, else by name.
async fn fill_date<D: PortalDriver + ?Sized>(
    driver: &D,
    ctx: &ExportContext<'_>,
    placeholder: &str,
    name: &str,
    value: &str,
) -> Result<()> {
    let field = match wait_for(
        driver,
        &input_by_placeholder(placeholder),
        ctx.timing.locate_timeout,
        ctx.timing.locate_poll,
    )
    .await?
    {
        Some(field) => field,
        None => match driver.find(&input_by_name(name)).await? {
            Some(field) => field,
            None => bail!("Date field {placeholder:?} not found"),
        },
    };

    driver.clear(&field).await?;
    driver.type_text(&field, value).await?;
    debug!(field = %placeholder, value = %value, "Filled date");
    pause(ctx.timing.after_field).await;
    Ok(())
}

/// Pick the date-type option if the form has one. Best-effort.
async fn choose_date_type<D: PortalDriver + ?Sized>(driver: &D, ctx: &ExportContext<'_>) {
    let hint = xpath_literal(&ctx.form.date_type_hint);
    let locator = Locator::xpath(format!(
        "//select[contains(@name, {hint}) or contains(@id, {hint}) or contains(@class, {hint})]"
    ));

    let select = match driver.find(&locator).await {
        Ok(Some(select)) => select,
        Ok(None) => {
            debug!("No date type selector; keeping the form default");
            return;
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "Date type lookup failed");
            return;
        }
    };

    for option in &ctx.form.date_type_options {
        match driver.select_by_text(&select, option).await {
            Ok(true) => {
                info!(option = %option, "Selected date type");
                pause(ctx.timing.after_date_type).await;
                return;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(option = %option, error = %format!("{err:#}"), "Date type selection failed");
            }
        }
    }

    match driver.select_by_index(&select, 1).await {
        Ok(Some(text)) => {
            info!(option = %text, "Selected first non-placeholder date type");
            pause(ctx.timing.after_date_type).await;
        }
        Ok(None) => warn!("Date type selector has no usable options"),
        Err(err) => warn!(error = %err, "Date type selection failed"),
    }
}
