use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};

pub const CONFIG_FILE_NAME: &str = "sales-export.toml";

fn default_download_dir() -> PathBuf {
    PathBuf::from("gruposado")
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Global date range split into export windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Window length in days; the last window may be shorter.
    pub window_days: u32,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(2025, 5, 31).unwrap_or(NaiveDate::MAX),
            window_days: 90,
        }
    }
}

/// How the Chrome session is launched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run without a visible window.
    pub headless: bool,

    /// Explicit Chrome/Chromium executable. Discovered on PATH when unset.
    pub chrome_path: Option<PathBuf>,

    /// Extra command line flags appended after the built-in ones.
    pub extra_args: Vec<String>,
}

/// Login form and account context.
///
/// `login_url` and `branch` can be overridden from the environment
/// (`PORTAL_URL`, `PORTAL_BRANCH`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub login_url: String,

    /// Visible text of the account/branch option chosen after login.
    pub branch: String,

    pub username_placeholder: String,
    pub password_placeholder: String,

    /// Text contained in the login submit button.
    pub submit_text: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: "https://10.90.8.11/RcnVentas/Security/Login".to_string(),
            branch: "304 - SUCURSAL IZÚCAR DE MATAMOROS, SADO DE ORIENTE ATLIXCO".to_string(),
            username_placeholder: "Usuario".to_string(),
            password_placeholder: "Password".to_string(),
            submit_text: "Ingresar".to_string(),
        }
    }
}

/// Labels of the three menu levels leading to the report screen.
///
/// The first entry of each list is the primary label; the rest are synonyms
/// tried in order when the primary label is not found.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuConfig {
    pub top: Vec<String>,
    pub submenu: Vec<String>,
    pub leaf: Vec<String>,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            top: strings(&["Reportes", "Reporte", "REPORTES", "Reports"]),
            submenu: strings(&["Ventas", "Venta", "VENTAS", "Sales"]),
            leaf: strings(&[
                "Consulta de Venta",
                "Consulta de Ventas",
                "Consulta Venta",
                "Consulta Ventas",
                "CONSULTA DE VENTA",
            ]),
        }
    }
}

/// Report screen form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportFormConfig {
    pub start_placeholder: String,
    pub start_name: String,
    pub end_placeholder: String,
    pub end_name: String,

    /// Substring of the date-type select's name, id or class.
    pub date_type_hint: String,

    /// Acceptable date-type option labels, in priority order.
    pub date_type_options: Vec<String>,

    pub trigger_text: String,
    pub trigger_class: String,
}

impl Default for ExportFormConfig {
    fn default() -> Self {
        Self {
            start_placeholder: "Fecha Inicial".to_string(),
            start_name: "fechaInicial".to_string(),
            end_placeholder: "Fecha Final".to_string(),
            end_name: "fechaFinal".to_string(),
            date_type_hint: "tipoFecha".to_string(),
            date_type_options: strings(&[
                "Fecha Captura Venta",
                "Fecha Factura Cliente",
                "Captura Venta",
            ]),
            trigger_text: "Exportar".to_string(),
            trigger_class: "exportar".to_string(),
        }
    }
}

/// Fixed waits around UI interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a single locator is polled before it counts as not found.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub locate_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub locate_poll: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub after_login: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub after_branch: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub menu_settle: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub after_scroll: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub after_hover: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub after_navigation: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub after_field: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub after_date_type: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub between_periods: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            locate_timeout: Duration::from_secs(15),
            locate_poll: Duration::from_millis(500),
            after_login: Duration::from_secs(10),
            after_branch: Duration::from_secs(3),
            menu_settle: Duration::from_secs(5),
            after_scroll: Duration::from_secs(1),
            after_hover: Duration::from_secs(3),
            after_navigation: Duration::from_secs(5),
            after_field: Duration::from_secs(1),
            after_date_type: Duration::from_secs(2),
            between_periods: Duration::from_secs(5),
        }
    }
}

impl TimingConfig {
    /// No pauses and a single lookup attempt per locator.
    pub fn immediate() -> Self {
        Self {
            locate_timeout: Duration::ZERO,
            locate_poll: Duration::ZERO,
            after_login: Duration::ZERO,
            after_branch: Duration::ZERO,
            menu_settle: Duration::ZERO,
            after_scroll: Duration::ZERO,
            after_hover: Duration::ZERO,
            after_navigation: Duration::ZERO,
            after_field: Duration::ZERO,
            after_date_type: Duration::ZERO,
            between_periods: Duration::ZERO,
        }
    }
}

/// Download completion detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub poll_interval: Duration,

    /// Suffix the browser gives files that are still being written.
    pub partial_suffix: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(3),
            partial_suffix: ".crdownload".to_string(),
        }
    }
}

/// Merge step settings for all three merge variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Merged downloads are written as `{output_prefix}_{timestamp}.xlsx`.
    pub output_prefix: String,

    /// Column names checked, in order, for a sortable date column.
    pub date_columns: Vec<String>,

    /// File name prefixes for the batch CSV merge.
    pub csv_prefixes: Vec<String>,

    /// Where `{prefix}*.csv` files are read from. Defaults to the working directory.
    pub csv_input_dir: Option<PathBuf>,

    /// Where `{prefix}_merged.csv` files are written. Must already exist.
    pub csv_output_dir: PathBuf,

    /// Output file name for `merge-folder`.
    pub folder_output: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            output_prefix: "Ventas_Combinadas_2021_2025".to_string(),
            date_columns: strings(&[
                "fecha",
                "Fecha",
                "FECHA",
                "fecha_captura",
                "Fecha_Captura",
                "FECHA_CAPTURA",
            ]),
            csv_prefixes: strings(&["acc", "pers", "veh"]),
            csv_input_dir: None,
            csv_output_dir: PathBuf::from("/data/processed"),
            folder_output: "excel_unificado.xlsx".to_string(),
        }
    }
}

/// Application configuration as written in `sales-export.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where downloads land and the merged file is written. If relative,
    /// resolved from the config file location. Defaults to `gruposado`.
    pub download_dir: Option<PathBuf>,

    pub range: RangeConfig,
    pub browser: BrowserSettings,
    pub portal: PortalConfig,
    pub menu: MenuConfig,
    pub export: ExportFormConfig,
    pub timing: TimingConfig,
    pub download: DownloadConfig,
    pub merge: MergeConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the download directory against `config_dir`.
    pub fn resolve_download_dir(&self, config_dir: &Path) -> PathBuf {
        resolve_against(
            config_dir,
            self.download_dir.clone().unwrap_or_else(default_download_dir),
        )
    }

    fn resolve(self, config_dir: &Path) -> ResolvedConfig {
        let download_dir = self.resolve_download_dir(config_dir);
        let mut merge = self.merge;
        merge.csv_output_dir = resolve_against(config_dir, merge.csv_output_dir);
        ResolvedConfig {
            download_dir,
            range: self.range,
            browser: self.browser,
            portal: self.portal,
            menu: self.menu,
            export: self.export,
            timing: self.timing,
            download: self.download,
            merge,
        }
    }
}

fn resolve_against(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub download_dir: PathBuf,
    pub range: RangeConfig,
    pub browser: BrowserSettings,
    pub portal: PortalConfig,
    pub menu: MenuConfig,
    pub export: ExportFormConfig,
    pub timing: TimingConfig,
    pub download: DownloadConfig,
    pub merge: MergeConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./sales-export.toml` if it exists in current directory
/// 2. `~/.local/share/sales-export/sales-export.toml` if it exists
/// 3. `./sales-export.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        let candidate = data_dir.join("sales-export").join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return candidate;
        }
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// Relative paths are resolved against the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(config.resolve(config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// Without a file, relative paths resolve against the directory the file
    /// would have lived in.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            let config_path = if config_path.is_relative() {
                std::env::current_dir()
                    .context("Failed to get current directory")?
                    .join(config_path)
            } else {
                config_path.to_path_buf()
            };

            let config_dir = config_path
                .parent()
                .context("Config path has no parent directory")?;

            Ok(Config::default().resolve(config_dir))
        }
    }

    /// Create the download directory if it is missing.
    pub fn ensure_download_dir(&self) -> Result<&Path> {
        if !self.download_dir.exists() {
            std::fs::create_dir_all(&self.download_dir).with_context(|| {
                format!(
                    "Failed to create download dir: {}",
                    self.download_dir.display()
                )
            })?;
            tracing::info!(dir = %self.download_dir.display(), "Created download directory");
        }
        Ok(&self.download_dir)
    }
}
