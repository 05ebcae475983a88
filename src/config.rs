use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};
use crate::models::Bank;

/// Default rows per Sheets append call.
pub const DEFAULT_APPEND_CHUNK_SIZE: usize = 400;

fn default_worksheet() -> String {
    "Card Offers".to_string()
}

fn default_log_worksheet() -> String {
    "Log".to_string()
}

fn default_append_chunk_size() -> usize {
    DEFAULT_APPEND_CHUNK_SIZE
}

/// Spreadsheet destination and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// Spreadsheet key from the sheet URL.
    pub spreadsheet_id: Option<String>,

    /// Service-account JSON key. If relative, resolved from the config
    /// file location.
    pub service_account: Option<PathBuf>,

    #[serde(default = "default_worksheet")]
    pub worksheet: String,

    #[serde(default = "default_log_worksheet")]
    pub log_worksheet: String,

    #[serde(default = "default_append_chunk_size")]
    pub append_chunk_size: usize,

    /// Override for the Sheets API root (tests point this at a mock server).
    pub api_base_url: Option<String>,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            service_account: None,
            worksheet: default_worksheet(),
            log_worksheet: default_log_worksheet(),
            append_chunk_size: default_append_chunk_size(),
            api_base_url: None,
        }
    }
}

/// Browser launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Root of the persistent profiles. Each bank/login pair gets
    /// `<profile_dir>/<bank>-<login>`. Relative paths resolve from the
    /// config file location.
    pub profile_dir: Option<PathBuf>,

    /// Explicit Chrome binary. Discovered on PATH when unset.
    pub chrome_executable: Option<PathBuf>,

    /// DevTools websocket (or `http://host:port`) of an already running
    /// Chrome to attach to instead of launching one.
    pub debug_url: Option<String>,

    pub headless: bool,

    /// When false the browser stays open after the run until Ctrl+C.
    pub close_on_exit: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            profile_dir: None,
            chrome_executable: None,
            debug_url: None,
            headless: false,
            close_on_exit: true,
        }
    }
}

/// Pauses and timeouts used while driving a portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub page_load_pause: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub poll_interval: Duration,

    /// How long the scraper waits for the first card.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub ready_timeout: Duration,

    /// How long the session opener waits for the operator to finish login.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub login_wait: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub click_pause: Duration,

    /// How long a click has to show its success indicator.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub verify_timeout: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub back_wait: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub between_offers: Duration,

    /// Upper bound of the random delay added to every pause.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub jitter: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            page_load_pause: Duration::from_millis(600),
            poll_interval: Duration::from_millis(200),
            ready_timeout: Duration::from_secs(15),
            login_wait: Duration::from_secs(7 * 60),
            click_pause: Duration::from_millis(350),
            verify_timeout: Duration::from_secs(3),
            back_wait: Duration::from_millis(250),
            between_offers: Duration::from_millis(250),
            jitter: Duration::from_millis(60),
        }
    }
}

impl TimingConfig {
    /// No pauses at all; waits still poll.
    pub fn immediate() -> Self {
        Self {
            page_load_pause: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            ready_timeout: Duration::from_millis(50),
            login_wait: Duration::from_millis(50),
            click_pause: Duration::ZERO,
            verify_timeout: Duration::from_millis(20),
            back_wait: Duration::ZERO,
            between_offers: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

fn default_login() -> String {
    "default".to_string()
}

/// Per-bank settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Name written to the "Card Holder" column.
    pub holder: String,

    /// Distinguishes browser profiles when one person has several logins.
    #[serde(default = "default_login")]
    pub login: String,

    /// Chase card accounts to visit, in order.
    pub account_ids: Vec<String>,

    /// Reload-and-rescan passes after a pass that enrolled something.
    pub refresh_rounds: Option<u32>,

    /// Card text that marks an offer as local (e.g. a home city).
    pub local_keywords: Vec<String>,

    /// Safety cap on add clicks per scope.
    pub max_clicks: Option<usize>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            holder: String::new(),
            login: default_login(),
            account_ids: Vec::new(),
            refresh_rounds: None,
            local_keywords: Vec::new(),
            max_clicks: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalsConfig {
    pub amex: PortalConfig,
    pub chase: PortalConfig,
    pub citi: PortalConfig,
}

impl PortalsConfig {
    pub fn get(&self, bank: Bank) -> &PortalConfig {
        match bank {
            Bank::Amex => &self.amex,
            Bank::Chase => &self.chase,
            Bank::Citi => &self.citi,
        }
    }

    pub fn get_mut(&mut self, bank: Bank) -> &mut PortalConfig {
        match bank {
            Bank::Amex => &mut self.amex,
            Bank::Chase => &mut self.chase,
            Bank::Citi => &mut self.citi,
        }
    }
}

/// Contents of `offerbook.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sheet: SheetConfig,
    pub browser: BrowserConfig,
    pub timing: TimingConfig,
    pub portals: PortalsConfig,
}

impl Config {
    /// Parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay environment variables on top of file values.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(id) = get("OFFERBOOK_SHEET_ID").or_else(|| get("GOOGLE_SHEET_KEY")) {
            self.sheet.spreadsheet_id = Some(id);
        }
        if let Some(path) = get("GOOGLE_SA_PATH") {
            self.sheet.service_account = Some(PathBuf::from(path));
        }
        if let Some(path) = get("OFFERBOOK_PROFILE_DIR") {
            self.browser.profile_dir = Some(PathBuf::from(path));
        }
        if let Some(path) = get("OFFERBOOK_CHROME") {
            self.browser.chrome_executable = Some(PathBuf::from(path));
        }

        for bank in Bank::ALL {
            let prefix = bank.env_prefix();
            let portal = self.portals.get_mut(bank);
            if let Some(holder) = get(&format!("{prefix}_HOLDER")) {
                portal.holder = holder;
            }
            if let Some(login) = get(&format!("{prefix}_LOGIN")) {
                portal.login = login;
            }
        }

        if let Some(ids) = get("CHASE_ACCOUNT_IDS") {
            self.portals.chase.account_ids = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
}

/// Config with every path made absolute and the environment applied.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Directory the config file lives in (or would live in).
    pub config_dir: PathBuf,

    pub sheet: SheetConfig,

    /// Absolute profile root.
    pub profile_dir: PathBuf,

    pub browser: BrowserConfig,

    pub timing: TimingConfig,

    pub portals: PortalsConfig,
}

/// `./offerbook.toml` when present, otherwise the XDG data directory.
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("offerbook.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("offerbook").join("offerbook.toml");
    }

    local_config
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl ResolvedConfig {
    /// Resolve a parsed config against the directory of its file.
    pub fn resolve(mut config: Config, config_dir: &Path) -> Self {
        config.sheet.service_account = config
            .sheet
            .service_account
            .as_deref()
            .map(|p| resolve_path(config_dir, p));
        config.browser.chrome_executable = config
            .browser
            .chrome_executable
            .as_deref()
            .map(|p| resolve_path(config_dir, p));

        let profile_dir = match config.browser.profile_dir.as_deref() {
            Some(dir) => resolve_path(config_dir, dir),
            None => config_dir.join("profiles"),
        };

        Self {
            config_dir: config_dir.to_path_buf(),
            sheet: config.sheet,
            profile_dir,
            browser: config.browser,
            timing: config.timing,
            portals: config.portals,
        }
    }

    /// Read `config_path` and apply the process environment.
    ///
    /// Relative paths are resolved against the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(config_path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let mut config = Config::load(&config_path)?;
        config.apply_env(lookup);
        Ok(Self::resolve(config, config_dir))
    }

    /// Load config, falling back to defaults (plus environment) when the
    /// file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        Self::load_or_default_with_env(config_path, |key| std::env::var(key).ok())
    }

    pub fn load_or_default_with_env<F>(config_path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if config_path.exists() {
            return Self::load_with_env(config_path, lookup);
        }

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

        let mut config = Config::default();
        config.apply_env(lookup);
        Ok(Self::resolve(config, config_dir))
    }

    pub fn portal(&self, bank: Bank) -> &PortalConfig {
        self.portals.get(bank)
    }

    /// Persistent browser profile for one bank login.
    pub fn profile_path(&self, bank: Bank) -> PathBuf {
        let login = &self.portal(bank).login;
        self.profile_dir.join(format!("{}-{}", bank.as_str(), login))
    }

    pub fn spreadsheet_id(&self) -> Result<&str> {
        self.sheet.spreadsheet_id.as_deref().context(
            "No spreadsheet configured. Set sheet.spreadsheet_id or OFFERBOOK_SHEET_ID",
        )
    }

    pub fn service_account_path(&self) -> Result<&Path> {
        self.sheet.service_account.as_deref().context(
            "No service-account key configured. Set sheet.service_account or GOOGLE_SA_PATH",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sheet.worksheet, "Card Offers");
        assert_eq!(config.sheet.log_worksheet, "Log");
        assert_eq!(config.sheet.append_chunk_size, 400);
        assert!(config.browser.close_on_exit);
        assert!(!config.browser.headless);
        assert_eq!(config.timing.login_wait, Duration::from_secs(420));
        assert_eq!(config.portals.amex.login, "default");
    }

    #[test]
    fn test_load_empty_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("offerbook.toml");
        std::fs::File::create(&config_path)?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.sheet.spreadsheet_id, None);
        assert_eq!(config.sheet.worksheet, "Card Offers");

        Ok(())
    }

    #[test]
    fn test_load_timing_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("offerbook.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[timing]")?;
        writeln!(file, "click_pause = \"250ms\"")?;
        writeln!(file, "ready_timeout = \"15s\"")?;
        writeln!(file, "login_wait = \"7m\"")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.timing.click_pause, Duration::from_millis(250));
        assert_eq!(config.timing.ready_timeout, Duration::from_secs(15));
        assert_eq!(config.timing.login_wait, Duration::from_secs(7 * 60));
        assert_eq!(config.timing.verify_timeout, Duration::from_secs(3));

        Ok(())
    }

    #[test]
    fn test_load_portal_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("offerbook.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[portals.chase]")?;
        writeln!(file, "holder = \"Pat\"")?;
        writeln!(file, "account_ids = [\"111\", \"222\"]")?;
        writeln!(file, "[portals.citi]")?;
        writeln!(file, "local_keywords = [\"philadelphia\"]")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.portals.chase.holder, "Pat");
        assert_eq!(config.portals.chase.account_ids, vec!["111", "222"]);
        assert_eq!(config.portals.chase.login, "default");
        assert_eq!(config.portals.citi.local_keywords, vec!["philadelphia"]);

        Ok(())
    }

    #[test]
    fn test_env_overrides_file_values() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("offerbook.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[sheet]")?;
        writeln!(file, "spreadsheet_id = \"from-file\"")?;
        writeln!(file, "[portals.amex]")?;
        writeln!(file, "holder = \"File Holder\"")?;

        let resolved = ResolvedConfig::load_with_env(
            &config_path,
            env(&[
                ("OFFERBOOK_SHEET_ID", "from-env"),
                ("AMEX_HOLDER", "Env Holder"),
                ("AMEX_LOGIN", "work"),
                ("CHASE_ACCOUNT_IDS", "111, 222,,333"),
            ]),
        )?;

        assert_eq!(resolved.sheet.spreadsheet_id.as_deref(), Some("from-env"));
        assert_eq!(resolved.portal(Bank::Amex).holder, "Env Holder");
        assert_eq!(resolved.portal(Bank::Chase).account_ids, vec!["111", "222", "333"]);
        assert_eq!(
            resolved.profile_path(Bank::Amex),
            resolved.profile_dir.join("amex-work")
        );

        Ok(())
    }

    #[test]
    fn test_google_sheet_key_alias() {
        let mut config = Config::default();
        config.apply_env(env(&[("GOOGLE_SHEET_KEY", "legacy")]));
        assert_eq!(config.sheet.spreadsheet_id.as_deref(), Some("legacy"));

        config.apply_env(env(&[("GOOGLE_SHEET_KEY", "legacy"), ("OFFERBOOK_SHEET_ID", "new")]));
        assert_eq!(config.sheet.spreadsheet_id.as_deref(), Some("new"));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.portals.citi.holder = "Kept".to_string();
        config.apply_env(env(&[("CITI_HOLDER", "   ")]));
        assert_eq!(config.portals.citi.holder, "Kept");
    }

    #[test]
    fn test_resolved_config_resolves_relative_paths() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("offerbook.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[sheet]")?;
        writeln!(file, "service_account = \"keys/sa.json\"")?;
        writeln!(file, "[browser]")?;
        writeln!(file, "profile_dir = \"./chrome\"")?;

        let resolved = ResolvedConfig::load_with_env(&config_path, no_env)?;
        let root = dir.path().canonicalize()?;
        assert_eq!(
            resolved.sheet.service_account,
            Some(root.join("keys/sa.json"))
        );
        assert_eq!(resolved.profile_dir, root.join("./chrome"));

        Ok(())
    }

    #[test]
    fn test_resolved_config_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("offerbook.toml");

        let resolved = ResolvedConfig::load_or_default_with_env(&config_path, no_env)?;
        assert_eq!(resolved.config_dir, dir.path());
        assert_eq!(resolved.profile_dir, dir.path().join("profiles"));
        assert!(resolved.spreadsheet_id().is_err());

        Ok(())
    }
}
