use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "admin.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend_url: String,
    pub admin_key: Option<String>,
    pub request_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub restart_settle_secs: u64,
    pub log_limit: u32,
    pub download_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000/api".into(),
            admin_key: None,
            request_timeout_secs: 30,
            refresh_interval_secs: 10,
            restart_settle_secs: 10,
            log_limit: 50,
            download_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_secs(self.restart_settle_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = Url::parse(self.backend_url.trim())
            .with_context(|| format!("backend url '{}' is not a valid url", self.backend_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(
                "backend url '{}' must use http or https, not '{}'",
                self.backend_url,
                url.scheme()
            );
        }
        if self.log_limit == 0 {
            bail!("log_limit must be at least 1");
        }
        Ok(())
    }
}

/// Keys accepted in `admin.toml`. Everything is optional; missing keys keep
/// their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    backend_url: Option<String>,
    admin_key: Option<String>,
    request_timeout_secs: Option<u64>,
    refresh_interval_secs: Option<u64>,
    restart_settle_secs: Option<u64>,
    log_limit: Option<u32>,
    download_dir: Option<PathBuf>,
}

pub fn load_settings(explicit_path: Option<&Path>) -> anyhow::Result<Settings> {
    load_settings_with(explicit_path, |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file, then environment overrides. An explicitly
/// requested file must exist; the default `admin.toml` may be absent.
pub fn load_settings_with(
    explicit_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let file_cfg = match explicit_path {
        Some(path) => Some(read_file(path)?),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                Some(read_file(path)?)
            } else {
                None
            }
        }
    };
    if let Some(file_cfg) = file_cfg {
        apply_file(&mut settings, file_cfg);
    }

    apply_env(&mut settings, &env)?;
    Ok(settings)
}

fn read_file(path: &Path) -> anyhow::Result<FileSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file '{}'", path.display()))
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = file_cfg.admin_key {
        settings.admin_key = Some(v);
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.refresh_interval_secs {
        settings.refresh_interval_secs = v;
    }
    if let Some(v) = file_cfg.restart_settle_secs {
        settings.restart_settle_secs = v;
    }
    if let Some(v) = file_cfg.log_limit {
        settings.log_limit = v;
    }
    if let Some(v) = file_cfg.download_dir {
        settings.download_dir = v;
    }
}

fn apply_env(settings: &mut Settings, env: &impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
    if let Some(v) = env("BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Some(v) = env("ADMIN_KEY") {
        settings.admin_key = Some(v);
    }
    if let Some(v) = env("APP__ADMIN_KEY") {
        settings.admin_key = Some(v);
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = parse_env("APP__REQUEST_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = env("APP__REFRESH_INTERVAL_SECS") {
        settings.refresh_interval_secs = parse_env("APP__REFRESH_INTERVAL_SECS", &v)?;
    }
    if let Some(v) = env("APP__RESTART_SETTLE_SECS") {
        settings.restart_settle_secs = parse_env("APP__RESTART_SETTLE_SECS", &v)?;
    }
    if let Some(v) = env("APP__LOG_LIMIT") {
        settings.log_limit = parse_env("APP__LOG_LIMIT", &v)?;
    }
    if let Some(v) = env("APP__DOWNLOAD_DIR") {
        settings.download_dir = PathBuf::from(v);
    }

    Ok(())
}

fn parse_env<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key}='{raw}' is not a valid number"))
}
