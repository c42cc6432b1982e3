use crate::error::AppError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "costboard";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("COSTBOARD_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "costboard", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".costboard"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub currency_symbol: String,
    pub default_window_days: i64,
    pub identity: IdentitySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub authority_host: String,
    pub tenant_id: String,
    pub client_id: String,
    /// API scopes to request. Empty means `api://{client_id}/access_as_user`.
    pub scopes: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            currency_symbol: "₹".into(),
            default_window_days: 30,
            identity: IdentitySettings::default(),
        }
    }
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.into(),
            tenant_id: "organizations".into(),
            client_id: String::new(),
            scopes: vec![],
        }
    }
}

impl IdentitySettings {
    pub fn api_scopes(&self) -> Vec<String> {
        if self.scopes.is_empty() && !self.client_id.is_empty() {
            return vec![format!("api://{}/access_as_user", self.client_id)];
        }
        self.scopes.clone()
    }

    pub fn endpoint(&self, leaf: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{}",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id,
            leaf
        )
    }

    pub fn cache_key(&self) -> String {
        format!("account:{}:{}", self.tenant_id, self.client_id)
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("data"))
}

pub fn log_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("logs"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn db_path() -> Result<PathBuf, AppError> {
    Ok(data_dir()?.join("costs.sqlite"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(data_dir()?)?;
    fs::create_dir_all(log_dir()?)?;
    Ok(())
}

fn normalize_config(config: &mut AppConfig) -> bool {
    let mut changed = false;

    let base = config.api_base_url.trim().trim_end_matches('/').to_string();
    if base != config.api_base_url {
        config.api_base_url = base;
        changed = true;
    }

    let mut scopes = Vec::new();
    for scope in &config.identity.scopes {
        let trimmed = scope.trim().to_string();
        if trimmed != *scope {
            changed = true;
        }
        if trimmed.is_empty() || scopes.iter().any(|s: &String| s == &trimmed) {
            changed = true;
            continue;
        }
        scopes.push(trimmed);
    }
    config.identity.scopes = scopes;

    if config.default_window_days <= 0 {
        config.default_window_days = 30;
        changed = true;
    }

    changed
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var("COSTBOARD_API_URL") {
        if !url.is_empty() {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
    }
    if let Ok(client_id) = std::env::var("COSTBOARD_CLIENT_ID") {
        if !client_id.is_empty() {
            config.identity.client_id = client_id;
        }
    }
    if let Ok(tenant_id) = std::env::var("COSTBOARD_TENANT_ID") {
        if !tenant_id.is_empty() {
            config.identity.tenant_id = tenant_id;
        }
    }
}

pub fn load_config() -> Result<AppConfig, AppError> {
    let path = config_path()?;
    let mut parsed = if path.exists() {
        let raw = fs::read_to_string(&path)?;
        let mut parsed: AppConfig = toml::from_str(&raw)?;
        if normalize_config(&mut parsed) {
            save_config(&parsed)?;
        }
        parsed
    } else {
        AppConfig::default()
    };

    // Overrides are never written back to disk.
    apply_env_overrides(&mut parsed);
    Ok(parsed)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}
