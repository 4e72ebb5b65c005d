use crate::db::DbKind;
use crate::driver::traits::BrowserType;
use crate::error::ConfigError;
use crate::utils::paths::ArtifactPaths;
use anyhow::Result;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment used when `ENV` is unset or names an unknown environment.
pub const DEFAULT_ENV: &str = "pre_staging";

const DEFAULT_REPORT_PATH: &str = "reports/";

/// Base URL and API base URL for a known environment tag.
fn environment_urls(env: &str) -> Option<(&'static str, &'static str)> {
    match env {
        "pre_staging" => Some((
            "https://prestaging.app.dals.co.uk/",
            "https://prestaging.app.dals.co.uk/",
        )),
        "staging" => Some(("https://staging.flipkart.com", "https://staging.flipkart.com")),
        _ => None,
    }
}

/// Database connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub kind: DbKind,
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub ssl_disabled: bool,
}

impl DbSettings {
    /// Names of the settings a connection attempt still lacks.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.kind != DbKind::Sqlite {
            if is_blank(&self.host) {
                missing.push("DB_HOST");
            }
            if self.port == 0 {
                missing.push("DB_PORT");
            }
            if is_blank(&self.user) {
                missing.push("DB_USER");
            }
            if is_blank(&self.password) {
                missing.push("DB_PASS");
            }
        }
        if is_blank(&self.database) {
            missing.push("DB_NAME");
        }
        missing
    }
}

impl std::fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSettings")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &mask(self.password.as_deref()))
            .field("database", &self.database)
            .field("ssl_disabled", &self.ssl_disabled)
            .finish()
    }
}

/// Browser launch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    pub browser_type: BrowserType,
    pub headless: bool,
    pub slow_mo_ms: u64,
    /// Navigation and action timeout (ms)
    pub timeout_ms: u64,
    /// Capture a `{test}_failed` screenshot before the context is released
    pub screenshot_on_failure: bool,
}

/// Default UI credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &mask(self.username.as_deref()))
            .field("password", &mask(self.password.as_deref()))
            .finish()
    }
}

/// Immutable snapshot of everything the run is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    /// Environment tag as given (lowercased), even when unknown
    pub env: String,
    pub base_url: String,
    pub api_base_url: String,
    pub database: DbSettings,
    pub browser: BrowserSettings,
    pub report_path: PathBuf,
    pub credentials: Credentials,
}

impl RunConfiguration {
    /// Resolve configuration from an optional `.env` file and the process
    /// environment, then create the report directories.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("Loaded environment file {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("Ignoring unreadable environment file: {}", e),
        }

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.paths().ensure()?;
        Ok(config)
    }

    /// Resolve configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env = get("ENV")
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_else(|| DEFAULT_ENV.to_string());

        let (base_url, api_base_url) = environment_urls(&env)
            .or_else(|| environment_urls(DEFAULT_ENV))
            .map(|(base, api)| (base.to_string(), api.to_string()))
            .unwrap_or_default();

        let browser = BrowserSettings {
            browser_type: parse_optional(&get, "BROWSER", BrowserType::Chromium)?,
            headless: parse_bool(&get, "HEADLESS")?,
            slow_mo_ms: parse_required(&get, "SLOW_MO")?,
            timeout_ms: parse_required(&get, "PAGE_TIMEOUT")?,
            screenshot_on_failure: parse_optional_bool(&get, "SCREENSHOT_ON_FAILURE", true)?,
        };

        let database = DbSettings {
            kind: parse_optional(&get, "DB_TYPE", DbKind::Postgres)?,
            host: get("DB_HOST"),
            port: parse_required(&get, "DB_PORT")?,
            user: get("DB_USER"),
            password: get("DB_PASS"),
            database: get("DB_NAME"),
            ssl_disabled: parse_optional_bool(&get, "DB_SSL_DISABLED", true)?,
        };

        Ok(Self {
            env,
            base_url,
            api_base_url,
            database,
            browser,
            report_path: get("REPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH)),
            credentials: Credentials {
                username: get("UI_USERNAME"),
                password: get("UI_PASSWORD"),
            },
        })
    }

    pub fn paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.report_path)
    }

    /// Printable configuration block with credentials masked.
    pub fn summary(&self) -> Vec<String> {
        vec![
            "[ENVIRONMENT CONFIGURATION]".to_string(),
            format!("Environment: {}", self.env),
            format!("Base URL: {}", self.base_url),
            format!("API Base URL: {}", self.api_base_url),
            format!("Browser: {}", self.browser.browser_type),
            format!("Headless Mode: {}", self.browser.headless),
            format!(
                "DB Host: {}",
                self.database.host.as_deref().unwrap_or("<not set>")
            ),
            format!("Default Username: {}", mask(self.credentials.username.as_deref())),
            format!("Default Password: {}", mask(self.credentials.password.as_deref())),
            format!("Report Path: {}", self.report_path.display()),
        ]
    }
}

/// Redact a credential for display: `s****t`, `**` for one or two
/// characters, `<not set>` when absent.
pub fn mask(value: Option<&str>) -> String {
    let value = match value {
        Some(v) if !v.is_empty() => v,
        _ => return "<not set>".to_string(),
    };

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 2 {
        return "**".to_string();
    }

    let mut masked = String::with_capacity(value.len());
    masked.push(chars[0]);
    masked.extend(std::iter::repeat('*').take(chars.len() - 2));
    masked.push(chars[chars.len() - 1]);
    masked
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn parse_bool_value(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn parse_bool<G>(get: &G, var: &'static str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(var).ok_or(ConfigError::Missing { var })?;
    parse_bool_value(var, &raw)
}

fn parse_optional_bool<G>(get: &G, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => parse_bool_value(var, &raw),
        None => Ok(default),
    }
}

fn parse_required<G, T>(get: &G, var: &'static str) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get(var).ok_or(ConfigError::Missing { var })?;
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

fn parse_optional<G, T>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(_) => parse_required(get, var),
        None => Ok(default),
    }
}
