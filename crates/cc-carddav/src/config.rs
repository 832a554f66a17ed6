//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `cc-carddav.toml` in the working directory
//! 3. Defaults
//!
//! `${VAR_NAME}` references inside the TOML file are expanded from the
//! environment before parsing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CardDavError, Result};
use crate::models::Account;

const CONFIG_FILE_NAME: &str = "cc-carddav.toml";

/// Default bound on concurrent supported-report lookups during discovery
pub const DEFAULT_REPORT_CONCURRENCY: usize = 8;

/// CardDAV client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDavConfig {
    /// Server URL
    pub server_url: String,
    /// Username for HTTP basic auth; empty means anonymous
    #[serde(default)]
    pub username: String,
    /// Password for HTTP basic auth
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Address book home set, as found by account bootstrap
    #[serde(default)]
    pub home_url: Option<String>,
    /// Base for resolving server hrefs
    #[serde(default)]
    pub root_url: Option<String>,
    /// Client-wide request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Concurrent supported-report lookups during discovery
    #[serde(default = "default_report_concurrency")]
    pub report_concurrency: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_report_concurrency() -> usize {
    DEFAULT_REPORT_CONCURRENCY
}

impl CardDavConfig {
    /// Create a new config with default timeouts
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password: Some(password).filter(|p| !p.is_empty()),
            home_url: None,
            root_url: None,
            timeout_secs: default_timeout_secs(),
            report_concurrency: default_report_concurrency(),
        }
    }

    /// Set the address book home set and href base
    pub fn with_account_urls(mut self, home_url: impl Into<String>, root_url: impl Into<String>) -> Self {
        self.home_url = Some(home_url.into());
        self.root_url = Some(root_url.into());
        self
    }

    /// Account view of the configured URLs
    pub fn account(&self) -> Account {
        Account {
            home_url: self.home_url.clone(),
            root_url: self.root_url.clone(),
        }
    }

    /// Replace `${VAR_NAME}` with the variable's value; unset variables
    /// expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file
    ///
    /// The file must contain a `[carddav]` table. Environment variables take
    /// precedence over values in the file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| CardDavError::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn from_toml_str(content: &str) -> Result<Self> {
        let expanded_content = Self::expand_env_vars(content);

        let toml: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| CardDavError::Config(format!("Failed to parse TOML: {}", e)))?;

        let carddav = toml
            .carddav
            .ok_or_else(|| CardDavError::Config("missing [carddav] table".to_string()))?;

        let server_url = carddav
            .server_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| CardDavError::Config("carddav.server_url is required".to_string()))?;

        Ok(Self {
            server_url,
            username: carddav.username.unwrap_or_default(),
            password: carddav.password.filter(|p| !p.is_empty()),
            home_url: carddav.home_url,
            root_url: carddav.root_url,
            timeout_secs: carddav.timeout_secs.unwrap_or_else(default_timeout_secs),
            report_concurrency: carddav
                .report_concurrency
                .unwrap_or_else(default_report_concurrency),
        })
    }

    /// Load from `./cc-carddav.toml` if present, otherwise from the environment
    pub fn load() -> Result<Self> {
        if Path::new(CONFIG_FILE_NAME).exists() {
            return Self::from_toml_file(CONFIG_FILE_NAME);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let server_url = std::env::var("CARDDAV_SERVER_URL")
            .map_err(|_| CardDavError::Config("CARDDAV_SERVER_URL not set".to_string()))?;

        let mut cfg = Self::new(server_url, "", "");
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CARDDAV_SERVER_URL") {
            if !url.is_empty() {
                self.server_url = url;
            }
        }
        if let Ok(username) = std::env::var("CARDDAV_USERNAME") {
            self.username = username;
        }
        if let Ok(password) = std::env::var("CARDDAV_PASSWORD") {
            self.password = Some(password).filter(|p| !p.is_empty());
        }
        if let Ok(url) = std::env::var("CARDDAV_HOME_URL") {
            self.home_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(url) = std::env::var("CARDDAV_ROOT_URL") {
            self.root_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(timeout) = std::env::var("CARDDAV_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                self.timeout_secs = t;
            }
        }
        if let Ok(limit) = std::env::var("CARDDAV_REPORT_CONCURRENCY") {
            if let Ok(n) = limit.parse() {
                self.report_concurrency = n;
            }
        }
    }
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    carddav: Option<TomlCardDavConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlCardDavConfig {
    #[serde(default)]
    server_url: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    home_url: Option<String>,
    #[serde(default)]
    root_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    report_concurrency: Option<usize>,
}
