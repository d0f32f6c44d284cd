//! Connection configuration
//!
//! Named connection profiles are kept in `~/.config/sql-dal/config.json`.
//! Settings not taken from a profile come from `DB_*` environment variables,
//! with a `.env` file in the working directory loaded first.

use crate::db::sqlserver::SqlServerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A saved SQL Server connection
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConnectionProfile {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default = "default_trust_cert")]
    pub trust_cert: bool,
}

fn default_trust_cert() -> bool {
    true
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: 1433,
            user: String::new(),
            password: String::new(),
            database: "master".to_string(),
            encrypt: false,
            trust_cert: true,
        }
    }
}

impl ConnectionProfile {
    /// Check if all required fields are filled
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.host.trim().is_empty()
            && self.port > 0
            && !self.user.trim().is_empty()
            && !self.database.trim().is_empty()
    }

    pub fn to_sql_server_config(&self) -> SqlServerConfig {
        SqlServerConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            encrypt: self.encrypt,
            trust_cert: self.trust_cert,
        }
    }
}

/// All saved profiles
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct ProfileStore {
    pub profiles: Vec<ConnectionProfile>,
    /// Profile used when none is named
    #[serde(default)]
    pub default_profile: Option<String>,
}

impl ProfileStore {
    /// Get the config file path (~/.config/sql-dal/config.json)
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("sql-dal");

        Ok(config_dir.join("config.json"))
    }

    /// Load the store from the default location. A missing file is an empty store.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Add or update a profile (updates if name already exists)
    pub fn upsert(&mut self, profile: ConnectionProfile) {
        if let Some(existing) = self.profiles.iter_mut().find(|p| p.name == profile.name) {
            *existing = profile;
        } else {
            self.profiles.push(profile);
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.profiles.retain(|p| p.name != name);

        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The named profile, or the default one when `name` is `None`
    pub fn resolve(&self, name: Option<&str>) -> Option<&ConnectionProfile> {
        match name {
            Some(name) => self.get(name),
            None => self.default_profile.as_deref().and_then(|n| self.get(n)),
        }
    }
}

impl SqlServerConfig {
    /// Defaults overridden by `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`,
    /// `DB_DATABASE`, `DB_ENCRYPT` and `DB_TRUST_CERT`
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("DB_HOST").unwrap_or(defaults.host),
            port: lookup("DB_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            user: lookup("DB_USER").unwrap_or(defaults.user),
            password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
            database: lookup("DB_DATABASE").unwrap_or(defaults.database),
            encrypt: lookup("DB_ENCRYPT")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.encrypt),
            trust_cert: lookup("DB_TRUST_CERT")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.trust_cert),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
