// src/config.rs

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// BigQuery project ids allow dashes; dataset and table ids do not.
static PROJECT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]{4,61}[a-z0-9]$").unwrap());
static OBJECT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,1023}$").unwrap());

pub const DEFAULT_CONFIG_PATH: &str = "dashboard.yaml";

/// Runtime configuration, read from YAML and then patched by env vars.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    /// Table that receives the full incident table on every update.
    pub destination_table: String,
    /// Service-account key JSON. Falls back to `GOOGLE_APPLICATION_CREDENTIALS`.
    pub credentials_path: Option<PathBuf>,
    pub port: u16,
    pub api_base: String,
    pub token_uri: String,
    pub map: MapConfig,
    pub write_back: WriteBackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    /// Used only when the table holds no coordinates at all.
    pub default_center: [f64; 2],
    pub zoom_start: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WriteBackConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: "sid-dev-452700".to_string(),
            dataset_id: "SanJoseServiceRequest".to_string(),
            table_id: "SJSR".to_string(),
            destination_table: "processed_data".to_string(),
            credentials_path: None,
            port: 8050,
            api_base: "https://bigquery.googleapis.com".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            map: MapConfig::default(),
            write_back: WriteBackConfig::default(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        // downtown San Jose
        Self {
            default_center: [37.3382, -121.8863],
            zoom_start: 12,
        }
    }
}

impl Default for WriteBackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1_000,
            max_polls: 120,
        }
    }
}

impl Config {
    /// Load from the path in `DASHBOARD_CONFIG` (or `dashboard.yaml`), apply
    /// env overrides and validate.
    pub fn from_env() -> Result<Self> {
        let path =
            env::var("DASHBOARD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = Self::load(Path::new(&path))?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a YAML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(project) = env::var("GOOGLE_CLOUD_PROJECT") {
            self.project_id = project;
        }
        if self.credentials_path.is_none() {
            if let Ok(path) = env::var("GOOGLE_APPLICATION_CREDENTIALS") {
                self.credentials_path = Some(PathBuf::from(path));
            }
        }
        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.port = port;
        }
    }

    /// Identifiers end up inside SQL text, so they must be plain names.
    pub fn validate(&self) -> Result<()> {
        if !PROJECT_ID_RE.is_match(&self.project_id) {
            bail!("invalid project id `{}`", self.project_id);
        }
        for (what, id) in [
            ("dataset", &self.dataset_id),
            ("table", &self.table_id),
            ("destination table", &self.destination_table),
        ] {
            if !OBJECT_ID_RE.is_match(id) {
                bail!("invalid {} id `{}`", what, id);
            }
        }
        if self.write_back.max_polls == 0 {
            bail!("write_back.max_polls must be at least 1");
        }
        Ok(())
    }

    /// `<project>.<dataset>.<table>` for the source table.
    pub fn source_table(&self) -> TableRef {
        TableRef {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
            table_id: self.table_id.clone(),
        }
    }

    pub fn destination(&self) -> TableRef {
        TableRef {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
            table_id: self.destination_table.clone(),
        }
    }
}

/// Fully-qualified warehouse table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}
