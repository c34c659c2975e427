//! Weft configuration system
//!
//! This crate provides centralized configuration management for the transcoder,
//! loading settings from `weft.toml` with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The file is not valid TOML for [`WeftConfig`].
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WeftConfig {
    /// Deterministic pipeline settings
    pub pipeline: PipelineConfig,
    /// Semantic repair service settings
    pub repair: RepairConfig,
}

/// How styles are emitted for the classes referenced by a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StyleScopeMode {
    /// Emit every referenced class.
    #[default]
    Component,
    /// Skip classes already established by a prior token pass.
    Incremental,
}

/// Deterministic pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Prefix used for generated node and style ids. Random when unset.
    pub id_prefix: Option<String>,
    pub style_scope: StyleScopeMode,
    /// Classes a previous token pass already created (incremental scope only)
    pub established_classes: BTreeSet<String>,
    /// Scale `var()` spacing tokens per breakpoint
    pub fluid_spacing: bool,
    /// Add small/tiny column overrides to wide grids
    pub grid_responsive_fix: bool,
    /// Embed size above which a warning is reported
    pub embed_warn_bytes: usize,
    /// Embed size above which an error-severity warning is reported
    pub embed_error_bytes: usize,
}

/// Semantic repair service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub enabled: bool,
    /// Messages endpoint of the repair service
    pub endpoint: String,
    /// Model identifier sent with every request
    pub model: String,
    pub api_key: Option<String>,
    /// Upper bound for a single request, in seconds
    pub timeout_secs: u64,
    pub max_tokens: u32,
    /// Each prompt section (HTML, CSS, graph, diagnostics) is cut to this many characters
    pub max_section_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            id_prefix: None,
            style_scope: StyleScopeMode::Component,
            established_classes: BTreeSet::new(),
            fluid_spacing: true,
            grid_responsive_fix: true,
            embed_warn_bytes: 40 * 1024,
            embed_error_bytes: 50 * 1024,
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_key: None,
            timeout_secs: 45,
            max_tokens: 4096,
            max_section_chars: 24_000,
        }
    }
}

impl RepairConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// True when repair is enabled and credentials are present.
    pub fn is_usable(&self) -> bool {
        self.enabled
            && self
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty())
    }
}

impl WeftConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from `weft.toml` in the current directory,
    /// or return the default configuration if the file doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file("weft.toml").unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    pub fn merge_with_env(&mut self) {
        self.merge_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. `merge_with_env` is this
    /// with the process environment as the source.
    pub fn merge_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Pipeline settings
        if let Some(prefix) = lookup("WEFT_ID_PREFIX") {
            if !prefix.trim().is_empty() {
                self.pipeline.id_prefix = Some(prefix.trim().to_string());
            }
        }
        if let Some(val) = lookup("WEFT_STYLE_SCOPE") {
            match val.trim().to_ascii_lowercase().as_str() {
                "component" => self.pipeline.style_scope = StyleScopeMode::Component,
                "incremental" => self.pipeline.style_scope = StyleScopeMode::Incremental,
                _ => {}
            }
        }
        if let Some(val) = lookup("WEFT_FLUID_SPACING") {
            self.pipeline.fluid_spacing = parse_flag(&val);
        }

        // Repair settings
        if let Some(val) = lookup("WEFT_REPAIR_ENABLED") {
            self.repair.enabled = parse_flag(&val);
        }
        if let Some(endpoint) = lookup("WEFT_REPAIR_ENDPOINT") {
            self.repair.endpoint = endpoint;
        }
        if let Some(model) = lookup("WEFT_REPAIR_MODEL") {
            self.repair.model = model;
        }
        if let Some(val) = lookup("WEFT_REPAIR_TIMEOUT_SECS") {
            if let Ok(secs) = val.trim().parse::<u64>() {
                self.repair.timeout_secs = secs;
            }
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.repair.api_key = Some(key);
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// 1. Load from weft.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}
