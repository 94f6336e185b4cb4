// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for SceneForge
//!
//! Handles loading and saving settings from ~/.sceneforge/settings.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Main settings structure, stored in ~/.sceneforge/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// LLM provider configurations
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Response pipeline tunables
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Retry and resilience settings for API calls
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

/// Configuration for LLM providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Default provider to route turns through
    #[serde(default = "default_provider")]
    pub default: String,

    /// Anthropic Claude configuration
    #[serde(default)]
    pub anthropic: ProviderConfig,

    /// OpenRouter configuration
    #[serde(default)]
    pub openrouter: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default: default_provider(),
            anthropic: ProviderConfig::default(),
            openrouter: ProviderConfig::default(),
        }
    }
}

/// Connection settings for a single provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Default model to use
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Base URL for API (for custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            default_model: default_model(),
            base_url: None,
        }
    }
}

/// Tunables for response validation and stream handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum acceptable response length in characters
    #[serde(default = "default_min_response_length")]
    pub min_response_length: usize,

    /// Seconds without a stream fragment before the attempt is abandoned
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_response_length: default_min_response_length(),
            stall_timeout_secs: default_stall_timeout_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

/// Retry settings for model calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Maximum number of retry attempts per turn
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in seconds (linearly increased across attempts)
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_min_response_length() -> usize {
    100
}

fn default_stall_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    1
}

fn default_base_delay_secs() -> u64 {
    2
}

impl Settings {
    /// Get the SceneForge home directory (~/.sceneforge).
    pub fn forge_home() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sceneforge")
    }

    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::forge_home().join("settings.json")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the API key for a provider config, preferring the environment.
    pub fn resolve_api_key(provider: &ProviderConfig) -> Option<String> {
        if let Some(env_name) = &provider.api_key_env {
            if let Ok(key) = std::env::var(env_name) {
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }
        provider.api_key.clone()
    }
}
