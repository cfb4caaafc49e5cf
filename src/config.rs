//! Configuration management for the Meson relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::{MesonError, MesonResult};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub relayer: RelayerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    /// Quorum definitions keyed by network id
    #[serde(default)]
    pub networks: HashMap<String, QuorumConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    pub instance_id: String,
    /// Selects testnet presets and the testnet signing domain
    #[serde(default)]
    pub testnet: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Revert reasons that are contract rejections rather than node faults
    #[serde(default)]
    pub business_reverts: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_timeout_ms(),
            send_timeout_ms: default_timeout_ms(),
            business_reverts: Vec::new(),
        }
    }
}

impl ProviderConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignerConfig {
    /// Environment variable holding a hex private key
    pub private_key_env: Option<String>,
    /// JSON-RPC endpoint of an external signer
    pub remote_url: Option<String>,
    /// Account to sign with on the remote signer; the first account otherwise
    pub remote_account: Option<String>,
}

/// Weighted endpoint group for one network
#[derive(Debug, Clone, Deserialize)]
pub struct QuorumConfig {
    pub list: Vec<EndpointConfig>,
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub url: Option<String>,
    pub ws: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_stall_timeout_ms", alias = "stallTimeout")]
    pub stall_timeout_ms: u64,
}

/// Transport an endpoint connects with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport<'a> {
    Http(&'a str),
    Ws(&'a str),
}

impl EndpointConfig {
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ws: None,
            priority: default_priority(),
            weight: default_weight(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }

    /// Exactly one of `url` and `ws` must be set
    pub fn transport(&self) -> MesonResult<Transport<'_>> {
        match (self.url.as_deref(), self.ws.as_deref()) {
            (Some(url), None) => Ok(Transport::Http(url)),
            (None, Some(ws)) => Ok(Transport::Ws(ws)),
            (Some(_), Some(_)) => Err(MesonError::Config(
                "endpoint sets both url and ws".to_string(),
            )),
            (None, None) => Err(MesonError::Config(
                "endpoint sets neither url nor ws".to_string(),
            )),
        }
    }

    pub fn display_url(&self) -> &str {
        self.url
            .as_deref()
            .or(self.ws.as_deref())
            .unwrap_or("<unset>")
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

impl QuorumConfig {
    /// Single-endpoint group
    pub fn single(url: impl Into<String>) -> Self {
        Self {
            list: vec![EndpointConfig::http(url)],
            threshold: 1,
        }
    }

    /// Check the group shape before any endpoint is contacted
    pub fn validate(&self) -> MesonResult<()> {
        if self.list.is_empty() {
            return Err(MesonError::Config("quorum list is empty".to_string()));
        }
        for endpoint in &self.list {
            endpoint.transport()?;
            if endpoint.weight == 0 {
                return Err(MesonError::Config(format!(
                    "endpoint {} has zero weight",
                    endpoint.display_url()
                )));
            }
        }
        let total_weight: u32 = self.list.iter().map(|e| e.weight).sum();
        if self.threshold == 0 || self.threshold > total_weight {
            return Err(MesonError::Config(format!(
                "threshold {} outside 1..={}",
                self.threshold, total_weight
            )));
        }
        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_threshold() -> u32 {
    1
}

fn default_priority() -> u32 {
    1
}

fn default_weight() -> u32 {
    1
}

fn default_stall_timeout_ms() -> u64 {
    2_000
}

impl Settings {
    /// Load settings from the file named by `MESON_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("MESON_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::from_path(&config_path)
    }

    pub fn from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        config_str.parse()
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.relayer.instance_id.is_empty() {
            anyhow::bail!("relayer.instance_id must not be empty");
        }

        for (name, quorum) in &self.networks {
            quorum
                .validate()
                .with_context(|| format!("Invalid quorum for network {}", name))?;
        }

        if self.signer.private_key_env.is_some() && self.signer.remote_url.is_some() {
            anyhow::bail!("signer sets both private_key_env and remote_url");
        }

        Ok(())
    }

    /// Quorum for a network id
    pub fn network(&self, id: &str) -> Option<&QuorumConfig> {
        self.networks.get(id)
    }
}

impl std::str::FromStr for Settings {
    type Err = anyhow::Error;

    fn from_str(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
