use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::identity::is_valid_address;
use crate::types::TrackedEntity;
use crate::{EXPLORER_API_BASE, OPENSEA_STREAM_URL};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

pub const SIGNER_UUID_VAR: &str = "SIGNER_UUID";
pub const NEYNAR_API_KEY_VAR: &str = "NEYNAR_API_KEY";
pub const STREAM_TOKEN_VAR: &str = "OS_STREAM_TOKEN";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub poller: Option<PollerConfig>,
    #[serde(default)]
    pub stream: Option<StreamConfig>,
}

/// Runtime settings shared by both pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Seconds between explorer polls for each contract.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Directory holding one watermark file per contract.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Currency suffix for explorer-detected sales.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_currency() -> String {
    "eth".to_string()
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            state_dir: default_state_dir(),
            currency: default_currency(),
        }
    }
}

/// Explorer polling pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_explorer_base")]
    pub explorer_api_base: String,
    #[serde(default = "default_sale_frame")]
    pub frame_base_url: String,
    /// Collection label used in the cast text, e.g. `hpunk #12`.
    #[serde(default = "default_poller_label")]
    pub label: String,
    pub contracts: Vec<ContractConfig>,
}

fn default_explorer_base() -> String {
    EXPLORER_API_BASE.to_string()
}

fn default_sale_frame() -> String {
    "https://hpunksframe.vercel.app/api/sale".to_string()
}

fn default_poller_label() -> String {
    "hpunk".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub address: String,
    pub name: String,
    /// Channel the casts for this contract are posted to.
    #[serde(default)]
    pub channel: Option<String>,
}

impl ContractConfig {
    pub fn entity(&self) -> TrackedEntity {
        TrackedEntity {
            id: self.address.clone(),
            name: self.name.clone(),
            channel: self.channel.clone(),
        }
    }
}

/// Marketplace stream pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub collection_slug: String,
    pub contract_address: String,
    pub label: String,
    pub frame_base_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
    #[serde(default)]
    pub channel: Option<String>,
}

fn default_stream_url() -> String {
    OPENSEA_STREAM_URL.to_string()
}

fn default_heartbeat() -> u64 {
    30
}

impl StreamConfig {
    pub fn entity(&self) -> TrackedEntity {
        TrackedEntity {
            id: self.collection_slug.clone(),
            name: self.label.clone(),
            channel: self.channel.clone(),
        }
    }
}

impl AppConfig {
    /// Load and validate config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.settings.poll_interval_secs == 0 {
            bail!("settings.poll_interval_secs must be positive");
        }
        if let Some(poller) = &self.poller {
            if poller.contracts.is_empty() {
                bail!("poller.contracts is empty");
            }
            let mut names = HashSet::new();
            for contract in &poller.contracts {
                if contract.name.trim().is_empty() {
                    bail!("contract {} has an empty name", contract.address);
                }
                if !names.insert(contract.name.as_str()) {
                    bail!("duplicate contract name {:?}", contract.name);
                }
                if !is_valid_address(&contract.address) {
                    bail!("contract {:?} has invalid address {}", contract.name, contract.address);
                }
            }
        }
        if let Some(stream) = &self.stream {
            if stream.collection_slug.trim().is_empty() {
                bail!("stream.collection_slug is empty");
            }
            if !is_valid_address(&stream.contract_address) {
                bail!("stream.contract_address is invalid: {}", stream.contract_address);
            }
            url::Url::parse(&stream.frame_base_url).context("stream.frame_base_url")?;
            url::Url::parse(&stream.stream_url).context("stream.stream_url")?;
            if stream.heartbeat_secs == 0 {
                bail!("stream.heartbeat_secs must be positive");
            }
        }
        Ok(())
    }
}

/// Credentials read from the environment (a `.env` file is honoured).
#[derive(Clone)]
pub struct Secrets {
    pub signer_uuid: String,
    pub neynar_api_key: String,
    pub stream_token: Option<String>,
}

impl Secrets {
    /// Read the posting credentials, plus the stream token when `need_stream`.
    /// Any missing value is a startup error.
    pub fn from_env(need_stream: bool) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(need_stream, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(need_stream: bool, get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{key} is not defined"))
        };
        Ok(Self {
            signer_uuid: required(SIGNER_UUID_VAR)?,
            neynar_api_key: required(NEYNAR_API_KEY_VAR)?,
            stream_token: if need_stream {
                Some(required(STREAM_TOKEN_VAR)?)
            } else {
                None
            },
        })
    }
}
