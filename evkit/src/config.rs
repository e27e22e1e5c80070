use anyhow::{anyhow, Error};
use figment::providers::{Env, Format, Toml};
use figment::value::{Uncased, UncasedStr};
use figment::Figment;
use input::codes::{self, Category};
use input::{CreateOptions, DeviceInfo, DiscoveryConfig};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INPUT_DIR: &str = "/dev/input";

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct VirtualDevice {
    pub name: Option<String>,
    pub phys: Option<String>,
    pub bustype: Option<u16>,
    pub vendor: Option<u16>,
    pub product: Option<u16>,
    pub version: Option<u16>,
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    /// Event type names such as `EV_FF` left out of the merged device.
    pub excluded: Option<Vec<String>>,
    pub max_effects: Option<u32>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Discovery {
    pub attempts: Option<u32>,
    pub interval_ms: Option<u64>,
    pub warmup_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub input_dir: Option<PathBuf>,
    pub virtual_device: Option<VirtualDevice>,
    pub discovery: Option<Discovery>,
}

impl Config {
    /// Reads `path`, then applies `EVKIT_` environment overrides. A missing
    /// file leaves every setting at its default.
    ///
    /// `__` separates sections and `_` stands for `-` within a key, so
    /// `EVKIT_VIRTUAL_DEVICE__MAX_EFFECTS` sets `virtual-device.max-effects`.
    pub fn new(path: &Path) -> Result<Self, figment::Error> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("EVKIT_").split("__").map(kebab_key)),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    pub fn input_dir(&self) -> &Path {
        self.input_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_INPUT_DIR))
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        let defaults = DiscoveryConfig::default();
        let discovery = self.discovery.clone().unwrap_or_default();
        DiscoveryConfig {
            attempts: discovery.attempts.unwrap_or(defaults.attempts),
            interval: discovery
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            warmup: discovery
                .warmup_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.warmup),
            input_dir: self.input_dir().to_owned(),
            ..defaults
        }
    }

    pub fn virtual_device(&self) -> VirtualDevice {
        self.virtual_device.clone().unwrap_or_default()
    }

    pub fn create_options(&self) -> CreateOptions {
        let device = self.virtual_device();
        let defaults = CreateOptions::default();
        let info = DeviceInfo {
            bustype: device.bustype.unwrap_or(defaults.info.bustype),
            vendor: device.vendor.unwrap_or(defaults.info.vendor),
            product: device.product.unwrap_or(defaults.info.product),
            version: device.version.unwrap_or(defaults.info.version),
        };

        CreateOptions {
            name: device.name.unwrap_or_else(|| defaults.name.clone()),
            phys: device.phys.unwrap_or_else(|| defaults.phys.clone()),
            info,
            max_effects: device.max_effects.unwrap_or(defaults.max_effects),
            discovery: self.discovery_config(),
            ..defaults
        }
    }

    /// The excluded event types, resolved to their codes.
    pub fn excluded(&self) -> Result<BTreeSet<u16>, Error> {
        match self.virtual_device().excluded {
            None => Ok(input::capabilities::DEFAULT_EXCLUDED.into_iter().collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    codes::registry()
                        .code(Category::EventType, name)
                        .ok_or_else(|| anyhow!("Unknown event type {} in excluded", name))
                })
                .collect(),
        }
    }
}

fn kebab_key(key: &UncasedStr) -> Uncased<'_> {
    key.as_str().replace('_', "-").into()
}
