//! Composition root: builds devices from configuration, maps them on a [`SystemBus`] and
//! describes them for a platform device tree.

use crate::bus::SystemBus;
use crate::device::{MmioDevice, PtrauthDevice};
use crate::registers::{RegisterOffset, CHIP_ID, MMIO_WINDOW_SIZE, PRIVATE_WINDOW_SIZE};
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

pub const QARMA_TYPE: &str = "qarma";
pub const QARMA_COMPATIBLE: &str = "daem,PtrauthDevice-1.0";
pub const DEFAULT_BASE: u64 = 0x0B00_0000;

#[derive(Deserialize)]
#[serde(untagged)]
enum AddrSerde {
    Int(u64),
    Text(String),
}

impl AddrSerde {
    fn into_u64<E: serde::de::Error>(self) -> std::result::Result<u64, E> {
        match self {
            AddrSerde::Int(value) => Ok(value),
            AddrSerde::Text(raw) => parse_u64(&raw).map_err(E::custom),
        }
    }
}

/// Accepts decimal, `0x` hex, and `_` digit separators.
pub fn parse_u64(raw: &str) -> std::result::Result<u64, String> {
    let cleaned = raw.trim().replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse::<u64>(),
    };
    parsed.map_err(|err| format!("invalid number {raw:?}: {err}"))
}

fn deserialize_addr<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    AddrSerde::deserialize(deserializer)?.into_u64()
}

pub(crate) fn deserialize_opt_addr<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<AddrSerde>::deserialize(deserializer)?
        .map(AddrSerde::into_u64)
        .transpose()
}

fn default_type() -> String {
    QARMA_TYPE.to_string()
}

fn default_name() -> String {
    QARMA_TYPE.to_string()
}

fn default_base() -> u64 {
    DEFAULT_BASE
}

fn default_size() -> u64 {
    MMIO_WINDOW_SIZE
}

fn default_private_size() -> u64 {
    PRIVATE_WINDOW_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "type", default = "default_type")]
    pub device_type: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_base", deserialize_with = "deserialize_addr")]
    pub base: u64,
    #[serde(default = "default_size", deserialize_with = "deserialize_addr")]
    pub size: u64,
    #[serde(default = "default_private_size", deserialize_with = "deserialize_addr")]
    pub private_size: u64,
    #[serde(default, deserialize_with = "deserialize_opt_addr")]
    pub key_lo: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_addr")]
    pub key_hi: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_addr")]
    pub tweak: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_type: default_type(),
            name: default_name(),
            base: DEFAULT_BASE,
            size: MMIO_WINDOW_SIZE,
            private_size: PRIVATE_WINDOW_SIZE,
            key_lo: None,
            key_hi: None,
            tweak: None,
        }
    }
}

impl DeviceConfig {
    fn validate(&self) -> Result<()> {
        let min_size = RegisterOffset::Result.offset() + 8;
        if self.size < min_size {
            return Err(CoreError::InvalidConfig(format!(
                "{}: window {:#x} too small to reach RESULT (need {:#x})",
                self.name, self.size, min_size
            )));
        }
        if self.base % 8 != 0 {
            return Err(CoreError::InvalidConfig(format!(
                "{}: base {:#x} must be 8-byte aligned",
                self.name, self.base
            )));
        }
        if self.base.checked_add(self.size).is_none() {
            return Err(CoreError::InvalidConfig(format!(
                "{}: window {:#x}+{:#x} runs past the end of the address space",
                self.name, self.base, self.size
            )));
        }
        if self.private_size >= self.size {
            return Err(CoreError::InvalidConfig(format!(
                "{}: private window {:#x} must be smaller than window {:#x}",
                self.name, self.private_size, self.size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            devices: vec![DeviceConfig::default()],
        }
    }
}

impl PlatformConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

pub type DeviceFactory = fn(&DeviceConfig) -> Box<dyn MmioDevice>;

#[derive(Clone, Copy)]
pub struct DeviceClass {
    pub compatible: &'static str,
    pub chip_id: u64,
    pub factory: DeviceFactory,
}

fn create_qarma(config: &DeviceConfig) -> Box<dyn MmioDevice> {
    Box::new(
        PtrauthDevice::new()
            .named(config.name.clone())
            .with_window_size(config.size),
    )
}

/// Device classes known to a platform, keyed by type name.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    classes: BTreeMap<String, DeviceClass>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            QARMA_TYPE,
            DeviceClass {
                compatible: QARMA_COMPATIBLE,
                chip_id: CHIP_ID,
                factory: create_qarma,
            },
        );
        registry
    }

    pub fn register(&mut self, type_name: &str, class: DeviceClass) {
        self.classes.insert(type_name.to_string(), class);
    }

    pub fn class(&self, type_name: &str) -> Option<&DeviceClass> {
        self.classes.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn create(&self, config: &DeviceConfig) -> Result<Box<dyn MmioDevice>> {
        let class = self
            .class(&config.device_type)
            .ok_or_else(|| CoreError::UnknownDevice(config.device_type.clone()))?;
        Ok((class.factory)(config))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTreeNode {
    pub path: String,
    pub compatible: String,
    /// `(address, size)` pairs: the public window followed by the private trailing window.
    pub reg: Vec<(u64, u64)>,
    /// Class identifier for tooling. Not rendered and not readable through any register.
    pub chip_id: u64,
}

impl DeviceTreeNode {
    pub fn describe(config: &DeviceConfig, class: &DeviceClass) -> Self {
        let public_size = config.size - config.private_size;
        Self {
            path: format!("/ptrauth@{:x}", config.base),
            compatible: class.compatible.to_string(),
            reg: vec![
                (config.base, public_size),
                (config.base + public_size, config.private_size),
            ],
            chip_id: class.chip_id,
        }
    }

    /// DTS source using two address cells and two size cells.
    pub fn render(&self) -> String {
        let name = self.path.trim_start_matches('/');
        let cells = self
            .reg
            .iter()
            .map(|(addr, size)| {
                format!(
                    "<{:#x} {:#x} {:#x} {:#x}>",
                    addr >> 32,
                    addr & 0xFFFF_FFFF,
                    size >> 32,
                    size & 0xFFFF_FFFF
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut out = String::new();
        let _ = writeln!(out, "{name} {{");
        let _ = writeln!(out, "\tcompatible = \"{}\";", self.compatible);
        let _ = writeln!(out, "\treg = {cells};");
        let _ = writeln!(out, "}};");
        out
    }
}

pub struct Platform {
    bus: SystemBus,
    nodes: Vec<DeviceTreeNode>,
    bases: Vec<(String, u64)>,
}

impl Platform {
    pub fn build(config: &PlatformConfig, registry: &DeviceRegistry) -> Result<Self> {
        let mut bus = SystemBus::new();
        let mut nodes = Vec::with_capacity(config.devices.len());
        let mut bases = Vec::with_capacity(config.devices.len());
        for dev_config in &config.devices {
            dev_config.validate()?;
            let class = registry
                .class(&dev_config.device_type)
                .ok_or_else(|| CoreError::UnknownDevice(dev_config.device_type.clone()))?;
            let mut device = registry.create(dev_config)?;
            if let Some(state) = device.state_mut() {
                if let Some(key_lo) = dev_config.key_lo {
                    state.key_lo = key_lo;
                }
                if let Some(key_hi) = dev_config.key_hi {
                    state.key_hi = key_hi;
                }
                if let Some(tweak) = dev_config.tweak {
                    state.tweak = tweak;
                }
            }
            bus.map(dev_config.base, device)?;
            nodes.push(DeviceTreeNode::describe(dev_config, class));
            bases.push((dev_config.name.clone(), dev_config.base));
            info!(
                name = %dev_config.name,
                device_type = %dev_config.device_type,
                base = format_args!("{:#x}", dev_config.base),
                size = format_args!("{:#x}", dev_config.size),
                "mapped device"
            );
        }
        Ok(Self { bus, nodes, bases })
    }

    /// Base address of the named device, or of the first device when `name` is `None`.
    pub fn device_base(&self, name: Option<&str>) -> Option<u64> {
        match name {
            Some(name) => self
                .bases
                .iter()
                .find(|(dev, _)| dev == name)
                .map(|(_, base)| *base),
            None => self.bases.first().map(|(_, base)| *base),
        }
    }

    pub fn bus(&self) -> &SystemBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SystemBus {
        &mut self.bus
    }

    pub fn device_tree(&self) -> &[DeviceTreeNode] {
        &self.nodes
    }

    pub fn render_dts(&self) -> String {
        self.nodes.iter().map(DeviceTreeNode::render).collect()
    }
}
