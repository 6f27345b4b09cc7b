//! Controller configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/matter-controller/controller.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `target.addr` — the node's UDP address to commission
//! - `target.node_id` — the node's operational node id, chosen for it by
//!   this commissioning run (the node itself only learns this value from
//!   `AddNOC`'s fields; it never generates its own)
//!
//! # Setup code
//! The commissioning passcode is read from the config directly, same as
//! `services/node`.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub schema_version: u32,
    pub listen: ListenConfig,
    pub target: TargetConfig,
    pub fabric: FabricConfig,
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub udp_bind: String,
}

#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub addr: String,
    pub passcode: u32,
    pub node_id: u64,
}

#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub fabric_id: u64,
    pub vendor_id: u16,
    pub admin_node_id: u64,
    pub ipk_value: [u8; 16],
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    listen: Option<RawListenConfig>,
    target: Option<RawTargetConfig>,
    fabric: Option<RawFabricConfig>,
}

#[derive(Debug, Deserialize)]
struct RawListenConfig {
    udp_bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTargetConfig {
    addr: Option<String>,
    passcode: Option<u32>,
    node_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawFabricConfig {
    fabric_id: Option<u64>,
    vendor_id: Option<u16>,
    admin_node_id: Option<u64>,
    ipk_value: Option<String>,
}

pub fn load_config_from_path(path: &Path) -> Result<ControllerConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<ControllerConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/matter-controller/controller.toml"))
}

fn parse_ipk(hex: &str) -> Result<[u8; 16], ConfigError> {
    if hex.len() != 32 {
        return Err(ConfigError::InvalidValue(format!("fabric.ipk_value must be 32 hex characters, got {}", hex.len())));
    }
    let mut out = [0u8; 16];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| ConfigError::InvalidValue("fabric.ipk_value is not valid hex".to_owned()))?;
    }
    Ok(out)
}

pub fn load_config_from_str(toml_str: &str) -> Result<ControllerConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw.schema_version.ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!("schema_version must be 1, got {schema_version}")));
    }

    let listen = match raw.listen {
        Some(l) => ListenConfig { udp_bind: l.udp_bind.unwrap_or_else(|| "0.0.0.0:0".to_owned()) },
        None => ListenConfig { udp_bind: "0.0.0.0:0".to_owned() },
    };

    let raw_target = raw.target.ok_or_else(|| ConfigError::MissingField("target".to_owned()))?;
    let target = TargetConfig {
        addr: raw_target.addr.ok_or_else(|| ConfigError::MissingField("target.addr".to_owned()))?,
        passcode: raw_target.passcode.unwrap_or(20202021),
        node_id: raw_target.node_id.ok_or_else(|| ConfigError::MissingField("target.node_id".to_owned()))?,
    };

    let raw_fabric = raw.fabric.ok_or_else(|| ConfigError::MissingField("fabric".to_owned()))?;
    let ipk_value = match raw_fabric.ipk_value {
        Some(hex) => parse_ipk(&hex)?,
        None => [0x5Au8; 16],
    };
    let fabric = FabricConfig {
        fabric_id: raw_fabric.fabric_id.ok_or_else(|| ConfigError::MissingField("fabric.fabric_id".to_owned()))?,
        vendor_id: raw_fabric.vendor_id.ok_or_else(|| ConfigError::MissingField("fabric.vendor_id".to_owned()))?,
        admin_node_id: raw_fabric.admin_node_id.ok_or_else(|| ConfigError::MissingField("fabric.admin_node_id".to_owned()))?,
        ipk_value,
    };

    Ok(ControllerConfig { schema_version, listen, target, fabric })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "Parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}
