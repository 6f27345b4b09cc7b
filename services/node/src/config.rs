//! Node configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/matter-node/node.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `fabric.fabric_id`
//! - `fabric.vendor_id`
//! - `fabric.node_id`
//!
//! # Setup code
//! The commissioning passcode and discriminator are read from the config
//! directly (no token file indirection — a setup code is not a secret in
//! the same sense as a bearer token, and is meant to be printed/displayed).

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config types (validated, defaults applied)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub schema_version: u32,
    pub listen: ListenConfig,
    pub commissioning: CommissioningConfig,
    pub fabric: FabricConfig,
    pub storage: StorageConfig,
    pub interaction: InteractionConfig,
    pub bdx: BdxConfig,
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub udp_bind: String,
}

#[derive(Debug, Clone)]
pub struct CommissioningConfig {
    pub passcode: u32,
    pub discriminator: u16,
}

#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub fabric_id: u64,
    pub vendor_id: u16,
    pub node_id: u64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

#[derive(Debug, Clone)]
pub struct InteractionConfig {
    pub max_chunk_bytes: usize,
    pub max_paths_per_invoke: u16,
}

#[derive(Debug, Clone)]
pub struct BdxConfig {
    pub transport_max_block_size: u16,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    listen: Option<RawListenConfig>,
    commissioning: Option<RawCommissioningConfig>,
    fabric: Option<RawFabricConfig>,
    storage: Option<RawStorageConfig>,
    interaction: Option<RawInteractionConfig>,
    bdx: Option<RawBdxConfig>,
}

#[derive(Debug, Deserialize)]
struct RawListenConfig {
    udp_bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCommissioningConfig {
    passcode: Option<u32>,
    discriminator: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawFabricConfig {
    fabric_id: Option<u64>,
    vendor_id: Option<u16>,
    node_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawStorageConfig {
    sqlite_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInteractionConfig {
    max_chunk_bytes: Option<usize>,
    max_paths_per_invoke: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawBdxConfig {
    transport_max_block_size: Option<u16>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config_from_path(path: &Path) -> Result<NodeConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<NodeConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/matter-node/node.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<NodeConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw.schema_version.ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!("schema_version must be 1, got {schema_version}")));
    }

    let listen = match raw.listen {
        Some(l) => ListenConfig { udp_bind: l.udp_bind.unwrap_or_else(|| "0.0.0.0:5540".to_owned()) },
        None => ListenConfig { udp_bind: "0.0.0.0:5540".to_owned() },
    };

    let commissioning = match raw.commissioning {
        Some(c) => CommissioningConfig { passcode: c.passcode.unwrap_or(20202021), discriminator: c.discriminator.unwrap_or(3840) },
        None => CommissioningConfig { passcode: 20202021, discriminator: 3840 },
    };

    let raw_fabric = raw.fabric.ok_or_else(|| ConfigError::MissingField("fabric".to_owned()))?;
    let fabric = FabricConfig {
        fabric_id: raw_fabric.fabric_id.ok_or_else(|| ConfigError::MissingField("fabric.fabric_id".to_owned()))?,
        vendor_id: raw_fabric.vendor_id.ok_or_else(|| ConfigError::MissingField("fabric.vendor_id".to_owned()))?,
        node_id: raw_fabric.node_id.ok_or_else(|| ConfigError::MissingField("fabric.node_id".to_owned()))?,
    };

    let storage = match raw.storage {
        Some(s) => StorageConfig { sqlite_path: s.sqlite_path.unwrap_or_else(|| "/var/lib/matter-node/fabrics.sqlite3".to_owned()) },
        None => StorageConfig { sqlite_path: "/var/lib/matter-node/fabrics.sqlite3".to_owned() },
    };

    let interaction = match raw.interaction {
        Some(i) => InteractionConfig {
            max_chunk_bytes: i.max_chunk_bytes.unwrap_or(1024),
            max_paths_per_invoke: i.max_paths_per_invoke.unwrap_or(1),
        },
        None => InteractionConfig { max_chunk_bytes: 1024, max_paths_per_invoke: 1 },
    };

    let bdx = match raw.bdx {
        Some(b) => BdxConfig { transport_max_block_size: b.transport_max_block_size.unwrap_or(1024) },
        None => BdxConfig { transport_max_block_size: 1024 },
    };

    Ok(NodeConfig { schema_version, listen, commissioning, fabric, storage, interaction, bdx })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let toml = r#"
            schema_version = 1
            [fabric]
            fabric_id = 1
            vendor_id = 0xFFF1
            node_id = 1
        "#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.listen.udp_bind, "0.0.0.0:5540");
        assert_eq!(config.commissioning.passcode, 20202021);
        assert_eq!(config.commissioning.discriminator, 3840);
        assert_eq!(config.interaction.max_chunk_bytes, 1024);
    }

    #[test]
    fn missing_fabric_table_is_rejected() {
        let toml = "schema_version = 1\n";
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "fabric"));
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let toml = r#"
            schema_version = 2
            [fabric]
            fabric_id = 1
            vendor_id = 1
            node_id = 1
        "#;
        assert!(matches!(load_config_from_str(toml), Err(ConfigError::InvalidValue(_))));
    }
}
