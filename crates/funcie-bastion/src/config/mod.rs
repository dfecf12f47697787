//! Bastion config loader (strict parsing).

pub mod schema;

use std::fs;

use funcie_core::{FuncieError, Result};

pub use schema::{
    BastionConfig, BastionSection, ClientSection, RedisSection, RegistryBackend, RegistrySection,
    Role, TransportKind,
};

pub fn load_from_file(path: &str) -> Result<BastionConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| FuncieError::Config(format!("read {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<BastionConfig> {
    let cfg: BastionConfig = serde_yaml::from_str(s)
        .map_err(|e| FuncieError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
