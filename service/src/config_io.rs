use std::path::Path;

use sql_gate_core::config::GateConfig;

const MAX_CONFIG_BYTES: usize = 4 * 1024 * 1024;

pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<GateConfig> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    if bytes.len() > MAX_CONFIG_BYTES {
        anyhow::bail!(
            "config file is too large ({} bytes; max {} bytes)",
            bytes.len(),
            MAX_CONFIG_BYTES
        );
    }
    let raw = String::from_utf8(bytes)?;
    let ext = path.extension().and_then(|s| s.to_str());
    let config: GateConfig = match ext {
        Some("json") => serde_json::from_str(&raw)?,
        Some("toml") | None => toml::from_str(&raw)?,
        Some(other) => anyhow::bail!("unsupported config extension: {other}"),
    };
    config.validate()?;
    Ok(config)
}
