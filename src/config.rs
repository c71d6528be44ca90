// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Settings for the warehouse load, read from YAML.
///
/// ```yaml
/// database: warehouse.db
/// record_year: 2022
/// fact_table: HealthRecord
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub database: PathBuf,
    pub record_year: i32,
    pub fact_table: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("warehouse.db"),
            record_year: 2022,
            fact_table: "HealthRecord".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        // an empty document deserializes as unit, not as an empty map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("parsing pipeline config")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        Self::from_yaml(&text).with_context(|| format!("in {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let cfg = PipelineConfig::from_yaml("record_year: 2023\n")?;
        assert_eq!(cfg.record_year, 2023);
        assert_eq!(cfg.database, PathBuf::from("warehouse.db"));
        assert_eq!(cfg.fact_table, "HealthRecord");
        assert_eq!(PipelineConfig::from_yaml("")?, PipelineConfig::default());
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PipelineConfig::from_yaml("databse: x.db\n").is_err());
    }

    #[test]
    fn loads_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("load.yaml");
        fs::write(&path, "database: /tmp/w.db\nfact_table: Facts\n")?;
        let cfg = PipelineConfig::load(&path)?;
        assert_eq!(cfg.database, PathBuf::from("/tmp/w.db"));
        assert_eq!(cfg.fact_table, "Facts");
        assert_eq!(cfg.record_year, 2022);
        Ok(())
    }
}
