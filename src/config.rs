// ⚙️ Store Configuration - where the table files live and the age bounds
//
// Every field has a default, so an empty JSON object `{}` is a valid config.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the table files
    pub data_dir: PathBuf,

    pub cities_stem: String,
    pub drivers_stem: String,
    pub fines_stem: String,
    pub registry_stem: String,

    /// Suffix of the second database folded in by a merge, e.g. `cities_ext.txt`
    pub external_suffix: String,

    /// Inclusive bounds on a driver's age when created or edited
    pub min_driver_age: i32,
    pub max_driver_age: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from("."),
            cities_stem: "cities".to_string(),
            drivers_stem: "drivers".to_string(),
            fines_stem: "fines".to_string(),
            registry_stem: "registry".to_string(),
            external_suffix: "_ext".to_string(),
            min_driver_age: 18,
            max_driver_age: 100,
        }
    }
}

/// File paths of one set of four tables
#[derive(Debug, Clone, PartialEq)]
pub struct TablePaths {
    pub cities: PathBuf,
    pub drivers: PathBuf,
    pub fines: PathBuf,
    pub registry: PathBuf,
}

impl StoreConfig {
    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: StoreConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        anyhow::ensure!(
            config.min_driver_age <= config.max_driver_age,
            "min_driver_age ({}) exceeds max_driver_age ({})",
            config.min_driver_age,
            config.max_driver_age
        );

        Ok(config)
    }

    pub fn with_data_dir<P: Into<PathBuf>>(data_dir: P) -> Self {
        StoreConfig {
            data_dir: data_dir.into(),
            ..StoreConfig::default()
        }
    }

    /// `data_dir/<stem><suffix>.txt`
    pub fn table_path(&self, stem: &str, suffix: &str) -> PathBuf {
        self.data_dir.join(format!("{}{}.txt", stem, suffix))
    }

    pub fn primary_paths(&self) -> TablePaths {
        self.paths_with_suffix("")
    }

    pub fn external_paths(&self, suffix: &str) -> TablePaths {
        self.paths_with_suffix(suffix)
    }

    fn paths_with_suffix(&self, suffix: &str) -> TablePaths {
        TablePaths {
            cities: self.table_path(&self.cities_stem, suffix),
            drivers: self.table_path(&self.drivers_stem, suffix),
            fines: self.table_path(&self.fines_stem, suffix),
            registry: self.table_path(&self.registry_stem, suffix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = StoreConfig::with_data_dir("/data");
        let paths = config.primary_paths();
        assert_eq!(paths.cities, PathBuf::from("/data/cities.txt"));
        assert_eq!(paths.registry, PathBuf::from("/data/registry.txt"));

        let external = config.external_paths("_ext");
        assert_eq!(external.cities, PathBuf::from("/data/cities_ext.txt"));
        assert_eq!(external.drivers, PathBuf::from("/data/drivers_ext.txt"));
    }

    #[test]
    fn test_from_file_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{ "data_dir": "db", "external_suffix": "_b" }"#).unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("db"));
        assert_eq!(config.external_suffix, "_b");
        assert_eq!(config.fines_stem, "fines");
        assert_eq!(config.min_driver_age, 18);
    }

    #[test]
    fn test_from_file_rejects_inverted_age_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{ "min_driver_age": 50, "max_driver_age": 20 }"#).unwrap();

        assert!(StoreConfig::from_file(&path).is_err());
        assert!(StoreConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
