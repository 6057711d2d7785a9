//! YAML load/save for any serde config type

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a config from YAML, falling back to defaults
///
/// A missing file is normal on first run and is logged at `info`; an
/// unreadable or malformed file is logged at `warn`. Neither is fatal.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("config: {:?} not found, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("config: cannot read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };
    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("config: loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("config: cannot parse {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Write a config as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    log::info!("config: saved {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PhaseConfig, SequencerConfig};
    use crate::phase::DenormMode;
    use crate::sequence::ScrambleMethod;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config: SequencerConfig = load_config(Path::new("/nonexistent/polymath/sequencer.yaml"));
        assert_eq!(config, SequencerConfig::default());
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "bpm: [not, a, number").unwrap();
        let config: SequencerConfig = load_config(&path);
        assert_eq!(config, SequencerConfig::default());
    }

    #[test]
    fn test_sequencer_roundtrip_in_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sequencer.yaml");
        let config = SequencerConfig {
            bpm: 132.0,
            scramble_method: ScrambleMethod::AllowRepeats,
            seed: Some(99),
            ..SequencerConfig::default()
        };
        save_config(&config, &path).unwrap();
        let loaded: SequencerConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phase.yaml");
        std::fs::write(&path, "numerator: 3\nde_normalize: clamped\n").unwrap();
        let config: PhaseConfig = load_config(&path);
        assert_eq!(config.numerator, 3);
        assert_eq!(config.denominator, 4);
        assert_eq!(config.de_normalize, DenormMode::Clamped);
        assert!(!config.swap);
    }
}
