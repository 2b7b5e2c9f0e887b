use directories_next::ProjectDirs;
use psx_core::SystemConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::io::{self, Write};
use std::path::PathBuf;
use std::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to find config directory")]
    NoConfigDir,

    #[error("failed to access config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize config file: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to deserialize config file: {0}")]
    Deserialize(#[from] toml::de::Error),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to BIOS file.
    pub bios: Option<PathBuf>,
    /// Wait for real time to catch up after each run.
    pub realtime: bool,
    /// Exit after this many runs.
    pub frames: Option<u64>,
    pub system: SystemConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bios: None,
            realtime: true,
            frames: None,
            system: SystemConfig::default(),
        }
    }
}

fn config_path() -> Result<(PathBuf, PathBuf), ConfigError> {
    let project = ProjectDirs::from("psxemu", "", "").ok_or(ConfigError::NoConfigDir)?;
    let dir = project.config_dir().to_path_buf();
    let path = dir.join("config.toml");
    Ok((dir, path))
}

impl Config {
    /// Load the config file. Returns the default config if there isn't one.
    pub fn load() -> Result<Self, ConfigError> {
        let (_, path) = config_path()?;
        match fs::read_to_string(&path) {
            Ok(string) => {
                debug!("config loaded from {}", path.display());
                Ok(toml::from_str(&string)?)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no config file at {}", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn store(&self) -> Result<(), ConfigError> {
        let (dir, path) = config_path()?;
        fs::create_dir_all(dir)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let string = toml::to_string_pretty(self)?;
        Ok(file.write_all(string.as_bytes())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = toml::from_str("bios = \"scph1001.bin\"").unwrap();
        assert_eq!(config.bios, Some(PathBuf::from("scph1001.bin")));
        assert!(config.realtime);
        assert_eq!(config.frames, None);
        assert_eq!(config.system.cycles_per_run, SystemConfig::default().cycles_per_run);
    }

    #[test]
    fn system_table() {
        let config: Config = toml::from_str("realtime = false\n[system]\ncycles_per_run = 1000")
            .unwrap();
        assert!(!config.realtime);
        assert_eq!(config.system.cycles_per_run, 1000);
    }

    #[test]
    fn store_format() {
        let config = Config { frames: Some(60), ..Config::default() };
        let string = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&string).unwrap();
        assert_eq!(back.frames, Some(60));
        assert!(back.realtime);
    }
}
