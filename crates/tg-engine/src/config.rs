use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::tiling::Tiling;

/// File name looked up by [`EngineConfig::from_current_dir`].
pub const CONFIG_FILE: &str = "tilegemm.toml";

/// Environment variable overriding the tile edge length.
pub const ENV_TILE: &str = "TILEGEMM_TILE";

/// Environment variable overriding the reduction width.
pub const ENV_WIDTH: &str = "TILEGEMM_WIDTH";

/// Static configuration of an [`crate::Accelerator`].
///
/// Fixed for the lifetime of the engine; the per-run matrix dimensions are a
/// [`crate::GemmConfig`] instead.
///
/// ```toml
/// [tiling]
/// tile = 64
/// width = 16
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub tiling: Tiling,
}

impl EngineConfig {
    pub fn new(tiling: Tiling) -> Result<Self> {
        tiling.validate()?;
        Ok(EngineConfig { tiling })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.tiling.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loading engine config from {}", path.as_ref().display());
        Self::from_toml_str(&text)
    }

    /// Load `tilegemm.toml` from the current directory or its closest parent
    /// that has one, falling back to the defaults.
    pub fn from_current_dir() -> Result<Self> {
        let dir = std::env::current_dir()?;
        match find_config(&dir) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply `TILEGEMM_TILE` / `TILEGEMM_WIDTH` from the process environment.
    pub fn override_from_env(self) -> Result<Self> {
        self.override_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn override_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_TILE) {
            self.tiling.tile = parse_var(ENV_TILE, &val)?;
        }
        if let Some(val) = lookup(ENV_WIDTH) {
            self.tiling.width = parse_var(ENV_WIDTH, &val)?;
        }
        self.tiling.validate()?;
        Ok(self)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Other(e.to_string()))
    }

    /// Write this configuration to `path` as TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

fn find_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE))
        .find(|path| path.is_file())
}

fn parse_var(key: &str, val: &str) -> Result<usize> {
    val.trim().parse().map_err(|_| {
        EngineError::Other(format!("{key}: expected an unsigned integer, got {val:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.tiling, Tiling::default());
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_parse_partial() {
        let config = EngineConfig::from_toml_str("[tiling]\ntile = 32\n").unwrap();
        assert_eq!(config.tiling.tile, 32);
        assert_eq!(config.tiling.width, 16);
    }

    #[test]
    fn test_parse_rejects_bad_tiling() {
        assert!(matches!(
            EngineConfig::from_toml_str("[tiling]\ntile = 64\nwidth = 24\n"),
            Err(EngineError::InvalidTiling { .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[tiling]\ntile = \"big\"\n"),
            Err(EngineError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = EngineConfig::new(Tiling::new(32, 8).unwrap()).unwrap();
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
        assert_eq!(find_config(dir.path()), Some(path.clone()));

        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_config(&nested), Some(path));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EngineConfig::from_file(dir.path().join("nope.toml")),
            Err(EngineError::Io(_))
        ));
    }

    #[test]
    fn test_env_override() {
        let vars: HashMap<&str, &str> = [(ENV_TILE, "16"), (ENV_WIDTH, " 4 ")].into();
        let config = EngineConfig::default()
            .override_with(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.tiling, Tiling::new(16, 4).unwrap());

        let bad: HashMap<&str, &str> = [(ENV_WIDTH, "wide")].into();
        assert!(EngineConfig::default()
            .override_with(|k| bad.get(k).map(|v| v.to_string()))
            .is_err());
    }
}
