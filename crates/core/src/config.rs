//! Engine configuration and static validation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::InferenceBackend;
use crate::error::{Error, Result};

/// Parameters of one upscaling run. Validated once, before any tile is
/// touched; the tile planner refuses to run on an invalid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpscaleConfig {
    /// Square network input edge length in pixels.
    pub tile_size: u32,
    /// Requested context border consumed per tile side. The planner may
    /// shrink it per axis near image boundaries.
    pub prepadding: u32,
    /// Model scale factor, 1..=4.
    pub scale: u32,
    /// Average 8 symmetric variants of every tile (8x inference cost).
    pub tta: bool,
    pub backend: InferenceBackend,
    /// Persist the backend's compiled-kernel cache next to the model file.
    pub cache_model: bool,
    /// Input tensor name; falls back to the model's first declared input.
    pub input_name: Option<String>,
    /// Output tensor name; falls back to the model's first declared output.
    pub output_name: Option<String>,
}

impl Default for UpscaleConfig {
    fn default() -> Self {
        Self {
            tile_size: 200,
            prepadding: 10,
            scale: 4,
            tta: false,
            backend: InferenceBackend::default(),
            cache_model: false,
            input_name: None,
            output_name: None,
        }
    }
}

impl UpscaleConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfiguration(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            Error::InvalidConfiguration(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Static checks that need no image: tile/prepadding relationship and
    /// the supported scale range.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(Error::InvalidConfiguration(
                "tile_size must be positive".to_string(),
            ));
        }
        if self.tile_size <= 2 * self.prepadding {
            return Err(Error::InvalidConfiguration(format!(
                "tile_size ({}) must exceed twice the prepadding ({})",
                self.tile_size, self.prepadding
            )));
        }
        if !(1..=4).contains(&self.scale) {
            return Err(Error::InvalidConfiguration(format!(
                "scale must be 1, 2, 3 or 4, got {}",
                self.scale
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        UpscaleConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_tile_size_not_exceeding_double_prepadding() {
        let config = UpscaleConfig {
            tile_size: 20,
            prepadding: 10,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert!(err.to_string().contains("prepadding"));
    }

    #[test]
    fn test_rejects_zero_tile_size() {
        let config = UpscaleConfig {
            tile_size: 0,
            prepadding: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_scale() {
        for scale in [0u32, 5, 8] {
            let config = UpscaleConfig {
                scale,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "scale {scale} should be rejected");
        }
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upscale.toml");
        fs::write(
            &path,
            "tile_size = 64\nprepadding = 8\nscale = 2\ntta = true\nbackend = \"cpu\"\n",
        )
        .unwrap();

        let config = UpscaleConfig::load_from_path(&path).unwrap();
        assert_eq!(config.tile_size, 64);
        assert_eq!(config.prepadding, 8);
        assert_eq!(config.scale, 2);
        assert!(config.tta);
        assert_eq!(config.backend, InferenceBackend::Cpu);
        assert!(config.input_name.is_none());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upscale.toml");
        fs::write(&path, "tile_size = 16\nprepadding = 8\n").unwrap();
        assert!(UpscaleConfig::load_from_path(&path).is_err());
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = UpscaleConfig::load_from_path(Path::new("no-such-config.toml")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
