use std::path::{Path, PathBuf};
use vigil_core::{ConfigError, LivenessConfig};

/// CLI configuration: model location plus verification thresholds.
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    pub liveness: LivenessConfig,
}

impl Config {
    /// Thresholds come from `config_file` (or defaults), then `VIGIL_*`
    /// overrides. The model directory is `model_dir`, else
    /// `VIGIL_MODEL_DIR`, else the default data directory.
    pub fn load(config_file: Option<&Path>, model_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let liveness = match config_file {
            Some(path) => LivenessConfig::from_file(path)?,
            None => LivenessConfig::default(),
        }
        .apply_env();
        liveness.validate()?;

        let model_dir = model_dir
            .or_else(|| std::env::var("VIGIL_MODEL_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(vigil_core::default_model_dir);

        Ok(Self { model_dir, liveness })
    }
}
