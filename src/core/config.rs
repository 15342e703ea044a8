//! Runtime configuration.
//!
//! ```toml
//! format_policy = "permissive"
//! default_glsl_version = 330
//! check_first_run = true
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//! ```

use crate::core::error::ConfigError;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How strictly connected port formats must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatPolicy {
    /// Declared formats on both ends of a connection or binding must be
    /// compatible.
    #[default]
    Strict,
    /// Format disagreements are reported as warnings.
    Permissive,
}

impl FormatPolicy {
    pub fn is_strict(&self) -> bool {
        *self == FormatPolicy::Strict
    }
}

/// Settings applied when instantiating pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlipConfig {
    /// Format agreement policy for connections and bindings.
    #[serde(default)]
    pub format_policy: FormatPolicy,

    /// GLSL version of the generated vertex shader when the fragment shader
    /// does not declare one.
    #[serde(default = "default_glsl_version")]
    pub default_glsl_version: u32,

    /// Mark a pipeline as broken when its first run fails.
    #[serde(default = "default_true")]
    pub check_first_run: bool,

    /// Color written to outputs of clearing filters before drawing.
    #[serde(default)]
    pub clear_color: [f32; 4],
}

fn default_glsl_version() -> u32 {
    130
}

fn default_true() -> bool {
    true
}

impl Default for GlipConfig {
    fn default() -> Self {
        Self {
            format_policy: FormatPolicy::Strict,
            default_glsl_version: default_glsl_version(),
            check_first_run: true,
            clear_color: [0.0; 4],
        }
    }
}

impl GlipConfig {
    pub fn with_format_policy(mut self, policy: FormatPolicy) -> Self {
        self.format_policy = policy;
        self
    }

    pub fn with_glsl_version(mut self, version: u32) -> Self {
        self.default_glsl_version = version;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_first_run_check(mut self, enabled: bool) -> Self {
        self.check_first_run = enabled;
        self
    }

    /// Parse a TOML document. Missing keys take their default value.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GlipConfig::default();
        assert!(config.format_policy.is_strict());
        assert_eq!(config.default_glsl_version, 130);
        assert_eq!(GlipConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_partial_toml() {
        let config = GlipConfig::from_toml_str(
            "format_policy = \"permissive\"\nclear_color = [0.0, 0.0, 0.0, 1.0]\n",
        )
        .unwrap();
        assert_eq!(config.format_policy, FormatPolicy::Permissive);
        assert_eq!(config.clear_color[3], 1.0);
        assert!(config.check_first_run);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_glsl_version = 330").unwrap();
        let config = GlipConfig::load(file.path()).unwrap();
        assert_eq!(config.default_glsl_version, 330);

        assert!(matches!(
            GlipConfig::from_toml_str("format_policy = \"loose\""),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            GlipConfig::load("/nonexistent/glip.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
