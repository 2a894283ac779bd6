//! Engine Configuration
//!
//! Everything is defaulted so an empty `{}` file is a valid config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub limits: ValidationLimits,
    /// CMP identifier reported through `ping`.
    #[serde(default = "default_cmp_id")]
    pub cmp_id: u32,
    #[serde(default = "default_cmp_version")]
    pub cmp_version: u32,
    #[serde(default = "default_gvl_version")]
    pub gvl_version: u32,
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Days.
    #[serde(default = "default_cookie_expiry")]
    pub default_cookie_expiry: u32,
}

fn default_cmp_id() -> u32 { 300 }
fn default_cmp_version() -> u32 { 1 }
fn default_gvl_version() -> u32 { 3 }
fn default_language() -> String { "en".to_string() }
fn default_cookie_expiry() -> u32 { 365 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: ValidationLimits::default(),
            cmp_id: default_cmp_id(),
            cmp_version: default_cmp_version(),
            gvl_version: default_gvl_version(),
            default_language: default_language(),
            default_cookie_expiry: default_cookie_expiry(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationLimits {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_components")]
    pub max_components: usize,
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
}

fn default_max_depth() -> usize { 5 }
fn default_max_components() -> usize { 50 }
fn default_max_text_length() -> usize { 500 }

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_components: default_max_components(),
            max_text_length: default_max_text_length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.limits.max_depth, 5);
        assert_eq!(config.limits.max_components, 50);
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cmpId": 42, "limits": {{"maxDepth": 3}}}}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.cmp_id, 42);
        assert_eq!(config.limits.max_depth, 3);
        assert_eq!(config.limits.max_components, 50);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = EngineConfig::load(file.path()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
