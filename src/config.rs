// config.rs - 配置
//! 参数名和限制，从可选的 TOML 文件加载

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ShapeResult;
use crate::query::DEFAULT_MAX_DEPTH;

/// 默认配置文件路径
pub const CONFIG_FILE: &str = "./config.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiHelperConfig {
    #[serde(default)]
    pub param_names: ParamNames,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// 携带各指令的请求参数名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamNames {
    pub columns: String,
    pub filters: String,
    pub relationships: String,
}

impl Default for ParamNames {
    fn default() -> Self {
        Self {
            columns: "_columns".to_string(),
            filters: "_filters".to_string(),
            relationships: "_relationships".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// 过滤分组和关联的最大嵌套层数
    pub max_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ApiHelperConfig {
    /// 加载 `path`，无法读取时回退到默认值
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Ok(config) => {
                info!(path = %path.display(), "configuration loaded");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot load configuration, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ShapeResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: ApiHelperConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// 将内置的默认配置写入 `path`
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> ShapeResult<()> {
        let default_content = include_str!("../config.toml");
        fs::write(path, default_content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShapeError;

    #[test]
    fn test_generated_config_matches_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        ApiHelperConfig::generate_default_config(&path).unwrap();

        let config = ApiHelperConfig::load_from_file(&path).unwrap();
        assert_eq!(config, ApiHelperConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[param_names]\nfilters = \"where\"\n").unwrap();

        let config = ApiHelperConfig::load(&path);
        assert_eq!(config.param_names.filters, "where");
        assert_eq!(config.param_names.columns, "_columns");
        assert_eq!(config.limits.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(ApiHelperConfig::load_from_file(&missing), Err(ShapeError::Io(_))));
        assert_eq!(ApiHelperConfig::load(&missing), ApiHelperConfig::default());

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[limits]\nmax_depth = \"deep\"\n").unwrap();
        assert!(matches!(ApiHelperConfig::load_from_file(&broken), Err(ShapeError::Toml(_))));
    }
}
