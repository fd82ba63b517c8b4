// engine/builder.rs - ApiHelper 构建器
//! 为单个模型构建 `ApiHelper`

use std::sync::Arc;

use crate::backend::validate_identifier;
use crate::config::ApiHelperConfig;
use crate::error::{ShapeError, ShapeResult};
use crate::query::{FilterEngine, RelationshipLoader};

use super::core::ApiHelper;

#[derive(Debug, Default)]
pub struct ApiHelperBuilder {
    config: Option<Arc<ApiHelperConfig>>,
    model: Option<String>,
}

impl ApiHelperBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 默认为 `ApiHelperConfig::default()`
    pub fn with_config(mut self, config: Arc<ApiHelperConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// 服务的模型（表）
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn build(self) -> ShapeResult<ApiHelper> {
        let config = self.config.unwrap_or_default();
        let model = self.model.ok_or(ShapeError::InvalidParameter {
            name: "model".to_string(),
            expected: "a model name",
        })?;
        validate_identifier(&model)?;

        let max_depth = config.limits.max_depth;
        Ok(ApiHelper {
            config,
            model,
            filters: FilterEngine::new(max_depth),
            loader: RelationshipLoader::new(max_depth),
        })
    }
}
