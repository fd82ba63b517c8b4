// api/request.rs - 整形请求
//! 从请求参数中提取三种整形指令

use serde_json::Value;

use crate::config::ApiHelperConfig;
use crate::error::{ShapeError, ShapeResult};
use crate::query::{ColumnSpec, FilterSequence, InstructionParser, RelationshipSpec};

/// 单个请求解析后的整形指令
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapingRequest {
    /// 请求的列，为空表示默认投影
    pub columns: ColumnSpec,

    /// 顶层过滤条件，未提供时为 `None`
    pub filters: Option<FilterSequence>,

    /// 请求的关联树
    pub relationships: Vec<RelationshipSpec>,
}

impl ShapingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(mut self, columns: ColumnSpec) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_filters(mut self, filters: FilterSequence) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_relationships(mut self, relationships: Vec<RelationshipSpec>) -> Self {
        self.relationships = relationships;
        self
    }

    /// 按配置的参数名从 JSON 参数对象中读取
    pub fn from_params(params: &Value, config: &ApiHelperConfig) -> ShapeResult<Self> {
        let parser = InstructionParser::new(config.limits.max_depth);
        let names = &config.param_names;

        let mut request = Self::new();
        if let Some(raw) = param(params, &names.columns)? {
            request.columns = parser.parse_columns(&raw)?;
        }
        if let Some(raw) = param(params, &names.filters)? {
            let filters = parser.parse_filters(&raw)?;
            if !filters.is_empty() {
                request.filters = Some(filters);
            }
        }
        if let Some(raw) = param(params, &names.relationships)? {
            request.relationships = parser.parse_relationships(&raw)?;
        }
        Ok(request)
    }
}

/// 单个参数：缺省或 null、数组，或内容为 JSON 数组的字符串
fn param(params: &Value, name: &str) -> ShapeResult<Option<Value>> {
    let invalid = || ShapeError::InvalidParameter {
        name: name.to_string(),
        expected: "an array or null",
    };

    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(_)) => Ok(params.get(name).cloned()),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(decoded @ Value::Array(_)) => Ok(Some(decoded)),
            Ok(Value::Null) => Ok(None),
            _ => Err(invalid()),
        },
        Some(_) => Err(invalid()),
    }
}
