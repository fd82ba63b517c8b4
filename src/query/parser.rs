// query/parser.rs - 指令解析器
//! 将无类型的请求值解析为整形指令
//!
//! 接受的形式：
//! - 列：`["id", "name"]`
//! - 过滤：`[{"type": "null", "args": ["a"]}, "or", [ ...分组... ]]`
//! - 关联：`["posts:id,title", {"name": "comments", "filters": [...], "relationships": [...]}]`
//!
//! 过滤和关联条目也可以是内容为 JSON 对象的字符串，查询字符串中即以此形式传递。

use serde_json::{Map, Value};
use tracing::trace;

use super::types::*;
use crate::error::{ShapeError, ShapeResult};

/// 分组 / 关联嵌套的默认上限
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// 指令解析器
#[derive(Debug, Clone, Copy)]
pub struct InstructionParser {
    max_depth: usize,
}

impl InstructionParser {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// 解析列列表，`null` 表示默认投影
    pub fn parse_columns(&self, raw: &Value) -> ShapeResult<ColumnSpec> {
        column_list(raw).ok_or(ShapeError::InvalidParameter {
            name: "columns".to_string(),
            expected: "an array of column names",
        })
    }

    /// 解析顶层过滤序列
    pub fn parse_filters(&self, raw: &Value) -> ShapeResult<FilterSequence> {
        self.filters_at(raw, 1)
    }

    /// 解析顶层关联列表
    pub fn parse_relationships(&self, raw: &Value) -> ShapeResult<Vec<RelationshipSpec>> {
        self.relationships_at(raw, 1)
    }

    fn check_depth(&self, depth: usize) -> ShapeResult<()> {
        if depth > self.max_depth {
            return Err(ShapeError::RecursionDepthExceeded {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn filters_at(&self, raw: &Value, depth: usize) -> ShapeResult<FilterSequence> {
        let items = match raw {
            Value::Null => return Ok(FilterSequence::default()),
            Value::Array(items) => items,
            other => {
                return Err(ShapeError::malformed(format!(
                    "filters must be an array, got {}",
                    other
                )));
            }
        };
        if items.is_empty() {
            return Ok(FilterSequence::default());
        }
        self.check_depth(depth)?;

        let nodes = items
            .iter()
            .map(|item| self.filter_node(item, depth))
            .collect::<ShapeResult<Vec<_>>>()?;

        trace!(depth, len = nodes.len(), "parsed filter sequence");
        FilterSequence::new(nodes)
    }

    fn filter_node(&self, item: &Value, depth: usize) -> ShapeResult<FilterNode> {
        match item {
            Value::String(token) => {
                if let Some(combinator) = Combinator::from_token(token) {
                    return Ok(FilterNode::Combinator(combinator));
                }
                match decode_json(token) {
                    Some(decoded @ (Value::Object(_) | Value::Array(_))) => {
                        self.filter_node(&decoded, depth)
                    }
                    _ => Err(ShapeError::malformed(format!(
                        "unrecognized filter token {:?}",
                        token
                    ))),
                }
            }
            Value::Array(_) => Ok(FilterNode::Group(self.filters_at(item, depth + 1)?)),
            Value::Object(map) => Ok(FilterNode::Condition(condition(map)?)),
            other => Err(ShapeError::malformed(format!(
                "unexpected filter element {}",
                other
            ))),
        }
    }

    fn relationships_at(&self, raw: &Value, depth: usize) -> ShapeResult<Vec<RelationshipSpec>> {
        let items = match raw {
            Value::Null => return Ok(Vec::new()),
            Value::Array(items) => items,
            other => {
                return Err(ShapeError::InvalidRelationship(format!(
                    "relationships must be an array, got {}",
                    other
                )));
            }
        };
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.check_depth(depth)?;

        items
            .iter()
            .map(|item| self.relationship(item, depth))
            .collect()
    }

    fn relationship(&self, item: &Value, depth: usize) -> ShapeResult<RelationshipSpec> {
        match item {
            Value::String(entry) => match decode_json(entry) {
                Some(Value::Object(map)) => self.structured(&map, depth),
                _ => parse_shorthand(entry),
            },
            Value::Object(map) => self.structured(map, depth),
            other => Err(ShapeError::InvalidRelationship(format!(
                "expected a string or an object, got {}",
                other
            ))),
        }
    }

    fn structured(&self, map: &Map<String, Value>, depth: usize) -> ShapeResult<RelationshipSpec> {
        let name = match map.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                return Err(ShapeError::InvalidRelationship(
                    "structured entry requires a non-empty `name`".to_string(),
                ));
            }
        };

        let columns = column_list(map.get("columns").unwrap_or(&Value::Null)).ok_or_else(|| {
            ShapeError::InvalidRelationship(format!("`columns` of `{}` must be an array", name))
        })?;
        // 关联的过滤条件从第 1 层分组开始计数
        let filters = self.filters_at(map.get("filters").unwrap_or(&Value::Null), 1)?;
        let relationships =
            self.relationships_at(map.get("relationships").unwrap_or(&Value::Null), depth + 1)?;

        Ok(RelationshipSpec::Full {
            name,
            columns,
            filters,
            relationships,
        })
    }
}

impl Default for InstructionParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

/// 解析 `name` 或 `name:col1,col2`
pub fn parse_shorthand(entry: &str) -> ShapeResult<RelationshipSpec> {
    let (name, columns) = match entry.split_once(':') {
        Some((name, columns)) => (
            name,
            ColumnSpec::new(
                columns
                    .split(',')
                    .map(str::trim)
                    .filter(|column| !column.is_empty()),
            ),
        ),
        None => (entry, ColumnSpec::default()),
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(ShapeError::InvalidRelationship(format!(
            "missing relation name in {:?}",
            entry
        )));
    }
    Ok(RelationshipSpec::shorthand(name, columns))
}

fn condition(map: &Map<String, Value>) -> ShapeResult<Condition> {
    let kind = match map.get("type") {
        None | Some(Value::Null) => ConditionKind::default(),
        Some(Value::String(name)) if name.is_empty() => ConditionKind::default(),
        Some(Value::String(name)) => ConditionKind::from_name(name)
            .ok_or_else(|| ShapeError::UnknownConditionKind(name.clone()))?,
        Some(other) => return Err(ShapeError::UnknownConditionKind(other.to_string())),
    };

    let args = match map.get("args") {
        Some(Value::Array(args)) => args.clone(),
        Some(Value::Null) | None => {
            return Err(ShapeError::bad_args(kind.name(), "missing `args` array"));
        }
        Some(_) => return Err(ShapeError::bad_args(kind.name(), "`args` must be an array")),
    };

    Ok(Condition::new(kind, args))
}

/// 值既不是 `null` 也不是数组时返回 `None`，非字符串条目被跳过
fn column_list(raw: &Value) -> Option<ColumnSpec> {
    match raw {
        Value::Null => Some(ColumnSpec::default()),
        Value::Array(items) => Some(ColumnSpec::new(items.iter().filter_map(|item| {
            let column = item.as_str();
            if column.is_none() {
                trace!(%item, "ignoring non-string column entry");
            }
            column
        }))),
        _ => None,
    }
}

fn decode_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
