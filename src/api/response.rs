// api/response.rs - 响应整形
//! 按请求要求的形状序列化查询结果

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ShapeError;
use crate::query::{ColumnSpec, RelationshipSpec};

/// 序列化器看到的关联
#[derive(Debug)]
pub enum RelatedRef<'a, R> {
    One(&'a R),
    Many(&'a [R]),
    /// 未加载，或加载结果为空
    Missing,
}

/// 序列化器可读取的记录
pub trait Resource: Sized {
    /// 字段值，记录没有该字段时为 `Value::Null`
    fn attribute(&self, name: &str) -> Value;

    /// 完整字段映射，未请求列时使用
    fn to_default_map(&self) -> Map<String, Value>;

    fn related(&self, name: &str) -> RelatedRef<'_, Self>;
}

/// 结果序列化器
pub struct ResourceSerializer;

impl ResourceSerializer {
    /// 为一条记录构建有序字段映射
    pub fn shape<R: Resource>(
        record: &R,
        columns: &ColumnSpec,
        relationships: &[RelationshipSpec],
    ) -> Map<String, Value> {
        let mut shaped = if columns.is_default() {
            record.to_default_map()
        } else {
            columns
                .iter()
                .map(|column| (column.clone(), record.attribute(column)))
                .collect()
        };

        for spec in relationships {
            let value = match record.related(spec.name()) {
                RelatedRef::One(related) => {
                    Value::Object(Self::shape(related, spec.columns(), spec.relationships()))
                }
                RelatedRef::Many(related) => {
                    Value::Array(Self::shape_collection(related, spec.columns(), spec.relationships()))
                }
                RelatedRef::Missing => continue,
            };
            shaped.insert(spec.name().to_string(), value);
        }

        shaped
    }

    pub fn shape_collection<R: Resource>(
        records: &[R],
        columns: &ColumnSpec,
        relationships: &[RelationshipSpec],
    ) -> Vec<Value> {
        records
            .iter()
            .map(|record| Value::Object(Self::shape(record, columns, relationships)))
            .collect()
    }
}

/// 响应外层，`{"data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub data: Value,
}

impl ResourceResponse {
    pub fn single(data: Map<String, Value>) -> Self {
        Self {
            data: Value::Object(data),
        }
    }

    pub fn collection(data: Vec<Value>) -> Self {
        Self {
            data: Value::Array(data),
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误码
    pub code: String,

    /// 错误信息
    pub message: String,

    /// 详细信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<&ShapeError> for ErrorResponse {
    fn from(err: &ShapeError) -> Self {
        let response = Self::new(err.code(), err.to_string());
        match err {
            ShapeError::UnsupportedRelationLoad(_) => {
                response.with_details("relationships require a relation-capable query backend")
            }
            ShapeError::RecursionDepthExceeded { .. } => {
                response.with_details("reduce group or relationship nesting")
            }
            _ => response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_shorthand;
    use serde_json::json;

    struct Row {
        fields: Map<String, Value>,
        children: Vec<Row>,
        parent: Option<Box<Row>>,
    }

    impl Row {
        fn new(fields: Value) -> Self {
            Self {
                fields: fields.as_object().cloned().unwrap_or_default(),
                children: Vec::new(),
                parent: None,
            }
        }
    }

    impl Resource for Row {
        fn attribute(&self, name: &str) -> Value {
            self.fields.get(name).cloned().unwrap_or(Value::Null)
        }

        fn to_default_map(&self) -> Map<String, Value> {
            self.fields.clone()
        }

        fn related(&self, name: &str) -> RelatedRef<'_, Self> {
            match (name, &self.parent) {
                ("children", _) => RelatedRef::Many(self.children.as_slice()),
                ("parent", Some(parent)) => RelatedRef::One(&**parent),
                _ => RelatedRef::Missing,
            }
        }
    }

    #[test]
    fn test_columns_exact_keys_in_order() {
        let row = Row::new(json!({"name": "ada", "email": "a@x", "id": 1}));
        let shaped = ResourceSerializer::shape(&row, &ColumnSpec::new(["id", "name"]), &[]);

        let keys: Vec<&str> = shaped.keys().map(String::as_str).collect();
        assert_eq!(keys, ["id", "name"]);
        assert_eq!(shaped["id"], json!(1));
    }

    #[test]
    fn test_missing_column_is_null() {
        let row = Row::new(json!({"id": 1}));
        let shaped = ResourceSerializer::shape(&row, &ColumnSpec::new(["id", "nickname"]), &[]);
        assert_eq!(shaped["nickname"], Value::Null);
    }

    #[test]
    fn test_default_mapping() {
        let row = Row::new(json!({"id": 1, "name": "ada"}));
        let shaped = ResourceSerializer::shape(&row, &ColumnSpec::default(), &[]);
        assert_eq!(Value::Object(shaped), json!({"id": 1, "name": "ada"}));
    }

    #[test]
    fn test_collection_relation_is_shaped() {
        let mut row = Row::new(json!({"id": 1, "name": "ada"}));
        row.children = (1..=3)
            .map(|i| Row::new(json!({"id": i, "title": format!("t{}", i), "secret": true})))
            .collect();

        let relationships = vec![parse_shorthand("children:title").unwrap()];
        let shaped = ResourceSerializer::shape(&row, &ColumnSpec::new(["id"]), &relationships);

        let children = shaped["children"].as_array().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0], json!({"title": "t1"}));
        assert_eq!(children[2], json!({"title": "t3"}));
    }

    #[test]
    fn test_single_and_missing_relation() {
        let mut row = Row::new(json!({"id": 2}));
        row.parent = Some(Box::new(Row::new(json!({"id": 1, "name": "root"}))));
        let orphan = Row::new(json!({"id": 3}));

        let relationships = vec![parse_shorthand("parent:name").unwrap()];
        let shaped = ResourceSerializer::shape(&row, &ColumnSpec::default(), &relationships);
        assert_eq!(shaped["parent"], json!({"name": "root"}));

        let shaped = ResourceSerializer::shape(&orphan, &ColumnSpec::default(), &relationships);
        assert!(!shaped.contains_key("parent"));
    }

    #[test]
    fn test_error_response_codes() {
        let err = ShapeError::UnsupportedRelationLoad("posts".to_string());
        let response = ErrorResponse::from(&err);
        assert_eq!(response.code, "unsupported_relation_load");
        assert!(response.details.is_some());

        let json = serde_json::to_value(ErrorResponse::from(&ShapeError::UnknownConditionKind("x".into()))).unwrap();
        assert_eq!(json["code"], "unknown_condition_kind");
        assert!(json.get("details").is_none());
    }
}
