// engine/core.rs - 请求处理
//! 串联解析、查询整形、执行与序列化。
//!
//! 请求只解析一次，同一棵指令树同时驱动查询和序列化，
//! 响应与加载的内容完全对应。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::api::{ResourceResponse, ResourceSerializer, ShapingRequest};
use crate::backend::{QueryBackend, RelationalBackend};
use crate::config::ApiHelperConfig;
use crate::error::{ShapeError, ShapeResult};
use crate::query::{ColumnProjector, FilterEngine, RelationshipLoader};
use crate::store::MemoryStore;

/// 为单个模型整形查询与响应
#[derive(Debug, Clone)]
pub struct ApiHelper {
    pub(crate) config: Arc<ApiHelperConfig>,
    pub(crate) model: String,
    pub(crate) filters: FilterEngine,
    pub(crate) loader: RelationshipLoader,
}

impl ApiHelper {
    pub fn config(&self) -> &ApiHelperConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn parse_request(&self, params: &Value) -> ShapeResult<ShapingRequest> {
        ShapingRequest::from_params(params, &self.config)
    }

    /// 依次应用列、过滤、关联
    pub fn apply<B: RelationalBackend>(&self, backend: &mut B, request: &ShapingRequest) -> ShapeResult<()> {
        self.apply_common(backend, request)?;
        self.loader.apply(backend, &request.relationships)
    }

    /// 用于不支持关联的后端，其余同 `apply`；
    /// 请求关联时在应用任何内容之前失败
    pub fn apply_plain<B: QueryBackend>(&self, backend: &mut B, request: &ShapingRequest) -> ShapeResult<()> {
        RelationshipLoader::ensure_supported(backend.capabilities(), &request.relationships)?;
        self.apply_common(backend, request)
    }

    fn apply_common<B: QueryBackend>(&self, backend: &mut B, request: &ShapingRequest) -> ShapeResult<()> {
        ColumnProjector::apply(backend, &request.columns)?;
        if let Some(filters) = &request.filters {
            self.filters.apply(backend, filters)?;
        }
        Ok(())
    }

    /// 列表接口：`{"data": [...]}`
    pub fn index(&self, store: &MemoryStore, params: &Value) -> ShapeResult<ResourceResponse> {
        let request = self.parse_request(params)?;
        let mut query = store.query(&self.model)?;
        self.apply(&mut query, &request)?;

        let (sql, bindings) = query.to_sql();
        debug!(%sql, ?bindings, "index query");

        let records = store.get(&query)?;
        info!(model = %self.model, count = records.len(), "index");

        Ok(ResourceResponse::collection(ResourceSerializer::shape_collection(
            &records,
            &request.columns,
            &request.relationships,
        )))
    }

    /// 单条记录接口：`{"data": {...}}`。按 id 取得的记录
    /// 不应用顶层过滤条件。
    pub fn show(&self, store: &MemoryStore, id: &Value, params: &Value) -> ShapeResult<ResourceResponse> {
        let request = self.parse_request(params)?;
        let mut record = store
            .find(&self.model, id)?
            .ok_or_else(|| ShapeError::NotFound {
                model: self.model.clone(),
                id: id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string()),
            })?;

        self.loader
            .apply_to_record(&mut store.loader(&mut record), &request.relationships)?;
        info!(model = %self.model, %id, "show");

        Ok(ResourceResponse::single(ResourceSerializer::shape(
            &record,
            &request.columns,
            &request.relationships,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorResponse;
    use crate::backend::SelectQuery;
    use crate::engine::ApiHelperBuilder;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_json_str(include_str!("../../demos/blog.json")).unwrap()
    }

    fn helper(model: &str) -> ApiHelper {
        ApiHelperBuilder::new().with_model(model).build().unwrap()
    }

    #[test]
    fn test_index_columns() {
        let response = helper("users")
            .index(&store(), &json!({"_columns": ["id", "name"]}))
            .unwrap();
        assert_eq!(
            response.data,
            json!([
                {"id": 1, "name": "Ada"},
                {"id": 2, "name": "Bob"},
                {"id": 3, "name": "Cyd"}
            ])
        );
    }

    #[test]
    fn test_index_default_mapping() {
        let response = helper("profiles").index(&store(), &json!({})).unwrap();
        assert_eq!(
            response.data,
            json!([
                {"id": 1000, "user_id": 1, "bio": "Mathematician"},
                {"id": 1001, "user_id": 3, "bio": "Gopher"}
            ])
        );
    }

    #[test]
    fn test_index_filters() {
        let params = json!({
            "_columns": ["name"],
            "_filters": [
                {"type": "notNull", "args": ["email"]},
                "and",
                [{"args": ["role", "admin"]}, "or", {"args": ["role", "viewer"]}]
            ]
        });
        let response = helper("users").index(&store(), &params).unwrap();
        assert_eq!(response.data, json!([{"name": "Ada"}, {"name": "Cyd"}]));

        let params = json!({
            "_columns": ["name"],
            "_filters": [{"args": ["role", "editor"]}, "OR", {"args": ["id", ">=", 3]}]
        });
        let response = helper("users").index(&store(), &params).unwrap();
        assert_eq!(response.data, json!([{"name": "Bob"}, {"name": "Cyd"}]));
    }

    #[test]
    fn test_index_relation_predicate() {
        let params = json!({
            "_columns": ["name"],
            "_filters": [{"type": "whereRelation", "args": ["posts", "title", "like", "%rust%"]}]
        });
        let response = helper("users").index(&store(), &params).unwrap();
        assert_eq!(response.data, json!([{"name": "Bob"}]));
    }

    #[test]
    fn test_index_nested_relationships() {
        let params = json!({
            "_columns": ["name"],
            "_relationships": [{
                "name": "posts",
                "columns": ["title"],
                "filters": [{"type": "notNull", "args": ["published_at"]}],
                "relationships": [{
                    "name": "comments",
                    "columns": ["body"],
                    "filters": [{"args": ["approved", true]}]
                }]
            }]
        });
        let response = helper("users").index(&store(), &params).unwrap();
        assert_eq!(
            response.data,
            json!([
                {"name": "Ada", "posts": [{"title": "Hello world", "comments": [{"body": "Welcome!"}]}]},
                {"name": "Bob", "posts": [{"title": "Rust ownership", "comments": [{"body": "Nice borrow checker tips"}]}]},
                {"name": "Cyd", "posts": [{"title": "Go channels", "comments": []}]}
            ])
        );
    }

    #[test]
    fn test_null_relation_omitted() {
        let params = json!({"_columns": ["id"], "_relationships": ["profile:bio"]});
        let response = helper("users").index(&store(), &params).unwrap();
        assert_eq!(
            response.data,
            json!([
                {"id": 1, "profile": {"bio": "Mathematician"}},
                {"id": 2},
                {"id": 3, "profile": {"bio": "Gopher"}}
            ])
        );
    }

    #[test]
    fn test_show() {
        let params = json!({"_columns": ["name"], "_relationships": "[\"posts:id,title\"]"});
        let response = helper("users").show(&store(), &json!(1), &params).unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"data": {
                "name": "Ada",
                "posts": [{"id": 10, "title": "Hello world"}, {"id": 11, "title": "Draft notes"}]
            }})
        );

        let response = helper("posts")
            .show(&store(), &json!("13"), &json!({"_relationships": ["author:name"]}))
            .unwrap();
        assert_eq!(response.data["author"], json!({"name": "Cyd"}));
    }

    #[test]
    fn test_show_not_found() {
        let err = helper("users").show(&store(), &json!(99), &json!({})).unwrap_err();
        assert!(matches!(err, ShapeError::NotFound { ref id, .. } if id == "99"));
        assert_eq!(ErrorResponse::from(&err).code, "not_found");
    }

    #[test]
    fn test_apply_plain() {
        let api = helper("users");
        let request = api
            .parse_request(&json!({"_columns": ["id"], "_filters": [{"args": ["name", "Ada"]}]}))
            .unwrap();
        let mut query = SelectQuery::new("users").unwrap();
        api.apply_plain(&mut query, &request).unwrap();
        assert_eq!(query.to_string(), "SELECT id FROM users WHERE name = 'Ada'");

        let request = api.parse_request(&json!({"_relationships": ["posts"]})).unwrap();
        let mut query = SelectQuery::new("users").unwrap();
        let err = api.apply_plain(&mut query, &request).unwrap_err();
        assert!(matches!(err, ShapeError::UnsupportedRelationLoad(_)));
        assert!(query.columns().is_empty());

        let request = api
            .parse_request(&json!({"_filters": [{"type": "whereRel", "args": ["posts", "title", "x"]}]}))
            .unwrap();
        assert!(matches!(
            api.apply_plain(&mut SelectQuery::new("users").unwrap(), &request),
            Err(ShapeError::UnsupportedRelationPredicate(_))
        ));
    }

    #[test]
    fn test_parse_errors_surface() {
        let api = helper("users");
        let err = api
            .index(&store(), &json!({"_filters": [{"type": "between", "args": ["id", 1, 2]}]}))
            .unwrap_err();
        assert!(matches!(err, ShapeError::UnknownConditionKind(_)));

        let err = api
            .index(&store(), &json!({"_filters": [{"args": ["a", 1]}, "or"]}))
            .unwrap_err();
        assert!(matches!(err, ShapeError::MalformedFilterSequence(_)));

        let err = api.index(&store(), &json!({"_relationships": ["followers"]})).unwrap_err();
        assert!(matches!(err, ShapeError::UnknownRelation { .. }));
    }
}
