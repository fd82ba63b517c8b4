// query/relations.rs - 关联加载器
//! 为关联树注册预加载。
//!
//! 每个关联子查询依次应用条目的列投影、过滤条件和嵌套关联。

use tracing::debug;

use super::columns::ColumnProjector;
use super::filter::FilterEngine;
use super::parser::DEFAULT_MAX_DEPTH;
use super::types::RelationshipSpec;
use crate::backend::{Capabilities, RecordRelations, RelationalBackend};
use crate::error::{ShapeError, ShapeResult};

/// 关联加载器
#[derive(Debug, Clone, Copy)]
pub struct RelationshipLoader {
    filters: FilterEngine,
    max_depth: usize,
}

impl RelationshipLoader {
    pub fn new(max_depth: usize) -> Self {
        Self {
            filters: FilterEngine::new(max_depth),
            max_depth,
        }
    }

    /// 向无法加载关联的后端请求关联时失败
    pub fn ensure_supported(capabilities: Capabilities, specs: &[RelationshipSpec]) -> ShapeResult<()> {
        if specs.is_empty() || capabilities.eager_loading {
            return Ok(());
        }
        let names: Vec<&str> = specs.iter().map(RelationshipSpec::name).collect();
        Err(ShapeError::UnsupportedRelationLoad(format!(
            "requested {}; use a relation-capable backend instead",
            names.join(", ")
        )))
    }

    /// 在支持关联的查询上注册 `specs` 中的每个关联
    pub fn apply<B: RelationalBackend>(&self, backend: &mut B, specs: &[RelationshipSpec]) -> ShapeResult<()> {
        self.apply_at(backend, specs, 1)
    }

    /// 将 `specs` 中的每个关联加载到已取得的记录上
    pub fn apply_to_record<R: RecordRelations>(
        &self,
        record: &mut R,
        specs: &[RelationshipSpec],
    ) -> ShapeResult<()> {
        self.check_depth(specs, 1)?;
        for spec in specs {
            debug!(relation = spec.name(), "loading relation onto record");
            record.load_relation(spec.name(), &mut |query: &mut R::Query| {
                self.constrain(query, spec, 1)
            })?;
        }
        Ok(())
    }

    fn check_depth(&self, specs: &[RelationshipSpec], depth: usize) -> ShapeResult<()> {
        if !specs.is_empty() && depth > self.max_depth {
            return Err(ShapeError::RecursionDepthExceeded {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn apply_at<B: RelationalBackend>(
        &self,
        backend: &mut B,
        specs: &[RelationshipSpec],
        depth: usize,
    ) -> ShapeResult<()> {
        self.check_depth(specs, depth)?;
        for spec in specs {
            debug!(relation = spec.name(), depth, "registering eager load");
            backend.with_relation(spec.name(), &mut |related: &mut B| {
                self.constrain(related, spec, depth)
            })?;
        }
        Ok(())
    }

    fn constrain<B: RelationalBackend>(
        &self,
        related: &mut B,
        spec: &RelationshipSpec,
        depth: usize,
    ) -> ShapeResult<()> {
        ColumnProjector::apply(related, spec.columns())?;
        if let Some(filters) = spec.filters() {
            self.filters.apply(related, filters)?;
        }
        self.apply_at(related, spec.relationships(), depth + 1)
    }
}

impl Default for RelationshipLoader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ModelDef, ModelQuery, QueryBackend, RelationDef, Schema, SelectQuery};
    use crate::query::InstructionParser;
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new()
                .with_model(
                    "users",
                    ModelDef::new().relation("posts", RelationDef::has_many("posts", "user_id")),
                )
                .with_model(
                    "posts",
                    ModelDef::new()
                        .relation("comments", RelationDef::has_many("comments", "post_id"))
                        .relation("author", RelationDef::belongs_to("users", "user_id")),
                )
                .with_model("comments", ModelDef::new()),
        )
    }

    #[test]
    fn test_plain_backend_rejects_relations() {
        let specs = InstructionParser::default()
            .parse_relationships(&json!(["posts"]))
            .unwrap();
        let query = SelectQuery::new("users").unwrap();
        assert!(matches!(
            RelationshipLoader::ensure_supported(query.capabilities(), &specs),
            Err(ShapeError::UnsupportedRelationLoad(_))
        ));
        assert!(RelationshipLoader::ensure_supported(query.capabilities(), &[]).is_ok());
    }

    #[test]
    fn test_nested_eager_loads() {
        let specs = InstructionParser::default()
            .parse_relationships(&json!([{
                "name": "posts",
                "columns": ["id", "title"],
                "filters": [{"type": "notNull", "args": ["published_at"]}],
                "relationships": ["comments:body", "author"]
            }]))
            .unwrap();

        let mut query = ModelQuery::new(schema(), "users").unwrap();
        RelationshipLoader::default().apply(&mut query, &specs).unwrap();

        let posts = query.eager_load("posts").unwrap();
        assert_eq!(
            posts.query.to_string(),
            "SELECT id, title FROM posts WHERE published_at IS NOT NULL"
        );
        let names: Vec<&str> = posts.query.eager_loads().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["comments", "author"]);
        assert_eq!(
            posts.query.eager_load("comments").unwrap().query.columns(),
            ["body"]
        );
    }

    #[test]
    fn test_unknown_relation_surfaces() {
        let specs = InstructionParser::default()
            .parse_relationships(&json!(["followers"]))
            .unwrap();
        let mut query = ModelQuery::new(schema(), "users").unwrap();
        assert!(matches!(
            RelationshipLoader::default().apply(&mut query, &specs),
            Err(ShapeError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_loader_depth_guard() {
        let specs = InstructionParser::default()
            .parse_relationships(&json!([{"name": "posts", "relationships": ["author"]}]))
            .unwrap();
        let mut query = ModelQuery::new(schema(), "users").unwrap();
        assert!(matches!(
            RelationshipLoader::new(1).apply(&mut query, &specs),
            Err(ShapeError::RecursionDepthExceeded { max: 1 })
        ));
    }
}
