// backend/model.rs - 支持关联的查询构建器
//! 模型 Schema 以及了解模型关联的查询构建器

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::ast::*;
use super::sql::{SelectQuery, validate_identifier};
use super::{Capabilities, QueryBackend, RelationalBackend};
use crate::error::{ShapeError, ShapeResult};
use crate::query::Combinator;

fn default_key() -> String {
    "id".to_string()
}

/// 关联的基数与方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
}

/// 两个模型之间声明的关联
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelationDef {
    pub kind: RelationKind,
    /// 关联模型名
    pub model: String,
    /// `has_*` 时位于关联模型，`belongs_to` 时位于本模型
    pub foreign_key: String,
    /// `has_*` 时位于本模型，`belongs_to` 时位于关联模型
    #[serde(default = "default_key")]
    pub local_key: String,
}

impl RelationDef {
    pub fn has_many(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, model, foreign_key)
    }

    pub fn has_one(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, model, foreign_key)
    }

    pub fn belongs_to(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsTo, model, foreign_key)
    }

    fn new(kind: RelationKind, model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            foreign_key: foreign_key.into(),
            local_key: default_key(),
        }
    }

    pub fn with_local_key(mut self, local_key: impl Into<String>) -> Self {
        self.local_key = local_key.into();
        self
    }

    /// 关联连接使用的 `(父表列, 关联表列)`
    pub fn join_keys(&self) -> (&str, &str) {
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => (&self.local_key, &self.foreign_key),
            RelationKind::BelongsTo => (&self.foreign_key, &self.local_key),
        }
    }

    pub fn is_many(&self) -> bool {
        self.kind == RelationKind::HasMany
    }
}

/// 一个模型（一张表）及其关联
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelDef {
    #[serde(default = "default_key")]
    pub primary_key: String,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDef>,
}

impl ModelDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn relation(mut self, name: impl Into<String>, relation: RelationDef) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }
}

impl Default for ModelDef {
    fn default() -> Self {
        Self {
            primary_key: default_key(),
            relations: BTreeMap::new(),
        }
    }
}

/// 后端已知的全部模型，以表名为键
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    models: BTreeMap<String, ModelDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, name: impl Into<String>, model: ModelDef) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    pub fn model(&self, name: &str) -> ShapeResult<&ModelDef> {
        self.models
            .get(name)
            .ok_or_else(|| ShapeError::UnknownModel(name.to_string()))
    }

    pub fn relation(&self, model: &str, relation: &str) -> ShapeResult<&RelationDef> {
        self.model(model)?
            .relations
            .get(relation)
            .ok_or_else(|| ShapeError::UnknownRelation {
                model: model.to_string(),
                relation: relation.to_string(),
            })
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

/// 已注册的预加载
#[derive(Debug, Clone, PartialEq)]
pub struct EagerLoad {
    pub name: String,
    pub relation: RelationDef,
    /// 关联模型上带约束的查询
    pub query: ModelQuery,
}

/// 单个模型上的查询，支持关联谓词和预加载
#[derive(Debug, Clone)]
pub struct ModelQuery {
    schema: Arc<Schema>,
    model: String,
    select: SelectQuery,
    eager: Vec<EagerLoad>,
}

impl PartialEq for ModelQuery {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model && self.select == other.select && self.eager == other.eager
    }
}

impl ModelQuery {
    pub fn new(schema: Arc<Schema>, model: &str) -> ShapeResult<Self> {
        schema.model(model)?;
        let select = SelectQuery::new(model)?;
        Ok(Self {
            schema,
            model: model.to_string(),
            select,
            eager: Vec::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn columns(&self) -> &[String] {
        self.select.columns()
    }

    pub fn where_clause(&self) -> &WhereClause {
        self.select.where_clause()
    }

    pub fn select_query(&self) -> &SelectQuery {
        &self.select
    }

    pub fn eager_loads(&self) -> &[EagerLoad] {
        &self.eager
    }

    pub fn eager_load(&self, name: &str) -> Option<&EagerLoad> {
        self.eager.iter().find(|load| load.name == name)
    }

    pub fn to_sql(&self) -> (String, Vec<Value>) {
        self.select.to_sql()
    }

    fn scoped(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            model: self.model.clone(),
            select: self.select.scoped(),
            eager: Vec::new(),
        }
    }
}

impl fmt::Display for ModelQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.select)
    }
}

impl QueryBackend for ModelQuery {
    fn capabilities(&self) -> Capabilities {
        Capabilities::RELATIONAL
    }

    fn select(&mut self, columns: &[String]) -> ShapeResult<()> {
        self.select.select(columns)
    }

    fn where_compare(
        &mut self,
        boolean: Combinator,
        column: &str,
        op: CompareOp,
        value: Value,
    ) -> ShapeResult<()> {
        self.select.where_compare(boolean, column, op, value)
    }

    fn where_null(&mut self, boolean: Combinator, column: &str, negated: bool) -> ShapeResult<()> {
        self.select.where_null(boolean, column, negated)
    }

    fn where_in(
        &mut self,
        boolean: Combinator,
        column: &str,
        values: Vec<Value>,
        negated: bool,
    ) -> ShapeResult<()> {
        self.select.where_in(boolean, column, values, negated)
    }

    fn where_group(
        &mut self,
        boolean: Combinator,
        build: &mut dyn FnMut(&mut Self) -> ShapeResult<()>,
    ) -> ShapeResult<()> {
        let mut scope = self.scoped();
        build(&mut scope)?;
        let clause = scope.select.take_where();
        if !clause.is_empty() {
            self.select.push_predicate(boolean, Predicate::Group(clause));
        }
        Ok(())
    }

    fn where_relation(
        &mut self,
        boolean: Combinator,
        relation: &str,
        column: &str,
        op: CompareOp,
        value: Value,
    ) -> ShapeResult<()> {
        let def = self.schema.relation(&self.model, relation)?;
        let (parent_key, related_key) = def.join_keys();
        let correlation = Correlation {
            parent_table: self.model.clone(),
            parent_key: parent_key.to_string(),
            related_table: def.model.clone(),
            related_key: related_key.to_string(),
        };
        let column = validate_identifier(column)?.to_string();

        self.select.push_predicate(
            boolean,
            Predicate::Exists {
                relation: relation.to_string(),
                correlation,
                column,
                test: ColumnTest::new(op, value),
            },
        );
        Ok(())
    }
}

impl RelationalBackend for ModelQuery {
    fn with_relation(
        &mut self,
        name: &str,
        constrain: &mut dyn FnMut(&mut Self) -> ShapeResult<()>,
    ) -> ShapeResult<()> {
        let relation = self.schema.relation(&self.model, name)?.clone();
        let mut query = ModelQuery::new(Arc::clone(&self.schema), &relation.model)?;
        constrain(&mut query)?;

        debug!(model = %self.model, relation = name, related = %query, "registered eager load");

        // 同名关联后注册的覆盖先注册的
        self.eager.retain(|load| load.name != name);
        self.eager.push(EagerLoad {
            name: name.to_string(),
            relation,
            query,
        });
        Ok(())
    }
}
