// backend/mod.rs - 查询后端抽象
//! 整形流程驱动的构建器接口。
//!
//! `QueryBackend` 是所有后端都提供的接口。`RelationalBackend` 是只有支持关联的
//! 构建器才实现的更窄接口，关联加载在编译期即要求该接口。

pub mod ast;
pub mod model;
pub mod sql;

pub use ast::*;
pub use model::*;
pub use sql::*;

use serde_json::Value;

use crate::error::{ShapeError, ShapeResult};
use crate::query::Combinator;

/// 后端在普通谓词和投影之外的能力
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// 关联存在性谓词（`whereRel`）
    pub relation_predicates: bool,
    /// 预加载关联记录
    pub eager_loading: bool,
}

impl Capabilities {
    pub const PLAIN: Self = Self {
        relation_predicates: false,
        eager_loading: false,
    };

    pub const RELATIONAL: Self = Self {
        relation_predicates: true,
        eager_loading: true,
    };
}

/// 可组合的查询构建器
pub trait QueryBackend {
    fn capabilities(&self) -> Capabilities;

    /// 按顺序限制返回的列
    fn select(&mut self, columns: &[String]) -> ShapeResult<()>;

    fn where_compare(
        &mut self,
        boolean: Combinator,
        column: &str,
        op: CompareOp,
        value: Value,
    ) -> ShapeResult<()>;

    fn where_null(&mut self, boolean: Combinator, column: &str, negated: bool) -> ShapeResult<()>;

    fn where_in(
        &mut self,
        boolean: Combinator,
        column: &str,
        values: Vec<Value>,
        negated: bool,
    ) -> ShapeResult<()>;

    /// 打开带括号的作用域，由 `build` 通过作用域内的构建器填充
    fn where_group(
        &mut self,
        boolean: Combinator,
        build: &mut dyn FnMut(&mut Self) -> ShapeResult<()>,
    ) -> ShapeResult<()>;

    /// 普通后端没有可供检测的关联
    fn where_relation(
        &mut self,
        boolean: Combinator,
        relation: &str,
        column: &str,
        op: CompareOp,
        value: Value,
    ) -> ShapeResult<()> {
        let _ = (boolean, column, op, value);
        Err(ShapeError::UnsupportedRelationPredicate(relation.to_string()))
    }
}

/// 可预加载关联的查询构建器
pub trait RelationalBackend: QueryBackend {
    /// 注册 `name` 的预加载，`constrain` 用于约束关联子查询
    fn with_relation(
        &mut self,
        name: &str,
        constrain: &mut dyn FnMut(&mut Self) -> ShapeResult<()>,
    ) -> ShapeResult<()>;
}

/// 已取得、可在其上加载关联的记录
pub trait RecordRelations {
    type Query: RelationalBackend;

    fn load_relation(
        &mut self,
        name: &str,
        constrain: &mut dyn FnMut(&mut Self::Query) -> ShapeResult<()>,
    ) -> ShapeResult<()>;
}
