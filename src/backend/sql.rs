// backend/sql.rs - 普通 SELECT 构建器
//! 不支持关联的表查询构建器

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::ast::*;
use super::{Capabilities, QueryBackend};
use crate::error::{ShapeError, ShapeResult};
use crate::query::Combinator;

// `name` 或 `table.name`
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap()
});

/// 拒绝普通标识符（可带表名限定）以外的任何内容
pub fn validate_identifier(name: &str) -> ShapeResult<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(ShapeError::InvalidIdentifier(name.to_string()))
    }
}

/// SELECT 查询构建器
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    columns: Vec<String>,
    where_clause: WhereClause,
}

impl SelectQuery {
    pub fn new(table: &str) -> ShapeResult<Self> {
        validate_identifier(table)?;
        Ok(Self {
            table: table.to_string(),
            columns: Vec::new(),
            where_clause: WhereClause::new(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// 选中的列，为空表示 `*`
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn where_clause(&self) -> &WhereClause {
        &self.where_clause
    }

    pub(crate) fn push_predicate(&mut self, boolean: Combinator, predicate: Predicate) {
        self.where_clause.push(boolean, predicate);
    }

    /// 同一张表上的空构建器，用于分组
    pub(crate) fn scoped(&self) -> Self {
        Self {
            table: self.table.clone(),
            columns: Vec::new(),
            where_clause: WhereClause::new(),
        }
    }

    pub(crate) fn take_where(&mut self) -> WhereClause {
        std::mem::take(&mut self.where_clause)
    }

    /// 带 `?` 占位符的 SQL 文本及绑定值
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut renderer = Renderer::parameterized();
        self.render(&mut renderer);
        renderer.finish()
    }
}

impl Render for SelectQuery {
    fn render(&self, renderer: &mut Renderer) {
        renderer.push("SELECT ");
        if self.columns.is_empty() {
            renderer.push("*");
        } else {
            renderer.push(&self.columns.join(", "));
        }
        renderer.push(" FROM ");
        renderer.push(&self.table);
        if !self.where_clause.is_empty() {
            renderer.push(" WHERE ");
            self.where_clause.render(renderer);
        }
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut renderer = Renderer::inline();
        self.render(&mut renderer);
        f.write_str(&renderer.sql)
    }
}

impl QueryBackend for SelectQuery {
    fn capabilities(&self) -> Capabilities {
        Capabilities::PLAIN
    }

    fn select(&mut self, columns: &[String]) -> ShapeResult<()> {
        for column in columns {
            if column != "*" {
                validate_identifier(column)?;
            }
        }
        self.columns = columns.to_vec();
        Ok(())
    }

    fn where_compare(
        &mut self,
        boolean: Combinator,
        column: &str,
        op: CompareOp,
        value: Value,
    ) -> ShapeResult<()> {
        let column = validate_identifier(column)?.to_string();
        self.push_predicate(boolean, Predicate::Compare { column, op, value });
        Ok(())
    }

    fn where_null(&mut self, boolean: Combinator, column: &str, negated: bool) -> ShapeResult<()> {
        let column = validate_identifier(column)?.to_string();
        self.push_predicate(boolean, Predicate::Null { column, negated });
        Ok(())
    }

    fn where_in(
        &mut self,
        boolean: Combinator,
        column: &str,
        values: Vec<Value>,
        negated: bool,
    ) -> ShapeResult<()> {
        let column = validate_identifier(column)?.to_string();
        self.push_predicate(
            boolean,
            Predicate::In {
                column,
                values,
                negated,
            },
        );
        Ok(())
    }

    fn where_group(
        &mut self,
        boolean: Combinator,
        build: &mut dyn FnMut(&mut Self) -> ShapeResult<()>,
    ) -> ShapeResult<()> {
        let mut scope = self.scoped();
        build(&mut scope)?;
        let clause = scope.take_where();
        if !clause.is_empty() {
            self.push_predicate(boolean, Predicate::Group(clause));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_and_where() {
        let mut query = SelectQuery::new("users").unwrap();
        query.select(&["id".to_string(), "name".to_string()]).unwrap();
        query
            .where_compare(Combinator::And, "age", CompareOp::Gte, json!(18))
            .unwrap();
        query.where_null(Combinator::Or, "deleted_at", false).unwrap();

        let (sql, params) = query.to_sql();
        assert_eq!(sql, "SELECT id, name FROM users WHERE age >= ? OR deleted_at IS NULL");
        assert_eq!(params, vec![json!(18)]);
    }

    #[test]
    fn test_identifiers_are_validated() {
        let mut query = SelectQuery::new("users").unwrap();
        assert!(matches!(
            query.where_null(Combinator::And, "name; DROP TABLE users", false),
            Err(ShapeError::InvalidIdentifier(_))
        ));
        assert!(query.select(&["users.id".to_string()]).is_ok());
        assert!(SelectQuery::new("1users").is_err());
    }

    #[test]
    fn test_empty_group_is_dropped() {
        let mut query = SelectQuery::new("users").unwrap();
        query
            .where_group(Combinator::And, &mut |_scope: &mut SelectQuery| Ok(()))
            .unwrap();
        assert!(query.where_clause().is_empty());
    }

    #[test]
    fn test_relation_predicate_unsupported() {
        let mut query = SelectQuery::new("users").unwrap();
        let result = query.where_relation(Combinator::And, "posts", "title", CompareOp::Eq, json!("x"));
        assert!(matches!(result, Err(ShapeError::UnsupportedRelationPredicate(_))));
    }
}
