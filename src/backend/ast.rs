// backend/ast.rs - 谓词树
//! 应用过滤条件时后端累积的 WHERE 结构。
//!
//! `WhereClause` 可以渲染为 SQL（`?` 占位符或内联字面量），
//! 也可以还原为原始过滤语法。

use std::fmt;

use serde_json::{Value, json};

use crate::query::Combinator;

/// `where` / `whereRel` 条件的比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl CompareOp {
    pub fn parse(token: &str) -> Option<Self> {
        let op = match token.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "like" => Self::Like,
            "not like" => Self::NotLike,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }

    /// 原始过滤语法中的写法
    pub fn token(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::NotLike => "not like",
            other => other.as_sql(),
        }
    }
}

/// 关联存在谓词如何与外层行关联
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub parent_table: String,
    pub parent_key: String,
    pub related_table: String,
    pub related_key: String,
}

/// 关联子查询中对单个列的检查
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnTest {
    Compare { op: CompareOp, value: Value },
    Null { negated: bool },
}

impl ColumnTest {
    /// `= null` / `!= null` 视为 IS [NOT] NULL
    pub fn new(op: CompareOp, value: Value) -> Self {
        match (op, value) {
            (CompareOp::Eq, Value::Null) => Self::Null { negated: false },
            (CompareOp::NotEq, Value::Null) => Self::Null { negated: true },
            (op, value) => Self::Compare { op, value },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    Null {
        column: String,
        negated: bool,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// 至少有一条关联行满足 `test`
    Exists {
        relation: String,
        correlation: Correlation,
        column: String,
        test: ColumnTest,
    },
    Group(WhereClause),
}

/// 有序的 `(连接符, 谓词)` 项；第一项的连接符被忽略
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    terms: Vec<(Combinator, Predicate)>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, boolean: Combinator, predicate: Predicate) {
        self.terms.push((boolean, predicate));
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[(Combinator, Predicate)] {
        &self.terms
    }

    /// 还原为原始过滤语法
    pub fn to_filter_value(&self) -> Value {
        let mut items = Vec::with_capacity(self.terms.len() * 2);
        for (i, (boolean, predicate)) in self.terms.iter().enumerate() {
            if i > 0 {
                items.push(Value::String(boolean.token().to_string()));
            }
            items.push(predicate.to_filter_value());
        }
        Value::Array(items)
    }
}

impl Predicate {
    fn to_filter_value(&self) -> Value {
        match self {
            Self::Compare { column, op, value } => {
                json!({"type": "where", "args": [column, op.token(), value]})
            }
            Self::Null { column, negated } => {
                let kind = if *negated { "notNull" } else { "null" };
                json!({"type": kind, "args": [column]})
            }
            Self::In {
                column,
                values,
                negated,
            } => {
                let kind = if *negated { "notIn" } else { "in" };
                json!({"type": kind, "args": [column, values]})
            }
            Self::Exists {
                relation,
                column,
                test,
                ..
            } => {
                let (op, value) = match test {
                    ColumnTest::Compare { op, value } => (op.token(), value.clone()),
                    ColumnTest::Null { negated: false } => ("=", Value::Null),
                    ColumnTest::Null { negated: true } => ("!=", Value::Null),
                };
                json!({"type": "whereRel", "args": [relation, column, op, value]})
            }
            Self::Group(clause) => clause.to_filter_value(),
        }
    }
}

/// 累积 SQL 文本与绑定参数
pub struct Renderer {
    pub sql: String,
    pub params: Vec<Value>,
    inline: bool,
}

impl Renderer {
    /// 值渲染为 `?` 占位符，收集到 `params`
    pub fn parameterized() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            inline: false,
        }
    }

    /// 值渲染为字面量（用于日志和测试）
    pub fn inline() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            inline: true,
        }
    }

    pub fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    pub fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    pub fn add_param(&mut self, value: &Value) {
        if self.inline {
            let literal = sql_literal(value);
            self.sql.push_str(&literal);
        } else {
            self.params.push(value.clone());
            self.sql.push('?');
        }
    }
}

/// 可渲染为 SQL 的结构
pub trait Render {
    fn render(&self, renderer: &mut Renderer);
}

impl Render for WhereClause {
    fn render(&self, renderer: &mut Renderer) {
        for (i, (boolean, predicate)) in self.terms.iter().enumerate() {
            if i > 0 {
                renderer.push(&format!(" {} ", boolean));
            }
            predicate.render(renderer);
        }
    }
}

impl Render for Predicate {
    fn render(&self, renderer: &mut Renderer) {
        match self {
            Self::Compare { column, op, value } => {
                renderer.push(column);
                renderer.push(&format!(" {} ", op.as_sql()));
                renderer.add_param(value);
            }
            Self::Null { column, negated } => {
                renderer.push(column);
                renderer.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Self::In {
                column,
                values,
                negated,
            } => {
                // 空列表：IN 恒假，NOT IN 恒真
                if values.is_empty() {
                    renderer.push(if *negated { "1 = 1" } else { "0 = 1" });
                    return;
                }
                renderer.push(column);
                renderer.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        renderer.push(", ");
                    }
                    renderer.add_param(value);
                }
                renderer.push(")");
            }
            Self::Exists {
                correlation,
                column,
                test,
                ..
            } => {
                renderer.push(&format!(
                    "EXISTS (SELECT * FROM {} WHERE {}.{} = {}.{} AND {}",
                    correlation.related_table,
                    correlation.related_table,
                    correlation.related_key,
                    correlation.parent_table,
                    correlation.parent_key,
                    column,
                ));
                match test {
                    ColumnTest::Compare { op, value } => {
                        renderer.push(&format!(" {} ", op.as_sql()));
                        renderer.add_param(value);
                    }
                    ColumnTest::Null { negated } => {
                        renderer.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
                    }
                }
                renderer.push(")");
            }
            Self::Group(clause) => {
                renderer.push("(");
                clause.render(renderer);
                renderer.push(")");
            }
        }
    }
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut renderer = Renderer::inline();
        self.render(&mut renderer);
        f.write_str(&renderer.sql)
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}
