// query/types.rs - 整形指令类型
//! 列、过滤、关联三种指令的规范化形式

use std::fmt;

use serde_json::Value;

use crate::error::{ShapeError, ShapeResult};

/// 连接两个过滤项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    /// 匹配原始的 `"and"` / `"or"`，忽略 ASCII 大小写
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("and") {
            Some(Self::And)
        } else if token.eq_ignore_ascii_case("or") {
            Some(Self::Or)
        } else {
            None
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl Default for Combinator {
    fn default() -> Self {
        Self::And
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
        }
    }
}

/// 条件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    /// `column [op] value`
    Where,
    /// `column IS NULL`
    Null,
    /// `column IS NOT NULL`
    NotNull,
    /// 至少一条关联行满足 `column [op] value`
    WhereRelation,
    /// `column IN (...)`
    In,
    /// `column NOT IN (...)`
    NotIn,
}

impl ConditionKind {
    /// 解析原始 `type` 值，接受短名和长名
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "where" => Self::Where,
            "null" | "whereNull" => Self::Null,
            "notNull" | "whereNotNull" => Self::NotNull,
            "whereRel" | "whereRelation" => Self::WhereRelation,
            "in" | "whereIn" => Self::In,
            "notIn" | "whereNotIn" => Self::NotIn,
            _ => return None,
        };
        Some(kind)
    }

    /// 规范名，谓词还原为原始过滤条件时使用
    pub fn name(&self) -> &'static str {
        match self {
            Self::Where => "where",
            Self::Null => "null",
            Self::NotNull => "notNull",
            Self::WhereRelation => "whereRel",
            Self::In => "in",
            Self::NotIn => "notIn",
        }
    }

    pub fn requires_relations(&self) -> bool {
        matches!(self, Self::WhereRelation)
    }
}

impl Default for ConditionKind {
    fn default() -> Self {
        Self::Where
    }
}

/// 单个条件：类型加原始参数列表
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub args: Vec<Value>,
}

impl Condition {
    pub fn new(kind: ConditionKind, args: Vec<Value>) -> Self {
        Self { kind, args }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.name())?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}

/// 过滤序列中的一个元素
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Combinator(Combinator),
    Condition(Condition),
    Group(FilterSequence),
}

/// 交替的 `term (combinator term)*` 列表。
///
/// 构造时检查交替规则，因此该类型的值长度为奇数（或为空），
/// 且首尾都不是连接词。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSequence {
    nodes: Vec<FilterNode>,
}

impl FilterSequence {
    pub fn new(nodes: Vec<FilterNode>) -> ShapeResult<Self> {
        if nodes.is_empty() {
            return Ok(Self::default());
        }
        if nodes.len() % 2 == 0 {
            return Err(ShapeError::malformed(format!(
                "expected an odd number of elements, got {}",
                nodes.len()
            )));
        }
        for (position, node) in nodes.iter().enumerate() {
            let expects_combinator = position % 2 == 1;
            let is_combinator = matches!(node, FilterNode::Combinator(_));
            if expects_combinator != is_combinator {
                let expected = if expects_combinator {
                    "a combinator"
                } else {
                    "a condition or group"
                };
                return Err(ShapeError::malformed(format!(
                    "expected {} at position {}",
                    expected, position
                )));
            }
            if let FilterNode::Group(group) = node {
                if group.is_empty() {
                    return Err(ShapeError::malformed(format!(
                        "empty group at position {}",
                        position
                    )));
                }
            }
        }
        Ok(Self { nodes })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterNode> {
        self.nodes.iter()
    }

    /// 条件和分组的数量，不计连接词
    pub fn term_count(&self) -> usize {
        self.nodes.len().div_ceil(2)
    }

    /// 最深的分组嵌套；平铺序列深度为 1
    pub fn depth(&self) -> usize {
        let nested = self
            .nodes
            .iter()
            .filter_map(|node| match node {
                FilterNode::Group(group) => Some(group.depth()),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        if self.nodes.is_empty() { 0 } else { nested + 1 }
    }
}

impl<'a> IntoIterator for &'a FilterSequence {
    type Item = &'a FilterNode;
    type IntoIter = std::slice::Iter<'a, FilterNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl fmt::Display for FilterSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match node {
                FilterNode::Combinator(c) => f.write_str(c.token())?,
                FilterNode::Condition(condition) => write!(f, "{}", condition)?,
                FilterNode::Group(group) => write!(f, "({})", group)?,
            }
        }
        Ok(())
    }
}

/// 有序的列选择，为空表示默认投影
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSpec {
    columns: Vec<String>,
}

impl ColumnSpec {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// 未限制列
    pub fn is_default(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.columns.iter()
    }
}

/// 需要预加载的关联
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipSpec {
    /// `name` 或 `name:col1,col2`
    Shorthand { name: String, columns: ColumnSpec },
    /// 结构化条目，带自己的过滤条件和嵌套关联
    Full {
        name: String,
        columns: ColumnSpec,
        filters: FilterSequence,
        relationships: Vec<RelationshipSpec>,
    },
}

impl RelationshipSpec {
    pub fn shorthand(name: impl Into<String>, columns: ColumnSpec) -> Self {
        Self::Shorthand {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Shorthand { name, .. } | Self::Full { name, .. } => name,
        }
    }

    pub fn columns(&self) -> &ColumnSpec {
        match self {
            Self::Shorthand { columns, .. } | Self::Full { columns, .. } => columns,
        }
    }

    /// 作用于该关联的过滤条件，简写条目没有
    pub fn filters(&self) -> Option<&FilterSequence> {
        match self {
            Self::Shorthand { .. } => None,
            Self::Full { filters, .. } => Some(filters),
        }
    }

    pub fn relationships(&self) -> &[RelationshipSpec] {
        match self {
            Self::Shorthand { .. } => &[],
            Self::Full { relationships, .. } => relationships,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(kind: ConditionKind, args: Vec<Value>) -> FilterNode {
        FilterNode::Condition(Condition::new(kind, args))
    }

    #[test]
    fn test_sequence_rejects_even_length() {
        let nodes = vec![
            cond(ConditionKind::Where, vec![json!("a"), json!(1)]),
            FilterNode::Combinator(Combinator::And),
        ];
        assert!(matches!(
            FilterSequence::new(nodes),
            Err(ShapeError::MalformedFilterSequence(_))
        ));
    }

    #[test]
    fn test_sequence_rejects_misplaced_combinator() {
        let nodes = vec![
            FilterNode::Combinator(Combinator::Or),
            cond(ConditionKind::Null, vec![json!("a")]),
            FilterNode::Combinator(Combinator::And),
        ];
        assert!(FilterSequence::new(nodes).is_err());
    }

    #[test]
    fn test_sequence_display_and_depth() {
        let inner = FilterSequence::new(vec![
            cond(ConditionKind::Where, vec![json!("y"), json!(2)]),
            FilterNode::Combinator(Combinator::Or),
            cond(ConditionKind::Where, vec![json!("y"), json!(3)]),
        ])
        .unwrap();
        let outer = FilterSequence::new(vec![
            cond(ConditionKind::Where, vec![json!("x"), json!(1)]),
            FilterNode::Combinator(Combinator::And),
            FilterNode::Group(inner),
        ])
        .unwrap();

        assert_eq!(
            outer.to_string(),
            r#"where("x", 1) and (where("y", 2) or where("y", 3))"#
        );
        assert_eq!(outer.depth(), 2);
        assert_eq!(outer.term_count(), 2);
    }

    #[test]
    fn test_kind_spellings() {
        assert_eq!(ConditionKind::from_name("whereNull"), Some(ConditionKind::Null));
        assert_eq!(ConditionKind::from_name("whereRel"), Some(ConditionKind::WhereRelation));
        assert_eq!(ConditionKind::from_name("between"), None);
        assert_eq!(Combinator::from_token("OR"), Some(Combinator::Or));
    }
}
