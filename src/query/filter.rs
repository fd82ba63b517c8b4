// query/filter.rs - 过滤引擎
//! 将解析后的过滤序列应用到查询后端

use serde_json::Value;
use tracing::trace;

use super::parser::DEFAULT_MAX_DEPTH;
use super::types::*;
use crate::backend::{CompareOp, QueryBackend};
use crate::error::{ShapeError, ShapeResult};

/// `(combinator, kind)` 对应的后端操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Where,
    OrWhere,
    WhereNull,
    OrWhereNull,
    WhereNotNull,
    OrWhereNotNull,
    WhereRelation,
    OrWhereRelation,
    WhereIn,
    OrWhereIn,
    WhereNotIn,
    OrWhereNotIn,
}

impl Operation {
    pub fn resolve(boolean: Combinator, kind: ConditionKind) -> Self {
        use Combinator::{And, Or};
        match (boolean, kind) {
            (And, ConditionKind::Where) => Self::Where,
            (Or, ConditionKind::Where) => Self::OrWhere,
            (And, ConditionKind::Null) => Self::WhereNull,
            (Or, ConditionKind::Null) => Self::OrWhereNull,
            (And, ConditionKind::NotNull) => Self::WhereNotNull,
            (Or, ConditionKind::NotNull) => Self::OrWhereNotNull,
            (And, ConditionKind::WhereRelation) => Self::WhereRelation,
            (Or, ConditionKind::WhereRelation) => Self::OrWhereRelation,
            (And, ConditionKind::In) => Self::WhereIn,
            (Or, ConditionKind::In) => Self::OrWhereIn,
            (And, ConditionKind::NotIn) => Self::WhereNotIn,
            (Or, ConditionKind::NotIn) => Self::OrWhereNotIn,
        }
    }

    pub fn boolean(&self) -> Combinator {
        match self {
            Self::Where
            | Self::WhereNull
            | Self::WhereNotNull
            | Self::WhereRelation
            | Self::WhereIn
            | Self::WhereNotIn => Combinator::And,
            _ => Combinator::Or,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Where => "where",
            Self::OrWhere => "orWhere",
            Self::WhereNull => "whereNull",
            Self::OrWhereNull => "orWhereNull",
            Self::WhereNotNull => "whereNotNull",
            Self::OrWhereNotNull => "orWhereNotNull",
            Self::WhereRelation => "whereRelation",
            Self::OrWhereRelation => "orWhereRelation",
            Self::WhereIn => "whereIn",
            Self::OrWhereIn => "orWhereIn",
            Self::WhereNotIn => "whereNotIn",
            Self::OrWhereNotIn => "orWhereNotIn",
        }
    }
}

/// 过滤引擎
#[derive(Debug, Clone, Copy)]
pub struct FilterEngine {
    max_depth: usize,
}

impl FilterEngine {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// 将 `filters` 的每个条件和分组附加到 `backend`
    pub fn apply<B: QueryBackend>(&self, backend: &mut B, filters: &FilterSequence) -> ShapeResult<()> {
        self.apply_at(backend, filters, 1)
    }

    fn apply_at<B: QueryBackend>(
        &self,
        backend: &mut B,
        filters: &FilterSequence,
        depth: usize,
    ) -> ShapeResult<()> {
        if depth > self.max_depth {
            return Err(ShapeError::RecursionDepthExceeded {
                max: self.max_depth,
            });
        }

        let mut next = Combinator::And;
        for node in filters {
            match node {
                FilterNode::Combinator(boolean) => {
                    next = *boolean;
                    continue;
                }
                FilterNode::Group(group) => {
                    trace!(boolean = %next, depth, "opening filter group");
                    backend.where_group(next, &mut |scope: &mut B| {
                        self.apply_at(scope, group, depth + 1)
                    })?;
                }
                FilterNode::Condition(condition) => {
                    let op = Operation::resolve(next, condition.kind);
                    if condition.kind.requires_relations()
                        && !backend.capabilities().relation_predicates
                    {
                        return Err(ShapeError::UnsupportedRelationPredicate(op.name().to_string()));
                    }
                    trace!(op = op.name(), args = condition.args.len(), "applying condition");
                    dispatch(backend, op, condition)?;
                }
            }
            next = Combinator::And;
        }
        Ok(())
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

fn dispatch<B: QueryBackend>(backend: &mut B, op: Operation, condition: &Condition) -> ShapeResult<()> {
    let kind = condition.kind.name();
    let args = condition.args.as_slice();
    let boolean = op.boolean();

    match op {
        Operation::Where | Operation::OrWhere => {
            let column = string_arg(kind, args, 0, "column")?;
            let (cmp, value) = comparison(kind, args, 1)?;
            // `where(column, null)` 即 IS NULL，与查询构建器一致
            match (cmp, value) {
                (CompareOp::Eq, Value::Null) => backend.where_null(boolean, column, false),
                (CompareOp::NotEq, Value::Null) => backend.where_null(boolean, column, true),
                (cmp, value) => backend.where_compare(boolean, column, cmp, value),
            }
        }
        Operation::WhereNull
        | Operation::OrWhereNull
        | Operation::WhereNotNull
        | Operation::OrWhereNotNull => {
            expect_len(kind, args, 1)?;
            let column = string_arg(kind, args, 0, "column")?;
            let negated = matches!(op, Operation::WhereNotNull | Operation::OrWhereNotNull);
            backend.where_null(boolean, column, negated)
        }
        Operation::WhereRelation | Operation::OrWhereRelation => {
            let relation = string_arg(kind, args, 0, "relation")?;
            let column = string_arg(kind, args, 1, "column")?;
            let (cmp, value) = comparison(kind, args, 2)?;
            backend.where_relation(boolean, relation, column, cmp, value)
        }
        Operation::WhereIn | Operation::OrWhereIn | Operation::WhereNotIn | Operation::OrWhereNotIn => {
            expect_len(kind, args, 2)?;
            let column = string_arg(kind, args, 0, "column")?;
            let values = match &args[1] {
                Value::Array(values) => values.clone(),
                _ => return Err(ShapeError::bad_args(kind, "second argument must be an array")),
            };
            let negated = matches!(op, Operation::WhereNotIn | Operation::OrWhereNotIn);
            backend.where_in(boolean, column, values, negated)
        }
    }
}

fn expect_len(kind: &str, args: &[Value], len: usize) -> ShapeResult<()> {
    if args.len() != len {
        return Err(ShapeError::bad_args(
            kind,
            format!("expected {} argument(s), got {}", len, args.len()),
        ));
    }
    Ok(())
}

fn string_arg<'a>(kind: &str, args: &'a [Value], index: usize, what: &str) -> ShapeResult<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ShapeError::bad_args(kind, format!("argument {} must be a {} name", index, what)))
}

/// 从 `offset` 开始的 `[value]` 或 `[operator, value]`
fn comparison(kind: &str, args: &[Value], offset: usize) -> ShapeResult<(CompareOp, Value)> {
    match args.len().checked_sub(offset) {
        Some(1) => Ok((CompareOp::Eq, args[offset].clone())),
        Some(2) => {
            let op = args[offset]
                .as_str()
                .and_then(CompareOp::parse)
                .ok_or_else(|| {
                    ShapeError::bad_args(kind, format!("unknown operator {}", args[offset]))
                })?;
            Ok((op, args[offset + 1].clone()))
        }
        _ => Err(ShapeError::bad_args(
            kind,
            format!(
                "expected {} or {} arguments, got {}",
                offset + 1,
                offset + 2,
                args.len()
            ),
        )),
    }
}
