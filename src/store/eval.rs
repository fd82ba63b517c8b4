// store/eval.rs - 谓词求值
//! 在内存行上对 `WhereClause` 求值。
//!
//! 与 SQL 相同，`AND` 优先于 `OR`。任何涉及 NULL 的比较都为假，
//! 包括 `!=` 和 `NOT IN`。

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Number, Value};

use super::record::unqualified;
use crate::backend::{ColumnTest, CompareOp, Predicate, WhereClause};
use crate::query::Combinator;

/// `EXISTS` 谓词的关联行来源
pub(crate) trait RowSource {
    fn rows(&self, table: &str) -> &[Map<String, Value>];
}

/// 单次查询的求值器，LIKE 模式在查询内只编译一次
pub(crate) struct Evaluator<'a, S> {
    source: &'a S,
    patterns: RefCell<HashMap<String, Option<Regex>>>,
}

impl<'a, S: RowSource> Evaluator<'a, S> {
    pub(crate) fn new(source: &'a S) -> Self {
        Self {
            source,
            patterns: RefCell::new(HashMap::new()),
        }
    }

    /// 空子句匹配所有行
    pub(crate) fn matches(&self, clause: &WhereClause, row: &Map<String, Value>) -> bool {
        let mut any = false;
        let mut all = true;
        for (i, (boolean, predicate)) in clause.terms().iter().enumerate() {
            if i > 0 && *boolean == Combinator::Or {
                any |= all;
                all = true;
            }
            // 当前 AND 段已为假时跳过
            if all {
                all = self.eval(predicate, row);
            }
        }
        any || all
    }

    fn eval(&self, predicate: &Predicate, row: &Map<String, Value>) -> bool {
        match predicate {
            Predicate::Compare { column, op, value } => self.compare(column_value(row, column), *op, value),
            Predicate::Null { column, negated } => column_value(row, column).is_null() != *negated,
            Predicate::In {
                column,
                values,
                negated,
            } => {
                // 与渲染一致：空 IN 为 `0 = 1`，空 NOT IN 为 `1 = 1`
                if values.is_empty() {
                    return *negated;
                }
                let actual = column_value(row, column);
                if actual.is_null() {
                    return false;
                }
                values.iter().any(|v| values_equal(actual, v)) != *negated
            }
            Predicate::Exists {
                correlation,
                column,
                test,
                ..
            } => {
                let key = column_value(row, &correlation.parent_key);
                if key.is_null() {
                    return false;
                }
                self.source.rows(&correlation.related_table).iter().any(|related| {
                    values_equal(column_value(related, &correlation.related_key), key)
                        && self.column_test(column_value(related, column), test)
                })
            }
            Predicate::Group(clause) => self.matches(clause, row),
        }
    }

    fn column_test(&self, actual: &Value, test: &ColumnTest) -> bool {
        match test {
            ColumnTest::Compare { op, value } => self.compare(actual, *op, value),
            ColumnTest::Null { negated } => actual.is_null() != *negated,
        }
    }

    fn compare(&self, actual: &Value, op: CompareOp, expected: &Value) -> bool {
        match op {
            CompareOp::Like | CompareOp::NotLike => {
                let (Some(text), Some(pattern)) = (as_text(actual), as_text(expected)) else {
                    return false;
                };
                self.like(&text, &pattern) == (op == CompareOp::Like)
            }
            _ => match compare_values(actual, expected) {
                Some(ordering) => match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::NotEq => ordering != Ordering::Equal,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Lte => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Gte => ordering != Ordering::Less,
                    CompareOp::Like | CompareOp::NotLike => false,
                },
                None => false,
            },
        }
    }

    fn like(&self, text: &str, pattern: &str) -> bool {
        let mut patterns = self.patterns.borrow_mut();
        let compiled = patterns
            .entry(pattern.to_string())
            .or_insert_with(|| like_regex(pattern));
        compiled.as_ref().is_some_and(|re| re.is_match(text))
    }
}

fn column_value<'a>(row: &'a Map<String, Value>, column: &str) -> &'a Value {
    row.get(unqualified(column)).unwrap_or(&Value::Null)
}

/// 键匹配与 `IN` 使用的宽松相等
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

/// 比较两个值；数字字符串按数字比较。NULL 或无公共序时返回 `None`
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::Number(n), Value::String(s)) => match s.trim().parse::<Number>() {
            Ok(parsed) => compare_numbers(n, &parsed),
            Err(_) => Some(n.to_string().as_str().cmp(s.as_str())),
        },
        (Value::String(_), Value::Number(_)) => compare_values(b, a).map(Ordering::reverse),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Bool(flag), Value::Number(n)) => compare_numbers(&Number::from(u8::from(*flag)), n),
        (Value::Number(_), Value::Bool(_)) => compare_values(b, a).map(Ordering::reverse),
        _ => (a == b).then_some(Ordering::Equal),
    }
}

/// 两个整数精确比较，只有一侧为浮点数时才退化为 f64
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (x.as_i64(), y.as_i64(), x.as_u64(), y.as_u64()) {
        (Some(a), Some(b), _, _) => Some(a.cmp(&b)),
        (_, _, Some(a), Some(b)) => Some(a.cmp(&b)),
        // 一侧为负的 i64，另一侧为超出 i64 的 u64
        (Some(_), None, _, Some(_)) => Some(Ordering::Less),
        (None, Some(_), Some(_), _) => Some(Ordering::Greater),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// 不区分大小写的 SQL `LIKE`：`%` 匹配任意串，`_` 匹配单个字符
fn like_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()
}
