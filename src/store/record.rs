// store/record.rs - 查询得到的记录
//! 某个模型的一行，加上已加载到其上的关联

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::api::{RelatedRef, Resource};

/// 一条关联的加载结果
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedRelation {
    One(Box<Record>),
    Many(Vec<Record>),
    /// 单值关联没有对应行
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    model: String,
    attributes: Map<String, Value>,
    relations: BTreeMap<String, LoadedRelation>,
}

impl Record {
    pub fn new(model: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            model: model.into(),
            attributes,
            relations: BTreeMap::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// 属性查找；`table.column` 形式按最后一段解析
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(unqualified(column))
    }

    pub fn relation(&self, name: &str) -> Option<&LoadedRelation> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, LoadedRelation> {
        &self.relations
    }

    pub fn set_relation(&mut self, name: impl Into<String>, relation: LoadedRelation) {
        self.relations.insert(name.into(), relation);
    }

    /// 只保留 `columns`，按其顺序。为空或含 `*` 时全部保留
    pub fn project(&mut self, columns: &[String]) {
        if columns.is_empty() || columns.iter().any(|c| c == "*") {
            return;
        }
        let mut projected = Map::with_capacity(columns.len());
        for column in columns {
            let name = unqualified(column);
            if let Some(value) = self.attributes.remove(name) {
                projected.insert(name.to_string(), value);
            }
        }
        self.attributes = projected;
    }
}

impl Resource for Record {
    fn attribute(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or(Value::Null)
    }

    fn to_default_map(&self) -> Map<String, Value> {
        self.attributes.clone()
    }

    fn related(&self, name: &str) -> RelatedRef<'_, Self> {
        match self.relations.get(name) {
            Some(LoadedRelation::One(record)) => RelatedRef::One(&**record),
            Some(LoadedRelation::Many(records)) => RelatedRef::Many(records.as_slice()),
            Some(LoadedRelation::Null) | None => RelatedRef::Missing,
        }
    }
}

pub(crate) fn unqualified(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::new("users", value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_project_orders_and_skips_missing() {
        let mut user = record(json!({"id": 1, "name": "ada", "email": "a@x"}));
        user.project(&["email".to_string(), "users.id".to_string(), "nope".to_string()]);
        let keys: Vec<&str> = user.attributes().keys().map(String::as_str).collect();
        assert_eq!(keys, ["email", "id"]);
    }

    #[test]
    fn test_project_star_keeps_all() {
        let mut user = record(json!({"id": 1, "name": "ada"}));
        user.project(&["*".to_string()]);
        assert_eq!(user.attributes().len(), 2);
    }

    #[test]
    fn test_null_relation_is_missing() {
        let mut user = record(json!({"id": 1}));
        user.set_relation("profile", LoadedRelation::Null);
        assert!(matches!(user.related("profile"), RelatedRef::Missing));
        assert_eq!(user.attribute("nickname"), Value::Null);
    }
}
