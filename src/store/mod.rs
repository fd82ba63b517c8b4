// store/mod.rs - 内存模型存储
//! 在 JSON 行上执行 `ModelQuery` 树。
//!
//! 行在投影前过滤；预加载先按连接键匹配，之后每一层才投影到所选列。

mod eval;
pub mod record;

pub use record::*;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::backend::{EagerLoad, ModelQuery, RecordRelations, RelationalBackend, Schema};
use crate::error::{ShapeError, ShapeResult};
use eval::{Evaluator, RowSource};

/// 磁盘上的数据文件：schema 加上每个模型的行
#[derive(Debug, Deserialize)]
struct Fixture {
    schema: Schema,
    #[serde(default)]
    data: BTreeMap<String, Vec<Map<String, Value>>>,
}

/// schema 中每个模型的行
#[derive(Debug, Clone)]
pub struct MemoryStore {
    schema: Arc<Schema>,
    tables: BTreeMap<String, Vec<Map<String, Value>>>,
}

impl MemoryStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            tables: BTreeMap::new(),
        }
    }

    pub fn from_json_str(raw: &str) -> ShapeResult<Self> {
        let fixture: Fixture = serde_json::from_str(raw)?;
        let mut store = Self::new(fixture.schema);
        for (model, rows) in fixture.data {
            for row in rows {
                store.insert(&model, row)?;
            }
        }
        Ok(store)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ShapeResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let store = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            models = store.tables.len(),
            "loaded data fixture"
        );
        Ok(store)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn insert(&mut self, model: &str, row: Map<String, Value>) -> ShapeResult<()> {
        self.schema.model(model)?;
        self.tables.entry(model.to_string()).or_default().push(row);
        Ok(())
    }

    /// 针对 `model` 的新查询
    pub fn query(&self, model: &str) -> ShapeResult<ModelQuery> {
        ModelQuery::new(Arc::clone(&self.schema), model)
    }

    /// 执行查询及其预加载，并投影到所选列
    pub fn get(&self, query: &ModelQuery) -> ShapeResult<Vec<Record>> {
        let mut records = self.load(query)?;
        for record in &mut records {
            record.project(query.columns());
        }
        Ok(records)
    }

    /// 按主键查找，不加载关联
    pub fn find(&self, model: &str, id: &Value) -> ShapeResult<Option<Record>> {
        let primary_key = &self.schema.model(model)?.primary_key;
        let found = self.rows(model).iter().find(|row| {
            row.get(primary_key.as_str())
                .is_some_and(|key| eval::values_equal(key, id))
        });
        Ok(found.map(|row| Record::new(model, row.clone())))
    }

    /// 为 `find` 取得的记录加载关联
    pub fn loader<'a>(&'a self, record: &'a mut Record) -> RecordLoader<'a> {
        RecordLoader {
            store: self,
            record,
        }
    }

    fn load(&self, query: &ModelQuery) -> ShapeResult<Vec<Record>> {
        let evaluator = Evaluator::new(self);
        let mut records: Vec<Record> = self
            .rows(query.model())
            .iter()
            .filter(|row| evaluator.matches(query.where_clause(), row))
            .map(|row| Record::new(query.model(), row.clone()))
            .collect();

        debug!(query = %query, matched = records.len(), "executed query");

        for load in query.eager_loads() {
            self.attach(&mut records, load)?;
        }
        Ok(records)
    }

    fn attach(&self, parents: &mut [Record], load: &EagerLoad) -> ShapeResult<()> {
        let related = self.load(&load.query)?;
        let (parent_key, related_key) = load.relation.join_keys();

        for parent in parents.iter_mut() {
            let mut matched: Vec<Record> = match parent.get(parent_key) {
                Some(key) if !key.is_null() => related
                    .iter()
                    .filter(|candidate| {
                        candidate
                            .get(related_key)
                            .is_some_and(|value| eval::values_equal(value, key))
                    })
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            for record in &mut matched {
                record.project(load.query.columns());
            }

            let relation = if load.relation.is_many() {
                LoadedRelation::Many(matched)
            } else {
                match matched.into_iter().next() {
                    Some(record) => LoadedRelation::One(Box::new(record)),
                    None => LoadedRelation::Null,
                }
            };
            parent.set_relation(load.name.as_str(), relation);
        }
        Ok(())
    }
}

impl RowSource for MemoryStore {
    fn rows(&self, table: &str) -> &[Map<String, Value>] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 为一条已取得的记录加载关联
pub struct RecordLoader<'a> {
    store: &'a MemoryStore,
    record: &'a mut Record,
}

impl RecordRelations for RecordLoader<'_> {
    type Query = ModelQuery;

    fn load_relation(
        &mut self,
        name: &str,
        constrain: &mut dyn FnMut(&mut ModelQuery) -> ShapeResult<()>,
    ) -> ShapeResult<()> {
        let mut holder = self.store.query(self.record.model())?;
        holder.with_relation(name, constrain)?;
        let load = holder.eager_load(name).ok_or_else(|| ShapeError::UnknownRelation {
            model: self.record.model().to_string(),
            relation: name.to_string(),
        })?;
        self.store.attach(std::slice::from_mut(&mut *self.record), load)
    }
}
