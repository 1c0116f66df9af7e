use super::{
    compare_records, record_id, Backend, BatchFailure, BatchOutcome, Fields, Query, StoreError,
};
use anyhow::Context;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

/// Mock store: one vector of records per collection, last write wins.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: HashMap<String, Vec<Fields>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds collections from `{ "<collection>": [ {record}, ... ], ... }`.
    /// Every record must be an object carrying an integer `id`.
    pub fn from_seed(seed: Value) -> Result<Self, StoreError> {
        let Value::Object(map) = seed else {
            return Err(StoreError::Invalid("seed must be a JSON object".into()));
        };
        let mut collections = HashMap::new();
        for (name, rows) in map {
            if !crate::model::is_collection(&name) {
                log::warn!("seed: skipping unknown collection {}", name);
                continue;
            }
            let Value::Array(rows) = rows else {
                return Err(StoreError::Invalid(format!("seed.{name} must be an array")));
            };
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let Value::Object(fields) = row else {
                    return Err(StoreError::Invalid(format!(
                        "seed.{name} entries must be objects"
                    )));
                };
                if record_id(&fields).is_none() {
                    return Err(StoreError::Invalid(format!(
                        "seed.{name} entry without integer id"
                    )));
                }
                records.push(fields);
            }
            collections.insert(name, records);
        }
        Ok(Self { collections })
    }

    pub fn load_seed_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.to_string_lossy()))?;
        let seed: Value = serde_json::from_str(&text).context("seed file is invalid JSON")?;
        let backend = Self::from_seed(seed)?;
        log::info!(
            "seeded memory store from {} ({} collections)",
            path.to_string_lossy(),
            backend.collections.len()
        );
        Ok(backend)
    }

    fn rows(&mut self, collection: &str) -> &mut Vec<Fields> {
        self.collections.entry(collection.to_string()).or_default()
    }
}

impl Backend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn get_all(&mut self, collection: &str) -> Result<Vec<Fields>, StoreError> {
        Ok(self.rows(collection).clone())
    }

    fn get_by_id(&mut self, collection: &str, id: i64) -> Result<Fields, StoreError> {
        self.rows(collection)
            .iter()
            .find(|r| record_id(r) == Some(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    fn create(&mut self, collection: &str, mut fields: Fields) -> Result<Fields, StoreError> {
        let rows = self.rows(collection);
        let next_id = rows.iter().filter_map(record_id).max().unwrap_or(0) + 1;
        fields.insert("id".into(), json!(next_id));
        rows.push(fields.clone());
        Ok(fields)
    }

    fn update(
        &mut self,
        collection: &str,
        id: i64,
        fields: Fields,
    ) -> Result<Fields, StoreError> {
        let rows = self.rows(collection);
        let Some(existing) = rows.iter_mut().find(|r| record_id(r) == Some(id)) else {
            return Err(StoreError::not_found(collection, id));
        };
        for (k, v) in fields {
            existing.insert(k, v);
        }
        existing.insert("id".into(), json!(id));
        Ok(existing.clone())
    }

    fn delete(&mut self, collection: &str, id: i64) -> Result<bool, StoreError> {
        let rows = self.rows(collection);
        let Some(idx) = rows.iter().position(|r| record_id(r) == Some(id)) else {
            return Err(StoreError::not_found(collection, id));
        };
        rows.remove(idx);
        Ok(true)
    }

    fn query(&mut self, collection: &str, query: &Query) -> Result<Vec<Fields>, StoreError> {
        query.validate()?;
        let mut rows: Vec<Fields> = self
            .rows(collection)
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| compare_records(&query.order_by, a, b));
        }
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| query.project(r))
            .collect())
    }

    fn delete_many(&mut self, collection: &str, ids: &[i64]) -> Result<BatchOutcome, StoreError> {
        let mut outcome = BatchOutcome::default();
        for &id in ids {
            match self.delete(collection, id) {
                Ok(_) => outcome.deleted.push(id),
                Err(e) => outcome.failed.push(BatchFailure {
                    id,
                    message: e.to_string(),
                }),
            }
        }
        Ok(outcome)
    }
}
