use super::{
    Backend, BatchFailure, BatchOutcome, Fields, OrderBy, Query, SortDirection, StoreError,
};
use crate::model;
use serde::Serialize;
use std::path::Path;

/// Per-record outcome of a batch call against the record table.
#[derive(Debug, Clone, Serialize)]
pub struct RecordResult {
    pub id: Option<i64>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Fields>,
}

impl RecordResult {
    pub fn ok(id: i64, data: Option<Fields>) -> Self {
        Self {
            id: Some(id),
            success: true,
            message: None,
            data,
        }
    }

    pub fn failed(id: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Generic CRUD over named, schema-described tables.
pub trait RecordTable {
    fn fetch_records(&mut self, table: &str, query: &Query) -> Result<Vec<Fields>, StoreError>;

    fn get_record_by_id(
        &mut self,
        table: &str,
        id: i64,
        fields: &[String],
    ) -> Result<Option<Fields>, StoreError>;

    fn create_records(
        &mut self,
        table: &str,
        records: Vec<Fields>,
    ) -> Result<Vec<RecordResult>, StoreError>;

    /// Each record carries its `id`; fields are merged into the stored row.
    fn update_records(
        &mut self,
        table: &str,
        records: Vec<Fields>,
    ) -> Result<Vec<RecordResult>, StoreError>;

    fn delete_records(&mut self, table: &str, ids: &[i64])
        -> Result<Vec<RecordResult>, StoreError>;

    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Adapts a [`RecordTable`] to the [`Backend`] contract.
pub struct TableBackend<T> {
    table: T,
}

impl<T: RecordTable> TableBackend<T> {
    pub fn new(table: T) -> Self {
        Self { table }
    }

    #[cfg(test)]
    pub fn table(&self) -> &T {
        &self.table
    }

    fn field_list(collection: &str) -> Vec<String> {
        model::fields_for(collection)
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn log_failures(op: &str, collection: &str, results: &[RecordResult]) {
        for r in results.iter().filter(|r| !r.success) {
            log::warn!(
                "{} {} failed for record {:?}: {}",
                op,
                collection,
                r.id,
                r.message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    fn single(
        op: &str,
        collection: &str,
        results: Vec<RecordResult>,
    ) -> Result<RecordResult, StoreError> {
        Self::log_failures(op, collection, &results);
        let Some(first) = results.into_iter().next() else {
            return Err(StoreError::Table(format!(
                "{op} {collection}: empty response"
            )));
        };
        if !first.success {
            return Err(StoreError::Table(format!(
                "{op} {collection}: {}",
                first.message.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(first)
    }
}

impl<T: RecordTable> Backend for TableBackend<T> {
    fn kind(&self) -> &'static str {
        "table"
    }

    fn get_all(&mut self, collection: &str) -> Result<Vec<Fields>, StoreError> {
        let query = Query {
            fields: Self::field_list(collection),
            order_by: vec![OrderBy {
                field: "id".into(),
                direction: SortDirection::Asc,
            }],
            ..Query::default()
        };
        self.table.fetch_records(collection, &query)
    }

    fn get_by_id(&mut self, collection: &str, id: i64) -> Result<Fields, StoreError> {
        self.table
            .get_record_by_id(collection, id, &Self::field_list(collection))?
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    fn create(&mut self, collection: &str, mut fields: Fields) -> Result<Fields, StoreError> {
        fields.remove("id");
        let results = self.table.create_records(collection, vec![fields])?;
        let created = Self::single("create", collection, results)?;
        match (created.data, created.id) {
            (Some(data), _) => Ok(data),
            (None, Some(id)) => self.get_by_id(collection, id),
            (None, None) => Err(StoreError::Table(format!(
                "create {collection}: response without id"
            ))),
        }
    }

    fn update(
        &mut self,
        collection: &str,
        id: i64,
        mut fields: Fields,
    ) -> Result<Fields, StoreError> {
        // The table reports a missing row as a generic failure; check first so
        // callers get NotFound.
        self.get_by_id(collection, id)?;
        fields.insert("id".into(), serde_json::json!(id));
        let results = self.table.update_records(collection, vec![fields])?;
        let updated = Self::single("update", collection, results)?;
        match updated.data {
            Some(data) => Ok(data),
            None => self.get_by_id(collection, id),
        }
    }

    fn delete(&mut self, collection: &str, id: i64) -> Result<bool, StoreError> {
        self.get_by_id(collection, id)?;
        let results = self.table.delete_records(collection, &[id])?;
        Self::single("delete", collection, results)?;
        Ok(true)
    }

    fn query(&mut self, collection: &str, query: &Query) -> Result<Vec<Fields>, StoreError> {
        query.validate()?;
        if query.fields.is_empty() {
            let mut q = query.clone();
            q.fields = Self::field_list(collection);
            return self.table.fetch_records(collection, &q);
        }
        self.table.fetch_records(collection, query)
    }

    fn delete_many(&mut self, collection: &str, ids: &[i64]) -> Result<BatchOutcome, StoreError> {
        let results = self.table.delete_records(collection, ids)?;
        Self::log_failures("delete", collection, &results);
        let mut outcome = BatchOutcome::default();
        for (idx, r) in results.into_iter().enumerate() {
            let id = r.id.or_else(|| ids.get(idx).copied()).unwrap_or_default();
            if r.success {
                outcome.deleted.push(id);
            } else {
                outcome.failed.push(BatchFailure {
                    id,
                    message: r.message.unwrap_or_else(|| "unknown error".into()),
                });
            }
        }
        Ok(outcome)
    }

    fn workspace(&self) -> Option<&Path> {
        self.table.location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{record_id, MemoryBackend};
    use serde_json::json;

    /// Table double that fails every write touching a configured id.
    struct FlakyTable {
        inner: MemoryBackend,
        poisoned: Vec<i64>,
        last_fields: Vec<String>,
    }

    impl RecordTable for FlakyTable {
        fn fetch_records(
            &mut self,
            table: &str,
            query: &Query,
        ) -> Result<Vec<Fields>, StoreError> {
            self.last_fields = query.fields.clone();
            self.inner.query(table, query)
        }

        fn get_record_by_id(
            &mut self,
            table: &str,
            id: i64,
            fields: &[String],
        ) -> Result<Option<Fields>, StoreError> {
            self.last_fields = fields.to_vec();
            match self.inner.get_by_id(table, id) {
                Ok(f) => Ok(Some(f)),
                Err(StoreError::NotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        }

        fn create_records(
            &mut self,
            table: &str,
            records: Vec<Fields>,
        ) -> Result<Vec<RecordResult>, StoreError> {
            records
                .into_iter()
                .map(|r| {
                    let created = self.inner.create(table, r)?;
                    let id = record_id(&created).unwrap_or_default();
                    Ok(RecordResult::ok(id, Some(created)))
                })
                .collect()
        }

        fn update_records(
            &mut self,
            table: &str,
            records: Vec<Fields>,
        ) -> Result<Vec<RecordResult>, StoreError> {
            records
                .into_iter()
                .map(|r| {
                    let id = record_id(&r).unwrap_or_default();
                    if self.poisoned.contains(&id) {
                        return Ok(RecordResult::failed(Some(id), "row locked"));
                    }
                    let updated = self.inner.update(table, id, r)?;
                    Ok(RecordResult::ok(id, Some(updated)))
                })
                .collect()
        }

        fn delete_records(
            &mut self,
            table: &str,
            ids: &[i64],
        ) -> Result<Vec<RecordResult>, StoreError> {
            Ok(ids
                .iter()
                .map(|&id| {
                    if self.poisoned.contains(&id) {
                        return RecordResult::failed(Some(id), "row locked");
                    }
                    match self.inner.delete(table, id) {
                        Ok(_) => RecordResult::ok(id, None),
                        Err(e) => RecordResult::failed(Some(id), e.to_string()),
                    }
                })
                .collect())
        }
    }

    fn backend(poisoned: Vec<i64>) -> TableBackend<FlakyTable> {
        let inner = MemoryBackend::from_seed(json!({
            "grades": [
                { "id": 1, "score": 10 },
                { "id": 2, "score": 12 }
            ]
        }))
        .expect("seed");
        TableBackend::new(FlakyTable {
            inner,
            poisoned,
            last_fields: Vec::new(),
        })
    }

    fn fields(v: serde_json::Value) -> Fields {
        match v {
            serde_json::Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn reads_send_the_declared_field_list() {
        let mut b = backend(vec![]);
        b.get_all("grades").expect("all");
        assert_eq!(
            b.table().last_fields,
            model::fields_for("grades")
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn update_of_missing_row_is_not_found() {
        let mut b = backend(vec![]);
        let err = b
            .update("grades", 9, fields(json!({ "score": 1 })))
            .expect_err("missing");
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), "Grade not found");
    }

    #[test]
    fn failed_single_write_surfaces_table_error() {
        let mut b = backend(vec![2]);
        let err = b
            .update("grades", 2, fields(json!({ "score": 1 })))
            .expect_err("locked");
        assert_eq!(err.code(), "table_request_failed");
        assert!(err.to_string().contains("row locked"));
    }

    #[test]
    fn batch_delete_reports_partial_failures() {
        let mut b = backend(vec![2]);
        let outcome = b.delete_many("grades", &[1, 2, 3]).expect("batch");
        assert_eq!(outcome.deleted, vec![1]);
        let failed: Vec<i64> = outcome.failed.iter().map(|f| f.id).collect();
        assert_eq!(failed, vec![2, 3]);
    }

    #[test]
    fn create_ignores_caller_id() {
        let mut b = backend(vec![]);
        let created = b
            .create("grades", fields(json!({ "id": 1, "score": 3 })))
            .expect("create");
        assert_eq!(record_id(&created), Some(3));
    }
}
