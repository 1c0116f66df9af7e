pub mod memory;
pub mod table;

use crate::model::{self, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::path::Path;

pub use memory::MemoryBackend;
pub use table::{RecordResult, RecordTable, TableBackend};

pub type Fields = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{0}")]
    Invalid(String),
    #[error("record table request failed: {0}")]
    Table(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: i64) -> Self {
        StoreError::NotFound {
            entity: model::entity_name(collection),
            id,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Invalid(_) | StoreError::Json(_) => "bad_params",
            StoreError::Table(_) => "table_request_failed",
            StoreError::Db(_) => "db_query_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Field selection, equality filters, sort and paging window for a
/// collection read.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    pub fn validate(&self) -> Result<(), StoreError> {
        let names = self
            .fields
            .iter()
            .chain(self.filters.iter().map(|f| &f.field))
            .chain(self.order_by.iter().map(|o| &o.field));
        for name in names {
            if !is_field_name(name) {
                return Err(StoreError::Invalid(format!("invalid field name: {name}")));
            }
        }
        Ok(())
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|f| {
            let v = fields.get(&f.field).unwrap_or(&Value::Null);
            values_equal(v, &f.value)
        })
    }

    /// Keeps the selected fields (plus `id`). An empty selection keeps all.
    pub fn project(&self, fields: Fields) -> Fields {
        if self.fields.is_empty() {
            return fields;
        }
        fields
            .into_iter()
            .filter(|(k, _)| k == "id" || self.fields.iter().any(|f| f == k))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub deleted: Vec<i64>,
    pub failed: Vec<BatchFailure>,
}

/// Storage contract shared by the in-memory store and the record table.
pub trait Backend {
    fn kind(&self) -> &'static str;

    fn get_all(&mut self, collection: &str) -> Result<Vec<Fields>, StoreError>;

    fn get_by_id(&mut self, collection: &str, id: i64) -> Result<Fields, StoreError>;

    /// Stores a new record; the backend assigns `id`.
    fn create(&mut self, collection: &str, fields: Fields) -> Result<Fields, StoreError>;

    /// Shallow-merges `fields` into the stored record.
    fn update(&mut self, collection: &str, id: i64, fields: Fields)
        -> Result<Fields, StoreError>;

    fn delete(&mut self, collection: &str, id: i64) -> Result<bool, StoreError>;

    fn query(&mut self, collection: &str, query: &Query) -> Result<Vec<Fields>, StoreError>;

    fn delete_many(&mut self, collection: &str, ids: &[i64]) -> Result<BatchOutcome, StoreError>;

    fn workspace(&self) -> Option<&Path> {
        None
    }
}

pub fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn record_id(fields: &Fields) -> Option<i64> {
    fields.get("id").and_then(|v| v.as_i64())
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Bool(x), Value::Number(y)) | (Value::Number(y), Value::Bool(x)) => {
            y.as_f64() == Some(if *x { 1.0 } else { 0.0 })
        }
        _ => a == b,
    }
}

fn sort_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) | Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
    }
}

fn as_number(v: &Value) -> f64 {
    match v {
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Total order over JSON values: null < numbers/bools < strings < composites.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (sort_rank(a), sort_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Array(_) | Value::Object(_), _) => a.to_string().cmp(&b.to_string()),
        _ => as_number(a)
            .partial_cmp(&as_number(b))
            .unwrap_or(Ordering::Equal),
    }
}

pub fn compare_records(order_by: &[OrderBy], a: &Fields, b: &Fields) -> Ordering {
    for o in order_by {
        let va = a.get(&o.field).unwrap_or(&Value::Null);
        let vb = b.get(&o.field).unwrap_or(&Value::Null);
        let ord = compare_values(va, vb);
        let ord = match o.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    record_id(a).cmp(&record_id(b))
}

fn decode<R: Record>(fields: Fields) -> Result<R, StoreError> {
    Ok(serde_json::from_value(Value::Object(fields))?)
}

fn encode<R: Record>(record: &R) -> Result<Fields, StoreError> {
    match serde_json::to_value(record)? {
        Value::Object(mut m) => {
            m.remove("id");
            Ok(m)
        }
        _ => Err(StoreError::Invalid(format!(
            "{} did not encode as an object",
            model::entity_name(R::COLLECTION)
        ))),
    }
}

/// Round-trips form fields through `R` so only well-formed, canonically
/// encoded records reach the backend.
fn normalize<R: Record>(fields: Fields) -> Result<Fields, StoreError> {
    let record: R = serde_json::from_value(Value::Object(fields)).map_err(|e| {
        StoreError::Invalid(format!(
            "invalid {}: {}",
            model::entity_name(R::COLLECTION).to_ascii_lowercase(),
            e
        ))
    })?;
    encode(&record)
}

/// Typed access to one collection.
pub struct Repo<'a, R> {
    backend: &'a mut dyn Backend,
    marker: PhantomData<R>,
}

impl<'a, R: Record> Repo<'a, R> {
    pub fn new(backend: &'a mut dyn Backend) -> Self {
        Self {
            backend,
            marker: PhantomData,
        }
    }

    pub fn get_all(&mut self) -> Result<Vec<R>, StoreError> {
        self.backend
            .get_all(R::COLLECTION)?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub fn get_by_id(&mut self, id: i64) -> Result<R, StoreError> {
        decode(self.backend.get_by_id(R::COLLECTION, id)?)
    }

    pub fn create(&mut self, fields: Fields) -> Result<R, StoreError> {
        let normalized = normalize::<R>(fields)?;
        let record: R = decode(self.backend.create(R::COLLECTION, normalized)?)?;
        log::debug!("created {} {}", R::COLLECTION, record.id());
        Ok(record)
    }

    /// Merges `patch` over the stored record. Nothing is written when the id
    /// is unknown or the merged record does not decode.
    pub fn update(&mut self, id: i64, patch: Fields) -> Result<R, StoreError> {
        let mut merged = self.backend.get_by_id(R::COLLECTION, id)?;
        let patched: Vec<String> = patch.keys().filter(|k| *k != "id").cloned().collect();
        for (k, v) in patch {
            if k != "id" {
                merged.insert(k, v);
            }
        }
        let mut normalized = normalize::<R>(merged)?;
        // Cleared optionals encode as absent; backends merge, so overwrite with null.
        for k in patched {
            normalized.entry(k).or_insert(Value::Null);
        }
        let stored = self.backend.update(R::COLLECTION, id, normalized)?;
        log::debug!("updated {} {}", R::COLLECTION, id);
        decode(stored)
    }

    pub fn delete(&mut self, id: i64) -> Result<bool, StoreError> {
        let deleted = self.backend.delete(R::COLLECTION, id)?;
        log::debug!("deleted {} {}", R::COLLECTION, id);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Assignment, AttendanceRecord, AttendanceStatus, Student};
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn ada() -> Fields {
        fields(json!({
            "id": 40,
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "gradeLevel": "9",
            "enrollmentDate": "2024-09-01",
            "photoUrl": "ada.png"
        }))
    }

    #[test]
    fn create_ignores_supplied_id_and_stores_canonical_dates() {
        let mut backend = MemoryBackend::new();
        let student = Repo::<Student>::new(&mut backend).create(ada()).expect("create");
        assert_eq!(student.id, 1);

        let raw = backend.get_by_id(model::STUDENTS, 1).expect("raw row");
        assert_eq!(raw["enrollmentDate"], json!("2024-09-01T00:00:00.000Z"));
        assert_eq!(raw["status"], json!("active"));
        assert_eq!(raw["id"], json!(1));
    }

    #[test]
    fn undecodable_merge_leaves_stored_row_intact() {
        let mut backend = MemoryBackend::new();
        Repo::<Student>::new(&mut backend).create(ada()).expect("create");
        let before = backend.get_by_id(model::STUDENTS, 1).expect("before");

        let err = Repo::<Student>::new(&mut backend)
            .update(1, fields(json!({ "enrollmentDate": "garbage", "lastName": "Byron" })))
            .expect_err("bad date");
        assert_eq!(err.code(), "bad_params");
        assert_eq!(backend.get_by_id(model::STUDENTS, 1).expect("after"), before);

        let mark = Repo::<AttendanceRecord>::new(&mut backend)
            .create(fields(json!({ "studentId": 1, "date": "2024-09-16", "status": "present" })))
            .expect("mark");
        let err = Repo::<AttendanceRecord>::new(&mut backend)
            .update(mark.id, fields(json!({ "status": "late" })))
            .expect_err("unknown status");
        assert_eq!(err.code(), "bad_params");
        let kept = Repo::<AttendanceRecord>::new(&mut backend)
            .get_by_id(mark.id)
            .expect("mark");
        assert_eq!(kept.status, AttendanceStatus::Present);
    }

    #[test]
    fn update_of_unknown_id_is_not_found() {
        let mut backend = MemoryBackend::new();
        let err = Repo::<Student>::new(&mut backend)
            .update(9, fields(json!({ "firstName": "Nobody" })))
            .expect_err("missing");
        assert_eq!(err.code(), "not_found");
        assert!(backend.get_all(model::STUDENTS).expect("all").is_empty());
    }

    #[test]
    fn null_patch_clears_optional_fields() {
        let mut backend = MemoryBackend::new();
        let mut students = Repo::<Student>::new(&mut backend);
        students.create(ada()).expect("create");
        let cleared = students
            .update(1, fields(json!({ "photoUrl": null })))
            .expect("clear photo");
        assert_eq!(cleared.photo_url, None);
        assert_eq!(students.get_by_id(1).expect("reread").photo_url, None);
        assert_eq!(students.get_by_id(1).expect("reread").last_name, "Lovelace");

        let mut assignments = Repo::<Assignment>::new(&mut backend);
        let created = assignments
            .create(fields(json!({
                "title": "Lab",
                "category": "project",
                "points": 50,
                "dueDate": "2024-09-20",
                "courseId": 3
            })))
            .expect("assignment");
        assert_eq!(created.course_id, Some(3));
        let cleared = assignments
            .update(created.id, fields(json!({ "courseId": null, "id": 77 })))
            .expect("clear course");
        assert_eq!(cleared.id, created.id);
        assert_eq!(cleared.course_id, None);
        assert_eq!(assignments.get_by_id(created.id).expect("reread").course_id, None);
    }
}
