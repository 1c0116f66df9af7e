use crate::store::{
    is_field_name, record_id, Fields, Query, RecordResult, RecordTable, SortDirection, StoreError,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const DB_FILE: &str = "classroom.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS records(
            collection TEXT NOT NULL,
            id INTEGER NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            updated_at TEXT,
            PRIMARY KEY(collection, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn json_to_sql(v: &Value) -> Option<SqlValue> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(SqlValue::Integer(i)),
            None => Some(SqlValue::Real(n.as_f64().unwrap_or(0.0))),
        },
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Some(SqlValue::Text(v.to_string())),
    }
}

fn column_expr(field: &str) -> String {
    if field == "id" {
        "id".to_string()
    } else {
        format!("json_extract(data, '$.{}')", field)
    }
}

fn decode_row(id: i64, data: &str) -> Result<Fields, StoreError> {
    let mut fields: Fields = match serde_json::from_str(data)? {
        Value::Object(m) => m,
        _ => Fields::new(),
    };
    fields.insert("id".into(), json!(id));
    Ok(fields)
}

fn project(fields: Fields, selection: &[String]) -> Fields {
    if selection.is_empty() {
        return fields;
    }
    fields
        .into_iter()
        .filter(|(k, _)| k == "id" || selection.iter().any(|s| s == k))
        .collect()
}

/// Workspace-local record table: every collection lives in one `records`
/// table as JSON documents keyed by (collection, id).
pub struct SqliteTable {
    conn: Connection,
    workspace: PathBuf,
}

impl SqliteTable {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = open_db(workspace)?;
        Ok(Self {
            conn,
            workspace: workspace.to_path_buf(),
        })
    }

    fn load(&self, table: &str, id: i64) -> Result<Option<Fields>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE collection = ? AND id = ?",
                (table, id),
                |r| r.get(0),
            )
            .optional()?;
        raw.map(|d| decode_row(id, &d)).transpose()
    }

    fn insert_one(&self, table: &str, mut fields: Fields) -> Result<Fields, StoreError> {
        fields.remove("id");
        let id: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM records WHERE collection = ?",
            [table],
            |r| r.get(0),
        )?;
        let data = serde_json::to_string(&Value::Object(fields.clone()))?;
        self.conn.execute(
            "INSERT INTO records(collection, id, data) VALUES(?, ?, ?)",
            (table, id, &data),
        )?;
        fields.insert("id".into(), json!(id));
        Ok(fields)
    }

    fn update_one(&self, table: &str, id: i64, patch: Fields) -> Result<Option<Fields>, StoreError> {
        let Some(mut existing) = self.load(table, id)? else {
            return Ok(None);
        };
        for (k, v) in patch {
            if k != "id" {
                existing.insert(k, v);
            }
        }
        let mut stored = existing.clone();
        stored.remove("id");
        let data = serde_json::to_string(&Value::Object(stored))?;
        self.conn.execute(
            "UPDATE records
             SET data = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE collection = ? AND id = ?",
            (&data, table, id),
        )?;
        Ok(Some(existing))
    }
}

impl RecordTable for SqliteTable {
    fn fetch_records(&mut self, table: &str, query: &Query) -> Result<Vec<Fields>, StoreError> {
        query.validate()?;

        let mut sql = String::from("SELECT id, data FROM records WHERE collection = ?");
        let mut params: Vec<SqlValue> = vec![SqlValue::Text(table.to_string())];
        for f in &query.filters {
            match json_to_sql(&f.value) {
                None => {
                    sql.push_str(&format!(" AND {} IS NULL", column_expr(&f.field)));
                }
                Some(v) => {
                    sql.push_str(&format!(" AND {} = ?", column_expr(&f.field)));
                    params.push(v);
                }
            }
        }

        let mut order: Vec<String> = query
            .order_by
            .iter()
            .map(|o| {
                let dir = match o.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{} {}", column_expr(&o.field), dir)
            })
            .collect();
        order.push("id ASC".to_string());
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        match (query.limit, query.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(SqlValue::Integer(limit as i64));
                params.push(SqlValue::Integer(offset.unwrap_or(0) as i64));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(SqlValue::Integer(offset as i64));
            }
            (None, None) => {}
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, data)| decode_row(id, &data).map(|f| project(f, &query.fields)))
            .collect()
    }

    fn get_record_by_id(
        &mut self,
        table: &str,
        id: i64,
        fields: &[String],
    ) -> Result<Option<Fields>, StoreError> {
        for f in fields {
            if !is_field_name(f) {
                return Err(StoreError::Invalid(format!("invalid field name: {f}")));
            }
        }
        Ok(self.load(table, id)?.map(|f| project(f, fields)))
    }

    fn create_records(
        &mut self,
        table: &str,
        records: Vec<Fields>,
    ) -> Result<Vec<RecordResult>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut results = Vec::with_capacity(records.len());
        for fields in records {
            match self.insert_one(table, fields) {
                Ok(created) => {
                    let id = record_id(&created).unwrap_or_default();
                    results.push(RecordResult::ok(id, Some(created)));
                }
                Err(e) => results.push(RecordResult::failed(None, e.to_string())),
            }
        }
        tx.commit()?;
        Ok(results)
    }

    fn update_records(
        &mut self,
        table: &str,
        records: Vec<Fields>,
    ) -> Result<Vec<RecordResult>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut results = Vec::with_capacity(records.len());
        for fields in records {
            let Some(id) = record_id(&fields) else {
                results.push(RecordResult::failed(None, "record without id"));
                continue;
            };
            match self.update_one(table, id, fields) {
                Ok(Some(updated)) => results.push(RecordResult::ok(id, Some(updated))),
                Ok(None) => results.push(RecordResult::failed(Some(id), "record not found")),
                Err(e) => results.push(RecordResult::failed(Some(id), e.to_string())),
            }
        }
        tx.commit()?;
        Ok(results)
    }

    fn delete_records(
        &mut self,
        table: &str,
        ids: &[i64],
    ) -> Result<Vec<RecordResult>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.conn.execute(
                "DELETE FROM records WHERE collection = ? AND id = ?",
                (table, id),
            ) {
                Ok(0) => results.push(RecordResult::failed(Some(id), "record not found")),
                Ok(_) => results.push(RecordResult::ok(id, None)),
                Err(e) => results.push(RecordResult::failed(Some(id), e.to_string())),
            }
        }
        tx.commit()?;
        Ok(results)
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.workspace)
    }
}
