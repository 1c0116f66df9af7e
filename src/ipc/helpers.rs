use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{iso_date, Record};
use crate::store::{Fields, Repo};
use crate::validate::FieldErrors;

pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            log::warn!("{} failed: {} ({})", req.method, e.message, e.code);
            e.response(&req.id)
        }
    }
}

pub fn to_json<T: Serialize>(v: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr::new("encode_failed", e.to_string()))
}

pub fn id_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Integer id; numeric strings are accepted the way route params arrive.
pub fn required_id(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(id_value)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_id(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => id_value(v)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer id", key))),
    }
}

pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_object(params: &Value, key: &str) -> Result<Fields, HandlerErr> {
    match params.get(key) {
        Some(Value::Object(m)) => Ok(m.clone()),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be an object", key))),
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

fn parse_date(raw: &str, key: &str) -> Result<DateTime<Utc>, HandlerErr> {
    iso_date::parse(raw).ok_or_else(|| HandlerErr::bad_params(format!("invalid {}: {}", key, raw)))
}

/// Reference instant for time-relative metrics; defaults to now.
pub fn as_of(params: &Value) -> Result<DateTime<Utc>, HandlerErr> {
    match optional_str(params, "asOf") {
        Some(raw) => parse_date(raw, "asOf"),
        None => Ok(Utc::now()),
    }
}

/// Calendar day (UTC) of a date or timestamp parameter.
pub fn required_day(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = required_str(params, key)?;
    Ok(parse_date(raw, key)?.date_naive())
}

pub fn optional_day(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match optional_str(params, key) {
        Some(raw) => Ok(Some(parse_date(raw, key)?.date_naive())),
        None => Ok(None),
    }
}

pub fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Validates the full form, then stores it.
pub fn create_checked<R: Record>(
    state: &mut AppState,
    fields: Fields,
    check: fn(&Fields) -> FieldErrors,
) -> Result<R, HandlerErr> {
    HandlerErr::check(check(&fields))?;
    Ok(Repo::<R>::new(state.store.as_mut()).create(fields)?)
}

/// Validates the stored record with `patch` applied, then stores the merge.
pub fn update_checked<R: Record>(
    state: &mut AppState,
    id: i64,
    patch: Fields,
    check: fn(&Fields) -> FieldErrors,
) -> Result<R, HandlerErr> {
    let mut merged = state.store.get_by_id(R::COLLECTION, id)?;
    for (k, v) in &patch {
        merged.insert(k.clone(), v.clone());
    }
    HandlerErr::check(check(&merged))?;
    Ok(Repo::<R>::new(state.store.as_mut()).update(id, patch)?)
}
