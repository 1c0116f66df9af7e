use crate::analytics;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    optional_day, optional_id, required_day, required_id, required_object, required_str, respond,
    to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{iso_date, AttendanceRecord, AttendanceStatus, Student};
use crate::store::Repo;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

fn parse_month_key(month: &str) -> Result<(i32, u32), HandlerErr> {
    let Some((y, m)) = month.trim().split_once('-') else {
        return Err(HandlerErr::bad_params("month must be YYYY-MM"));
    };
    let year = y
        .parse::<i32>()
        .map_err(|_| HandlerErr::bad_params("month year must be numeric"))?;
    let month_num = m
        .parse::<u32>()
        .map_err(|_| HandlerErr::bad_params("month must be YYYY-MM"))?;
    if !(1..=12).contains(&month_num) {
        return Err(HandlerErr::bad_params("month must be between 01 and 12"));
    }
    Ok((year, month_num))
}

fn parse_status(params: &Value) -> Result<Option<AttendanceStatus>, HandlerErr> {
    match params.get("status") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            AttendanceStatus::parse_mark(Some(s.as_str())).map_err(HandlerErr::bad_params)
        }
        Some(_) => Err(HandlerErr::bad_params("status must be a string or null")),
    }
}

fn find_for_day(
    state: &mut AppState,
    student_id: i64,
    day: NaiveDate,
) -> Result<Option<AttendanceRecord>, HandlerErr> {
    Ok(Repo::<AttendanceRecord>::new(state.store.as_mut())
        .get_all()?
        .into_iter()
        .find(|r| r.student_id == student_id && r.date.date_naive() == day))
}

fn day_start_iso(day: NaiveDate) -> String {
    let start = day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    iso_date::to_iso(&start)
}

/// Find-then-replace keeps at most one record per student and day; `None`
/// removes the day's record.
fn apply_mark(
    state: &mut AppState,
    student_id: i64,
    day: NaiveDate,
    status: Option<AttendanceStatus>,
    course_id: Option<i64>,
) -> Result<Value, HandlerErr> {
    let existing = find_for_day(state, student_id, day)?;
    let mut repo = Repo::<AttendanceRecord>::new(state.store.as_mut());

    let Some(status) = status else {
        let action = match existing {
            Some(r) => {
                repo.delete(r.id)?;
                "removed"
            }
            None => "unchanged",
        };
        return Ok(json!({ "record": null, "status": null, "action": action }));
    };

    let mut fields = Map::new();
    fields.insert("status".into(), json!(status.as_str()));
    fields.insert("date".into(), json!(day_start_iso(day)));
    if let Some(c) = course_id {
        fields.insert("courseId".into(), json!(c));
    }
    let (record, action) = match existing {
        Some(r) => (repo.update(r.id, fields)?, "updated"),
        None => {
            fields.insert("studentId".into(), json!(student_id));
            (repo.create(fields)?, "created")
        }
    };
    Ok(json!({
        "record": to_json(&record)?,
        "status": status.as_str(),
        "action": action,
    }))
}

fn attendance_mark(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_id(params, "studentId")?;
    let day = required_day(params, "date")?;
    let status = parse_status(params)?;
    let course_id = optional_id(params, "courseId")?;
    Repo::<Student>::new(state.store.as_mut()).get_by_id(student_id)?;
    apply_mark(state, student_id, day, status, course_id)
}

fn attendance_toggle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_id(params, "studentId")?;
    let day = required_day(params, "date")?;
    let course_id = optional_id(params, "courseId")?;
    Repo::<Student>::new(state.store.as_mut()).get_by_id(student_id)?;
    let current = find_for_day(state, student_id, day)?.map(|r| r.status);
    let next = AttendanceStatus::next(current);
    apply_mark(state, student_id, day, next, course_id)
}

fn attendance_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = optional_id(params, "studentId")?;
    let day = optional_day(params, "date")?;
    let records: Vec<AttendanceRecord> = Repo::<AttendanceRecord>::new(state.store.as_mut())
        .get_all()?
        .into_iter()
        .filter(|r| student_id.map_or(true, |id| r.student_id == id))
        .filter(|r| day.map_or(true, |d| r.date.date_naive() == d))
        .collect();
    Ok(json!({ "records": to_json(&records)? }))
}

fn attendance_get(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let record = Repo::<AttendanceRecord>::new(state.store.as_mut()).get_by_id(id)?;
    Ok(json!({ "record": to_json(&record)? }))
}

fn attendance_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let fields = required_object(params, "record")?;
    let record = Repo::<AttendanceRecord>::new(state.store.as_mut()).create(fields)?;
    Ok(json!({ "record": to_json(&record)? }))
}

fn attendance_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let patch = required_object(params, "patch")?;
    let record = Repo::<AttendanceRecord>::new(state.store.as_mut()).update(id, patch)?;
    Ok(json!({ "record": to_json(&record)? }))
}

fn attendance_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let deleted = Repo::<AttendanceRecord>::new(state.store.as_mut()).delete(id)?;
    Ok(json!({ "deleted": deleted }))
}

fn attendance_day_stats(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let day = required_day(params, "date")?;
    let students = Repo::<Student>::new(state.store.as_mut()).get_all()?;
    let attendance = Repo::<AttendanceRecord>::new(state.store.as_mut()).get_all()?;
    to_json(&analytics::day_stats(day, &students, &attendance))
}

fn attendance_month(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (year, month) = parse_month_key(required_str(params, "month")?)?;
    let students = Repo::<Student>::new(state.store.as_mut()).get_all()?;
    let attendance = Repo::<AttendanceRecord>::new(state.store.as_mut()).get_all()?;
    to_json(&analytics::month_view(year, month, &students, &attendance))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "attendance.list" => attendance_list(state, &req.params),
        "attendance.get" => attendance_get(state, &req.params),
        "attendance.create" => attendance_create(state, &req.params),
        "attendance.update" => attendance_update(state, &req.params),
        "attendance.delete" => attendance_delete(state, &req.params),
        "attendance.mark" => attendance_mark(state, &req.params),
        "attendance.toggle" => attendance_toggle(state, &req.params),
        "attendance.dayStats" => attendance_day_stats(state, &req.params),
        "attendance.month" => attendance_month(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_keys_must_be_year_and_month() {
        assert_eq!(parse_month_key("2024-09").unwrap(), (2024, 9));
        assert_eq!(parse_month_key(" 2025-12 ").unwrap(), (2025, 12));
        assert!(parse_month_key("09").is_err());
        assert!(parse_month_key("2024-13").is_err());
    }

    #[test]
    fn status_param_accepts_null_and_names() {
        assert_eq!(parse_status(&json!({})).unwrap(), None);
        assert_eq!(parse_status(&json!({ "status": null })).unwrap(), None);
        assert_eq!(
            parse_status(&json!({ "status": "excused" })).unwrap(),
            Some(AttendanceStatus::Excused)
        );
        assert!(parse_status(&json!({ "status": 3 })).is_err());
    }

    #[test]
    fn marks_are_stored_at_day_start() {
        let day = NaiveDate::from_ymd_opt(2024, 9, 16).unwrap();
        assert_eq!(day_start_iso(day), "2024-09-16T00:00:00.000Z");
    }
}
