use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    contains_ci, create_checked, optional_str, required_id, required_object, respond, to_json,
    update_checked,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Student, StudentStatus};
use crate::store::{compare_values, is_field_name, Repo, SortDirection};
use crate::validate;
use serde_json::{json, Value};

fn matches_search(s: &Student, needle: &str) -> bool {
    contains_ci(&s.full_name(), needle)
        || contains_ci(&s.email, needle)
        || contains_ci(&s.grade_level, needle)
}

fn lowered(v: &Value) -> Value {
    match v {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other.clone(),
    }
}

/// Table sort: any field of the wire form, strings compared lowercase.
fn sort_rows(rows: &mut [Value], field: &str, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let va = lowered(a.get(field).unwrap_or(&Value::Null));
        let vb = lowered(b.get(field).unwrap_or(&Value::Null));
        let ord = compare_values(&va, &vb);
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
        .then_with(|| {
            let ia = a.get("id").and_then(|v| v.as_i64());
            let ib = b.get("id").and_then(|v| v.as_i64());
            ia.cmp(&ib)
        })
    });
}

fn parse_direction(raw: Option<&str>) -> Result<SortDirection, HandlerErr> {
    match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
        None | Some("asc") => Ok(SortDirection::Asc),
        Some("desc") => Ok(SortDirection::Desc),
        Some(other) => Err(HandlerErr::bad_params(format!(
            "sortDirection must be asc or desc, got {}",
            other
        ))),
    }
}

fn students_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let needle = optional_str(params, "search").map(str::to_lowercase);
    let status = match optional_str(params, "status") {
        None | Some("all") => None,
        Some("active") => Some(StudentStatus::Active),
        Some("inactive") => Some(StudentStatus::Inactive),
        Some(other) => return Err(HandlerErr::bad_params(format!("unknown status: {}", other))),
    };
    let direction = parse_direction(optional_str(params, "sortDirection"))?;

    let students: Vec<Student> = Repo::<Student>::new(state.store.as_mut())
        .get_all()?
        .into_iter()
        .filter(|s| needle.as_deref().map_or(true, |n| matches_search(s, n)))
        .filter(|s| status.map_or(true, |st| s.status == st))
        .collect();

    let mut rows: Vec<Value> = students.iter().map(to_json).collect::<Result<_, _>>()?;
    if let Some(field) = optional_str(params, "sortField") {
        if !is_field_name(field) {
            return Err(HandlerErr::bad_params(format!("invalid sortField: {}", field)));
        }
        sort_rows(&mut rows, field, direction);
    }
    Ok(json!({ "students": rows }))
}

fn students_get(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let student = Repo::<Student>::new(state.store.as_mut()).get_by_id(id)?;
    Ok(json!({ "student": to_json(&student)? }))
}

fn students_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let fields = required_object(params, "student")?;
    let student: Student = create_checked(state, fields, validate::student)?;
    log::info!("student {} created", student.id);
    Ok(json!({ "student": to_json(&student)? }))
}

fn students_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let patch = required_object(params, "patch")?;
    let student: Student = update_checked(state, id, patch, validate::student)?;
    Ok(json!({ "student": to_json(&student)? }))
}

fn students_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let deleted = Repo::<Student>::new(state.store.as_mut()).delete(id)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, &req.params),
        "students.get" => students_get(state, &req.params),
        "students.create" => students_create(state, &req.params),
        "students.update" => students_update(state, &req.params),
        "students.delete" => students_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn sort_is_case_insensitive_with_id_tiebreak() {
        let mut rows = vec![
            json!({ "id": 1, "lastName": "baker" }),
            json!({ "id": 2, "lastName": "Adams" }),
            json!({ "id": 3, "lastName": "adams" }),
        ];
        sort_rows(&mut rows, "lastName", SortDirection::Asc);
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        sort_rows(&mut rows, "lastName", SortDirection::Desc);
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn direction_defaults_to_ascending() {
        assert_eq!(parse_direction(None).unwrap(), SortDirection::Asc);
        assert_eq!(parse_direction(Some("DESC")).unwrap(), SortDirection::Desc);
        assert!(parse_direction(Some("up")).is_err());
    }

    #[test]
    fn ordering_helper_is_total() {
        assert_eq!(
            compare_values(&lowered(&json!("B")), &lowered(&json!("a"))),
            Ordering::Greater
        );
    }
}
