use crate::analytics;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    as_of, contains_ci, create_checked, optional_str, required_id, required_object, respond,
    to_json, update_checked,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assignment, AssignmentCategory, Grade};
use crate::store::{Fields, Repo};
use crate::validate;
use serde_json::{json, Value};

/// Form inputs submit points as text and categories in display case.
fn coerce_form(fields: &mut Fields) {
    if let Some(p) = validate::number(fields.get("points")) {
        fields.insert("points".into(), json!(p));
    }
    let category = fields
        .get("category")
        .and_then(Value::as_str)
        .and_then(AssignmentCategory::parse);
    if let Some(c) = category {
        fields.insert("category".into(), json!(c.as_str()));
    }
}

fn matches_search(a: &Assignment, needle: &str) -> bool {
    contains_ci(&a.title, needle)
        || contains_ci(a.category.as_str(), needle)
        || contains_ci(&a.description, needle)
}

fn assignments_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let needle = optional_str(params, "search").map(str::to_lowercase);
    let now = as_of(params)?;
    let due_soon_days = state.settings.due_soon_days;

    let assignments = Repo::<Assignment>::new(state.store.as_mut()).get_all()?;
    let grades = Repo::<Grade>::new(state.store.as_mut()).get_all()?;

    let mut rows = Vec::new();
    for a in assignments
        .iter()
        .filter(|a| needle.as_deref().map_or(true, |n| matches_search(a, n)))
    {
        let grade_count = grades.iter().filter(|g| g.assignment_id == a.id).count();
        let status = analytics::assignment_status(a.due_date, grade_count > 0, now, due_soon_days);
        let mut row = to_json(a)?;
        row["gradeCount"] = json!(grade_count);
        row["status"] = to_json(&status)?;
        rows.push(row);
    }
    Ok(json!({ "assignments": rows }))
}

fn assignments_get(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let assignment = Repo::<Assignment>::new(state.store.as_mut()).get_by_id(id)?;
    Ok(json!({ "assignment": to_json(&assignment)? }))
}

fn assignments_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let mut fields = required_object(params, "assignment")?;
    coerce_form(&mut fields);
    let assignment: Assignment = create_checked(state, fields, validate::assignment)?;
    log::info!("assignment {} created", assignment.id);
    Ok(json!({ "assignment": to_json(&assignment)? }))
}

fn assignments_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let mut patch = required_object(params, "patch")?;
    coerce_form(&mut patch);
    let assignment: Assignment = update_checked(state, id, patch, validate::assignment)?;
    Ok(json!({ "assignment": to_json(&assignment)? }))
}

fn assignments_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let deleted = Repo::<Assignment>::new(state.store.as_mut()).delete(id)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "assignments.list" => assignments_list(state, &req.params),
        "assignments.get" => assignments_get(state, &req.params),
        "assignments.create" => assignments_create(state, &req.params),
        "assignments.update" => assignments_update(state, &req.params),
        "assignments.delete" => assignments_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
