use crate::calc::{self, GradeSummary};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{optional_id, required_id, required_object, respond, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::{iso_date, Assignment, Grade, Student};
use crate::store::Repo;
use crate::validate;
use chrono::Utc;
use serde_json::{json, Map, Value};

fn grades_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = optional_id(params, "studentId")?;
    let assignment_id = optional_id(params, "assignmentId")?;
    let grades: Vec<Grade> = Repo::<Grade>::new(state.store.as_mut())
        .get_all()?
        .into_iter()
        .filter(|g| student_id.map_or(true, |id| g.student_id == id))
        .filter(|g| assignment_id.map_or(true, |id| g.assignment_id == id))
        .collect();
    Ok(json!({ "grades": to_json(&grades)? }))
}

fn grades_get(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let grade = Repo::<Grade>::new(state.store.as_mut()).get_by_id(id)?;
    Ok(json!({ "grade": to_json(&grade)? }))
}

fn grades_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let fields = required_object(params, "grade")?;
    let grade = Repo::<Grade>::new(state.store.as_mut()).create(fields)?;
    Ok(json!({ "grade": to_json(&grade)? }))
}

fn grades_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let patch = required_object(params, "patch")?;
    let grade = Repo::<Grade>::new(state.store.as_mut()).update(id, patch)?;
    Ok(json!({ "grade": to_json(&grade)? }))
}

fn grades_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let deleted = Repo::<Grade>::new(state.store.as_mut()).delete(id)?;
    Ok(json!({ "deleted": deleted }))
}

/// Grade entry from the gradebook grid: one grade per (student, assignment),
/// score checked against the assignment's points.
fn grades_save(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_id(params, "studentId")?;
    let assignment_id = required_id(params, "assignmentId")?;

    let assignment = Repo::<Assignment>::new(state.store.as_mut()).get_by_id(assignment_id)?;
    let score = validate::grade_score(params.get("score"), assignment.points).map_err(|msg| {
        HandlerErr::new("validation_failed", msg.clone())
            .with_details(json!({ "fields": { "score": msg } }))
    })?;

    let now = iso_date::to_iso(&Utc::now());
    let mut grades = Repo::<Grade>::new(state.store.as_mut());
    let existing = grades
        .get_all()?
        .into_iter()
        .find(|g| g.student_id == student_id && g.assignment_id == assignment_id);

    let mut fields = Map::new();
    fields.insert("score".into(), json!(score));
    fields.insert("submittedDate".into(), json!(now));
    if let Some(c) = params.get("comments").and_then(|v| v.as_str()) {
        fields.insert("comments".into(), json!(c));
    }

    let (grade, created) = match existing {
        Some(g) => (grades.update(g.id, fields)?, false),
        None => {
            fields.insert("studentId".into(), json!(student_id));
            fields.insert("assignmentId".into(), json!(assignment_id));
            (grades.create(fields)?, true)
        }
    };
    log::debug!(
        "grade saved for student {} on assignment {} ({})",
        student_id,
        assignment_id,
        if created { "created" } else { "updated" }
    );

    Ok(json!({
        "grade": to_json(&grade)?,
        "created": created,
        "summary": to_json(&GradeSummary::from_scores(grade.score, assignment.points))?,
    }))
}

fn grades_student_average(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_id(params, "studentId")?;
    Repo::<Student>::new(state.store.as_mut()).get_by_id(student_id)?;
    let grades = Repo::<Grade>::new(state.store.as_mut()).get_all()?;
    let assignments = Repo::<Assignment>::new(state.store.as_mut()).get_all()?;
    to_json(&calc::student_average(student_id, &grades, &assignments))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "grades.list" => grades_list(state, &req.params),
        "grades.get" => grades_get(state, &req.params),
        "grades.create" => grades_create(state, &req.params),
        "grades.update" => grades_update(state, &req.params),
        "grades.delete" => grades_delete(state, &req.params),
        "grades.save" => grades_save(state, &req.params),
        "grades.studentAverage" => grades_student_average(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
