use crate::analytics;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{as_of, required_id, respond, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assignment, AttendanceRecord, Grade, Student};
use crate::store::Repo;
use serde_json::{json, Value};

struct Snapshot {
    students: Vec<Student>,
    attendance: Vec<AttendanceRecord>,
    grades: Vec<Grade>,
    assignments: Vec<Assignment>,
}

/// Reads the four collections one after another; any failure fails the
/// whole request.
fn load_snapshot(state: &mut AppState) -> Result<Snapshot, HandlerErr> {
    let store = state.store.as_mut();
    Ok(Snapshot {
        students: Repo::<Student>::new(&mut *store).get_all()?,
        attendance: Repo::<AttendanceRecord>::new(&mut *store).get_all()?,
        grades: Repo::<Grade>::new(&mut *store).get_all()?,
        assignments: Repo::<Assignment>::new(&mut *store).get_all()?,
    })
}

fn dashboard_summary(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let as_of = as_of(params)?;
    let window_days = state.settings.recent_window_days;
    let snap = load_snapshot(state)?;
    let stats = analytics::dashboard_stats(
        &snap.students,
        &snap.attendance,
        &snap.grades,
        &snap.assignments,
        as_of,
        window_days,
    );
    let activity = analytics::recent_activity(
        &snap.students,
        &snap.attendance,
        &snap.grades,
        &snap.assignments,
    );
    Ok(json!({
        "stats": to_json(&stats)?,
        "recentActivity": to_json(&activity)?,
    }))
}

fn performance_student(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_id(params, "studentId")?;
    let student = Repo::<Student>::new(state.store.as_mut()).get_by_id(student_id)?;
    let snap = load_snapshot(state)?;
    let grades: Vec<Grade> = snap
        .grades
        .into_iter()
        .filter(|g| g.student_id == student_id)
        .collect();
    let attendance: Vec<AttendanceRecord> = snap
        .attendance
        .into_iter()
        .filter(|r| r.student_id == student_id)
        .collect();
    let perf = analytics::student_performance(&grades, &attendance, &snap.assignments);
    let mut result = to_json(&perf)?;
    result["student"] = to_json(&student)?;
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "dashboard.summary" => dashboard_summary(state, &req.params),
        "performance.student" => performance_student(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
