use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .env_remove("CLASSROOMD_BACKEND")
        .env_remove("CLASSROOMD_WORKSPACE")
        .env_remove("CLASSROOMD_SEED")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classroomd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("classroom-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(&mut stdin, &mut reader, "2", "settings.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "student": {
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "ada@example.com",
                "gradeLevel": "10",
                "enrollmentDate": "2024-09-01"
            }
        }),
    );
    let _ = request(&mut stdin, &mut reader, "4", "students.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.create",
        json!({
            "assignment": {
                "title": "Essay",
                "category": "homework",
                "points": 10,
                "dueDate": "2024-09-20"
            }
        }),
    );
    let _ = request(&mut stdin, &mut reader, "6", "assignments.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "grades.save",
        json!({ "studentId": 1, "assignmentId": 1, "score": 9 }),
    );
    let _ = request(&mut stdin, &mut reader, "8", "grades.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "grades.studentAverage",
        json!({ "studentId": 1 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.toggle",
        json!({ "studentId": 1, "date": "2024-09-16" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.dayStats",
        json!({ "date": "2024-09-16" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "attendance.month",
        json!({ "month": "2024-09" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "parentContacts.create",
        json!({
            "contact": {
                "studentId": 1,
                "parentName": "Anne Byron",
                "email": "anne@example.com",
                "phone": "555-0100"
            }
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "communications.add",
        json!({ "parentContactId": 1, "communication": { "message": "Hello" } }),
    );
    let _ = request(&mut stdin, &mut reader, "15", "communications.all", json!({}));
    let _ = request(&mut stdin, &mut reader, "16", "dashboard.summary", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "performance.student",
        json!({ "studentId": 1 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "records.query",
        json!({ "collection": "students" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "21", "workspace.useMemory", json!({}));

    let unknown = json!({ "id": "22", "method": "students.teleport", "params": {} });
    writeln!(stdin, "{}", unknown).expect("write unknown");
    stdin.flush().expect("flush unknown");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read unknown response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], json!("not_implemented"));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse json");
    assert_eq!(value["error"]["code"], json!("bad_json"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
