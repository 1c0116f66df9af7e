use crate::config::Settings;
use crate::db::{self, SqliteTable};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{optional_str, required_object, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::store::{Backend, MemoryBackend, TableBackend};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const SETTINGS_KEY: &str = "classroom.settings";

fn health(state: &mut AppState) -> Result<Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.store.kind(),
        "workspacePath": state.workspace().map(|p| p.to_string_lossy().to_string()),
    }))
}

/// Start-up settings overlaid with whatever the workspace has persisted.
/// A corrupt settings row must not prevent the workspace from opening.
pub fn load_workspace_settings(workspace: &Path, base: Settings) -> Settings {
    let mut settings = base;
    match db::open_db(workspace).and_then(|conn| db::settings_get_json(&conn, SETTINGS_KEY)) {
        Ok(Some(saved)) => settings.apply(&saved),
        Ok(None) => {}
        Err(e) => log::warn!("ignoring workspace settings: {e:#}"),
    }
    settings
}

pub fn open_table_store(workspace: &Path) -> anyhow::Result<Box<dyn Backend>> {
    let table = SqliteTable::open(workspace)?;
    Ok(Box::new(TableBackend::new(table)))
}

fn workspace_select(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let path = PathBuf::from(required_str(params, "path")?);
    let store = open_table_store(&path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    state.store = store;
    state.settings = load_workspace_settings(&path, state.config.settings);
    log::info!("workspace selected: {}", path.to_string_lossy());
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "backend": state.store.kind(),
    }))
}

fn workspace_use_memory(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let seed = optional_str(params, "seedPath")
        .map(PathBuf::from)
        .or_else(|| state.config.seed_path.clone());
    let store = match seed {
        Some(p) => MemoryBackend::load_seed_file(&p)
            .map_err(|e| HandlerErr::bad_params(format!("{e:#}")))?,
        None => MemoryBackend::new(),
    };
    state.store = Box::new(store);
    state.settings = state.config.settings;
    log::info!("switched to in-memory store");
    Ok(json!({ "backend": state.store.kind() }))
}

fn settings_get(state: &mut AppState) -> Result<Value, HandlerErr> {
    Ok(json!({ "settings": state.settings }))
}

fn settings_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let patch = Value::Object(required_object(params, "patch")?);
    let mut next = state.settings;
    next.apply(&patch);
    if let Some(ws) = state.workspace() {
        let saved = serde_json::to_value(next)?;
        db::open_db(ws)
            .and_then(|conn| db::settings_set_json(&conn, SETTINGS_KEY, &saved))
            .map_err(|e| {
                HandlerErr::new("db_update_failed", format!("{e:#}"))
                    .with_details(json!({ "table": "settings" }))
            })?;
    }
    state.settings = next;
    Ok(json!({ "settings": state.settings }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "health" => health(state),
        "workspace.select" => workspace_select(state, &req.params),
        "workspace.useMemory" => workspace_use_memory(state, &req.params),
        "settings.get" => settings_get(state),
        "settings.update" => settings_update(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
