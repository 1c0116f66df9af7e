use crate::backup;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::core::open_table_store;
use crate::ipc::helpers::{required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::store::MemoryBackend;
use serde_json::{json, Value};
use std::path::PathBuf;

fn workspace_path(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state
        .workspace()
        .map(|p| p.to_path_buf())
        .ok_or_else(HandlerErr::no_workspace)
}

fn export_bundle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let workspace = workspace_path(state)?;
    let out_path = PathBuf::from(required_str(params, "outPath")?);
    let summary = backup::export_workspace_bundle(&workspace, &out_path)
        .map_err(|e| HandlerErr::new("backup_export_failed", format!("{e:#}")))?;
    log::info!(
        "exported bundle {} to {}",
        summary.bundle_id,
        out_path.to_string_lossy()
    );
    Ok(json!({
        "ok": true,
        "path": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "bundleId": summary.bundle_id,
        "dbSha256": summary.db_sha256,
        "entryCount": summary.entry_count,
    }))
}

/// The open connection is released before the database file is replaced and
/// the workspace is reopened afterwards, whether or not the import worked.
fn import_bundle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let workspace = workspace_path(state)?;
    let in_path = PathBuf::from(required_str(params, "inPath")?);

    state.store = Box::new(MemoryBackend::new());
    let imported = backup::import_workspace_bundle(&in_path, &workspace);
    let reopened = open_table_store(&workspace);

    match reopened {
        Ok(store) => state.store = store,
        Err(e) => {
            log::error!(
                "failed to reopen workspace {}: {e:#}",
                workspace.to_string_lossy()
            );
            return Err(HandlerErr::new("db_open_failed", format!("{e:#}")));
        }
    }
    let summary =
        imported.map_err(|e| HandlerErr::new("backup_import_failed", format!("{e:#}")))?;
    log::info!("imported {} into {}", in_path.to_string_lossy(), workspace.to_string_lossy());
    Ok(json!({
        "ok": true,
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": summary.bundle_format_detected,
        "bundleId": summary.bundle_id,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => export_bundle(state, &req.params),
        "backup.importWorkspaceBundle" => import_bundle(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
