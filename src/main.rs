mod analytics;
mod backup;
mod calc;
mod config;
mod db;
mod ipc;
mod model;
mod store;
mod validate;

use config::{BackendKind, Config};
use env_logger::Env;
use std::io::{self, BufRead, Write};
use store::{Backend, MemoryBackend};

fn memory_store(config: &Config) -> Box<dyn Backend> {
    let Some(seed) = config.seed_path.as_deref() else {
        return Box::new(MemoryBackend::new());
    };
    match MemoryBackend::load_seed_file(seed) {
        Ok(b) => Box::new(b),
        Err(e) => {
            log::error!("seed ignored: {e:#}");
            Box::new(MemoryBackend::new())
        }
    }
}

fn initial_state(config: Config) -> ipc::AppState {
    let workspace = match (config.backend, config.workspace.clone()) {
        (BackendKind::Table, Some(ws)) => Some(ws),
        _ => None,
    };
    let Some(ws) = workspace else {
        let store = memory_store(&config);
        return ipc::AppState::new(config, store);
    };
    match ipc::open_table_store(&ws) {
        Ok(store) => {
            log::info!("record table opened at {}", ws.to_string_lossy());
            let mut state = ipc::AppState::new(config, store);
            state.settings = ipc::load_workspace_settings(&ws, state.config.settings);
            state
        }
        Err(e) => {
            log::error!(
                "failed to open workspace {}: {e:#}; using memory store",
                ws.to_string_lossy()
            );
            let store = memory_store(&config);
            ipc::AppState::new(config, store)
        }
    }
}

fn main() {
    // stdout carries the IPC channel; logs go to stderr.
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = Config::from_env();
    let mut state = initial_state(config);
    log::info!(
        "classroomd {} ready ({} store)",
        env!("CARGO_PKG_VERSION"),
        state.store.kind()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("stdin closed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                log::warn!("bad request line: {e}");
                serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                })
            }
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
