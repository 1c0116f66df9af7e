use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DUE_SOON_DAYS: i64 = 3;
pub const DEFAULT_RECENT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Table,
}

/// Tunables that workspaces may override through their `settings` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub due_soon_days: i64,
    pub recent_window_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            due_soon_days: DEFAULT_DUE_SOON_DAYS,
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
        }
    }
}

impl Settings {
    /// Applies the recognised keys of a JSON patch; invalid values are ignored.
    pub fn apply(&mut self, patch: &serde_json::Value) {
        if let Some(v) = patch
            .get("dueSoonDays")
            .and_then(|v| v.as_i64())
            .filter(|v| *v >= 0)
        {
            self.due_soon_days = v;
        }
        if let Some(v) = patch
            .get("recentWindowDays")
            .and_then(|v| v.as_i64())
            .filter(|v| *v > 0)
        {
            self.recent_window_days = v;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,
    pub workspace: Option<PathBuf>,
    pub seed_path: Option<PathBuf>,
    pub settings: Settings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            workspace: None,
            seed_path: None,
            settings: Settings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Config::default();
        let non_empty = |k: &str| lookup(k).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        match non_empty("CLASSROOMD_BACKEND").as_deref() {
            None | Some("memory") => {}
            Some("table") => cfg.backend = BackendKind::Table,
            Some(other) => log::warn!("unknown CLASSROOMD_BACKEND {:?}; using memory", other),
        }
        cfg.workspace = non_empty("CLASSROOMD_WORKSPACE").map(PathBuf::from);
        cfg.seed_path = non_empty("CLASSROOMD_SEED").map(PathBuf::from);

        if cfg.backend == BackendKind::Table && cfg.workspace.is_none() {
            log::warn!("CLASSROOMD_BACKEND=table without CLASSROOMD_WORKSPACE; using memory");
            cfg.backend = BackendKind::Memory;
        }

        if let Some(raw) = non_empty("CLASSROOMD_DUE_SOON_DAYS") {
            match raw.parse::<i64>() {
                Ok(v) if v >= 0 => cfg.settings.due_soon_days = v,
                _ => log::warn!("ignoring CLASSROOMD_DUE_SOON_DAYS={:?}", raw),
            }
        }
        if let Some(raw) = non_empty("CLASSROOMD_RECENT_WINDOW_DAYS") {
            match raw.parse::<i64>() {
                Ok(v) if v > 0 => cfg.settings.recent_window_days = v,
                _ => log::warn!("ignoring CLASSROOMD_RECENT_WINDOW_DAYS={:?}", raw),
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_to_memory_backend() {
        let c = cfg(&[]);
        assert_eq!(c.backend, BackendKind::Memory);
        assert_eq!(c.settings, Settings::default());
    }

    #[test]
    fn table_backend_requires_workspace() {
        assert_eq!(cfg(&[("CLASSROOMD_BACKEND", "table")]).backend, BackendKind::Memory);
        let c = cfg(&[
            ("CLASSROOMD_BACKEND", "table"),
            ("CLASSROOMD_WORKSPACE", "/tmp/ws"),
        ]);
        assert_eq!(c.backend, BackendKind::Table);
        assert_eq!(c.workspace, Some(PathBuf::from("/tmp/ws")));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let c = cfg(&[
            ("CLASSROOMD_DUE_SOON_DAYS", "soon"),
            ("CLASSROOMD_RECENT_WINDOW_DAYS", "14"),
        ]);
        assert_eq!(c.settings.due_soon_days, DEFAULT_DUE_SOON_DAYS);
        assert_eq!(c.settings.recent_window_days, 14);
    }

    #[test]
    fn settings_patch_ignores_bad_values() {
        let mut s = Settings::default();
        s.apply(&serde_json::json!({ "dueSoonDays": 5, "recentWindowDays": 0 }));
        assert_eq!(s.due_soon_days, 5);
        assert_eq!(s.recent_window_days, DEFAULT_RECENT_WINDOW_DAYS);
    }
}
