// crates/core/src/endpoint.rs
//! Last-used service endpoint, persisted best-effort.
//!
//! Storage is injected as a pair of load/save functions. Read failures fall
//! back to the default, write failures are logged and otherwise ignored.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8345";

/// Key the endpoint is stored under.
pub const ENDPOINT_STORAGE_KEY: &str = "stemsmith.apiBase";

type LoadFn = dyn Fn() -> Result<Option<String>, String> + Send + Sync;
type SaveFn = dyn Fn(&str) -> Result<(), String> + Send + Sync;

#[derive(Clone)]
pub struct EndpointStore {
    load: Arc<LoadFn>,
    save: Arc<SaveFn>,
}

impl EndpointStore {
    pub fn from_fns<L, S>(load: L, save: S) -> Self
    where
        L: Fn() -> Result<Option<String>, String> + Send + Sync + 'static,
        S: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            load: Arc::new(load),
            save: Arc::new(save),
        }
    }

    /// JSON preferences file holding the endpoint under
    /// [`ENDPOINT_STORAGE_KEY`]. Other keys in the file are preserved.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        let path: Arc<Path> = Arc::from(path);
        let read_path = Arc::clone(&path);
        Self::from_fns(
            move || read_key(&read_path),
            move |value| write_key(&path, value),
        )
    }

    /// Process-local store that forgets everything on exit.
    pub fn in_memory(initial: Option<String>) -> Self {
        let cell = Arc::new(Mutex::new(initial));
        let reader = Arc::clone(&cell);
        Self::from_fns(
            move || {
                reader
                    .lock()
                    .map(|v| v.clone())
                    .map_err(|_| "preference cell poisoned".to_string())
            },
            move |value| {
                cell.lock()
                    .map(|mut v| *v = Some(value.to_string()))
                    .map_err(|_| "preference cell poisoned".to_string())
            },
        )
    }

    /// The stored endpoint, or [`DEFAULT_ENDPOINT`] if nothing usable is stored.
    pub fn load_or_default(&self) -> String {
        match (self.load)() {
            Ok(Some(v)) if !v.trim().is_empty() => v.trim().to_string(),
            Ok(_) => DEFAULT_ENDPOINT.to_string(),
            Err(e) => {
                tracing::debug!(error = %e, "could not read saved endpoint, using default");
                DEFAULT_ENDPOINT.to_string()
            }
        }
    }

    /// Remember `endpoint` for next time.
    pub fn save(&self, endpoint: &str) {
        if let Err(e) = (self.save)(endpoint) {
            tracing::warn!(endpoint, error = %e, "could not persist endpoint");
        }
    }
}

impl std::fmt::Debug for EndpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointStore").finish_non_exhaustive()
    }
}

fn read_prefs(path: &Path) -> Result<Map<String, Value>, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(format!("{}: {e}", path.display())),
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!("{}: not a JSON object", path.display())),
        Err(e) => Err(format!("{}: {e}", path.display())),
    }
}

fn read_key(path: &Path) -> Result<Option<String>, String> {
    let prefs = read_prefs(path)?;
    Ok(prefs
        .get(ENDPOINT_STORAGE_KEY)
        .and_then(Value::as_str)
        .map(str::to_string))
}

fn write_key(path: &Path, value: &str) -> Result<(), String> {
    // A corrupt file is replaced rather than blocking the save.
    let mut prefs = read_prefs(path).unwrap_or_default();
    prefs.insert(ENDPOINT_STORAGE_KEY.to_string(), Value::String(value.to_string()));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("{}: {e}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(&Value::Object(prefs)).map_err(|e| e.to_string())?;
    std::fs::write(path, body).map_err(|e| format!("{}: {e}", path.display()))
}
