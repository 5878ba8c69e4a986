use monitor_core::{ErrorExt, StateError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Read `path` as JSON, falling back to `T::default()`.
///
/// A corrupt file is moved aside to `<name>.corrupt` and a warning is logged;
/// the caller carries on with the default value.
pub fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No state file yet, starting fresh");
            return T::default();
        }
        Err(e) => {
            StateError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .log_warn();
            return T::default();
        }
    };

    match serde_json::from_str(&data) {
        Ok(value) => value,
        Err(e) => {
            StateError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .log_warn();

            let aside = sibling(path, ".corrupt");
            if let Err(rename_err) = fs::rename(path, &aside) {
                warn!(path = %path.display(), error = %rename_err, "Could not move corrupt state file aside");
            }
            T::default()
        }
    }
}

/// Write `value` to `path` so that a crash leaves either the old or the new
/// file, never a partial one.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let write_failed = |source: std::io::Error| StateError::WriteFailed {
        path: path.display().to_string(),
        source,
    };

    let data = serde_json::to_vec_pretty(value).map_err(|source| StateError::Encode {
        path: path.display().to_string(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_failed)?;
    }

    let tmp = sibling(path, ".tmp");
    let mut file = fs::File::create(&tmp).map_err(write_failed)?;
    file.write_all(&data).map_err(write_failed)?;
    file.sync_all().map_err(write_failed)?;
    drop(file);

    fs::rename(&tmp, path).map_err(write_failed)
}
