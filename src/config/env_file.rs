/// Persisting single keys into the `.env` file written by the admin page.
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Set `key` to `value`, replacing an existing assignment or appending one.
/// The file is created when missing and replaced atomically.
pub fn set_key(path: &Path, key: &str, value: &str) -> io::Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let assignment = format!("{key}={}", quote(value));
    let mut replaced = false;
    let mut lines = Vec::new();
    for line in existing.lines() {
        if assigns(line, key) {
            if !replaced {
                lines.push(assignment.clone());
                replaced = true;
            }
            continue;
        }
        lines.push(line.to_string());
    }
    if !replaced {
        lines.push(assignment);
    }

    let mut contents = lines.join("\n");
    contents.push('\n');

    let tmp = temp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    info!("Saved {} to {}", key, path.display());
    Ok(())
}

/// Current value of `key` in the file, if any
pub fn read_key(path: &Path, key: &str) -> Option<String> {
    dotenvy::from_path_iter(path)
        .ok()?
        .filter_map(Result::ok)
        .filter(|(k, _)| k == key)
        .last()
        .map(|(_, v)| v)
}

fn assigns(line: &str, key: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    line.strip_prefix(key)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

fn quote(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".env".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
