use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes `text` beside `path` and renames it into place, so readers never
/// observe a half-written capture.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let staging_path = staging_path_for(path);
    fs::write(&staging_path, text.as_bytes())?;
    if let Err(error) = fs::rename(&staging_path, path) {
        let _ = fs::remove_file(&staging_path);
        return Err(error);
    }
    Ok(())
}

fn staging_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("capture");
    let staging_name = format!(".{file_name}.partial");
    match path.parent() {
        Some(parent) => parent.join(staging_name),
        None => PathBuf::from(staging_name),
    }
}
