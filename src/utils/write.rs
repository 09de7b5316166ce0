//! Compare-before-write persistence helpers.
//!
//! Every file this crate persists goes through here: content is compared
//! with what is on disk and only written when it differs.

use std::fs;
use std::io;
use std::path::Path;

/// What a write call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// File did not exist and was created.
    Created,
    /// File existed with different content.
    Updated,
    /// File already had this content; nothing written.
    Unchanged,
}

impl WriteStatus {
    pub fn is_written(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Check if file content is the same as new content
pub fn content_matches(path: &Path, content: &[u8]) -> bool {
    fs::read(path).is_ok_and(|existing| existing == content)
}

/// Write `content` unless the file already holds exactly these bytes.
pub fn write_if_changed(path: &Path, content: impl AsRef<[u8]>) -> io::Result<WriteStatus> {
    let content = content.as_ref();
    let existed = path.exists();
    if existed && content_matches(path, content) {
        return Ok(WriteStatus::Unchanged);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;

    Ok(if existed {
        WriteStatus::Updated
    } else {
        WriteStatus::Created
    })
}

/// Like [`write_if_changed`], but replaces the file through a temp file
/// and rename so readers never observe a half-written file.
pub fn write_atomic_if_changed(path: &Path, content: impl AsRef<[u8]>) -> io::Result<WriteStatus> {
    let content = content.as_ref();
    let existed = path.exists();
    if existed && content_matches(path, content) {
        return Ok(WriteStatus::Unchanged);
    }

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.tmp"));
    fs::write(&tmp, content)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    Ok(if existed {
        WriteStatus::Updated
    } else {
        WriteStatus::Created
    })
}

/// Probe whether `dir` accepts writes (creating it if needed).
pub fn is_writable(dir: &Path) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".splitbuild-write-probe");
    let ok = fs::write(&probe, b"").is_ok();
    let _ = fs::remove_file(&probe);
    ok
}
