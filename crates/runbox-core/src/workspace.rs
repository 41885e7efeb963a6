//! Host-side workspace directory shared with the container

use crate::Result;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write content to a file atomically using a temp-file-then-rename pattern.
///
/// The container may be reading the previous script while we replace it;
/// a rename never exposes a half-written file.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.persist(path).map_err(|e| e.error)?;

    // NamedTempFile is created 0600; the container user must be able to read it
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))?;
    }
    Ok(())
}

/// Write user source code to `<dir>/<name>`, creating the directory if needed
pub fn write_script(dir: &Path, name: &str, source: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);

    let mut content = source.to_string();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    atomic_write(&path, content.as_bytes())?;

    tracing::debug!("Wrote {} bytes of user code to {}", content.len(), path.display());
    Ok(path)
}
