//! Temp-file-then-rename replacement.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::{Error, Result};

/// Replace `path` with `contents` atomically.
pub fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    replace_file_with(path, |file| file.write_all(contents))
}

/// Replace `path` with whatever `write` produces.
///
/// The temp file lives next to `path` so the final rename stays on one
/// filesystem. If `write` fails the temp file is removed and `path` is untouched.
pub fn replace_file_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir).map_err(Error::io(dir))?;

    write(temp.as_file_mut()).map_err(Error::io(temp.path()))?;
    temp.as_file().sync_all().map_err(Error::io(temp.path()))?;
    if let Ok(metadata) = std::fs::metadata(path) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(Error::io(path))?;
    }

    temp.persist(path).map_err(|err| Error::Persist {
        path: path.display().to_string(),
        source: err.error,
    })?;
    debug!(path = %path.display(), "Replaced file");
    Ok(())
}
