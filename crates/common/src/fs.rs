use std::{
    io::{self, Write},
    path::Path,
};

/// Write `data` to `path` atomically via a uniquely named sibling temp file
/// and a rename.
///
/// Parent directories are created as needed. Readers either see the previous
/// contents or the new contents, never a truncated file, and concurrent
/// writers never share a temp file.
pub fn write_atomic(path: &Path, data: impl AsRef<[u8]>) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data.as_ref())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    tracing::trace!(path = %path.display(), "wrote file atomically");
    Ok(())
}
