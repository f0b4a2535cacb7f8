//! Upload directory and scoped scratch files

use crate::error::{MediaError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Use `dir` for uploads, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path component of a client supplied name
    pub fn sanitize(filename: &str) -> Result<String> {
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::trim)
            .unwrap_or_default();
        if name.is_empty() || name == "." || name == ".." {
            return Err(MediaError::InvalidPayload(format!("invalid filename {:?}", filename)));
        }
        Ok(name.to_string())
    }

    /// Write an upload, replacing any file of the same name
    pub fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(Self::sanitize(filename)?);
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "stored upload");
        Ok(path)
    }

    /// Path of a previously stored upload
    pub fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let name = Self::sanitize(filename)?;
        let path = self.dir.join(&name);
        if !path.is_file() {
            return Err(MediaError::NotFound(name));
        }
        Ok(path)
    }

    /// Temp file in the upload directory holding `bytes`; removed when dropped
    pub fn scratch(&self, extension: &str, bytes: &[u8]) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("reentry-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(&self.dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_final_component() {
        assert_eq!(UploadStore::sanitize("notes.txt").unwrap(), "notes.txt");
        assert_eq!(UploadStore::sanitize("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(UploadStore::sanitize("dir/mesh.off").unwrap(), "mesh.off");
        assert!(UploadStore::sanitize("").is_err());
        assert!(UploadStore::sanitize("..").is_err());
        assert!(UploadStore::sanitize("/").is_err());
    }

    #[test]
    fn test_save_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path().join("uploads")).unwrap();

        let saved = store.save("a.txt", b"hello").unwrap();
        assert_eq!(store.resolve("a.txt").unwrap(), saved);
        assert_eq!(fs::read(&saved).unwrap(), b"hello");
        assert!(matches!(store.resolve("missing.txt"), Err(MediaError::NotFound(_))));
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).unwrap();

        let scratch = store.scratch("png", b"data").unwrap();
        let path = scratch.path().to_path_buf();
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(fs::read(&path).unwrap(), b"data");
        drop(scratch);
        assert!(!path.exists());
    }
}
