use std::fs;
use std::path::PathBuf;

use crate::errors::Result;
use crate::render::DOCUMENT_FILE_NAME;
use super::{CANONICAL_FOLDER_NAME, ExportSink};

/// Fallback sink: always available, writes to a fixed path under the
/// downloads root and overwrites any previous export.
pub struct DownloadsSink {
    root: PathBuf,
}

impl DownloadsSink {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn target(&self) -> PathBuf {
        self.root.join(CANONICAL_FOLDER_NAME).join(DOCUMENT_FILE_NAME)
    }
}

impl ExportSink for DownloadsSink {
    fn write_document(&self, document: &str) -> Result<PathBuf> {
        let target = self.target();
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, document)?;
        tracing::info!(path = %target.display(), bytes = document.len(), "exported to downloads");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_target_is_fixed_relative_path() {
        let sink = DownloadsSink::new(PathBuf::from("/tmp/dl"));
        assert_eq!(sink.target(), PathBuf::from("/tmp/dl/Clippings/clippings.md"));
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let sink = DownloadsSink::new(dir.path().to_path_buf());
        let path = sink.write_document("# Clippings\n\n").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "# Clippings\n\n");
    }

    #[test]
    fn test_write_overwrites() {
        let dir = TempDir::new().unwrap();
        let sink = DownloadsSink::new(dir.path().to_path_buf());
        sink.write_document("a much longer first document").unwrap();
        let path = sink.write_document("short").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "short");
    }
}
