use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{ClipError, Result};
use crate::storage::models::FolderHandle;
use super::{DirectoryPicker, FolderAuthority, Permission};

/// Folder authority backed by the local filesystem. A folder counts as
/// granted while it exists and is writable.
#[derive(Debug, Default)]
pub struct FsFolderAuthority;

fn writable_dir(path: &Path) -> Permission {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => Permission::Granted,
        Ok(meta) if meta.is_dir() => Permission::Denied,
        _ => Permission::Prompt,
    }
}

impl FolderAuthority for FsFolderAuthority {
    fn query_permission(&self, handle: &FolderHandle) -> Permission {
        writable_dir(&handle.path)
    }

    fn request_permission(&self, handle: &FolderHandle) -> Permission {
        if !handle.path.exists() {
            if let Err(e) = fs::create_dir_all(&handle.path) {
                tracing::warn!(path = %handle.path.display(), error = %e, "could not recreate folder");
                return Permission::Denied;
            }
        }
        match writable_dir(&handle.path) {
            Permission::Granted => Permission::Granted,
            _ => Permission::Denied,
        }
    }

    fn get_or_create_dir(&self, parent: &FolderHandle, name: &str) -> Result<FolderHandle> {
        let path = parent.path.join(name);
        fs::create_dir_all(&path)?;
        Ok(FolderHandle {
            name: name.to_string(),
            path,
        })
    }

    fn write_file(&self, handle: &FolderHandle, name: &str, contents: &str) -> Result<PathBuf> {
        if !handle.path.is_dir() {
            return Err(ClipError::Folder(format!(
                "{} is not a directory",
                handle.path.display()
            )));
        }
        let path = handle.path.join(name);
        let mut file = fs::File::create(&path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        Ok(path)
    }
}

/// Picker for a folder already named on the command line.
pub struct PathPicker {
    path: PathBuf,
}

impl PathPicker {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DirectoryPicker for PathPicker {
    fn pick(&self) -> Result<Option<FolderHandle>> {
        let path = fs::canonicalize(&self.path)
            .map_err(|e| ClipError::Folder(format!("{}: {}", self.path.display(), e)))?;
        if !path.is_dir() {
            return Err(ClipError::Folder(format!("{} is not a directory", path.display())));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Some(FolderHandle { name, path }))
    }
}
