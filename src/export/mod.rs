pub mod downloads;
pub mod folder;
pub mod fs;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::storage::models::FolderHandle;

/// Name of the folder the export lands in, both beneath a user-chosen
/// folder and beneath the downloads root.
pub const CANONICAL_FOLDER_NAME: &str = "Clippings";

/// Destination that receives the full rendered document, replacing
/// whatever it held before.
pub trait ExportSink {
    fn write_document(&self, document: &str) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    /// Not granted, but an interactive request may still succeed.
    Prompt,
    Denied,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Permission::Granted => "granted",
            Permission::Prompt => "prompt",
            Permission::Denied => "denied",
        })
    }
}

/// Platform folder-access API.
pub trait FolderAuthority {
    /// Non-interactive check of the current grant.
    fn query_permission(&self, handle: &FolderHandle) -> Permission;
    /// Interactive request. Only call this from a user-gesture surface.
    fn request_permission(&self, handle: &FolderHandle) -> Permission;
    fn get_or_create_dir(&self, parent: &FolderHandle, name: &str) -> Result<FolderHandle>;
    /// Creates or truncates `name` inside the folder and writes `contents`.
    fn write_file(&self, handle: &FolderHandle, name: &str, contents: &str) -> Result<PathBuf>;
}

/// User-driven folder picker. `Ok(None)` means the user cancelled.
pub trait DirectoryPicker {
    fn pick(&self) -> Result<Option<FolderHandle>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptAnswer {
    Grant,
    /// Cancelled, or the surface was closed before answering.
    Cancel,
}

/// A surface that can ask the user to re-grant folder access.
pub trait PermissionPrompt {
    fn confirm(&self, folder_name: &str) -> PromptAnswer;
}

/// A prompt the user already answered on another surface.
pub struct AnsweredPrompt(pub PromptAnswer);

impl PermissionPrompt for AnsweredPrompt {
    fn confirm(&self, _folder_name: &str) -> PromptAnswer {
        self.0
    }
}
