use std::path::PathBuf;

use chrono::Utc;

use crate::errors::Result;
use crate::render::DOCUMENT_FILE_NAME;
use crate::storage::FolderRecord;
use crate::storage::models::FolderHandle;
use super::{CANONICAL_FOLDER_NAME, DirectoryPicker, FolderAuthority, Permission, PermissionPrompt, PromptAnswer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderState {
    Unconfigured,
    Requesting,
    Authorized,
    Writing,
    PermissionLapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    /// No folder has been chosen.
    NoHandle,
    /// The grant lapsed and no prompt surface was available.
    NeedsPrompt,
    /// The prompt was dismissed; the handle is kept and nothing was written.
    Abandoned,
    /// Denied or the write failed. The handle has been invalidated.
    Failed(String),
}

/// Acquisition of an export folder and permission-gated writes into it.
pub struct FolderFlow<'a> {
    authority: &'a dyn FolderAuthority,
    record: FolderRecord<'a>,
    state: FolderState,
}

impl<'a> FolderFlow<'a> {
    pub fn open(authority: &'a dyn FolderAuthority, record: FolderRecord<'a>) -> Result<Self> {
        let state = if record.chosen()? {
            FolderState::Authorized
        } else {
            FolderState::Unconfigured
        };
        Ok(Self {
            authority,
            record,
            state,
        })
    }

    pub fn state(&self) -> FolderState {
        self.state
    }

    /// Runs the picker and persists the resulting handle. When the chosen
    /// folder is not already the canonical one, a canonical subfolder is
    /// used instead, unless it cannot be created. Returns `None` and leaves
    /// the state untouched on cancel.
    pub fn authorize(&mut self, picker: &dyn DirectoryPicker) -> Result<Option<FolderHandle>> {
        let previous = self.state;
        self.state = FolderState::Requesting;

        let picked = match picker.pick() {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                tracing::info!("folder selection cancelled");
                self.state = previous;
                return Ok(None);
            }
            Err(e) => {
                self.state = previous;
                return Err(e);
            }
        };

        let dir = if picked.name == CANONICAL_FOLDER_NAME {
            picked
        } else {
            match self.authority.get_or_create_dir(&picked, CANONICAL_FOLDER_NAME) {
                Ok(sub) => sub,
                Err(e) => {
                    tracing::warn!(error = %e, folder = %picked.name, "using chosen folder directly");
                    picked
                }
            }
        };

        if let Err(e) = self.record.save(&dir) {
            self.state = previous;
            return Err(e);
        }
        tracing::info!(folder = %dir.name, path = %dir.path.display(), "export folder authorized");
        self.state = FolderState::Authorized;
        Ok(Some(dir))
    }

    /// Writes `document` into the authorized folder. Without a `prompt` a
    /// lapsed grant yields `NeedsPrompt`; with one, the user is asked and a
    /// grant retries the same full write.
    pub fn write(
        &mut self,
        document: &str,
        prompt: Option<&dyn PermissionPrompt>,
    ) -> Result<WriteOutcome> {
        let handle = match (self.record.chosen()?, self.record.load_handle()?) {
            (true, Some(handle)) => handle,
            _ => {
                self.state = FolderState::Unconfigured;
                return Ok(WriteOutcome::NoHandle);
            }
        };

        self.state = FolderState::Writing;
        if self.authority.query_permission(&handle) == Permission::Granted {
            return Ok(self.write_into(&handle, document));
        }

        self.state = FolderState::PermissionLapsed;
        let Some(prompt) = prompt else {
            tracing::info!(folder = %handle.name, "folder permission needs a prompt");
            return Ok(WriteOutcome::NeedsPrompt);
        };

        if prompt.confirm(&handle.name) == PromptAnswer::Cancel {
            tracing::info!(folder = %handle.name, "permission prompt dismissed");
            return Ok(WriteOutcome::Abandoned);
        }

        match self.authority.request_permission(&handle) {
            Permission::Granted => {
                self.state = FolderState::Writing;
                Ok(self.write_into(&handle, document))
            }
            other => {
                self.invalidate();
                Ok(WriteOutcome::Failed(format!("folder permission {}", other)))
            }
        }
    }

    fn write_into(&mut self, handle: &FolderHandle, document: &str) -> WriteOutcome {
        match self.authority.write_file(handle, DOCUMENT_FILE_NAME, document) {
            Ok(path) => {
                if let Err(e) = self.record.record_write(Utc::now()) {
                    tracing::warn!(error = %e, "could not record last folder write");
                }
                tracing::info!(path = %path.display(), "exported to folder");
                self.state = FolderState::Authorized;
                WriteOutcome::Written(path)
            }
            Err(e) => {
                tracing::error!(folder = %handle.name, error = %e, "folder write failed");
                self.invalidate();
                WriteOutcome::Failed(e.to_string())
            }
        }
    }

    fn invalidate(&mut self) {
        if let Err(e) = self.record.invalidate() {
            tracing::warn!(error = %e, "could not clear folder handle");
        }
        self.state = FolderState::Unconfigured;
    }
}
