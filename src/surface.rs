use std::path::PathBuf;

use url::form_urlencoded;

use crate::engine::Engine;
use crate::errors::Result;
use crate::export::PermissionPrompt;
use crate::export::folder::WriteOutcome;
use crate::protocol::{ContextId, Message, MessageSender, Response};
use crate::storage::FolderRecord;

/// Query parameters of the standalone editing surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorParams {
    pub text: String,
    pub url: String,
    pub title: String,
    /// Write the stored collection to the chosen folder as soon as the
    /// surface opens.
    pub auto_write: bool,
    /// Context to notify about the outcome of an auto write.
    pub origin: Option<ContextId>,
}

impl EditorParams {
    pub fn auto_write(origin: Option<ContextId>) -> Self {
        Self {
            auto_write: true,
            origin,
            ..Default::default()
        }
    }

    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "text" => params.text = value.into_owned(),
                "url" => params.url = value.into_owned(),
                "title" => params.title = value.into_owned(),
                "autoWrite" => params.auto_write = !value.is_empty() && value != "0",
                "tabId" => params.origin = value.parse().ok(),
                _ => {}
            }
        }
        params
    }

    pub fn to_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if !self.text.is_empty() {
            query.append_pair("text", &self.text);
        }
        if !self.url.is_empty() {
            query.append_pair("url", &self.url);
        }
        if !self.title.is_empty() {
            query.append_pair("title", &self.title);
        }
        if self.auto_write {
            query.append_pair("autoWrite", "1");
        }
        if let Some(origin) = self.origin {
            query.append_pair("tabId", &origin.to_string());
        }
        query.finish()
    }
}

/// What the surface shows after an auto write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceStatus {
    Saved(PathBuf),
    NoFolder,
    /// The prompt was closed; nothing was written and nothing is retried.
    Abandoned,
    Failed(String),
}

impl SurfaceStatus {
    pub fn text(&self) -> String {
        match self {
            SurfaceStatus::Saved(_) => "Saved to folder ✔".to_string(),
            SurfaceStatus::NoFolder => "No folder chosen. Saved to downloads instead.".to_string(),
            SurfaceStatus::Abandoned => "Write cancelled".to_string(),
            SurfaceStatus::Failed(error) => format!("Failed to write to folder: {}", error),
        }
    }

    /// Failed writes have dropped the folder, so the user is offered a
    /// re-pick.
    pub fn offers_repick(&self) -> bool {
        matches!(self, SurfaceStatus::Failed(_))
    }

    /// Reply for the surface that asked for the write. `NoFolder` and
    /// `Failed` have already been handed to the downloads fallback.
    pub fn response(&self) -> Response {
        match self {
            SurfaceStatus::Saved(_) => Response::vault(),
            SurfaceStatus::NoFolder => Response::downloads(),
            SurfaceStatus::Abandoned => Response::ok(),
            SurfaceStatus::Failed(error) => Response {
                error: Some(error.clone()),
                ..Response::downloads()
            },
        }
    }
}

pub fn folder_status_text(record: &FolderRecord<'_>) -> String {
    match (record.chosen(), record.display_name()) {
        (Ok(true), Ok(name)) => format!(
            "Folder chosen: {}",
            name.as_deref().unwrap_or(crate::export::CANONICAL_FOLDER_NAME)
        ),
        _ => "No folder chosen".to_string(),
    }
}

/// Writes the stored collection to the chosen folder from a surface that
/// can prompt the user. Failures are handed to the coordinator as a
/// fallback export, and the originating context hears about the outcome.
pub fn auto_write(
    engine: &Engine<'_>,
    origin: Option<ContextId>,
    prompt: &dyn PermissionPrompt,
    coordinator: &dyn MessageSender,
) -> Result<SurfaceStatus> {
    let document = engine.render()?;
    let mut flow = engine.folder_flow()?;

    let status = match flow.write(&document, Some(prompt))? {
        WriteOutcome::Written(path) => {
            engine.notify(origin, Message::VaultWriteSuccess);
            SurfaceStatus::Saved(path)
        }
        WriteOutcome::Abandoned | WriteOutcome::NeedsPrompt => SurfaceStatus::Abandoned,
        WriteOutcome::NoHandle => {
            coordinator.send(Message::FallbackExport { document });
            SurfaceStatus::NoFolder
        }
        WriteOutcome::Failed(error) => {
            coordinator.send(Message::FallbackExport { document });
            engine.notify(
                origin,
                Message::VaultWriteFailed {
                    error: error.clone(),
                },
            );
            SurfaceStatus::Failed(error)
        }
    };
    tracing::info!(status = %status.text(), "auxiliary write finished");
    Ok(status)
}
