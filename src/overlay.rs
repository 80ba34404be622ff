use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::capture::MENU_ITEM_TITLE;
use crate::errors::{ClipError, Result};
use crate::protocol::{CaptureData, Message, MessageSender};
use crate::storage::models::ClippingPayload;

/// Everything the panel shows when it opens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayViewModel {
    pub data: CaptureData,
    /// Every tag ever used, sorted.
    pub suggestions: Vec<String>,
}

impl OverlayViewModel {
    pub fn new(data: CaptureData, suggestions: Vec<String>) -> Self {
        Self { data, suggestions }
    }

    pub fn heading(&self) -> &str {
        if self.data.title.is_empty() {
            MENU_ITEM_TITLE
        } else {
            &self.data.title
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayForm {
    pub text: String,
    pub note: String,
    /// Raw comma-separated tag input.
    pub tags: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    Mouse,
    Touch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// An in-progress header drag. The grab offset keeps the panel from
/// jumping under the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragState {
    pub pointer: Pointer,
    offset: Position,
}

/// Hands out at most one mounted panel per page context.
#[derive(Debug, Default)]
pub struct OverlayPresenter {
    active: Rc<Cell<bool>>,
}

impl OverlayPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn mount(&self, model: OverlayViewModel) -> Result<OverlayHandle> {
        if self.active.replace(true) {
            return Err(ClipError::AlreadyActive);
        }
        Ok(OverlayHandle {
            form: OverlayForm {
                text: model.data.text.clone(),
                ..Default::default()
            },
            model,
            position: None,
            drag: None,
            _token: ActiveToken(Rc::clone(&self.active)),
        })
    }
}

#[derive(Debug)]
struct ActiveToken(Rc<Cell<bool>>);

impl Drop for ActiveToken {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A mounted panel. Dropping it, or calling one of the consuming methods,
/// removes it and frees the presenter for the next capture.
#[derive(Debug)]
pub struct OverlayHandle {
    model: OverlayViewModel,
    pub form: OverlayForm,
    position: Option<Position>,
    drag: Option<DragState>,
    _token: ActiveToken,
}

impl OverlayHandle {
    pub fn model(&self) -> &OverlayViewModel {
        &self.model
    }

    /// `None` until the panel has been dragged away from its default place.
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn visible_suggestions(&self) -> Vec<&str> {
        filter_suggestions(&self.model.suggestions, &self.form.tags)
    }

    pub fn choose_suggestion(&mut self, tag: &str) {
        self.form.tags = apply_suggestion(&self.form.tags, tag);
    }

    /// `panel` is the panel's top-left corner when the drag starts.
    pub fn begin_drag(&mut self, pointer: Pointer, at: Position, panel: Position) {
        self.drag = Some(DragState {
            pointer,
            offset: Position {
                x: at.x - panel.x,
                y: at.y - panel.y,
            },
        });
        self.position = Some(panel);
    }

    pub fn drag_to(&mut self, pointer: Pointer, at: Position) {
        match self.drag {
            Some(drag) if drag.pointer == pointer => {
                self.position = Some(Position {
                    x: at.x - drag.offset.x,
                    y: at.y - drag.offset.y,
                });
            }
            _ => {}
        }
    }

    pub fn end_drag(&mut self, pointer: Pointer) {
        if self.drag.is_some_and(|d| d.pointer == pointer) {
            self.drag = None;
        }
    }

    pub fn to_payload(&self, now: DateTime<Utc>) -> ClippingPayload {
        ClippingPayload {
            text: Some(self.form.text.trim().to_string()),
            note: Some(self.form.note.trim().to_string()),
            tags: Some(parse_tags(&self.form.tags)),
            title: Some(self.model.data.title.clone()),
            url: Some(self.model.data.url.clone()),
            date: Some(now),
        }
    }

    /// Sends the clipping and removes the panel. The outcome arrives later
    /// as a notification, so the panel never waits on it.
    pub fn save(self, sender: &dyn MessageSender, now: DateTime<Utc>) {
        let payload = self.to_payload(now);
        sender.send(Message::SaveClipping { payload });
        self.teardown();
    }

    pub fn cancel(self) {
        self.teardown();
    }

    pub fn teardown(self) {
        tracing::debug!("overlay removed");
    }
}

/// The comma-delimited token currently being typed, trimmed.
pub fn last_token(input: &str) -> &str {
    input.rsplit(',').next().unwrap_or_default().trim()
}

/// Suggestions containing the last token, ignoring case. An empty token
/// shows nothing.
pub fn filter_suggestions<'a>(suggestions: &'a [String], input: &str) -> Vec<&'a str> {
    let token = last_token(input).to_lowercase();
    if token.is_empty() {
        return Vec::new();
    }
    suggestions
        .iter()
        .filter(|s| s.to_lowercase().contains(&token))
        .map(String::as_str)
        .collect()
}

/// Replaces the last token with `tag` and normalizes the list.
pub fn apply_suggestion(input: &str, tag: &str) -> String {
    let mut parts: Vec<&str> = input.split(',').collect();
    if let Some(last) = parts.last_mut() {
        *last = tag;
    }
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Outcome notice shown on the page after a folder write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    Success,
    Failure { error: String },
}

impl Banner {
    pub fn from_notification(message: &Message) -> Option<Self> {
        match message {
            Message::VaultWriteSuccess => Some(Banner::Success),
            Message::VaultWriteFailed { error } => Some(Banner::Failure {
                error: error.clone(),
            }),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Banner::Success => "Clipping saved to your folder".to_string(),
            Banner::Failure { error } => format!(
                "Could not write to your folder ({}). Saved to downloads instead.",
                error
            ),
        }
    }

    /// Asks the coordinator for a surface where the folder can be picked
    /// again. Returns false for banners with nothing to retry.
    pub fn retry(&self, sender: &dyn MessageSender) -> bool {
        match self {
            Banner::Failure { .. } => {
                sender.send(Message::OpenAuxiliarySurface);
                true
            }
            Banner::Success => false,
        }
    }
}
