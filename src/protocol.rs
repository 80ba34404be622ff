use serde::{Deserialize, Serialize};

use crate::capture::{MenuClickInfo, MenuItem, PageSnapshot, Tab};
use crate::export::PromptAnswer;
use crate::storage::models::ClippingPayload;

/// Identifies the page context (browser tab) a request came from.
pub type ContextId = i64;

/// Selection, title and URL handed from a capture trigger to the overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureData {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Message {
    /// Trigger → overlay.
    ShowClipping { data: CaptureData },
    /// Overlay or editor → coordinator. Answered with a [`Response`].
    SaveClipping {
        #[serde(default, deserialize_with = "crate::storage::models::lenient::payload")]
        payload: ClippingPayload,
    },
    /// Any context → coordinator. Answered with `{ok}`.
    OpenAuxiliarySurface,
    /// Coordinator or editor → originating overlay. Best effort.
    VaultWriteFailed { error: String },
    VaultWriteSuccess,
    /// Editor → coordinator, fire-and-forget.
    FallbackExport { document: String },
    /// Auxiliary surface → coordinator: the user answered the folder
    /// permission prompt. `tabId` names the context to notify. Answered with
    /// a [`Response`].
    VaultWrite { answer: PromptAnswer },
    /// Browser shim → coordinator: the context-menu item was clicked.
    MenuClicked {
        info: MenuClickInfo,
        #[serde(default)]
        tab: Option<Tab>,
    },
    /// Browser shim → coordinator: a keyboard command fired. `tab` and `page`
    /// carry the active tab and its live selection, when there is one.
    Command {
        command: String,
        #[serde(default)]
        tab: Option<Tab>,
        #[serde(default)]
        page: Option<PageSnapshot>,
    },
    /// Coordinator → browser shim: register a context-menu item.
    RegisterMenu { item: MenuItem },
    /// Coordinator → browser shim: inject the overlay script into `tabId`.
    InjectOverlay,
    /// Coordinator → browser shim: open the standalone editor with `query`.
    OpenEditor { query: String },
}

/// One framed message with its routing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<ContextId>,
    #[serde(flatten)]
    pub message: Message,
}

impl Envelope {
    pub fn new(message: Message) -> Self {
        Self {
            request_id: None,
            tab_id: None,
            message,
        }
    }

    pub fn to_tab(tab_id: ContextId, message: Message) -> Self {
        Self {
            request_id: None,
            tab_id: Some(tab_id),
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub written_to_vault: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub written_to_downloads: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn vault() -> Self {
        Self {
            ok: true,
            written_to_vault: true,
            ..Default::default()
        }
    }

    pub fn downloads() -> Self {
        Self {
            ok: true,
            written_to_downloads: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Reply frame for a request that carried a `requestId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub reply: Response,
}

/// Delivers notifications to a page context. Delivery is best effort:
/// implementations swallow failures and callers never wait on it.
pub trait Notifier {
    fn notify(&self, target: ContextId, message: Message);
}

/// Sends a message towards the coordinator without waiting for a reply.
pub trait MessageSender {
    fn send(&self, message: Message);
}
