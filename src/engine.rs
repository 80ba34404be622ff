use chrono::Utc;

use crate::aggregate::merge_clipping;
use crate::capture::{self, PageSnapshot, SurfaceLauncher, Tab, TabQueryService};
use crate::errors::Result;
use crate::export::folder::{FolderFlow, FolderState, WriteOutcome};
use crate::export::{AnsweredPrompt, ExportSink, FolderAuthority, PermissionPrompt};
use crate::protocol::{ContextId, Envelope, Message, MessageSender, Notifier, Response};
use crate::render::{RenderPolicy, render_document};
use crate::storage::models::ClippingPayload;
use crate::storage::{CollectionStore, FolderRecord, KvStore};
use crate::surface::{self, EditorParams};

/// The capability interfaces the engine calls through.
pub struct Capabilities<'a> {
    pub store: &'a dyn KvStore,
    pub handles: &'a dyn KvStore,
    pub authority: &'a dyn FolderAuthority,
    pub downloads: &'a dyn ExportSink,
    pub notifier: &'a dyn Notifier,
    pub launcher: &'a dyn SurfaceLauncher,
}

/// Merges clippings into the persisted collection and routes the rendered
/// document to the chosen folder or the downloads sink.
pub struct Engine<'a> {
    caps: Capabilities<'a>,
    policy: RenderPolicy,
}

impl<'a> Engine<'a> {
    pub fn new(caps: Capabilities<'a>, policy: RenderPolicy) -> Self {
        Self { caps, policy }
    }

    pub fn collection(&self) -> CollectionStore<'a> {
        CollectionStore::new(self.caps.store)
    }

    pub fn folder_record(&self) -> FolderRecord<'a> {
        FolderRecord::new(self.caps.store, self.caps.handles)
    }

    pub fn folder_flow(&self) -> Result<FolderFlow<'a>> {
        FolderFlow::open(self.caps.authority, self.folder_record())
    }

    pub fn launcher(&self) -> &'a dyn SurfaceLauncher {
        self.caps.launcher
    }

    pub fn render(&self) -> Result<String> {
        Ok(render_document(&self.collection().get()?, self.policy))
    }

    pub fn tag_suggestions(&self) -> Result<Vec<String>> {
        Ok(self.collection().get()?.all_tags())
    }

    /// Reload, merge, persist, then export. A persistence failure aborts
    /// before anything is exported; export problems never undo the merge.
    pub fn save_clipping(
        &self,
        payload: &ClippingPayload,
        origin: Option<ContextId>,
        prompt: Option<&dyn PermissionPrompt>,
    ) -> Response {
        let document = match self.persist(payload) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, "save-clipping failed");
                return Response::failed(e.to_string());
            }
        };
        self.export(&document, origin, prompt)
    }

    /// Re-exports the stored collection without adding anything.
    pub fn export_now(
        &self,
        origin: Option<ContextId>,
        prompt: Option<&dyn PermissionPrompt>,
    ) -> Response {
        match self.render() {
            Ok(document) => self.export(&document, origin, prompt),
            Err(e) => {
                tracing::error!(error = %e, "export failed");
                Response::failed(e.to_string())
            }
        }
    }

    pub fn fallback_export(&self, document: &str) -> Response {
        match self.caps.downloads.write_document(document) {
            Ok(_) => Response::downloads(),
            Err(e) => {
                tracing::error!(error = %e, "downloads export failed");
                Response::failed(e.to_string())
            }
        }
    }

    /// Best-effort notification of the originating context, if known.
    pub fn notify(&self, origin: Option<ContextId>, message: Message) {
        if let Some(target) = origin {
            self.caps.notifier.notify(target, message);
        }
    }

    fn persist(&self, payload: &ClippingPayload) -> Result<String> {
        let store = self.collection();
        let collection = merge_clipping(store.get()?, payload, Utc::now());
        store.set(&collection)?;
        Ok(render_document(&collection, self.policy))
    }

    fn export(
        &self,
        document: &str,
        origin: Option<ContextId>,
        prompt: Option<&dyn PermissionPrompt>,
    ) -> Response {
        let mut flow = match self.folder_flow() {
            Ok(flow) if flow.state() != FolderState::Unconfigured => flow,
            Ok(_) => return self.fallback_export(document),
            Err(e) => {
                tracing::warn!(error = %e, "could not read folder state");
                return self.fallback_export(document);
            }
        };

        match flow.write(document, prompt) {
            Ok(WriteOutcome::Written(_)) => {
                self.notify(origin, Message::VaultWriteSuccess);
                Response::vault()
            }
            Ok(WriteOutcome::NeedsPrompt) => {
                match self.caps.launcher.open_editor(&EditorParams::auto_write(origin)) {
                    Ok(()) => Response::ok(),
                    Err(e) => {
                        tracing::warn!(error = %e, "could not open permission surface");
                        self.fallback_export(document)
                    }
                }
            }
            Ok(WriteOutcome::Abandoned) => Response::ok(),
            Ok(WriteOutcome::NoHandle) => self.fallback_export(document),
            Ok(WriteOutcome::Failed(error)) => {
                let mut response = self.fallback_export(document);
                self.notify(
                    origin,
                    Message::VaultWriteFailed {
                        error: error.clone(),
                    },
                );
                response.error = Some(error);
                response
            }
            Err(e) => {
                tracing::error!(error = %e, "folder export failed");
                self.fallback_export(document)
            }
        }
    }
}

/// Tab lookup answered from what the browser shim attached to a command.
struct ForwardedTabs {
    tab: Option<Tab>,
    page: Option<PageSnapshot>,
}

impl TabQueryService for ForwardedTabs {
    fn active_tab(&self) -> Option<Tab> {
        self.tab.clone()
    }

    fn read_page(&self, _tab: &Tab) -> Option<PageSnapshot> {
        self.page.clone()
    }
}

/// Dispatches protocol messages arriving at the background coordinator.
pub struct Coordinator<'a> {
    engine: &'a Engine<'a>,
}

impl<'a> Coordinator<'a> {
    pub fn new(engine: &'a Engine<'a>) -> Self {
        Self { engine }
    }

    /// Returns the reply for request messages and `None` for
    /// fire-and-forget ones.
    pub fn handle(&self, envelope: Envelope) -> Option<Response> {
        let origin = envelope.tab_id;
        match envelope.message {
            Message::SaveClipping { payload } => {
                Some(self.engine.save_clipping(&payload, origin, None))
            }
            Message::OpenAuxiliarySurface => {
                let params = EditorParams {
                    origin,
                    ..Default::default()
                };
                match self.engine.launcher().open_editor(&params) {
                    Ok(()) => Some(Response::ok()),
                    Err(e) => Some(Response::failed(e.to_string())),
                }
            }
            Message::VaultWrite { answer } => {
                let prompt = AnsweredPrompt(answer);
                match surface::auto_write(self.engine, origin, &prompt, self) {
                    Ok(status) => Some(status.response()),
                    Err(e) => {
                        tracing::error!(error = %e, "folder write from auxiliary surface failed");
                        Some(Response::failed(e.to_string()))
                    }
                }
            }
            Message::FallbackExport { document } => {
                self.engine.fallback_export(&document);
                None
            }
            Message::MenuClicked { info, tab } => {
                if let Some(route) = capture::route_menu_click(&info, tab.as_ref()) {
                    self.open(&route);
                }
                None
            }
            Message::Command { command, tab, page } => {
                let tabs = ForwardedTabs { tab, page };
                if let Some(route) = capture::route_command(&command, &tabs) {
                    self.open(&route);
                }
                None
            }
            other => {
                tracing::warn!(message = ?other, "unexpected message for coordinator");
                None
            }
        }
    }

    fn open(&self, route: &capture::CaptureRoute) {
        if let Err(e) = capture::dispatch(route, self.engine.launcher()) {
            tracing::error!(error = %e, "could not open capture surface");
        }
    }
}

/// In-process delivery for surfaces that run next to the coordinator.
impl MessageSender for Coordinator<'_> {
    fn send(&self, message: Message) {
        self.handle(Envelope::new(message));
    }
}
