//! Hand-written fakes for the capability traits.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;

use chrono::Utc;

use crate::aggregate::merge_clipping;
use crate::capture::SurfaceLauncher;
use crate::engine::{Capabilities, Engine};
use crate::errors::{ClipError, Result};
use crate::export::{
    DirectoryPicker, ExportSink, FolderAuthority, Permission, PermissionPrompt, PromptAnswer,
};
use crate::protocol::{CaptureData, ContextId, Message, MessageSender, Notifier};
use crate::render::RenderPolicy;
use crate::storage::models::{ClippingPayload, FolderHandle};
use crate::storage::sqlite::SqliteKvStore;
use crate::storage::{CollectionStore, FolderRecord, KvStore, SITES_KEY};
use crate::surface::EditorParams;

pub fn vault_handle(name: &str) -> FolderHandle {
    FolderHandle {
        name: name.to_string(),
        path: PathBuf::from("/vault").join(name),
    }
}

pub struct FakeAuthority {
    query: Permission,
    request: Permission,
    failing_subdir: bool,
    failing_writes: Cell<bool>,
    subdir_calls: Cell<usize>,
    request_calls: Cell<usize>,
    writes: RefCell<Vec<String>>,
}

impl FakeAuthority {
    pub fn new(query: Permission, request: Permission) -> Self {
        Self {
            query,
            request,
            failing_subdir: false,
            failing_writes: Cell::new(false),
            subdir_calls: Cell::new(0),
            request_calls: Cell::new(0),
            writes: RefCell::new(Vec::new()),
        }
    }

    pub fn granted() -> Self {
        Self::new(Permission::Granted, Permission::Granted)
    }

    /// The stored grant has lapsed; an interactive request yields `request`.
    pub fn lapsed(request: Permission) -> Self {
        Self::new(Permission::Prompt, request)
    }

    pub fn with_failing_subdir(mut self) -> Self {
        self.failing_subdir = true;
        self
    }

    pub fn with_failing_writes(self) -> Self {
        self.fail_writes();
        self
    }

    pub fn fail_writes(&self) {
        self.failing_writes.set(true);
    }

    pub fn subdir_calls(&self) -> usize {
        self.subdir_calls.get()
    }

    pub fn request_calls(&self) -> usize {
        self.request_calls.get()
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.borrow().clone()
    }

    pub fn file_contents(&self) -> Option<String> {
        self.writes.borrow().last().cloned()
    }
}

impl FolderAuthority for FakeAuthority {
    fn query_permission(&self, _handle: &FolderHandle) -> Permission {
        self.query
    }

    fn request_permission(&self, _handle: &FolderHandle) -> Permission {
        self.request_calls.set(self.request_calls.get() + 1);
        self.request
    }

    fn get_or_create_dir(&self, parent: &FolderHandle, name: &str) -> Result<FolderHandle> {
        self.subdir_calls.set(self.subdir_calls.get() + 1);
        if self.failing_subdir {
            return Err(ClipError::Folder("cannot create subfolder".into()));
        }
        Ok(FolderHandle {
            name: name.to_string(),
            path: parent.path.join(name),
        })
    }

    fn write_file(&self, handle: &FolderHandle, name: &str, contents: &str) -> Result<PathBuf> {
        if self.failing_writes.get() {
            return Err(ClipError::Folder("folder was removed".into()));
        }
        self.writes.borrow_mut().push(contents.to_string());
        Ok(handle.path.join(name))
    }
}

pub struct FakePicker(Option<FolderHandle>);

impl FakePicker {
    pub fn picks(handle: FolderHandle) -> Self {
        Self(Some(handle))
    }

    pub fn cancels() -> Self {
        Self(None)
    }
}

impl DirectoryPicker for FakePicker {
    fn pick(&self) -> Result<Option<FolderHandle>> {
        Ok(self.0.clone())
    }
}

pub struct ScriptedPrompt {
    answer: PromptAnswer,
    calls: Cell<usize>,
}

impl ScriptedPrompt {
    pub fn answers(answer: PromptAnswer) -> Self {
        Self {
            answer,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl PermissionPrompt for ScriptedPrompt {
    fn confirm(&self, _folder_name: &str) -> PromptAnswer {
        self.calls.set(self.calls.get() + 1);
        self.answer
    }
}

#[derive(Default)]
pub struct RecordingSink {
    documents: RefCell<Vec<String>>,
}

impl RecordingSink {
    pub fn documents(&self) -> Vec<String> {
        self.documents.borrow().clone()
    }
}

impl ExportSink for RecordingSink {
    fn write_document(&self, document: &str) -> Result<PathBuf> {
        self.documents.borrow_mut().push(document.to_string());
        Ok(PathBuf::from("/downloads/Clippings/clippings.md"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: RefCell<Vec<(ContextId, Message)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(ContextId, Message)> {
        self.sent.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, target: ContextId, message: Message) {
        self.sent.borrow_mut().push((target, message));
    }
}

#[derive(Default)]
pub struct RecordingSender {
    sent: RefCell<Vec<Message>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<Message> {
        self.sent.borrow().clone()
    }
}

impl MessageSender for RecordingSender {
    fn send(&self, message: Message) {
        self.sent.borrow_mut().push(message);
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    failing_overlay: bool,
    failing_editor: bool,
    overlays: RefCell<Vec<ContextId>>,
    editors: RefCell<Vec<EditorParams>>,
}

impl RecordingLauncher {
    pub fn failing_overlay() -> Self {
        Self {
            failing_overlay: true,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing_overlay: true,
            failing_editor: true,
            ..Default::default()
        }
    }

    pub fn overlays(&self) -> Vec<ContextId> {
        self.overlays.borrow().clone()
    }

    pub fn editors(&self) -> Vec<EditorParams> {
        self.editors.borrow().clone()
    }
}

impl SurfaceLauncher for RecordingLauncher {
    fn show_overlay(&self, tab: ContextId, _data: &CaptureData) -> Result<()> {
        if self.failing_overlay {
            return Err(ClipError::Protocol("cannot inject into this page".into()));
        }
        self.overlays.borrow_mut().push(tab);
        Ok(())
    }

    fn open_editor(&self, params: &EditorParams) -> Result<()> {
        if self.failing_editor {
            return Err(ClipError::Protocol("no surface available".into()));
        }
        self.editors.borrow_mut().push(params.clone());
        Ok(())
    }
}

/// In-memory stores plus recording fakes for every engine capability.
pub struct Harness {
    pub kv: SqliteKvStore,
    pub handles: SqliteKvStore,
    pub authority: FakeAuthority,
    pub downloads: RecordingSink,
    pub notifier: RecordingNotifier,
    pub launcher: RecordingLauncher,
    pub sender: RecordingSender,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            kv: SqliteKvStore::in_memory().unwrap(),
            handles: SqliteKvStore::in_memory().unwrap(),
            authority: FakeAuthority::granted(),
            downloads: RecordingSink::default(),
            notifier: RecordingNotifier::default(),
            launcher: RecordingLauncher::default(),
            sender: RecordingSender::default(),
        }
    }

    /// A folder named "Clippings" is already chosen. Its permission check
    /// returns `query` and an interactive request returns `request`.
    pub fn authorized(query: Permission, request: Permission) -> Self {
        let harness = Self {
            authority: FakeAuthority::new(query, request),
            ..Self::new()
        };
        harness.record().save(&vault_handle("Clippings")).unwrap();
        harness
    }

    pub fn with_failing_launcher(mut self) -> Self {
        self.launcher = RecordingLauncher::failing();
        self
    }

    pub fn engine(&self) -> Engine<'_> {
        Engine::new(
            Capabilities {
                store: &self.kv,
                handles: &self.handles,
                authority: &self.authority,
                downloads: &self.downloads,
                notifier: &self.notifier,
                launcher: &self.launcher,
            },
            RenderPolicy::default(),
        )
    }

    pub fn record(&self) -> FolderRecord<'_> {
        FolderRecord::new(&self.kv, &self.handles)
    }

    /// Persists one clipping without exporting it.
    pub fn seed(&self, text: &str, url: &str) {
        let store = CollectionStore::new(&self.kv);
        let payload = ClippingPayload {
            text: Some(text.to_string()),
            url: Some(url.to_string()),
            ..Default::default()
        };
        let collection = merge_clipping(store.get().unwrap(), &payload, Utc::now());
        store.set(&collection).unwrap();
    }

    pub fn corrupt_collection(&self) {
        self.kv.set_raw(SITES_KEY, "[1, 2").unwrap();
    }
}
