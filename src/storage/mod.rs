pub mod models;
pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::Result;
use models::{Collection, FolderHandle};

pub const SITES_KEY: &str = "sites";
pub const FOLDER_CHOSEN_KEY: &str = "folder_chosen";
pub const FOLDER_NAME_KEY: &str = "folder_name";
pub const LAST_FOLDER_WRITE_KEY: &str = "last_folder_write";
/// Key of the folder handle inside the separate handle store.
pub const FOLDER_HANDLE_KEY: &str = "clippings_dir";

/// Durable string-keyed store. Values are serialized JSON.
pub trait KvStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>>;
    fn set_raw(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

pub trait KvStoreExt: KvStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw)
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

/// Read/write access to the single persisted collection. Holds no cached
/// copy: every `get` goes back to the store.
pub struct CollectionStore<'a> {
    kv: &'a dyn KvStore,
}

impl<'a> CollectionStore<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    pub fn get(&self) -> Result<Collection> {
        Ok(self.kv.get_json(SITES_KEY)?.unwrap_or_default())
    }

    pub fn set(&self, collection: &Collection) -> Result<()> {
        self.kv.set_json(SITES_KEY, collection)
    }
}

/// The chosen-folder flag, display name and last-write timestamp in the
/// main store, plus the handle itself in the handle store.
pub struct FolderRecord<'a> {
    kv: &'a dyn KvStore,
    handles: &'a dyn KvStore,
}

impl<'a> FolderRecord<'a> {
    pub fn new(kv: &'a dyn KvStore, handles: &'a dyn KvStore) -> Self {
        Self { kv, handles }
    }

    pub fn chosen(&self) -> Result<bool> {
        Ok(self.kv.get_json(FOLDER_CHOSEN_KEY)?.unwrap_or(false))
    }

    pub fn display_name(&self) -> Result<Option<String>> {
        self.kv.get_json(FOLDER_NAME_KEY)
    }

    pub fn load_handle(&self) -> Result<Option<FolderHandle>> {
        self.handles.get_json(FOLDER_HANDLE_KEY)
    }

    /// Persists the handle first so a chosen flag never points at nothing.
    pub fn save(&self, handle: &FolderHandle) -> Result<()> {
        self.handles.set_json(FOLDER_HANDLE_KEY, handle)?;
        self.kv.set_json(FOLDER_CHOSEN_KEY, &true)?;
        self.kv.set_json(FOLDER_NAME_KEY, &handle.name)
    }

    pub fn invalidate(&self) -> Result<()> {
        self.kv.set_json(FOLDER_CHOSEN_KEY, &false)?;
        self.handles.remove(FOLDER_HANDLE_KEY)
    }

    pub fn record_write(&self, at: DateTime<Utc>) -> Result<()> {
        self.kv.set_json(LAST_FOLDER_WRITE_KEY, &at)
    }

    pub fn last_write(&self) -> Result<Option<DateTime<Utc>>> {
        self.kv.get_json(LAST_FOLDER_WRITE_KEY)
    }
}
