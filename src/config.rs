use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ClipError, Result};
use crate::render::{Numbering, RenderPolicy};

const HOME_ENV: &str = "CLIPPINGS_HOME";

pub struct AppPaths {
    pub base_dir: PathBuf,
    pub store_db: PathBuf,
    pub handles_db: PathBuf,
    pub settings_file: PathBuf,
    pub log_file: PathBuf,
}

impl AppPaths {
    /// Resolves the base directory from `CLIPPINGS_HOME`, falling back to
    /// `~/.clippings`.
    pub fn new() -> Result<Self> {
        if let Some(base) = std::env::var_os(HOME_ENV) {
            return Ok(Self::from_base(PathBuf::from(base)));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| ClipError::InvalidInput("could not determine home directory".into()))?;
        Ok(Self::from_base(home.join(".clippings")))
    }

    pub fn from_base(base: PathBuf) -> Self {
        Self {
            store_db: base.join("store.db"),
            handles_db: base.join("handles.db"),
            settings_file: base.join("settings.json"),
            log_file: base.join("clippings.log"),
            base_dir: base,
        }
    }

    pub fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub numbering: Numbering,
    /// Root the downloads sink writes under. Defaults to the platform
    /// downloads directory.
    pub downloads_dir: Option<PathBuf>,
}

impl Settings {
    /// A missing settings file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ClipError::Io(e)),
        }
    }

    pub fn render_policy(&self) -> RenderPolicy {
        RenderPolicy {
            numbering: self.numbering,
        }
    }

    pub fn downloads_root(&self, paths: &AppPaths) -> PathBuf {
        self.downloads_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| paths.base_dir.join("downloads"))
    }
}
