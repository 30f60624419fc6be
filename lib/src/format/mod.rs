pub mod chrome;
pub mod json;
pub mod sqlite;

use crate::config::Config;
use crate::error::{BmError, Result};
use crate::tree::BookmarkTree;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tempfile::NamedTempFile;

pub use chrome::ChromeAdapter;
pub use json::JsonAdapter;
pub use sqlite::SqliteAdapter;

/// Storage formats the converter knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Chrome/Edge `Bookmarks` export, read-only
    Chrome,
    /// Internal JSON document
    Json,
    /// Internal SQLite database
    Sqlite,
}

impl Format {
    pub const INPUTS: [Format; 3] = [Format::Chrome, Format::Json, Format::Sqlite];
    pub const OUTPUTS: [Format; 2] = [Format::Json, Format::Sqlite];

    pub fn name(&self) -> &'static str {
        match self {
            Format::Chrome => "chrome",
            Format::Json => "json",
            Format::Sqlite => "sqlite",
        }
    }

    /// Parse format name (case-insensitive)
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chrome" => Some(Format::Chrome),
            "json" => Some(Format::Json),
            "sqlite" => Some(Format::Sqlite),
            _ => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        Self::OUTPUTS.contains(self)
    }

    /// Resolve the adapter for this format
    pub fn adapter(&self, config: &Config) -> Adapter {
        match self {
            Format::Chrome => Adapter::Chrome(ChromeAdapter::new(&config.root_title, config.id_policy)),
            Format::Json => Adapter::Json(JsonAdapter::new(config.pretty_json, config.id_policy)),
            Format::Sqlite => Adapter::Sqlite(SqliteAdapter::new(config.id_policy)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = BmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s).ok_or_else(|| BmError::InvalidInput(format!("Unknown format '{}'", s)))
    }
}

/// Read/write capability shared by every format
pub trait FormatAdapter {
    fn read(&self, source: &Path) -> Result<BookmarkTree>;
    fn write(&self, tree: &BookmarkTree, destination: &Path) -> Result<()>;
}

/// Enum-based dispatch for adapters (avoids Box<dyn FormatAdapter>)
pub enum Adapter {
    Chrome(ChromeAdapter),
    Json(JsonAdapter),
    Sqlite(SqliteAdapter),
}

impl Adapter {
    pub fn format(&self) -> Format {
        match self {
            Self::Chrome(_) => Format::Chrome,
            Self::Json(_) => Format::Json,
            Self::Sqlite(_) => Format::Sqlite,
        }
    }
}

impl FormatAdapter for Adapter {
    fn read(&self, source: &Path) -> Result<BookmarkTree> {
        match self {
            Self::Chrome(adapter) => adapter.read(source),
            Self::Json(adapter) => adapter.read(source),
            Self::Sqlite(adapter) => adapter.read(source),
        }
    }

    fn write(&self, tree: &BookmarkTree, destination: &Path) -> Result<()> {
        match self {
            Self::Chrome(adapter) => adapter.write(tree, destination),
            Self::Json(adapter) => adapter.write(tree, destination),
            Self::Sqlite(adapter) => adapter.write(tree, destination),
        }
    }
}

/// Write through a temporary file next to `destination`, then rename it over
/// the destination. On any failure the temporary file is removed and the
/// destination is left as it was.
pub(crate) fn write_atomically<F>(destination: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".bmtree-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    write(&mut tmp)?;
    tmp.as_file().sync_all()?;

    if let Ok(existing) = fs::metadata(destination) {
        fs::set_permissions(tmp.path(), existing.permissions())?;
    }
    tmp.persist(destination).map_err(|e| e.error)?;
    debug!("Replaced {}", destination.display());
    Ok(())
}
