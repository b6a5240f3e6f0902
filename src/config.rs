//! Key-value configuration collaborator.
//!
//! The bridge reads its credentials here once at construction and mirrors
//! token state back after every mutation so a restart can resume the session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const KEY_TOKEN: &str = "token";
pub const KEY_EXPIRES: &str = "expires";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_CLIENT_ID: &str = "client_id";
pub const KEY_CLIENT_SECRET: &str = "client_secret";
pub const KEY_BASE_URL: &str = "baseUrl";

pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;
}

/// JSON-file-backed store: one flat object, rewritten on every set.
pub struct FileConfigStore {
    path: PathBuf,
    cells: Mutex<BTreeMap<String, String>>,
}

impl FileConfigStore {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cells = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            cells: Mutex::new(cells),
        })
    }

    fn flush(&self, cells: &BTreeMap<String, String>) -> std::io::Result<()> {
        let contents = serde_json::to_string_pretty(cells)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, contents)
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cells.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        let mut cells = self.cells.lock().unwrap();
        cells.insert(key.to_string(), value.to_string());
        self.flush(&cells)
    }
}

/// In-memory store for embedding and tests.
#[derive(Default)]
pub struct MemoryConfigStore {
    cells: Mutex<BTreeMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(client_id: &str, client_secret: &str) -> Self {
        let store = Self::new();
        store.set(KEY_CLIENT_ID, client_id).unwrap();
        store.set(KEY_CLIENT_SECRET, client_secret).unwrap();
        store
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.cells.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.cells
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
