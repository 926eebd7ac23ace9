use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::{DocumentStore, Storage, StoreError};

const DATABASE_FILE_SUFFIX: &str = ".db";
const MAX_FILE_NAME_LEN: usize = 255;
/// Longest accepted database name; `<name>.db` must fit a single file name.
pub const MAX_DATABASE_NAME_LEN: usize = MAX_FILE_NAME_LEN - DATABASE_FILE_SUFFIX.len();

/// Opens the document store scoped to a database name.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn open_store(&self, name: &str) -> Result<Arc<dyn DocumentStore>, StoreError>;
}

#[derive(Debug, Clone)]
pub enum StoreLocation {
    /// One `<name>.db` file per database under this directory.
    Directory(PathBuf),
    Memory,
}

/// Lazily opened SQLite databases, one per name, reused across opens.
#[derive(Clone)]
pub struct LocalStores {
    location: StoreLocation,
    opened: Arc<Mutex<HashMap<String, Storage>>>,
}

impl LocalStores {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            opened: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(StoreLocation::Directory(dir.into()))
    }

    pub fn in_memory() -> Self {
        Self::new(StoreLocation::Memory)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub async fn open(&self, name: &str) -> Result<Storage, StoreError> {
        validate_database_name(name)?;

        let mut opened = self.opened.lock().await;
        if let Some(storage) = opened.get(name) {
            return Ok(storage.clone());
        }

        let database_url = match &self.location {
            StoreLocation::Directory(dir) => {
                let path = database_path(dir, name);
                format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
            }
            StoreLocation::Memory => "sqlite::memory:".to_string(),
        };
        let storage = Storage::new(&database_url, name).await?;
        info!(db = %name, %database_url, "opened document database");
        opened.insert(name.to_string(), storage.clone());
        Ok(storage)
    }

    /// Opens `name` only when it was opened before or its file already
    /// exists; never creates a database.
    pub async fn open_existing(&self, name: &str) -> Result<Option<Storage>, StoreError> {
        validate_database_name(name)?;

        if let Some(storage) = self.opened.lock().await.get(name) {
            return Ok(Some(storage.clone()));
        }
        match &self.location {
            StoreLocation::Directory(dir) if database_path(dir, name).is_file() => {
                self.open(name).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    pub async fn open_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.opened.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl StoreProvider for LocalStores {
    async fn open_store(&self, name: &str) -> Result<Arc<dyn DocumentStore>, StoreError> {
        Ok(Arc::new(self.open(name).await?))
    }
}

fn database_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{DATABASE_FILE_SUFFIX}"))
}

pub fn validate_database_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_DATABASE_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidDatabaseName(name.to_string()))
    }
}
