//! Read-only view of the binary upload store.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs, io,
    path::Path,
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadItem {
    #[serde(default)]
    pub file_id: String,
    pub path: String,
    pub filename: String,
    pub size_bytes: u64,
}

/// Resolves a previously uploaded file. `Ok(None)` means unknown id; `Err` is an I/O failure.
pub trait UploadLookup: Send + Sync {
    fn lookup(&self, file_id: &str) -> Result<Option<UploadItem>>;
}

/// JSON index written by the upload service (`upload_index.json`).
pub struct UploadIndex {
    items: HashMap<String, UploadItem>,
}

impl UploadIndex {
    /// Loads the index once. A missing file is an empty index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self {
                    items: HashMap::new(),
                })
            }
            Err(err) => return Err(Error::Io(err)),
        };

        let raw: HashMap<String, UploadItem> = serde_json::from_str(&contents).map_err(|err| {
            Error::Configuration(format!("invalid upload index {}: {err}", path.display()))
        })?;
        let items = raw
            .into_iter()
            .map(|(file_id, mut item)| {
                item.file_id = file_id.clone();
                (file_id, item)
            })
            .collect();

        Ok(Self { items })
    }
}

impl UploadLookup for UploadIndex {
    fn lookup(&self, file_id: &str) -> Result<Option<UploadItem>> {
        Ok(self.items.get(file_id).cloned())
    }
}

pub fn download_url(api_prefix: &str, file_id: &str) -> String {
    format!("{api_prefix}/uploads/{file_id}")
}
