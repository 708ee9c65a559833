//! Filesystem-backed upload store.
//!
//! Uploaded bytes are written to `{dir}/{file_id}_{original_name}` and indexed in memory by
//! [`FileId`]. The index is rebuilt from the directory listing on [`FileStore::open`], so
//! identifiers handed out before a restart keep working as long as the files are still there.
//! Nothing is ever deleted by the service.

use anyhow::Context;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::types::{FileId, abbrev_uuid};

/// Index entry for one uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub id: FileId,
    /// Client-supplied name, reduced to its final path component
    pub original_name: String,
    /// Lower-cased extension including the leading dot, e.g. `.png`
    pub extension: String,
    pub size_bytes: u64,
    pub path: PathBuf,
}

impl StoredFile {
    pub fn is_pdf(&self) -> bool {
        self.extension == ".pdf"
    }
}

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    index: DashMap<FileId, StoredFile>,
}

impl FileStore {
    /// Open the store at `dir`, creating it if needed and indexing any files already present.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()), err)]
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating storage directory {}", dir.display()))?;

        let index = DashMap::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("listing storage directory {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await.context("reading storage directory entry")? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some((id, original_name)) = parse_stored_name(file_name) else {
                debug!(file_name, "Skipping file that does not look like an upload");
                continue;
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!(file_name, error = %e, "Could not stat stored file, skipping");
                    continue;
                }
            };

            index.insert(
                id,
                StoredFile {
                    id,
                    extension: extension_of(original_name).unwrap_or_default(),
                    original_name: original_name.to_string(),
                    size_bytes: metadata.len(),
                    path: entry.path(),
                },
            );
        }

        info!(files = index.len(), "Upload store ready");
        Ok(Self { dir, index })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Write `bytes` under a fresh identifier and index the result.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<StoredFile> {
        let original_name = sanitize_file_name(original_name).ok_or_else(|| Error::BadRequest {
            message: "Uploaded file must have a name".to_string(),
        })?;

        let id = Uuid::new_v4();
        let path = self.dir.join(format!("{id}_{original_name}"));

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing upload to {}", path.display()))?;

        let stored = StoredFile {
            id,
            extension: extension_of(&original_name).unwrap_or_default(),
            original_name,
            size_bytes: bytes.len() as u64,
            path,
        };

        debug!(file_id = %abbrev_uuid(&id), path = %stored.path.display(), "Stored upload");
        self.index.insert(id, stored.clone());
        Ok(stored)
    }

    /// Look up an indexed file without touching the disk.
    pub fn get(&self, id: &FileId) -> Result<StoredFile> {
        self.index.get(id).map(|entry| entry.value().clone()).ok_or_else(|| Error::NotFound {
            resource: "File".to_string(),
            id: id.to_string(),
        })
    }

    /// Look up an indexed file and confirm it is still on disk.
    pub async fn resolve(&self, id: &FileId) -> Result<StoredFile> {
        let stored = self.get(id)?;
        match tokio::fs::try_exists(&stored.path).await {
            Ok(true) => Ok(stored),
            Ok(false) => Err(Error::FileMissing { id: id.to_string() }),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("checking {}", stored.path.display()))
                .into()),
        }
    }
}

/// Reduce a client-supplied name to its final path component.
///
/// Both `/` and `\` count as separators. Returns `None` if nothing usable is left.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match last {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Lower-cased extension with a leading dot, if the name has one.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

fn parse_stored_name(file_name: &str) -> Option<(FileId, &str)> {
    let (id, original_name) = file_name.split_once('_')?;
    let id = Uuid::parse_str(id).ok()?;
    (!original_name.is_empty()).then_some((id, original_name))
}
