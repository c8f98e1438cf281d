//! Flat-file store: one JSON document per upload under
//! `<root>/<user>/<subject>_<sequence>_<file>.json`.
//!
//! User and subject are escaped with [`path_component`], which is
//! injective, so two keys never share a directory or a file prefix.

use crate::ingest::sanitize_file_name;
use crate::traits::KnowledgeStore;
use crate::{Segment, StoreError, SubjectKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub document_id: Uuid,
    pub user: String,
    pub subject: String,
    pub file_name: String,
    pub sequence: u64,
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
    pub pages: Vec<StoredPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPage {
    /// Page or paragraph number in the source document.
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(rename = "ref")]
    pub reference: String,
    pub text: String,
}

/// Escapes `name` for use as a path component. `[a-z0-9-]` pass through;
/// every other byte becomes `%xx`. An empty name becomes a lone `%`, which
/// no escaped name can produce.
pub fn path_component(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }

    let mut escaped = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "%{byte:02x}");
        }
    }
    escaped
}

pub struct JsonFileStore {
    root: PathBuf,
    /// One entry per key ever appended to; entries live as long as the store.
    append_locks: Mutex<HashMap<SubjectKey, Arc<Mutex<()>>>>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            append_locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_dir(&self, key: &SubjectKey) -> PathBuf {
        self.root.join(path_component(&key.user))
    }

    fn document_prefix(key: &SubjectKey) -> String {
        format!("{}_", path_component(&key.subject))
    }

    async fn lock_for(&self, key: &SubjectKey) -> Arc<Mutex<()>> {
        let mut locks = self.append_locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Documents for `key` ordered by upload sequence.
    async fn load_documents(&self, key: &SubjectKey) -> Result<Vec<StoredDocument>, StoreError> {
        let dir = self.user_dir(key);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let prefix = Self::document_prefix(key);
        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_candidate = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".json"));
            if !is_candidate {
                continue;
            }

            let raw = tokio::fs::read_to_string(&path).await?;
            let document: StoredDocument =
                serde_json::from_str(&raw).map_err(|error| StoreError::Corrupt {
                    path: path.display().to_string(),
                    details: error.to_string(),
                })?;

            if document.user == key.user && document.subject == key.subject {
                documents.push(document);
            } else {
                warn!(path = %path.display(), key = %key, "stored document belongs to another key");
            }
        }

        documents.sort_by_key(|document| document.sequence);
        Ok(documents)
    }
}

#[async_trait]
impl KnowledgeStore for JsonFileStore {
    async fn append(
        &self,
        key: &SubjectKey,
        file_name: &str,
        checksum: &str,
        segments: Vec<Segment>,
    ) -> Result<usize, StoreError> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let existing = self.load_documents(key).await?;
        let stored_before = existing
            .iter()
            .map(|document| document.pages.len())
            .sum::<usize>();
        let sequence = existing
            .last()
            .map_or(1, |document| document.sequence.saturating_add(1));

        let document = StoredDocument {
            document_id: Uuid::new_v4(),
            user: key.user.clone(),
            subject: key.subject.clone(),
            file_name: file_name.to_string(),
            sequence,
            checksum: checksum.to_string(),
            uploaded_at: Utc::now(),
            pages: segments
                .into_iter()
                .map(|segment| StoredPage {
                    page: segment.page,
                    reference: segment.reference,
                    text: segment.text,
                })
                .collect(),
        };
        let added = document.pages.len();

        let dir = self.user_dir(key);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!(
            "{}{sequence:04}_{}.json",
            Self::document_prefix(key),
            sanitize_file_name(file_name)
        ));
        let tmp_path = path.with_extension("json.tmp");

        let data = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(&tmp_path, data).await?;
        if let Err(error) = tokio::fs::rename(&tmp_path, &path).await {
            warn!(path = %path.display(), %error, "could not move stored document into place");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(error.into());
        }

        debug!(key = %key, path = %path.display(), pages = added, "stored document");
        Ok(stored_before + added)
    }

    async fn segments(&self, key: &SubjectKey) -> Result<Vec<Segment>, StoreError> {
        let documents = self.load_documents(key).await?;
        Ok(documents
            .into_iter()
            .flat_map(|document| document.pages)
            .map(|page| Segment {
                text: page.text,
                reference: page.reference,
                page: page.page,
            })
            .collect())
    }
}
