use crate::extractor::FileKind;
use crate::service::AnswerService;
use crate::traits::{AnswerModel, KnowledgeStore};
use crate::{IngestError, SubjectKey, UploadReport};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Reduces an uploaded name to `[A-Za-z0-9._-]` so it is safe to use as a
/// path component. Leading dots are stripped.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = base
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();

    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Every PDF/DOCX/TXT file below `folder`, sorted by path.
pub fn discover_note_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(FileKind::from_file_name)
            .is_some();

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub uploads: Vec<UploadReport>,
    pub skipped_files: Vec<SkippedFile>,
}

impl IngestionReport {
    pub fn segment_count(&self) -> usize {
        self.uploads.iter().map(|upload| upload.segments).sum()
    }
}

/// Uploads every note file in `folder` into `key`, skipping (and reporting)
/// files that fail to extract.
pub async fn ingest_folder<S, M>(
    service: &AnswerService<S, M>,
    key: &SubjectKey,
    folder: &Path,
) -> Result<IngestionReport, IngestError>
where
    S: KnowledgeStore,
    M: AnswerModel,
{
    let files = discover_note_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf, docx or txt files found in {}",
            folder.display()
        )));
    }

    let mut uploads = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
            })?
            .to_string();

        let result = match tokio::fs::read(&path).await {
            Ok(bytes) => service.ingest(key, &file_name, bytes).await,
            Err(error) => Err(IngestError::Io(error)),
        };

        match result {
            Ok(report) => uploads.push(report),
            Err(error) if error.is_extraction_failure() => {
                warn!(path = %path.display(), %error, "skipped note file");
                skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
            }
            Err(error) => return Err(error),
        }
    }

    info!(
        key = %key,
        files = uploads.len(),
        skipped = skipped_files.len(),
        "folder ingested"
    );

    Ok(IngestionReport {
        uploads,
        skipped_files,
    })
}
