pub mod auth;
pub mod chunking;
pub mod cleaner;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod matcher;
pub mod models;
pub mod service;
pub mod stores;
pub mod studio;
pub mod traits;

pub use auth::CredentialMap;
pub use chunking::{chunk_lines, normalize_whitespace, split_segments};
pub use cleaner::{clean, extract_keywords};
pub use error::{
    AskError, ConfigError, CredentialError, IngestError, ModelError, Result, StoreError,
};
pub use extractor::{extract, DocumentExtractor, DocxExtractor, FileKind, LopdfExtractor, TextExtractor};
pub use ingest::{
    digest_bytes, discover_note_files, ingest_folder, sanitize_file_name, IngestionReport,
    SkippedFile,
};
pub use llm::{ChatModelConfig, DisabledModel, OpenAiChatModel};
pub use matcher::best_match;
pub use models::{
    Answer, AnswerKind, ChunkingConfig, Confidence, Containment, MatchPolicy, MatchResult,
    Segment, ServiceOptions, StudioTask, SubjectKey, UploadReport, DEFAULT_USER,
};
pub use service::AnswerService;
pub use stores::{JsonFileStore, MemoryStore};
pub use traits::{AnswerModel, KnowledgeStore, ModelPrompt};
