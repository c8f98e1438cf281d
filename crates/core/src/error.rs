use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("docx parse error: {0}")]
    DocxParse(String),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("text is not valid utf-8: {0}")]
    Encoding(String),

    #[error("document has no readable text: {0}")]
    EmptyDocument(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("extraction task failed: {0}")]
    Task(String),
}

impl IngestError {
    /// True when the uploaded document itself could not be read, as opposed
    /// to the request being malformed or the server failing.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            Self::PdfParse(_)
                | Self::DocxParse(_)
                | Self::Zip(_)
                | Self::Encoding(_)
                | Self::EmptyDocument(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt store entry {path}: {details}")]
    Corrupt { path: String, details: String },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("language model is not configured")]
    NotConfigured,

    #[error("language model timed out after {0:?}")]
    Timeout(Duration),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("language model returned {status}: {details}")]
    Status { status: u16, details: String },

    #[error("language model returned no text")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential entry must look like user:password, got {0:?}")]
    Malformed(String),

    #[error("duplicate user in credentials: {0}")]
    DuplicateUser(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("match threshold must be in (0, 1], got {0}")]
    Threshold(f64),

    #[error("confidence bands must satisfy 0 <= medium ({medium}) <= high ({high}) <= 1")]
    Bands { medium: f64, high: f64 },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_failures_are_grouped_apart_from_request_errors() {
        assert!(IngestError::EmptyDocument("blank.txt".to_string()).is_extraction_failure());
        assert!(IngestError::PdfParse("xref".to_string()).is_extraction_failure());
        assert!(!IngestError::MissingField("subject").is_extraction_failure());
        assert!(!IngestError::UnsupportedFileType("a.pptx".to_string()).is_extraction_failure());
    }

    #[test]
    fn bad_patterns_convert_into_the_regex_variant() {
        let error = regex::Regex::new("(").map_err(IngestError::from);
        assert!(matches!(error, Err(IngestError::Regex(_))));
    }
}
