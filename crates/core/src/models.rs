use crate::error::AskError;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_USER: &str = "guest";

/// A unit of retrievable note text and where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    #[serde(rename = "ref")]
    pub reference: String,
    /// 1-based page or paragraph number inside the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

impl Segment {
    pub fn new(text: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference: reference.into(),
            page: None,
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }
}

/// Normalized `(user, subject)` pair that owns a list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectKey {
    pub user: String,
    pub subject: String,
}

impl SubjectKey {
    pub fn new(user: Option<&str>, subject: &str) -> Self {
        let user = user
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        Self {
            user,
            subject: subject.trim().to_lowercase(),
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.subject)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub segment: Segment,
    pub score: f64,
    pub confidence: Confidence,
}

/// How a keyword is looked up inside cleaned segment text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    /// Keyword may match inside a longer word ("cell" matches "cellular").
    #[default]
    Substring,
    /// Keyword must equal a whole cleaned token.
    TokenBoundary,
}

impl FromStr for Containment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "substring" => Ok(Self::Substring),
            "token" | "token_boundary" | "token-boundary" => Ok(Self::TokenBoundary),
            other => Err(format!("unknown containment mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Minimum accepted score, as a fraction of the question's keywords.
    pub threshold: f64,
    pub medium_band: f64,
    pub high_band: f64,
    pub containment: Containment,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            medium_band: 0.5,
            high_band: 0.75,
            containment: Containment::Substring,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Greeting,
    NotesMissing,
    AiVerified,
    LocalMatch,
    NotFound,
    Studio,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    #[serialize_always]
    pub citation: Option<String>,
    pub confidence: Option<Confidence>,
    pub kind: AnswerKind,
}

impl Answer {
    pub fn plain(answer: impl Into<String>, kind: AnswerKind) -> Self {
        Self {
            answer: answer.into(),
            citation: None,
            confidence: None,
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadReport {
    pub file_name: String,
    pub segments: usize,
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StudioTask {
    Mcq,
    Short,
    Summary,
}

impl FromStr for StudioTask {
    type Err = AskError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mcq" => Ok(Self::Mcq),
            "short" => Ok(Self::Short),
            "summary" => Ok(Self::Summary),
            other => Err(AskError::InvalidArgument(format!("unknown studio task: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub min_line_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 600,
            min_line_chars: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub policy: MatchPolicy,
    /// Line-pack oversized segments after extraction; `None` keeps pages and
    /// paragraphs whole.
    pub chunking: Option<ChunkingConfig>,
    pub model_timeout: Duration,
    pub ask_context_chars: usize,
    pub studio_context_chars: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::default(),
            chunking: None,
            model_timeout: Duration::from_secs(15),
            ask_context_chars: 5_000,
            studio_context_chars: 4_000,
        }
    }
}
