use crate::{ModelError, Segment, StoreError, SubjectKey};
use async_trait::async_trait;

/// Append-only segment storage keyed by `(user, subject)`.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Appends one uploaded document's segments after everything already
    /// stored for `key`. The batch lands contiguously.
    async fn append(
        &self,
        key: &SubjectKey,
        file_name: &str,
        checksum: &str,
        segments: Vec<Segment>,
    ) -> Result<usize, StoreError>;

    /// Snapshot of every segment for `key`, in upload order.
    async fn segments(&self, key: &SubjectKey) -> Result<Vec<Segment>, StoreError>;
}

#[async_trait]
impl<T> KnowledgeStore for Box<T>
where
    T: KnowledgeStore + ?Sized,
{
    async fn append(
        &self,
        key: &SubjectKey,
        file_name: &str,
        checksum: &str,
        segments: Vec<Segment>,
    ) -> Result<usize, StoreError> {
        (**self).append(key, file_name, checksum, segments).await
    }

    async fn segments(&self, key: &SubjectKey) -> Result<Vec<Segment>, StoreError> {
        (**self).segments(key).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPrompt {
    pub system: Option<String>,
    pub user: String,
}

/// External chat model. Callers treat every error as "fall back locally".
#[async_trait]
pub trait AnswerModel: Send + Sync {
    async fn complete(&self, prompt: &ModelPrompt) -> Result<String, ModelError>;
}

#[async_trait]
impl<T> AnswerModel for Box<T>
where
    T: AnswerModel + ?Sized,
{
    async fn complete(&self, prompt: &ModelPrompt) -> Result<String, ModelError> {
        (**self).complete(prompt).await
    }
}
