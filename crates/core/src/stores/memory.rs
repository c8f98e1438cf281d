use crate::traits::KnowledgeStore;
use crate::{Segment, StoreError, SubjectKey};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type SegmentList = Arc<RwLock<Vec<Segment>>>;

/// Process-lifetime store. Each `(user, subject)` list has its own lock so
/// an upload to one subject never waits on another.
#[derive(Default)]
pub struct MemoryStore {
    /// One entry per key ever appended to; entries live as long as the store.
    subjects: RwLock<HashMap<SubjectKey, SegmentList>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn list_for(&self, key: &SubjectKey) -> SegmentList {
        if let Some(list) = self.subjects.read().await.get(key) {
            return Arc::clone(list);
        }

        let mut subjects = self.subjects.write().await;
        Arc::clone(subjects.entry(key.clone()).or_default())
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn append(
        &self,
        key: &SubjectKey,
        _file_name: &str,
        _checksum: &str,
        segments: Vec<Segment>,
    ) -> Result<usize, StoreError> {
        let list = self.list_for(key).await;
        let mut guard = list.write().await;
        guard.extend(segments);
        Ok(guard.len())
    }

    async fn segments(&self, key: &SubjectKey) -> Result<Vec<Segment>, StoreError> {
        let list = match self.subjects.read().await.get(key) {
            Some(list) => Arc::clone(list),
            None => return Ok(Vec::new()),
        };
        let snapshot = list.read().await.clone();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(prefix: &str, count: usize) -> Vec<Segment> {
        (0..count)
            .map(|index| Segment::new(format!("{prefix} {index}"), format!("{prefix}.txt")))
            .collect()
    }

    #[tokio::test]
    async fn appends_preserve_upload_order() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let key = SubjectKey::new(Some("roshni"), "biology");

        store.append(&key, "a.txt", "", vec![Segment::new("A", "a.txt")]).await?;
        let total = store.append(&key, "b.txt", "", vec![Segment::new("B", "b.txt")]).await?;

        assert_eq!(total, 2);
        let texts = store
            .segments(&key)
            .await?
            .into_iter()
            .map(|segment| segment.text)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["A", "B"]);
        assert_eq!(store.segments(&key).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn users_and_subjects_are_isolated() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let biology = SubjectKey::new(Some("roshni"), "biology");
        store.append(&biology, "a.txt", "", batch("bio", 2)).await?;

        assert!(store
            .segments(&SubjectKey::new(Some("sujal"), "biology"))
            .await?
            .is_empty());
        assert!(store
            .segments(&SubjectKey::new(Some("roshni"), "physics"))
            .await?
            .is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_uploads_do_not_interleave() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let key = SubjectKey::new(None, "chemistry");

        let mut handles = Vec::new();
        for upload in 0..8 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let prefix = format!("upload-{upload}");
                store.append(&key, &prefix, "", batch(&prefix, 50)).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let segments = store.segments(&key).await?;
        assert_eq!(segments.len(), 400);
        for block in segments.chunks(50) {
            let owner = &block[0].reference;
            assert!(block.iter().all(|segment| &segment.reference == owner));
        }
        Ok(())
    }
}
