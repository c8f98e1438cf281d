use crate::chunking::split_segments;
use crate::cleaner::extract_keywords;
use crate::extractor::extract;
use crate::ingest::digest_bytes;
use crate::llm::truncate_chars;
use crate::matcher::best_match;
use crate::studio::{local_material, studio_instruction};
use crate::traits::{AnswerModel, KnowledgeStore, ModelPrompt};
use crate::{
    Answer, AnswerKind, AskError, IngestError, ModelError, Segment, ServiceOptions, StudioTask,
    SubjectKey, UploadReport,
};
use tracing::{debug, info, warn};

const GREETINGS: [&str; 3] = ["hi", "hello", "hey"];

pub const NOTES_MISSING: &str = "Please upload notes first!";
pub const STUDIO_NOTES_MISSING: &str = "Upload notes first!";
pub const NOT_FOUND: &str = "No direct match found in your notes. [Strict Mode]";
pub const AI_CITATION: &str = "AI Verified";

/// Upload and question orchestration over a store and an optional model.
pub struct AnswerService<S, M>
where
    S: KnowledgeStore,
    M: AnswerModel,
{
    store: S,
    model: M,
    options: ServiceOptions,
}

impl<S, M> AnswerService<S, M>
where
    S: KnowledgeStore,
    M: AnswerModel,
{
    pub fn new(store: S, model: M, options: ServiceOptions) -> Self {
        Self {
            store,
            model,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Extracts `bytes` and appends the resulting segments to `key`.
    pub async fn ingest(
        &self,
        key: &SubjectKey,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReport, IngestError> {
        if key.subject.is_empty() {
            return Err(IngestError::MissingField("subject"));
        }

        let file_name = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(file_name)
            .trim()
            .to_string();
        if file_name.is_empty() {
            return Err(IngestError::MissingField("file"));
        }

        let checksum = digest_bytes(&bytes);
        let name = file_name.clone();
        let mut segments = tokio::task::spawn_blocking(move || extract(&bytes, &name))
            .await
            .map_err(|error| IngestError::Task(error.to_string()))??;

        if let Some(config) = self.options.chunking {
            segments = split_segments(segments, config);
        }

        let added = segments.len();
        let total = self
            .store
            .append(key, &file_name, &checksum, segments)
            .await?;

        info!(key = %key, file = %file_name, segments = added, total, "notes uploaded");

        Ok(UploadReport {
            file_name,
            segments: added,
            checksum,
        })
    }

    pub async fn ask(&self, key: &SubjectKey, question: &str) -> Result<Answer, AskError> {
        if key.subject.is_empty() {
            return Err(AskError::MissingField("subject"));
        }

        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::MissingField("question"));
        }

        if GREETINGS.contains(&question.to_lowercase().as_str()) {
            return Ok(Answer::plain(greeting(key), AnswerKind::Greeting));
        }

        let notes = self.store.segments(key).await?;
        if notes.is_empty() {
            debug!(key = %key, "question before any upload");
            return Ok(Answer::plain(NOTES_MISSING, AnswerKind::NotesMissing));
        }

        if let Some(text) = self.consult_model(&ask_prompt(key, &notes, question, &self.options)).await {
            return Ok(Answer {
                answer: text,
                citation: Some(AI_CITATION.to_string()),
                confidence: None,
                kind: AnswerKind::AiVerified,
            });
        }

        let keywords = extract_keywords(question);
        match best_match(&keywords, &notes, &self.options.policy) {
            Some(found) => {
                debug!(
                    key = %key,
                    score = found.score,
                    citation = %found.segment.reference,
                    "local match"
                );
                Ok(Answer {
                    answer: found.segment.text,
                    citation: Some(found.segment.reference),
                    confidence: Some(found.confidence),
                    kind: AnswerKind::LocalMatch,
                })
            }
            None => {
                debug!(key = %key, keywords = keywords.len(), "no segment cleared the threshold");
                Ok(Answer::plain(NOT_FOUND, AnswerKind::NotFound))
            }
        }
    }

    /// Practice material for `task`, from the model when it answers and from
    /// the local generators otherwise.
    pub async fn generate_studio(
        &self,
        key: &SubjectKey,
        task: StudioTask,
    ) -> Result<Answer, AskError> {
        if key.subject.is_empty() {
            return Err(AskError::MissingField("subject"));
        }

        let notes = self.store.segments(key).await?;
        if notes.is_empty() {
            return Ok(Answer::plain(STUDIO_NOTES_MISSING, AnswerKind::NotesMissing));
        }

        let context = notes
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = ModelPrompt {
            system: None,
            user: format!(
                "Text: {}\nTask: {}. Use double newlines between items.",
                truncate_chars(&context, self.options.studio_context_chars),
                studio_instruction(task)
            ),
        };

        if let Some(text) = self.consult_model(&prompt).await {
            return Ok(Answer::plain(text, AnswerKind::Studio));
        }

        let material = {
            let mut rng = rand::thread_rng();
            local_material(task, &notes, &context, &mut rng)
        };
        Ok(Answer::plain(material, AnswerKind::Studio))
    }

    /// One bounded model call. `None` means "answer locally".
    async fn consult_model(&self, prompt: &ModelPrompt) -> Option<String> {
        let timeout = self.options.model_timeout;
        match tokio::time::timeout(timeout, self.model.complete(prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => {
                warn!("model returned blank text; using local notes");
                None
            }
            Ok(Err(ModelError::NotConfigured)) => None,
            Ok(Err(error)) => {
                warn!(%error, "model call failed; using local notes");
                None
            }
            Err(_) => {
                warn!(error = %ModelError::Timeout(timeout), "model call failed; using local notes");
                None
            }
        }
    }
}

fn greeting(key: &SubjectKey) -> String {
    let mut chars = key.user.chars();
    let user = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!(
        "Hi {user}, I'm ready. What would you like to study in {} today?",
        key.subject
    )
}

fn ask_prompt(
    key: &SubjectKey,
    notes: &[Segment],
    question: &str,
    options: &ServiceOptions,
) -> ModelPrompt {
    let joined = notes
        .iter()
        .map(|segment| segment.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    ModelPrompt {
        system: Some(format!(
            "You are a strict tutor for {}. Answer only from the student's notes; \
             if the notes do not cover the question, say so. Format with clear spacing.",
            key.subject
        )),
        user: format!(
            "NOTES:\n{}\n\nQ: {question}",
            truncate_chars(&joined, options.ask_context_chars)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::tests::{docx_bytes, pdf_bytes};
    use crate::llm::DisabledModel;
    use crate::stores::MemoryStore;
    use crate::Confidence;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    enum Behaviour {
        Answer(&'static str),
        Fail,
        Hang,
    }

    struct FakeModel {
        behaviour: Behaviour,
        calls: AtomicUsize,
        prompts: Mutex<Vec<ModelPrompt>>,
    }

    impl FakeModel {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AnswerModel for FakeModel {
        async fn complete(&self, prompt: &ModelPrompt) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.clone());
            }
            match self.behaviour {
                Behaviour::Answer(text) => Ok(text.to_string()),
                Behaviour::Fail => Err(ModelError::Status {
                    status: 429,
                    details: "quota exceeded".to_string(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("too late".to_string())
                }
            }
        }
    }

    fn local_service() -> AnswerService<MemoryStore, DisabledModel> {
        AnswerService::new(MemoryStore::new(), DisabledModel, ServiceOptions::default())
    }

    fn biology() -> SubjectKey {
        SubjectKey::new(Some("roshni"), "biology")
    }

    const MITOCHONDRIA: &[u8] = b"The mitochondria is the powerhouse of the cell.";

    #[tokio::test]
    async fn uploaded_sentence_answers_with_high_confidence() -> Result<(), Box<dyn std::error::Error>> {
        let service = local_service();
        let report = service.ingest(&biology(), "bio.txt", MITOCHONDRIA.to_vec()).await?;
        assert_eq!(report.segments, 1);
        assert_eq!(report.file_name, "bio.txt");

        let answer = service
            .ask(&biology(), "What is the powerhouse of the cell?")
            .await?;

        assert_eq!(answer.kind, AnswerKind::LocalMatch);
        assert_eq!(answer.answer, "The mitochondria is the powerhouse of the cell.");
        assert_eq!(answer.citation.as_deref(), Some("bio.txt"));
        assert_eq!(answer.confidence, Some(Confidence::High));
        Ok(())
    }

    #[tokio::test]
    async fn asking_before_upload_reports_missing_notes() -> Result<(), AskError> {
        let answer = local_service().ask(&biology(), "What is osmosis?").await?;
        assert_eq!(answer.kind, AnswerKind::NotesMissing);
        assert_eq!(answer.answer, NOTES_MISSING);
        assert!(answer.citation.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn greeting_bypasses_store_and_model() -> Result<(), AskError> {
        let model = FakeModel::new(Behaviour::Answer("model text"));
        let service = AnswerService::new(MemoryStore::new(), model, ServiceOptions::default());

        let answer = service.ask(&biology(), "  Hi ").await?;

        assert_eq!(answer.kind, AnswerKind::Greeting);
        assert_eq!(
            answer.answer,
            "Hi Roshni, I'm ready. What would you like to study in biology today?"
        );
        assert_eq!(service.model.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unmatched_question_is_not_found_rather_than_error() -> Result<(), Box<dyn std::error::Error>> {
        let service = local_service();
        service.ingest(&biology(), "bio.txt", MITOCHONDRIA.to_vec()).await?;

        let answer = service.ask(&biology(), "Explain plate tectonics").await?;

        assert_eq!(answer.kind, AnswerKind::NotFound);
        assert_eq!(answer.answer, NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn blank_question_and_subject_are_missing_fields() {
        let service = local_service();
        assert!(matches!(
            service.ask(&biology(), "   ").await,
            Err(AskError::MissingField("question"))
        ));
        assert!(matches!(
            service.ask(&SubjectKey::new(None, " "), "why?").await,
            Err(AskError::MissingField("subject"))
        ));
    }

    #[tokio::test]
    async fn model_answer_is_tagged_ai_verified() -> Result<(), Box<dyn std::error::Error>> {
        let model = FakeModel::new(Behaviour::Answer("Mitochondria make ATP."));
        let service = AnswerService::new(MemoryStore::new(), model, ServiceOptions::default());
        service.ingest(&biology(), "bio.txt", MITOCHONDRIA.to_vec()).await?;

        let answer = service.ask(&biology(), "What makes ATP?").await?;

        assert_eq!(answer.kind, AnswerKind::AiVerified);
        assert_eq!(answer.answer, "Mitochondria make ATP.");
        assert_eq!(answer.citation.as_deref(), Some(AI_CITATION));

        let prompts = service
            .model
            .prompts
            .lock()
            .map_err(|_| "prompt log poisoned")?
            .clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].user.contains("powerhouse of the cell"));
        assert!(prompts[0].user.ends_with("Q: What makes ATP?"));
        assert!(prompts[0]
            .system
            .as_deref()
            .is_some_and(|system| system.contains("biology")));
        Ok(())
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_local_notes() -> Result<(), Box<dyn std::error::Error>> {
        let model = FakeModel::new(Behaviour::Fail);
        let service = AnswerService::new(MemoryStore::new(), model, ServiceOptions::default());
        service.ingest(&biology(), "bio.txt", MITOCHONDRIA.to_vec()).await?;

        let answer = service
            .ask(&biology(), "What is the powerhouse of the cell?")
            .await?;

        assert_eq!(answer.kind, AnswerKind::LocalMatch);
        assert_eq!(service.model.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn model_timeout_falls_back_to_local_notes() -> Result<(), Box<dyn std::error::Error>> {
        let options = ServiceOptions {
            model_timeout: Duration::from_millis(50),
            ..ServiceOptions::default()
        };
        let service = AnswerService::new(MemoryStore::new(), FakeModel::new(Behaviour::Hang), options);
        service.ingest(&biology(), "bio.txt", MITOCHONDRIA.to_vec()).await?;

        let answer = service
            .ask(&biology(), "What is the powerhouse of the cell?")
            .await?;

        assert_eq!(answer.kind, AnswerKind::LocalMatch);
        Ok(())
    }

    #[tokio::test]
    async fn context_sent_to_the_model_is_truncated() -> Result<(), Box<dyn std::error::Error>> {
        let options = ServiceOptions {
            ask_context_chars: 20,
            ..ServiceOptions::default()
        };
        let service = AnswerService::new(
            MemoryStore::new(),
            FakeModel::new(Behaviour::Answer("ok")),
            options,
        );
        service.ingest(&biology(), "bio.txt", MITOCHONDRIA.to_vec()).await?;
        service.ask(&biology(), "anything useful?").await?;

        let prompts = service
            .model
            .prompts
            .lock()
            .map_err(|_| "prompt log poisoned")?
            .clone();
        assert_eq!(prompts[0].user, "NOTES:\nThe mitochondria is \n\nQ: anything useful?");
        Ok(())
    }

    #[tokio::test]
    async fn uploads_keep_order_across_documents() -> Result<(), Box<dyn std::error::Error>> {
        let service = local_service();
        let key = SubjectKey::new(None, "physics");
        service
            .ingest(&key, "a.txt", b"Momentum is mass times velocity.".to_vec())
            .await?;
        service
            .ingest(&key, "b.txt", b"Momentum is conserved in collisions.".to_vec())
            .await?;

        let texts = service
            .store()
            .segments(&key)
            .await?
            .into_iter()
            .map(|segment| segment.reference)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["a.txt", "b.txt"]);

        let first = service.ask(&key, "What about momentum?").await?;
        let second = service.ask(&key, "What about momentum?").await?;
        assert_eq!(first, second);
        assert_eq!(first.citation.as_deref(), Some("a.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn upload_rejections_are_distinguishable() {
        let service = local_service();

        assert!(matches!(
            service.ingest(&biology(), "slides.pptx", b"x".to_vec()).await,
            Err(IngestError::UnsupportedFileType(_))
        ));
        assert!(matches!(
            service.ingest(&biology(), "  ", b"x".to_vec()).await,
            Err(IngestError::MissingField("file"))
        ));
        assert!(matches!(
            service.ingest(&SubjectKey::new(None, ""), "a.txt", b"x".to_vec()).await,
            Err(IngestError::MissingField("subject"))
        ));

        let corrupt = service
            .ingest(&biology(), "broken.pdf", b"%PDF-1.4\n%broken".to_vec())
            .await;
        assert!(corrupt.is_err_and(|error| error.is_extraction_failure()));
    }

    #[tokio::test]
    async fn pdf_and_docx_uploads_are_searchable() -> Result<(), Box<dyn std::error::Error>> {
        let service = local_service();
        let key = SubjectKey::new(None, "physics");
        service
            .ingest(&key, "laws.pdf", pdf_bytes(&["Friction opposes motion", "Gravity pulls masses together"])?)
            .await?;
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Voltage drives current through resistance</w:t></w:r></w:p></w:body></w:document>"#;
        service.ingest(&key, "circuits.docx", docx_bytes(xml)?).await?;

        let gravity = service.ask(&key, "What pulls masses together?").await?;
        assert_eq!(gravity.citation.as_deref(), Some("laws.pdf, page 2"));

        let voltage = service.ask(&key, "What drives current?").await?;
        assert_eq!(voltage.citation.as_deref(), Some("circuits.docx, paragraph 1"));
        Ok(())
    }

    #[tokio::test]
    async fn studio_uses_model_when_available() -> Result<(), Box<dyn std::error::Error>> {
        let service = AnswerService::new(
            MemoryStore::new(),
            FakeModel::new(Behaviour::Answer("1. Q\n\n2. Q")),
            ServiceOptions::default(),
        );
        service.ingest(&biology(), "bio.txt", MITOCHONDRIA.to_vec()).await?;

        let answer = service.generate_studio(&biology(), StudioTask::Short).await?;

        assert_eq!(answer.kind, AnswerKind::Studio);
        assert_eq!(answer.answer, "1. Q\n\n2. Q");
        let prompts = service
            .model
            .prompts
            .lock()
            .map_err(|_| "prompt log poisoned")?
            .clone();
        assert!(prompts[0].user.contains("Task: 2 short question and answer pairs"));
        Ok(())
    }

    #[tokio::test]
    async fn studio_falls_back_to_local_material() -> Result<(), Box<dyn std::error::Error>> {
        let service = local_service();
        assert_eq!(
            service.generate_studio(&biology(), StudioTask::Summary).await?.answer,
            STUDIO_NOTES_MISSING
        );

        service.ingest(&biology(), "bio.txt", MITOCHONDRIA.to_vec()).await?;
        let summary = service.generate_studio(&biology(), StudioTask::Summary).await?;

        assert_eq!(summary.kind, AnswerKind::Studio);
        assert!(summary.answer.starts_with("**LOCAL SUMMARY**"));
        assert!(summary.answer.contains("• The mitochondria is the powerhouse of the cell."));
        Ok(())
    }
}
