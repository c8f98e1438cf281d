mod http;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use http::{AppState, NotesService};
use notes_qa_core::{
    extract, ingest_folder, AnswerModel, AnswerService, ChatModelConfig, ChunkingConfig,
    Containment, CredentialMap, DisabledModel, JsonFileStore, KnowledgeStore, MatchPolicy,
    MemoryStore, OpenAiChatModel, ServiceOptions, SubjectKey,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "notes-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Where uploaded notes are kept.
    #[arg(long, env = "NOTES_QA_STORE", value_enum, default_value_t = StoreKind::Memory, global = true)]
    store: StoreKind,

    /// Root directory of the json store.
    #[arg(long, env = "NOTES_QA_DATA_DIR", default_value = "processed", global = true)]
    data_dir: PathBuf,

    /// Minimum keyword overlap for a local answer.
    #[arg(long, env = "NOTES_QA_MATCH_THRESHOLD", default_value_t = 0.4, global = true)]
    match_threshold: f64,

    #[arg(long, env = "NOTES_QA_MEDIUM_BAND", default_value_t = 0.5, global = true)]
    medium_band: f64,

    #[arg(long, env = "NOTES_QA_HIGH_BAND", default_value_t = 0.75, global = true)]
    high_band: f64,

    /// Keyword lookup mode: substring or token.
    #[arg(long, env = "NOTES_QA_CONTAINMENT", default_value = "substring", global = true)]
    containment: Containment,

    /// Split extracted segments longer than this many characters.
    #[arg(long, env = "NOTES_QA_CHUNK_MAX_CHARS", global = true)]
    chunk_max_chars: Option<usize>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "NOTES_QA_LLM_BASE_URL", default_value = notes_qa_core::llm::DEFAULT_BASE_URL, global = true)]
    llm_base_url: String,

    #[arg(long, env = "NOTES_QA_LLM_MODEL", default_value = notes_qa_core::llm::DEFAULT_CHAT_MODEL, global = true)]
    llm_model: String,

    /// Leave unset to answer from local notes only.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    llm_api_key: Option<String>,

    #[arg(long, env = "NOTES_QA_LLM_TIMEOUT_SECS", default_value_t = 15, global = true)]
    llm_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, env = "NOTES_QA_BIND", default_value = "127.0.0.1:5000")]
        bind: SocketAddr,

        /// Login accounts as `user:password` pairs separated by commas.
        #[arg(long, env = "NOTES_QA_USERS", default_value = "", hide_env_values = true)]
        users: String,

        #[arg(long, env = "NOTES_QA_MAX_UPLOAD_MB", default_value_t = 25)]
        max_upload_mb: usize,
    },
    /// Print the segments extracted from one document.
    Extract {
        #[arg(long)]
        file: PathBuf,
    },
    /// Load a folder of notes and answer one question.
    Ask {
        /// Folder that contains notes recursively.
        #[arg(long)]
        folder: PathBuf,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        question: String,
        #[arg(long)]
        user: Option<String>,
    },
}

impl Cli {
    fn service_options(&self) -> anyhow::Result<ServiceOptions> {
        let policy = MatchPolicy {
            threshold: self.match_threshold,
            medium_band: self.medium_band,
            high_band: self.high_band,
            containment: self.containment,
        };
        policy.validate()?;

        let chunking = self.chunk_max_chars.map(|max_chars| ChunkingConfig {
            max_chars,
            ..ChunkingConfig::default()
        });

        Ok(ServiceOptions {
            policy,
            chunking,
            model_timeout: Duration::from_secs(self.llm_timeout_secs),
            ..ServiceOptions::default()
        })
    }

    fn knowledge_store(&self) -> Box<dyn KnowledgeStore> {
        match self.store {
            StoreKind::Memory => Box::new(MemoryStore::new()),
            StoreKind::Json => Box::new(JsonFileStore::new(&self.data_dir)),
        }
    }

    fn answer_model(&self) -> anyhow::Result<Box<dyn AnswerModel>> {
        let api_key = self
            .llm_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());

        let Some(api_key) = api_key else {
            info!("no model api key configured; answering from local notes only");
            return Ok(Box::new(DisabledModel));
        };

        let config = ChatModelConfig {
            base_url: self.llm_base_url.clone(),
            model: self.llm_model.clone(),
            api_key: Some(api_key.to_string()),
            timeout: Duration::from_secs(self.llm_timeout_secs),
        };
        let model = OpenAiChatModel::new(&config).context("building language model client")?;
        info!(endpoint = %model.endpoint(), model = %config.model, "language model enabled");
        Ok(Box::new(model))
    }

    fn service(&self) -> anyhow::Result<NotesService> {
        Ok(AnswerService::new(
            self.knowledge_store(),
            self.answer_model()?,
            self.service_options()?,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        store = ?cli.store,
        "notes-qa boot"
    );

    match &cli.command {
        Command::Serve {
            bind,
            users,
            max_upload_mb,
        } => {
            let credentials = CredentialMap::parse(users).context("parsing --users")?;
            if credentials.is_empty() {
                warn!("no login accounts configured; /login rejects everyone");
            }

            let state = AppState {
                service: Arc::new(cli.service()?),
                credentials: Arc::new(credentials),
            };
            let app = http::router(state, max_upload_mb.saturating_mul(1024 * 1024));

            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            info!(address = %bind, "listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Command::Extract { file } => {
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("path has no file name: {}", file.display()))?;
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;

            let segments = extract(&bytes, file_name)?;
            for segment in &segments {
                println!("[{}]\n{}\n", segment.reference, segment.text);
            }
            println!("{} segments", segments.len());
        }
        Command::Ask {
            folder,
            subject,
            question,
            user,
        } => {
            let service = cli.service()?;
            let key = SubjectKey::new(user.as_deref(), subject);

            let report = ingest_folder(&service, &key, folder).await?;
            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped note file");
            }
            info!(
                files = report.uploads.len(),
                segments = report.segment_count(),
                "notes loaded"
            );

            let answer = service.ask(&key, question).await?;
            println!("{}", answer.answer);
            if let Some(citation) = &answer.citation {
                println!("source: {citation}");
            }
            if let Some(confidence) = answer.confidence {
                println!("confidence: {confidence}");
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "could not listen for shutdown signal");
    }
    info!("shutting down");
}
