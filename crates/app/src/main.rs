mod commands;

use chrono::Utc;
use clap::Parser;
use commands::{Command, HELP};
use ragify_core::services::gemini::{
    DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL, EMBEDDING_001_DIMENSIONS,
};
use ragify_core::{
    load_documents, CharacterNgramEmbedder, DiskIndexStore, EchoGenerator, Embedder,
    GeminiConfig, GeminiEmbedder, GeminiGenerator, Generator, IndexLifecycle, IndexStorage,
    LifecycleWarning, QueryExecutor, RagConfig, SessionRegistry, Speaker,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ragify", version)]
struct Cli {
    /// Directory holding one index directory per session
    #[arg(long, env = "RAGIFY_STORAGE_ROOT", default_value = "ragify_index")]
    storage_root: PathBuf,

    /// Chunk size in characters
    #[arg(long, env = "RAGIFY_CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by neighbouring chunks
    #[arg(long, env = "RAGIFY_CHUNK_OVERLAP", default_value = "100")]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, env = "RAGIFY_TOP_K", default_value = "4")]
    top_k: usize,

    /// Prior turns resent with each question; unset resends the whole transcript
    #[arg(long, env = "RAGIFY_HISTORY_WINDOW")]
    history_window: Option<usize>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini embedding model
    #[arg(long, env = "RAGIFY_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Length of the vectors the embedding model returns
    #[arg(long, env = "RAGIFY_EMBEDDING_DIMENSIONS", default_value_t = EMBEDDING_001_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Gemini chat model
    #[arg(long, env = "RAGIFY_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Sampling temperature
    #[arg(long, env = "RAGIFY_TEMPERATURE", default_value = "0.4")]
    temperature: f32,

    /// Use the local trigram embedder and the echo generator
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Session to create at startup
    #[arg(long)]
    session: Option<String>,
}

impl Cli {
    fn rag_config(&self) -> RagConfig {
        RagConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
            storage_root: self.storage_root.clone(),
            history_window: self.history_window,
            ..RagConfig::default()
        }
    }

    fn collaborators(&self) -> anyhow::Result<(Arc<dyn Embedder>, Arc<dyn Generator>)> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());

        match api_key {
            Some(api_key) if !self.offline => {
                let config = GeminiConfig {
                    embedding_model: self.embedding_model.clone(),
                    chat_model: self.chat_model.clone(),
                    temperature: self.temperature,
                    ..GeminiConfig::new(api_key)
                };
                let embedder: Arc<dyn Embedder> = Arc::new(
                    GeminiEmbedder::new(&config)?.with_dimensions(self.embedding_dimensions),
                );
                let generator: Arc<dyn Generator> = Arc::new(GeminiGenerator::new(&config)?);
                Ok((embedder, generator))
            }
            _ => {
                if !self.offline {
                    warn!("GEMINI_API_KEY is not set; running offline");
                }
                let embedder: Arc<dyn Embedder> = Arc::new(CharacterNgramEmbedder::default());
                let generator: Arc<dyn Generator> = Arc::new(EchoGenerator);
                Ok((embedder, generator))
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.rag_config();
    let (embedder, generator) = cli.collaborators()?;
    let storage: Arc<dyn IndexStorage> = Arc::new(DiskIndexStore::new());

    let lifecycle = IndexLifecycle::new(embedder.clone(), storage.clone(), &config)?;
    let mut registry = SessionRegistry::new(lifecycle);
    let executor = QueryExecutor::new(embedder, storage, generator, &config);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        storage_root = %config.storage_root.display(),
        "ragify boot"
    );

    if let Some(name) = &cli.session {
        registry.create(name)?;
    }

    println!("ragify {app_version}. Type /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&registry)?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match commands::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(command, &mut registry, &executor).await,
            Err(message) => println!("error: {message}"),
        }
    }

    Ok(())
}

fn prompt(registry: &SessionRegistry) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}> ", registry.current_name().unwrap_or(""))?;
    stdout.flush()
}

fn print_warnings(warnings: &[LifecycleWarning]) {
    for warning in warnings {
        println!("warning: {warning}");
    }
}

async fn execute(command: Command, registry: &mut SessionRegistry, executor: &QueryExecutor) {
    match command {
        Command::Empty | Command::Quit => {}
        Command::Help => println!("{HELP}"),
        Command::New(name) => match registry.create(&name) {
            Ok(session) => println!("created session '{}'", session.name()),
            Err(error) => println!("error: {error}"),
        },
        Command::Switch(name) => match registry.select(&name) {
            Ok(session) => println!("switched to '{}'", session.name()),
            Err(error) => println!("error: {error}"),
        },
        Command::Delete(name) => {
            let Some(name) = name.or_else(|| registry.current_name().map(str::to_string)) else {
                println!("error: no session is selected");
                return;
            };
            match registry.delete(&name).await {
                Ok(warnings) => {
                    print_warnings(&warnings);
                    println!("deleted session '{name}'");
                }
                Err(error) => println!("error: {error}"),
            }
        }
        Command::Sessions => {
            if registry.is_empty() {
                println!("no sessions yet; create one with /new <name>");
            }
            for session in registry.sessions() {
                let marker = if registry.current_name() == Some(session.name()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {} ({} document(s), {} turn(s))",
                    session.name(),
                    session.documents().len(),
                    session.transcript().len()
                );
            }
        }
        Command::Add(paths) => {
            let Some(name) = registry.current_name().map(str::to_string) else {
                println!("error: create a session first with /new <name>");
                return;
            };
            let report = match tokio::task::spawn_blocking(move || load_documents(&paths)).await {
                Ok(report) => report,
                Err(error) => {
                    println!("error: document loading failed: {error}");
                    return;
                }
            };
            for skipped in &report.skipped {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
                println!("skipped {}: {}", skipped.path.display(), skipped.reason);
            }
            if report.documents.is_empty() {
                println!("no documents loaded");
                return;
            }

            let count = report.documents.len();
            match registry.add_documents(&name, report.documents).await {
                Ok(rebuild) => {
                    print_warnings(&rebuild.warnings);
                    println!(
                        "{count} document(s) added; index has {} chunk(s)",
                        rebuild.chunk_count
                    );
                }
                Err(error) => println!("error: {error}"),
            }
        }
        Command::Remove(index) => {
            let Some(name) = registry.current_name().map(str::to_string) else {
                println!("error: no session is selected");
                return;
            };
            match registry.remove_document(&name, index).await {
                Ok(rebuild) => {
                    print_warnings(&rebuild.warnings);
                    match rebuild.generation {
                        Some(_) => println!("document removed; index has {} chunk(s)", rebuild.chunk_count),
                        None => println!("document removed; no documents left"),
                    }
                }
                Err(error) => println!("error: {error}"),
            }
        }
        Command::Docs => match registry.current() {
            Some(session) if !session.documents().is_empty() => {
                for (position, document) in session.documents().iter().enumerate() {
                    println!(
                        "{}. {} ({} chars)",
                        position + 1,
                        document.source_name,
                        document.text.chars().count()
                    );
                }
            }
            Some(_) => println!("no documents; add some with /add <path>"),
            None => println!("error: no session is selected"),
        },
        Command::History => match registry.current() {
            Some(session) => {
                for turn in session.transcript() {
                    let speaker = match turn.speaker {
                        Speaker::User => "You",
                        Speaker::Assistant => "AI",
                    };
                    println!("{speaker}: {}", turn.text);
                }
            }
            None => println!("error: no session is selected"),
        },
        Command::Ask(question) => match registry.current_mut() {
            Ok(session) => {
                let answer = executor.answer(session, &question).await;
                println!("{}", answer.text);
                for hit in &answer.sources {
                    println!("  [source: {} #{}]", hit.chunk.source_name, hit.chunk.ordinal);
                }
            }
            Err(_) => println!("error: create a session first with /new <name>"),
        },
    }
}
