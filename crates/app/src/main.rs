use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pdf_pal_core::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use pdf_pal_core::conversation::DEFAULT_MEMORY_WINDOW;
use pdf_pal_core::embeddings::{DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL};
use pdf_pal_core::llm::{DEFAULT_CHAT_MODEL, DEFAULT_CHAT_URL};
use pdf_pal_core::stores::qdrant::{DEFAULT_QDRANT_COLLECTION, DEFAULT_QDRANT_URL};
use pdf_pal_core::{
    build_chunks, collect_uploads, extract_documents_best_effort, Answer, AssistantOptions,
    CharacterNgramEmbedder, ChatClient, ChatClientConfig, ChunkingConfig, Embedder,
    HttpEmbedder, HttpEmbedderConfig, InMemoryVectorIndex, IngestionSummary, LopdfExtractor,
    PdfAssistant, PromptTemplate, QdrantStore, RecursiveSplitter, VectorIndex,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_TOP_K,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type DynEmbedder = Box<dyn Embedder + Send + Sync>;
type DynIndex = Box<dyn VectorIndex + Send + Sync>;
type Assistant = PdfAssistant<DynEmbedder, DynIndex, ChatClient>;

#[derive(Parser)]
#[command(name = "pdf-pal", version, about = "Ask questions about your PDF files")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args)]
struct PipelineArgs {
    /// OpenAI-compatible chat completions base URL
    #[arg(long, env = "PDF_PAL_CHAT_URL", default_value = DEFAULT_CHAT_URL)]
    chat_url: String,

    /// API key for the chat endpoint; GROQ_API_KEY is read when this is unset
    #[arg(long, env = "PDF_PAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat model name
    #[arg(long, env = "PDF_PAL_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    model: String,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Http)]
    embedder: EmbedderKind,

    /// OpenAI-compatible embeddings base URL
    #[arg(long, env = "PDF_PAL_EMBEDDING_URL", default_value = DEFAULT_EMBEDDING_URL)]
    embedding_url: String,

    /// Embedding model name
    #[arg(long, env = "PDF_PAL_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// API key for the embeddings endpoint, if it needs one
    #[arg(long, env = "PDF_PAL_EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Embedding vector size
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Where chunk vectors are kept
    #[arg(long, value_enum, default_value_t = VectorStoreKind::Memory)]
    vector_store: VectorStoreKind,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = DEFAULT_QDRANT_URL)]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, default_value = DEFAULT_QDRANT_COLLECTION)]
    qdrant_collection: String,

    /// Chunk size in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Number of past exchanges kept in the session memory
    #[arg(long, default_value_t = DEFAULT_MEMORY_WINDOW)]
    memory_window: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Hosted or local model behind an OpenAI-compatible /embeddings endpoint.
    Http,
    /// Offline character-trigram hashing; no model needed.
    Ngram,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VectorStoreKind {
    Memory,
    Qdrant,
}

#[derive(Subcommand)]
enum Command {
    /// Load PDFs and answer a single question.
    Ask {
        /// PDF files or folders containing PDFs.
        #[arg(long, required = true, num_args = 1..)]
        pdf: Vec<PathBuf>,
        /// Question to answer.
        #[arg(long)]
        question: String,
        /// Print the retrieved chunks used as context.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Load PDFs and chat about them interactively.
    Chat {
        /// PDF files or folders containing PDFs.
        #[arg(long, required = true, num_args = 1..)]
        pdf: Vec<PathBuf>,
        /// Print the retrieved chunks used as context.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Print the text extracted from PDFs without calling any model.
    Extract {
        /// PDF files or folders containing PDFs.
        #[arg(long, required = true, num_args = 1..)]
        pdf: Vec<PathBuf>,
        /// Print chunks instead of the full text.
        #[arg(long, default_value_t = false)]
        chunks: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-pal boot"
    );

    match cli.command {
        Command::Extract { pdf, chunks } => run_extract(&cli.pipeline, &pdf, chunks),
        Command::Ask {
            pdf,
            question,
            show_sources,
        } => {
            let assistant = build_assistant(&cli.pipeline).await?;
            load_pdfs(&assistant, &pdf).await?;

            let session = assistant.new_session().await;
            let answer = assistant
                .ask(session, &question)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            print_answer(&answer, show_sources);
            Ok(())
        }
        Command::Chat { pdf, show_sources } => {
            let assistant = build_assistant(&cli.pipeline).await?;
            load_pdfs(&assistant, &pdf).await?;
            chat_loop(&assistant, show_sources).await
        }
    }
}

async fn build_assistant(args: &PipelineArgs) -> anyhow::Result<Assistant> {
    let api_key = resolve_api_key(args.api_key.clone(), std::env::var("GROQ_API_KEY").ok())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "chat api key not found; pass --api-key or set PDF_PAL_API_KEY or GROQ_API_KEY"
            )
        })?;

    let model = ChatClient::new(ChatClientConfig {
        base_url: args.chat_url.clone(),
        model: args.model.clone(),
        ..ChatClientConfig::new(api_key)
    })
    .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let embedder: DynEmbedder = match args.embedder {
        EmbedderKind::Ngram => Box::new(CharacterNgramEmbedder {
            dimensions: args.embedding_dimensions,
        }),
        EmbedderKind::Http => Box::new(
            HttpEmbedder::new(HttpEmbedderConfig {
                base_url: args.embedding_url.clone(),
                model: args.embedding_model.clone(),
                api_key: args.embedding_api_key.clone(),
                dimensions: args.embedding_dimensions,
                ..HttpEmbedderConfig::default()
            })
            .map_err(|error| anyhow::anyhow!(error.to_string()))?,
        ),
    };

    let index: DynIndex = match args.vector_store {
        VectorStoreKind::Memory => Box::new(InMemoryVectorIndex::new(embedder.dimensions())),
        VectorStoreKind::Qdrant => {
            let store = QdrantStore::new(
                &args.qdrant_url,
                &args.qdrant_collection,
                embedder.dimensions(),
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            store
                .ensure_collection()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            Box::new(store)
        }
    };

    info!(
        chat_model = %args.model,
        embedding_model = %args.embedding_model,
        top_k = args.top_k,
        "pipeline configured"
    );

    PdfAssistant::new(
        embedder,
        index,
        model,
        AssistantOptions {
            chunking: chunking_config(args),
            top_k: args.top_k,
            memory_window: args.memory_window,
            template: PromptTemplate::default(),
        },
    )
    .map_err(|error| anyhow::anyhow!(error.to_string()))
}

fn resolve_api_key(explicit: Option<String>, groq_key: Option<String>) -> Option<String> {
    explicit
        .into_iter()
        .chain(groq_key)
        .find(|key| !key.trim().is_empty())
}

fn chunking_config(args: &PipelineArgs) -> ChunkingConfig {
    ChunkingConfig {
        chunk_size: args.chunk_size,
        chunk_overlap: args.chunk_overlap,
    }
}

async fn load_pdfs(assistant: &Assistant, paths: &[PathBuf]) -> anyhow::Result<IngestionSummary> {
    let uploads = collect_uploads(paths).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let summary = assistant
        .ingest(uploads)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    for skipped in &summary.skipped_files {
        warn!(name = %skipped.name, reason = %skipped.reason, "skipped pdf");
    }
    println!(
        "{} document(s) processed into {} chunks ({} skipped)",
        summary.documents.len(),
        summary.chunk_count,
        summary.skipped_files.len()
    );
    Ok(summary)
}

async fn chat_loop(assistant: &Assistant, show_sources: bool) -> anyhow::Result<()> {
    let session = assistant.new_session().await;
    println!("Ask questions about your PDFs. /reset clears the conversation, /bye quits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "/bye" | "exit" => break,
            "/reset" => {
                assistant.reset_session(session).await;
                println!("conversation cleared");
            }
            "/history" => {
                for turn in assistant.history(session).await {
                    println!("{}: {}", turn.role.label(), turn.content);
                }
            }
            question => match assistant.ask(session, question).await {
                Ok(answer) => print_answer(&answer, show_sources),
                Err(error) => println!("PDF-Pal could not answer: {error}"),
            },
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer, show_sources: bool) {
    println!("PDF-Pal:\n{}", answer.text);
    if show_sources {
        for (position, source) in answer.sources.iter().enumerate() {
            println!(
                "[{}] {} score={:.4}\n{}",
                position + 1,
                source.source_name,
                source.score,
                source.text
            );
        }
    }
}

fn run_extract(args: &PipelineArgs, paths: &[PathBuf], show_chunks: bool) -> anyhow::Result<()> {
    let uploads = collect_uploads(paths).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let report = extract_documents_best_effort(&uploads, &LopdfExtractor)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let splitter = RecursiveSplitter::new(chunking_config(args))
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let mut cursor = 0u64;
    for document in &report.documents {
        let fingerprint = &document.fingerprint;
        println!(
            "document: {} pages={} sha256={}",
            fingerprint.document_title, fingerprint.page_count, fingerprint.checksum
        );

        if show_chunks {
            let (chunks, next) = build_chunks(fingerprint, &document.text, &splitter, cursor);
            cursor = next;
            for chunk in chunks {
                println!("[chunk {}] {} chars\n{}", chunk.chunk_index, chunk.text.chars().count(), chunk.text);
            }
        } else {
            println!("{}", document.text);
        }
    }

    for skipped in &report.skipped_files {
        println!("skipped: {} ({})", skipped.name, skipped.reason);
    }
    Ok(())
}
