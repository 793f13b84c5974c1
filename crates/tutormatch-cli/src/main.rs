// ============================================================================
// tutormatch — CLI for the TutorMatch engine
// ============================================================================
// Usage:
//   tutormatch chat [--session ID]       Interactive matching/booking session
//   tutormatch stats                     Show session database statistics
//   tutormatch list-sessions             List stored sessions
//   tutormatch export --format json      Export all sessions as JSON
//   tutormatch prune --older-than 90     Prune inactive sessions
// ============================================================================

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};

use tutormatch_core::catalog::{CatalogEntry, CatalogReader, InMemoryCatalog};
use tutormatch_core::retrieval::{CandidateRetriever, Embedder, OpenAiEmbedder, QdrantIndex, SimilarityIndex};
use tutormatch_core::retrieval::index::IndexHit;
use tutormatch_core::types::{Mode, Slot};
use tutormatch_core::{
    EngineConfig, LoggingBookingAutomation, MatchEngine, OpenAiReasoner, Reasoner, SessionDb,
};

/// TutorMatch conversational matching and booking engine
#[derive(Parser)]
#[command(name = "tutormatch", version, about = "Find and book a tutor in conversation")]
struct Cli {
    /// Path to the session database (default: ~/.tutormatch/sessions.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Resume an existing session id instead of starting fresh
        #[arg(long)]
        session: Option<String>,
    },

    /// Show session database statistics
    Stats,

    /// List stored sessions
    ListSessions,

    /// Export all sessions as JSON
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Prune sessions inactive for longer than the given number of days
    Prune {
        /// Delete sessions inactive for more than this many days
        #[arg(long, default_value = "90")]
        older_than: i64,

        /// Show what would be pruned without actually deleting
        #[arg(long)]
        dry_run: bool,
    },
}

/// Placeholder embedder used when no API key is configured; every call
/// fails, which routes retrieval onto the keyword fallback.
struct OfflineEmbedder;

#[async_trait::async_trait]
impl Embedder for OfflineEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("no embedding endpoint configured")
    }
}

/// Placeholder index used when no qdrant URL is configured
struct OfflineIndex;

#[async_trait::async_trait]
impl SimilarityIndex for OfflineIndex {
    async fn query(&self, _vector: Vec<f32>, _top_k: u64) -> Result<Vec<IndexHit>> {
        anyhow::bail!("no similarity index configured")
    }

    async fn upsert(&self, _entry_id: uuid::Uuid, _vector: Vec<f32>) -> Result<()> {
        anyhow::bail!("no similarity index configured")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env()?;
    if let Some(path) = cli.db_path {
        config.db_path = Some(path.into());
    }
    let db = Arc::new(SessionDb::open(&config.resolve_db_path()?)?);

    match cli.command {
        Commands::Chat { session } => cmd_chat(db, &config, session).await,
        Commands::Stats => cmd_stats(&db),
        Commands::ListSessions => cmd_list_sessions(&db),
        Commands::Export { format } => cmd_export(&db, &format),
        Commands::Prune { older_than, dry_run } => cmd_prune(&db, older_than, dry_run),
    }
}

async fn cmd_chat(db: Arc<SessionDb>, config: &EngineConfig, session: Option<String>) -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new(sample_catalog()));

    let embedder: Arc<dyn Embedder> = match &config.api_key {
        Some(key) => Arc::new(OpenAiEmbedder::new(
            key.clone(),
            config.api_base_url.clone(),
            config.embedding_model.clone(),
            config.call_timeout,
        )?),
        None => {
            println!("(no API key configured, matching via keyword ranking)");
            Arc::new(OfflineEmbedder)
        }
    };

    let index: Arc<dyn SimilarityIndex> = match &config.qdrant_url {
        Some(url) => match QdrantIndex::new(url).await {
            Ok(index) => Arc::new(index),
            Err(e) => {
                eprintln!("(similarity index unreachable: {}, using keyword ranking)", e);
                Arc::new(OfflineIndex)
            }
        },
        None => Arc::new(OfflineIndex),
    };

    let reasoner: Option<Arc<dyn Reasoner>> = match &config.api_key {
        Some(key) => Some(Arc::new(OpenAiReasoner::new(
            key.clone(),
            config.api_base_url.clone(),
            config.chat_model.clone(),
            config.call_timeout,
        )?)),
        None => None,
    };

    let retriever = CandidateRetriever::new(embedder, index, catalog.clone());

    // Keep the index current with the demo catalog; failures are fine,
    // retrieval falls back to keyword ranking.
    if config.qdrant_url.is_some() {
        if let Err(e) = retriever.index_catalog(&catalog.all().await?).await {
            eprintln!("(catalog indexing failed: {})", e);
        }
    }

    let engine = MatchEngine::new(
        db,
        retriever,
        reasoner,
        catalog,
        Arc::new(LoggingBookingAutomation),
    );

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    println!("Session: {}", session_id);
    println!("Tell me what you'd like to learn (\"quit\" to exit).\n");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("you> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_lowercase().as_str(), "quit" | "exit") {
            break;
        }

        let reply = engine.turn(&session_id, line).await?;
        println!("tutormatch> {}\n", reply.reply);
    }

    engine.flush().await?;
    println!("Session saved: {}", session_id);
    Ok(())
}

fn cmd_stats(db: &SessionDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== TutorMatch Session Stats ===");
    println!("Database: {}", db.path().display());
    println!();
    println!("Sessions: {} total", stats.total_sessions);
    println!("  pending match: {}", stats.with_pending_match);
    println!("  active draft:  {}", stats.with_active_draft);
    for (state, count) in &stats.state_counts {
        println!("  {:24} {}", state, count);
    }

    Ok(())
}

fn cmd_list_sessions(db: &SessionDb) -> Result<()> {
    let sessions = db.list()?;

    if sessions.is_empty() {
        println!("No sessions stored.");
        return Ok(());
    }

    println!(
        "{:<38} {:<28} {:>8}  {}",
        "SESSION", "STATE", "MESSAGES", "LAST ACTIVE"
    );
    for session in sessions {
        println!(
            "{:<38} {:<28} {:>8}  {}",
            session.session_id,
            format!("{:?}", session.state()),
            session.messages.len(),
            format_timestamp(session.last_active)
        );
    }

    Ok(())
}

fn cmd_export(db: &SessionDb, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unknown format '{}'. Only json is supported", format);
    }

    let sessions = db.list()?;
    println!("{}", serde_json::to_string_pretty(&sessions)?);
    Ok(())
}

fn cmd_prune(db: &SessionDb, older_than: i64, dry_run: bool) -> Result<()> {
    if dry_run {
        let cutoff = Utc::now().timestamp() - older_than * 86400;
        let stale: Vec<_> = db
            .list()?
            .into_iter()
            .filter(|s| s.last_active < cutoff)
            .collect();

        println!("Would prune {} session(s):", stale.len());
        for session in stale {
            println!(
                "  {} (last active {})",
                session.session_id,
                format_timestamp(session.last_active)
            );
        }
        return Ok(());
    }

    let deleted = db.prune_old(older_than)?;
    println!("Pruned {} session(s) older than {} days", deleted, older_than);
    Ok(())
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

/// Demo catalog used by the chat command
fn sample_catalog() -> Vec<CatalogEntry> {
    let slot = |day: &str, time: &str, mode: Mode| Slot {
        day: day.to_string(),
        time: time.to_string(),
        mode,
    };

    vec![
        CatalogEntry {
            id: uuid::Uuid::new_v4(),
            name: "Alice Chen".into(),
            topics: vec!["Python".into(), "Data Science".into()],
            mode: Mode::Online,
            bio: "Ten years teaching Python, from first steps to pandas and scikit-learn.".into(),
            slots: vec![
                slot("Monday", "10:00", Mode::Online),
                slot("Wednesday", "15:00", Mode::Online),
            ],
        },
        CatalogEntry {
            id: uuid::Uuid::new_v4(),
            name: "Bob Patel".into(),
            topics: vec!["Math".into(), "Python".into()],
            mode: Mode::Online,
            bio: "Applied mathematician, patient with beginners.".into(),
            slots: vec![
                slot("Tuesday", "11:00", Mode::Online),
                slot("Thursday", "18:00", Mode::Online),
            ],
        },
        CatalogEntry {
            id: uuid::Uuid::new_v4(),
            name: "Carol Diaz".into(),
            topics: vec!["Spanish".into()],
            mode: Mode::InPerson,
            bio: "Native speaker, conversational focus.".into(),
            slots: vec![
                slot("Friday", "09:00", Mode::InPerson),
                slot("Saturday", "10:00", Mode::InPerson),
            ],
        },
        CatalogEntry {
            id: uuid::Uuid::new_v4(),
            name: "Dan Okafor".into(),
            topics: vec!["Guitar".into(), "Music Theory".into()],
            mode: Mode::InPerson,
            bio: "Session guitarist teaching technique and theory side by side.".into(),
            slots: vec![slot("Sunday", "14:00", Mode::InPerson)],
        },
    ]
}
