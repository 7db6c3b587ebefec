// auraluxe — command-line front end for the Auraluxe engine.
//
// Logs go to stderr (RUST_LOG, default "info"); machine-readable output
// (NDJSON batch events, JSON recommendations) goes to stdout.

use auraluxe_engine::atoms::constants::SIMILAR_PRODUCTS_THRESHOLD;
use auraluxe_engine::atoms::traits::{CatalogStore, PageController, ShopperStore};
use auraluxe_engine::engine::agent_loop::{AgentEvent, TurnOutcome};
use auraluxe_engine::engine::cascade::embed_with_fallback;
use auraluxe_engine::engine::embedding::find_similar;
use auraluxe_engine::engine::events::NdjsonSink;
use auraluxe_engine::engine::page::SimulatedPage;
use auraluxe_engine::engine::scoring::ScoringSignal;
use auraluxe_engine::engine::types::*;
use auraluxe_engine::{CancelSignal, EngineConfig, EngineError, EngineResult, EngineState};
use base64::Engine as _;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use log::{error, info};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "auraluxe", version, about = "Auraluxe recommendation and AI orchestration engine")]
struct Cli {
    /// Config file (defaults to <config dir>/auraluxe/config.toml)
    #[arg(long, global = true, env = "AURALUXE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true, env = "AURALUXE_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load catalog items from a JSON array into the store
    Import {
        file: PathBuf,
    },
    /// Analyse product images and store embeddings (NDJSON on stdout)
    Batch {
        /// Product ids; defaults to every item with an image
        ids: Vec<String>,
        /// Process one item without streaming
        #[arg(long, conflicts_with = "ids")]
        one: Option<String>,
    },
    /// Recommend products for recently viewed ids
    Recommend {
        #[arg(long, value_delimiter = ',')]
        viewed: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        favorites: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        cart: Vec<String>,
        /// Signed-in shopper
        #[arg(long)]
        user: Option<String>,
        /// Ask the inference cascade instead of the instant ranking
        #[arg(long)]
        ai: bool,
    },
    /// Products whose stored analyses resemble a text description
    Similar {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = SIMILAR_PRODUCTS_THRESHOLD)]
        threshold: f64,
    },
    /// Stylist analysis of a photo
    Style {
        image: PathBuf,
        /// What the shopper is looking for
        #[arg(long)]
        context: Option<String>,
        /// Also resolve the products the analysis mentions
        #[arg(long)]
        products: bool,
    },
    /// Chat with the shopping assistant against a simulated storefront
    Chat {
        #[arg(long)]
        user: Option<String>,
        /// Conversation to resume
        #[arg(long)]
        conversation: Option<String>,
        /// Enable page-manipulation tools
        #[arg(long)]
        ops: bool,
        /// Starting page
        #[arg(long, default_value = "/")]
        page: String,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> EngineResult<()> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "auraluxe", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = Some(db);
    }
    let state = EngineState::open(config)?;

    match cli.command {
        Commands::Import { file } => import(&state, &file),
        Commands::Batch { ids, one } => batch(&state, ids, one).await,
        Commands::Recommend { viewed, favorites, cart, user, ai } => {
            let signal = BehaviorSignal { viewed, favorites, cart, searches: vec![] };
            recommend(&state, signal, user, ai).await
        }
        Commands::Similar { query, limit, threshold } => similar(&state, &query, limit, threshold).await,
        Commands::Style { image, context, products } => style(&state, &image, context, products).await,
        Commands::Chat { user, conversation, ops, page } => chat(&state, user, conversation, ops, &page).await,
        Commands::Completions { .. } => Ok(()),
    }
}

fn print_json(value: &impl serde::Serialize) -> EngineResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn import(state: &EngineState, file: &Path) -> EngineResult<()> {
    let items: Vec<CatalogItem> = serde_json::from_str(&std::fs::read_to_string(file)?)?;
    for item in &items {
        state.store.upsert_item(item)?;
    }
    info!("[cli] imported {} items from {:?}", items.len(), file);
    Ok(())
}

async fn batch(state: &EngineState, ids: Vec<String>, one: Option<String>) -> EngineResult<()> {
    let pipeline = state.batch_pipeline();
    if let Some(id) = one {
        return print_json(&pipeline.process_one(&id).await?);
    }

    let ids = if ids.is_empty() { state.store.item_ids_with_images()? } else { ids };
    let cancel = CancelSignal::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[cli] interrupt received, finishing current item");
            on_ctrl_c.cancel();
        }
    });

    let sink = NdjsonSink::new(tokio::io::stdout());
    let summary = pipeline.run(&ids, &sink, &cancel).await;
    if let BatchSummary::Failed { error } = summary {
        return Err(EngineError::Other(error));
    }
    Ok(())
}

async fn recommend(state: &EngineState, signal: BehaviorSignal, user: Option<String>, ai: bool) -> EngineResult<()> {
    let context = match &user {
        Some(uid) => Some(state.store.user_context(uid).await?),
        None => None,
    };
    if ai {
        return print_json(&state.recommender().recommend(&signal, context.as_ref()).await?);
    }

    let candidates = state.store.list_items(usize::MAX).await?;
    let viewed = state.store.items_by_ids(&signal.viewed).await?;
    let ranked = state.scoring().rank(
        &candidates,
        &ScoringSignal { viewed: &viewed, favorites: &signal.favorites, cart: &signal.cart },
    );
    print_json(&ranked)
}

async fn similar(state: &EngineState, query: &str, limit: usize, threshold: f64) -> EngineResult<()> {
    let (embedding, fallback) = embed_with_fallback(state.embedder.as_ref(), query, state.embedder.timeout()).await;
    if fallback {
        info!("[cli] embedding endpoint unavailable, results use the fallback vector");
    }
    let items = find_similar(state.store.as_ref(), &embedding, limit, threshold).await;
    print_json(&items)
}

fn data_url(path: &Path) -> EngineResult<String> {
    let bytes = std::fs::read(path)?;
    let mime = match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };
    Ok(format!("data:{};base64,{}", mime, base64::engine::general_purpose::STANDARD.encode(bytes)))
}

async fn style(state: &EngineState, image: &Path, context: Option<String>, products: bool) -> EngineResult<()> {
    let analysis = state.stylist().analyze_style(&data_url(image)?, context.as_deref()).await?;
    println!("{}", analysis);
    if products {
        let picks = state.recommender().recommend_from_analysis(&analysis).await?;
        print_json(&picks)?;
    }
    Ok(())
}

// ── Interactive chat ───────────────────────────────────────────────────────

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

async fn chat(
    state: &EngineState,
    user: Option<String>,
    conversation: Option<String>,
    ops: bool,
    start_page: &str,
) -> EngineResult<()> {
    let page = Arc::new(SimulatedPage::new(start_page));
    let conversation = conversation.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let agent = state.agent(&conversation, user, page.clone(), Some(tx));
    agent.set_ops_mode(ops);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::Warning { text } => eprintln!("\n[!] {}", text),
                AgentEvent::ToolResult { name, result } => eprintln!("  [{}] {}", name, result),
                _ => {}
            }
        }
    });

    println!("Conversation {} (type /quit to leave, /ops on|off, /allow on|off)", conversation);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&format!("{} > ", page.current_path()));
        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/ops on" | "/ops off" => {
                agent.set_ops_mode(line.ends_with("on"));
                continue;
            }
            "/allow on" | "/allow off" => {
                agent.set_always_allow(line.ends_with("on")).await?;
                continue;
            }
            _ => {}
        }

        let mut outcome = agent.submit(line).await?;
        loop {
            match outcome {
                TurnOutcome::Reply(text) | TurnOutcome::TimedOut(text) => {
                    println!("Gini: {}", text);
                    break;
                }
                TurnOutcome::Cancelled => {
                    println!("(cancelled)");
                    break;
                }
                TurnOutcome::NeedsApproval { message, call } => {
                    println!("Gini: {}", message);
                    prompt(&format!("  run {} {}? [y]es / [n]o / [a]lways: ", call.function, call.arguments));
                    let answer = lines.next_line().await?.unwrap_or_default();
                    outcome = match answer.trim() {
                        "a" | "always" => {
                            agent.set_always_allow(true).await?;
                            agent.approve().await?
                        }
                        "y" | "yes" => agent.approve().await?,
                        _ => agent.reject().await?,
                    };
                }
            }
        }
    }
    Ok(())
}
