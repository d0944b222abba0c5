mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mangaconfig::{Config, get_config};
use mangaresolver::{LoadOutcome, MangaConfigExt, MangaService};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mangashelf", version, about = "Browse a static manga content tree")]
struct Cli {
    /// Configuration directory (defaults to $MANGASHELF_CONFIG or .mangashelf)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Content root, overriding `content.base_url`
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Backend root, overriding `content.api_url`
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List collection ids
    List,
    /// Show one collection's metadata
    Show { id: String },
    /// List a collection's chapters
    Chapters { id: String },
    /// Resolve a chapter's pages
    Pages {
        id: String,
        chapter: u32,
        /// Also print the resolution phases
        #[arg(long)]
        trace: bool,
    },
    /// Previous and next chapter around a chapter
    Adjacent { id: String, chapter: u32 },
    /// Load a chapter window by window, as the reader view does
    Read {
        id: String,
        chapter: u32,
        /// Number of windows to load
        #[arg(long, default_value_t = 1)]
        windows: usize,
    },
    /// Drop every cached record of a collection
    Invalidate { id: String },
    /// Invalidate a collection and resolve its metadata again
    Refresh { id: String },
    /// Delete expired cache entries
    Purge,
    /// Show cache entry counts
    Stats,
    /// Delete every cache entry
    Clear,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config: Arc<Config> = match &cli.config {
        Some(dir) => Arc::new(
            Config::load_config(dir).with_context(|| format!("loading configuration from {}", dir))?,
        ),
        None => get_config(),
    };
    logging::init_logging(&config, cli.verbose);

    let mut settings = config.resolver_settings()?;
    if let Some(base_url) = &cli.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(api_url) = &cli.api_url {
        settings.api_url = (!api_url.is_empty()).then(|| api_url.clone());
    }
    let service = MangaService::from_config_with(&config, &settings)?;

    match cli.command {
        Command::List => print_json(&service.list_collections().await)?,
        Command::Show { id } => print_json(&service.resolve_collection(&id).await)?,
        Command::Chapters { id } => print_json(&service.resolve_chapters(&id).await)?,
        Command::Pages { id, chapter, trace } => {
            let (resolved, phases) = service.resolve_chapter_pages_traced(&id, chapter).await;
            if trace {
                print_json(&phases)?;
            }
            match resolved {
                Some(chapter) => print_json(&chapter)?,
                None => anyhow::bail!("no content found for {} chapter {}", id, chapter),
            }
        }
        Command::Adjacent { id, chapter } => {
            print_json(&service.adjacent_chapters(&id, chapter).await)?
        }
        Command::Read {
            id,
            chapter,
            windows,
        } => {
            let Some(resolved) = service.resolve_chapter_pages(&id, chapter).await else {
                anyhow::bail!("no content found for {} chapter {}", id, chapter);
            };
            if let Some(url) = resolved.pdf_url() {
                println!("{}", url);
                return Ok(());
            }

            let loader = service.page_loader(&resolved);
            let mut outcome = loader.load_initial().await;
            for _ in 1..windows {
                let Some(sentinel) = loader.sentinel() else {
                    break;
                };
                outcome = loader.on_sentinel_visible(sentinel).await;
            }
            info!(?outcome, visible = loader.visible_count(), total = loader.total(), "Reader state");
            for url in loader.visible() {
                println!("{}", url);
            }
            if matches!(outcome, LoadOutcome::Loaded { .. }) && loader.has_more() {
                eprintln!("... {} more page(s)", loader.total() - loader.visible_count());
            }
        }
        Command::Invalidate { id } => {
            let removed = service.invalidate(&id);
            println!("{} cache entr{} removed", removed, if removed == 1 { "y" } else { "ies" });
        }
        Command::Refresh { id } => print_json(&service.refresh_collection(&id).await)?,
        Command::Purge => {
            let removed = service.cache().purge_expired();
            println!("{} expired entr{} removed", removed, if removed == 1 { "y" } else { "ies" });
        }
        Command::Stats => print_json(&service.cache().stats())?,
        Command::Clear => {
            service.cache().clear();
            println!("cache cleared");
        }
    }

    Ok(())
}
