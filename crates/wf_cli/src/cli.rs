use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::info;
use wf_core::{Article, Error, Result};
use wf_feed::FeedManager;

pub const DEFAULT_COUNT: usize = 10;
/// How long `feed` waits for its background cache top-up before exiting
const TOP_UP_WAIT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl FromStr for HumanDuration {
    type Err = String;

    /// Accepts `1500ms`, `2s`, `1m30s`, `1h`, `1d`; a bare number is seconds.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_ms = 0u64;
        let mut current_number = String::new();
        let mut has_value = false;
        let mut chars = s.trim().chars().peekable();

        while let Some(c) = chars.next() {
            if c.is_ascii_digit() {
                current_number.push(c);
                continue;
            }
            if c.is_whitespace() {
                continue;
            }
            let num = current_number
                .parse::<u64>()
                .map_err(|_| format!("Expected a number before '{}'", c))?;
            let unit_ms = match c {
                'm' if chars.peek() == Some(&'s') => {
                    chars.next();
                    1
                }
                's' => 1_000,
                'm' => 60_000,
                'h' => 3_600_000,
                'd' => 86_400_000,
                _ => return Err(format!("Invalid duration unit: {}", c)),
            };
            total_ms = total_ms.saturating_add(num.saturating_mul(unit_ms));
            current_number.clear();
            has_value = true;
        }

        if !current_number.is_empty() {
            let num = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_ms = total_ms.saturating_add(num.saturating_mul(1_000));
            has_value = true;
        }

        if !has_value {
            return Err("Duration must include a number".to_string());
        }
        Ok(HumanDuration(Duration::from_millis(total_ms)))
    }
}

#[derive(Parser, Debug)]
#[command(name = "wikifeed", author, version, about = "A personalized feed of Wikipedia snippets", long_about = None)]
pub struct Cli {
    /// JSON file overriding the default tuning constants
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Storage backend: memory or sqlite (alias: file)
    #[arg(long, global = true, default_value = "file")]
    pub storage: String,
    /// Directory holding the sqlite database
    #[arg(long, global = true, default_value = ".wikifeed")]
    pub data_dir: PathBuf,
    /// Wikipedia language for this run, without changing the saved preference
    #[arg(long, global = true)]
    pub lang: Option<String>,
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Show the next batch of articles
    Feed {
        #[arg(long, short, default_value_t = DEFAULT_COUNT)]
        count: usize,
        /// Skip the cache and fetch fresh articles
        #[arg(long)]
        refresh: bool,
    },
    Like { id: String },
    Unlike { id: String },
    Save { id: String },
    Unsave { id: String },
    NotInterested { id: String },
    /// Record that the source page was opened and print its URL
    Open { id: String },
    /// Record how long an article was on screen (e.g. 800ms, 2s)
    View {
        id: String,
        #[arg(long)]
        duration: HumanDuration,
    },
    /// List saved articles, most recent first
    Saved,
    Stats,
    /// Remove duplicate ids from the article cache
    Dedupe,
    /// Show or change the preferred language
    Lang { code: Option<String> },
    /// Show or change the theme preference
    Theme { name: Option<String> },
    /// Delete all stored state
    Clear,
}

fn lookup(manager: &FeedManager, id: &str) -> Result<Article> {
    manager
        .find_article(id)
        .ok_or_else(|| Error::NotFound(format!("article '{}' (run `wikifeed feed` first)", id)))
}

fn print_article(out: &mut dyn Write, article: &Article) -> Result<()> {
    writeln!(out, "{} [{}] {}", article.emoji(), article.id, article.hook)?;
    writeln!(out, "   {} · {}", article.source.title, article.source.url)?;
    Ok(())
}

async fn wait_for_top_up(manager: &FeedManager) {
    let deadline = Instant::now() + TOP_UP_WAIT;
    while manager.top_up_in_flight(manager.language()) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

pub async fn handle_command(command: Commands, manager: &mut FeedManager, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Feed { count, refresh } => {
            let articles = manager.load_articles(count, refresh).await;
            if articles.is_empty() {
                writeln!(out, "No new articles right now.")?;
            }
            for article in &articles {
                print_article(out, article)?;
            }
            wait_for_top_up(manager).await;
        }
        Commands::Like { id } => {
            let article = lookup(manager, &id)?;
            manager.like(&article);
            writeln!(out, "❤️ Liked {}", id)?;
        }
        Commands::Unlike { id } => {
            let article = lookup(manager, &id)?;
            manager.unlike(&article);
            writeln!(out, "💔 Unliked {}", id)?;
        }
        Commands::Save { id } => {
            let article = lookup(manager, &id)?;
            manager.save(&article);
            writeln!(out, "🔖 Saved {}", id)?;
        }
        Commands::Unsave { id } => {
            let article = lookup(manager, &id)?;
            manager.unsave(&article);
            writeln!(out, "🗑️ Removed {} from saved", id)?;
        }
        Commands::NotInterested { id } => {
            let article = lookup(manager, &id)?;
            manager.not_interested(&article);
            writeln!(out, "🙈 Fewer articles like {}", id)?;
        }
        Commands::Open { id } => {
            let article = lookup(manager, &id)?;
            manager.open_source(&article);
            writeln!(out, "{}", article.source.url)?;
        }
        Commands::View { id, duration } => {
            let article = lookup(manager, &id)?;
            let millis = u64::try_from(duration.0.as_millis()).unwrap_or(u64::MAX);
            manager.view(&article, millis);
            writeln!(out, "👀 Viewed {} for {}ms", id, millis)?;
        }
        Commands::Saved => {
            let items = manager.saved_items();
            if items.is_empty() {
                writeln!(out, "Nothing saved yet.")?;
            }
            for item in items {
                let saved_at = Local
                    .timestamp_millis_opt(item.saved_at)
                    .single()
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                writeln!(out, "{} [{}] {} ({})", item.emoji, item.id, item.hook, saved_at)?;
                writeln!(out, "   {}", item.source.url)?;
            }
        }
        Commands::Stats => {
            let stats = manager.stats();
            writeln!(out, "Language: {}", manager.language())?;
            writeln!(out, "Likes: {}  Seen: {}  Saved: {}", stats.likes, stats.seen, stats.saved)?;
            for (lang, size) in &stats.cache_sizes {
                writeln!(out, "Cached [{}]: {}", lang, size)?;
            }
            writeln!(out, "Weights:")?;
            for (key, weight) in &stats.weights {
                writeln!(out, "  {:<24} {:>8.2}", key, weight)?;
            }
        }
        Commands::Dedupe => {
            let removed = manager.dedupe_cache()?;
            writeln!(out, "🧹 Removed {} duplicate articles", removed)?;
        }
        Commands::Lang { code: Some(code) } => {
            manager.set_language(&code)?;
            info!("🌍 Language set to {}", code);
            writeln!(out, "Language: {}", code)?;
        }
        Commands::Lang { code: None } => {
            writeln!(out, "Language: {}", manager.preferences().language)?;
        }
        Commands::Theme { name: Some(name) } => {
            manager.set_theme(&name)?;
            writeln!(out, "Theme: {}", name)?;
        }
        Commands::Theme { name: None } => {
            writeln!(out, "Theme: {}", manager.preferences().theme)?;
        }
        Commands::Clear => {
            manager.clear_all()?;
            writeln!(out, "All stored data cleared.")?;
        }
    }
    Ok(())
}
