use clap::Parser;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, Level};
use wf_cli::{handle_command, init_logging, Cli};
use wf_core::{Error, FeedConfig, Result, SystemClock};
use wf_feed::FeedManager;
use wf_storage::{create_storage, BackendKind, PersistentStore};
use wf_wiki::WikipediaProvider;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = Level::from_str(&cli.log_level)
        .map_err(|_| Error::InvalidConfig(format!("Unknown log level: {}", cli.log_level)))?;
    init_logging(level);

    let config = match &cli.config {
        Some(path) => FeedConfig::from_file(path)?,
        None => FeedConfig::default(),
    };

    let backend = create_storage(BackendKind::from_str(&cli.storage)?, &cli.data_dir)?;
    info!("💾 Storage initialized (using {})", cli.storage);

    let provider = Arc::new(WikipediaProvider::new()?);
    let mut manager = FeedManager::new(PersistentStore::new(backend), provider, Arc::new(SystemClock), config)?;
    if let Some(lang) = &cli.lang {
        manager = manager.with_language(lang);
    }
    info!("📚 Feed ready ({})", manager.language());

    let mut stdout = std::io::stdout();
    handle_command(cli.command, &mut manager, &mut stdout).await
}
