use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use feedscout::feed::{merge_and_sort, ParsedFeed};
use feedscout::{Config, FeedEngine};

/// Get the default config file path (~/.config/feedscout/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedscout")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "feedscout", about = "Find, fetch and merge RSS/Atom feeds")]
struct Args {
    /// Config file (defaults to ~/.config/feedscout/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print whether each URL is itself a feed
    Check {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Resolve each URL to a feed URL
    Find {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Fetch and parse each feed
    Parse {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Merge the items of all feeds, newest first
    Merge {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;
    let engine = FeedEngine::new(&config).context("Failed to build HTTP client")?;

    match args.command {
        Command::Check { urls } => {
            for url in urls {
                println!("{url}\t{}", engine.check_feed(&url).await);
            }
        }
        Command::Find { urls } => {
            let mut found = Vec::with_capacity(urls.len());
            for url in &urls {
                found.push(engine.find_feed(url).await);
            }
            print_json(&found)?;
        }
        Command::Parse { urls } => {
            let mut feeds = Vec::with_capacity(urls.len());
            for url in &urls {
                let feed = engine
                    .fetch_and_parse(url)
                    .await
                    .with_context(|| format!("Failed to parse feed '{url}'"))?;
                feeds.push(feed);
            }
            let feeds: Vec<&ParsedFeed> = feeds.iter().map(Arc::as_ref).collect();
            print_json(&feeds)?;
        }
        Command::Merge { urls } => {
            let mut feeds = Vec::with_capacity(urls.len());
            for url in &urls {
                match engine.fetch_and_parse(url).await {
                    Ok(feed) => feeds.push(feed),
                    Err(e) => tracing::warn!(url = %url, error = %e, "Skipping feed"),
                }
            }
            print_json(&merge_and_sort(feeds.iter().map(Arc::as_ref)))?;
        }
    }

    Ok(())
}
