//! News pipeline daemon
//!
//! Detects news events from recent articles, labels them and aggregates
//! them into topics.
//!
//! # Usage
//!
//! ```bash
//! newsd start [--db-path PATH]
//! newsd import articles.jsonl
//! newsd detect | sweep | label [--event-id ID]
//! newsd topics detect | classify [--topic-id ID] | list | show ID
//! newsd events list [--status active|inactive] | show ID
//! newsd stats
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/news-pulse/config.toml)
//! 3. Environment variables (NEWS_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use news_daemon::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
