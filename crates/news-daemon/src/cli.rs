//! CLI argument parsing for `newsd`.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand, ValueEnum};
use news_types::EventStatus;

/// News pipeline daemon
///
/// Detects events from recent articles, labels them and groups them into
/// topics, either on a cron schedule or one stage at a time.
#[derive(Parser, Debug)]
#[command(name = "newsd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/news-pulse/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduled pipeline jobs until interrupted
    Start,

    /// Ingest normalized articles from a JSON Lines file
    Import {
        /// File with one article record per line
        file: String,
    },

    /// Detect new events and merge them into active ones
    Detect,

    /// Close active events older than the staleness horizon
    Sweep,

    /// Label events
    Label {
        /// Label one event instead of everything changed since the last pass
        #[arg(long)]
        event_id: Option<String>,
    },

    /// Analyze event coverage: portals, keywords, sentiment, timeline and quotes
    Analyze {
        /// Analyze one event instead of everything changed since the last pass
        #[arg(long)]
        event_id: Option<String>,
    },

    /// Event queries
    Events {
        #[command(subcommand)]
        command: EventCommands,
    },

    /// Topic detection, classification and queries
    Topics {
        #[command(subcommand)]
        command: TopicCommands,
    },

    /// Show entity counts and database statistics
    Stats,
}

#[derive(Subcommand, Debug, Clone)]
pub enum EventCommands {
    /// List events
    List {
        /// Only events with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },

    /// Show one event with its article links, labels and analysis
    Show {
        event_id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TopicCommands {
    /// Cluster recent events into topics, then classify the new ones
    Detect,

    /// Link topics to similar older and younger topics
    Classify {
        /// Classify one topic instead of all of them
        #[arg(long)]
        topic_id: Option<String>,
    },

    /// List topics
    List,

    /// Show one topic with its member events, parents and children
    Show {
        topic_id: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusArg {
    Active,
    Inactive,
}

impl From<StatusArg> for EventStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => EventStatus::Active,
            StatusArg::Inactive => EventStatus::Inactive,
        }
    }
}
