//! News pipeline daemon library exports.
//!
//! # Modules
//!
//! - `cli`: command-line parsing with clap
//! - `settings`: layered configuration
//! - `pipeline`: wires storage, the embedding model and every engine
//! - `import`: JSON Lines article ingestion
//! - `commands`: command implementations

pub mod cli;
pub mod commands;
pub mod import;
pub mod pipeline;
pub mod settings;

pub use cli::{Cli, Commands, EventCommands, StatusArg, TopicCommands};
pub use commands::{init_logging, load_settings, open_storage, register_jobs, run, start_daemon};
pub use import::{import_articles, ImportReport};
pub use pipeline::{load_model, Pipeline};
pub use settings::Settings;
