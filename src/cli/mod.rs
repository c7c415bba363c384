//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod corpus;

pub use corpus::{Corpus, CorpusSource};

#[derive(Parser, Debug)]
#[command(
    name = "tributary",
    version,
    author = "neur0map",
    about = "Hybrid lexical/vector retrieval federated across many sources",
    long_about = "Tributary scores documents with BM25 and cosine similarity, fuses the two rankings \
                  with reciprocal rank fusion, fans queries out to every registered source under a \
                  shared deadline, and merges the answers into one deduplicated, paginated list."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/tributary/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search every source of a JSON corpus
    Search {
        /// Search query text
        query: String,

        /// Corpus file: {"sources": [{"id": ..., "documents": [...]}]}
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// Query embedding as comma-separated floats
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        vector: Option<Vec<f32>>,

        /// Results per page (defaults to federation.default_limit)
        #[arg(short, long, allow_negative_numbers = true)]
        limit: Option<i64>,

        /// Number of merged results to skip
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        offset: i64,

        /// Vector weight in [0, 1] (defaults to retrieval.default_alpha)
        #[arg(short, long)]
        alpha: Option<f32>,

        /// Drop per-source results scoring below this
        #[arg(long)]
        min_score: Option<f32>,

        /// Metadata constraint, repeatable (e.g. source_type=code)
        #[arg(short, long = "filter", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Skip these sources
        #[arg(long, value_name = "SOURCE")]
        disable: Vec<String>,

        /// Deadline override in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Keep tantivy keyword indexes under this directory instead of in memory
        #[arg(long, value_name = "DIR")]
        index_dir: Option<PathBuf>,

        /// Profile to use (e.g., "precise", "fast")
        #[arg(short, long)]
        profile: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in dot notation (e.g., "merge.dedup_threshold")
        key: String,

        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key in dot notation
        key: String,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// List configured profiles
    Profiles,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parse a `KEY=VALUE` filter argument
pub fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
