//! Command-line arguments for the binaries.

use crate::config::SyncConfig;
use crate::envelope::MAX_STATE_BYTES;
use crate::remote::{StorageConfig, DEFAULT_BLOB_API_URL, DEFAULT_BLOB_PATH, DEFAULT_PROGRESS_KEY};
use crate::scheduler::Rating;
use crate::store::ChunkStatus;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bangla10-server")]
#[command(about = "Progress endpoint for the Bangla10 trainer", long_about = None)]
pub struct ServerArgs {
    #[arg(short, long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Key/value REST endpoint
    #[arg(long, env = "KV_REST_API_URL")]
    pub kv_url: Option<String>,

    #[arg(long, env = "KV_REST_API_TOKEN", hide_env_values = true)]
    pub kv_token: Option<String>,

    /// Blob store read/write token
    #[arg(long, env = "BLOB_READ_WRITE_TOKEN", hide_env_values = true)]
    pub blob_token: Option<String>,

    #[arg(long, env = "BANGLA10_BLOB_API_URL", default_value = DEFAULT_BLOB_API_URL)]
    pub blob_api_url: String,

    #[arg(long, env = "BANGLA10_PROGRESS_KEY", default_value = DEFAULT_PROGRESS_KEY)]
    pub progress_key: String,

    #[arg(long, env = "BANGLA10_PROGRESS_BLOB_PATH", default_value = DEFAULT_BLOB_PATH)]
    pub blob_path: String,

    /// Largest accepted state payload in bytes
    #[arg(long, default_value_t = MAX_STATE_BYTES)]
    pub max_state_bytes: usize,

    /// Keep progress in memory when no storage is configured
    #[arg(long)]
    pub memory: bool,
}

impl ServerArgs {
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            kv_url: self.kv_url.clone(),
            kv_token: self.kv_token.clone(),
            blob_token: self.blob_token.clone(),
            blob_api_url: self.blob_api_url.clone(),
            progress_key: self.progress_key.clone(),
            blob_path: self.blob_path.clone(),
            max_state_bytes: self.max_state_bytes,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "bangla10")]
#[command(about = "Spaced-repetition trainer for Bangla phrases and prayers", long_about = None)]
pub struct ClientArgs {
    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Local state file (overrides the config file)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    /// Progress endpoint URL (overrides the config file)
    #[arg(short, long, env = "BANGLA10_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Directory with phrases.json, categories.json and prayer.json
    #[arg(short, long, default_value = "data")]
    pub data: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

impl ClientArgs {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn sync_config(&self) -> Result<SyncConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::load(path)?,
            None => SyncConfig::default(),
        };
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show today's plan without starting it
    Plan {
        /// Extra practice over already learned phrases
        #[arg(long)]
        extra: bool,
    },
    /// Run today's session interactively, reading one rating per line
    Session {
        #[arg(long)]
        extra: bool,
    },
    /// Rate a single phrase
    Rate { phrase: String, rating: Rating },
    /// Progress overview and sync status
    Status,
    /// Push local changes now
    Sync,
    /// Write a JSON backup
    Export {
        /// Output file (stdout when omitted)
        output: Option<PathBuf>,
    },
    /// Replace local progress with a JSON backup
    Import { file: PathBuf },
    #[command(subcommand)]
    Prayer(PrayerCommand),
}

#[derive(Subcommand, Debug)]
pub enum PrayerCommand {
    /// Recitation progress and today's target
    Status,
    /// Advance a chunk: new -> practicing -> memorised -> new
    Cycle { recitation: String, chunk: String },
    /// Set a chunk's status
    Set {
        recitation: String,
        chunk: String,
        status: ChunkStatus,
    },
    /// Mark a chunk as practiced today
    Practiced { recitation: String, chunk: String },
    /// Set a whole recitation's status
    Full { recitation: String, status: ChunkStatus },
    /// Record a full test, one `y`/`n` per chunk in order (e.g. `yyny`)
    Test { recitation: String, hits: String },
}

/// Parse `y`/`n` test results. Other characters are ignored.
pub fn parse_hits(raw: &str) -> Vec<bool> {
    raw.chars()
        .filter_map(|c| match c.to_ascii_lowercase() {
            'y' | '1' => Some(true),
            'n' | '0' => Some(false),
            _ => None,
        })
        .collect()
}
