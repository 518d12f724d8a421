use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::inference::GenerationOverrides;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Decoding overrides applied over the model family's defaults
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct GenerationArgs {
    /// Maximum generation length
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Beam count
    #[arg(long)]
    pub num_beams: Option<usize>,

    /// Repetition penalty
    #[arg(long)]
    pub repetition_penalty: Option<f32>,
}

impl GenerationArgs {
    pub fn overrides(&self) -> GenerationOverrides {
        GenerationOverrides {
            max_length: self.max_length,
            num_beams: self.num_beams,
            repetition_penalty: self.repetition_penalty,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a single text
    Translate {
        /// Text to translate
        text: String,

        /// Direction tag such as ko2ja, ja2ko, en2ko
        #[arg(short, long, default_value = "ko2ja")]
        direction: String,

        /// Registry key or backing model identifier
        #[arg(short, long)]
        model: Option<String>,

        /// Bypass the result cache
        #[arg(long)]
        no_cache: bool,

        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// Translate a file with one text per line
    Batch {
        /// Input file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Direction tag such as ko2ja, ja2ko, en2ko
        #[arg(short, long, default_value = "ko2ja")]
        direction: String,

        /// Registry key or backing model identifier
        #[arg(short, long)]
        model: Option<String>,

        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// Run the HTTP service
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Model loaded at startup
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List registered models
    Models,

    /// Show the translator description for a model without loading it
    Info {
        /// Registry key or backing model identifier
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show terminology matches for a text
    Terms {
        /// Text to look up
        text: String,

        /// Direction tag used to pick the terminology domain
        #[arg(short, long, default_value = "ko2ja")]
        direction: String,

        /// Use the same-language replacement domain and show the substituted text
        #[arg(long)]
        replacement: bool,
    },

    /// Manage the translation result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Records are kept per model and direction
#[derive(ClapArgs, Debug, Clone)]
pub struct CacheScopeArgs {
    /// Direction tag the text was translated in
    #[arg(short, long, default_value = "ko2ja")]
    pub direction: String,

    /// Registry key or backing model identifier (default model when omitted)
    #[arg(short, long)]
    pub model: Option<String>,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show the cached record for a text
    Get {
        text: String,

        #[command(flatten)]
        scope: CacheScopeArgs,
    },

    /// Delete the cached record for a text
    Delete {
        text: String,

        #[command(flatten)]
        scope: CacheScopeArgs,
    },

    /// Delete every cached record in the namespace
    Clear,

    /// Show record count and sample keys
    Stats,
}
