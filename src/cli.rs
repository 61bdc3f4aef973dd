use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediamill")]
#[command(author, version, about = "File conversion with bounded concurrency and size-targeted compression")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override the number of conversions allowed to run at once
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a file to another format
    Convert {
        /// Input file
        #[arg(required = true)]
        input: PathBuf,

        /// Target format (file extension), e.g. webp, mp4, pdf, zip
        #[arg(short = 'f', long = "to")]
        format: String,

        /// Conversion options as a JSON object, e.g. '{"quality": 80}'
        #[arg(long)]
        options: Option<String>,

        /// Compress the output toward this many bytes
        #[arg(long)]
        target_size: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compress a file in place toward a byte budget
    Compress {
        /// Image, GIF or video file to compress
        #[arg(required = true)]
        input: PathBuf,

        /// Target size in bytes (at least 10240)
        #[arg(short, long)]
        target: u64,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert several files to the same format
    Batch {
        /// Target format for every input
        #[arg(short = 'f', long = "to")]
        format: String,

        /// Conversion options as a JSON object
        #[arg(long)]
        options: Option<String>,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// List supported target formats by family
    Formats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that external tools are available
    CheckTools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
