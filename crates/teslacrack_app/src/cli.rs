//! CLI commands using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// teslacrack - TeslaCrypt key recovery and file restore
///
/// Recovers AES keys from the factors of the integer stored in every
/// encrypted file's header and decrypts whole directory trees.
#[derive(Parser, Debug)]
#[command(name = "teslacrack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log every per-file decision
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Key database file
    #[arg(short, long, global = true, default_value = "teslacrack-keys.json")]
    pub keys: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decrypt every encrypted file found under the given paths
    Decrypt {
        /// Files or directories to scan
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Decide and count everything without touching the filesystem
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Re-decrypt files whose existing output is bad
        #[arg(long)]
        fix: bool,

        /// Re-decrypt even when an output already exists
        #[arg(long)]
        overwrite: bool,

        /// Delete encrypted originals after decrypting them
        #[arg(long)]
        delete: bool,

        /// Also delete originals whose output already exists
        #[arg(long)]
        delete_old: bool,

        /// Show a progress spinner
        #[arg(short, long)]
        progress: bool,

        /// Solve keys one at a time
        #[arg(long)]
        sequential: bool,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,

        /// Extensions added by the ransomware (comma separated)
        #[arg(short = 'e', long, value_delimiter = ',')]
        extensions: Option<Vec<String>>,
    },

    /// Recover the AES key of one encrypted file from known factors
    Unfactor {
        /// An encrypted file
        file: PathBuf,

        /// Prime factors of the integer in the file header (decimal)
        #[arg(required = true)]
        factors: Vec<String>,

        /// Key width in bytes
        #[arg(short, long, default_value_t = 32)]
        width: usize,

        /// Store the factors and the recovered key in the key database
        #[arg(short, long)]
        save: bool,
    },

    /// List the key database
    Keys {
        /// Only ids that still need factors
        #[arg(long)]
        pending: bool,
    },
}
