//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use squish_core::config::Config;

/// Load configuration from `--config` or the default location.
///
/// A missing file yields the defaults; a file that exists but does not
/// parse is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

/// The file `config` subcommands read and write.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map_or_else(Config::config_path, Path::to_path_buf)
}

pub mod compress;
pub mod config;
pub mod jobs;
pub mod serve;
pub mod user;

/// Squish - Adaptive compression for images, video, audio and PDFs
#[derive(Parser)]
#[command(name = "squish")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Use this config file instead of the default
    #[arg(long, global = true, env = "SQUISH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Detailed logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Run the web service
    Serve(ServeArgs),

    /// Compress local files without a server
    Compress(CompressArgs),

    /// Inspect and manage stored jobs
    Jobs(JobsArgs),

    /// Manage accounts
    User(UserArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind to localhost only
    #[arg(long)]
    pub localhost_only: bool,

    /// Directory for jobs, outputs and accounts
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

/// Arguments for the compress command
#[derive(Parser)]
pub struct CompressArgs {
    /// Files to compress
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "squished")]
    pub output: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the jobs command
#[derive(Parser)]
pub struct JobsArgs {
    /// Jobs subcommand
    #[command(subcommand)]
    pub action: JobsAction,

    /// Directory for jobs, outputs and accounts
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,
}

/// Jobs subcommands
#[derive(Subcommand)]
pub enum JobsAction {
    /// List recent jobs
    List {
        /// Maximum number of jobs to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show one job
    Show {
        /// Job ID
        id: String,
    },

    /// Remove a job and its output
    Remove {
        /// Job ID
        id: String,
    },

    /// Remove every job and output
    Clear,

    /// Delete outputs past the retention window
    Purge,
}

/// Arguments for the user command
#[derive(Parser)]
pub struct UserArgs {
    /// User subcommand
    #[command(subcommand)]
    pub action: UserAction,

    /// Directory for jobs, outputs and accounts
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

/// User subcommands
#[derive(Subcommand)]
pub enum UserAction {
    /// Create an account
    Add {
        /// Username
        username: String,

        /// Make the account an administrator
        #[arg(long)]
        admin: bool,

        /// Password
        #[arg(long, env = "SQUISH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// List accounts
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete an account
    Remove {
        /// Username
        username: String,
    },

    /// Change an account's password
    Passwd {
        /// Username
        username: String,

        /// New password
        #[arg(long, env = "SQUISH_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show all configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Get a configuration value
    Get {
        /// Configuration key (e.g. server.port)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g. server.port)
        key: String,

        /// Value to set
        value: String,
    },
}
