//! Squish CLI - Self-hosted compression for images, video, audio and PDFs
//!
//! Squish re-encodes uploads with size-dependent settings and only keeps
//! the result when it actually saves space.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the web service
//! squish serve --port 8080
//!
//! # Compress files locally
//! squish compress photo.jpg report.pdf -o out/
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve(args) => commands::serve::run(args, config_path).await,
        Command::Compress(args) => commands::compress::run(args, config_path).await,
        Command::Jobs(args) => commands::jobs::run(args, config_path).await,
        Command::User(args) => commands::user::run(args, config_path).await,
        Command::Config(args) => commands::config::run(args, config_path).await,
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,squish=debug,squish_core=debug"
    } else {
        "warn,squish=info,squish_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
