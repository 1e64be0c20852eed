// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kestrel - an always-on chat bot backed by pooled Gemini credentials.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod console;
mod serve;

use clap::{Parser, Subcommand};

/// Kestrel - an always-on chat bot backed by pooled Gemini credentials.
#[derive(Parser, Debug)]
#[command(name = "kestrel", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the connector and reply pipeline until SIGINT/SIGTERM.
    Serve,
    /// Validate configuration and print a summary.
    Check {
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match kestrel_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            kestrel_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Check { json }) => check::run_check(&config, json),
        None => {
            println!("kestrel: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
