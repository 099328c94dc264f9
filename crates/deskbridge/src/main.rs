// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! deskbridge - Matrix direct messages as Chatwoot conversations.
//!
//! This is the binary entry point for the bridge.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// deskbridge - Matrix direct messages as Chatwoot conversations.
#[derive(Parser, Debug)]
#[command(name = "deskbridge", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge: sync loop plus webhook listener.
    Serve,
    /// Validate the configuration and print it with secrets redacted.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match deskbridge_config::load_and_validate(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            deskbridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("deskbridge: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => match check::render_config(&config) {
            Ok(rendered) => {
                eprintln!("deskbridge: configuration is valid");
                print!("{rendered}");
            }
            Err(e) => {
                eprintln!("deskbridge: failed to render configuration: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("deskbridge: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc can advance the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0);
    }

    #[test]
    fn config_flag_is_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["deskbridge", "check-config", "--config", "/tmp/db.toml"])
            .unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/db.toml")));
    }

    #[test]
    fn serve_parses_without_config() {
        let cli = Cli::try_parse_from(["deskbridge", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert!(cli.config.is_none());
    }
}
