//! mlxremap - convert custom DeepSeek MoE checkpoints for MLX
//!
//! Usage:
//!   mlxremap remap                              # model_weights/best_deepseek_v3.pt -> POC/mlx_model
//!   mlxremap remap weights.pt -o out --strict   # fail on the first missing tensor
//!   mlxremap verify -o out                      # check every key MLX will look up
//!   mlxremap fetch                              # download the source checkpoint

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mlxremap_core::{
    fetch::{DEFAULT_FILENAME, DEFAULT_LOCAL_DIR, DEFAULT_REPO_ID},
    DEFAULT_OUTPUT_DIR, DEFAULT_SOURCE_PATH,
};
use tracing_subscriber::EnvFilter;

mod commands;

/// Remap DeepSeek MoE checkpoints to the MLX DeepSeek-V3 layout.
#[derive(Parser)]
#[command(name = "mlxremap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a source checkpoint and write the MLX output directory
    Remap {
        /// Source checkpoint (.pt or .safetensors)
        #[arg(value_name = "SOURCE", default_value = DEFAULT_SOURCE_PATH)]
        source: PathBuf,

        /// Output directory; must already hold config.json
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Fail on the first missing source tensor
        #[arg(long)]
        strict: bool,
    },

    /// Check a converted directory for missing keys
    Verify {
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,
    },

    /// Download the source checkpoint from the Hugging Face Hub
    Fetch {
        #[arg(long, default_value = DEFAULT_REPO_ID)]
        repo: String,

        #[arg(long, default_value = DEFAULT_FILENAME)]
        filename: String,

        #[arg(long, default_value = DEFAULT_LOCAL_DIR)]
        local_dir: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Remap {
            source,
            output_dir,
            strict,
        } => commands::remap(source, output_dir, strict),
        Commands::Verify { output_dir } => commands::verify(&output_dir),
        Commands::Fetch {
            repo,
            filename,
            local_dir,
        } => commands::fetch(repo, filename, local_dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_remap_defaults() {
        let cli = Cli::parse_from(["mlxremap", "remap"]);
        match cli.command {
            Commands::Remap {
                source,
                output_dir,
                strict,
            } => {
                assert_eq!(source, PathBuf::from("model_weights/best_deepseek_v3.pt"));
                assert_eq!(output_dir, PathBuf::from("POC/mlx_model"));
                assert!(!strict);
            }
            _ => panic!("expected remap"),
        }
    }

    #[test]
    fn test_global_verbose_after_subcommand() {
        let cli = Cli::parse_from(["mlxremap", "verify", "-o", "out", "-v"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Verify { output_dir } => assert_eq!(output_dir, PathBuf::from("out")),
            _ => panic!("expected verify"),
        }
    }
}
