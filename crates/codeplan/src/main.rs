// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Codeplan - plan-and-apply code generation from the terminal.
//!
//! This is the binary entry point.

mod generate;
mod project_dir;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use codeplan_config::CodeplanConfig;
use codeplan_core::CodeplanError;
use codeplan_core::types::GenerationMode;

/// Codeplan - plan-and-apply code generation from the terminal.
#[derive(Parser, Debug)]
#[command(name = "codeplan", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the backend to generate code for a prompt.
    Generate {
        /// What to build or change.
        prompt: String,
        /// Wait for the whole result instead of streaming it.
        #[arg(long)]
        no_stream: bool,
        /// Project directory name under `project.root`; files are sent as
        /// context and approved changes are written there.
        #[arg(long)]
        project: Option<String>,
        /// Generation strategy (simple, agentic, fullstack).
        #[arg(long)]
        mode: Option<GenerationMode>,
        /// Model override.
        #[arg(long)]
        model: Option<String>,
    },
    /// Show the line diff between two files.
    Diff { old: PathBuf, new: PathBuf },
    /// Print the resolved configuration.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match codeplan_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            codeplan_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.agent.log_level);

    let outcome = match cli.command {
        Some(Commands::Generate {
            prompt,
            no_stream,
            project,
            mode,
            model,
        }) => {
            let args = generate::GenerateArgs {
                prompt,
                stream: !no_stream,
                project,
                mode,
                model,
            };
            generate::run_generate(config, args).await
        }
        Some(Commands::Diff { old, new }) => render::run_diff(&old, &new).await,
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("codeplan: use --help for available commands");
            Ok(())
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            render::print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn print_config(config: &CodeplanConfig) -> Result<(), CodeplanError> {
    print!("{}", render_config(config)?);
    Ok(())
}

/// The config as TOML with the API key masked.
fn render_config(config: &CodeplanConfig) -> Result<String, CodeplanError> {
    let mut shown = config.clone();
    if shown.backend.api_key.is_some() {
        shown.backend.api_key = Some("********".to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| CodeplanError::Config(format!("failed to render config: {e}")))
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so streamed content on stdout stays clean.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("codeplan={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        let config =
            codeplan_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.agent.name, "codeplan");
    }

    #[test]
    fn generate_flags_parse() {
        let cli = Cli::parse_from([
            "codeplan",
            "generate",
            "add a login button",
            "--no-stream",
            "--project",
            "shop",
            "--mode",
            "fullstack",
        ]);
        match cli.command {
            Some(Commands::Generate {
                prompt,
                no_stream,
                project,
                mode,
                model,
            }) => {
                assert_eq!(prompt, "add a login button");
                assert!(no_stream);
                assert_eq!(project.as_deref(), Some("shop"));
                assert_eq!(mode, Some(GenerationMode::Fullstack));
                assert_eq!(model, None);
            }
            other => panic!("expected generate, got {other:?}"),
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["codeplan", "generate", "x", "--mode", "turbo"]).is_err());
    }

    #[test]
    fn api_key_is_masked() {
        let mut config = CodeplanConfig::default();
        config.backend.api_key = Some("sk-secret".into());
        let text = render_config(&config).unwrap();
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("[backend]"));
    }
}
