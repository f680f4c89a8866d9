//! CLI argument definitions and parsing structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ssdlc - chat-driven secure software development workflow
#[derive(Parser, Debug)]
#[command(name = "ssdlc")]
#[command(about = "Chat-driven secure software development workflow backed by an LLM")]
#[command(long_about = r#"
ssdlc turns a conversation about the application you want into a set of
documents, one per stage, and finally generated code.

EXAMPLES:
  # Start an interactive session
  ssdlc chat

  # Run without network access using canned stage documents
  ssdlc chat --dry-run --output-dir ./out

  # Show which stage documents already exist
  ssdlc status --output-dir ./out

  # Show the effective configuration
  ssdlc config

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .ssdlc/config.toml
  Use --config (or SSDLC_CONFIG) to specify an explicit config file path

STAGES:
  Interview → Environment → Security → Design → Generation
  Existing stage documents in the output directory are picked up on start,
  so an interrupted run continues where it stopped.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model to use for LLM provider calls
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Maximum attempts per stage before escalating (1-10)
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive session
    ///
    /// Type `exit`, `quit` or `bye` to leave. When a stage keeps failing you
    /// are asked whether to continue without it, wait longer, or abort.
    Chat {
        /// Use canned stage documents instead of calling the LLM
        #[arg(long)]
        dry_run: bool,

        /// Directory for stage documents and receipts
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// How far one message drives the workflow: until-complete or single-stage
        #[arg(long)]
        step_mode: Option<String>,

        /// Answer escalations with a fixed policy: prompt, continue or abort
        #[arg(long)]
        escalation: Option<String>,
    },

    /// Show which stage documents exist
    Status {
        /// Directory holding stage documents
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration and the source of each value
    Config,
}

/// Build the CLI command structure without parsing arguments
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
