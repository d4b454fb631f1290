//! Command-line interface definitions for the `rootcause` tool.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Find distinct errors in your environment and have them explained
#[derive(Parser, Debug)]
#[command(
    name = "rootcause",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ROOTCAUSE_GIT_SHA"), ")"),
    about,
    long_about = None
)]
#[command(
    after_help = "EXAMPLES:\n    rootcause search --from 3h\n    rootcause run --query-id q_123 --run-id r_456\n    rootcause explain \"AccessDeniedException: not authorized to perform s3:GetObject\""
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Show debug logs on stderr
    #[arg(long, short = 'd', global = true)]
    pub debug: bool,

    /// Generate shell completions
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search recent errors, pick one, and explain it
    Search {
        /// Start of the time range (now, 30m, 1h, 7d or RFC 3339)
        #[arg(long, value_name = "TIME")]
        from: Option<String>,

        /// End of the time range
        #[arg(long, value_name = "TIME")]
        to: Option<String>,

        /// Dataset to search (repeatable, defaults to config)
        #[arg(long = "dataset", value_name = "NAME")]
        datasets: Vec<String>,

        /// Events fetched per page
        #[arg(long, value_name = "N")]
        page_size: Option<usize>,

        #[command(flatten)]
        explain: ExplainArgs,
    },
    /// Pick an error from a finished query run and explain it
    Run {
        #[arg(long, value_name = "ID")]
        query_id: String,

        #[arg(long, value_name = "ID")]
        run_id: String,

        /// Events to request from the run
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        #[command(flatten)]
        explain: ExplainArgs,
    },
    /// Explain an error message directly
    Explain {
        /// Error message to explain (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        error: Vec<String>,

        #[command(flatten)]
        explain: ExplainArgs,
    },
    /// Print the default configuration file
    Config,
}

/// Options shared by every command that ends in an explanation
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ExplainArgs {
    /// Completion model (overrides config)
    #[arg(long, short = 'm', value_name = "MODEL")]
    pub model: Option<String>,

    /// Stream tokens from the provider as they are generated
    #[arg(long, short = 'l')]
    pub live: bool,
}
