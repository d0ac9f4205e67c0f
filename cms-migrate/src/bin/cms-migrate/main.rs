mod commands;
mod context;
mod help;
mod http;
mod output;
mod theme;

use anyhow::Result;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::control::ShouldColorize;

use commands::{
    environment::{EnvironmentCommands, handle_environment_commands},
    migration::{MigrationCommands, handle_migration_commands},
    status::{StatusCommands, handle_status_commands},
};
use output::{GlobalOptions, OutputFormat, OutputManager};

#[derive(Parser)]
#[command(name = "cms-migrate")]
#[command(version)]
#[command(
    about = "Run ordered content migrations against a headless CMS environment",
    long_about = r#"Migration runner for headless CMS environments that provides:

• Numeric or timestamp ordering with duplicate and invalid order detection
• Range selection, rollback in reverse order and skip of executed migrations
• A per-environment execution status kept in a file or in Redis
• Retries with backoff for throttled Management API requests

Commands:
  migration    Run and create migrations
  environment  Store named environment credentials
  status       Show the recorded execution status
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run and create migrations
    #[command(subcommand)]
    Migration(MigrationCommands),

    /// Manage named environments in .environments.json
    #[command(subcommand)]
    Environment(EnvironmentCommands),

    /// Show the execution status of migrations
    #[command(subcommand)]
    Status(StatusCommands),
}

impl Cli {
    /// Parse the command line with the styled, example-bearing help.
    fn parse_decorated() -> Self {
        let color = ShouldColorize::from_env().should_colorize();
        let matches = help::decorate(Cli::command(), color).get_matches();
        Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit())
    }

    fn options(&self) -> GlobalOptions {
        GlobalOptions {
            output_format: self.output,
            quiet: self.quiet,
            verbose: self.verbose,
            no_color: self.no_color,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse_decorated();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let output = OutputManager::new(cli.options());
    if let Err(err) = execute(cli.command, &output).await {
        output.error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

async fn execute(command: Commands, output: &OutputManager) -> Result<()> {
    match command {
        Commands::Migration(cmd) => handle_migration_commands(cmd, output).await,
        Commands::Environment(cmd) => handle_environment_commands(cmd, output),
        Commands::Status(cmd) => handle_status_commands(cmd, output).await,
    }
}
