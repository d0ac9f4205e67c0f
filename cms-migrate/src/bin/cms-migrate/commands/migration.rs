use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use clap::{ArgGroup, Args, Subcommand};
use cms_migrate::discovery::normalize_file_name;
use cms_migrate::script::migration_template;
use cms_migrate::{
    DeclaredOrder, DirectorySource, EngineError, MigrationRange, MigrationSource, MigrationUnit, Operation, OrderKey,
    Orchestrator, RunHooks, RunOptions, RunReport, Selection, UnitReport,
};
use serde::Serialize;

use super::open_store;
use crate::context::ProjectContext;
use crate::help::ExampleGroup;
use crate::http::HttpManagementClient;
use crate::output::OutputManager;

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Run Migrations",
        commands: &[
            "cms-migrate migration run --name 01_init --environment dev",
            "cms-migrate migration run --all --environment dev              # Skip already executed",
            "cms-migrate migration run --range 2:5 --environment dev",
            "cms-migrate migration run --range T2023-03:2023-04 --environment dev",
            "cms-migrate migration run --all --environment-id <id> --api-key <key>",
        ],
    },
    ExampleGroup {
        title: "Rollback and Recovery",
        commands: &[
            "cms-migrate migration run --all --rollback --environment dev   # Newest first",
            "cms-migrate migration run --all --force --environment dev      # Re-run everything",
            "cms-migrate migration run --all --continue-on-error --environment dev",
        ],
    },
    ExampleGroup {
        title: "Create Migrations",
        commands: &[
            "cms-migrate migration add --name add_blog_post",
            "cms-migrate migration add --name add_blog_post --timestamp-order",
        ],
    },
];

#[derive(Subcommand)]
pub enum MigrationCommands {
    /// Run (or roll back) migrations against an environment
    #[command(name = "run")]
    Run(RunArgs),

    /// Create a new migration file from the template
    #[command(name = "add")]
    Add {
        /// Migration name (e.g., add_blog_post)
        #[arg(short, long)]
        name: String,

        /// Order the migration by its creation time instead of a number
        #[arg(long)]
        timestamp_order: bool,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("selection").required(true).args(["name", "all", "range"])))]
#[command(group(ArgGroup::new("target").required(true).args(["environment", "environment_id"])))]
pub struct RunArgs {
    /// Run a single migration by file name
    #[arg(short, long)]
    name: Option<String>,

    /// Run every migration in the migrations directory
    #[arg(short, long)]
    all: bool,

    /// Run migrations whose order falls in "from:to" or "Tyyyy-mm-dd-hh-mm-ss:yyyy-mm-dd-hh-mm-ss"
    #[arg(short, long)]
    range: Option<String>,

    /// Named environment from .environments.json
    #[arg(short, long)]
    environment: Option<String>,

    /// Environment id (requires --api-key)
    #[arg(long, requires = "api_key")]
    environment_id: Option<String>,

    /// Management API key (requires --environment-id)
    #[arg(long, requires = "environment_id")]
    api_key: Option<String>,

    /// Execute the rollback steps instead of the run steps
    #[arg(short = 'b', long)]
    rollback: bool,

    /// Also execute migrations already recorded as completed
    #[arg(short, long)]
    force: bool,

    /// Keep going when a migration fails
    #[arg(long)]
    continue_on_error: bool,
}

#[derive(Serialize)]
struct UnitSummary {
    name: String,
    order: DeclaredOrder,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct RunSummary {
    operation: Operation,
    planned: usize,
    executed: Vec<UnitSummary>,
    skipped: Vec<String>,
    stopped_early: bool,
}

impl From<&RunReport> for RunSummary {
    fn from(report: &RunReport) -> Self {
        Self {
            operation: report.operation,
            planned: report.planned,
            executed: report
                .executed
                .iter()
                .map(|unit| UnitSummary {
                    name: unit.name.clone(),
                    order: unit.order.clone(),
                    success: unit.outcome.is_success(),
                    error: unit.outcome.failure().map(|f| f.to_string()),
                })
                .collect(),
            skipped: report.skipped.clone(),
            stopped_early: report.stopped_early,
        }
    }
}

pub async fn handle_migration_commands(command: MigrationCommands, output: &OutputManager) -> Result<()> {
    let ctx = ProjectContext::current()?;

    match command {
        MigrationCommands::Run(args) => handle_run(&ctx, args, output).await?,
        MigrationCommands::Add { name, timestamp_order } => handle_add(&ctx, &name, timestamp_order, output)?,
    }

    Ok(())
}

async fn handle_run(ctx: &ProjectContext, args: RunArgs, output: &OutputManager) -> Result<()> {
    let (environment_id, api_key) = match (&args.environment, args.environment_id, args.api_key) {
        (Some(name), _, _) => {
            let entry = ctx.environment(name)?;
            (entry.environment_id, entry.api_key)
        }
        (None, Some(id), Some(key)) => (id, key),
        _ => anyhow::bail!("Specify --environment or both --environment-id and --api-key"),
    };

    let selection = match (args.name, args.all, args.range) {
        (Some(name), _, _) => Selection::Name(name),
        (None, true, _) => Selection::All,
        (None, false, Some(range)) => Selection::Range(MigrationRange::parse(&range)?),
        (None, false, None) => anyhow::bail!("Specify --name, --all or --range"),
    };

    let operation = if args.rollback { Operation::Rollback } else { Operation::Run };
    let options = RunOptions::new(selection, operation)
        .force(args.force)
        .continue_on_error(args.continue_on_error);

    output.heading(match operation {
        Operation::Run => "Run Migrations",
        Operation::Rollback => "Roll Back Migrations",
    });
    output.field("Environment", &environment_id);
    output.field("Migrations", &ctx.migrations_dir.display().to_string());

    let store = open_store(ctx).await?;
    output.field("Status backend", store.backend_name());

    let source = DirectorySource::new(&ctx.migrations_dir);
    let client = HttpManagementClient::new(&ctx.remote_settings()?, &environment_id, &api_key)?;

    if args.force {
        output.warning("Skipping the check for already executed migrations");
    }

    let report = Orchestrator::new(&source, &client, &store, environment_id.as_str())
        .with_hooks(progress_hooks(output))
        .verbose(output.options.verbose)
        .run(&options)
        .await?;

    if output.is_json() {
        output.json(&RunSummary::from(&report))?;
    } else {
        output.run_summary(&report);
    }

    if !report.succeeded() {
        anyhow::bail!(
            "{} migration(s) failed ({})",
            report.failures().count(),
            report.summary()
        );
    }

    Ok(())
}

fn progress_hooks(output: &OutputManager) -> RunHooks {
    let on_skip = output.clone();
    let before = output.clone();
    let after = output.clone();

    RunHooks {
        on_skip: Some(Box::new(move |unit: &MigrationUnit| on_skip.unit_skipped(&unit.name))),
        before_unit: Some(Box::new(move |unit: &MigrationUnit, position: usize, total: usize| {
            before.unit_started(position, total, &unit.name);
        })),
        after_unit: Some(Box::new(move |unit: &UnitReport| after.unit_finished(unit))),
    }
}

fn handle_add(ctx: &ProjectContext, name: &str, timestamp_order: bool, output: &OutputManager) -> Result<()> {
    output.heading("Add Migration");

    let file_name = normalize_file_name(name)?;

    std::fs::create_dir_all(&ctx.migrations_dir)
        .with_context(|| format!("Failed to create {}", ctx.migrations_dir.display()))?;

    let (file_name, order) = if timestamp_order {
        let now = Utc::now().trunc_subsecs(0);
        let prefix = now.format("%Y-%m-%d-%H-%M-%S");
        (format!("{prefix}-{file_name}"), DeclaredOrder::Timestamp(now))
    } else {
        let number = next_number(ctx).context("Cannot determine the order of the new migration")?;
        (file_name, DeclaredOrder::Integer(number))
    };

    let path = ctx.migrations_dir.join(&file_name);
    if path.exists() {
        anyhow::bail!("Migration {} already exists", path.display());
    }

    std::fs::write(&path, migration_template(&order))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    output.success(&format!("Created {}", path.display()));
    output.field("Order", &order.to_string());
    output.note(&format!(
        "Edit the [[run]] steps, then run it with 'cms-migrate migration run --name {file_name}'"
    ));

    Ok(())
}

/// One past the highest numeric order in the migrations directory.
///
/// Every existing file must load, otherwise the highest order is unknown.
fn next_number(ctx: &ProjectContext) -> Result<i64, EngineError> {
    let units = DirectorySource::new(&ctx.migrations_dir).discover_all(Operation::Run)?;
    let highest = units
        .iter()
        .filter_map(|unit| match unit.order_key() {
            Some(OrderKey::Number(n)) => i64::try_from(n).ok(),
            _ => None,
        })
        .max();
    Ok(highest.map_or(1, |max| max + 1))
}
