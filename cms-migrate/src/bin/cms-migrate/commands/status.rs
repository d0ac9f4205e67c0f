use anyhow::{Context, Result};
use clap::Subcommand;
use cms_migrate::{DeclaredOrder, ExecutionRecord, Operation, StatusLedger};
use comfy_table::{Cell, Color as TableColor};
use serde::Serialize;

use super::open_store;
use crate::context::ProjectContext;
use crate::help::ExampleGroup;
use crate::output::{OutputManager, View};

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Inspect Execution Status",
    commands: &[
        "cms-migrate status show                      # Every environment",
        "cms-migrate status show --environment dev",
        "cms-migrate --output json status show --environment-id <id>",
    ],
}];

#[derive(Subcommand)]
pub enum StatusCommands {
    /// Show the recorded execution status
    #[command(name = "show")]
    Show {
        /// Named environment from .environments.json
        #[arg(short, long, conflicts_with = "environment_id")]
        environment: Option<String>,

        /// Environment id
        #[arg(long)]
        environment_id: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct StatusRow {
    environment: String,
    name: String,
    order: DeclaredOrder,
    success: bool,
    time: String,
    #[serde(rename = "lastOperation")]
    last_operation: Operation,
}

impl StatusRow {
    fn new(environment: &str, record: &ExecutionRecord) -> Self {
        Self {
            environment: environment.to_string(),
            name: record.name.clone(),
            order: record.order.clone(),
            success: record.success,
            time: record.time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            last_operation: record.last_operation,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct StatusView {
    rows: Vec<StatusRow>,
}

impl StatusView {
    fn from_ledger(ledger: &StatusLedger, environment: Option<&str>) -> Self {
        let rows = ledger
            .environments()
            .filter(|(env, _)| environment.is_none_or(|wanted| wanted == *env))
            .flat_map(|(env, records)| records.iter().map(move |record| StatusRow::new(env, record)))
            .collect();
        Self { rows }
    }
}

impl View for StatusView {
    fn headers(&self) -> &'static [&'static str] {
        &["Environment", "Migration", "Order", "Last operation", "Success", "Time"]
    }

    fn rows(&self, colored: bool) -> Vec<Vec<Cell>> {
        self.rows
            .iter()
            .map(|row| {
                let success = match (colored, row.success) {
                    (false, success) => Cell::new(success),
                    (true, true) => Cell::new("yes").fg(TableColor::Green),
                    (true, false) => Cell::new("no").fg(TableColor::Red),
                };
                vec![
                    Cell::new(&row.environment),
                    Cell::new(&row.name),
                    Cell::new(&row.order),
                    Cell::new(row.last_operation),
                    success,
                    Cell::new(&row.time),
                ]
            })
            .collect()
    }

    fn lines(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| format!("{} {} {} {}", row.environment, row.name, row.last_operation, row.time))
            .collect()
    }

    fn placeholder(&self) -> &'static str {
        "No executed migrations"
    }
}

pub async fn handle_status_commands(command: StatusCommands, output: &OutputManager) -> Result<()> {
    let ctx = ProjectContext::current()?;

    match command {
        StatusCommands::Show {
            environment,
            environment_id,
        } => {
            let environment_id = match environment {
                Some(name) => Some(ctx.environment(&name)?.environment_id),
                None => environment_id,
            };
            show(&ctx, environment_id.as_deref(), output).await
        }
    }
}

async fn show(ctx: &ProjectContext, environment_id: Option<&str>, output: &OutputManager) -> Result<()> {
    let store = open_store(ctx).await?;
    let ledger = store.load().await.context("Failed to read migration status")?;

    output.heading("Migration Status");
    output.field("Status backend", store.backend_name());

    output.show(&StatusView::from_ledger(&ledger, environment_id))
}
