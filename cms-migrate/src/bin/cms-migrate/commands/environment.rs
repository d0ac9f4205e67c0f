use anyhow::Result;
use clap::Subcommand;

use crate::context::{ENVIRONMENTS_FILE, EnvironmentEntry, ProjectContext};
use crate::help::ExampleGroup;
use crate::output::OutputManager;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Named Environments",
    commands: &[
        "cms-migrate environment add --name dev --environment-id <id> --api-key <key>",
        "cms-migrate migration run --all --environment dev",
    ],
}];

#[derive(Subcommand)]
pub enum EnvironmentCommands {
    /// Store credentials of an environment under a name
    #[command(name = "add")]
    Add {
        /// Name used with --environment
        #[arg(short, long)]
        name: String,

        /// Environment id
        #[arg(long)]
        environment_id: String,

        /// Management API key
        #[arg(long)]
        api_key: String,
    },
}

pub fn handle_environment_commands(command: EnvironmentCommands, output: &OutputManager) -> Result<()> {
    let ctx = ProjectContext::current()?;

    match command {
        EnvironmentCommands::Add {
            name,
            environment_id,
            api_key,
        } => add_environment(&ctx, &name, environment_id, api_key, output),
    }
}

fn add_environment(
    ctx: &ProjectContext,
    name: &str,
    environment_id: String,
    api_key: String,
    output: &OutputManager,
) -> Result<()> {
    let mut environments = ctx.load_environments()?;

    let entry = EnvironmentEntry {
        environment_id,
        api_key,
    };

    if let Some(previous) = environments.insert(name.to_string(), entry) {
        output.warning(&format!(
            "Environment \"{name}\" already existed (environment id {}) and was overwritten",
            previous.environment_id
        ));
    }

    ctx.save_environments(&environments)?;
    output.success(&format!("Saved environment \"{name}\" to {ENVIRONMENTS_FILE}"));

    Ok(())
}
