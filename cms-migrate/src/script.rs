//! Declarative migration files.
//!
//! A migration file is a TOML document with an `order`, a list of `run` steps
//! and an optional list of `rollback` steps. Each step is one management API
//! request; steps execute in sequence and the first failure aborts the unit.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use crate::client::{ApiRequest, ManagementClient};
use crate::errors::MigrationError;
use crate::migration::Migration;
use crate::order::DeclaredOrder;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    order: Option<toml::Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    run: Vec<ApiRequest>,
    #[serde(default)]
    rollback: Vec<ApiRequest>,
}

/// Parsed contents of a migration file.
#[derive(Debug, Clone)]
pub struct ScriptDocument {
    pub order: Option<DeclaredOrder>,
    pub script: ScriptMigration,
}

impl ScriptDocument {
    pub fn parse(source: &str) -> Result<Self, toml::de::Error> {
        let file: ScriptFile = toml::from_str(source)?;
        Ok(Self {
            order: file.order.as_ref().map(DeclaredOrder::from_toml),
            script: ScriptMigration {
                description: file.description,
                run: file.run,
                rollback: file.rollback,
            },
        })
    }
}

/// A migration whose logic is a fixed list of API requests.
#[derive(Debug, Clone, Default)]
pub struct ScriptMigration {
    pub description: Option<String>,
    pub run: Vec<ApiRequest>,
    pub rollback: Vec<ApiRequest>,
}

impl ScriptMigration {
    pub fn has_run(&self) -> bool {
        !self.run.is_empty()
    }

    async fn execute_steps(&self, client: &dyn ManagementClient, steps: &[ApiRequest]) -> Result<(), MigrationError> {
        for (index, step) in steps.iter().enumerate() {
            debug!("step {}/{}: {} {}", index + 1, steps.len(), step.method, step.path);
            client.execute(step).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for ScriptMigration {
    async fn run(&self, client: &dyn ManagementClient) -> Result<(), MigrationError> {
        self.execute_steps(client, &self.run).await
    }

    fn has_rollback(&self) -> bool {
        !self.rollback.is_empty()
    }

    async fn rollback(&self, client: &dyn ManagementClient) -> Result<(), MigrationError> {
        self.execute_steps(client, &self.rollback).await
    }
}

/// Template written by `migration add`.
pub fn migration_template(order: &DeclaredOrder) -> String {
    let order = match order {
        DeclaredOrder::Timestamp(ts) => ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        other => other.to_string(),
    };

    format!(
        r#"order = {order}
description = ""

# Each [[run]] step is one management API request, executed in order.
[[run]]
method = "GET"
path = "types"

# Optional: steps that revert the migration.
# [[rollback]]
# method = "DELETE"
# path = "types/codename/my_type"
"#
    )
}
