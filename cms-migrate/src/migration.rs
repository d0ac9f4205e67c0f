//! Migration units and the capabilities they expose.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::ManagementClient;
use crate::errors::MigrationError;
use crate::order::{DeclaredOrder, OrderKey};

/// Direction of a migration invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Run,
    Rollback,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Run => f.write_str("run"),
            Operation::Rollback => f.write_str("rollback"),
        }
    }
}

/// User logic applied to a remote environment.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Apply the migration.
    async fn run(&self, client: &dyn ManagementClient) -> Result<(), MigrationError>;

    /// Whether `rollback` is implemented.
    fn has_rollback(&self) -> bool {
        false
    }

    /// Revert the migration. Only called when `has_rollback` returns true.
    async fn rollback(&self, _client: &dyn ManagementClient) -> Result<(), MigrationError> {
        Err(MigrationError::failed("migration does not implement rollback"))
    }

    /// Whether the migration can serve `operation`.
    fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::Run => true,
            Operation::Rollback => self.has_rollback(),
        }
    }
}

/// A named, ordered migration. Identity is the name.
#[derive(Clone)]
pub struct MigrationUnit {
    pub name: String,
    pub order: DeclaredOrder,
    pub migration: Arc<dyn Migration>,
}

impl MigrationUnit {
    pub fn new(
        name: impl Into<String>,
        order: impl Into<DeclaredOrder>,
        migration: impl Migration + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            order: order.into(),
            migration: Arc::new(migration),
        }
    }

    pub fn from_arc(name: impl Into<String>, order: impl Into<DeclaredOrder>, migration: Arc<dyn Migration>) -> Self {
        Self {
            name: name.into(),
            order: order.into(),
            migration,
        }
    }

    pub fn order_key(&self) -> Option<OrderKey> {
        self.order.order_key()
    }
}

impl fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("has_rollback", &self.migration.has_rollback())
            .finish()
    }
}
