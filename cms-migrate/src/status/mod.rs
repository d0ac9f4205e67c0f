//! Execution status ledger.
//!
//! The ledger maps an environment id to one record per migration name. It is
//! loaded once per batch, mutated after every completed unit and persisted
//! immediately after each mutation.

mod backend;
mod redis_backend;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::StatusError;
use crate::migration::Operation;
use crate::order::DeclaredOrder;

pub use self::backend::{
    BackendSettings, DEFAULT_REDIS_KEY, DEFAULT_STATUS_FILE, FileBackend, StatusBackend, StatusStore,
};
pub use self::redis_backend::RedisBackend;

/// Outcome of the last successful run or rollback of one migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub name: String,
    pub order: DeclaredOrder,
    pub success: bool,
    pub time: DateTime<Utc>,
    #[serde(rename = "lastOperation", default)]
    pub last_operation: Operation,
}

/// Environment id to execution records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLedger {
    environments: BTreeMap<String, Vec<ExecutionRecord>>,
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    pub fn environments(&self) -> impl Iterator<Item = (&str, &[ExecutionRecord])> {
        self.environments.iter().map(|(env, records)| (env.as_str(), records.as_slice()))
    }

    pub fn records(&self, environment_id: &str) -> &[ExecutionRecord] {
        self.environments
            .get(environment_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn record(&self, environment_id: &str, name: &str) -> Option<&ExecutionRecord> {
        self.records(environment_id).iter().find(|r| r.name == name)
    }

    /// Insert the record or replace the one with the same name.
    pub fn upsert(&mut self, environment_id: &str, record: ExecutionRecord) {
        let records = self.environments.entry(environment_id.to_string()).or_default();
        match records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// True iff the unit already completed `operation` successfully.
    pub fn should_skip(&self, environment_id: &str, name: &str, operation: Operation) -> bool {
        self.record(environment_id, name)
            .is_some_and(|r| r.success && r.last_operation == operation)
    }

    /// Pretty-printed JSON with two-space indentation.
    pub fn to_json(&self) -> Result<String, StatusError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, StatusError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Load the ledger, falling back to an empty one when the backend fails.
pub async fn load_ledger(store: &StatusStore) -> StatusLedger {
    match store.load().await {
        Ok(ledger) => ledger,
        Err(err) => {
            warn!("failed to read migration status ({err}); continuing with empty status");
            StatusLedger::new()
        }
    }
}

/// Record a successful `operation` of `name` and persist the whole ledger.
pub async fn mark_completed(
    ledger: &mut StatusLedger,
    store: &StatusStore,
    environment_id: &str,
    name: &str,
    order: &DeclaredOrder,
    operation: Operation,
) -> Result<(), StatusError> {
    ledger.upsert(
        environment_id,
        ExecutionRecord {
            name: name.to_string(),
            order: order.clone(),
            success: true,
            time: Utc::now(),
            last_operation: operation,
        },
    );

    store.persist(&ledger.to_json()?).await
}
