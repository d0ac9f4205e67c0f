//! cms-migrate core library.
//!
//! Ordered, idempotent execution of migrations against a remote content
//! management environment, with a persisted per-environment status ledger.

pub mod client;
pub mod discovery;
pub mod dispatcher;
pub mod errors;
pub mod migration;
pub mod orchestrator;
pub mod order;
pub mod range;
pub mod script;
pub mod status;

pub use client::{ApiError, ApiRequest, HttpMethod, ManagementClient, TransportDetail};
pub use discovery::{DirectorySource, MigrationSource, StaticSource};
pub use dispatcher::{DispatchOutcome, Dispatcher, FailureDetail, FailureKind};
pub use errors::*;
pub use migration::{Migration, MigrationUnit, Operation};
pub use orchestrator::{Orchestrator, RunHooks, RunOptions, RunReport, Selection, UnitReport};
pub use order::{DeclaredOrder, OrderKey};
pub use range::MigrationRange;
pub use script::ScriptMigration;
pub use status::{BackendSettings, ExecutionRecord, StatusBackend, StatusLedger, StatusStore};

pub use async_trait::async_trait;
