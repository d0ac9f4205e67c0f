//! Runs one migration unit and records the result.

use std::fmt;

use log::{debug, error, info};

use crate::client::{ApiError, ManagementClient, TransportDetail};
use crate::errors::{MigrationError, StatusError, ValidationIssue};
use crate::migration::{MigrationUnit, Operation};
use crate::status::{StatusLedger, StatusStore, mark_completed};

/// Lifecycle of a unit within one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rollback requested for a unit without rollback steps. Nothing was called.
    MissingRollback,
    /// The migration or the remote service reported an error.
    Remote,
    /// The migration succeeded but the ledger could not be saved.
    Ledger,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::MissingRollback => f.write_str("missing rollback"),
            FailureKind::Remote => f.write_str("remote"),
            FailureKind::Ledger => f.write_str("ledger"),
        }
    }
}

/// Everything known about a failed unit.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
    pub error_code: Option<i64>,
    pub validation_errors: Vec<ValidationIssue>,
    pub transport: Option<TransportDetail>,
}

impl FailureDetail {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            error_code: None,
            validation_errors: Vec::new(),
            transport: None,
        }
    }

    fn missing_rollback(name: &str) -> Self {
        Self::new(
            FailureKind::MissingRollback,
            format!("migration {name} does not implement rollback"),
        )
    }

    fn ledger(err: &StatusError) -> Self {
        Self::new(FailureKind::Ledger, format!("failed to save migration status: {err}"))
    }
}

impl From<ApiError> for FailureDetail {
    fn from(err: ApiError) -> Self {
        Self {
            kind: FailureKind::Remote,
            message: err.message,
            error_code: err.error_code,
            validation_errors: err.validation_errors,
            transport: err.transport,
        }
    }
}

impl From<MigrationError> for FailureDetail {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Api(api) => api.into(),
            MigrationError::Failed { message } => Self::new(FailureKind::Remote, message),
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(code) = self.error_code {
            write!(f, " (error code {code})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Succeeded,
    Failed(FailureDetail),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Succeeded)
    }

    pub fn state(&self) -> UnitState {
        match self {
            DispatchOutcome::Succeeded => UnitState::Succeeded,
            DispatchOutcome::Failed(_) => UnitState::Failed,
        }
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        match self {
            DispatchOutcome::Succeeded => None,
            DispatchOutcome::Failed(detail) => Some(detail),
        }
    }
}

/// Executes units against one environment.
pub struct Dispatcher<'a> {
    client: &'a dyn ManagementClient,
    store: &'a StatusStore,
    environment_id: &'a str,
    verbose: bool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(client: &'a dyn ManagementClient, store: &'a StatusStore, environment_id: &'a str) -> Self {
        Self {
            client,
            store,
            environment_id,
            verbose: false,
        }
    }

    /// Log request method, URL and body of failed calls.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn environment_id(&self) -> &str {
        self.environment_id
    }

    /// Invoke `operation` on `unit` and record it in the ledger when it succeeds.
    pub async fn dispatch(
        &self,
        unit: &MigrationUnit,
        operation: Operation,
        ledger: &mut StatusLedger,
    ) -> DispatchOutcome {
        debug!("{}: {:?}", unit.name, UnitState::Pending);

        if operation == Operation::Rollback && !unit.migration.has_rollback() {
            let detail = FailureDetail::missing_rollback(&unit.name);
            error!("{}", detail.message);
            return DispatchOutcome::Failed(detail);
        }

        debug!("{}: {:?}", unit.name, UnitState::Running);
        info!("{operation}: {}", unit.name);

        let result = match operation {
            Operation::Run => unit.migration.run(self.client).await,
            Operation::Rollback => unit.migration.rollback(self.client).await,
        };

        if let Err(err) = result {
            let detail = FailureDetail::from(err);
            self.report(unit, operation, &detail);
            return DispatchOutcome::Failed(detail);
        }

        if let Err(err) = mark_completed(
            ledger,
            self.store,
            self.environment_id,
            &unit.name,
            &unit.order,
            operation,
        )
        .await
        {
            let detail = FailureDetail::ledger(&err);
            error!("{}: {}", unit.name, detail.message);
            return DispatchOutcome::Failed(detail);
        }

        debug!("{}: {:?}", unit.name, UnitState::Succeeded);
        DispatchOutcome::Succeeded
    }

    fn report(&self, unit: &MigrationUnit, operation: Operation, detail: &FailureDetail) {
        error!("{operation} of {} failed: {detail}", unit.name);

        for issue in &detail.validation_errors {
            error!("  {issue}");
        }

        if let Some(transport) = &detail.transport {
            if self.verbose {
                error!("  request: {} {}", transport.method, transport.url);
                if let Some(body) = &transport.body {
                    error!("  request body: {body}");
                }
                if let Some(status) = transport.status {
                    error!("  response status: {status}");
                }
            }
            error!("  transport: {}", transport.message);
        }
    }
}
