pub(crate) use chrono::{DateTime, TimeZone, Utc};
pub(crate) use cms_migrate::{
    ApiError, ApiRequest, EngineError, FailureKind, ManagementClient, Migration, MigrationError, MigrationRange,
    MigrationUnit, Operation, Orchestrator, RunOptions, Selection, StaticSource, StatusBackend, StatusError,
    StatusLedger, StatusStore, async_trait,
};
pub(crate) use serde_json::Value;
pub(crate) use std::sync::{Arc, Mutex};
pub(crate) use tempfile::TempDir;

pub(crate) const ENV: &str = "00000000-0000-0000-0000-000000000001";

/// Shared, ordered log of invocations.
pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Client that records every request as `"METHOD path"` and answers `null`.
#[derive(Default, Clone)]
pub(crate) struct RecordingClient {
    pub(crate) log: CallLog,
}

#[async_trait]
impl ManagementClient for RecordingClient {
    async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        self.log.lock().unwrap().push(format!("{} {}", request.method, request.path));
        Ok(Value::Null)
    }
}

/// Migration that logs `"run:<label>"` / `"rollback:<label>"` when invoked.
pub(crate) struct RecordingMigration {
    label: String,
    log: CallLog,
    fail: bool,
    rollback: bool,
}

impl RecordingMigration {
    pub(crate) fn new(label: &str, log: &CallLog) -> Self {
        Self {
            label: label.to_string(),
            log: log.clone(),
            fail: false,
            rollback: true,
        }
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn without_rollback(mut self) -> Self {
        self.rollback = false;
        self
    }

    fn invoke(&self, operation: Operation) -> Result<(), MigrationError> {
        self.log.lock().unwrap().push(format!("{operation}:{}", self.label));
        if self.fail {
            return Err(ApiError::new(format!("{} was rejected", self.label)).with_code(5).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for RecordingMigration {
    async fn run(&self, _client: &dyn ManagementClient) -> Result<(), MigrationError> {
        self.invoke(Operation::Run)
    }

    fn has_rollback(&self) -> bool {
        self.rollback
    }

    async fn rollback(&self, _client: &dyn ManagementClient) -> Result<(), MigrationError> {
        self.invoke(Operation::Rollback)
    }
}

pub(crate) fn numbered(log: &CallLog, orders: &[u32]) -> Vec<MigrationUnit> {
    orders
        .iter()
        .map(|order| {
            let label = order.to_string();
            MigrationUnit::new(format!("{label:0>2}.toml"), *order, RecordingMigration::new(&label, log))
        })
        .collect()
}

pub(crate) fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

/// In-memory backend holding the last persisted document.
#[derive(Default, Clone)]
pub(crate) struct MemoryBackend {
    pub(crate) document: Arc<Mutex<Option<String>>>,
}

impl MemoryBackend {
    pub(crate) fn ledger(&self) -> StatusLedger {
        match self.document.lock().unwrap().as_deref() {
            Some(text) => StatusLedger::from_json(text).unwrap(),
            None => StatusLedger::new(),
        }
    }
}

#[async_trait]
impl StatusBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn persist(&self, document: &str) -> Result<(), StatusError> {
        *self.document.lock().unwrap() = Some(document.to_string());
        Ok(())
    }

    async fn load(&self) -> Result<StatusLedger, StatusError> {
        Ok(self.ledger())
    }
}

/// Backend that can neither load nor persist.
pub(crate) struct FailingBackend;

#[async_trait]
impl StatusBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn persist(&self, _document: &str) -> Result<(), StatusError> {
        Err(StatusError::Backend {
            backend: "failing".to_string(),
            message: "unavailable".to_string(),
        })
    }

    async fn load(&self) -> Result<StatusLedger, StatusError> {
        Err(StatusError::Backend {
            backend: "failing".to_string(),
            message: "unavailable".to_string(),
        })
    }
}
