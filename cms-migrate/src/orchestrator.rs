//! Batch execution: discovery, selection, skip, sort and sequential dispatch.

use std::cmp::Ordering;

use log::{debug, info, warn};

use crate::client::ManagementClient;
use crate::discovery::{MigrationSource, select_by_range, validate_batch};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::errors::EngineError;
use crate::migration::{MigrationUnit, Operation};
use crate::order::{DeclaredOrder, compare};
use crate::range::MigrationRange;
use crate::status::{StatusLedger, StatusStore, load_ledger};

/// Which units a batch covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Name(String),
    All,
    Range(MigrationRange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub selection: Selection,
    pub operation: Operation,
    /// Execute units the ledger already shows as completed.
    pub force: bool,
    /// Keep going after a failed unit.
    pub continue_on_error: bool,
}

impl RunOptions {
    pub fn new(selection: Selection, operation: Operation) -> Self {
        Self {
            selection,
            operation,
            force: false,
            continue_on_error: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Init,
    LoadingStatus,
    Selecting,
    Executing(usize),
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitReport {
    pub name: String,
    pub order: DeclaredOrder,
    pub outcome: DispatchOutcome,
}

/// Result of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub operation: Operation,
    /// Units left to execute after selection and skipping.
    pub planned: usize,
    /// Units dispatched, in execution order.
    pub executed: Vec<UnitReport>,
    /// Units skipped because the ledger shows them completed.
    pub skipped: Vec<String>,
    /// True when a failure stopped the batch before every planned unit ran.
    pub stopped_early: bool,
}

impl RunReport {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            planned: 0,
            executed: Vec::new(),
            skipped: Vec::new(),
            stopped_early: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.executed.iter().all(|unit| unit.outcome.is_success())
    }

    pub fn succeeded_count(&self) -> usize {
        self.executed.iter().filter(|unit| unit.outcome.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.executed.iter().filter(|unit| !unit.outcome.is_success())
    }

    /// Process exit status: 0 when every executed unit succeeded, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() { 0 } else { 1 }
    }

    /// `"k of n executed"`.
    pub fn summary(&self) -> String {
        format!("{} of {} executed", self.succeeded_count(), self.planned)
    }
}

type SkipHook = Box<dyn Fn(&MigrationUnit) + Send + Sync>;
type BeforeHook = Box<dyn Fn(&MigrationUnit, usize, usize) + Send + Sync>;
type AfterHook = Box<dyn Fn(&UnitReport) + Send + Sync>;

/// Progress callbacks.
#[derive(Default)]
pub struct RunHooks {
    /// Called for each unit skipped as already completed.
    pub on_skip: Option<SkipHook>,
    /// Called before each unit with its 1-based position and the batch size.
    pub before_unit: Option<BeforeHook>,
    /// Called after each unit.
    pub after_unit: Option<AfterHook>,
}

pub struct Orchestrator<'a> {
    source: &'a dyn MigrationSource,
    client: &'a dyn ManagementClient,
    store: &'a StatusStore,
    environment_id: String,
    hooks: RunHooks,
    verbose: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn MigrationSource,
        client: &'a dyn ManagementClient,
        store: &'a StatusStore,
        environment_id: impl Into<String>,
    ) -> Self {
        Self {
            source,
            client,
            store,
            environment_id: environment_id.into(),
            hooks: RunHooks::default(),
            verbose: false,
        }
    }

    pub fn with_hooks(mut self, hooks: RunHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Execute a batch.
    ///
    /// Configuration problems (unknown migration, unloadable files, duplicate or
    /// invalid order keys) are returned as errors before anything executes. Unit
    /// failures are reported in the returned `RunReport`.
    pub async fn run(&self, options: &RunOptions) -> Result<RunReport, EngineError> {
        let mut state = BatchState::Init;
        self.transition(&mut state, BatchState::LoadingStatus);
        let mut ledger = load_ledger(self.store).await;

        self.transition(&mut state, BatchState::Selecting);
        let mut report = RunReport::new(options.operation);
        let units = match &options.selection {
            Selection::Name(name) => vec![self.source.select_by_name(name)?],
            Selection::All => self.select_batch(None, options, &ledger, &mut report.skipped)?,
            Selection::Range(range) => self.select_batch(Some(range), options, &ledger, &mut report.skipped)?,
        };
        report.planned = units.len();

        if units.is_empty() {
            info!("no migrations to {}", options.operation);
        }

        let dispatcher = Dispatcher::new(self.client, self.store, &self.environment_id).verbose(self.verbose);
        let total = units.len();

        for (index, unit) in units.iter().enumerate() {
            self.transition(&mut state, BatchState::Executing(index));

            if let Some(hook) = &self.hooks.before_unit {
                hook(unit, index + 1, total);
            }

            let outcome = dispatcher.dispatch(unit, options.operation, &mut ledger).await;
            let failed = !outcome.is_success();
            let unit_report = UnitReport {
                name: unit.name.clone(),
                order: unit.order.clone(),
                outcome,
            };

            if let Some(hook) = &self.hooks.after_unit {
                hook(&unit_report);
            }
            report.executed.push(unit_report);

            if failed && !options.continue_on_error {
                if index + 1 < total {
                    report.stopped_early = true;
                }
                warn!(
                    "execution of the \"{}\" migration was not successful, stopping ({})",
                    unit.name,
                    report.summary()
                );
                break;
            }
        }

        self.transition(&mut state, BatchState::Done);
        Ok(report)
    }

    fn select_batch(
        &self,
        range: Option<&MigrationRange>,
        options: &RunOptions,
        ledger: &StatusLedger,
        skipped: &mut Vec<String>,
    ) -> Result<Vec<MigrationUnit>, EngineError> {
        let mut units = self.source.discover_all(options.operation)?;
        validate_batch(&units)?;

        if let Some(range) = range {
            units = select_by_range(units, range);
            debug!("{} migration(s) in range {range}", units.len());
        }

        if options.force {
            info!("skipping the check for already executed migrations");
        } else {
            units.retain(|unit| {
                let skip = ledger.should_skip(&self.environment_id, &unit.name, options.operation);
                if skip {
                    info!("skipping already executed migration {}", unit.name);
                    if let Some(hook) = &self.hooks.on_skip {
                        hook(unit);
                    }
                    skipped.push(unit.name.clone());
                }
                !skip
            });
        }

        sort_units(&mut units, options.operation);
        Ok(units)
    }

    fn transition(&self, state: &mut BatchState, next: BatchState) {
        debug!("batch state {state:?} -> {next:?}");
        *state = next;
    }
}

/// Ascending order for `run`, descending for `rollback`. Stable for equal keys.
pub fn sort_units(units: &mut [MigrationUnit], operation: Operation) {
    units.sort_by(|a, b| {
        let ordering = match (a.order_key(), b.order_key()) {
            (Some(a), Some(b)) => compare(&a, &b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match operation {
            Operation::Run => ordering,
            Operation::Rollback => ordering.reverse(),
        }
    });
}
