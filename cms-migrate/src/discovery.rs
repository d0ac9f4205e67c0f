//! Discovery and selection of migration units.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::EngineError;
use crate::migration::{MigrationUnit, Operation};
use crate::order::{OrderKey, is_valid_order_key};
use crate::range::MigrationRange;
use crate::script::ScriptDocument;

/// Extension of migration files in the migrations directory.
pub const MIGRATION_EXTENSION: &str = "toml";

/// Default migrations directory, relative to the working directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "Migrations";

/// Where migration units come from.
pub trait MigrationSource: Send + Sync {
    /// Every unit, failing if any of them cannot serve `operation`.
    fn discover_all(&self, operation: Operation) -> Result<Vec<MigrationUnit>, EngineError>;

    /// A single unit by name. A missing rollback is left for the dispatcher to report.
    fn select_by_name(&self, name: &str) -> Result<MigrationUnit, EngineError>;
}

/// Migration files in a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a migration name to a file path, appending the extension when missing.
    pub fn resolve_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        let file_name = normalize_file_name(name)?;
        let path = self.dir.join(&file_name);
        if !path.is_file() {
            return Err(EngineError::MigrationNotFound { path });
        }
        Ok(path)
    }

    /// Migration file paths in file-name order.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        if !self.dir.is_dir() {
            return Err(EngineError::MigrationsDirectory {
                path: self.dir.clone(),
                message: "directory does not exist".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|err| EngineError::MigrationsDirectory {
                path: self.dir.clone(),
                message: err.to_string(),
            })?;

            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().is_some_and(|ext| ext == MIGRATION_EXTENSION)
            {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    fn load_unit(path: &Path) -> Result<MigrationUnit, EngineError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let source = std::fs::read_to_string(path).map_err(|err| EngineError::MigrationLoad {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        let document = ScriptDocument::parse(&source).map_err(|err| EngineError::MigrationLoad {
            path: path.to_path_buf(),
            message: err.message().to_string(),
        })?;

        let order = document.order.ok_or_else(|| EngineError::MigrationLoad {
            path: path.to_path_buf(),
            message: "missing `order`".to_string(),
        })?;

        if !document.script.has_run() {
            return Err(EngineError::MissingEntryPoint {
                name,
                entry: Operation::Run,
            });
        }

        Ok(MigrationUnit::new(name, order, document.script))
    }
}

impl MigrationSource for DirectorySource {
    fn discover_all(&self, operation: Operation) -> Result<Vec<MigrationUnit>, EngineError> {
        self.list_files()?
            .iter()
            .map(|path| {
                let unit = Self::load_unit(path)?;
                ensure_supports(&unit, operation)?;
                Ok(unit)
            })
            .collect()
    }

    fn select_by_name(&self, name: &str) -> Result<MigrationUnit, EngineError> {
        let path = self.resolve_path(name)?;
        Self::load_unit(&path)
    }
}

/// An in-memory list of units, for migrations written in Rust.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    units: Vec<MigrationUnit>,
}

impl StaticSource {
    pub fn new(units: Vec<MigrationUnit>) -> Self {
        Self { units }
    }

    pub fn push(&mut self, unit: MigrationUnit) {
        self.units.push(unit);
    }
}

impl MigrationSource for StaticSource {
    fn discover_all(&self, operation: Operation) -> Result<Vec<MigrationUnit>, EngineError> {
        for unit in &self.units {
            ensure_supports(unit, operation)?;
        }
        Ok(self.units.clone())
    }

    fn select_by_name(&self, name: &str) -> Result<MigrationUnit, EngineError> {
        self.units
            .iter()
            .find(|unit| unit.name == name)
            .cloned()
            .ok_or_else(|| EngineError::MigrationNotFound {
                path: PathBuf::from(name),
            })
    }
}

fn ensure_supports(unit: &MigrationUnit, operation: Operation) -> Result<(), EngineError> {
    if unit.migration.supports(operation) {
        Ok(())
    } else {
        Err(EngineError::MissingEntryPoint {
            name: unit.name.clone(),
            entry: operation,
        })
    }
}

/// `"foo"` becomes `"foo.toml"`; any other extension is rejected.
pub fn normalize_file_name(name: &str) -> Result<String, EngineError> {
    match Path::new(name).extension() {
        None => Ok(format!("{name}.{MIGRATION_EXTENSION}")),
        Some(ext) if ext == MIGRATION_EXTENSION => Ok(name.to_string()),
        Some(_) => Err(EngineError::UnsupportedExtension {
            name: name.to_string(),
            expected: MIGRATION_EXTENSION,
        }),
    }
}

/// Keep the units whose key falls inside `range` and is of the range's kind.
pub fn select_by_range(units: Vec<MigrationUnit>, range: &MigrationRange) -> Vec<MigrationUnit> {
    units
        .into_iter()
        .filter(|unit| unit.order_key().is_some_and(|key| range.selects(&key)))
        .collect()
}

/// Every unit that shares its order key with another unit, in input order.
pub fn detect_duplicate_order_keys(units: &[MigrationUnit]) -> Vec<&MigrationUnit> {
    let mut counts: HashMap<OrderKey, usize> = HashMap::new();
    for key in units.iter().filter_map(MigrationUnit::order_key) {
        *counts.entry(key).or_default() += 1;
    }

    units
        .iter()
        .filter(|unit| {
            unit.order_key()
                .is_some_and(|key| counts.get(&key).copied().unwrap_or(0) > 1)
        })
        .collect()
}

/// Units whose declared order is neither a non-negative integer nor a timestamp.
pub fn detect_invalid_order_keys(units: &[MigrationUnit]) -> Vec<&MigrationUnit> {
    units.iter().filter(|unit| !is_valid_order_key(&unit.order)).collect()
}

/// Fail with `DuplicateOrder` or `InvalidOrder` when the batch cannot be ordered.
pub fn validate_batch(units: &[MigrationUnit]) -> Result<(), EngineError> {
    let duplicates = detect_duplicate_order_keys(units);
    if !duplicates.is_empty() {
        return Err(EngineError::DuplicateOrder {
            offenders: offenders(&duplicates),
        });
    }

    let invalid = detect_invalid_order_keys(units);
    if !invalid.is_empty() {
        return Err(EngineError::InvalidOrder {
            offenders: offenders(&invalid),
        });
    }

    Ok(())
}

fn offenders(units: &[&MigrationUnit]) -> Vec<(String, String)> {
    units
        .iter()
        .map(|unit| (unit.name.clone(), unit.order.to_string()))
        .collect()
}
