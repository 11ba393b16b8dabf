//! Loaded-workbook cache
//!
//! Callers own a [`SheetCache`] and pass it where parsed workbooks are needed;
//! nothing here is process-global. Loading goes through [`WorkbookSource`],
//! so tests and embedders can supply workbooks without touching the disk.

use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{RollupError, RollupResult};
use crate::excel::{ImportOptions, WorkbookImporter};
use crate::types::Workbook;

/// Something that can turn a path into a parsed workbook
pub trait WorkbookSource: Send + Sync {
    fn load(&self, path: &Path) -> RollupResult<Workbook>;
}

/// Reads .xlsx / .xlsm files from disk
#[derive(Debug, Clone, Default)]
pub struct ExcelSource {
    options: ImportOptions,
}

impl ExcelSource {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }
}

impl WorkbookSource for ExcelSource {
    fn load(&self, path: &Path) -> RollupResult<Workbook> {
        WorkbookImporter::new(path)
            .with_options(self.options.clone())
            .import()
    }
}

/// Outcome of [`SheetCache::init`]
#[derive(Debug, Default)]
pub struct InitReport {
    pub loaded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, RollupError)>,
}

impl InitReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Parsed workbooks keyed by path
pub struct SheetCache<S: WorkbookSource = ExcelSource> {
    source: S,
    entries: HashMap<PathBuf, Arc<Workbook>>,
}

impl Default for SheetCache<ExcelSource> {
    fn default() -> Self {
        Self::new(ExcelSource::default())
    }
}

impl<S: WorkbookSource> SheetCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: HashMap::new(),
        }
    }

    /// Load every path in parallel, replacing any cached copy.
    ///
    /// Each file is all-or-nothing: a file that fails to load leaves no entry,
    /// not even a stale one.
    pub fn init<P: AsRef<Path> + Sync>(&mut self, paths: &[P]) -> InitReport {
        let source = &self.source;
        let results: Vec<(PathBuf, RollupResult<Workbook>)> = paths
            .par_iter()
            .map(|p| {
                let path = p.as_ref().to_path_buf();
                let result = source.load(&path);
                (path, result)
            })
            .collect();

        let mut report = InitReport::default();
        for (path, result) in results {
            match result {
                Ok(workbook) => {
                    debug!(path = %path.display(), sheets = workbook.sheets.len(), "cached workbook");
                    self.entries.insert(path.clone(), Arc::new(workbook));
                    report.loaded.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load workbook");
                    self.entries.remove(&path);
                    report.failed.push((path, e));
                }
            }
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "cache initialized"
        );
        report
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<Workbook>> {
        self.entries.get(path.as_ref()).cloned()
    }

    /// Cached workbook, loading it first on a miss
    pub fn get_or_load(&mut self, path: impl AsRef<Path>) -> RollupResult<Arc<Workbook>> {
        let path = path.as_ref();
        if let Some(workbook) = self.entries.get(path) {
            return Ok(Arc::clone(workbook));
        }
        let workbook = Arc::new(self.source.load(path)?);
        self.entries.insert(path.to_path_buf(), Arc::clone(&workbook));
        Ok(workbook)
    }

    /// Drop one entry; true if it was cached
    pub fn invalidate(&mut self, path: impl AsRef<Path>) -> bool {
        self.entries.remove(path.as_ref()).is_some()
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries.contains_key(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
