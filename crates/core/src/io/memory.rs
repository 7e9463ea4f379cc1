//! In-memory datasets (no filesystem dependency)
//!
//! A `MemoryDriver` is a cheap handle onto a shared store keyed by path, so a
//! clone handed to a background job writes into the same store the caller
//! inspects afterwards.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::{DatasetReader, DatasetWriter, LayerSpec, RecordIter, VectorDriver};
use crate::vector::{FieldSchema, GeometryType, Record};

/// A complete dataset held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDataset {
    pub spec: LayerSpec,
    pub records: Vec<Record>,
}

impl MemoryDataset {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<FieldSchema>,
        geometry_type: GeometryType,
    ) -> Self {
        Self {
            spec: LayerSpec {
                name: name.into(),
                fields,
                geometry_type,
                crs: None,
                encoding: "UTF-8".to_string(),
            },
            records: Vec::new(),
        }
    }

    pub fn with_crs(mut self, crs: CRS) -> Self {
        self.spec.crs = Some(crs);
        self
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }
}

#[derive(Debug, Default)]
struct MemoryStore {
    datasets: HashMap<PathBuf, MemoryDataset>,
    locked: HashSet<PathBuf>,
}

/// Driver over a shared in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    store: Arc<Mutex<MemoryStore>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace the dataset at `path`
    pub fn insert(&self, path: impl Into<PathBuf>, dataset: MemoryDataset) {
        self.store().datasets.insert(path.into(), dataset);
    }

    /// Snapshot of the dataset at `path`
    pub fn get(&self, path: impl AsRef<Path>) -> Option<MemoryDataset> {
        self.store().datasets.get(path.as_ref()).cloned()
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.store().datasets.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Make deletion of `path` fail, as for a file held open elsewhere.
    pub fn lock_path(&self, path: impl Into<PathBuf>) {
        self.store().locked.insert(path.into());
    }
}

impl VectorDriver for MemoryDriver {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn file_extension(&self) -> &'static str {
        "shp"
    }

    fn open(&self, path: &Path, _encoding: &str) -> Result<MemoryReader> {
        match self.get(path) {
            Some(dataset) => Ok(MemoryReader { dataset }),
            None => Err(Error::DatasetOpen {
                path: path.to_path_buf(),
                reason: "no such dataset".to_string(),
            }),
        }
    }

    fn create(&self, path: &Path, spec: &LayerSpec) -> Result<MemoryWriter> {
        let mut store = self.store();
        if store.datasets.contains_key(path) {
            return Err(Error::DatasetCreate {
                path: path.to_path_buf(),
                reason: "dataset already exists".to_string(),
            });
        }
        let empty = MemoryDataset {
            spec: spec.clone(),
            records: Vec::new(),
        };
        store.datasets.insert(path.to_path_buf(), empty);
        Ok(MemoryWriter {
            driver: self.clone(),
            path: path.to_path_buf(),
            field_count: spec.fields.len(),
            pending: Some(Vec::new()),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.store().datasets.contains_key(path)
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let mut store = self.store();
        if store.locked.contains(path) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is locked", path.display()),
            )));
        }
        store.datasets.remove(path);
        Ok(())
    }
}

/// Reader over a snapshot taken at open time
#[derive(Debug)]
pub struct MemoryReader {
    dataset: MemoryDataset,
}

impl DatasetReader for MemoryReader {
    fn layer_name(&self) -> &str {
        &self.dataset.spec.name
    }

    fn fields(&self) -> &[FieldSchema] {
        &self.dataset.spec.fields
    }

    fn geometry_type(&self) -> GeometryType {
        self.dataset.spec.geometry_type
    }

    fn crs(&self) -> Option<&CRS> {
        self.dataset.spec.crs.as_ref()
    }

    fn record_count(&self) -> usize {
        self.dataset.records.len()
    }

    fn records(&mut self) -> Result<RecordIter<'_>> {
        Ok(Box::new(self.dataset.records.iter().cloned().map(Ok)))
    }
}

/// Buffers appended records and commits them to the store on close (or drop).
#[derive(Debug)]
pub struct MemoryWriter {
    driver: MemoryDriver,
    path: PathBuf,
    field_count: usize,
    pending: Option<Vec<Record>>,
}

impl MemoryWriter {
    fn commit(&mut self) -> usize {
        let Some(records) = self.pending.take() else {
            return 0;
        };
        let written = records.len();
        if let Some(dataset) = self.driver.store().datasets.get_mut(&self.path) {
            dataset.records.extend(records);
        }
        written
    }
}

impl DatasetWriter for MemoryWriter {
    fn append(&mut self, record: Record) -> Result<()> {
        if record.attributes.len() != self.field_count {
            return Err(Error::AttributeCountMismatch {
                expected: self.field_count,
                actual: record.attributes.len(),
            });
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.push(record);
        }
        Ok(())
    }

    fn close(mut self) -> Result<usize> {
        Ok(self.commit())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.commit();
    }
}
