//! Dataset I/O: the reader / writer / driver boundary and its implementations

#[cfg(feature = "gdal")]
mod gdal_io;
mod memory;
mod native;

#[cfg(feature = "gdal")]
pub use gdal_io::{GdalDriver, GdalReader, GdalWriter};
pub use memory::{MemoryDataset, MemoryDriver, MemoryReader, MemoryWriter};
pub use native::{NativeDriver, NativeReader, NativeWriter};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::crs::CRS;
use crate::error::Result;
use crate::vector::{field_index, FieldSchema, GeometryType, Record};

/// Lazy record sequence returned by [`DatasetReader::records`]
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<Record>> + 'a>;

/// Read side of a dataset.
pub trait DatasetReader {
    /// Layer name, usually the file stem
    fn layer_name(&self) -> &str;

    /// Ordered attribute fields
    fn fields(&self) -> &[FieldSchema];

    fn geometry_type(&self) -> GeometryType;

    fn crs(&self) -> Option<&CRS>;

    /// Number of records as reported by the dataset
    fn record_count(&self) -> usize;

    /// Iterate every record from the first one. Each call restarts the scan.
    fn records(&mut self) -> Result<RecordIter<'_>>;

    /// Index of the field called `name`
    fn field_index(&self, name: &str) -> Option<usize> {
        field_index(self.fields(), name)
    }
}

/// Write side of a dataset. Nothing is durable until [`DatasetWriter::close`].
pub trait DatasetWriter {
    fn append(&mut self, record: Record) -> Result<()>;

    /// Flush and close; returns the number of records written.
    fn close(self) -> Result<usize>
    where
        Self: Sized;
}

/// Everything needed to create an output dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub fields: Vec<FieldSchema>,
    pub geometry_type: GeometryType,
    pub crs: Option<CRS>,
    /// Attribute encoding label, e.g. "UTF-8" or "CP1252"
    pub encoding: String,
}

/// Opens, creates and deletes datasets of one storage format.
pub trait VectorDriver: Send + Sync {
    type Reader: DatasetReader;
    type Writer: DatasetWriter;

    /// Short driver name for logs
    fn name(&self) -> &'static str;

    /// Extension of the main dataset file, without the dot
    fn file_extension(&self) -> &'static str;

    fn open(&self, path: &Path, encoding: &str) -> Result<Self::Reader>;

    fn create(&self, path: &Path, spec: &LayerSpec) -> Result<Self::Writer>;

    fn exists(&self, path: &Path) -> bool;

    /// Remove the dataset at `path` together with any companion files.
    fn delete(&self, path: &Path) -> Result<()>;
}

/// Layer name derived from a dataset path (file stem)
pub fn layer_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_layer_name_from_path() {
        assert_eq!(layer_name_from_path(&PathBuf::from("/data/roads.shp")), "roads");
        assert_eq!(layer_name_from_path(&PathBuf::from("rivers")), "rivers");
        assert_eq!(layer_name_from_path(&PathBuf::from("/")), "");
    }
}
