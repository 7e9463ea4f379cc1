//! # VecBatch Core
//!
//! Core types, traits and drivers for batch processing of vector datasets.
//!
//! This crate provides:
//! - `FieldSchema` / `FieldType`: attribute field descriptions
//! - `Record`: one feature (ordered attributes + optional geometry)
//! - `CRS`: Coordinate Reference System handling
//! - `VectorDriver`, `DatasetReader`, `DatasetWriter`: the dataset I/O boundary
//! - Drivers: in-memory, native JSON-lines, and GDAL/OGR (feature `gdal`)

pub mod crs;
pub mod error;
pub mod io;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use io::{DatasetReader, DatasetWriter, LayerSpec, VectorDriver};
pub use vector::{AttributeValue, FieldSchema, FieldType, GeometryType, RawKey, Record};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::io::{DatasetReader, DatasetWriter, LayerSpec, VectorDriver};
    pub use crate::vector::{AttributeValue, FieldSchema, FieldType, GeometryType, Record};
}
