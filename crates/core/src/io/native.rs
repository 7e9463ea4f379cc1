//! Native JSON-lines datasets (without GDAL dependency)
//!
//! Layout: the first line is a header carrying the [`LayerSpec`]; every
//! following non-empty line is one serialized [`Record`]. Files are always
//! UTF-8; the encoding label is stored in the header but not applied.
//! For shapefiles and other OGR formats, enable the `gdal` feature.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::{DatasetReader, DatasetWriter, LayerSpec, RecordIter, VectorDriver};
use crate::vector::{FieldSchema, GeometryType, Record};

const FORMAT: &str = "vecbatch-jsonl";
const VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    format: String,
    version: u32,
    layer: LayerSpec,
}

/// Driver for `.jsonl` datasets
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDriver;

impl NativeDriver {
    pub fn new() -> Self {
        Self
    }
}

impl VectorDriver for NativeDriver {
    type Reader = NativeReader;
    type Writer = NativeWriter;

    fn name(&self) -> &'static str {
        "native"
    }

    fn file_extension(&self) -> &'static str {
        "jsonl"
    }

    fn open(&self, path: &Path, encoding: &str) -> Result<NativeReader> {
        NativeReader::open(path, encoding)
    }

    fn create(&self, path: &Path, spec: &LayerSpec) -> Result<NativeWriter> {
        NativeWriter::create(path, spec)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reader for a native dataset
#[derive(Debug)]
pub struct NativeReader {
    path: PathBuf,
    layer: LayerSpec,
    count: usize,
}

impl NativeReader {
    fn open(path: &Path, encoding: &str) -> Result<Self> {
        let open_err = |reason: String| Error::DatasetOpen {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| open_err(e.to_string()))?;
        let mut lines = BufReader::new(file).lines();

        let first = lines
            .next()
            .ok_or_else(|| open_err("empty file".to_string()))?
            .map_err(|e| open_err(e.to_string()))?;
        let header: Header =
            serde_json::from_str(&first).map_err(|e| open_err(format!("bad header: {}", e)))?;
        if header.format != FORMAT || header.version != VERSION {
            return Err(open_err(format!(
                "unsupported format {} v{}",
                header.format, header.version
            )));
        }
        if !encoding.eq_ignore_ascii_case("utf-8") && !encoding.eq_ignore_ascii_case("utf8") {
            debug!(path = %path.display(), encoding, "native datasets are UTF-8; encoding ignored");
        }

        let mut count = 0;
        for line in lines {
            let line = line?;
            if !line.trim().is_empty() {
                count += 1;
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            layer: header.layer,
            count,
        })
    }
}

impl DatasetReader for NativeReader {
    fn layer_name(&self) -> &str {
        &self.layer.name
    }

    fn fields(&self) -> &[FieldSchema] {
        &self.layer.fields
    }

    fn geometry_type(&self) -> GeometryType {
        self.layer.geometry_type
    }

    fn crs(&self) -> Option<&CRS> {
        self.layer.crs.as_ref()
    }

    fn record_count(&self) -> usize {
        self.count
    }

    fn records(&mut self) -> Result<RecordIter<'_>> {
        let file = File::open(&self.path)?;
        let path = self.path.clone();
        let field_count = self.layer.fields.len();
        let iter = BufReader::new(file)
            .lines()
            .enumerate()
            .skip(1)
            .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(move |(idx, line)| -> Result<Record> {
                let line = line?;
                let record =
                    serde_json::from_str::<Record>(&line).map_err(|e| Error::MalformedRecord {
                        path: path.clone(),
                        line: idx + 1,
                        reason: e.to_string(),
                    })?;
                if record.attributes.len() != field_count {
                    return Err(Error::AttributeCountMismatch {
                        expected: field_count,
                        actual: record.attributes.len(),
                    });
                }
                Ok(record)
            });
        Ok(Box::new(iter))
    }
}

/// Writer for a native dataset. Records are buffered; `close` flushes.
#[derive(Debug)]
pub struct NativeWriter {
    out: BufWriter<File>,
    field_count: usize,
    written: usize,
}

impl NativeWriter {
    fn create(path: &Path, spec: &LayerSpec) -> Result<Self> {
        let create_err = |reason: String| Error::DatasetCreate {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::create(path).map_err(|e| create_err(e.to_string()))?;
        let mut out = BufWriter::new(file);
        let header = Header {
            format: FORMAT.to_string(),
            version: VERSION,
            layer: spec.clone(),
        };
        serde_json::to_writer(&mut out, &header)?;
        out.write_all(b"\n")?;

        Ok(Self {
            out,
            field_count: spec.fields.len(),
            written: 0,
        })
    }
}

impl DatasetWriter for NativeWriter {
    fn append(&mut self, record: Record) -> Result<()> {
        if record.attributes.len() != self.field_count {
            return Err(Error::AttributeCountMismatch {
                expected: self.field_count,
                actual: record.attributes.len(),
            });
        }
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn close(mut self) -> Result<usize> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(self.written)
    }
}
