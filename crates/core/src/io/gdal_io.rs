//! ESRI Shapefile datasets through GDAL/OGR

use gdal::spatial_ref::SpatialRef;
use gdal::vector::{
    Feature, FieldDefn, FieldValue, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType,
    OwnedLayer, ToGdal,
};
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::{DatasetReader, DatasetWriter, LayerSpec, RecordIter, VectorDriver};
use crate::vector::{AttributeValue, FieldSchema, FieldType, GeometryType, Record};

/// Files that travel with a `.shp`
const SIDECARS: &[&str] = &["shp", "shx", "dbf", "prj", "cpg", "qpj", "sbn", "sbx"];

/// Driver for ESRI Shapefiles
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalDriver;

impl GdalDriver {
    pub fn new() -> Self {
        Self
    }
}

impl VectorDriver for GdalDriver {
    type Reader = GdalReader;
    type Writer = GdalWriter;

    fn name(&self) -> &'static str {
        "ESRI Shapefile"
    }

    fn file_extension(&self) -> &'static str {
        "shp"
    }

    fn open(&self, path: &Path, encoding: &str) -> Result<GdalReader> {
        GdalReader::open(path, encoding)
    }

    fn create(&self, path: &Path, spec: &LayerSpec) -> Result<GdalWriter> {
        GdalWriter::create(path, spec)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let is_shp = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("shp"))
            .unwrap_or(false);
        if !is_shp {
            return remove_if_present(path);
        }
        for ext in SIDECARS {
            remove_if_present(&path.with_extension(ext))?;
            remove_if_present(&path.with_extension(ext.to_ascii_uppercase()))?;
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Reader over the first layer of an OGR dataset
pub struct GdalReader {
    layer: OwnedLayer,
    name: String,
    fields: Vec<FieldSchema>,
    geometry_type: GeometryType,
    crs: Option<CRS>,
    count: usize,
}

impl GdalReader {
    fn open(path: &Path, encoding: &str) -> Result<Self> {
        let encoding_opt = format!("ENCODING={}", encoding);
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_VECTOR | GdalOpenFlags::GDAL_OF_READONLY,
            open_options: Some(&[encoding_opt.as_str()]),
            ..Default::default()
        };
        let dataset = Dataset::open_ex(path, options).map_err(|e| Error::DatasetOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let layer = dataset.into_layer(0).map_err(|e| Error::DatasetOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let fields = layer
            .defn()
            .fields()
            .map(|f| FieldSchema {
                name: f.name(),
                field_type: field_type_from_ogr(f.field_type()),
                length: f.width().max(0) as usize,
                precision: f.precision().max(0) as usize,
            })
            .collect();
        let geometry_type = layer
            .defn()
            .geom_fields()
            .next()
            .map(|g| geometry_type_from_ogr(g.field_type()))
            .unwrap_or(GeometryType::None);
        let crs = layer.spatial_ref().and_then(|srs| crs_from_spatial_ref(&srs));

        Ok(Self {
            name: layer.name(),
            count: layer.feature_count() as usize,
            layer,
            fields,
            geometry_type,
            crs,
        })
    }
}

impl DatasetReader for GdalReader {
    fn layer_name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    fn record_count(&self) -> usize {
        self.count
    }

    fn records(&mut self) -> Result<RecordIter<'_>> {
        let field_count = self.fields.len();
        self.layer.reset_feature_reading();
        let iter = self
            .layer
            .features()
            .map(move |feature| record_from_feature(&feature, field_count));
        Ok(Box::new(iter))
    }
}

fn record_from_feature(feature: &Feature<'_>, field_count: usize) -> Result<Record> {
    let mut attributes = Vec::with_capacity(field_count);
    for idx in 0..field_count {
        let value = match feature.field(idx)? {
            None => AttributeValue::Null,
            Some(FieldValue::IntegerValue(v)) => AttributeValue::Int(v as i64),
            Some(FieldValue::Integer64Value(v)) => AttributeValue::Int(v),
            Some(FieldValue::RealValue(v)) => AttributeValue::Float(v),
            Some(FieldValue::StringValue(s)) => AttributeValue::String(s),
            Some(FieldValue::DateValue(d)) => AttributeValue::Date(d.to_string()),
            Some(FieldValue::DateTimeValue(d)) => AttributeValue::Date(d.to_rfc3339()),
            Some(other) => AttributeValue::String(format!("{:?}", other)),
        };
        attributes.push(value);
    }
    let geometry = match feature.geometry() {
        Some(g) => Some(g.to_geo()?),
        None => None,
    };
    Ok(Record {
        attributes,
        geometry,
    })
}

/// Shapefile writer; the dataset is flushed when closed
pub struct GdalWriter {
    path: PathBuf,
    layer: OwnedLayer,
    field_types: Vec<FieldType>,
    written: usize,
}

impl GdalWriter {
    fn create(path: &Path, spec: &LayerSpec) -> Result<Self> {
        let create_err = |e: gdal::errors::GdalError| Error::DatasetCreate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let driver = DriverManager::get_driver_by_name("ESRI Shapefile")?;
        let mut dataset = driver.create_vector_only(path).map_err(create_err)?;
        let srs = spec.crs.as_ref().map(spatial_ref_from_crs).transpose()?;
        let encoding_opt = format!("ENCODING={}", spec.encoding);

        {
            let layer = dataset
                .create_layer(LayerOptions {
                    name: &spec.name,
                    srs: srs.as_ref(),
                    ty: geometry_type_to_ogr(spec.geometry_type),
                    options: Some(&[encoding_opt.as_str()]),
                })
                .map_err(create_err)?;
            for field in &spec.fields {
                let defn = FieldDefn::new(&field.name, field_type_to_ogr(field.field_type))?;
                defn.set_width(field.length as i32);
                defn.set_precision(field.precision as i32);
                defn.add_to_layer(&layer)?;
            }
        }

        let layer = dataset.into_layer(0)?;
        Ok(Self {
            path: path.to_path_buf(),
            layer,
            field_types: spec.fields.iter().map(|f| f.field_type).collect(),
            written: 0,
        })
    }
}

impl DatasetWriter for GdalWriter {
    fn append(&mut self, record: Record) -> Result<()> {
        if record.attributes.len() != self.field_types.len() {
            return Err(Error::AttributeCountMismatch {
                expected: self.field_types.len(),
                actual: record.attributes.len(),
            });
        }

        let mut feature = Feature::new(self.layer.defn())?;
        if let Some(geometry) = &record.geometry {
            feature.set_geometry(geometry.to_gdal()?)?;
        }
        for (idx, (value, ty)) in record.attributes.iter().zip(&self.field_types).enumerate() {
            match value {
                AttributeValue::Null => feature.set_field_null(idx)?,
                // Empty text in a non-text column is stored as null.
                AttributeValue::String(s) if s.is_empty() && *ty != FieldType::String => {
                    feature.set_field_null(idx)?
                }
                AttributeValue::Bool(b) => feature.set_field_integer(idx, *b as i32)?,
                AttributeValue::Int(v) => feature.set_field_integer64(idx, *v)?,
                AttributeValue::Float(v) => feature.set_field_double(idx, *v)?,
                AttributeValue::String(s) | AttributeValue::Date(s) => {
                    feature.set_field_string(idx, s)?
                }
            }
        }
        feature.create(&self.layer)?;
        self.written += 1;
        Ok(())
    }

    fn close(self) -> Result<usize> {
        let mut dataset = self.layer.into_dataset();
        dataset.flush_cache()?;
        debug!(path = %self.path.display(), records = self.written, "shapefile closed");
        Ok(self.written)
    }
}

fn field_type_from_ogr(ty: u32) -> FieldType {
    match ty {
        OGRFieldType::OFTInteger => FieldType::Integer,
        OGRFieldType::OFTInteger64 => FieldType::Integer64,
        OGRFieldType::OFTReal => FieldType::Real,
        OGRFieldType::OFTDate => FieldType::Date,
        OGRFieldType::OFTDateTime => FieldType::DateTime,
        _ => FieldType::String,
    }
}

fn field_type_to_ogr(ty: FieldType) -> u32 {
    match ty {
        FieldType::Integer | FieldType::Boolean => OGRFieldType::OFTInteger,
        FieldType::Integer64 => OGRFieldType::OFTInteger64,
        FieldType::Real => OGRFieldType::OFTReal,
        FieldType::String => OGRFieldType::OFTString,
        FieldType::Date => OGRFieldType::OFTDate,
        FieldType::DateTime => OGRFieldType::OFTDateTime,
    }
}

fn geometry_type_from_ogr(ty: u32) -> GeometryType {
    // Strip the 2.5D bit and ISO Z/M/ZM offsets down to the 2D base type.
    let mut base = ty & 0x7fff_ffff;
    if base >= 1000 {
        base %= 1000;
    }
    match base {
        OGRwkbGeometryType::wkbNone => GeometryType::None,
        OGRwkbGeometryType::wkbPoint => GeometryType::Point,
        OGRwkbGeometryType::wkbLineString => GeometryType::LineString,
        OGRwkbGeometryType::wkbPolygon => GeometryType::Polygon,
        OGRwkbGeometryType::wkbMultiPoint => GeometryType::MultiPoint,
        OGRwkbGeometryType::wkbMultiLineString => GeometryType::MultiLineString,
        OGRwkbGeometryType::wkbMultiPolygon => GeometryType::MultiPolygon,
        OGRwkbGeometryType::wkbGeometryCollection => GeometryType::GeometryCollection,
        _ => GeometryType::Unknown,
    }
}

fn geometry_type_to_ogr(ty: GeometryType) -> u32 {
    match ty {
        GeometryType::None => OGRwkbGeometryType::wkbNone,
        GeometryType::Unknown => OGRwkbGeometryType::wkbUnknown,
        GeometryType::Point => OGRwkbGeometryType::wkbPoint,
        GeometryType::LineString => OGRwkbGeometryType::wkbLineString,
        GeometryType::Polygon => OGRwkbGeometryType::wkbPolygon,
        GeometryType::MultiPoint => OGRwkbGeometryType::wkbMultiPoint,
        GeometryType::MultiLineString => OGRwkbGeometryType::wkbMultiLineString,
        GeometryType::MultiPolygon => OGRwkbGeometryType::wkbMultiPolygon,
        GeometryType::GeometryCollection => OGRwkbGeometryType::wkbGeometryCollection,
    }
}

fn crs_from_spatial_ref(srs: &SpatialRef) -> Option<CRS> {
    let wkt = srs.to_wkt().ok()?;
    let crs = CRS::from_wkt(wkt);
    match srs.auth_code() {
        Ok(code) => Some(crs.with_epsg(code as u32)),
        Err(_) => Some(crs),
    }
}

fn spatial_ref_from_crs(crs: &CRS) -> Result<SpatialRef> {
    if let Some(epsg) = crs.epsg() {
        return Ok(SpatialRef::from_epsg(epsg)?);
    }
    match crs.wkt() {
        Some(wkt) => Ok(SpatialRef::from_wkt(wkt)?),
        None => Ok(SpatialRef::new()?),
    }
}
