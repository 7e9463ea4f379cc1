//! Records and geometry types

use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::AttributeValue;

/// Geometry type of a dataset layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    /// Attribute-only table
    None,
    Unknown,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    /// Geometry type of a concrete geometry
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::Line(_) | Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
                GeometryType::Polygon
            }
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    /// Single-part type of the same family: `MultiPoint` -> `Point`, etc.
    pub fn base_type(&self) -> Self {
        match self {
            GeometryType::MultiPoint => GeometryType::Point,
            GeometryType::MultiLineString => GeometryType::LineString,
            GeometryType::MultiPolygon => GeometryType::Polygon,
            other => *other,
        }
    }

    /// True when both are points, both lines or both polygons.
    pub fn same_family(&self, other: &GeometryType) -> bool {
        self.base_type() == other.base_type()
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A geographic feature: attributes aligned to a field list, plus geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub attributes: Vec<AttributeValue>,
    pub geometry: Option<Geometry<f64>>,
}

impl Record {
    /// Create a record with no geometry
    pub fn new(attributes: Vec<AttributeValue>) -> Self {
        Self {
            attributes,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: impl Into<Geometry<f64>>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    /// Attribute at `index`, if the record has that many
    pub fn attribute(&self, index: usize) -> Option<&AttributeValue> {
        self.attributes.get(index)
    }
}
