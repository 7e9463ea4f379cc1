//! Attribute field descriptions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Integer64,
    Real,
    String,
    Date,
    DateTime,
    Boolean,
}

impl FieldType {
    /// Width used when a field is declared without one (shapefile DBF conventions).
    pub fn default_length(&self) -> usize {
        match self {
            FieldType::Integer => 10,
            FieldType::Integer64 => 20,
            FieldType::Real => 24,
            FieldType::String => 80,
            FieldType::Date => 10,
            FieldType::DateTime => 24,
            FieldType::Boolean => 1,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "Integer",
            FieldType::Integer64 => "Integer64",
            FieldType::Real => "Real",
            FieldType::String => "String",
            FieldType::Date => "Date",
            FieldType::DateTime => "DateTime",
            FieldType::Boolean => "Boolean",
        };
        f.write_str(name)
    }
}

/// One output attribute field: name, type and width
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    pub length: usize,
    pub precision: usize,
}

impl FieldSchema {
    /// Create a field with the type's default width and no precision
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            length: field_type.default_length(),
            precision: 0,
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Two fields unify when both name and type are equal.
    pub fn is_compatible(&self, other: &FieldSchema) -> bool {
        self.name == other.name && self.field_type == other.field_type
    }

    /// Grow this field's width to fit `other`. Never shrinks.
    pub fn widen_to(&mut self, other: &FieldSchema) {
        if self.length < other.length {
            self.length = other.length;
        }
    }
}

impl fmt::Display for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({}", self.name, self.field_type, self.length)?;
        if self.precision > 0 {
            write!(f, ".{}", self.precision)?;
        }
        f.write_str(")")
    }
}

/// Position of the field called `name`, if any
pub fn field_index(fields: &[FieldSchema], name: &str) -> Option<usize> {
    fields.iter().position(|f| f.name == name)
}
