//! Vector data model
//!
//! - `FieldSchema`: one attribute column of a dataset
//! - `AttributeValue`: one attribute cell
//! - `Record`: attributes aligned to a schema + optional geometry

mod field;
mod record;
mod value;

pub use field::{field_index, FieldSchema, FieldType};
pub use record::{GeometryType, Record};
pub use value::{AttributeValue, RawKey};
