//! Distinct-value partitioning of one attribute field.

use std::collections::HashSet;

use tracing::{debug, warn};

use vecbatch_core::{AttributeValue, DatasetReader};

use crate::error::{JobError, Result};

/// Distinct raw values of field `field_index`, in order of first appearance.
///
/// Every record is read. Values are compared by raw equality, so `"N"` and
/// `" N "` or `1` and `1.0` are different values. Records that fail to decode
/// are logged and skipped.
pub fn distinct_values<R>(source: &mut R, field_index: usize) -> Result<Vec<AttributeValue>>
where
    R: DatasetReader + ?Sized,
{
    let field_count = source.fields().len();
    if field_index >= field_count {
        return Err(JobError::InvalidField {
            field: format!("#{}", field_index),
            reason: format!(
                "index out of range for layer '{}' with {} fields",
                source.layer_name(),
                field_count
            ),
        });
    }

    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for record in source.records()? {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping unreadable record");
                continue;
            }
        };
        let value = record
            .attributes
            .into_iter()
            .nth(field_index)
            .unwrap_or(AttributeValue::Null);
        if seen.insert(value.raw_key()) {
            values.push(value);
        }
    }

    debug!(field_index, distinct = values.len(), "values partitioned");
    Ok(values)
}
