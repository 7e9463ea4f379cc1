//! Schema unification
//!
//! Builds one merged field list from several input field lists, plus a dense
//! per-dataset table mapping each local field index to its merged index.
//!
//! Fields unify when name and type are both equal; the merged width is the
//! widest seen. The first occurrence fixes a field's position.

use serde::{Deserialize, Serialize};
use tracing::debug;

use vecbatch_core::{AttributeValue, FieldSchema};

use crate::error::{JobError, Result};

/// `rows[dataset][local_field] -> merged_field`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaMapping {
    rows: Vec<Vec<usize>>,
}

impl SchemaMapping {
    pub fn dataset_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, dataset: usize) -> Option<&[usize]> {
        self.rows.get(dataset).map(|r| r.as_slice())
    }

    pub fn merged_index(&self, dataset: usize, local: usize) -> Option<usize> {
        self.rows.get(dataset).and_then(|r| r.get(local)).copied()
    }

    /// Re-index one record's attributes from `dataset`'s schema into the merged
    /// schema of `merged_len` fields. Slots no local field maps to get `fill`.
    /// Attributes beyond the dataset's field count are dropped.
    pub fn remap(
        &self,
        dataset: usize,
        attributes: Vec<AttributeValue>,
        merged_len: usize,
        fill: &AttributeValue,
    ) -> Vec<AttributeValue> {
        let mut out = vec![fill.clone(); merged_len];
        let Some(row) = self.rows.get(dataset) else {
            return out;
        };
        for (value, &target) in attributes.into_iter().zip(row) {
            if let Some(slot) = out.get_mut(target) {
                *slot = value;
            }
        }
        out
    }
}

/// Frozen result of unification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSchema {
    pub fields: Vec<FieldSchema>,
    pub mapping: SchemaMapping,
}

impl UnifiedSchema {
    pub fn remap(
        &self,
        dataset: usize,
        attributes: Vec<AttributeValue>,
        fill: &AttributeValue,
    ) -> Vec<AttributeValue> {
        self.mapping.remap(dataset, attributes, self.fields.len(), fill)
    }
}

/// Incremental unifier: feed datasets in order, then [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct SchemaUnifier {
    merged: Vec<FieldSchema>,
    rows: Vec<Vec<usize>>,
}

impl SchemaUnifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next dataset's fields; returns that dataset's index.
    pub fn add_dataset(&mut self, fields: &[FieldSchema]) -> usize {
        let mut row = Vec::with_capacity(fields.len());
        for field in fields {
            let found = self.merged.iter().position(|m| m.is_compatible(field));
            let index = match found {
                Some(index) => {
                    self.merged[index].widen_to(field);
                    index
                }
                None => {
                    self.merged.push(field.clone());
                    self.merged.len() - 1
                }
            };
            row.push(index);
        }
        self.rows.push(row);
        debug!(
            dataset = self.rows.len() - 1,
            fields = fields.len(),
            merged = self.merged.len(),
            "schema added"
        );
        self.rows.len() - 1
    }

    pub fn dataset_count(&self) -> usize {
        self.rows.len()
    }

    pub fn merged_fields(&self) -> &[FieldSchema] {
        &self.merged
    }

    /// Freeze the merged list and mapping.
    pub fn finish(self) -> Result<UnifiedSchema> {
        if self.rows.is_empty() {
            return Err(JobError::EmptyInput);
        }
        Ok(UnifiedSchema {
            fields: self.merged,
            mapping: SchemaMapping { rows: self.rows },
        })
    }
}

/// Unify the field lists of several datasets, given in dataset order.
pub fn unify<'a, I>(schemas: I) -> Result<UnifiedSchema>
where
    I: IntoIterator<Item = &'a [FieldSchema]>,
{
    let mut unifier = SchemaUnifier::new();
    for fields in schemas {
        unifier.add_dataset(fields);
    }
    unifier.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vecbatch_core::FieldType;

    fn text(name: &str, len: usize) -> FieldSchema {
        FieldSchema::new(name, FieldType::String).with_length(len)
    }

    fn int(name: &str) -> FieldSchema {
        FieldSchema::new(name, FieldType::Integer)
    }

    #[test]
    fn test_two_layer_merge() {
        let a = vec![text("name", 10)];
        let b = vec![text("name", 20), int("pop")];
        let unified = unify([a.as_slice(), b.as_slice()]).unwrap();

        assert_eq!(unified.fields, vec![text("name", 20), int("pop")]);
        assert_eq!(unified.mapping.row(0), Some(&[0][..]));
        assert_eq!(unified.mapping.row(1), Some(&[0, 1][..]));
    }

    #[test]
    fn test_width_is_max_regardless_of_order() {
        for (first, second) in [(7, 31), (31, 7)] {
            let a = vec![text("name", first)];
            let b = vec![text("name", second)];
            let unified = unify([a.as_slice(), b.as_slice()]).unwrap();
            assert_eq!(unified.fields.len(), 1);
            assert_eq!(unified.fields[0].length, 31);
        }
    }

    #[test]
    fn test_same_name_different_type_stays_distinct() {
        let a = vec![text("code", 10)];
        let b = vec![int("code")];
        let unified = unify([a.as_slice(), b.as_slice()]).unwrap();
        assert_eq!(unified.fields, vec![text("code", 10), int("code")]);
        assert_eq!(unified.mapping.merged_index(1, 0), Some(1));
    }

    #[test]
    fn test_first_occurrence_fixes_position() {
        let a = vec![int("b"), int("a")];
        let b = vec![int("a"), int("c"), int("b")];
        let unified = unify([a.as_slice(), b.as_slice()]).unwrap();
        let names: Vec<&str> = unified.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(unified.mapping.row(1), Some(&[1, 2, 0][..]));
    }

    #[test]
    fn test_every_local_field_is_mapped_densely() {
        let a = vec![int("x"), text("y", 5)];
        let b: Vec<FieldSchema> = vec![];
        let c = vec![text("y", 9), int("z"), int("x")];
        let unified = unify([a.as_slice(), b.as_slice(), c.as_slice()]).unwrap();

        assert_eq!(unified.mapping.dataset_count(), 3);
        for (dataset, fields) in [&a, &b, &c].iter().enumerate() {
            let row = unified.mapping.row(dataset).unwrap();
            assert_eq!(row.len(), fields.len());
            assert!(row.iter().all(|&i| i < unified.fields.len()));
        }
        let mut targets: Vec<usize> = (0..3)
            .flat_map(|d| unified.mapping.row(d).unwrap().to_vec())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        assert_eq!(targets, (0..unified.fields.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_unify_is_deterministic() {
        let a = vec![text("name", 10), int("id")];
        let b = vec![int("id"), text("name", 30), FieldSchema::new("area", FieldType::Real)];
        let first = unify([a.as_slice(), b.as_slice()]).unwrap();
        let snapshot = serde_json::to_string(&first).unwrap();
        let second = unify([a.as_slice(), b.as_slice()]).unwrap();
        assert_eq!(snapshot, serde_json::to_string(&second).unwrap());
        let restored: UnifiedSchema = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(restored, second);
    }

    #[test]
    fn test_empty_input() {
        let none: Vec<&[FieldSchema]> = vec![];
        assert!(matches!(unify(none), Err(JobError::EmptyInput)));
    }

    #[test]
    fn test_remap_fills_unmapped_slots() {
        let a = vec![text("name", 10)];
        let b = vec![text("name", 20), int("pop")];
        let unified = unify([a.as_slice(), b.as_slice()]).unwrap();

        let fill = AttributeValue::empty();
        let out = unified.remap(0, vec![AttributeValue::from("Ely")], &fill);
        assert_eq!(out, vec![AttributeValue::from("Ely"), AttributeValue::empty()]);

        let out = unified.remap(
            1,
            vec![AttributeValue::from("York"), AttributeValue::Int(5)],
            &AttributeValue::Null,
        );
        assert_eq!(out, vec![AttributeValue::from("York"), AttributeValue::Int(5)]);
    }
}
