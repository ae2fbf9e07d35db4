use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::item::Value;
use crate::record::Record;

type Buckets = IndexMap<Value, Vec<Arc<Record>>>;

/// A primary-key bucket holding more than one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub key: Value,
    pub count: usize,
}

/// Value-to-records buckets for a set of tracked attributes.
///
/// Distinct values keep first-seen order; records within a bucket keep
/// ingestion order. A record without a given attribute is simply absent from
/// that attribute's index.
#[derive(Debug, Default)]
pub struct IndexManager {
    indexes: HashMap<String, Buckets>,
    records: Vec<Arc<Record>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an attribute, back-filling it from every record seen so far.
    ///
    /// Returns false if the attribute was already tracked.
    pub fn add_index(&mut self, attribute: impl Into<String>) -> bool {
        let attribute = attribute.into();
        if self.indexes.contains_key(&attribute) {
            return false;
        }

        let mut buckets = Buckets::new();
        for record in &self.records {
            if let Some(value) = record.get(&attribute) {
                buckets.entry(value.clone()).or_default().push(Arc::clone(record));
            }
        }
        self.indexes.insert(attribute, buckets);
        true
    }

    pub fn has_index(&self, attribute: &str) -> bool {
        self.indexes.contains_key(attribute)
    }

    /// Adds a record to every tracked index.
    pub fn insert(&mut self, record: Arc<Record>) {
        for (attribute, buckets) in &mut self.indexes {
            if let Some(value) = record.get(attribute) {
                buckets.entry(value.clone()).or_default().push(Arc::clone(&record));
            }
        }
        self.records.push(record);
    }

    /// Records indexed under `value` for `attribute`, in insertion order.
    pub fn find(&self, attribute: &str, value: &Value) -> &[Arc<Record>] {
        self.indexes
            .get(attribute)
            .and_then(|buckets| buckets.get(value))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Distinct values of an attribute with their buckets, in first-seen order.
    pub fn buckets(&self, attribute: &str) -> impl Iterator<Item = (&Value, &[Arc<Record>])> {
        self.indexes
            .get(attribute)
            .into_iter()
            .flat_map(|buckets| buckets.iter().map(|(v, rs)| (v, rs.as_slice())))
    }

    /// Every record in an attribute's index, flattened bucket by bucket.
    pub fn records(&self, attribute: &str) -> impl Iterator<Item = &Arc<Record>> {
        self.buckets(attribute).flat_map(|(_, records)| records.iter())
    }

    /// Buckets of `attribute` that hold more than one record.
    pub fn collisions(&self, attribute: &str) -> Vec<Collision> {
        self.buckets(attribute)
            .filter(|(_, records)| records.len() > 1)
            .map(|(key, records)| Collision {
                key: key.clone(),
                count: records.len(),
            })
            .collect()
    }

    /// Number of records inserted.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
