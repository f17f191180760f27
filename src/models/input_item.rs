//! # Input Items
//!
//! Items observed in the input collection and the set of every item the
//! scheduler has seen during a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Stable integer identifier assigned by the input collection
pub type ItemId = i64;

/// Acquisition settings shared by the items of an input collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    /// Accelerating voltage in kV
    pub voltage: f64,
    /// Spherical aberration in mm
    pub spherical_aberration: f64,
    pub magnification: f64,
    pub amplitude_contrast: f64,
}

impl Default for Acquisition {
    fn default() -> Self {
        Self {
            voltage: 300.0,
            spherical_aberration: 2.7,
            magnification: 50000.0,
            amplitude_contrast: 0.1,
        }
    }
}

/// Collection-level properties read alongside the items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CollectionProperties {
    pub acquisition: Acquisition,
    /// Sampling rate in Å/px
    pub sampling_rate: f64,
    pub scanned_pixel_size: f64,
}

/// One identifiable unit of the input collection. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputItem {
    pub id: ItemId,
    /// Natural key, stable across streaming lookups
    pub key: String,
    /// Payload reference, usually a file path
    pub path: String,
    #[serde(default)]
    pub sampling_rate: f64,
    #[serde(default)]
    pub acquisition: Acquisition,
}

impl InputItem {
    pub fn new(id: ItemId, key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            path: path.into(),
            sampling_rate: 1.0,
            acquisition: Acquisition::default(),
        }
    }
}

/// Every item seen during a run, keyed by natural key.
///
/// Grows monotonically; keys are unique and discovery order is kept so that
/// completion scans visit items in the order they arrived.
#[derive(Debug, Default, Clone)]
pub struct TrackedSet {
    by_key: HashMap<String, Arc<InputItem>>,
    by_id: HashMap<ItemId, String>,
    order: Vec<String>,
}

impl TrackedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an item. Returns false if its key was already tracked.
    pub fn insert(&mut self, item: Arc<InputItem>) -> bool {
        if self.by_key.contains_key(&item.key) {
            return false;
        }
        self.by_id.insert(item.id, item.key.clone());
        self.order.push(item.key.clone());
        self.by_key.insert(item.key.clone(), item);
        true
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Arc<InputItem>> {
        self.by_key.get(key)
    }

    pub fn get_by_id(&self, id: ItemId) -> Option<&Arc<InputItem>> {
        self.by_id.get(&id).and_then(|key| self.by_key.get(key))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Items in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<InputItem>> + '_ {
        self.order.iter().filter_map(|key| self.by_key.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_set_rejects_duplicate_keys() {
        let mut tracked = TrackedSet::new();
        assert!(tracked.insert(Arc::new(InputItem::new(1, "a", "/data/a.mrc"))));
        assert!(!tracked.insert(Arc::new(InputItem::new(9, "a", "/data/a2.mrc"))));
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked.get("a").map(|i| i.id), Some(1));
    }

    #[test]
    fn test_tracked_set_keeps_discovery_order() {
        let mut tracked = TrackedSet::new();
        for (id, key) in [(3, "c"), (1, "a"), (2, "b")] {
            tracked.insert(Arc::new(InputItem::new(id, key, format!("/data/{key}.mrc"))));
        }
        let keys: Vec<_> = tracked.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
        assert_eq!(tracked.get_by_id(1).map(|i| i.key.as_str()), Some("a"));
        assert!(tracked.get_by_id(42).is_none());
    }
}
