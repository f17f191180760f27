//! # Output Collection
//!
//! The externally visible, append-only set of per-item results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::constants::StreamState;
use crate::models::ItemId;

/// Result synthesized from a finished work unit's side effects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub item_id: ItemId,
    pub item_key: String,
    /// Defocus along the major axis, Å
    pub defocus_u: f64,
    /// Defocus along the minor axis, Å
    pub defocus_v: f64,
    pub defocus_angle: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-form annotation; on an edited copy it carries re-estimation parameters
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub data: Value,
}

fn default_enabled() -> bool {
    true
}

impl ResultRecord {
    pub fn new(item_id: ItemId, item_key: impl Into<String>, defocus_u: f64, defocus_v: f64) -> Self {
        Self {
            item_id,
            item_key: item_key.into(),
            defocus_u,
            defocus_v,
            defocus_angle: 0.0,
            enabled: true,
            comment: String::new(),
            data: Value::Null,
        }
    }

    /// Take the estimated values of `other` while keeping this record's identity
    pub fn copy_values_from(&mut self, other: &ResultRecord) {
        self.defocus_u = other.defocus_u;
        self.defocus_v = other.defocus_v;
        self.defocus_angle = other.defocus_angle;
        self.data = other.data.clone();
    }
}

/// Append-only aggregate result set with a stream state tag
#[derive(Debug, Clone, Serialize)]
pub struct OutputCollection {
    name: String,
    records: Vec<ResultRecord>,
    #[serde(skip)]
    ids: HashSet<ItemId>,
    stream_state: StreamState,
    /// Name of the input collection this output was derived from
    source: Option<String>,
}

impl OutputCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            ids: HashSet::new(),
            stream_state: StreamState::Open,
            source: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a record. Returns false, leaving the collection untouched, if the
    /// item is already present or the collection is closed.
    pub fn append(&mut self, record: ResultRecord) -> bool {
        if self.stream_state.is_closed() || self.ids.contains(&record.item_id) {
            return false;
        }
        self.ids.insert(record.item_id);
        self.records.push(record);
        true
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.ids.contains(&item_id)
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn get(&self, item_id: ItemId) -> Option<&ResultRecord> {
        self.records.iter().find(|r| r.item_id == item_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream_state
    }

    /// Closing is final; an attempt to reopen a closed collection is ignored.
    pub fn set_stream_state(&mut self, state: StreamState) {
        if !self.stream_state.is_closed() {
            self.stream_state = state;
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
    }

    /// Minimum and maximum defocus over every record, in microns
    pub fn defocus_range_microns(&self) -> Option<(f64, f64)> {
        let values = self
            .records
            .iter()
            .flat_map(|r| [r.defocus_u, r.defocus_v]);
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if min.is_finite() && max.is_finite() {
            Some((min / 10000.0, max / 10000.0))
        } else {
            None
        }
    }
}
