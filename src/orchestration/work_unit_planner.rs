//! # Work Unit Planner
//!
//! Groups newly discovered items into estimation units. Units carry no
//! prerequisites on each other; the caller registers every returned unit as a
//! prerequisite of the join unit.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::models::{InputItem, WorkUnit, WorkUnitKind};

#[derive(Debug, Clone)]
pub struct WorkUnitPlanner {
    batch_size: usize,
    args: Value,
}

impl WorkUnitPlanner {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            args: Value::Null,
        }
    }

    /// Arguments attached to every planned unit
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Plan units for `new_items` in traversal order.
    ///
    /// A batch size of 1 or less yields one single-item unit per item;
    /// otherwise items are split into consecutive chunks of at most
    /// `batch_size`.
    pub fn plan_units(&self, new_items: &[Arc<InputItem>]) -> Vec<WorkUnit> {
        let units: Vec<WorkUnit> = if self.batch_size <= 1 {
            new_items
                .iter()
                .map(|item| self.unit(WorkUnitKind::Estimate, std::slice::from_ref(item)))
                .collect()
        } else {
            new_items
                .chunks(self.batch_size)
                .map(|chunk| self.unit(WorkUnitKind::EstimateBatch, chunk))
                .collect()
        };

        debug!(
            items = new_items.len(),
            units = units.len(),
            batch_size = self.batch_size,
            "Planned estimation units"
        );
        units
    }

    fn unit(&self, kind: WorkUnitKind, items: &[Arc<InputItem>]) -> WorkUnit {
        WorkUnit {
            kind,
            item_keys: items.iter().map(|i| i.key.clone()).collect(),
            item_ids: items.iter().map(|i| i.id).collect(),
            prerequisites: Vec::new(),
            args: self.args.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(count: i64) -> Vec<Arc<InputItem>> {
        (1..=count)
            .map(|id| Arc::new(InputItem::new(id, format!("mic_{id}"), format!("/data/{id}.mrc"))))
            .collect()
    }

    #[test]
    fn test_single_item_units_are_keyed_by_name() {
        let units = WorkUnitPlanner::new(1).plan_units(&items(3));
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.kind == WorkUnitKind::Estimate));
        assert_eq!(units[1].item_keys, vec!["mic_2"]);
        assert!(units.iter().all(|u| u.prerequisites.is_empty()));
    }

    #[test]
    fn test_zero_batch_size_behaves_like_one() {
        let units = WorkUnitPlanner::new(0).plan_units(&items(2));
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn test_ten_items_in_batches_of_three() {
        let units = WorkUnitPlanner::new(3).plan_units(&items(10));
        let sizes: Vec<usize> = units.iter().map(WorkUnit::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert!(units.iter().all(|u| u.kind == WorkUnitKind::EstimateBatch));

        let covered: Vec<i64> = units.iter().flat_map(|u| u.item_ids.clone()).collect();
        assert_eq!(covered, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_args_are_attached_to_every_unit() {
        let args = serde_json::json!({"window_size": 512});
        let units = WorkUnitPlanner::new(2).with_args(args.clone()).plan_units(&items(3));
        assert!(units.iter().all(|u| u.args == args));
    }

    #[test]
    fn test_no_items_no_units() {
        assert!(WorkUnitPlanner::new(4).plan_units(&[]).is_empty());
    }
}
