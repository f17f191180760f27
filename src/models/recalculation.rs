use serde::{Deserialize, Serialize};

use crate::models::{ItemId, ResultRecord};

/// A user-flagged item from an edited copy of prior results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalculationRequest {
    pub item_id: ItemId,
    /// Free-form parameter annotation; empty means "keep the prior result"
    pub annotation: String,
    pub enabled: bool,
    /// The prior result this request was edited from
    pub prior: ResultRecord,
}

impl RecalculationRequest {
    /// Build a request from an edited prior result, reading the annotation from
    /// the record comment and the flag from its enabled state.
    pub fn from_record(record: ResultRecord) -> Self {
        Self {
            item_id: record.item_id,
            annotation: record.comment.clone(),
            enabled: record.enabled,
            prior: record,
        }
    }

    /// Only enabled requests that carry parameters are re-estimated
    pub fn is_actionable(&self) -> bool {
        self.enabled && !self.annotation.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actionable_requires_enabled_and_annotation() {
        let mut record = ResultRecord::new(4, "d", 10000.0, 11000.0);
        record.comment = "12000 13000 45".to_string();
        assert!(RecalculationRequest::from_record(record.clone()).is_actionable());

        record.enabled = false;
        assert!(!RecalculationRequest::from_record(record.clone()).is_actionable());

        record.enabled = true;
        record.comment = "   ".to_string();
        assert!(!RecalculationRequest::from_record(record).is_actionable());
    }
}
