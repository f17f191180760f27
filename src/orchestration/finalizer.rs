//! # Output Finalizer
//!
//! Body of the join unit. Runs once, after every estimation unit has ended and
//! the streaming loop has released the join.
//!
//! A streaming run succeeds only when at least one item reached the output. A
//! recalculation run rebuilds the prior output as a new collection in which
//! the re-estimated items carry their fresh values.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::constants::{StreamState, RECALCULATED_SUFFIX};
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::OutputCollection;
use crate::orchestration::estimator::Estimator;
use crate::orchestration::output_aggregator::OutputPublisher;
use crate::orchestration::recalculation_planner::RecalculationPlan;

/// Human-readable outcome of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Name of the collection the run produced
    pub output: String,
    /// Records in that collection
    pub processed: usize,
    /// Items re-estimated, for recalculation runs
    pub recalculated: Option<usize>,
    pub summary: String,
    pub methods: Option<String>,
}

impl RunSummary {
    fn streaming(output: &OutputCollection, tracked: usize) -> Self {
        let methods = output.defocus_range_microns().map(|(min, max)| {
            format!(
                "Estimated the CTF of {} items. The defocus range (in microns) goes from {min:.3} to {max:.3}.",
                output.len()
            )
        });
        Self {
            output: output.name().to_string(),
            processed: output.len(),
            recalculated: None,
            summary: format!("Estimation of {tracked} items."),
            methods,
        }
    }
}

pub struct OutputFinalizer {
    output_name: String,
    estimator: Arc<dyn Estimator>,
    publisher: Arc<dyn OutputPublisher>,
}

impl std::fmt::Debug for OutputFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFinalizer")
            .field("output_name", &self.output_name)
            .finish_non_exhaustive()
    }
}

impl OutputFinalizer {
    pub fn new(
        output_name: impl Into<String>,
        estimator: Arc<dyn Estimator>,
        publisher: Arc<dyn OutputPublisher>,
    ) -> Self {
        Self {
            output_name: output_name.into(),
            estimator,
            publisher,
        }
    }

    /// Finish a streaming run. The summary counts every tracked input item; an
    /// absent or empty output means all of them failed.
    pub fn finalize_streaming(
        &self,
        output: Option<&OutputCollection>,
        tracked: usize,
    ) -> SchedulerResult<RunSummary> {
        match output {
            Some(collection) if !collection.is_empty() => {
                let summary = RunSummary::streaming(collection, tracked);
                info!(
                    output = %summary.output,
                    processed = summary.processed,
                    "Streaming run finalized"
                );
                Ok(summary)
            }
            _ => Err(SchedulerError::AllItemsFailed {
                output: self.output_name.clone(),
                tracked,
            }),
        }
    }

    /// Finish a recalculation run by rebuilding `prior_output` with the
    /// re-estimated values.
    #[instrument(skip(self, plan), fields(planned = plan.planned_count()))]
    pub async fn finalize_recalculation(
        &self,
        prior_output: &str,
        plan: &RecalculationPlan,
    ) -> SchedulerResult<RunSummary> {
        let prior = self
            .publisher
            .get_output(prior_output)
            .await?
            .ok_or_else(|| SchedulerError::MissingPriorRun {
                output: prior_output.to_string(),
            })?;

        let name = format!("{prior_output}{RECALCULATED_SUFFIX}");
        let mut collection = OutputCollection::new(&name);
        if let Some(source) = prior.source() {
            collection.set_source(source);
        }

        for request in &plan.requests {
            let mut record = request.prior.clone();
            if request.is_actionable() {
                let item = plan.items.get_by_id(request.item_id).ok_or_else(|| {
                    SchedulerError::InvalidState(format!(
                        "Item {} was re-estimated but never planned",
                        request.item_id
                    ))
                })?;
                let fresh = self.estimator.synthesize_result(item).await?;
                record.copy_values_from(&fresh);
                record.enabled = true;
            }
            if !collection.append(record) {
                warn!(item_id = request.item_id, "Duplicate request ignored");
            }
        }

        self.publisher.define_outputs(&name, &collection).await?;
        collection.set_stream_state(StreamState::Closed);
        self.publisher
            .update_output_set(&name, &collection, StreamState::Closed)
            .await?;
        // Provenance points at the input the prior run estimated
        let parent = prior.source().unwrap_or(prior_output);
        self.publisher.define_relation(parent, &name).await?;

        let recalculated = plan.planned_count();
        info!(output = %name, recalculated, "Recalculation run finalized");
        Ok(RunSummary {
            output: name,
            processed: collection.len(),
            recalculated: Some(recalculated),
            summary: format!("Re-estimation of {recalculated} items."),
            methods: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EstimationError, EstimationResult};
    use crate::models::{InputItem, ResultRecord};
    use crate::orchestration::estimator::EstimationParams;
    use crate::orchestration::output_aggregator::InMemoryOutputStore;
    use async_trait::async_trait;

    struct NoopEstimator;

    #[async_trait]
    impl Estimator for NoopEstimator {
        async fn estimate_one(&self, _: &InputItem, _: &EstimationParams) -> EstimationResult<()> {
            Ok(())
        }

        async fn re_estimate(
            &self,
            _: &InputItem,
            _: &str,
            _: &EstimationParams,
        ) -> EstimationResult<()> {
            Ok(())
        }

        async fn synthesize_result(&self, item: &InputItem) -> EstimationResult<ResultRecord> {
            Err(EstimationError::Unsupported(item.key.clone()))
        }
    }

    fn finalizer() -> OutputFinalizer {
        OutputFinalizer::new(
            "output_results",
            Arc::new(NoopEstimator),
            Arc::new(InMemoryOutputStore::new()),
        )
    }

    #[test]
    fn test_empty_output_fails_the_run() {
        let empty = OutputCollection::new("output_results");
        let result = finalizer().finalize_streaming(Some(&empty), 3);
        assert_eq!(
            result,
            Err(SchedulerError::AllItemsFailed {
                output: "output_results".to_string(),
                tracked: 3
            })
        );
        assert!(finalizer().finalize_streaming(None, 0).is_err());
    }

    #[test]
    fn test_summary_reports_defocus_range() {
        let mut output = OutputCollection::new("output_results");
        output.append(ResultRecord::new(1, "a", 12000.0, 15000.0));
        output.append(ResultRecord::new(2, "b", 8000.0, 9000.0));

        let summary = finalizer().finalize_streaming(Some(&output), 3).unwrap();
        assert_eq!(summary.summary, "Estimation of 3 items.");
        assert_eq!(summary.processed, 2);
        let methods = summary.methods.unwrap();
        assert!(methods.contains("from 0.800 to 1.500"), "{methods}");
    }

    #[tokio::test]
    async fn test_recalculation_relation_without_prior_source() {
        let store = Arc::new(InMemoryOutputStore::new());
        store.insert_output(OutputCollection::new("output_results"));
        let finalizer = OutputFinalizer::new("output_results", Arc::new(NoopEstimator), store.clone());

        finalizer
            .finalize_recalculation("output_results", &RecalculationPlan::default())
            .await
            .unwrap();
        assert_eq!(
            store.relations(),
            vec![(
                "output_results".to_string(),
                "output_results_recalculated".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_recalculation_without_prior_output() {
        let result = finalizer()
            .finalize_recalculation("output_results", &RecalculationPlan::default())
            .await;
        assert!(matches!(result, Err(SchedulerError::MissingPriorRun { .. })));
    }
}
