//! # Output Aggregator
//!
//! Merges newly completed items into the growing output collection, tags its
//! stream state, and republishes it.
//!
//! A synthesis failure for one item is contained: the item is reported back as
//! failed, a diagnostic is logged, and the remaining items are still merged.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::constants::StreamState;
use crate::error::SchedulerResult;
use crate::logging::log_error;
use crate::models::{InputItem, OutputCollection};
use crate::orchestration::estimator::Estimator;

/// External store the output collection is published to
#[async_trait]
pub trait OutputPublisher: Send + Sync {
    /// Register a new output collection under `name`
    async fn define_outputs(&self, name: &str, collection: &OutputCollection)
        -> SchedulerResult<()>;

    /// Record that `child` was derived from `parent`
    async fn define_relation(&self, parent: &str, child: &str) -> SchedulerResult<()>;

    /// Republish an existing output with its current stream state
    async fn update_output_set(
        &self,
        name: &str,
        collection: &OutputCollection,
        stream_state: StreamState,
    ) -> SchedulerResult<()>;

    /// Look up a published output, e.g. the result of a prior run
    async fn get_output(&self, name: &str) -> SchedulerResult<Option<OutputCollection>>;
}

/// One publication, kept for auditing
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationRecord {
    pub name: String,
    pub size: usize,
    pub stream_state: StreamState,
}

#[derive(Debug, Default)]
struct OutputStoreState {
    outputs: HashMap<String, OutputCollection>,
    relations: Vec<(String, String)>,
    publications: Vec<PublicationRecord>,
}

/// In-memory output store; clones share the same state
#[derive(Debug, Default, Clone)]
pub struct InMemoryOutputStore {
    state: Arc<Mutex<OutputStoreState>>,
}

impl InMemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self, name: &str) -> Option<OutputCollection> {
        self.state.lock().outputs.get(name).cloned()
    }

    pub fn relations(&self) -> Vec<(String, String)> {
        self.state.lock().relations.clone()
    }

    pub fn publications(&self) -> Vec<PublicationRecord> {
        self.state.lock().publications.clone()
    }

    /// Seed an output, as a prior run would have left it
    pub fn insert_output(&self, collection: OutputCollection) {
        self.state
            .lock()
            .outputs
            .insert(collection.name().to_string(), collection);
    }
}

#[async_trait]
impl OutputPublisher for InMemoryOutputStore {
    async fn define_outputs(
        &self,
        name: &str,
        collection: &OutputCollection,
    ) -> SchedulerResult<()> {
        self.state
            .lock()
            .outputs
            .insert(name.to_string(), collection.clone());
        Ok(())
    }

    async fn define_relation(&self, parent: &str, child: &str) -> SchedulerResult<()> {
        self.state
            .lock()
            .relations
            .push((parent.to_string(), child.to_string()));
        Ok(())
    }

    async fn update_output_set(
        &self,
        name: &str,
        collection: &OutputCollection,
        stream_state: StreamState,
    ) -> SchedulerResult<()> {
        let mut state = self.state.lock();
        state.outputs.insert(name.to_string(), collection.clone());
        state.publications.push(PublicationRecord {
            name: name.to_string(),
            size: collection.len(),
            stream_state,
        });
        Ok(())
    }

    async fn get_output(&self, name: &str) -> SchedulerResult<Option<OutputCollection>> {
        Ok(self.output(name))
    }
}

/// Items merged and items that failed synthesis during one reconcile
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub appended: Vec<Arc<InputItem>>,
    pub done_failed: Vec<Arc<InputItem>>,
}

#[derive(Clone)]
pub struct OutputAggregator {
    output_name: String,
    source_name: String,
    estimator: Arc<dyn Estimator>,
    publisher: Arc<dyn OutputPublisher>,
}

impl std::fmt::Debug for OutputAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputAggregator")
            .field("output_name", &self.output_name)
            .field("source_name", &self.source_name)
            .finish_non_exhaustive()
    }
}

impl OutputAggregator {
    pub fn new(
        output_name: impl Into<String>,
        source_name: impl Into<String>,
        estimator: Arc<dyn Estimator>,
        publisher: Arc<dyn OutputPublisher>,
    ) -> Self {
        Self {
            output_name: output_name.into(),
            source_name: source_name.into(),
            estimator,
            publisher,
        }
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn publisher(&self) -> &Arc<dyn OutputPublisher> {
        &self.publisher
    }

    /// Merge `newly_done` into `output`, creating it on the first success.
    ///
    /// Nothing is published when `newly_done` is empty.
    pub async fn reconcile(
        &self,
        output: &mut Option<OutputCollection>,
        newly_done: &[Arc<InputItem>],
        stream_state: StreamState,
    ) -> SchedulerResult<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        if newly_done.is_empty() {
            return Ok(outcome);
        }

        let mut created = false;
        for item in newly_done {
            if output.as_ref().is_some_and(|o| o.contains(item.id)) {
                // Published before a restart but never recorded as done
                debug!(item_id = item.id, "Item already in output");
                outcome.appended.push(Arc::clone(item));
                continue;
            }

            match self.estimator.synthesize_result(item).await {
                Ok(record) => {
                    let collection = output.get_or_insert_with(|| {
                        created = true;
                        let mut collection = OutputCollection::new(&self.output_name);
                        collection.set_source(&self.source_name);
                        collection
                    });
                    if collection.append(record) {
                        outcome.appended.push(Arc::clone(item));
                    } else {
                        warn!(item_id = item.id, "Output rejected append");
                        outcome.done_failed.push(Arc::clone(item));
                    }
                }
                Err(e) => {
                    warn!(
                        item_id = item.id,
                        path = %item.path,
                        "Missing result? Couldn't update output with item"
                    );
                    log_error(
                        "output_aggregator",
                        "synthesize_result",
                        &e.to_string(),
                        Some(item.key.as_str()),
                    );
                    outcome.done_failed.push(Arc::clone(item));
                }
            }
        }

        if created {
            if let Some(collection) = output.as_ref() {
                self.publisher
                    .define_outputs(&self.output_name, collection)
                    .await?;
            }
        }

        self.publish(output, stream_state).await?;

        if created {
            self.publisher
                .define_relation(&self.source_name, &self.output_name)
                .await?;
        }

        info!(
            appended = outcome.appended.len(),
            failed = outcome.done_failed.len(),
            stream_state = %stream_state,
            "Reconciled newly done items"
        );
        Ok(outcome)
    }

    /// Publish the terminal stream state even when no result was produced,
    /// creating an empty output if none exists yet.
    pub async fn publish_stream_state(
        &self,
        output: &mut Option<OutputCollection>,
        stream_state: StreamState,
    ) -> SchedulerResult<()> {
        if output.is_none() {
            let collection = OutputCollection::new(&self.output_name);
            self.publisher
                .define_outputs(&self.output_name, &collection)
                .await?;
            *output = Some(collection);
        }
        self.publish(output, stream_state).await
    }

    async fn publish(
        &self,
        output: &mut Option<OutputCollection>,
        stream_state: StreamState,
    ) -> SchedulerResult<()> {
        let Some(collection) = output.as_mut() else {
            return Ok(());
        };
        collection.set_stream_state(stream_state);
        debug!(stream_state = %stream_state, size = collection.len(), "Publishing output");
        self.publisher
            .update_output_set(&self.output_name, collection, stream_state)
            .await
    }
}
