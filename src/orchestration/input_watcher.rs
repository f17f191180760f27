//! # Input Watcher
//!
//! Detects items that appeared in the input collection since the last check
//! and whether the collection has been closed.
//!
//! The watcher owns a single piece of state, the time of its last read. When
//! the input has not been modified since then it short-circuits without
//! opening the collection. It never mutates the tracked set; the caller
//! tracks the returned items.
//!
//! Inputs are assumed to grow append-only. Items that disappear or change in
//! place after being tracked are not re-read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{CollectionProperties, InputItem, TrackedSet};

/// Contents of the input collection read at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InputSnapshot {
    /// Items in collection order
    pub items: Vec<InputItem>,
    #[serde(default)]
    pub stream_closed: bool,
    #[serde(default)]
    pub properties: CollectionProperties,
}

/// Read-only handle on the input collection
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Name used to bind output provenance to this input
    fn name(&self) -> &str;

    /// Last modification time of the backing collection
    async fn modified_at(&self) -> SchedulerResult<DateTime<Utc>>;

    /// Open the collection, read everything, and release it
    async fn open(&self) -> SchedulerResult<InputSnapshot>;
}

#[derive(Debug)]
struct InMemoryInputState {
    snapshot: InputSnapshot,
    modified_at: DateTime<Utc>,
}

/// Growable input collection held in memory; clones share the same items
#[derive(Debug, Clone)]
pub struct InMemoryInputSource {
    name: String,
    state: Arc<Mutex<InMemoryInputState>>,
}

impl InMemoryInputSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(InMemoryInputState {
                snapshot: InputSnapshot::default(),
                modified_at: Utc::now(),
            })),
        }
    }

    pub fn with_properties(self, properties: CollectionProperties) -> Self {
        {
            let mut state = self.state.lock();
            state.snapshot.properties = properties;
            state.modified_at = Utc::now();
        }
        self
    }

    pub fn append(&self, item: InputItem) {
        let mut state = self.state.lock();
        state.snapshot.items.push(item);
        state.modified_at = Utc::now();
    }

    pub fn extend(&self, items: impl IntoIterator<Item = InputItem>) {
        let mut state = self.state.lock();
        state.snapshot.items.extend(items);
        state.modified_at = Utc::now();
    }

    /// Signal that no more items will arrive
    pub fn close_stream(&self) {
        let mut state = self.state.lock();
        state.snapshot.stream_closed = true;
        state.modified_at = Utc::now();
    }

    pub fn len(&self) -> usize {
        self.state.lock().snapshot.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InputSource for InMemoryInputSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn modified_at(&self) -> SchedulerResult<DateTime<Utc>> {
        Ok(self.state.lock().modified_at)
    }

    async fn open(&self) -> SchedulerResult<InputSnapshot> {
        Ok(self.state.lock().snapshot.clone())
    }
}

/// Input collection stored as a JSON document
///
/// ```json
/// { "stream_closed": false, "properties": { ... }, "items": [ { "id": 1, "key": "mic_1", "path": "..." } ] }
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileInputSource {
    name: String,
    path: PathBuf,
}

impl JsonFileInputSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        Self { name, path }
    }

    fn io_error(&self, error: std::io::Error) -> SchedulerError {
        SchedulerError::InputError(format!("{}: {error}", self.path.display()))
    }
}

#[async_trait]
impl InputSource for JsonFileInputSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn modified_at(&self) -> SchedulerResult<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        let modified = metadata.modified().map_err(|e| self.io_error(e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    async fn open(&self) -> SchedulerResult<InputSnapshot> {
        debug!(path = %self.path.display(), "Loading input collection");
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        let snapshot = serde_json::from_str(&content)?;
        debug!(path = %self.path.display(), "Closed input collection");
        Ok(snapshot)
    }
}

/// Result of one input check
#[derive(Debug, Clone, PartialEq)]
pub enum InputCheck {
    /// Input not modified since the previous read; stream state unchanged
    Unchanged,
    /// Input was read
    Loaded {
        /// Untracked items in collection order, keys unique
        new_items: Vec<Arc<InputItem>>,
        stream_closed: bool,
        properties: CollectionProperties,
    },
}

impl InputCheck {
    pub fn new_items(&self) -> &[Arc<InputItem>] {
        match self {
            Self::Unchanged => &[],
            Self::Loaded { new_items, .. } => new_items,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct InputWatcher {
    last_check: Option<DateTime<Utc>>,
}

impl InputWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check
    }

    #[instrument(skip_all, fields(source = source.name(), tracked = tracked.len()))]
    pub async fn check_for_new_items(
        &mut self,
        source: &dyn InputSource,
        tracked: &TrackedSet,
    ) -> SchedulerResult<InputCheck> {
        let now = Utc::now();
        let modified = source.modified_at().await?;
        debug!(last_check = ?self.last_check, modified = %modified, "Checking input");

        if let Some(last_check) = self.last_check {
            if last_check > modified {
                return Ok(InputCheck::Unchanged);
            }
        }
        self.last_check = Some(now);

        let snapshot = source.open().await?;
        let mut seen = HashSet::new();
        let new_items: Vec<Arc<InputItem>> = snapshot
            .items
            .into_iter()
            .filter(|item| !tracked.contains_key(&item.key) && seen.insert(item.key.clone()))
            .map(Arc::new)
            .collect();

        debug!(
            new_items = new_items.len(),
            stream_closed = snapshot.stream_closed,
            "Input loaded"
        );

        Ok(InputCheck::Loaded {
            new_items,
            stream_closed: snapshot.stream_closed,
            properties: snapshot.properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64) -> InputItem {
        InputItem::new(id, format!("mic_{id}"), format!("/data/mic_{id}.mrc"))
    }

    #[tokio::test]
    async fn test_first_check_reads_everything_untracked() {
        let source = InMemoryInputSource::new("micrographs");
        source.extend([item(1), item(2), item(3)]);

        let mut tracked = TrackedSet::new();
        tracked.insert(Arc::new(item(2)));

        let mut watcher = InputWatcher::new();
        let check = watcher
            .check_for_new_items(&source, &tracked)
            .await
            .unwrap();
        let keys: Vec<_> = check.new_items().iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec!["mic_1", "mic_3"]);
        assert!(watcher.last_check().is_some());
        // The watcher leaves tracking to the caller
        assert_eq!(tracked.len(), 1);
    }

    #[tokio::test]
    async fn test_unmodified_input_short_circuits() {
        let source = InMemoryInputSource::new("micrographs");
        source.append(item(1));

        let tracked = TrackedSet::new();
        let mut watcher = InputWatcher::new();
        watcher
            .check_for_new_items(&source, &tracked)
            .await
            .unwrap();
        let second = watcher
            .check_for_new_items(&source, &tracked)
            .await
            .unwrap();
        assert_eq!(second, InputCheck::Unchanged);
        assert!(second.new_items().is_empty());
    }

    #[tokio::test]
    async fn test_modification_after_check_is_seen() {
        let source = InMemoryInputSource::new("micrographs");
        source.append(item(1));

        let mut tracked = TrackedSet::new();
        let mut watcher = InputWatcher::new();
        let first = watcher
            .check_for_new_items(&source, &tracked)
            .await
            .unwrap();
        for new_item in first.new_items() {
            tracked.insert(new_item.clone());
        }

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        source.append(item(2));
        source.close_stream();

        match watcher
            .check_for_new_items(&source, &tracked)
            .await
            .unwrap()
        {
            InputCheck::Loaded {
                new_items,
                stream_closed,
                ..
            } => {
                assert_eq!(new_items.len(), 1);
                assert_eq!(new_items[0].id, 2);
                assert!(stream_closed);
            }
            InputCheck::Unchanged => panic!("Expected the appended item to be loaded"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_keys_in_source_are_reported_once() {
        let source = InMemoryInputSource::new("micrographs");
        source.extend([item(1), item(1)]);
        let mut watcher = InputWatcher::new();
        let check = watcher
            .check_for_new_items(&source, &TrackedSet::new())
            .await
            .unwrap();
        assert_eq!(check.new_items().len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("micrographs.json");
        std::fs::write(
            &path,
            r#"{"stream_closed": true, "items": [{"id": 1, "key": "mic_1", "path": "/data/mic_1.mrc"}]}"#,
        )
        .unwrap();

        let source = JsonFileInputSource::new(&path);
        assert_eq!(source.name(), "micrographs");
        assert!(source.modified_at().await.is_ok());

        let snapshot = source.open().await.unwrap();
        assert!(snapshot.stream_closed);
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].key, "mic_1");
    }

    #[tokio::test]
    async fn test_json_file_source_missing_file() {
        let source = JsonFileInputSource::new("/nonexistent/micrographs.json");
        match source.modified_at().await {
            Err(SchedulerError::InputError(msg)) => assert!(msg.contains("micrographs.json")),
            other => panic!("Expected InputError, got {other:?}"),
        }
    }
}
