use std::collections::BTreeMap;
use std::sync::Arc;

use core_types::{IntegrationId, IssueTrackerDataKind};
use serde::{Serialize, Serializer};
use tokio::sync::watch;

/// Identifies one kind of in-flight coordinator call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "operation", content = "target", rename_all = "snake_case")]
pub enum OperationKey {
    RefreshStatus,
    Connect(IntegrationId),
    Disconnect(IntegrationId),
    SyncAll,
    FetchService(IntegrationId),
    FetchIssueTracker(IssueTrackerDataKind),
    TaskSummary,
    TaskAnalysis,
    WeeklySummary,
    AllTasks,
    SendMessage,
    ListConversations,
    OpenThread(String),
}

/// Counts in-flight calls per operation so overlapping calls never clear
/// each other's flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingSet(BTreeMap<OperationKey, usize>);

impl LoadingSet {
    fn begin(&mut self, key: OperationKey) {
        *self.0.entry(key).or_insert(0) += 1;
    }

    fn end(&mut self, key: &OperationKey) {
        if let Some(count) = self.0.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.0.remove(key);
            }
        }
    }

    pub fn is_loading(&self, key: &OperationKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn in_flight(&self, key: &OperationKey) -> usize {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn is_busy(&self) -> bool {
        !self.0.is_empty()
    }
}

impl Serialize for LoadingSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.keys())
    }
}

/// Snapshot types that carry a [`LoadingSet`].
pub trait TracksLoading {
    fn loading_mut(&mut self) -> &mut LoadingSet;
}

/// Marks an operation in flight until dropped. Dropping on every exit path,
/// including a cancelled future, is what keeps a key from getting stuck.
#[must_use = "the operation stops counting as loading once the guard drops"]
pub struct LoadingGuard<S: TracksLoading> {
    state: Arc<watch::Sender<S>>,
    key: OperationKey,
}

impl<S: TracksLoading> LoadingGuard<S> {
    pub fn begin(state: &Arc<watch::Sender<S>>, key: OperationKey) -> Self {
        state.send_modify(|snapshot| snapshot.loading_mut().begin(key.clone()));
        Self {
            state: Arc::clone(state),
            key,
        }
    }
}

impl<S: TracksLoading> Drop for LoadingGuard<S> {
    fn drop(&mut self) {
        let key = &self.key;
        self.state
            .send_modify(|snapshot| snapshot.loading_mut().end(key));
    }
}
