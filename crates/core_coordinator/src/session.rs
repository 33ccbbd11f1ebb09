use std::collections::BTreeMap;
use std::sync::Arc;

use core_types::{
    ConnectionStrategy, GatewayError, IntegrationId, IntegrationSet, IntegrationStatusRecord,
    IssueTrackerCredentials, IssueTrackerDataKind, RemoteGateway, ServiceDataCache, TaskAnalysis,
    TaskList, TaskSummary, WeeklySummary,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::loading::{LoadingGuard, LoadingSet, OperationKey, TracksLoading};
use crate::log_gateway_failure;

/// Integrations the gateway serves record lists for.
pub const DATA_BACKED_SERVICES: [IntegrationId; 3] = [
    IntegrationId::Mail,
    IntegrationId::Calendar,
    IntegrationId::FileStorage,
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub integrations: IntegrationSet,
    pub status_records: Vec<IntegrationStatusRecord>,
    pub service_data: ServiceDataCache,
    pub issue_tracker: BTreeMap<IssueTrackerDataKind, Vec<Value>>,
    pub task_summary: Option<TaskSummary>,
    pub task_analysis: Option<TaskAnalysis>,
    pub weekly_summary: Option<WeeklySummary>,
    pub all_tasks: Option<TaskList>,
    /// Authorize URL from the last connect that needed interactive login.
    pub pending_authorization: Option<String>,
    pub loading: LoadingSet,
}

impl TracksLoading for SessionSnapshot {
    fn loading_mut(&mut self) -> &mut LoadingSet {
        &mut self.loading
    }
}

/// Holds which integrations are connected plus the per-service data caches
/// for one signed-in user, and mediates every connect, disconnect, sync and
/// fetch intent.
///
/// No operation returns an error. Failures are logged and show up only as
/// unchanged or emptied state.
pub struct SessionCoordinator {
    gateway: Arc<dyn RemoteGateway>,
    state: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionCoordinator {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self {
            gateway,
            state: Arc::new(tx),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn is_connected(&self, id: &IntegrationId) -> bool {
        self.state.borrow().integrations.is_connected(id)
    }

    fn begin(&self, key: OperationKey) -> LoadingGuard<SessionSnapshot> {
        LoadingGuard::begin(&self.state, key)
    }

    /// Re-reads every status record and rebuilds the integration set from
    /// scratch. On failure the previous set stays.
    pub async fn refresh_status(&self) {
        let _loading = self.begin(OperationKey::RefreshStatus);
        match self.gateway.integration_status().await {
            Ok(records) => {
                let integrations = IntegrationSet::derive(&records);
                debug!(
                    records = records.len(),
                    connected = integrations.connected().count(),
                    "integration status refreshed"
                );
                self.state.send_modify(|snapshot| {
                    snapshot.integrations = integrations;
                    snapshot.status_records = records;
                    snapshot.pending_authorization = None;
                });
            }
            Err(err) => log_gateway_failure("refresh_status", &err),
        }
    }

    pub async fn connect_integration(
        &self,
        id: IntegrationId,
        credentials: Option<IssueTrackerCredentials>,
    ) {
        let _loading = self.begin(OperationKey::Connect(id.clone()));
        match id.strategy() {
            ConnectionStrategy::MailSuite => match self.gateway.check_mail_suite_auth().await {
                Ok(()) => self.refresh_status().await,
                Err(GatewayError::AuthRequired { authorize_url }) => {
                    warn!(
                        integration = %id,
                        authorize_url = authorize_url.as_deref().unwrap_or_default(),
                        "mail suite connect needs interactive login"
                    );
                    self.state.send_modify(|snapshot| {
                        snapshot.pending_authorization = authorize_url;
                    });
                }
                Err(err) => log_gateway_failure("connect_integration", &err),
            },
            ConnectionStrategy::IssueTracker => {
                let Some(credentials) = credentials else {
                    warn!(integration = %id, "issue tracker connect requires credentials");
                    return;
                };
                match self.gateway.connect_issue_tracker(&credentials).await {
                    Ok(()) => {
                        info!(integration = %id, domain = %credentials.domain, "issue tracker connected");
                        self.refresh_status().await;
                    }
                    Err(err) => log_gateway_failure("connect_integration", &err),
                }
            }
            ConnectionStrategy::LocalOnly => {
                debug!(integration = %id, "marking integration connected locally");
                self.state
                    .send_modify(|snapshot| snapshot.integrations.set(id.clone(), true));
            }
        }
    }

    pub async fn disconnect_integration(&self, id: IntegrationId) {
        let _loading = self.begin(OperationKey::Disconnect(id.clone()));
        match id.strategy() {
            ConnectionStrategy::MailSuite => match self.gateway.disconnect_mail_suite().await {
                Ok(()) => {
                    info!(integration = %id, "mail suite disconnected");
                    self.refresh_status().await;
                }
                Err(err) => log_gateway_failure("disconnect_integration", &err),
            },
            // The gateway has no issue-tracker disconnect endpoint; only the
            // local flag changes and the next refresh may turn it back on.
            ConnectionStrategy::IssueTracker | ConnectionStrategy::LocalOnly => {
                debug!(integration = %id, "marking integration disconnected locally");
                self.state
                    .send_modify(|snapshot| snapshot.integrations.set(id.clone(), false));
            }
        }
    }

    /// Asks the gateway to sync every integration. Status is refreshed only
    /// when the sync itself succeeded.
    pub async fn sync_all(&self) {
        let _loading = self.begin(OperationKey::SyncAll);
        match self.gateway.sync_all().await {
            Ok(report) => {
                info!(
                    services = report.results.len(),
                    timestamp = report.timestamp.as_deref().unwrap_or_default(),
                    "sync finished"
                );
                self.refresh_status().await;
            }
            Err(err) => log_gateway_failure("sync_all", &err),
        }
    }

    /// Replaces the cached records for `service`. A failed or malformed
    /// fetch leaves the slot empty instead of stale.
    pub async fn fetch_service_data(&self, service: IntegrationId) {
        let _loading = self.begin(OperationKey::FetchService(service.clone()));
        let records = match self.gateway.service_data(&service).await {
            Ok(records) => records,
            Err(err) => {
                log_gateway_failure("fetch_service_data", &err);
                Vec::new()
            }
        };
        debug!(integration = %service, records = records.len(), "service data cached");
        self.state.send_modify(|snapshot| {
            snapshot.service_data.insert(service, records);
        });
    }

    pub async fn fetch_issue_tracker_data(&self, kind: IssueTrackerDataKind) {
        let _loading = self.begin(OperationKey::FetchIssueTracker(kind));
        let records = match self.gateway.issue_tracker_data(kind).await {
            Ok(records) => records,
            Err(err) => {
                log_gateway_failure("fetch_issue_tracker_data", &err);
                Vec::new()
            }
        };
        debug!(%kind, records = records.len(), "issue tracker data cached");
        self.state.send_modify(|snapshot| {
            snapshot.issue_tracker.insert(kind, records);
        });
    }

    /// On failure the previous summary is kept.
    pub async fn fetch_task_summary(&self) {
        let _loading = self.begin(OperationKey::TaskSummary);
        match self.gateway.task_summary().await {
            Ok(summary) => self
                .state
                .send_modify(|snapshot| snapshot.task_summary = Some(summary)),
            Err(err) => log_gateway_failure("fetch_task_summary", &err),
        }
    }

    /// Task views below keep their previous value on failure, like the summary.
    pub async fn fetch_task_analysis(&self) {
        let _loading = self.begin(OperationKey::TaskAnalysis);
        match self.gateway.task_analysis().await {
            Ok(analysis) => {
                debug!(
                    priority = analysis.priority_tasks.len(),
                    recommendations = analysis.recommendations.len(),
                    "task analysis refreshed"
                );
                self.state
                    .send_modify(|snapshot| snapshot.task_analysis = Some(analysis));
            }
            Err(err) => log_gateway_failure("fetch_task_analysis", &err),
        }
    }

    pub async fn fetch_weekly_summary(&self) {
        let _loading = self.begin(OperationKey::WeeklySummary);
        match self.gateway.weekly_summary().await {
            Ok(summary) => self
                .state
                .send_modify(|snapshot| snapshot.weekly_summary = Some(summary)),
            Err(err) => log_gateway_failure("fetch_weekly_summary", &err),
        }
    }

    pub async fn fetch_all_tasks(&self) {
        let _loading = self.begin(OperationKey::AllTasks);
        match self.gateway.all_tasks().await {
            Ok(list) => {
                debug!(tasks = list.tasks.len(), total = list.total, "task list refreshed");
                self.state.send_modify(|snapshot| snapshot.all_tasks = Some(list));
            }
            Err(err) => log_gateway_failure("fetch_all_tasks", &err),
        }
    }

    /// Drops everything learned during the session. In-flight loading keys
    /// are left to their guards.
    pub fn teardown(&self) {
        self.state.send_modify(|snapshot| {
            let loading = std::mem::take(&mut snapshot.loading);
            *snapshot = SessionSnapshot {
                loading,
                ..SessionSnapshot::default()
            };
        });
    }
}
