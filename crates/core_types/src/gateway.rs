use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatReply, ChatRequest, ConversationSummary, StoredMessage};
use crate::error::GatewayResult;
use crate::integration::{
    IntegrationId, IntegrationStatusRecord, IssueTrackerCredentials, IssueTrackerDataKind,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Value,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncReport {
    #[serde(default, rename = "sync_results")]
    pub results: BTreeMap<String, Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskSummary {
    #[serde(default)]
    pub total_tasks: u32,
    #[serde(default)]
    pub urgent_tasks: u32,
    #[serde(default)]
    pub overdue_tasks: u32,
    #[serde(default)]
    pub completed_this_week: u32,
    #[serde(default)]
    pub upcoming_deadlines: Vec<Value>,
}

/// Model-produced triage of the user's tasks across every source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskAnalysis {
    #[serde(default)]
    pub priority_tasks: Vec<Value>,
    #[serde(default)]
    pub upcoming_deadlines: Vec<Value>,
    #[serde(default)]
    pub overdue_items: Vec<Value>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub time_blocks: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeeklySummary {
    pub summary: String,
    #[serde(default)]
    pub generated_at: Option<String>,
    /// Record count per source the summary was built from.
    #[serde(default)]
    pub data_sources: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<Value>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub services: BTreeMap<String, Value>,
}

/// The backend the coordinators talk to. Implementations only extract the
/// documented fields and classify failures; they keep no dashboard state.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn integration_status(&self) -> GatewayResult<Vec<IntegrationStatusRecord>>;
    async fn service_data(&self, service: &IntegrationId) -> GatewayResult<Vec<Value>>;
    async fn issue_tracker_data(&self, kind: IssueTrackerDataKind) -> GatewayResult<Vec<Value>>;
    async fn check_mail_suite_auth(&self) -> GatewayResult<()>;
    async fn disconnect_mail_suite(&self) -> GatewayResult<()>;
    async fn connect_issue_tracker(
        &self,
        credentials: &IssueTrackerCredentials,
    ) -> GatewayResult<()>;
    async fn sync_all(&self) -> GatewayResult<SyncReport>;
    async fn send_chat(&self, request: &ChatRequest) -> GatewayResult<ChatReply>;
    async fn list_conversations(&self) -> GatewayResult<Vec<ConversationSummary>>;
    async fn conversation_messages(&self, thread_id: &str) -> GatewayResult<Vec<StoredMessage>>;
    async fn task_summary(&self) -> GatewayResult<TaskSummary>;
    async fn task_analysis(&self) -> GatewayResult<TaskAnalysis>;
    async fn weekly_summary(&self) -> GatewayResult<WeeklySummary>;
    async fn all_tasks(&self) -> GatewayResult<TaskList>;
    async fn verify_token(&self, token: &str) -> GatewayResult<UserProfile>;
    async fn logout(&self) -> GatewayResult<()>;
    async fn health(&self) -> GatewayResult<HealthReport>;

    /// Replaces the bearer token used for authenticated calls.
    fn set_session_token(&self, token: Option<String>);
}
