use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use core_types::{
    ChatReply, ChatRequest, ConversationSummary, GatewayResult, HealthReport, IntegrationId,
    IntegrationStatusRecord, IssueTrackerCredentials, IssueTrackerDataKind, RemoteGateway,
    StoredMessage, SyncReport, TaskAnalysis, TaskList, TaskSummary, UserProfile, WeeklySummary,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Notify;

/// Scripted in-memory gateway that records the name of every call.
pub struct FakeGateway {
    calls: Mutex<Vec<&'static str>>,
    holds: Mutex<HashMap<&'static str, Arc<Notify>>>,
    status: Mutex<GatewayResult<Vec<IntegrationStatusRecord>>>,
    service_data: Mutex<GatewayResult<Vec<Value>>>,
    issue_tracker_data: Mutex<GatewayResult<Vec<Value>>>,
    auth_check: Mutex<GatewayResult<()>>,
    disconnect_mail_suite: Mutex<GatewayResult<()>>,
    connect_issue_tracker: Mutex<GatewayResult<()>>,
    sync: Mutex<GatewayResult<SyncReport>>,
    task_summary: Mutex<GatewayResult<TaskSummary>>,
    task_analysis: Mutex<GatewayResult<TaskAnalysis>>,
    weekly_summary: Mutex<GatewayResult<WeeklySummary>>,
    all_tasks: Mutex<GatewayResult<TaskList>>,
    verify: Mutex<GatewayResult<UserProfile>>,
    logout: Mutex<GatewayResult<()>>,
    conversations: Mutex<GatewayResult<Vec<ConversationSummary>>>,
    conversation_messages: Mutex<GatewayResult<Vec<StoredMessage>>>,
    chat_replies: Mutex<VecDeque<GatewayResult<ChatReply>>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    credentials: Mutex<Option<IssueTrackerCredentials>>,
    token: Mutex<Option<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            holds: Mutex::new(HashMap::new()),
            status: Mutex::new(Ok(Vec::new())),
            service_data: Mutex::new(Ok(Vec::new())),
            issue_tracker_data: Mutex::new(Ok(Vec::new())),
            auth_check: Mutex::new(Ok(())),
            disconnect_mail_suite: Mutex::new(Ok(())),
            connect_issue_tracker: Mutex::new(Ok(())),
            sync: Mutex::new(Ok(SyncReport::default())),
            task_summary: Mutex::new(Ok(TaskSummary::default())),
            task_analysis: Mutex::new(Ok(TaskAnalysis::default())),
            weekly_summary: Mutex::new(Ok(WeeklySummary::default())),
            all_tasks: Mutex::new(Ok(TaskList::default())),
            verify: Mutex::new(Ok(UserProfile {
                id: json!(1),
                email: "user@example.com".into(),
                name: None,
            })),
            logout: Mutex::new(Ok(())),
            conversations: Mutex::new(Ok(Vec::new())),
            conversation_messages: Mutex::new(Ok(Vec::new())),
            chat_replies: Mutex::new(VecDeque::new()),
            chat_requests: Mutex::new(Vec::new()),
            credentials: Mutex::new(None),
            token: Mutex::new(None),
        }
    }

    /// Makes the next calls to `name` wait until the returned handle is notified.
    pub fn hold(&self, name: &'static str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.holds.lock().insert(name, notify.clone());
        notify
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().clone()
    }

    pub fn last_credentials(&self) -> Option<IssueTrackerCredentials> {
        self.credentials.lock().clone()
    }

    pub fn session_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    pub fn set_status(&self, value: GatewayResult<Vec<IntegrationStatusRecord>>) {
        *self.status.lock() = value;
    }

    pub fn set_service_data(&self, value: GatewayResult<Vec<Value>>) {
        *self.service_data.lock() = value;
    }

    pub fn set_issue_tracker_data(&self, value: GatewayResult<Vec<Value>>) {
        *self.issue_tracker_data.lock() = value;
    }

    pub fn set_auth_check(&self, value: GatewayResult<()>) {
        *self.auth_check.lock() = value;
    }

    pub fn set_disconnect_mail_suite(&self, value: GatewayResult<()>) {
        *self.disconnect_mail_suite.lock() = value;
    }

    pub fn set_connect_issue_tracker(&self, value: GatewayResult<()>) {
        *self.connect_issue_tracker.lock() = value;
    }

    pub fn set_sync(&self, value: GatewayResult<SyncReport>) {
        *self.sync.lock() = value;
    }

    pub fn set_task_summary(&self, value: GatewayResult<TaskSummary>) {
        *self.task_summary.lock() = value;
    }

    pub fn set_task_analysis(&self, value: GatewayResult<TaskAnalysis>) {
        *self.task_analysis.lock() = value;
    }

    pub fn set_weekly_summary(&self, value: GatewayResult<WeeklySummary>) {
        *self.weekly_summary.lock() = value;
    }

    pub fn set_all_tasks(&self, value: GatewayResult<TaskList>) {
        *self.all_tasks.lock() = value;
    }

    pub fn set_verify(&self, value: GatewayResult<UserProfile>) {
        *self.verify.lock() = value;
    }

    pub fn set_logout(&self, value: GatewayResult<()>) {
        *self.logout.lock() = value;
    }

    pub fn set_conversations(&self, value: GatewayResult<Vec<ConversationSummary>>) {
        *self.conversations.lock() = value;
    }

    pub fn set_conversation_messages(&self, value: GatewayResult<Vec<StoredMessage>>) {
        *self.conversation_messages.lock() = value;
    }

    pub fn push_chat_reply(&self, value: GatewayResult<ChatReply>) {
        self.chat_replies.lock().push_back(value);
    }

    async fn enter(&self, name: &'static str) {
        self.calls.lock().push(name);
        let hold = self.holds.lock().get(name).cloned();
        if let Some(notify) = hold {
            notify.notified().await;
        }
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn integration_status(&self) -> GatewayResult<Vec<IntegrationStatusRecord>> {
        self.enter("integration_status").await;
        self.status.lock().clone()
    }

    async fn service_data(&self, _service: &IntegrationId) -> GatewayResult<Vec<Value>> {
        self.enter("service_data").await;
        self.service_data.lock().clone()
    }

    async fn issue_tracker_data(&self, _kind: IssueTrackerDataKind) -> GatewayResult<Vec<Value>> {
        self.enter("issue_tracker_data").await;
        self.issue_tracker_data.lock().clone()
    }

    async fn check_mail_suite_auth(&self) -> GatewayResult<()> {
        self.enter("check_mail_suite_auth").await;
        self.auth_check.lock().clone()
    }

    async fn disconnect_mail_suite(&self) -> GatewayResult<()> {
        self.enter("disconnect_mail_suite").await;
        self.disconnect_mail_suite.lock().clone()
    }

    async fn connect_issue_tracker(
        &self,
        credentials: &IssueTrackerCredentials,
    ) -> GatewayResult<()> {
        self.enter("connect_issue_tracker").await;
        *self.credentials.lock() = Some(credentials.clone());
        self.connect_issue_tracker.lock().clone()
    }

    async fn sync_all(&self) -> GatewayResult<SyncReport> {
        self.enter("sync_all").await;
        self.sync.lock().clone()
    }

    async fn send_chat(&self, request: &ChatRequest) -> GatewayResult<ChatReply> {
        self.chat_requests.lock().push(request.clone());
        self.enter("send_chat").await;
        let scripted = self.chat_replies.lock().pop_front();
        scripted.unwrap_or_else(|| {
            let last = request
                .messages
                .last()
                .map(|turn| turn.content.clone())
                .unwrap_or_default();
            Ok(ChatReply {
                message: format!("echo: {last}"),
                thread_id: "thread-default".into(),
                context_used: false,
            })
        })
    }

    async fn list_conversations(&self) -> GatewayResult<Vec<ConversationSummary>> {
        self.enter("list_conversations").await;
        self.conversations.lock().clone()
    }

    async fn conversation_messages(&self, _thread_id: &str) -> GatewayResult<Vec<StoredMessage>> {
        self.enter("conversation_messages").await;
        self.conversation_messages.lock().clone()
    }

    async fn task_summary(&self) -> GatewayResult<TaskSummary> {
        self.enter("task_summary").await;
        self.task_summary.lock().clone()
    }

    async fn task_analysis(&self) -> GatewayResult<TaskAnalysis> {
        self.enter("task_analysis").await;
        self.task_analysis.lock().clone()
    }

    async fn weekly_summary(&self) -> GatewayResult<WeeklySummary> {
        self.enter("weekly_summary").await;
        self.weekly_summary.lock().clone()
    }

    async fn all_tasks(&self) -> GatewayResult<TaskList> {
        self.enter("all_tasks").await;
        self.all_tasks.lock().clone()
    }

    async fn verify_token(&self, _token: &str) -> GatewayResult<UserProfile> {
        self.enter("verify_token").await;
        self.verify.lock().clone()
    }

    async fn logout(&self) -> GatewayResult<()> {
        self.enter("logout").await;
        self.logout.lock().clone()
    }

    async fn health(&self) -> GatewayResult<HealthReport> {
        self.enter("health").await;
        Ok(HealthReport {
            status: "healthy".into(),
            services: Default::default(),
        })
    }

    fn set_session_token(&self, token: Option<String>) {
        *self.token.lock() = token;
    }
}
