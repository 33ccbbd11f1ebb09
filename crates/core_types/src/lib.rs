pub mod chat;
pub mod error;
pub mod gateway;
pub mod integration;
pub mod timestamp;

use serde::{Deserialize, Serialize};

pub use chat::{
    Attachment, ChatReply, ChatRequest, ChatTurn, ConversationSummary, Message, MessageId, Role,
    StoredMessage, ThreadId,
};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{
    HealthReport, RemoteGateway, SyncReport, TaskAnalysis, TaskList, TaskSummary, UserProfile,
    WeeklySummary,
};
pub use integration::{
    ConnectionStrategy, IntegrationFamily, IntegrationId, IntegrationSet, IntegrationStatusRecord,
    IssueTrackerCredentials, IssueTrackerDataKind, ServiceDataCache,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum UiLanguage {
    #[default]
    EnUs,
    ZhCn,
}

impl UiLanguage {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "en_us" | "en" => Some(UiLanguage::EnUs),
            "zh_cn" | "zh" => Some(UiLanguage::ZhCn),
            _ => None,
        }
    }
}
