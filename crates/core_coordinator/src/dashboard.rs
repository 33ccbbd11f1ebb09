use std::sync::Arc;

use anyhow::{Context, Result};
use core_types::{IntegrationId, IssueTrackerDataKind, RemoteGateway, UiLanguage, UserProfile};
use futures::future::join_all;
use tracing::{info, warn};

use crate::conversation::{ConversationCoordinator, ConversationOptions};
use crate::session::{DATA_BACKED_SERVICES, SessionCoordinator};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub language: UiLanguage,
    pub include_context: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            language: UiLanguage::default(),
            include_context: true,
        }
    }
}

/// Everything that lives for one signed-in user. Built once after sign-in
/// and handed to the presentation layer; [`logout`](Self::logout) consumes it.
pub struct DashboardSession {
    gateway: Arc<dyn RemoteGateway>,
    user: UserProfile,
    session: SessionCoordinator,
    conversation: ConversationCoordinator,
}

impl DashboardSession {
    /// Verifies `token` with the gateway and starts a session for its owner.
    pub async fn sign_in(
        gateway: Arc<dyn RemoteGateway>,
        token: &str,
        options: SessionOptions,
    ) -> Result<Self> {
        let user = gateway
            .verify_token(token)
            .await
            .context("failed to verify session token")?;
        gateway.set_session_token(Some(token.to_string()));
        info!(email = %user.email, "session started");
        Ok(Self::new(gateway, user, options))
    }

    pub fn new(gateway: Arc<dyn RemoteGateway>, user: UserProfile, options: SessionOptions) -> Self {
        Self {
            session: SessionCoordinator::new(gateway.clone()),
            conversation: ConversationCoordinator::new(
                gateway.clone(),
                ConversationOptions::new(options.language, options.include_context),
            ),
            gateway,
            user,
        }
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn session(&self) -> &SessionCoordinator {
        &self.session
    }

    pub fn conversation(&self) -> &ConversationCoordinator {
        &self.conversation
    }

    /// First load after the dashboard appears: status, then data for every
    /// connected service plus the task summary, fetched concurrently.
    pub async fn mount(&self) {
        self.session.refresh_status().await;

        let service_fetches = join_all(
            DATA_BACKED_SERVICES
                .into_iter()
                .filter(|id| self.session.is_connected(id))
                .map(|id| self.session.fetch_service_data(id)),
        );
        let issues_fetch = async {
            if self.session.is_connected(&IntegrationId::IssueTracker) {
                self.session
                    .fetch_issue_tracker_data(IssueTrackerDataKind::Issues)
                    .await;
            }
        };
        futures::join!(service_fetches, issues_fetch, self.session.fetch_task_summary());
    }

    /// Ends the session. The gateway is told best-effort; local state is torn
    /// down either way.
    pub async fn logout(self) {
        if let Err(err) = self.gateway.logout().await {
            warn!(error = %err, "gateway logout failed; clearing local session anyway");
        }
        self.gateway.set_session_token(None);
        self.session.teardown();
        self.conversation.clear_messages();
        info!(email = %self.user.email, "session ended");
    }
}
