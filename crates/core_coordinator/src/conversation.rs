use std::sync::Arc;

use core_types::{
    Attachment, ChatRequest, ConversationSummary, Message, RemoteGateway, StoredMessage, ThreadId,
    UiLanguage,
};
use i18n::I18n;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::loading::{LoadingGuard, LoadingSet, OperationKey, TracksLoading};
use crate::log_gateway_failure;

#[derive(Debug, Clone)]
pub struct ConversationOptions {
    pub include_context: bool,
    pub fallback_message: String,
}

impl ConversationOptions {
    pub fn new(language: UiLanguage, include_context: bool) -> Self {
        Self {
            include_context,
            fallback_message: I18n::new(language).t("chat.fallback_error").to_string(),
        }
    }
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self::new(UiLanguage::default(), true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub thread_id: Option<ThreadId>,
    pub threads: Vec<ConversationSummary>,
    pub loading: LoadingSet,
    /// Bumped whenever history is replaced so late replies can tell they
    /// belong to a history that no longer exists.
    #[serde(skip)]
    epoch: u64,
}

impl TracksLoading for ConversationSnapshot {
    fn loading_mut(&mut self) -> &mut LoadingSet {
        &mut self.loading
    }
}

/// Owns the message history and the server thread it belongs to.
///
/// Sends are serialized: a send waits for the previous one to resolve before
/// appending its user message, so every request carries the full preceding
/// exchange. History only grows, except through [`clear_messages`] and
/// [`open_thread`], which replace it together with the thread id.
///
/// [`clear_messages`]: ConversationCoordinator::clear_messages
/// [`open_thread`]: ConversationCoordinator::open_thread
pub struct ConversationCoordinator {
    gateway: Arc<dyn RemoteGateway>,
    state: Arc<watch::Sender<ConversationSnapshot>>,
    turn_gate: Mutex<()>,
    options: ConversationOptions,
}

impl ConversationCoordinator {
    pub fn new(gateway: Arc<dyn RemoteGateway>, options: ConversationOptions) -> Self {
        let (tx, _rx) = watch::channel(ConversationSnapshot::default());
        Self {
            gateway,
            state: Arc::new(tx),
            turn_gate: Mutex::new(()),
            options,
        }
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.state.subscribe()
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.state.borrow().thread_id.clone()
    }

    pub async fn send_message(&self, text: impl Into<String>) {
        self.send_message_with_attachments(text, Vec::new()).await;
    }

    pub async fn send_message_with_attachments(
        &self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) {
        let text = text.into();
        if text.trim().is_empty() && attachments.is_empty() {
            debug!("ignoring empty chat message");
            return;
        }

        let _turn = self.turn_gate.lock().await;
        let _loading = LoadingGuard::begin(&self.state, OperationKey::SendMessage);

        let user_message = Message::user(text).with_attachments(attachments);
        let include_context = self.options.include_context;
        let mut request = None;
        let mut epoch = 0;
        self.state.send_modify(|snapshot| {
            snapshot.messages.push(user_message);
            epoch = snapshot.epoch;
            request = Some(ChatRequest {
                messages: snapshot.messages.iter().map(Message::to_turn).collect(),
                thread_id: snapshot.thread_id.clone(),
                include_context,
            });
        });
        let Some(request) = request else {
            return;
        };

        let (reply, thread_id) = match self.gateway.send_chat(&request).await {
            Ok(reply) => {
                let mut message = Message::assistant(reply.message);
                message.context_used = reply.context_used;
                (message, Some(reply.thread_id))
            }
            Err(err) => {
                log_gateway_failure("send_message", &err);
                (Message::assistant(self.options.fallback_message.clone()), None)
            }
        };

        let applied = self.state.send_if_modified(|snapshot| {
            if snapshot.epoch != epoch {
                return false;
            }
            if let Some(thread_id) = thread_id {
                if snapshot.thread_id.is_none() {
                    info!(%thread_id, "conversation thread established");
                }
                snapshot.thread_id = Some(thread_id);
            }
            snapshot.messages.push(reply);
            true
        });
        if !applied {
            debug!("history replaced while reply was in flight; reply dropped");
        }
    }

    /// Empties the history and forgets the thread id in one step.
    pub fn clear_messages(&self) {
        self.state.send_modify(|snapshot| {
            snapshot.messages.clear();
            snapshot.thread_id = None;
            snapshot.epoch += 1;
        });
    }

    /// Fetches the user's recent server-side threads into the snapshot.
    pub async fn list_conversations(&self) {
        let _loading = LoadingGuard::begin(&self.state, OperationKey::ListConversations);
        match self.gateway.list_conversations().await {
            Ok(threads) => {
                debug!(threads = threads.len(), "conversation list refreshed");
                self.state.send_modify(|snapshot| snapshot.threads = threads);
            }
            Err(err) => log_gateway_failure("list_conversations", &err),
        }
    }

    /// Replaces local history with the stored messages of `thread_id` and
    /// continues that thread. On failure the current history stays.
    pub async fn open_thread(&self, thread_id: impl Into<ThreadId>) {
        let thread_id = thread_id.into();
        let _turn = self.turn_gate.lock().await;
        let _loading =
            LoadingGuard::begin(&self.state, OperationKey::OpenThread(thread_id.clone()));

        match self.gateway.conversation_messages(&thread_id).await {
            Ok(rows) => {
                let messages: Vec<Message> =
                    rows.iter().filter_map(StoredMessage::to_message).collect();
                info!(%thread_id, messages = messages.len(), "conversation thread opened");
                self.state.send_modify(|snapshot| {
                    snapshot.messages = messages;
                    snapshot.thread_id = Some(thread_id);
                    snapshot.epoch += 1;
                });
            }
            Err(err) => log_gateway_failure("open_thread", &err),
        }
    }
}
