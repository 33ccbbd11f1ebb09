use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use core_types::{
    ChatReply, ChatRequest, ConversationSummary, GatewayError, GatewayResult, HealthReport,
    IntegrationId, IntegrationStatusRecord, IssueTrackerCredentials, IssueTrackerDataKind,
    RemoteGateway, StoredMessage, SyncReport, TaskAnalysis, TaskList, TaskSummary, UserProfile,
    WeeklySummary,
};
use parking_lot::RwLock;
use reqwest::header::LOCATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url, redirect};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpGatewayOptions {
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpGatewayOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// [`RemoteGateway`] over the dashboard backend's HTTP API.
///
/// Redirects are never followed: the mail-suite auth check relies on seeing
/// the identity provider redirect itself.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl HttpGateway {
    pub fn new(options: &HttpGatewayOptions) -> Result<Self> {
        let base_url = Url::parse(options.base_url.trim())
            .with_context(|| format!("invalid gateway base url `{}`", options.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("gateway base url `{base_url}` cannot carry a path");
        }
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .redirect(redirect::Policy::none())
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url,
            token: RwLock::new(None),
        })
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        *self.token.write() = Some(token.into());
        self
    }

    fn url(&self, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::remote(segments.join("/"), None, "invalid base url"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> GatewayResult<RequestBuilder> {
        let builder = self.client.request(method, self.url(segments)?);
        Ok(match self.token.read().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(&self, endpoint: &str, builder: RequestBuilder) -> GatewayResult<Response> {
        debug!(endpoint, "gateway request");
        let response = builder.send().await.map_err(|err| {
            let detail = if err.is_timeout() {
                "request timed out".to_string()
            } else {
                err.to_string()
            };
            GatewayError::remote(endpoint, None, detail)
        })?;
        classify(endpoint, response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> GatewayResult<T> {
        let endpoint = segments.join("/");
        let builder = self.request(Method::GET, segments)?.query(query);
        let response = self.send(&endpoint, builder).await?;
        decode(&endpoint, response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &Value,
    ) -> GatewayResult<T> {
        let endpoint = segments.join("/");
        let builder = self.request(Method::POST, segments)?.json(body);
        let response = self.send(&endpoint, builder).await?;
        decode(&endpoint, response).await
    }

    async fn post_ack(&self, segments: &[&str], body: Option<&Value>) -> GatewayResult<()> {
        let endpoint = segments.join("/");
        let mut builder = self.request(Method::POST, segments)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(&endpoint, builder).await.map(|_| ())
    }

    async fn data_records(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> GatewayResult<Vec<Value>> {
        let envelope: DataEnvelope = self.get_json(segments, query).await?;
        match envelope.data {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(GatewayError::malformed(
                segments.join("/"),
                "missing `data` array",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    user: UserProfile,
}

/// Query value the backend expects for a mail-suite product.
fn service_query_name(service: &IntegrationId) -> &str {
    match service {
        IntegrationId::Mail => "gmail",
        IntegrationId::FileStorage => "drive",
        other => other.as_str(),
    }
}

async fn classify(endpoint: &str, response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        warn!(endpoint, %status, "gateway rejected session credentials");
        return Err(GatewayError::AuthRequired {
            authorize_url: None,
        });
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::remote(
        endpoint,
        Some(status.as_u16()),
        error_detail(&body),
    ))
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> GatewayResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|err| GatewayError::remote(endpoint, None, err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| GatewayError::malformed(endpoint, err.to_string()))
}

/// Pulls the human-readable message out of a backend error body.
fn error_detail(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = parsed
        .as_ref()
        .and_then(|value| value.get("detail").or_else(|| value.get("message")));
    match field {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None if body.trim().is_empty() => "no error detail".to_string(),
        None => body.trim().to_string(),
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn integration_status(&self) -> GatewayResult<Vec<IntegrationStatusRecord>> {
        self.get_json(&["integrations", "status"], &[]).await
    }

    async fn service_data(&self, service: &IntegrationId) -> GatewayResult<Vec<Value>> {
        self.data_records(
            &["integrations", "google", "data"],
            &[("service", service_query_name(service))],
        )
        .await
    }

    async fn issue_tracker_data(&self, kind: IssueTrackerDataKind) -> GatewayResult<Vec<Value>> {
        self.data_records(
            &["integrations", "jira", "data"],
            &[("data_type", kind.as_str())],
        )
        .await
    }

    async fn check_mail_suite_auth(&self) -> GatewayResult<()> {
        let endpoint = "auth/google";
        let builder = self.request(Method::GET, &["auth", "google"])?;
        let response = builder
            .send()
            .await
            .map_err(|err| GatewayError::remote(endpoint, None, err.to_string()))?;
        if response.status().is_redirection() {
            let authorize_url = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Err(GatewayError::AuthRequired { authorize_url });
        }
        classify(endpoint, response).await.map(|_| ())
    }

    async fn disconnect_mail_suite(&self) -> GatewayResult<()> {
        self.post_ack(&["integrations", "google", "disconnect"], None)
            .await
    }

    async fn connect_issue_tracker(
        &self,
        credentials: &IssueTrackerCredentials,
    ) -> GatewayResult<()> {
        let body = json!({
            "domain": credentials.domain,
            "email": credentials.email,
            "token": credentials.token,
        });
        self.post_ack(&["integrations", "jira", "connect"], Some(&body))
            .await
    }

    async fn sync_all(&self) -> GatewayResult<SyncReport> {
        self.get_json(&["integrations", "sync"], &[]).await
    }

    async fn send_chat(&self, request: &ChatRequest) -> GatewayResult<ChatReply> {
        let body = serde_json::to_value(request)
            .map_err(|err| GatewayError::malformed("chat", err.to_string()))?;
        self.post_json(&["chat", ""], &body).await
    }

    async fn list_conversations(&self) -> GatewayResult<Vec<ConversationSummary>> {
        self.get_json(&["chat", "conversations"], &[]).await
    }

    async fn conversation_messages(&self, thread_id: &str) -> GatewayResult<Vec<StoredMessage>> {
        self.get_json(&["chat", "conversations", thread_id, "messages"], &[])
            .await
    }

    async fn task_summary(&self) -> GatewayResult<TaskSummary> {
        self.get_json(&["tasks", "summary"], &[]).await
    }

    async fn task_analysis(&self) -> GatewayResult<TaskAnalysis> {
        self.get_json(&["tasks", "analysis"], &[]).await
    }

    async fn weekly_summary(&self) -> GatewayResult<WeeklySummary> {
        self.get_json(&["tasks", "weekly-summary"], &[]).await
    }

    async fn all_tasks(&self) -> GatewayResult<TaskList> {
        self.get_json(&["tasks", "all"], &[]).await
    }

    async fn verify_token(&self, token: &str) -> GatewayResult<UserProfile> {
        let endpoint = "auth/token";
        let builder = self
            .client
            .post(self.url(&["auth", "token"])?)
            .json(&json!({ "token": token }));
        let response = self.send(endpoint, builder).await?;
        let parsed: TokenResponse = decode(endpoint, response).await?;
        Ok(parsed.user)
    }

    async fn logout(&self) -> GatewayResult<()> {
        self.post_ack(&["auth", "logout"], None).await
    }

    async fn health(&self) -> GatewayResult<HealthReport> {
        self.get_json(&["health"], &[]).await
    }

    fn set_session_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

#[cfg(test)]
mod tests {
    use core_types::{ChatTurn, Role};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn gateway(server: &MockServer) -> HttpGateway {
        HttpGateway::new(&HttpGatewayOptions {
            base_url: server.uri(),
            request_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_millis(500),
        })
        .expect("gateway")
        .with_token("jwt-1")
    }

    #[tokio::test]
    async fn fetches_status_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integrations/status"))
            .and(header("Authorization", "Bearer jwt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"service": "google", "connected": true, "last_sync": "2025-03-01T09:30:00"},
                {"service": "jira", "connected": false, "error": "bad token"}
            ])))
            .mount(&server)
            .await;

        let records = gateway(&server).integration_status().await.expect("status");

        assert_eq!(records.len(), 2);
        assert!(records[0].connected);
        assert_eq!(records[1].error.as_deref(), Some("bad token"));
    }

    #[tokio::test]
    async fn maps_mail_to_backend_service_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integrations/google/data"))
            .and(query_param("service", "gmail"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"service": "gmail", "data": [{"id": "m1"}]})),
            )
            .mount(&server)
            .await;

        let records = gateway(&server)
            .service_data(&IntegrationId::Mail)
            .await
            .expect("data");

        assert_eq!(records, vec![json!({"id": "m1"})]);
    }

    #[tokio::test]
    async fn missing_data_field_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integrations/jira/data"))
            .and(query_param("data_type", "projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data_type": "projects"})))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .issue_tracker_data(IssueTrackerDataKind::Projects)
            .await
            .expect_err("malformed");

        assert!(matches!(err, GatewayError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_required() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/summary"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid"})))
            .mount(&server)
            .await;

        let err = gateway(&server).task_summary().await.expect_err("401");

        assert!(err.is_auth_required());
    }

    #[tokio::test]
    async fn task_views_decode_their_envelopes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/analysis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "priority_tasks": [{"title": "Ship release"}],
                "upcoming_deadlines": [],
                "overdue_items": [],
                "recommendations": ["Block mornings for deep work"],
                "time_blocks": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/weekly-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "summary": "Busy week",
                "generated_at": "2025-03-07T17:00:00",
                "data_sources": {"emails": 12, "events": 4, "issues": 7}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tasks": [{"id": "ACME-1"}, {"id": "evt-2"}],
                "total": 2
            })))
            .mount(&server)
            .await;
        let gateway = gateway(&server);

        let analysis = gateway.task_analysis().await.expect("analysis");
        let weekly = gateway.weekly_summary().await.expect("weekly");
        let all = gateway.all_tasks().await.expect("all");

        assert_eq!(analysis.priority_tasks.len(), 1);
        assert_eq!(analysis.recommendations, vec!["Block mornings for deep work"]);
        assert_eq!(weekly.summary, "Busy week");
        assert_eq!(weekly.data_sources.get("issues"), Some(&7));
        assert_eq!(all.total, 2);
        assert_eq!(all.tasks.len(), 2);
    }

    #[tokio::test]
    async fn weekly_summary_without_text_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/weekly-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"generated_at": "now"})))
            .mount(&server)
            .await;

        let err = gateway(&server).weekly_summary().await.expect_err("malformed");

        assert!(matches!(err, GatewayError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn server_error_carries_detail_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integrations/sync"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"error": true, "message": "Internal server error"})),
            )
            .mount(&server)
            .await;

        let err = gateway(&server).sync_all().await.expect_err("500");

        assert_eq!(
            err,
            GatewayError::RemoteCallFailed {
                endpoint: "integrations/sync".into(),
                status: Some(500),
                detail: "Internal server error".into(),
            }
        );
    }

    #[tokio::test]
    async fn auth_check_redirect_requires_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/google"))
            .respond_with(
                ResponseTemplate::new(307)
                    .insert_header("Location", "https://accounts.example.com/o/oauth2/auth"),
            )
            .mount(&server)
            .await;

        let err = gateway(&server)
            .check_mail_suite_auth()
            .await
            .expect_err("redirect");

        assert_eq!(
            err,
            GatewayError::AuthRequired {
                authorize_url: Some("https://accounts.example.com/o/oauth2/auth".into()),
            }
        );
    }

    #[tokio::test]
    async fn auth_check_success_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/google"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        gateway(&server)
            .check_mail_suite_auth()
            .await
            .expect("authorized");
    }

    #[tokio::test]
    async fn connect_issue_tracker_posts_credentials_and_surfaces_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/integrations/jira/connect"))
            .and(body_json(json!({
                "domain": "acme.atlassian.net",
                "email": "dev@acme.io",
                "token": "tok"
            })))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"detail": "JIRA rejected token"})),
            )
            .mount(&server)
            .await;

        let err = gateway(&server)
            .connect_issue_tracker(&IssueTrackerCredentials {
                domain: "acme.atlassian.net".into(),
                email: "dev@acme.io".into(),
                token: "tok".into(),
            })
            .await
            .expect_err("rejected");

        assert!(err.to_string().contains("JIRA rejected token"));
    }

    #[tokio::test]
    async fn chat_round_trip_uses_trailing_slash_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/"))
            .and(body_json(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "thread_id": "t-1",
                "include_context": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "hello",
                "thread_id": "t-1",
                "context_used": true,
                "tokens": 12
            })))
            .mount(&server)
            .await;

        let reply = gateway(&server)
            .send_chat(&ChatRequest {
                messages: vec![ChatTurn {
                    role: Role::User,
                    content: "hi".into(),
                }],
                thread_id: Some("t-1".into()),
                include_context: true,
            })
            .await
            .expect("reply");

        assert_eq!(reply.message, "hello");
        assert!(reply.context_used);
    }

    #[tokio::test]
    async fn thread_id_is_escaped_in_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/conversations/user%201/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "content": "hello", "role": "user", "created_at": "2025-03-01T09:30:00"}
            ])))
            .mount(&server)
            .await;

        let rows = gateway(&server)
            .conversation_messages("user 1")
            .await
            .expect("rows");

        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn verify_token_returns_user_without_session_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .and(body_json(json!({"token": "fresh"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "token_type": "bearer",
                "user": {"id": 3, "email": "dev@acme.io", "name": "Dev"}
            })))
            .mount(&server)
            .await;

        let user = gateway(&server).verify_token("fresh").await.expect("user");

        assert_eq!(user.email, "dev@acme.io");
        let requests = server.received_requests().await.expect("recorded");
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn slow_gateway_times_out_as_remote_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "healthy"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = gateway(&server).health().await.expect_err("timeout");

        assert!(matches!(
            err,
            GatewayError::RemoteCallFailed { status: None, .. }
        ));
    }

    #[test]
    fn rejects_non_hierarchical_base_url() {
        let result = HttpGateway::new(&HttpGatewayOptions {
            base_url: "mailto:ops@example.com".into(),
            ..HttpGatewayOptions::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn error_detail_prefers_structured_fields() {
        assert_eq!(error_detail(r#"{"detail": "nope"}"#), "nope");
        assert_eq!(error_detail("plain failure"), "plain failure");
        assert_eq!(error_detail(""), "no error detail");
    }
}
