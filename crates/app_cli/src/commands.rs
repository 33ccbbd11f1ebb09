use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use config::{AppConfig, ConfigStore};
use core_coordinator::{DashboardSession, SessionOptions};
use core_types::{
    ConnectionStrategy, IntegrationId, IssueTrackerCredentials, IssueTrackerDataKind,
    RemoteGateway, Role,
};
use gateway_http::{HttpGateway, HttpGatewayOptions};
use i18n::I18n;
use secrets::{SecretSlot, SecretStore, default_secret_dir_from};
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::{Cli, Command, TaskView};

struct App {
    config: AppConfig,
    secrets: SecretStore,
    gateway: Arc<HttpGateway>,
    i18n: I18n,
}

impl App {
    fn load(cli: &Cli, data_dir: &Path) -> Result<Self> {
        let store = ConfigStore::from_default_location()?;
        let mut config = store.load_effective()?;
        info!(path = %store.path().display(), "config loaded");
        if let Some(url) = cli.gateway.as_deref() {
            config.gateway.base_url = url.to_string();
        }

        let password = secrets_password(
            config.security.local_encryption_enabled,
            cli.secrets_password.clone(),
        )?;
        let secrets = SecretStore::new(default_secret_dir_from(data_dir)).with_password(password);

        let gateway = HttpGateway::new(&HttpGatewayOptions {
            base_url: config.gateway.base_url.clone(),
            request_timeout: config.gateway.request_timeout(),
            connect_timeout: config.gateway.connect_timeout(),
        })?;
        info!(base_url = %config.gateway.base_url, "gateway configured");

        Ok(Self {
            i18n: I18n::new(config.language),
            config,
            secrets,
            gateway: Arc::new(gateway),
        })
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            language: self.config.language,
            include_context: self.config.chat.include_context,
        }
    }

    async fn sign_in(&self) -> Result<DashboardSession> {
        let Some(token) = self.secrets.session_token()? else {
            bail!("not signed in; run `dashboard login --token <TOKEN>` first");
        };
        DashboardSession::sign_in(self.gateway.clone(), &token, self.session_options()).await
    }
}

pub async fn run(cli: Cli, data_dir: &Path) -> Result<()> {
    let app = App::load(&cli, data_dir)?;

    match cli.command {
        Command::Health => {
            let report = app.gateway.health().await?;
            print_json(&report)
        }
        Command::Login { token } => {
            let session =
                DashboardSession::sign_in(app.gateway.clone(), &token, app.session_options())
                    .await?;
            app.secrets.store_session_token(token)?;
            print_json(session.user())
        }
        Command::Logout => {
            match app.sign_in().await {
                Ok(session) => session.logout().await,
                Err(err) => warn!(error = %err, "could not resume session for logout"),
            }
            app.secrets.clear(SecretSlot::SessionToken)?;
            println!("{}", app.i18n.t("session.signed_out"));
            Ok(())
        }
        Command::Status => {
            let session = app.sign_in().await?;
            session.session().refresh_status().await;
            print_status(&app, &session)
        }
        Command::Sync => {
            let session = app.sign_in().await?;
            session.session().sync_all().await;
            print_status(&app, &session)
        }
        Command::Tasks { view } => {
            let session = app.sign_in().await?;
            let coordinator = session.session();
            match view.unwrap_or(TaskView::Summary) {
                TaskView::Summary => {
                    coordinator.fetch_task_summary().await;
                    print_json(&coordinator.snapshot().task_summary)
                }
                TaskView::Analysis => {
                    coordinator.fetch_task_analysis().await;
                    print_json(&coordinator.snapshot().task_analysis)
                }
                TaskView::Weekly => {
                    coordinator.fetch_weekly_summary().await;
                    print_json(&coordinator.snapshot().weekly_summary)
                }
                TaskView::All => {
                    coordinator.fetch_all_tasks().await;
                    print_json(&coordinator.snapshot().all_tasks)
                }
            }
        }
        Command::Connect {
            integration,
            domain,
            email,
            api_token,
            save,
        } => {
            let id = IntegrationId::from(integration);
            let credentials = match id.strategy() {
                ConnectionStrategy::IssueTracker => {
                    Some(issue_tracker_credentials(&app, domain, email, api_token, save)?)
                }
                _ => None,
            };
            let session = app.sign_in().await?;
            session.session().refresh_status().await;
            session.session().connect_integration(id, credentials).await;

            let snapshot = session.session().snapshot();
            if let Some(url) = snapshot.pending_authorization.as_deref() {
                println!("{}: {url}", app.i18n.t("auth.required"));
                return Ok(());
            }
            print_status(&app, &session)
        }
        Command::Disconnect { integration } => {
            let session = app.sign_in().await?;
            session.session().refresh_status().await;
            session
                .session()
                .disconnect_integration(IntegrationId::from(integration))
                .await;
            print_status(&app, &session)
        }
        Command::Fetch { integration } => {
            let id = IntegrationId::from(integration);
            let session = app.sign_in().await?;
            if id == IntegrationId::IssueTracker {
                let kind = IssueTrackerDataKind::Issues;
                session.session().fetch_issue_tracker_data(kind).await;
                let snapshot = session.session().snapshot();
                return print_json(&snapshot.issue_tracker.get(&kind));
            }
            session.session().fetch_service_data(id.clone()).await;
            print_json(&session.session().snapshot().service_data.get(&id))
        }
        Command::Issues { kind } => {
            let kind: IssueTrackerDataKind = kind.into();
            let session = app.sign_in().await?;
            session.session().fetch_issue_tracker_data(kind).await;
            print_json(&session.session().snapshot().issue_tracker.get(&kind))
        }
        Command::Chat { thread } => {
            let session = app.sign_in().await?;
            if let Some(thread) = thread {
                session.conversation().open_thread(thread).await;
            }
            chat_loop(&app, &session).await
        }
    }
}

/// Encrypted mode never falls back to writing plain secrets.
fn secrets_password(encryption_enabled: bool, password: Option<String>) -> Result<Option<String>> {
    if !encryption_enabled {
        return Ok(None);
    }
    match password {
        Some(password) if !password.is_empty() => Ok(Some(password)),
        _ => bail!(
            "local encryption is enabled; pass --secrets-password or set DASHBOARD_SECRETS_PASSWORD"
        ),
    }
}

/// Flags win over the stored credentials. `--save` persists flag values.
fn issue_tracker_credentials(
    app: &App,
    domain: Option<String>,
    email: Option<String>,
    api_token: Option<String>,
    save: bool,
) -> Result<IssueTrackerCredentials> {
    match (domain, email, api_token) {
        (Some(domain), Some(email), Some(token)) => {
            let credentials = IssueTrackerCredentials {
                domain,
                email,
                token,
            };
            if save {
                app.secrets.store_issue_tracker_credentials(&credentials)?;
            }
            Ok(credentials)
        }
        (None, None, None) => app
            .secrets
            .issue_tracker_credentials()?
            .context("no stored issue tracker credentials; pass --domain, --email and --api-token"),
        _ => bail!("issue tracker connect needs --domain, --email and --api-token together"),
    }
}

fn print_status(app: &App, session: &DashboardSession) -> Result<()> {
    let snapshot = session.session().snapshot();
    let integrations: serde_json::Map<String, serde_json::Value> = snapshot
        .integrations
        .iter()
        .map(|(id, connected)| {
            let label = if connected {
                app.i18n.t("integration.connected")
            } else {
                app.i18n.t("integration.disconnected")
            };
            let value = json!({
                "connected": connected,
                "label": label,
                "inferred": id.is_inferred(),
            });
            (id.to_string(), value)
        })
        .collect();
    print_json(&json!({
        "user": session.user(),
        "integrations": integrations,
        "records": snapshot.status_records,
    }))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{text}");
    Ok(())
}

async fn chat_loop(app: &App, session: &DashboardSession) -> Result<()> {
    let conversation = session.conversation();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("{} ({})", app.i18n.t("app.title"), session.user().email);

    loop {
        stdout
            .write_all(format!("{}> ", app.i18n.t("chat.prompt")).as_bytes())
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                conversation.clear_messages();
                println!("{}", app.i18n.t("chat.cleared"));
            }
            "/threads" => {
                conversation.list_conversations().await;
                print_json(&conversation.snapshot().threads)?;
            }
            _ if line.starts_with("/open ") => {
                let thread = line.trim_start_matches("/open ").trim();
                conversation.open_thread(thread).await;
                for message in conversation.snapshot().messages {
                    print_message(app, message.role, &message.content);
                }
            }
            text => {
                conversation.send_message(text).await;
                if let Some(reply) = conversation
                    .snapshot()
                    .messages
                    .iter()
                    .rev()
                    .find(|message| message.role == Role::Assistant)
                {
                    print_message(app, reply.role, &reply.content);
                }
            }
        }
    }
    Ok(())
}

fn print_message(app: &App, role: Role, content: &str) {
    let speaker = match role {
        Role::User => app.i18n.t("chat.prompt"),
        Role::Assistant => app.i18n.t("chat.assistant"),
    };
    println!("{speaker}: {content}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_mode_requires_a_password() {
        let err = secrets_password(true, None).expect_err("must refuse");
        assert!(err.to_string().contains("DASHBOARD_SECRETS_PASSWORD"));
        assert!(secrets_password(true, Some(String::new())).is_err());
    }

    #[test]
    fn password_is_forwarded_only_in_encrypted_mode() {
        assert_eq!(
            secrets_password(true, Some("p@ss".into())).expect("password"),
            Some("p@ss".to_string())
        );
        assert_eq!(secrets_password(false, Some("p@ss".into())).expect("plain"), None);
        assert_eq!(secrets_password(false, None).expect("plain"), None);
    }
}
