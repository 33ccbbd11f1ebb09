use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timestamp;

/// Identifier of a dashboard integration.
///
/// The eight named variants form the fixed set every [`IntegrationSet`] carries.
/// Anything else parses to [`IntegrationId::Other`] and is only ever toggled locally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntegrationId {
    Mail,
    Calendar,
    FileStorage,
    Spreadsheets,
    Presentations,
    Forms,
    IssueTracker,
    Wiki,
    Other(String),
}

impl IntegrationId {
    pub const KNOWN: [IntegrationId; 8] = [
        IntegrationId::Mail,
        IntegrationId::Calendar,
        IntegrationId::FileStorage,
        IntegrationId::Spreadsheets,
        IntegrationId::Presentations,
        IntegrationId::Forms,
        IntegrationId::IssueTracker,
        IntegrationId::Wiki,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            IntegrationId::Mail => "mail",
            IntegrationId::Calendar => "calendar",
            IntegrationId::FileStorage => "file-storage",
            IntegrationId::Spreadsheets => "spreadsheets",
            IntegrationId::Presentations => "presentations",
            IntegrationId::Forms => "forms",
            IntegrationId::IssueTracker => "issue-tracker",
            IntegrationId::Wiki => "wiki",
            IntegrationId::Other(name) => name,
        }
    }

    /// How connect/disconnect intents for this id reach the gateway.
    pub fn strategy(&self) -> ConnectionStrategy {
        match self {
            IntegrationId::Mail
            | IntegrationId::Calendar
            | IntegrationId::FileStorage
            | IntegrationId::Spreadsheets
            | IntegrationId::Presentations
            | IntegrationId::Forms => ConnectionStrategy::MailSuite,
            IntegrationId::IssueTracker => ConnectionStrategy::IssueTracker,
            IntegrationId::Wiki | IntegrationId::Other(_) => ConnectionStrategy::LocalOnly,
        }
    }

    /// True when the connected flag is copied from a family record instead of
    /// being checked on its own. The wiki has no status endpoint; it follows
    /// the issue tracker.
    pub fn is_inferred(&self) -> bool {
        matches!(self, IntegrationId::Wiki)
    }
}

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for IntegrationId {
    fn from(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        IntegrationId::KNOWN
            .iter()
            .find(|known| known.as_str() == normalized)
            .cloned()
            .unwrap_or_else(|| IntegrationId::Other(value.trim().to_string()))
    }
}

impl From<String> for IntegrationId {
    fn from(value: String) -> Self {
        IntegrationId::from(value.as_str())
    }
}

impl From<IntegrationId> for String {
    fn from(value: IntegrationId) -> Self {
        match value {
            IntegrationId::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for IntegrationId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(IntegrationId::from(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStrategy {
    /// One combined OAuth grant gates the whole suite.
    MailSuite,
    /// Connect forwards a credential bundle; disconnect is local-only.
    IssueTracker,
    /// No gateway involvement; the flag is flipped optimistically.
    LocalOnly,
}

/// A group of integration keys backed by one gateway status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationFamily {
    MailSuite,
    IssueTracker,
}

const MAIL_SUITE_MEMBERS: &[IntegrationId] = &[
    IntegrationId::Mail,
    IntegrationId::Calendar,
    IntegrationId::FileStorage,
    IntegrationId::Spreadsheets,
    IntegrationId::Presentations,
    IntegrationId::Forms,
];

const ISSUE_TRACKER_MEMBERS: &[IntegrationId] = &[IntegrationId::IssueTracker, IntegrationId::Wiki];

impl IntegrationFamily {
    pub fn from_service(service: &str) -> Option<Self> {
        match service.trim().to_ascii_lowercase().as_str() {
            "google" | "mail-suite-family" => Some(IntegrationFamily::MailSuite),
            "jira" | "issue-tracker" => Some(IntegrationFamily::IssueTracker),
            _ => None,
        }
    }

    pub fn members(self) -> &'static [IntegrationId] {
        match self {
            IntegrationFamily::MailSuite => MAIL_SUITE_MEMBERS,
            IntegrationFamily::IssueTracker => ISSUE_TRACKER_MEMBERS,
        }
    }
}

/// One backend-known service as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStatusRecord {
    pub service: String,
    pub connected: bool,
    #[serde(default, deserialize_with = "timestamp::lenient_option")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl IntegrationStatusRecord {
    pub fn connected(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            connected: true,
            last_sync: None,
            error: None,
        }
    }

    pub fn disconnected(service: impl Into<String>) -> Self {
        Self {
            connected: false,
            ..Self::connected(service)
        }
    }
}

/// Connected flags for every integration. All [`IntegrationId::KNOWN`] keys are
/// always present; extra keys appear once a local-only toggle names them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<IntegrationId, bool>",
    into = "BTreeMap<IntegrationId, bool>"
)]
pub struct IntegrationSet(BTreeMap<IntegrationId, bool>);

impl Default for IntegrationSet {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl IntegrationSet {
    pub fn disconnected() -> Self {
        Self(
            IntegrationId::KNOWN
                .iter()
                .cloned()
                .map(|id| (id, false))
                .collect(),
        )
    }

    /// Builds the set from gateway records. A connected family record turns on
    /// every member of that family; records for unknown services are ignored.
    pub fn derive(records: &[IntegrationStatusRecord]) -> Self {
        let mut set = Self::disconnected();
        for record in records.iter().filter(|record| record.connected) {
            if let Some(family) = IntegrationFamily::from_service(&record.service) {
                for member in family.members() {
                    set.0.insert(member.clone(), true);
                }
            }
        }
        set
    }

    pub fn is_connected(&self, id: &IntegrationId) -> bool {
        self.0.get(id).copied().unwrap_or(false)
    }

    pub fn set(&mut self, id: IntegrationId, connected: bool) {
        self.0.insert(id, connected);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IntegrationId, bool)> {
        self.0.iter().map(|(id, connected)| (id, *connected))
    }

    pub fn connected(&self) -> impl Iterator<Item = &IntegrationId> {
        self.0
            .iter()
            .filter(|(_, connected)| **connected)
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<IntegrationId, bool>> for IntegrationSet {
    fn from(mut map: BTreeMap<IntegrationId, bool>) -> Self {
        for id in IntegrationId::KNOWN {
            map.entry(id).or_insert(false);
        }
        Self(map)
    }
}

impl From<IntegrationSet> for BTreeMap<IntegrationId, bool> {
    fn from(set: IntegrationSet) -> Self {
        set.0
    }
}

/// Most recent records fetched per service. Each slot is replaced wholesale.
pub type ServiceDataCache = BTreeMap<IntegrationId, Vec<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueTrackerDataKind {
    Issues,
    Projects,
}

impl IssueTrackerDataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueTrackerDataKind::Issues => "issues",
            IssueTrackerDataKind::Projects => "projects",
        }
    }
}

impl fmt::Display for IssueTrackerDataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret bundle forwarded verbatim to the issue-tracker connect endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTrackerCredentials {
    pub domain: String,
    pub email: String,
    pub token: String,
}

impl fmt::Debug for IssueTrackerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueTrackerCredentials")
            .field("domain", &self.domain)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}
