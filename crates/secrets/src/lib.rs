use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result, anyhow, bail};
use argon2::Argon2;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use core_types::IssueTrackerCredentials;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const SCHEMA_VERSION: u32 = 1;
const PLAIN_FILE: &str = "secrets.json";
const SEALED_FILE: &str = "secrets.enc.json";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("encrypted secrets exist but no password provided")]
    MissingPassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSlot {
    SessionToken,
    IssueTrackerCredentials,
}

/// Everything the dashboard keeps on disk that must not land in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Vault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issue_tracker: Option<IssueTrackerCredentials>,
}

impl Vault {
    fn clear(&mut self, slot: SecretSlot) {
        match slot {
            SecretSlot::SessionToken => self.session_token = None,
            SecretSlot::IssueTrackerCredentials => self.issue_tracker = None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PlainFile {
    schema_version: u32,
    #[serde(flatten)]
    vault: Vault,
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedFile {
    schema_version: u32,
    salt_b64: String,
    nonce_b64: String,
    ciphertext_b64: String,
}

/// File-backed secret storage. With a password set the vault is sealed with
/// AES-256-GCM under an Argon2 key; without one it is written as plain JSON.
#[derive(Debug, Clone)]
pub struct SecretStore {
    root: PathBuf,
    password: Option<String>,
}

impl SecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn is_encrypted_mode(&self) -> bool {
        self.password.is_some()
    }

    pub fn session_token(&self) -> Result<Option<String>> {
        Ok(self.load()?.session_token)
    }

    pub fn store_session_token(&self, token: impl Into<String>) -> Result<()> {
        self.update(|vault| vault.session_token = Some(token.into()))
    }

    pub fn issue_tracker_credentials(&self) -> Result<Option<IssueTrackerCredentials>> {
        Ok(self.load()?.issue_tracker)
    }

    pub fn store_issue_tracker_credentials(&self, credentials: &IssueTrackerCredentials) -> Result<()> {
        self.update(|vault| vault.issue_tracker = Some(credentials.clone()))
    }

    pub fn clear(&self, slot: SecretSlot) -> Result<()> {
        self.update(|vault| vault.clear(slot))
    }

    fn update(&self, edit: impl FnOnce(&mut Vault)) -> Result<()> {
        let mut vault = self.load()?;
        edit(&mut vault);
        self.persist(&vault)
    }

    fn load(&self) -> Result<Vault> {
        let plain = self.root.join(PLAIN_FILE);
        let sealed = self.root.join(SEALED_FILE);

        match (sealed.exists(), self.password.as_deref()) {
            (true, Some(password)) => {
                let text = fs::read_to_string(&sealed)
                    .with_context(|| format!("failed to read {}", sealed.display()))?;
                let doc: SealedFile =
                    serde_json::from_str(&text).context("failed to parse sealed secrets")?;
                open(password, &doc)
            }
            (true, None) if !plain.exists() => Err(SecretError::MissingPassword.into()),
            _ if plain.exists() => {
                let text = fs::read_to_string(&plain)
                    .with_context(|| format!("failed to read {}", plain.display()))?;
                let doc: PlainFile =
                    serde_json::from_str(&text).context("failed to parse secrets file")?;
                Ok(doc.vault)
            }
            _ => Ok(Vault::default()),
        }
    }

    fn persist(&self, vault: &Vault) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        let (target, stale, text) = match self.password.as_deref() {
            Some(password) => (
                SEALED_FILE,
                PLAIN_FILE,
                serde_json::to_string_pretty(&seal(password, vault)?)?,
            ),
            None => (
                PLAIN_FILE,
                SEALED_FILE,
                serde_json::to_string_pretty(&PlainFile {
                    schema_version: SCHEMA_VERSION,
                    vault: vault.clone(),
                })?,
            ),
        };

        let path = self.root.join(target);
        fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        let stale = self.root.join(stale);
        if stale.exists() {
            match fs::remove_file(&stale) {
                Ok(()) => debug!(path = %stale.display(), "removed secrets file from previous mode"),
                Err(err) => warn!(
                    path = %stale.display(),
                    error = %err,
                    "failed to remove secrets file from previous mode"
                ),
            }
        }
        info!(encrypted = self.is_encrypted_mode(), "secrets persisted");
        Ok(())
    }
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow!("failed to derive encryption key: {e}"))?;
    Ok(key)
}

fn seal(password: &str, vault: &Vault) -> Result<SealedFile> {
    let mut salt = [0u8; 16];
    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(&derive_key(password, &salt)?)
        .context("failed to build cipher")?;
    let plaintext = serde_json::to_vec(vault)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
        .map_err(|e| anyhow!("failed to encrypt secrets: {e}"))?;

    Ok(SealedFile {
        schema_version: SCHEMA_VERSION,
        salt_b64: BASE64.encode(salt),
        nonce_b64: BASE64.encode(nonce),
        ciphertext_b64: BASE64.encode(ciphertext),
    })
}

fn open(password: &str, sealed: &SealedFile) -> Result<Vault> {
    let salt = BASE64.decode(&sealed.salt_b64)?;
    let nonce = BASE64.decode(&sealed.nonce_b64)?;
    let ciphertext = BASE64.decode(&sealed.ciphertext_b64)?;
    if nonce.len() != 12 {
        bail!("invalid nonce length");
    }

    let cipher = Aes256Gcm::new_from_slice(&derive_key(password, &salt)?)
        .context("failed to build cipher")?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|e| anyhow!("failed to decrypt secrets: {e}"))?;
    serde_json::from_slice(&plaintext).context("decrypted secrets are not a valid vault")
}

pub fn default_secret_dir_from(base_dir: &Path) -> PathBuf {
    base_dir.join("secrets")
}
