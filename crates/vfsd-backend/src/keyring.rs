//! Secret store access for persisted credentials.

use crate::source::PasswordSave;
use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};

/// Lookup/save key for a stored password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringKey {
    /// `None` on lookup matches any stored user.
    pub user: Option<String>,
    pub host: String,
    pub protocol: String,
    pub realm: Option<String>,
    /// `"basic"` for server credentials, `"proxy"` for proxy credentials.
    pub auth_type: String,
    pub port: Option<u16>,
}

impl KeyringKey {
    fn matches(&self, stored: &KeyringKey) -> bool {
        let user_matches = match &self.user {
            Some(user) => stored.user.as_deref() == Some(user.as_str()),
            None => true,
        };
        user_matches
            && self.host == stored.host
            && self.protocol == stored.protocol
            && self.realm == stored.realm
            && self.auth_type == stored.auth_type
            && self.port == stored.port
    }
}

/// A password found in the store.
#[derive(Debug)]
pub struct KeyringEntry {
    pub user: Option<String>,
    pub password: SecretString,
}

#[async_trait]
pub trait Keyring: Send + Sync {
    /// Whether saving is possible at all; drives the "remember" prompt option.
    fn is_available(&self) -> bool;

    async fn lookup(&self, key: &KeyringKey) -> Option<KeyringEntry>;

    /// Stores a password. Returns `false` when nothing was stored.
    async fn save(&self, key: &KeyringKey, password: &SecretString, save: PasswordSave) -> bool;
}

/// Process-local keyring. Anything saved is lost when the process exits.
#[derive(Default)]
pub struct MemoryKeyring {
    entries: Mutex<Vec<(KeyringKey, SecretString)>>,
}

impl MemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl Keyring for MemoryKeyring {
    fn is_available(&self) -> bool {
        true
    }

    async fn lookup(&self, key: &KeyringKey) -> Option<KeyringEntry> {
        let entries = self.entries.lock();
        entries
            .iter()
            .find(|(stored, _)| key.matches(stored))
            .map(|(stored, password)| KeyringEntry {
                user: stored.user.clone(),
                password: SecretString::new(password.expose_secret().to_owned()),
            })
    }

    async fn save(&self, key: &KeyringKey, password: &SecretString, save: PasswordSave) -> bool {
        if save == PasswordSave::Never {
            return false;
        }
        let mut entries = self.entries.lock();
        entries.retain(|(stored, _)| stored != key);
        entries.push((
            key.clone(),
            SecretString::new(password.expose_secret().to_owned()),
        ));
        true
    }
}

/// Keyring that stores nothing; used when no secret service is reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeyring;

#[async_trait]
impl Keyring for NoKeyring {
    fn is_available(&self) -> bool {
        false
    }

    async fn lookup(&self, _key: &KeyringKey) -> Option<KeyringEntry> {
        None
    }

    async fn save(&self, _key: &KeyringKey, _password: &SecretString, _save: PasswordSave) -> bool {
        false
    }
}
