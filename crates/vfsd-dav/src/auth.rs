//! Credentials for server and proxy challenges.
//!
//! During mount the manager prompts interactively. Once discovery has found
//! a working collection it switches to answering from the data it already
//! has, so climbing to parent collections never asks for different
//! credentials again.

use crate::path::uri_host;
use crate::transport::TransportError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, warn};
use parking_lot::Mutex;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION,
    WWW_AUTHENTICATE,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use url::Url;
use vfsd_backend::{
    AskPasswordFlags, Keyring, KeyringKey, MountSource, PasswordReply, PasswordSave,
};

/// Which party issued a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScope {
    Server,
    Proxy,
}

impl AuthScope {
    /// Scope of a challenge response, if `status` is one.
    pub fn for_status(status: u16) -> Option<AuthScope> {
        match status {
            401 => Some(AuthScope::Server),
            407 => Some(AuthScope::Proxy),
            _ => None,
        }
    }

    pub fn challenge_header(self) -> HeaderName {
        match self {
            AuthScope::Server => WWW_AUTHENTICATE,
            AuthScope::Proxy => PROXY_AUTHENTICATE,
        }
    }

    pub fn credentials_header(self) -> HeaderName {
        match self {
            AuthScope::Server => AUTHORIZATION,
            AuthScope::Proxy => PROXY_AUTHORIZATION,
        }
    }

    fn keyring_type(self) -> &'static str {
        match self {
            AuthScope::Server => "basic",
            AuthScope::Proxy => "proxy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthMode {
    Interactive,
    FromData,
}

#[derive(Debug, Default, Clone)]
struct AuthInfo {
    username: Option<String>,
    password: Option<SecretString>,
    realm: Option<String>,
    pw_save: PasswordSave,
}

struct AuthState {
    server: AuthInfo,
    proxy: AuthInfo,
    mode: AuthMode,
    allow_prompt: bool,
    source: Option<Arc<dyn MountSource>>,
    /// Origin server credentials are sent to.
    origin: Option<Url>,
    /// Set after stored credentials were rejected; the next challenge prompts.
    skip_keyring: bool,
}

impl AuthState {
    fn info(&self, scope: AuthScope) -> &AuthInfo {
        match scope {
            AuthScope::Server => &self.server,
            AuthScope::Proxy => &self.proxy,
        }
    }

    fn info_mut(&mut self, scope: AuthScope) -> &mut AuthInfo {
        match scope {
            AuthScope::Server => &mut self.server,
            AuthScope::Proxy => &mut self.proxy,
        }
    }
}

/// Extracts the realm of the `Basic` challenge in `headers`.
///
/// The outer `None` means there is no `Basic` challenge at all; the inner
/// one means the challenge names no realm.
pub fn basic_realm(headers: &HeaderMap, name: &HeaderName) -> Option<Option<String>> {
    for value in headers.get_all(name) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let lower = value.to_ascii_lowercase();
        let Some(start) = lower.find("basic") else {
            continue;
        };
        let params = &value[start + "basic".len()..];
        let lower_params = &lower[start + "basic".len()..];
        let Some(pos) = lower_params.find("realm=") else {
            return Some(None);
        };
        let rest = &params[pos + "realm=".len()..];
        let realm = if let Some(quoted) = rest.strip_prefix('"') {
            let mut realm = String::new();
            let mut escaped = false;
            for c in quoted.chars() {
                match (escaped, c) {
                    (true, c) => {
                        realm.push(c);
                        escaped = false;
                    }
                    (false, '\\') => escaped = true,
                    (false, '"') => break,
                    (false, c) => realm.push(c),
                }
            }
            realm
        } else {
            rest.split(',').next().unwrap_or("").trim().to_string()
        };
        return Some(Some(realm));
    }
    None
}

fn basic_header(username: &str, password: &SecretString) -> Result<HeaderValue, TransportError> {
    let token = STANDARD.encode(format!("{}:{}", username, password.expose_secret()));
    let mut value = HeaderValue::from_str(&format!("Basic {}", token))
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().to_owned())
}

/// Credential cache and prompt policy of one mount.
pub struct AuthManager {
    state: Mutex<AuthState>,
    keyring: Arc<dyn Keyring>,
    /// Only one prompt is outstanding per mount.
    prompt_lock: tokio::sync::Mutex<()>,
}

impl AuthManager {
    pub fn new(keyring: Arc<dyn Keyring>) -> Self {
        Self {
            state: Mutex::new(AuthState {
                server: AuthInfo::default(),
                proxy: AuthInfo::default(),
                mode: AuthMode::Interactive,
                allow_prompt: false,
                source: None,
                origin: None,
                skip_keyring: false,
            }),
            keyring,
            prompt_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Prepares for discovery of the mount at `base`.
    pub fn begin_mount(&self, base: &Url, source: Arc<dyn MountSource>, is_automount: bool) {
        let mut state = self.state.lock();
        state.server = AuthInfo {
            username: (!base.username().is_empty()).then(|| base.username().to_string()),
            ..AuthInfo::default()
        };
        state.proxy = AuthInfo::default();
        state.mode = AuthMode::Interactive;
        state.allow_prompt = !is_automount;
        state.source = Some(source);
        state.origin = Some(base.clone());
        state.skip_keyring = false;
    }

    /// Stops prompting; later challenges are answered from cached data only.
    pub fn set_from_data(&self) {
        let mut state = self.state.lock();
        if state.mode == AuthMode::Interactive {
            debug!("auth: switching to cached credentials");
        }
        state.mode = AuthMode::FromData;
    }

    pub fn has_credentials(&self) -> bool {
        let state = self.state.lock();
        state.server.password.is_some() || state.proxy.password.is_some()
    }

    /// Drops cached passwords, keeping usernames as prompt defaults.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        debug!("auth: clearing cached passwords");
        state.server.password = None;
        state.proxy.password = None;
        state.skip_keyring = true;
    }

    /// Forgets everything, as on unmount.
    pub fn forget(&self) {
        let mut state = self.state.lock();
        state.server = AuthInfo::default();
        state.proxy = AuthInfo::default();
        state.source = None;
        state.origin = None;
        state.allow_prompt = false;
    }

    /// Adds cached credentials to a request that carries none.
    ///
    /// Server credentials only go to the mount's origin; a request that
    /// left it loses any `Authorization` header it had.
    pub fn apply(&self, request_url: &Url, headers: &mut HeaderMap) -> Result<(), TransportError> {
        let state = self.state.lock();
        let at_origin = state
            .origin
            .as_ref()
            .is_some_and(|origin| same_origin(origin, request_url));

        if !at_origin {
            headers.remove(AUTHORIZATION);
        } else if !headers.contains_key(AUTHORIZATION) {
            if let (Some(user), Some(password)) = (&state.server.username, &state.server.password)
            {
                headers.insert(AUTHORIZATION, basic_header(user, password)?);
            }
        }
        if !headers.contains_key(PROXY_AUTHORIZATION) {
            if let (Some(user), Some(password)) = (&state.proxy.username, &state.proxy.password) {
                headers.insert(PROXY_AUTHORIZATION, basic_header(user, password)?);
            }
        }
        Ok(())
    }

    /// Answers a challenge.
    ///
    /// `retrying` is set when the challenged request already carried
    /// credentials for `scope`. `Ok(None)` means the challenge response
    /// goes back to the caller as is.
    pub async fn respond(
        &self,
        scope: AuthScope,
        challenge: &HeaderMap,
        request_url: &Url,
        retrying: bool,
    ) -> Result<Option<HeaderValue>, TransportError> {
        let Some(realm) = basic_realm(challenge, &scope.challenge_header()) else {
            debug!("auth: no basic challenge, giving up");
            return Ok(None);
        };
        debug!(
            "auth: {:?} challenge for realm {:?} ({})",
            scope,
            realm,
            if retrying { "retrying" } else { "first auth" }
        );

        let _prompt = self.prompt_lock.lock().await;

        let mode = self.state.lock().mode;
        match mode {
            AuthMode::FromData => self.respond_from_data(scope, retrying),
            AuthMode::Interactive => {
                self.respond_interactive(scope, realm, request_url, retrying)
                    .await
            }
        }
    }

    fn respond_from_data(
        &self,
        scope: AuthScope,
        retrying: bool,
    ) -> Result<Option<HeaderValue>, TransportError> {
        if retrying {
            return Ok(None);
        }
        let state = self.state.lock();
        let info = state.info(scope);
        let empty = SecretString::new(String::new());
        let password = info.password.as_ref().unwrap_or(&empty);
        basic_header(info.username.as_deref().unwrap_or(""), password).map(Some)
    }

    async fn respond_interactive(
        &self,
        scope: AuthScope,
        realm: Option<String>,
        request_url: &Url,
        retrying: bool,
    ) -> Result<Option<HeaderValue>, TransportError> {
        let (mut username, mut password, allow_prompt, source, skip_keyring) = {
            let mut state = self.state.lock();
            let allow_prompt = state.allow_prompt;
            let source = state.source.clone();
            let skip_keyring = state.skip_keyring;
            let info = state.info_mut(scope);
            match (info.realm.clone(), &realm) {
                (None, Some(new)) => info.realm = Some(new.clone()),
                (Some(known), Some(new)) if &known != new => {
                    debug!("auth: realm changed from {:?} to {:?}", known, new);
                    return Ok(None);
                }
                _ => {}
            }
            (
                info.username.clone(),
                info.password.as_ref().map(copy_secret),
                allow_prompt,
                source,
                skip_keyring,
            )
        };

        let mut flags = AskPasswordFlags::NEED_PASSWORD;
        let have_auth = username.is_some() && password.is_some();
        if !have_auth && self.keyring.is_available() {
            flags = flags | AskPasswordFlags::SAVING_SUPPORTED;
        }
        if !have_auth && self.keyring.is_available() && !skip_keyring {
            let key = KeyringKey {
                user: username.clone(),
                host: uri_host(request_url),
                protocol: "http".to_string(),
                realm: realm.clone(),
                auth_type: scope.keyring_type().to_string(),
                port: request_url.port_or_known_default(),
            };
            if let Some(entry) = self.keyring.lookup(&key).await {
                debug!("auth: using stored credentials");
                username = entry.user.or(username);
                password = Some(entry.password);
                let mut state = self.state.lock();
                let info = state.info_mut(scope);
                info.username = username.clone();
                info.password = password.as_ref().map(copy_secret);
            }
        }

        if !retrying {
            if let (Some(user), Some(pw)) = (&username, &password) {
                return basic_header(user, pw).map(Some);
            }
        }

        let source = match source {
            Some(source) if allow_prompt => source,
            _ => {
                if retrying {
                    return Ok(None);
                }
                let empty = SecretString::new(String::new());
                return basic_header(
                    username.as_deref().unwrap_or(""),
                    password.as_ref().unwrap_or(&empty),
                )
                .map(Some);
            }
        };

        let prompt = match scope {
            AuthScope::Server => format!(
                "Enter password for {}",
                realm.as_deref().unwrap_or("WebDAV share")
            ),
            AuthScope::Proxy => "Please enter proxy password".to_string(),
        };
        if username.is_none() {
            flags = flags | AskPasswordFlags::NEED_USERNAME;
        }

        match source
            .ask_password(&prompt, username.as_deref(), None, flags)
            .await
        {
            PasswordReply::Answered {
                username: new_username,
                password: new_password,
                save,
            } => {
                let new_username = new_username.or(username).unwrap_or_default();
                let header = basic_header(&new_username, &new_password)?;
                let mut state = self.state.lock();
                let info = state.info_mut(scope);
                info.username = Some(new_username);
                info.password = Some(new_password);
                info.pw_save = save;
                Ok(Some(header))
            }
            PasswordReply::Aborted => {
                debug!("auth: prompt aborted");
                Err(TransportError::AuthenticationCancelled)
            }
        }
    }

    /// Stores the accepted server credentials under the policy the user chose.
    pub async fn save_to_keyring(&self, base: &Url) {
        let (info, key) = {
            let state = self.state.lock();
            let info = state.server.clone();
            let key = KeyringKey {
                user: info.username.clone(),
                host: uri_host(base),
                protocol: "http".to_string(),
                realm: info.realm.clone(),
                auth_type: AuthScope::Server.keyring_type().to_string(),
                port: base.port_or_known_default(),
            };
            (info, key)
        };
        let (Some(_), Some(password)) = (&info.username, &info.password) else {
            return;
        };
        if info.pw_save == PasswordSave::Never {
            return;
        }
        if !self.keyring.save(&key, password, info.pw_save).await {
            warn!("failed to save credentials for {}", key.host);
        }
    }
}
