//! Mount sources: the user facing side of a mount attempt.
//!
//! Backends never talk to the user directly. They ask the mount source for
//! passwords and certificate decisions and wait for the answer.

use async_trait::async_trait;
use secrecy::SecretString;
use std::ops::BitOr;

/// What a password prompt should ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AskPasswordFlags(u32);

impl AskPasswordFlags {
    pub const NEED_PASSWORD: AskPasswordFlags = AskPasswordFlags(1 << 0);
    pub const NEED_USERNAME: AskPasswordFlags = AskPasswordFlags(1 << 1);
    pub const NEED_DOMAIN: AskPasswordFlags = AskPasswordFlags(1 << 2);
    pub const SAVING_SUPPORTED: AskPasswordFlags = AskPasswordFlags(1 << 3);
    pub const ANONYMOUS_SUPPORTED: AskPasswordFlags = AskPasswordFlags(1 << 4);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, other: AskPasswordFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for AskPasswordFlags {
    type Output = AskPasswordFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        AskPasswordFlags(self.0 | rhs.0)
    }
}

/// How long an accepted password should be remembered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PasswordSave {
    #[default]
    Never,
    ForSession,
    Permanently,
}

/// Answer to a password prompt.
#[derive(Debug)]
pub enum PasswordReply {
    /// The user filled in the dialog.
    Answered {
        /// `None` keeps the username the prompt was pre-filled with.
        username: Option<String>,
        password: SecretString,
        save: PasswordSave,
    },
    /// The user dismissed the dialog.
    Aborted,
}

/// Prompt delivery for a mount attempt.
#[async_trait]
pub trait MountSource: Send + Sync {
    async fn ask_password(
        &self,
        message: &str,
        default_user: Option<&str>,
        default_domain: Option<&str>,
        flags: AskPasswordFlags,
    ) -> PasswordReply;

    /// Asks whether to trust a certificate the TLS layer rejected.
    ///
    /// `errors` is a human readable list of what was wrong with it.
    async fn ask_certificate(&self, host: &str, certificate: &[u8], errors: &[&str]) -> bool;
}
