//! Credential provider interface.
//!
//! Tokens are opaque: they are handed to the HTTP clients as-is and never
//! decoded here. Acquiring them (account login, refresh) happens outside.

use async_trait::async_trait;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Audience {
    /// Live services: leaderboards, maps, track of the day.
    Live,
    /// Public OAuth API: display names.
    OAuth,
}

impl Audience {
    pub fn as_str(self) -> &'static str {
        match self {
            Audience::Live => "NadeoLiveServices",
            Audience::OAuth => "OAuth",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            Audience::Live => "NADEO_LIVE_TOKEN",
            Audience::OAuth => "TRACKMANIA_OAUTH_TOKEN",
        }
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, audience: Audience) -> Result<String>;
}

/// Tokens taken from the process environment at startup.
pub struct EnvTokenProvider {
    live: Option<String>,
    oauth: Option<String>,
}

impl EnvTokenProvider {
    pub fn new(live: Option<String>, oauth: Option<String>) -> EnvTokenProvider {
        EnvTokenProvider { live, oauth }
    }

    pub fn from_env() -> EnvTokenProvider {
        let read = |audience: Audience| std::env::var(audience.env_var()).ok().filter(|t| !t.trim().is_empty());
        EnvTokenProvider::new(read(Audience::Live), read(Audience::OAuth))
    }
}

impl std::fmt::Debug for EnvTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EnvTokenProvider")
            .field("live", &self.live.as_ref().map(|_| "<redacted>"))
            .field("oauth", &self.oauth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn token(&self, audience: Audience) -> Result<String> {
        let token = match audience {
            Audience::Live => &self.live,
            Audience::OAuth => &self.oauth,
        };
        token.clone().ok_or(Error::MissingCredential(audience.as_str()))
    }
}
