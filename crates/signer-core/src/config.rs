//! Signer configuration.
//!
//! [`SigningCredentials`] names the oracle-side key and carries whatever the
//! oracle client needs to authenticate. The core never uses the secrets
//! itself; it hands them to the client that builds the [`KeyOracle`].
//!
//! [`KeyOracle`]: crate::oracle::KeyOracle
//!
//! # Environment
//!
//! | Variable | Field | Required |
//! |---|---|---|
//! | `AWS_KEY_ID` | `key_id` | yes |
//! | `AWS_REGION` | `region` | no |
//! | `AWS_ACCESS_KEY_ID` | `access_key_id` | no |
//! | `AWS_SECRET_ACCESS_KEY` | `secret_access_key` | no |
//! | `AWS_SESSION_TOKEN` | `session_token` | no |
//!
//! Empty values count as unset.

use core::fmt;
use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable holding the key identifier.
pub const ENV_KEY_ID: &str = "AWS_KEY_ID";
/// Environment variable holding the region.
pub const ENV_REGION: &str = "AWS_REGION";
/// Environment variable holding the access key id.
pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable holding the secret access key.
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable holding the session token.
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Key identifier plus optional client credentials.
///
/// `Debug` redacts the secret access key and session token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningCredentials {
    /// The oracle-side key identifier (key id, ARN or alias).
    pub key_id: String,
    /// The region the key lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Static access key id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    /// Static secret access key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    /// Session token for temporary credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl SigningCredentials {
    /// Credentials for `key_id` with everything else left to the client's
    /// defaults.
    #[must_use]
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            region: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        }
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets a static access key pair.
    #[must_use]
    pub fn with_static_keys(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Sets the session token.
    #[must_use]
    pub fn with_session_token(mut self, session_token: impl Into<String>) -> Self {
        self.session_token = Some(session_token.into());
        self
    }

    /// Reads credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `AWS_KEY_ID` is unset or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads credentials through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `AWS_KEY_ID` is unset or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let key_id = get(ENV_KEY_ID)
            .ok_or_else(|| Error::InvalidConfig(format!("{ENV_KEY_ID} is not set")))?;

        Ok(Self {
            key_id,
            region: get(ENV_REGION),
            access_key_id: get(ENV_ACCESS_KEY_ID),
            secret_access_key: get(ENV_SECRET_ACCESS_KEY),
            session_token: get(ENV_SESSION_TOKEN),
        })
    }

    /// Checks that the credentials are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the key id is blank, or if only
    /// half of a static key pair is present.
    pub fn validate(&self) -> Result<()> {
        if self.key_id.trim().is_empty() {
            return Err(Error::InvalidConfig("key id is empty".to_string()));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(Error::InvalidConfig(
                "access key id and secret access key must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("SigningCredentials")
            .field("key_id", &self.key_id)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| REDACTED),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| REDACTED),
            )
            .finish()
    }
}
