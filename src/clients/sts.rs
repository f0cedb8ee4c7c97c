//! Role assumption across accounts.

use crate::retry::{throttled_call_with, RetryConfig};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session name used when the caller does not pick one.
pub const DEFAULT_SESSION_NAME: &str = "AssumedRole";

/// Temporary credentials issued by `AssumeRole`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

// Keep secrets out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[async_trait]
pub trait StsApi: Send + Sync {
    async fn assume_role(&self, role_arn: &str, session_name: &str) -> Result<Credentials>;
}

pub fn role_arn(account: &str, role: &str) -> String {
    format!("arn:aws:iam::{account}:role/{role}")
}

pub struct Sts<C> {
    client: C,
    retry: RetryConfig,
}

impl<C: StsApi> Sts<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            retry: RetryConfig::from_env(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Assume `role` in `account`. The session is named `AssumedRole` unless
    /// `session_name` says otherwise.
    pub async fn assume_role(&self, account: &str, role: &str, session_name: Option<&str>) -> Result<Credentials> {
        let arn = role_arn(account, role);
        let session_name = session_name.unwrap_or(DEFAULT_SESSION_NAME);
        tracing::debug!(role_arn = %arn, session_name, "Assuming role");
        throttled_call_with(&self.retry, || self.client.assume_role(&arn, session_name)).await
    }

    /// Assume a role and hand the credentials to `build`, which produces a
    /// client acting inside that account.
    pub async fn client_for_account<T, B>(&self, account: &str, role: &str, build: B) -> Result<T>
    where
        B: FnOnce(Credentials) -> T,
    {
        let credentials = self.assume_role(account, role, None).await?;
        Ok(build(credentials))
    }
}
