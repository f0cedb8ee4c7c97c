//! Client for the Spotinst Elastigroup REST API.

use super::types::RollGroupRequest;
use super::SpotinstError;
use crate::retry::{retry_with, RetryConfig, RetryPolicy};
use crate::{Error, ErrorContext, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub const SPOTINST_API_HOST: &str = "https://api.spotinst.io";

/// Spotinst rate limits reset every minute, so backoff never waits less.
pub const RATE_LIMIT_MIN_WAIT: Duration = Duration::from_secs(60);

const THROTTLING_CODES: &[&str] = &["Throttling", "RequestLimitExceeded"];

/// Retries only requests Spotinst rejected for exceeding its rate limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateExceededPolicy;

impl RetryPolicy for RateExceededPolicy {
    fn should_retry(&self, error: &Error) -> bool {
        matches!(error, Error::Spotinst(SpotinstError::RateExceeded(_)))
    }

    fn name(&self) -> &'static str {
        "spotinst_rate_exceeded"
    }
}

/// Client for the Spotinst REST API.
pub struct SpotinstClient {
    http_client: reqwest::Client,
    token: String,
    account_id: String,
    base_url: String,
    retry: RetryConfig,
}

impl SpotinstClient {
    pub fn builder() -> SpotinstClientBuilder {
        SpotinstClientBuilder::new()
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Create an Elastigroup and return it.
    pub async fn create_group(&self, group_config: &Value) -> Result<Value> {
        let response = self.request(Method::POST, "aws/ec2/group", Some(group_config)).await?;
        first_item(response)
    }

    pub async fn update_group(&self, group_id: &str, group_config: &Value) -> Result<()> {
        self.request(Method::PUT, &format!("aws/ec2/group/{group_id}"), Some(group_config))
            .await?;
        Ok(())
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Value> {
        let response = self.request(Method::GET, &format!("aws/ec2/group/{group_id}"), None).await?;
        first_item(response)
    }

    /// Status of every instance in a group.
    pub async fn get_instances_in_group(&self, group_id: &str) -> Result<Vec<Value>> {
        let response = self
            .request(Method::GET, &format!("aws/ec2/group/{group_id}/status"), None)
            .await?;
        items(response)
    }

    pub async fn get_groups(&self) -> Result<Vec<Value>> {
        items(self.request(Method::GET, "aws/ec2/group", None).await?)
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("aws/ec2/group/{group_id}"), None)
            .await?;
        Ok(())
    }

    /// Start a roll: bring up replacement instances, then shut the old ones down.
    pub async fn roll_group(&self, group_id: &str, request: &RollGroupRequest) -> Result<()> {
        let body = serde_json::to_value(request)?;
        self.request(Method::PUT, &format!("aws/ec2/group/{group_id}/roll"), Some(&body))
            .await?;
        Ok(())
    }

    /// Current and past deployments of a group, oldest first.
    pub async fn get_deployments(&self, group_id: &str) -> Result<Vec<Value>> {
        let response = self
            .request(Method::GET, &format!("aws/ec2/group/{group_id}/roll"), None)
            .await?;
        let mut deployments = items(response)?;
        deployments.sort_by(|a, b| a["createdAt"].as_str().cmp(&b["createdAt"].as_str()));
        Ok(deployments)
    }

    /// Details of one deployment (roll) of a group.
    pub async fn get_roll_status(&self, group_id: &str, deploy_id: &str) -> Result<Value> {
        let response = self
            .request(Method::GET, &format!("aws/ec2/group/{group_id}/roll/{deploy_id}"), None)
            .await?;
        first_item(response)
    }

    pub async fn get_group_instances_health(&self, group_id: &str) -> Result<Vec<Value>> {
        let response = self
            .request(
                Method::GET,
                &format!("aws/ec2/group/{group_id}/instanceHealthiness"),
                None,
            )
            .await?;
        items(response)
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        retry_with(&RateExceededPolicy, &self.retry, || {
            self.send(method.clone(), path, body)
        })
        .await
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let endpoint = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut request = self
            .http_client
            .request(method.clone(), &endpoint)
            .query(&[("accountId", self.account_id.as_str())])
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::from(SpotinstError::RateExceeded(format!(
                    "Rate exceeded while calling {method} {path}: {e}"
                )))
            } else {
                Error::Transport(e)
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SpotinstError::Api("Provided Spotinst API token is not valid".to_string()).into());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SpotinstError::RateExceeded(format!("Rate exceeded while calling {method} {path}")).into());
        }

        let text = response.text().await?;
        let json: Value = serde_json::from_str(&text).map_err(|_| {
            SpotinstError::Api(format!("Spotinst API did not return JSON response: {text}"))
        })?;

        if status != StatusCode::OK {
            let errors = json
                .pointer("/response/errors")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let throttled = errors.iter().any(|e| {
                e.get("code")
                    .and_then(Value::as_str)
                    .is_some_and(|code| THROTTLING_CODES.contains(&code))
            });
            if throttled {
                return Err(SpotinstError::RateExceeded(format!("Rate exceeded while calling {method} {path}")).into());
            }

            let reported_status = json.pointer("/response/status").cloned().unwrap_or(Value::Null);
            let request_id = json
                .pointer("/request/id")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(SpotinstError::Api(format!(
                "Unknown Spotinst API error encountered: {reported_status} {}. RequestId {request_id}",
                Value::Array(errors)
            ))
            .into());
        }

        Ok(json)
    }
}

fn items(mut response: Value) -> Result<Vec<Value>> {
    match response.pointer_mut("/response/items").map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(SpotinstError::Api("Spotinst API response is missing response.items".to_string()).into()),
    }
}

fn first_item(response: Value) -> Result<Value> {
    items(response)?
        .into_iter()
        .next()
        .ok_or_else(|| SpotinstError::Api("Spotinst API returned no items".to_string()).into())
}

pub struct SpotinstClientBuilder {
    token: Option<String>,
    account_id: Option<String>,
    base_url: Option<String>,
    timeout: Duration,
    retry: RetryConfig,
}

impl SpotinstClientBuilder {
    pub fn new() -> Self {
        Self {
            token: None,
            account_id: None,
            base_url: None,
            timeout: Duration::from_secs(60),
            retry: RetryConfig::default().with_min_wait(RATE_LIMIT_MIN_WAIT),
        }
    }

    /// Builder seeded from `SPOTINST_TOKEN`, `SPOTINST_ACCOUNT_ID` and
    /// `SPOTINST_API_HOST`.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        builder.token = std::env::var("SPOTINST_TOKEN").ok();
        builder.account_id = std::env::var("SPOTINST_ACCOUNT_ID").ok();
        builder.base_url = std::env::var("SPOTINST_API_HOST").ok();
        builder
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<SpotinstClient> {
        let token = self.token.ok_or_else(|| {
            Error::configuration_with_context(
                "Spotinst API token required",
                ErrorContext::new().with_field_path("SPOTINST_TOKEN").with_source("spotinst"),
            )
        })?;
        let account_id = self.account_id.ok_or_else(|| {
            Error::configuration_with_context(
                "Spotinst account id required",
                ErrorContext::new().with_field_path("SPOTINST_ACCOUNT_ID").with_source("spotinst"),
            )
        })?;
        let base_url = self.base_url.unwrap_or_else(|| SPOTINST_API_HOST.to_string());
        url::Url::parse(&base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("Invalid Spotinst API host: {base_url}"),
                ErrorContext::new()
                    .with_field_path("SPOTINST_API_HOST")
                    .with_details(e.to_string())
                    .with_source("spotinst"),
            )
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("Failed to create HTTP client: {}", e),
                    ErrorContext::new().with_source("spotinst"),
                )
            })?;

        Ok(SpotinstClient {
            http_client,
            token,
            account_id,
            base_url,
            retry: self.retry,
        })
    }
}

impl Default for SpotinstClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
