//! Reporting evaluation results to AWS Config.

use crate::helpers::chunker;
use crate::retry::{throttled_call_with, RetryConfig};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `PutEvaluations` accepts at most this many evaluations per call.
pub const MAX_EVALUATIONS_PER_CALL: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceType {
    Compliant,
    NonCompliant,
    NotApplicable,
    InsufficientData,
}

impl ComplianceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceType::Compliant => "COMPLIANT",
            ComplianceType::NonCompliant => "NON_COMPLIANT",
            ComplianceType::NotApplicable => "NOT_APPLICABLE",
            ComplianceType::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Evaluation {
    pub compliance_resource_type: String,
    pub compliance_resource_id: String,
    pub compliance_type: ComplianceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    pub ordering_timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait ConfigApi: Send + Sync {
    async fn put_evaluations(&self, result_token: &str, evaluations: Vec<Evaluation>) -> Result<()>;
}

pub struct Config<C> {
    client: C,
    retry: RetryConfig,
}

impl<C: ConfigApi> Config<C> {
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

    /// Send evaluations in batches the service accepts.
    pub async fn put_evaluations(&self, result_token: &str, evaluations: &[Evaluation]) -> Result<()> {
        for batch in chunker(evaluations, MAX_EVALUATIONS_PER_CALL)? {
            let results: Vec<(&str, &str)> = batch
                .iter()
                .map(|e| (e.compliance_resource_id.as_str(), e.compliance_type.as_str()))
                .collect();
            tracing::info!(evaluations = ?results, "Sending evaluation results");

            throttled_call_with(&self.retry, || {
                self.client.put_evaluations(result_token, batch.to_vec())
            })
            .await?;
        }
        Ok(())
    }
}
