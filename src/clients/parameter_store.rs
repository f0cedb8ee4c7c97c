//! Decrypted reads from SSM Parameter Store.

use crate::retry::{throttled_call_with, RetryConfig};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `GetParameters` accepts at most this many names per call.
pub const MAX_NAMES_PER_CALL: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetParametersOutput {
    pub parameters: Vec<Parameter>,
    pub invalid_parameters: Vec<String>,
}

#[async_trait]
pub trait SsmApi: Send + Sync {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<Parameter>;

    async fn get_parameters(&self, names: Vec<String>, with_decryption: bool) -> Result<GetParametersOutput>;
}

pub struct ParameterStore<C> {
    client: C,
    retry: RetryConfig,
}

impl<C: SsmApi> ParameterStore<C> {
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

    /// Decrypted value of a single parameter.
    pub async fn get_parameter(&self, name: &str) -> Result<String> {
        let parameter = throttled_call_with(&self.retry, || self.client.get_parameter(name, true)).await?;
        Ok(parameter.value)
    }

    /// Decrypted values of several parameters, keyed by name.
    ///
    /// Names are requested in batches of [`MAX_NAMES_PER_CALL`]. Any name the
    /// service reports as invalid fails the whole call.
    pub async fn get_parameters(&self, names: &[&str]) -> Result<BTreeMap<String, String>> {
        let mut values = BTreeMap::new();
        for batch in names.chunks(MAX_NAMES_PER_CALL) {
            let batch: Vec<String> = batch.iter().map(|n| n.to_string()).collect();
            let output = throttled_call_with(&self.retry, || {
                self.client.get_parameters(batch.clone(), true)
            })
            .await?;

            if !output.invalid_parameters.is_empty() {
                return Err(Error::validation_with_context(
                    "Unknown parameters requested",
                    ErrorContext::new()
                        .with_details(output.invalid_parameters.join(", "))
                        .with_source("parameter_store"),
                ));
            }
            values.extend(output.parameters.into_iter().map(|p| (p.name, p.value)));
        }
        Ok(values)
    }
}
