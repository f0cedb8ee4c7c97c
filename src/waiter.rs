//! Polling helpers that wait for AWS resources to reach a state.
//!
//! All waiters back off with [`Jitter`] between polls and treat service errors
//! as transient: a resource that keeps failing to describe itself ends in
//! [`Error::Timeout`] rather than an early failure. Resources that enter
//! `failed` or `terminated` end the wait immediately with
//! [`Error::ExpectedTimeout`].

use crate::jitter::{Jitter, DEFAULT_MIN_WAIT};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Default time budget for a waiter.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// States from which a resource never reaches any other wanted state.
pub const TERMINAL_STATES: &[&str] = &["failed", "terminated"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub min_wait: Duration,
}

impl WaitConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_wait(mut self, min_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            min_wait: DEFAULT_MIN_WAIT,
        }
    }
}

/// A resource whose state can be re-read from its service.
#[async_trait]
pub trait StatefulResource: Send {
    /// Re-read the resource from the service.
    async fn refresh(&mut self) -> Result<()>;

    /// State as of the last refresh.
    fn state(&self) -> &str;

    fn id(&self) -> &str;
}

/// Runs commands on an instance, e.g. over SSH.
#[async_trait]
pub trait RemoteCommand: Send + Sync {
    /// Run `command` on `instance_id` and return its exit code.
    async fn run(&self, instance_id: &str, command: &[&str]) -> Result<i32>;
}

fn is_terminal(state: &str) -> bool {
    TERMINAL_STATES.contains(&state)
}

fn swallow_transient(err: Error) -> Result<()> {
    match err {
        Error::Service { .. } | Error::ReadTimeout { .. } => {
            tracing::debug!(error = %err, "Ignoring transient error while waiting");
            Ok(())
        }
        other => Err(other),
    }
}

/// Wait for a single resource to reach `state`.
pub async fn wait_for_state<R>(resource: &mut R, state: &str, config: &WaitConfig) -> Result<()>
where
    R: StatefulResource + ?Sized,
{
    let mut jitter = Jitter::new(config.min_wait);
    let mut time_passed = Duration::ZERO;

    loop {
        match resource.refresh().await {
            Ok(()) => {
                let current = resource.state();
                if current == state {
                    return Ok(());
                }
                if is_terminal(current) {
                    return Err(Error::ExpectedTimeout(format!(
                        "{} entered state {} after {}s waiting for state {}",
                        resource.id(),
                        current,
                        time_passed.as_secs(),
                        state
                    )));
                }
            }
            Err(err) => swallow_transient(err)?,
        }

        if time_passed >= config.timeout {
            return Err(Error::Timeout(format!(
                "Timed out waiting for {} to change state to {} after {}s.",
                resource.id(),
                state,
                time_passed.as_secs()
            )));
        }

        time_passed = jitter.backoff().await;
    }
}

/// What to look for in a describe response.
#[derive(Debug, Clone)]
pub struct StateQuery {
    /// Parameters handed to every describe call.
    pub params: Value,
    /// Key of the response holding the resource, or a list of them.
    pub resources_key: String,
    pub expected_state: String,
    /// Key of each resource holding its state.
    pub state_attr: String,
}

impl StateQuery {
    pub fn new(
        params: Value,
        resources_key: impl Into<String>,
        expected_state: impl Into<String>,
    ) -> Self {
        Self {
            params,
            resources_key: resources_key.into(),
            expected_state: expected_state.into(),
            state_attr: "state".to_string(),
        }
    }

    pub fn with_state_attr(mut self, state_attr: impl Into<String>) -> Self {
        self.state_attr = state_attr.into();
        self
    }
}

enum Outcome {
    Done,
    Pending,
    Failed,
}

fn evaluate(query: &StateQuery, response: &Value) -> Result<Outcome> {
    let resources = response.get(&query.resources_key).ok_or_else(|| {
        Error::validation_with_context(
            "Describe response is missing the resources key",
            ErrorContext::new()
                .with_field_path(query.resources_key.clone())
                .with_source("waiter"),
        )
    })?;
    let resources: Vec<&Value> = match resources {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    let mut all_good = true;
    let mut failure = false;
    for resource in resources {
        let state = resource
            .get(&query.state_attr)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::validation_with_context(
                    "Resource has no state",
                    ErrorContext::new()
                        .with_field_path(query.state_attr.clone())
                        .with_source("waiter"),
                )
            })?;
        if is_terminal(state) {
            failure = true;
            all_good = false;
        } else if state != query.expected_state {
            all_good = false;
        }
    }

    Ok(if all_good {
        Outcome::Done
    } else if failure {
        Outcome::Failed
    } else {
        Outcome::Pending
    })
}

/// Wait until every resource returned by `describe` is in `query.expected_state`.
///
/// `describe` receives `query.params` and returns the raw describe response.
pub async fn wait_for_resources_state<F, Fut>(
    mut describe: F,
    query: &StateQuery,
    config: &WaitConfig,
) -> Result<()>
where
    F: FnMut(Value) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let mut jitter = Jitter::new(config.min_wait);
    let mut time_passed = Duration::ZERO;

    loop {
        match describe(query.params.clone()).await {
            Ok(response) => match evaluate(query, &response)? {
                Outcome::Done => return Ok(()),
                Outcome::Failed => {
                    return Err(Error::ExpectedTimeout(format!(
                        "At least some resources who meet the following description entered either \
                         'failed' or 'terminated' state after {}s waiting for state {}:\n{}",
                        time_passed.as_secs(),
                        query.expected_state,
                        query.params
                    )))
                }
                Outcome::Pending => {}
            },
            Err(err) => swallow_transient(err)?,
        }

        if time_passed >= config.timeout {
            return Err(Error::Timeout(format!(
                "Timed out waiting for resources who meet the following description to change \
                 state to {} after {}s:\n{}",
                query.expected_state,
                time_passed.as_secs(),
                query.params
            )));
        }

        time_passed = jitter.backoff().await;
    }
}

/// Wait for an instance to be running and then to accept remote commands.
pub async fn wait_for_sshable<R, C>(
    remote: &C,
    instance: &mut R,
    config: &WaitConfig,
    quiet: bool,
) -> Result<()>
where
    R: StatefulResource + ?Sized,
    C: RemoteCommand + ?Sized,
{
    if !quiet {
        tracing::info!(instance = instance.id(), "Waiting for instance to be fully provisioned");
    }
    wait_for_state(instance, "running", config).await?;
    if !quiet {
        tracing::info!(instance = instance.id(), "Instance running (booting up)");
    }

    let mut jitter = Jitter::new(config.min_wait);
    let mut time_passed = Duration::ZERO;
    loop {
        tracing::debug!(instance = instance.id(), "Waiting for instance to become sshable");
        match remote.run(instance.id(), &["true"]).await {
            Ok(0) => {
                tracing::info!(instance = instance.id(), "Instance now SSHable");
                tracing::debug!(
                    instance = instance.id(),
                    waited_secs = time_passed.as_secs(),
                    "Waited for instance to boot"
                );
                return Ok(());
            }
            Ok(code) => tracing::debug!(exit_code = code, "Remote command not ready"),
            Err(err) => tracing::debug!(error = %err, "Remote command failed"),
        }
        if time_passed >= config.timeout {
            break;
        }
        time_passed = jitter.backoff().await;
    }

    Err(Error::Timeout(format!(
        "Timed out waiting for instance {} to become sshable after {}s.",
        instance.id(),
        config.timeout.as_secs()
    )))
}
