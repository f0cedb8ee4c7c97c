//! Wrapper for common EC2 describe calls.

use crate::paging::{collect_pages, Page};
use crate::retry::{throttled_call_with, RetryConfig};
use crate::tags::{create_filters, Filter, Tag};
use crate::waiter::StatefulResource;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Format of `Image.CreationDate`.
pub const CREATION_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub instance_id: String,
    pub image_id: String,
    /// Instance state name, e.g. `pending`, `running`, `terminated`.
    pub state: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reservation {
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Default)]
pub struct ReservationPage {
    pub reservations: Vec<Reservation>,
    pub next_token: Option<String>,
}

impl Page for ReservationPage {
    type Item = Reservation;
    type Token = String;

    fn into_parts(self) -> (Vec<Reservation>, Option<String>) {
        (self.reservations, self.next_token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    pub image_id: String,
    pub creation_date: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Image {
    pub fn created_at(&self) -> Result<DateTime<Utc>> {
        let naive = NaiveDateTime::parse_from_str(&self.creation_date, CREATION_DATE_FORMAT).map_err(|e| {
            Error::validation_with_context(
                "Unparseable image creation date",
                ErrorContext::new()
                    .with_field_path(format!("{}.CreationDate", self.image_id))
                    .with_details(e.to_string())
                    .with_source("ec2"),
            )
        })?;
        Ok(Utc.from_utc_datetime(&naive))
    }
}

/// The EC2 operations the wrapper needs.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    async fn describe_instances(
        &self,
        filters: Vec<Filter>,
        next_token: Option<String>,
    ) -> Result<ReservationPage>;

    async fn describe_images(&self, filters: Vec<Filter>, owners: Vec<String>) -> Result<Vec<Image>>;
}

pub struct Ec2<C> {
    client: C,
    retry: RetryConfig,
}

impl<C: Ec2Api> Ec2<C> {
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

    /// Find instances, optionally by environment tag and state, keeping only
    /// those launched from one of `amis` when that set is non-empty.
    pub async fn find_instances(
        &self,
        amis: Option<&BTreeSet<String>>,
        environment: Option<&str>,
        instance_state: Option<&str>,
    ) -> Result<Vec<Instance>> {
        let mut filters = BTreeMap::new();
        if let Some(environment) = environment.filter(|e| !e.is_empty()) {
            filters.insert("tag:environment".to_string(), vec![environment.to_string()]);
        }
        if let Some(state) = instance_state.filter(|s| !s.is_empty()) {
            filters.insert("instance-state-name".to_string(), vec![state.to_string()]);
        }
        let filters = create_filters(&filters);

        let reservations = collect_pages(
            |token: Option<String>| self.client.describe_instances(filters.clone(), token),
            &self.retry,
        )
        .await?;

        let instances: Vec<Instance> = reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .filter(|i| match amis {
                Some(amis) if !amis.is_empty() => amis.contains(&i.image_id),
                _ => true,
            })
            .collect();

        tracing::info!(
            instances = ?instances.iter().map(|i| i.instance_id.as_str()).collect::<BTreeSet<_>>(),
            "Discovered additional instances"
        );
        Ok(instances)
    }

    /// Find AMIs owned by this account, optionally only children of
    /// `source_amis` (via the `source_ami` tag) and only those created after `newer_than`.
    pub async fn find_amis(
        &self,
        source_amis: Option<&BTreeSet<String>>,
        newer_than: Option<DateTime<Utc>>,
    ) -> Result<BTreeSet<String>> {
        let mut filters = BTreeMap::new();
        if let Some(source_amis) = source_amis.filter(|s| !s.is_empty()) {
            filters.insert("tag:source_ami".to_string(), source_amis.iter().cloned().collect());
        }
        let filters = create_filters(&filters);

        let images = throttled_call_with(&self.retry, || {
            self.client
                .describe_images(filters.clone(), vec!["self".to_string()])
        })
        .await?;

        let mut image_ids = BTreeSet::new();
        for image in images {
            if let Some(cutoff) = newer_than {
                if image.created_at()? <= cutoff {
                    continue;
                }
            }
            image_ids.insert(image.image_id);
        }
        tracing::info!(images = ?image_ids, "Found additional images");
        Ok(image_ids)
    }

    /// A handle that re-describes one instance, for use with the waiters.
    pub fn instance(&self, instance_id: impl Into<String>) -> InstanceHandle<'_, C> {
        InstanceHandle {
            ec2: self,
            instance_id: instance_id.into(),
            state: String::new(),
        }
    }
}

/// One instance whose state is refreshed through `DescribeInstances`.
pub struct InstanceHandle<'a, C> {
    ec2: &'a Ec2<C>,
    instance_id: String,
    state: String,
}

#[async_trait]
impl<'a, C: Ec2Api> StatefulResource for InstanceHandle<'a, C> {
    async fn refresh(&mut self) -> Result<()> {
        let filters = vec![Filter {
            name: "instance-id".to_string(),
            values: vec![self.instance_id.clone()],
        }];
        let page = throttled_call_with(&self.ec2.retry, || {
            self.ec2.client.describe_instances(filters.clone(), None)
        })
        .await?;

        let instance = page
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .find(|i| i.instance_id == self.instance_id)
            .ok_or_else(|| {
                Error::service(
                    "DescribeInstances",
                    "InvalidInstanceID.NotFound",
                    format!("The instance ID '{}' does not exist", self.instance_id),
                )
            })?;
        self.state = instance.state;
        Ok(())
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn id(&self) -> &str {
        &self.instance_id
    }
}
