//! Spotinst request and tag types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How Spotinst decides a replacement instance is healthy during a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthCheckType {
    Elb,
    TargetGroup,
    Mlb,
    Hcs,
    Ec2,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollStrategy {
    pub action: String,
}

/// Body of `PUT aws/ec2/group/{id}/roll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollGroupRequest {
    pub batch_size_percentage: u32,
    /// Seconds replacement instances get to pass health checks.
    pub grace_period: u32,
    pub health_check_type: HealthCheckType,
    pub strategy: RollStrategy,
}

impl RollGroupRequest {
    /// A roll that replaces servers, `batch_percentage` of the group at a time.
    pub fn replace_server(batch_percentage: u32, grace_period: u32, health_check_type: HealthCheckType) -> Self {
        Self {
            batch_size_percentage: batch_percentage,
            grace_period,
            health_check_type,
            strategy: RollStrategy {
                action: "REPLACE_SERVER".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotinstTag {
    pub tag_key: String,
    pub tag_value: String,
}

pub fn spotinst_tags_to_map(tags: &[SpotinstTag]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|t| (t.tag_key.clone(), t.tag_value.clone()))
        .collect()
}

pub fn map_to_spotinst_tags(tags: &BTreeMap<String, String>) -> Vec<SpotinstTag> {
    tags.iter()
        .map(|(k, v)| SpotinstTag {
            tag_key: k.clone(),
            tag_value: v.clone(),
        })
        .collect()
}

/// Value of tag `key` on an Elastigroup document, read from
/// `compute.launchSpecification.tags`. Malformed entries are skipped.
pub fn tag_for_group(group: &Value, key: &str) -> Option<String> {
    group
        .pointer("/compute/launchSpecification/tags")?
        .as_array()?
        .iter()
        .filter_map(|tag| serde_json::from_value::<SpotinstTag>(tag.clone()).ok())
        .find(|tag| tag.tag_key == key)
        .map(|tag| tag.tag_value)
}
