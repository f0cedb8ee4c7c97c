//! Spotinst Elastigroup API client and tag helpers.

mod client;
mod types;

pub use client::{RateExceededPolicy, SpotinstClient, SpotinstClientBuilder, RATE_LIMIT_MIN_WAIT, SPOTINST_API_HOST};
pub use types::{
    map_to_spotinst_tags, spotinst_tags_to_map, tag_for_group, HealthCheckType, RollGroupRequest, RollStrategy,
    SpotinstTag,
};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpotinstError {
    /// The API rejected the request.
    #[error("Spotinst API error: {0}")]
    Api(String),

    /// The request was throttled or never reached the API. Worth retrying.
    #[error("Spotinst rate exceeded: {0}")]
    RateExceeded(String),
}
