//! Thin wrappers over AWS services and the Spotinst API.
//!
//! Each AWS wrapper is generic over a small service trait (`S3Api`, `Ec2Api`,
//! ...) and retries throttled calls on its own. With the `aws-sdk` feature the
//! traits are implemented for the official SDK clients.

pub mod config;
pub mod ec2;
pub mod parameter_store;
pub mod s3;
pub mod spotinst;
pub mod sts;

#[cfg(feature = "aws-sdk")]
pub mod sdk;

pub use config::{ComplianceType, Config, ConfigApi, Evaluation};
pub use ec2::{Ec2, Ec2Api, Image, Instance, InstanceHandle};
pub use parameter_store::{ParameterStore, SsmApi};
pub use s3::{ObjectRef, S3Api, S3};
pub use spotinst::{SpotinstClient, SpotinstClientBuilder, SpotinstError};
pub use sts::{Credentials, Sts, StsApi};
