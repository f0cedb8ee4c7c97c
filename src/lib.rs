//! # amplify-aws-utils
//!
//! Helpers for talking to AWS from long running tooling: calls that survive
//! throttling, waiters with jittered backoff, paging, tag conversions and thin
//! service wrappers.
//!
//! ## Overview
//!
//! Every AWS call made through this crate goes through [`throttled_call`]: a
//! throttled request (`Throttling`, `RequestLimitExceeded`,
//! `TooManyRequestsException`) is retried with decorrelated jitter for up to five
//! minutes, and any other error is returned at once. [`keep_trying`] retries
//! every error instead.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amplify_aws_utils::{throttled_call, Error, S3Uri};
//!
//! # async fn describe(_bucket: &str) -> amplify_aws_utils::Result<u32> { Ok(1) }
//! #[tokio::main]
//! async fn main() -> amplify_aws_utils::Result<()> {
//!     amplify_aws_utils::logging::init_tracing();
//!
//!     let uri = S3Uri::parse("s3://my-bucket/some/key.json")?;
//!     let count = throttled_call(|| describe(uri.bucket())).await?;
//!     println!("{} -> {count}", uri.key());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`jitter`] | Decorrelated jitter backoff |
//! | [`retry`] | Throttled and keep-trying retry loops |
//! | [`waiter`] | Waiting for resources to reach a state |
//! | [`paging`] | Collecting every page of a listing call |
//! | [`tags`] | Tag and filter conversions |
//! | [`helpers`] | Find-or-create, chunking, DynamoDB records, booleans |
//! | [`s3_uri`] | `s3://bucket/key` parsing |
//! | [`lambda`] | Catch-all wrapper for Lambda handlers |
//! | [`clients`] | S3, EC2, STS, Parameter Store, Config and Spotinst clients |
//! | [`logging`] | `tracing` subscriber setup |

pub mod clients;
pub mod helpers;
pub mod jitter;
pub mod lambda;
pub mod logging;
pub mod paging;
pub mod retry;
pub mod s3_uri;
pub mod tags;
pub mod waiter;

pub use helpers::{check_written_s3, chunker, dynamodb_record_to_map, find_or_create, str_to_bool, to_bool};
pub use jitter::Jitter;
pub use lambda::{catchall, CatchAll, CatchAllOptions};
pub use paging::{collect_pages, get_paged_results, page_stream, Page, PageKeys};
pub use retry::{keep_trying, throttled_call, throttled_call_with, RetryConfig, RetryPolicy};
pub use s3_uri::S3Uri;
pub use tags::{create_filters, key_values_to_tags, map_to_tags, tag_list_to_map, tags_to_map, Filter, Tag};
pub use waiter::{
    wait_for_resources_state, wait_for_sshable, wait_for_state, RemoteCommand, StateQuery, StatefulResource,
    WaitConfig,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
