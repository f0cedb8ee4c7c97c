//! Service trait implementations for the official `aws-sdk-*` clients.

use super::config::{ConfigApi, Evaluation};
use super::ec2::{Ec2Api, Image, Instance, Reservation, ReservationPage};
use super::parameter_store::{GetParametersOutput, Parameter, SsmApi};
use super::s3::{
    ListObjectsPage, ListObjectsRequest, ListVersionsPage, ListVersionsRequest, ObjectBody, ObjectRef, ObjectSummary,
    ObjectVersion, S3Api, VersionMarker,
};
use super::sts::{Credentials, StsApi};
use crate::tags::{Filter, Tag};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};

/// How long the S3 `object_exists` waiter polls before giving up.
pub const OBJECT_EXISTS_TIMEOUT: Duration = Duration::from_secs(100);

/// Map an SDK failure onto the crate error.
///
/// Only errors the service itself returned become [`Error::Service`]; the
/// waiters and `get_bucket_tags` rely on that. Timeouts, including a
/// connector timeout surfaced as a dispatch failure, become
/// [`Error::ReadTimeout`]. Anything else is an [`Error::Runtime`].
fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) => {
            return Error::ReadTimeout {
                operation: operation.to_string(),
            }
        }
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            return Error::ReadTimeout {
                operation: operation.to_string(),
            }
        }
        _ => {}
    }
    match err.as_service_error() {
        Some(service) => Error::service(
            operation,
            service.code().unwrap_or("Unknown"),
            service.message().unwrap_or_default(),
        ),
        None => Error::runtime_with_context(
            format!("{operation} failed before a service response"),
            ErrorContext::new()
                .with_details(DisplayErrorContext(&err).to_string())
                .with_source("aws-sdk"),
        ),
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl S3Api for aws_sdk_s3::Client {
    async fn list_objects_v2(&self, request: ListObjectsRequest) -> Result<ListObjectsPage> {
        let output = self
            .list_objects_v2()
            .bucket(request.bucket)
            .prefix(request.prefix)
            .set_continuation_token(request.continuation_token)
            .send()
            .await
            .map_err(|e| sdk_error("ListObjectsV2", e))?;

        let contents = output
            .contents()
            .iter()
            .map(|obj| ObjectSummary {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().unwrap_or(0),
                e_tag: obj.e_tag().map(str::to_string),
                last_modified: obj.last_modified().and_then(to_chrono),
            })
            .collect();
        Ok(ListObjectsPage {
            contents,
            next_continuation_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn list_object_versions(&self, request: ListVersionsRequest) -> Result<ListVersionsPage> {
        let (key_marker, version_id_marker) = match request.marker {
            Some(marker) => (Some(marker.key_marker), marker.version_id_marker),
            None => (None, None),
        };
        let output = self
            .list_object_versions()
            .bucket(request.bucket)
            .prefix(request.prefix)
            .set_key_marker(key_marker)
            .set_version_id_marker(version_id_marker)
            .send()
            .await
            .map_err(|e| sdk_error("ListObjectVersions", e))?;

        let versions = output
            .versions()
            .iter()
            .map(|v| ObjectVersion {
                key: v.key().unwrap_or_default().to_string(),
                version_id: v.version_id().map(str::to_string),
                is_latest: v.is_latest().unwrap_or(false),
                size: v.size().unwrap_or(0),
            })
            .collect();
        let next_marker = next_version_marker(
            output.is_truncated(),
            output.next_key_marker(),
            output.next_version_id_marker(),
        );
        Ok(ListVersionsPage { versions, next_marker })
    }

    async fn wait_until_object_exists(&self, object: &ObjectRef) -> Result<()> {
        use aws_sdk_s3::client::Waiters;

        self.wait_until_object_exists()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(object.version_id.clone())
            .wait(OBJECT_EXISTS_TIMEOUT)
            .await
            .map_err(|e| Error::Waiter {
                waiter: "object_exists".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn get_object(&self, object: &ObjectRef) -> Result<ObjectBody> {
        let output = self
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(object.version_id.clone())
            .send()
            .await
            .map_err(|e| sdk_error("GetObject", e))?;
        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn put_object(&self, object: &ObjectRef, body: Bytes) -> Result<u64> {
        let output = self
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error("PutObject", e))?;

        // PutObject does not report a size; ask for what was stored.
        let head = self
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(output.version_id().map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("HeadObject", e))?;
        Ok(head.content_length().unwrap_or(0).max(0) as u64)
    }

    async fn put_bucket_tagging(&self, bucket: &str, tags: Vec<Tag>) -> Result<()> {
        let tagging = s3_tagging(tags)?;
        self.put_bucket_tagging()
            .bucket(bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| sdk_error("PutBucketTagging", e))?;
        Ok(())
    }

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<Vec<Tag>> {
        let output = self
            .get_bucket_tagging()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketTagging", e))?;
        Ok(output.tag_set().iter().map(|t| Tag::new(t.key(), t.value())).collect())
    }

    async fn put_object_tagging(&self, object: &ObjectRef, tags: Vec<Tag>) -> Result<()> {
        let tagging = s3_tagging(tags)?;
        self.put_object_tagging()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(object.version_id.clone())
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| sdk_error("PutObjectTagging", e))?;
        Ok(())
    }

    async fn get_object_tagging(&self, object: &ObjectRef) -> Result<Vec<Tag>> {
        let output = self
            .get_object_tagging()
            .bucket(&object.bucket)
            .key(&object.key)
            .set_version_id(object.version_id.clone())
            .send()
            .await
            .map_err(|e| sdk_error("GetObjectTagging", e))?;
        Ok(output.tag_set().iter().map(|t| Tag::new(t.key(), t.value())).collect())
    }

    async fn copy_object(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()> {
        self.copy_object()
            .copy_source(copy_source(source))
            .bucket(&destination.bucket)
            .key(&destination.key)
            .send()
            .await
            .map_err(|e| sdk_error("CopyObject", e))?;
        Ok(())
    }
}

// A marker is only returned while the listing is truncated.
fn next_version_marker(
    is_truncated: Option<bool>,
    key_marker: Option<&str>,
    version_id_marker: Option<&str>,
) -> Option<VersionMarker> {
    match (is_truncated, key_marker) {
        (Some(true), Some(key)) => Some(VersionMarker {
            key_marker: key.to_string(),
            version_id_marker: version_id_marker.map(str::to_string),
        }),
        _ => None,
    }
}

fn copy_source(source: &ObjectRef) -> String {
    match &source.version_id {
        Some(version_id) => format!("{}/{}?versionId={version_id}", source.bucket, source.key),
        None => format!("{}/{}", source.bucket, source.key),
    }
}

fn s3_tagging(tags: Vec<Tag>) -> Result<aws_sdk_s3::types::Tagging> {
    let build_error = |e: aws_sdk_s3::error::BuildError| {
        Error::validation_with_context(
            "Invalid S3 tag set",
            ErrorContext::new().with_details(e.to_string()).with_source("s3"),
        )
    };
    let tag_set = tags
        .into_iter()
        .map(|t| aws_sdk_s3::types::Tag::builder().key(t.key).value(t.value).build())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(build_error)?;
    aws_sdk_s3::types::Tagging::builder()
        .set_tag_set(Some(tag_set))
        .build()
        .map_err(build_error)
}

fn ec2_filters(filters: Vec<Filter>) -> Vec<aws_sdk_ec2::types::Filter> {
    filters
        .into_iter()
        .map(|f| {
            aws_sdk_ec2::types::Filter::builder()
                .name(f.name)
                .set_values(Some(f.values))
                .build()
        })
        .collect()
}

fn ec2_tags(tags: &[aws_sdk_ec2::types::Tag]) -> Vec<Tag> {
    tags.iter()
        .map(|t| Tag::new(t.key().unwrap_or_default(), t.value().unwrap_or_default()))
        .collect()
}

#[async_trait]
impl Ec2Api for aws_sdk_ec2::Client {
    async fn describe_instances(&self, filters: Vec<Filter>, next_token: Option<String>) -> Result<ReservationPage> {
        let output = self
            .describe_instances()
            .set_filters(Some(ec2_filters(filters)))
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeInstances", e))?;

        let reservations = output
            .reservations()
            .iter()
            .map(|r| Reservation {
                instances: r
                    .instances()
                    .iter()
                    .map(|i| Instance {
                        instance_id: i.instance_id().unwrap_or_default().to_string(),
                        image_id: i.image_id().unwrap_or_default().to_string(),
                        state: i
                            .state()
                            .and_then(|s| s.name())
                            .map(|n| n.as_str().to_string())
                            .unwrap_or_default(),
                        tags: ec2_tags(i.tags()),
                    })
                    .collect(),
            })
            .collect();
        Ok(ReservationPage {
            reservations,
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn describe_images(&self, filters: Vec<Filter>, owners: Vec<String>) -> Result<Vec<Image>> {
        let output = self
            .describe_images()
            .set_filters(Some(ec2_filters(filters)))
            .set_owners(Some(owners))
            .send()
            .await
            .map_err(|e| sdk_error("DescribeImages", e))?;

        Ok(output
            .images()
            .iter()
            .map(|i| Image {
                image_id: i.image_id().unwrap_or_default().to_string(),
                creation_date: i.creation_date().unwrap_or_default().to_string(),
                tags: ec2_tags(i.tags()),
            })
            .collect())
    }
}

#[async_trait]
impl StsApi for aws_sdk_sts::Client {
    async fn assume_role(&self, role_arn: &str, session_name: &str) -> Result<Credentials> {
        let output = self
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .send()
            .await
            .map_err(|e| sdk_error("AssumeRole", e))?;

        let credentials = output
            .credentials()
            .ok_or_else(|| Error::service("AssumeRole", "MissingCredentials", "AssumeRole returned no credentials"))?;
        Ok(Credentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration: to_chrono(credentials.expiration()),
        })
    }
}

/// Shared config whose clients act with `credentials`, e.g. from
/// [`Sts::assume_role`](super::sts::Sts::assume_role).
pub async fn sdk_config_for_credentials(credentials: &Credentials) -> aws_config::SdkConfig {
    let provider = aws_sdk_sts::config::Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        Some(credentials.session_token.clone()),
        credentials.expiration.map(SystemTime::from),
        "AssumedRole",
    );
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .credentials_provider(provider)
        .load()
        .await
}

#[async_trait]
impl SsmApi for aws_sdk_ssm::Client {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<Parameter> {
        let output = self
            .get_parameter()
            .name(name)
            .with_decryption(with_decryption)
            .send()
            .await
            .map_err(|e| sdk_error("GetParameter", e))?;

        let parameter = output
            .parameter()
            .ok_or_else(|| Error::service("GetParameter", "ParameterNotFound", name))?;
        Ok(Parameter {
            name: parameter.name().unwrap_or(name).to_string(),
            value: parameter.value().unwrap_or_default().to_string(),
        })
    }

    async fn get_parameters(&self, names: Vec<String>, with_decryption: bool) -> Result<GetParametersOutput> {
        let output = self
            .get_parameters()
            .set_names(Some(names))
            .with_decryption(with_decryption)
            .send()
            .await
            .map_err(|e| sdk_error("GetParameters", e))?;

        Ok(GetParametersOutput {
            parameters: output
                .parameters()
                .iter()
                .map(|p| Parameter {
                    name: p.name().unwrap_or_default().to_string(),
                    value: p.value().unwrap_or_default().to_string(),
                })
                .collect(),
            invalid_parameters: output.invalid_parameters().to_vec(),
        })
    }
}

#[async_trait]
impl ConfigApi for aws_sdk_config::Client {
    async fn put_evaluations(&self, result_token: &str, evaluations: Vec<Evaluation>) -> Result<()> {
        let evaluations = evaluations
            .into_iter()
            .map(|e| {
                aws_sdk_config::types::Evaluation::builder()
                    .compliance_resource_type(e.compliance_resource_type)
                    .compliance_resource_id(e.compliance_resource_id)
                    .compliance_type(aws_sdk_config::types::ComplianceType::from(e.compliance_type.as_str()))
                    .set_annotation(e.annotation)
                    .ordering_timestamp(aws_sdk_config::primitives::DateTime::from_millis(
                        e.ordering_timestamp.timestamp_millis(),
                    ))
                    .build()
                    .map_err(|err| {
                        Error::validation_with_context(
                            "Invalid evaluation",
                            ErrorContext::new().with_details(err.to_string()).with_source("config"),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        self.put_evaluations()
            .result_token(result_token)
            .set_evaluations(Some(evaluations))
            .send()
            .await
            .map_err(|e| sdk_error("PutEvaluations", e))?;
        Ok(())
    }
}
