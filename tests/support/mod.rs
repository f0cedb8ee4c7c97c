//! In-memory service fakes shared by the integration tests.
#![allow(dead_code)]

use amplify_aws_utils::clients::config::{ConfigApi, Evaluation};
use amplify_aws_utils::clients::ec2::{Ec2Api, Image, Instance, Reservation, ReservationPage};
use amplify_aws_utils::clients::parameter_store::{GetParametersOutput, Parameter, SsmApi};
use amplify_aws_utils::clients::s3::{
    ListObjectsPage, ListObjectsRequest, ListVersionsPage, ListVersionsRequest, ObjectBody, ObjectRef, ObjectSummary,
    ObjectVersion, S3Api, VersionMarker,
};
use amplify_aws_utils::clients::sts::{Credentials, StsApi};
use amplify_aws_utils::{Error, ErrorContext, Filter, RetryConfig, Result, Tag};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Retry budget small enough that throttled tests finish quickly on a paused clock.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new(Duration::from_secs(5), Duration::from_millis(10))
}

fn throttle(remaining: &AtomicU32, operation: &str) -> Result<()> {
    let throttled = remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if throttled {
        Err(Error::service(operation, "Throttling", "Rate exceeded"))
    } else {
        Ok(())
    }
}

type Key = (String, String);

fn key_of(object: &ObjectRef) -> Key {
    (object.bucket.clone(), object.key.clone())
}

pub struct FakeS3 {
    pub objects: Mutex<BTreeMap<Key, Vec<u8>>>,
    pub bucket_tags: Mutex<BTreeMap<String, Vec<Tag>>>,
    pub object_tags: Mutex<BTreeMap<Key, Vec<Tag>>>,
    pub list_requests: Mutex<Vec<ListObjectsRequest>>,
    pub version_requests: Mutex<Vec<ListVersionsRequest>>,
    pub page_size: usize,
    /// Number of upcoming calls that fail with `Throttling`.
    pub throttle_next: AtomicU32,
    /// Report one byte fewer than was sent on every put.
    pub short_writes: AtomicBool,
    /// Fail tagging calls as if the endpoint could not be reached.
    pub unreachable: AtomicBool,
}

impl FakeS3 {
    pub fn new(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            bucket_tags: Mutex::new(BTreeMap::new()),
            object_tags: Mutex::new(BTreeMap::new()),
            list_requests: Mutex::new(Vec::new()),
            version_requests: Mutex::new(Vec::new()),
            page_size,
            throttle_next: AtomicU32::new(0),
            short_writes: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn insert(&self, bucket: &str, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
    }

    fn keys_under(&self, bucket: &str, prefix: &str) -> Vec<(String, usize)> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), body)| (k.clone(), body.len()))
            .collect()
    }
}

#[async_trait]
impl S3Api for FakeS3 {
    async fn list_objects_v2(&self, request: ListObjectsRequest) -> Result<ListObjectsPage> {
        throttle(&self.throttle_next, "ListObjectsV2")?;
        self.list_requests.lock().unwrap().push(request.clone());

        let keys = self.keys_under(&request.bucket, &request.prefix);
        let start: usize = request
            .continuation_token
            .as_deref()
            .map(|t| t.parse().unwrap())
            .unwrap_or(0);
        let end = (start + self.page_size).min(keys.len());
        let contents = keys[start..end]
            .iter()
            .map(|(key, size)| ObjectSummary {
                key: key.clone(),
                size: *size as i64,
                e_tag: None,
                last_modified: None,
            })
            .collect();
        Ok(ListObjectsPage {
            contents,
            next_continuation_token: (end < keys.len()).then(|| end.to_string()),
        })
    }

    async fn list_object_versions(&self, request: ListVersionsRequest) -> Result<ListVersionsPage> {
        throttle(&self.throttle_next, "ListObjectVersions")?;
        self.version_requests.lock().unwrap().push(request.clone());

        let keys: Vec<(String, usize)> = self
            .keys_under(&request.bucket, &request.prefix)
            .into_iter()
            .filter(|(k, _)| match &request.marker {
                Some(marker) => k.as_str() > marker.key_marker.as_str(),
                None => true,
            })
            .collect();
        let page: Vec<_> = keys.iter().take(self.page_size).collect();
        let versions = page
            .iter()
            .map(|(key, size)| ObjectVersion {
                key: key.clone(),
                version_id: Some(format!("{key}-v1")),
                is_latest: true,
                size: *size as i64,
            })
            .collect();
        let next_marker = match page.last() {
            Some((key, _)) if keys.len() > self.page_size => Some(VersionMarker {
                key_marker: key.clone(),
                version_id_marker: Some(format!("{key}-v1")),
            }),
            _ => None,
        };
        Ok(ListVersionsPage { versions, next_marker })
    }

    async fn wait_until_object_exists(&self, object: &ObjectRef) -> Result<()> {
        if self.objects.lock().unwrap().contains_key(&key_of(object)) {
            Ok(())
        } else {
            Err(Error::Waiter {
                waiter: "object_exists".to_string(),
                message: "Max attempts exceeded".to_string(),
            })
        }
    }

    async fn get_object(&self, object: &ObjectRef) -> Result<ObjectBody> {
        throttle(&self.throttle_next, "GetObject")?;
        match self.objects.lock().unwrap().get(&key_of(object)) {
            Some(body) => Ok(Box::pin(std::io::Cursor::new(body.clone()))),
            None => Err(Error::service("GetObject", "NoSuchKey", "The specified key does not exist.")),
        }
    }

    async fn put_object(&self, object: &ObjectRef, body: Bytes) -> Result<u64> {
        throttle(&self.throttle_next, "PutObject")?;
        let written = body.len() as u64;
        self.objects.lock().unwrap().insert(key_of(object), body.to_vec());
        if self.short_writes.load(Ordering::SeqCst) {
            Ok(written.saturating_sub(1))
        } else {
            Ok(written)
        }
    }

    async fn put_bucket_tagging(&self, bucket: &str, tags: Vec<Tag>) -> Result<()> {
        throttle(&self.throttle_next, "PutBucketTagging")?;
        self.bucket_tags.lock().unwrap().insert(bucket.to_string(), tags);
        Ok(())
    }

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<Vec<Tag>> {
        throttle(&self.throttle_next, "GetBucketTagging")?;
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::runtime_with_context(
                "GetBucketTagging failed before a service response",
                ErrorContext::new().with_details("connection refused"),
            ));
        }
        self.bucket_tags
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .ok_or_else(|| Error::service("GetBucketTagging", "NoSuchTagSet", "The TagSet does not exist"))
    }

    async fn put_object_tagging(&self, object: &ObjectRef, tags: Vec<Tag>) -> Result<()> {
        self.object_tags.lock().unwrap().insert(key_of(object), tags);
        Ok(())
    }

    async fn get_object_tagging(&self, object: &ObjectRef) -> Result<Vec<Tag>> {
        Ok(self
            .object_tags
            .lock()
            .unwrap()
            .get(&key_of(object))
            .cloned()
            .unwrap_or_default())
    }

    async fn copy_object(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let body = objects
            .get(&key_of(source))
            .cloned()
            .ok_or_else(|| Error::service("CopyObject", "NoSuchKey", "The specified key does not exist."))?;
        objects.insert(key_of(destination), body);
        Ok(())
    }
}

pub fn instance(id: &str, image_id: &str, state: &str, environment: &str) -> Instance {
    Instance {
        instance_id: id.to_string(),
        image_id: image_id.to_string(),
        state: state.to_string(),
        tags: vec![Tag::new("environment", environment)],
    }
}

pub struct FakeEc2 {
    pub instances: Mutex<Vec<Instance>>,
    pub images: Vec<Image>,
    pub page_size: usize,
    pub describe_filters: Mutex<Vec<Vec<Filter>>>,
    pub image_owners: Mutex<Vec<Vec<String>>>,
    /// States applied one per describe-by-id call.
    pub transitions: Mutex<VecDeque<String>>,
    pub throttle_next: AtomicU32,
}

impl FakeEc2 {
    pub fn new(instances: Vec<Instance>, images: Vec<Image>, page_size: usize) -> Self {
        Self {
            instances: Mutex::new(instances),
            images,
            page_size,
            describe_filters: Mutex::new(Vec::new()),
            image_owners: Mutex::new(Vec::new()),
            transitions: Mutex::new(VecDeque::new()),
            throttle_next: AtomicU32::new(0),
        }
    }
}

fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter().find(|t| t.key == key).map(|t| t.value.as_str())
}

fn instance_matches(instance: &Instance, filter: &Filter) -> bool {
    let value = match filter.name.as_str() {
        "instance-id" => Some(instance.instance_id.as_str()),
        "instance-state-name" => Some(instance.state.as_str()),
        name => name.strip_prefix("tag:").and_then(|key| tag_value(&instance.tags, key)),
    };
    value.is_some_and(|v| filter.values.iter().any(|f| f == v))
}

#[async_trait]
impl Ec2Api for FakeEc2 {
    async fn describe_instances(&self, filters: Vec<Filter>, next_token: Option<String>) -> Result<ReservationPage> {
        throttle(&self.throttle_next, "DescribeInstances")?;
        self.describe_filters.lock().unwrap().push(filters.clone());

        let mut instances = self.instances.lock().unwrap();
        if let Some(id_filter) = filters.iter().find(|f| f.name == "instance-id") {
            if let Some(next_state) = self.transitions.lock().unwrap().pop_front() {
                for instance in instances.iter_mut().filter(|i| id_filter.values.contains(&i.instance_id)) {
                    instance.state = next_state.clone();
                }
            }
        }

        let matching: Vec<Instance> = instances
            .iter()
            .filter(|i| filters.iter().all(|f| instance_matches(i, f)))
            .cloned()
            .collect();
        let start: usize = next_token.as_deref().map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(matching.len());
        let reservations = matching[start..end]
            .iter()
            .map(|i| Reservation {
                instances: vec![i.clone()],
            })
            .collect();
        Ok(ReservationPage {
            reservations,
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn describe_images(&self, filters: Vec<Filter>, owners: Vec<String>) -> Result<Vec<Image>> {
        throttle(&self.throttle_next, "DescribeImages")?;
        self.image_owners.lock().unwrap().push(owners);
        Ok(self
            .images
            .iter()
            .filter(|image| {
                filters.iter().all(|f| {
                    f.name
                        .strip_prefix("tag:")
                        .and_then(|key| tag_value(&image.tags, key))
                        .is_some_and(|v| f.values.iter().any(|x| x == v))
                })
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeSts {
    pub calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl StsApi for FakeSts {
    async fn assume_role(&self, role_arn: &str, session_name: &str) -> Result<Credentials> {
        self.calls
            .lock()
            .unwrap()
            .push((role_arn.to_string(), session_name.to_string()));
        Ok(Credentials {
            access_key_id: "ASIAFAKE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: format!("token-for-{session_name}"),
            expiration: None,
        })
    }
}

#[derive(Default)]
pub struct FakeSsm {
    pub parameters: BTreeMap<String, String>,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub decrypted: Mutex<Vec<bool>>,
}

impl FakeSsm {
    pub fn with_parameters(parameters: &[(&str, &str)]) -> Self {
        Self {
            parameters: parameters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SsmApi for FakeSsm {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<Parameter> {
        self.decrypted.lock().unwrap().push(with_decryption);
        self.parameters
            .get(name)
            .map(|value| Parameter {
                name: name.to_string(),
                value: value.clone(),
            })
            .ok_or_else(|| Error::service("GetParameter", "ParameterNotFound", name))
    }

    async fn get_parameters(&self, names: Vec<String>, with_decryption: bool) -> Result<GetParametersOutput> {
        self.decrypted.lock().unwrap().push(with_decryption);
        self.batches.lock().unwrap().push(names.clone());

        let mut output = GetParametersOutput::default();
        for name in names {
            match self.parameters.get(&name) {
                Some(value) => output.parameters.push(Parameter {
                    name,
                    value: value.clone(),
                }),
                None => output.invalid_parameters.push(name),
            }
        }
        Ok(output)
    }
}

#[derive(Default)]
pub struct FakeConfig {
    pub batches: Mutex<Vec<(String, Vec<Evaluation>)>>,
    pub throttle_next: AtomicU32,
}

#[async_trait]
impl ConfigApi for FakeConfig {
    async fn put_evaluations(&self, result_token: &str, evaluations: Vec<Evaluation>) -> Result<()> {
        throttle(&self.throttle_next, "PutEvaluations")?;
        self.batches
            .lock()
            .unwrap()
            .push((result_token.to_string(), evaluations));
        Ok(())
    }
}
