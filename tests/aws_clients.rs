//! Service wrappers exercised against in-memory fakes.

mod support;

use amplify_aws_utils::clients::config::{ComplianceType, Config, Evaluation};
use amplify_aws_utils::clients::ec2::{Ec2, Image};
use amplify_aws_utils::clients::parameter_store::ParameterStore;
use amplify_aws_utils::clients::s3::{ObjectRef, S3};
use amplify_aws_utils::clients::sts::Sts;
use amplify_aws_utils::{wait_for_state, Error, S3Uri, Tag, WaitConfig};
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::*;

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn s3_with_objects(page_size: usize) -> S3<FakeS3> {
    let fake = FakeS3::new(page_size);
    for key in ["logs/a", "logs/b", "logs/c", "logs/d", "logs/e", "other/x"] {
        fake.insert("bucket", key, key.as_bytes());
    }
    S3::new(fake).with_retry_config(fast_retry())
}

#[tokio::test]
async fn test_list_objects_follows_continuation_tokens() {
    let s3 = s3_with_objects(2);
    let objects = s3.list_objects("bucket", "logs/").await.unwrap();

    let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["logs/a", "logs/b", "logs/c", "logs/d", "logs/e"]);

    let requests = s3.client().list_requests.lock().unwrap();
    let tokens: Vec<Option<&str>> = requests.iter().map(|r| r.continuation_token.as_deref()).collect();
    assert_eq!(tokens, vec![None, Some("2"), Some("4")]);
}

#[tokio::test]
async fn test_list_versions_follows_markers() {
    let s3 = s3_with_objects(2);
    let versions = s3.list_versions("bucket", "logs/").await.unwrap();

    assert_eq!(versions.len(), 5);
    assert!(versions.iter().all(|v| v.is_latest));
    let requests = s3.client().version_requests.lock().unwrap();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[1].marker.as_ref().map(|m| m.key_marker.as_str()),
        Some("logs/b")
    );
}

#[tokio::test]
async fn test_write_then_read_and_hash() {
    let s3 = S3::new(FakeS3::new(10)).with_retry_config(fast_retry());
    let object = ObjectRef::new("bucket", "greeting.txt");

    s3.write_file(&object, "hello world").await.unwrap();
    assert_eq!(s3.read_file(&object, true).await.unwrap(), "hello world");
    assert_eq!(
        s3.hash_file(&object).await.unwrap(),
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );

    let mut out = Vec::new();
    let copied = s3.download_file(&object, &mut out, false).await.unwrap();
    assert_eq!(copied, 11);
    assert_eq!(out, b"hello world");
}

#[tokio::test]
async fn test_write_file_detects_short_writes() {
    let fake = FakeS3::new(10);
    fake.short_writes.store(true, Ordering::SeqCst);
    let s3 = S3::new(fake).with_retry_config(fast_retry());

    let err = s3
        .write_file(&ObjectRef::new("bucket", "report.csv"), "a,b,c\n")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::S3Writing(ref name) if name == "report.csv"));
    assert_eq!(err.to_string(), "report.csv is not written correctly to S3 bucket");
}

#[tokio::test]
async fn test_read_missing_object() {
    let s3 = S3::new(FakeS3::new(10)).with_retry_config(fast_retry());
    let object = ObjectRef::new("bucket", "missing");

    let err = s3.read_file(&object, true).await.unwrap_err();
    assert!(matches!(err, Error::Waiter { .. }));

    let err = s3.read_file(&object, false).await.unwrap_err();
    assert_eq!(err.code(), Some("NoSuchKey"));
}

#[tokio::test(start_paused = true)]
async fn test_throttled_reads_are_retried() {
    let s3 = s3_with_objects(10);
    s3.client().throttle_next.store(3, Ordering::SeqCst);

    let body = s3.read_file(&ObjectRef::new("bucket", "logs/a"), false).await.unwrap();
    assert_eq!(body, "logs/a");
    assert_eq!(s3.client().throttle_next.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bucket_tags_merge_and_replace() {
    let s3 = S3::new(FakeS3::new(10)).with_retry_config(fast_retry());

    assert!(s3.get_bucket_tags("bucket").await.unwrap().is_empty());

    s3.put_bucket_tags("bucket", &map(&[("team", "data"), ("env", "ci")]), false)
        .await
        .unwrap();
    s3.put_bucket_tags("bucket", &map(&[("env", "prod"), ("owner", "ops")]), true)
        .await
        .unwrap();
    assert_eq!(
        s3.get_bucket_tags("bucket").await.unwrap(),
        map(&[("env", "prod"), ("owner", "ops"), ("team", "data")])
    );

    s3.put_bucket_tags("bucket", &map(&[("only", "this")]), false)
        .await
        .unwrap();
    assert_eq!(s3.get_bucket_tags("bucket").await.unwrap(), map(&[("only", "this")]));
}

#[tokio::test]
async fn test_bucket_tags_connection_failure_is_not_an_empty_tag_set() {
    let s3 = S3::new(FakeS3::new(10)).with_retry_config(fast_retry());
    s3.put_bucket_tags("bucket", &map(&[("team", "data")]), false)
        .await
        .unwrap();
    s3.client().unreachable.store(true, Ordering::SeqCst);

    let err = s3.get_bucket_tags("bucket").await.unwrap_err();
    assert!(matches!(err, Error::Runtime { .. }));

    let err = s3
        .put_bucket_tags("bucket", &map(&[("env", "prod")]), true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Runtime { .. }));
    assert_eq!(
        s3.client().bucket_tags.lock().unwrap()["bucket"],
        vec![Tag::new("team", "data")]
    );
}

#[tokio::test]
async fn test_object_tags_and_copy() {
    let s3 = s3_with_objects(10);
    let uri = S3Uri::parse("s3://bucket/logs/a").unwrap();
    let source = ObjectRef::new(uri.bucket(), uri.key());
    let destination = ObjectRef::new("archive", "2024/logs/a");

    s3.copy_file(&source, &destination).await.unwrap();
    assert_eq!(s3.read_file(&destination, false).await.unwrap(), "logs/a");

    s3.put_object_tags(&destination, &map(&[("retention", "30d")]))
        .await
        .unwrap();
    assert_eq!(
        s3.get_object_tags(&destination).await.unwrap(),
        map(&[("retention", "30d")])
    );
    assert!(s3.get_object_tags(&source).await.unwrap().is_empty());
}

fn ec2_fixture() -> Ec2<FakeEc2> {
    let instances = vec![
        instance("i-1", "ami-old", "running", "ci"),
        instance("i-2", "ami-new", "running", "ci"),
        instance("i-3", "ami-new", "stopped", "ci"),
        instance("i-4", "ami-new", "running", "prod"),
        instance("i-5", "ami-other", "running", "ci"),
    ];
    let images = vec![
        Image {
            image_id: "ami-old".into(),
            creation_date: "2023-01-01T00:00:00.000Z".into(),
            tags: vec![Tag::new("source_ami", "ami-base")],
        },
        Image {
            image_id: "ami-new".into(),
            creation_date: "2024-06-01T12:30:00.000Z".into(),
            tags: vec![Tag::new("source_ami", "ami-base")],
        },
        Image {
            image_id: "ami-other".into(),
            creation_date: "2024-07-01T00:00:00.000Z".into(),
            tags: vec![Tag::new("source_ami", "ami-unrelated")],
        },
    ];
    Ec2::new(FakeEc2::new(instances, images, 2)).with_retry_config(fast_retry())
}

#[tokio::test]
async fn test_find_instances_filters_and_pages() {
    let ec2 = ec2_fixture();
    let amis: BTreeSet<String> = ["ami-new".to_string(), "ami-old".to_string()].into();

    let found = ec2
        .find_instances(Some(&amis), Some("ci"), Some("running"))
        .await
        .unwrap();
    let ids: Vec<&str> = found.iter().map(|i| i.instance_id.as_str()).collect();
    assert_eq!(ids, vec!["i-1", "i-2"]);

    let filters = ec2.client().describe_filters.lock().unwrap();
    let names: BTreeSet<&str> = filters[0].iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, BTreeSet::from(["instance-state-name", "tag:environment"]));
}

#[tokio::test]
async fn test_find_instances_without_filters() {
    let ec2 = ec2_fixture();
    let found = ec2.find_instances(None, None, None).await.unwrap();
    assert_eq!(found.len(), 5);
    assert!(ec2.client().describe_filters.lock().unwrap()[0].is_empty());
}

#[tokio::test]
async fn test_find_amis_by_source_and_age() {
    let ec2 = ec2_fixture();
    let sources: BTreeSet<String> = ["ami-base".to_string()].into();

    let all = ec2.find_amis(Some(&sources), None).await.unwrap();
    assert_eq!(all, BTreeSet::from(["ami-new".to_string(), "ami-old".to_string()]));

    let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let newer = ec2.find_amis(Some(&sources), Some(cutoff)).await.unwrap();
    assert_eq!(newer, BTreeSet::from(["ami-new".to_string()]));

    assert_eq!(ec2.client().image_owners.lock().unwrap()[0], vec!["self".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_instance_running() {
    let ec2 = Ec2::new(FakeEc2::new(
        vec![instance("i-9", "ami-new", "pending", "ci")],
        Vec::new(),
        10,
    ))
    .with_retry_config(fast_retry());
    ec2.client()
        .transitions
        .lock()
        .unwrap()
        .extend(["pending".to_string(), "pending".to_string(), "running".to_string()]);

    let mut handle = ec2.instance("i-9");
    let config = WaitConfig::default().with_min_wait(Duration::from_millis(100));
    wait_for_state(&mut handle, "running", &config).await.unwrap();
    assert!(ec2.client().transitions.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_instance_terminated_fails_early() {
    let ec2 = Ec2::new(FakeEc2::new(
        vec![instance("i-9", "ami-new", "pending", "ci")],
        Vec::new(),
        10,
    ));
    ec2.client().transitions.lock().unwrap().push_back("terminated".to_string());

    let mut handle = ec2.instance("i-9");
    let err = wait_for_state(&mut handle, "running", &WaitConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExpectedTimeout(_)));
}

#[tokio::test]
async fn test_assume_role_session_names() {
    let sts = Sts::new(FakeSts::default()).with_retry_config(fast_retry());

    sts.assume_role("123456789012", "deployer", None).await.unwrap();
    let creds = sts
        .assume_role("123456789012", "auditor", Some("nightly-audit"))
        .await
        .unwrap();
    assert_eq!(creds.session_token, "token-for-nightly-audit");

    let session = sts
        .client_for_account("210987654321", "reader", |c| format!("client:{}", c.access_key_id))
        .await
        .unwrap();
    assert_eq!(session, "client:ASIAFAKE");

    assert_eq!(
        *sts.client().calls.lock().unwrap(),
        vec![
            ("arn:aws:iam::123456789012:role/deployer".to_string(), "AssumedRole".to_string()),
            ("arn:aws:iam::123456789012:role/auditor".to_string(), "nightly-audit".to_string()),
            ("arn:aws:iam::210987654321:role/reader".to_string(), "AssumedRole".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_parameter_store_reads_decrypted() {
    let names: Vec<String> = (0..12).map(|i| format!("/app/param-{i:02}")).collect();
    let pairs: Vec<(String, String)> = names.iter().map(|n| (n.clone(), format!("value of {n}"))).collect();
    let fake = FakeSsm::with_parameters(
        &pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect::<Vec<_>>(),
    );
    let store = ParameterStore::new(fake).with_retry_config(fast_retry());

    assert_eq!(store.get_parameter("/app/param-03").await.unwrap(), "value of /app/param-03");

    let requested: Vec<&str> = names.iter().map(String::as_str).collect();
    let values = store.get_parameters(&requested).await.unwrap();
    assert_eq!(values.len(), 12);
    assert_eq!(values["/app/param-11"], "value of /app/param-11");

    let batch_sizes: Vec<usize> = store.client().batches.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(batch_sizes, vec![10, 2]);
    assert!(store.client().decrypted.lock().unwrap().iter().all(|d| *d));
}

#[tokio::test]
async fn test_parameter_store_rejects_unknown_names() {
    let store = ParameterStore::new(FakeSsm::with_parameters(&[("/known", "1")])).with_retry_config(fast_retry());

    let err = store.get_parameters(&["/known", "/unknown"]).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(err.to_string().contains("/unknown"));

    let err = store.get_parameter("/unknown").await.unwrap_err();
    assert_eq!(err.code(), Some("ParameterNotFound"));
}

fn evaluation(i: usize) -> Evaluation {
    Evaluation {
        compliance_resource_type: "AWS::EC2::Instance".to_string(),
        compliance_resource_id: format!("i-{i:04}"),
        compliance_type: if i % 2 == 0 {
            ComplianceType::Compliant
        } else {
            ComplianceType::NonCompliant
        },
        annotation: None,
        ordering_timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_put_evaluations_in_batches() {
    let fake = FakeConfig::default();
    fake.throttle_next.store(1, Ordering::SeqCst);
    let config = Config::new(fake).with_retry_config(fast_retry());

    let evaluations: Vec<Evaluation> = (0..250).map(evaluation).collect();
    config.put_evaluations("result-token", &evaluations).await.unwrap();

    let batches = config.client().batches.lock().unwrap();
    let sizes: Vec<usize> = batches.iter().map(|(_, b)| b.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert!(batches.iter().all(|(token, _)| token == "result-token"));
    assert_eq!(batches[2].1[0].compliance_resource_id, "i-0200");
}
