//! End-to-end passes over a static account.

use chrono::{TimeZone, Utc};
use domain_inventory::{
    CachedView, CloudProvider, CollectionOrchestrator, CollectionReport, CollectorRegistry,
    Credentials, InventoryService, ResultNode, Scope, StaticCloudApi,
};
use domain_jobs::{
    InMemoryJobStatusRepository, InMemoryResultCacheRepository, JobDetails, JobKind, JobRunner,
    JobState, JobStatusStore, ManualClock, ResultCache, Submission,
};
use serde_json::json;
use std::sync::Arc;

const REGION: &str = "eu-central-1";

fn account() -> StaticCloudApi {
    StaticCloudApi::from_json(
        &json!({
            "account_id": "123456789012",
            "regions": {
                "eu-central-1": {
                    "instances": [
                        {
                            "InstanceId": "i-web",
                            "InstanceType": "m5.large",
                            "State": "running",
                            "SubnetId": "subnet-a",
                            "VpcId": "vpc-1",
                            "LaunchTime": "2024-05-06T19:09:00Z"
                        },
                        {
                            "InstanceId": "i-lonely",
                            "InstanceType": "m5.large",
                            "State": "stopped"
                        }
                    ],
                    "vpcs": [{"VpcId": "vpc-1", "IsDefault": true, "State": "available"}],
                    "subnets": [
                        {"SubnetId": "subnet-a", "VpcId": "vpc-1", "AvailabilityZone": "eu-central-1a"},
                        {"SubnetId": "subnet-b", "VpcId": "vpc-1", "AvailabilityZone": "eu-central-1b"}
                    ]
                }
            },
            "buckets": [
                {
                    "Name": "assets",
                    "CreationDate": "2023-01-01T00:00:00Z",
                    "objects": [
                        {"Key": "b.txt", "Size": 20, "LastModified": "2024-01-02T00:00:00Z"},
                        {"Key": "a.txt", "Size": 10, "LastModified": "2024-01-01T00:00:00Z"},
                        {"Key": "c.txt", "Size": 30, "LastModified": "2024-01-03T00:00:00Z"}
                    ],
                    "bodies": {"a.txt": "0123456789"}
                },
                {"Name": "empty", "CreationDate": "2023-02-01T00:00:00Z"}
            ],
            "prices": [
                {
                    "service_code": "AmazonEC2",
                    "attributes": {
                        "instanceType": "m5.large",
                        "operatingSystem": "Linux",
                        "capacitystatus": "Used"
                    },
                    "usd": 0.1
                },
                {
                    "service_code": "AmazonS3",
                    "attributes": {"productFamily": "Storage"},
                    "usd": 0.000032
                }
            ],
            "costs": [
                {"Month": "2024-02", "Compute": 60.0, "BlockStorage": 5.0, "ObjectStorage": 1.0},
                {"Month": "2024-03", "Compute": 70.0, "BlockStorage": 5.0, "ObjectStorage": 1.0}
            ]
        })
        .to_string(),
    )
    .unwrap()
}

fn orchestrator() -> CollectionOrchestrator {
    CollectionOrchestrator::new(
        CollectorRegistry::with_defaults(),
        vec![REGION.to_string()],
        CloudProvider::Aws,
    )
}

fn items<'a>(node: &'a ResultNode, field: &str) -> &'a [ResultNode] {
    node.items(field)
        .unwrap_or_else(|| panic!("{} has no {field}", node.name))
}

fn ec2(report: &CollectionReport) -> &ResultNode {
    report
        .service(&Scope::Regional(REGION.into()), "ec2")
        .expect("ec2 slice")
}

fn service_with(api: StaticCloudApi) -> InventoryService {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap(),
    ));
    let runner = JobRunner::new(
        JobStatusStore::new(Arc::new(InMemoryJobStatusRepository::new()), clock.clone()),
        ResultCache::new(Arc::new(InMemoryResultCacheRepository::new()), clock.clone()),
    );
    InventoryService::new(runner, orchestrator(), Arc::new(api), clock)
}

async fn finish(submission: Submission) -> domain_jobs::JobStatus {
    match submission {
        Submission::Started { task, .. } => task.await.unwrap(),
        Submission::AlreadyRunning(status) => panic!("job {} already running", status.id),
    }
}

#[tokio::test]
async fn test_priced_instance_nested_under_its_subnet() {
    let report = orchestrator().collect_all(Arc::new(account())).await.unwrap();

    let networks = items(ec2(&report), "Items");
    let network = networks
        .iter()
        .find(|n| n.item_type == "vpc")
        .expect("vpc node");
    let subnets = items(network, "Subnets");
    assert_eq!(subnets.len(), 2);

    let attached = subnets
        .iter()
        .find(|s| s.string("Subnet ID") == Some("subnet-a"))
        .unwrap();
    let instances = items(attached, "EC2 Instances");
    assert_eq!(instances.len(), 1);
    assert_eq!(
        instances[0].name,
        "arn:aws:ec2:eu-central-1:123456789012:instance/i-web"
    );
    assert_eq!(instances[0].string("Price per month"), Some("74.4 $"));
    assert_eq!(instances[0].string("Launch time"), Some("2024-05-06T19:09:00Z"));

    // Empty subnets carry no instance list at all
    let empty = subnets
        .iter()
        .find(|s| s.string("Subnet ID") == Some("subnet-b"))
        .unwrap();
    assert!(empty.field("EC2 Instances").is_none());
}

#[tokio::test]
async fn test_instance_outside_collected_subnets_is_standalone() {
    let report = orchestrator().collect_all(Arc::new(account())).await.unwrap();

    let standalone: Vec<_> = items(ec2(&report), "Items")
        .iter()
        .filter(|n| n.item_type == "instance")
        .collect();
    assert_eq!(standalone.len(), 1);
    assert_eq!(standalone[0].string("Instance ID"), Some("i-lonely"));
    assert_eq!(standalone[0].string("Subnet ID"), Some("unknown"));
}

#[tokio::test]
async fn test_bucket_contents_ordered_by_size() {
    let report = orchestrator().collect_all(Arc::new(account())).await.unwrap();

    let s3 = report.service(&Scope::Global, "s3").expect("s3 slice");
    let buckets = items(s3, "Items");
    assert_eq!(buckets.len(), 2);
    let bucket = |name: &str| {
        buckets
            .iter()
            .find(|b| b.string("Name") == Some(name))
            .unwrap_or_else(|| panic!("bucket {name}"))
    };

    let assets = bucket("assets");
    assert_eq!(assets.name, "arn:aws:s3:::assets");
    assert_eq!(assets.string("Size"), Some("60 Bytes"));
    let keys: Vec<_> = items(assets, "Contents")
        .iter()
        .map(|o| o.name.as_str())
        .collect();
    assert_eq!(keys, vec!["c.txt", "b.txt", "a.txt"]);

    let empty = bucket("empty");
    assert_eq!(empty.string("Size"), Some("0 Bytes"));
    assert!(items(empty, "Contents").is_empty());
}

#[tokio::test]
async fn test_failed_collector_is_isolated_to_its_slice() {
    let service = service_with(account().with_failure("describe_instances"));
    let credentials = Credentials::new("AKIAEXAMPLE", "secret");

    let status = finish(service.trigger_refresh("acme", &credentials).await.unwrap()).await;

    assert_eq!(status.state, JobState::Done);
    let JobDetails::Refresh(progress) = &status.details else {
        panic!("unexpected details");
    };
    assert_eq!(progress.failed_slices, vec!["eu-central-1/ec2".to_string()]);
    assert_eq!(progress.regions_done, vec![REGION.to_string()]);
    assert!(progress.global_done);

    let CachedView::Ready { report, .. } = service.get_cached_result("acme").await.unwrap() else {
        panic!("no snapshot");
    };
    let failed = ec2(&report);
    assert!(failed.is_error());
    assert_eq!(failed.string("Service"), Some("ec2"));

    let s3 = report.service(&Scope::Global, "s3").unwrap();
    assert!(!s3.is_error());
    assert_eq!(items(s3, "Items").len(), 2);
}

#[tokio::test]
async fn test_repeated_passes_render_identically() {
    let api = Arc::new(account());
    let first = orchestrator().collect_all(api.clone()).await.unwrap();
    let second = orchestrator().collect_all(api).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn test_refresh_then_read_back() {
    let service = service_with(account());
    let credentials = Credentials::new("AKIAEXAMPLE", "secret");

    assert_eq!(
        service.get_cached_result("acme").await.unwrap(),
        CachedView::NoData
    );

    let status = finish(service.trigger_refresh("acme", &credentials).await.unwrap()).await;
    assert_eq!(status.state, JobState::Done);

    let observed = service
        .get_status("acme", JobKind::Refresh)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(observed.id, status.id);
    assert_eq!(observed.state, JobState::Done);

    match service.get_cached_result("acme").await.unwrap() {
        CachedView::Ready { report, saved_at } => {
            assert_eq!(report.account_id, "123456789012");
            assert!(report.failed_slices().is_empty());
            assert_eq!(saved_at, Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap());
        }
        CachedView::NoData => panic!("snapshot was not saved"),
    }
}

#[tokio::test]
async fn test_billing_projects_running_instances() {
    let service = service_with(account());
    let credentials = Credentials::new("AKIAEXAMPLE", "secret");

    let status = finish(service.trigger_billing("acme", &credentials).await.unwrap()).await;

    assert_eq!(status.state, JobState::Done);
    let JobDetails::Billing(progress) = &status.details else {
        panic!("unexpected details");
    };
    let summary = progress.summary.as_ref().expect("summary");
    assert_eq!(summary.months.len(), 2);
    assert_eq!(summary.annual, 142.0);
    assert_eq!(summary.month, 76.0);
    // Only the running instance counts: 0.1/h over 15 of 30 days, then a full month
    assert_eq!(summary.this_month_prediction, Some(77.2));
    assert_eq!(summary.next_month_prediction, Some(72.0));
}

#[tokio::test]
async fn test_rejected_identity_is_reported_before_any_job() {
    let service = service_with(account().with_failure("caller_identity"));
    let credentials = Credentials::new("AKIAEXAMPLE", "secret");

    assert!(service.trigger_refresh("acme", &credentials).await.is_err());
    assert!(
        service
            .get_status("acme", JobKind::Refresh)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_browse_object_storage() {
    let service = service_with(account());
    let credentials = Credentials::new("AKIAEXAMPLE", "secret");

    let storage = service.file_storage(&credentials).await.unwrap();

    assert_eq!(storage.bucket_names().await.unwrap(), vec!["assets", "empty"]);
    assert_eq!(
        storage.file_keys("assets").await.unwrap(),
        vec!["b.txt", "a.txt", "c.txt"]
    );
    assert!(storage.file_keys("empty").await.unwrap().is_empty());
    assert_eq!(storage.get_file("assets", "a.txt").await.unwrap(), b"0123456789");
    assert!(storage.get_file("assets", "missing.txt").await.is_err());
}

#[tokio::test]
async fn test_file_storage_needs_valid_credentials() {
    let service = service_with(account().with_failure("caller_identity"));
    let credentials = Credentials::new("AKIAEXAMPLE", "secret");

    assert!(service.file_storage(&credentials).await.is_err());
}

#[tokio::test]
async fn test_report_lists_regions_lexically() {
    let orchestrator = CollectionOrchestrator::new(
        CollectorRegistry::with_defaults(),
        vec!["us-east-1".to_string(), REGION.to_string()],
        CloudProvider::Aws,
    );

    let report = orchestrator.collect_all(Arc::new(account())).await.unwrap();

    let regions: Vec<_> = report.regional.keys().map(String::as_str).collect();
    assert_eq!(regions, vec![REGION, "us-east-1"]);
    assert_eq!(orchestrator.regions(), ["us-east-1".to_string(), REGION.to_string()]);
}
