//! Behavior-driven tests for hierarchy fan-out
//!
//! Both strategies run against the same in-memory fixtures; record order is
//! unspecified, so assertions sort by ad id first.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use adfetch_core::{
    chunk_ids, AdsClient, AdsTransport, ApiError, ApiErrorKind, BatchRequest, BatchResponse,
    CreateRequest, FanOutMode, FanOutReport, FanOutRequest, JoinedRecord, ListRequest,
    ManualClock, MutateRequest, ObjectRequest, ResourceId, ResourceKind, ResourceRecord,
    SkippedParent, TransportFuture,
};
use serde_json::json;

use support::{client, id, test_config, two_campaign_platform, week, FakeTransport, Op};

const MODES: [FanOutMode; 2] = [FanOutMode::Chunked, FanOutMode::Parallel];

fn sorted(report: &FanOutReport) -> Vec<JoinedRecord> {
    let mut records = report.records.clone();
    records.sort_by(|a, b| a.ad.id().cmp(b.ad.id()));
    records
}

/// `count` campaigns, each with one ad group holding one ad, no insights.
fn wide_platform(count: usize) -> FakeTransport {
    let campaigns = (0..count).map(|n| json!({"id": format!("{}", 1000 + n)})).collect();
    let ad_groups = (0..count)
        .map(|n| json!({"id": format!("{}", 2000 + n), "campaign_id": format!("{}", 1000 + n)}))
        .collect();
    let ads = (0..count)
        .map(|n| json!({"id": format!("{}", 3000 + n), "adset_id": format!("{}", 2000 + n)}))
        .collect();

    FakeTransport::new()
        .with_records(ResourceKind::Campaign, campaigns)
        .with_records(ResourceKind::AdGroup, ad_groups)
        .with_records(ResourceKind::Ad, ads)
}

/// Counts list queries that are in flight at once. Each query yields to the
/// scheduler a few times before answering, so overlapping work shows up.
struct OverlapCounter {
    inner: FakeTransport,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl OverlapCounter {
    fn new(inner: FakeTransport) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl AdsTransport for OverlapCounter {
    fn query<'a>(&'a self, request: &'a ListRequest) -> TransportFuture<'a, Vec<ResourceRecord>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            let result = self.inner.query(request).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }

    fn get<'a>(&'a self, request: &'a ObjectRequest) -> TransportFuture<'a, ResourceRecord> {
        self.inner.get(request)
    }

    fn mutate<'a>(&'a self, request: &'a MutateRequest) -> TransportFuture<'a, ()> {
        self.inner.mutate(request)
    }

    fn create<'a>(&'a self, request: &'a CreateRequest) -> TransportFuture<'a, ResourceId> {
        self.inner.create(request)
    }

    fn batch<'a>(&'a self, requests: &'a [BatchRequest]) -> TransportFuture<'a, BatchResponse> {
        self.inner.batch(requests)
    }
}

// =============================================================================
// Joining
// =============================================================================

#[tokio::test]
async fn when_one_ad_has_metrics_both_strategies_emit_two_records() {
    for mode in MODES {
        // Given: Two campaigns, one ad each, metrics for the first ad only,
        // and an ad group whose campaign does not exist
        let transport = Arc::new(two_campaign_platform());
        let (client, _clock) = client(transport.clone());

        // When: A fan-out pass runs
        let report = client
            .fan_out(mode, &FanOutRequest::new(week()))
            .await
            .expect("fan-out succeeds");

        // Then: Exactly two joined records, one with an insight snapshot
        let records = sorted(&report);
        assert_eq!(records.len(), 2, "{mode:?}");
        assert_eq!(records[0].ad.id(), &id("301"));
        assert_eq!(records[0].campaign.id(), &id("101"));
        assert_eq!(records[0].ad_group.id(), &id("201"));
        assert!(records[0].has_insight());
        assert_eq!(records[1].ad.id(), &id("302"));
        assert!(!records[1].has_insight());

        // And: Nothing from the orphaned branch leaks into the output
        assert!(records
            .iter()
            .all(|record| record.ad_group.id() != &id("299") && record.ad.id() != &id("399")));
        assert!(report.is_complete());
        assert!(report.skipped_parents.is_empty());
    }
}

#[tokio::test]
async fn when_records_are_flattened_each_level_is_prefixed() {
    let transport = Arc::new(two_campaign_platform());
    let (client, _clock) = client(transport);

    let report = client
        .fan_out(FanOutMode::Chunked, &FanOutRequest::new(week()))
        .await
        .expect("fan-out succeeds");
    let with_metrics = sorted(&report).remove(0).flatten();

    assert_eq!(with_metrics.get("campaign_name"), Some(&json!("Brand")));
    assert_eq!(with_metrics.get("ad_group_name"), Some(&json!("Lookalike")));
    assert_eq!(with_metrics.get("ad_name"), Some(&json!("Carousel")));
    assert_eq!(with_metrics.get("insight_spend"), Some(&json!("48.10")));
}

#[tokio::test]
async fn when_campaign_has_no_ad_groups_it_is_skipped_not_padded() {
    for mode in MODES {
        let transport = Arc::new(two_campaign_platform().with_records(
            ResourceKind::Campaign,
            vec![json!({"id": "103", "name": "Empty"})],
        ));
        let (client, _clock) = client(transport);

        let report = client
            .fan_out(mode, &FanOutRequest::new(week()))
            .await
            .expect("fan-out succeeds");

        assert_eq!(report.records.len(), 2, "{mode:?}");
        assert_eq!(
            report.skipped_parents,
            vec![SkippedParent { kind: ResourceKind::Campaign, id: id("103") }]
        );
    }
}

// =============================================================================
// Chunking
// =============================================================================

#[test]
fn when_45_ids_are_chunked_by_20_system_yields_20_20_5() {
    let ids: Vec<_> = (0..45).map(|n| id(&format!("{}", 1000 + n))).collect();
    let sizes: Vec<usize> = chunk_ids(&ids, 20)
        .expect("valid chunk size")
        .iter()
        .map(|chunk| chunk.len())
        .collect();

    assert_eq!(sizes, vec![20, 20, 5]);
    assert!(chunk_ids(&[], 20).expect("valid chunk size").is_empty());
}

#[tokio::test]
async fn when_45_campaigns_are_assembled_each_level_goes_out_in_three_batches() {
    let transport = Arc::new(wide_platform(45));
    let (client, _clock) = client(transport.clone());

    let report = client
        .fan_out(FanOutMode::Chunked, &FanOutRequest::new(week()))
        .await
        .expect("fan-out succeeds");

    assert_eq!(report.records.len(), 45);
    assert_eq!(report.chunks_issued, 9);
    for kind in [ResourceKind::AdGroup, ResourceKind::Ad, ResourceKind::InsightRow] {
        assert_eq!(transport.batch_sizes(kind), vec![20, 20, 5], "{kind}");
    }
    assert!(report.records.iter().all(|record| !record.has_insight()));
}

#[tokio::test]
async fn when_account_has_no_campaigns_no_batches_are_sent() {
    let transport = Arc::new(FakeTransport::new());
    let (client, _clock) = client(transport.clone());

    let report = client
        .fan_out(FanOutMode::Chunked, &FanOutRequest::new(week()))
        .await
        .expect("fan-out succeeds");

    assert!(report.records.is_empty());
    assert_eq!(report.chunks_issued, 0);
    assert_eq!(transport.count(Op::Batch), 0);
    assert_eq!(transport.count(Op::Query), 1);
}

// =============================================================================
// Caching across passes and strategies
// =============================================================================

#[tokio::test]
async fn when_pass_repeats_within_ttl_no_transport_calls_are_made() {
    let transport = Arc::new(two_campaign_platform());
    let (client, _clock) = client(transport.clone());
    let request = FanOutRequest::new(week());

    let first = client.fan_out(FanOutMode::Chunked, &request).await.expect("first pass");
    let calls = transport.calls().len();
    let second = client.fan_out(FanOutMode::Chunked, &request).await.expect("second pass");

    assert_eq!(transport.calls().len(), calls);
    assert_eq!(sorted(&first), sorted(&second));
    assert_eq!(second.chunks_issued, 0);
}

#[tokio::test]
async fn when_parallel_pass_warmed_the_caches_chunked_pass_reuses_them() {
    let transport = Arc::new(two_campaign_platform());
    let (client, _clock) = client(transport.clone());
    let request = FanOutRequest::new(week());

    let parallel = client.fan_out(FanOutMode::Parallel, &request).await.expect("parallel pass");
    let chunked = client.fan_out(FanOutMode::Chunked, &request).await.expect("chunked pass");

    assert_eq!(parallel.chunks_issued, 0);
    assert_eq!(transport.count(Op::Batch), 0);
    assert_eq!(sorted(&parallel), sorted(&chunked));
}

// =============================================================================
// Partial failure
// =============================================================================

#[tokio::test]
async fn when_one_campaign_fails_siblings_are_still_collected() {
    for mode in MODES {
        // Given: Listing ad groups under campaign 102 is forbidden
        let transport = Arc::new(two_campaign_platform());
        transport.fail_scope("102", ApiError::from_code(200, "Permissions error"));
        let (client, _clock) = client(transport);

        // When: A fan-out pass runs
        let report = client
            .fan_out(mode, &FanOutRequest::new(week()))
            .await
            .expect("pass survives a failing campaign");

        // Then: Campaign 101 is joined and 102 is reported as failed once
        let records = sorted(&report);
        assert_eq!(records.len(), 1, "{mode:?}");
        assert_eq!(records[0].campaign.id(), &id("101"));
        assert_eq!(report.failed_parents.len(), 1);
        assert_eq!(report.failed_parents[0].parent, id("102"));
        assert_eq!(report.failed_parents[0].kind, ResourceKind::AdGroup);
        assert_eq!(report.failed_parents[0].error.kind(), ApiErrorKind::Permanent);
        assert!(report.skipped_parents.is_empty());
    }
}

#[tokio::test]
async fn when_one_ad_insight_listing_fails_both_strategies_drop_only_that_ad() {
    for mode in MODES {
        // Given: Reading insights for ad 301 is forbidden
        let transport = Arc::new(two_campaign_platform());
        transport.fail_scope("301", ApiError::from_code(200, "Permissions error"));
        let (client, _clock) = client(transport);

        // When: A fan-out pass runs
        let report = client
            .fan_out(mode, &FanOutRequest::new(week()))
            .await
            .expect("pass survives a failing insight listing");

        // Then: Ad 302 is joined, ad 301 is reported failed and nowhere else
        let records = sorted(&report);
        assert_eq!(records.len(), 1, "{mode:?}");
        assert_eq!(records[0].ad.id(), &id("302"));
        assert_eq!(report.failed_parents.len(), 1, "{mode:?}");
        assert_eq!(report.failed_parents[0].parent, id("301"));
        assert_eq!(report.failed_parents[0].kind, ResourceKind::InsightRow);
        assert!(report.skipped_parents.is_empty(), "{mode:?}");
    }
}

#[tokio::test]
async fn when_campaign_list_fails_the_pass_fails() {
    for mode in MODES {
        let transport = Arc::new(two_campaign_platform());
        transport.fail_next(Op::Query, ApiError::from_code(190, "Invalid OAuth access token"));
        let (client, _clock) = client(transport);

        let error = client
            .fan_out(mode, &FanOutRequest::new(week()))
            .await
            .expect_err("no campaigns, no pass");

        assert_eq!(error.code(), Some(190), "{mode:?}");
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn parallel_pass_never_runs_more_campaigns_than_workers() {
    // Given: Seven campaigns and a pool of three workers
    let transport = Arc::new(OverlapCounter::new(wide_platform(7)));
    let mut config = test_config();
    config.fanout.workers = 3;
    let client = AdsClient::with_transport(config, transport.clone(), Arc::new(ManualClock::new()))
        .expect("valid client config");

    // When: A parallel pass runs
    let report = client
        .fan_out(FanOutMode::Parallel, &FanOutRequest::new(week()))
        .await
        .expect("fan-out succeeds");

    // Then: Every campaign is collected, with work overlapping but bounded
    assert_eq!(report.records.len(), 7);
    assert!(transport.peak() <= 3, "peak {} exceeds workers", transport.peak());
    assert!(transport.peak() > 1, "campaigns never overlapped");
}

#[tokio::test]
async fn strategies_identify_themselves() {
    let transport = Arc::new(FakeTransport::new());
    let (client, _clock) = client(transport);

    assert_eq!(client.strategy(FanOutMode::Chunked).name(), "chunked");
    assert_eq!(client.strategy(FanOutMode::Parallel).name(), "parallel");
}
