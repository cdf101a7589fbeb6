//! Per-campaign fan-out over a bounded worker pool.

use std::future::Future;
use std::pin::Pin;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::{
    ids_of, join_levels, ChildrenByParent, FanOutFuture, FanOutReport, FanOutRequest,
    FanOutStrategy, Hierarchy, SkippedParent,
};
use crate::api_error::ApiError;
use crate::manager::{ListOptions, ParentFailure};
use crate::{JoinedRecord, ResourceId, ResourceKind, ResourceRecord, ValidationError};

pub const DEFAULT_WORKERS: usize = 3;

/// Runs the whole subtree of each campaign as one unit of work, at most
/// `workers` campaigns at a time.
///
/// A listing that fails is reported in [`FanOutReport::failed_parents`] and
/// prunes only the branch below it; siblings at every level are unaffected.
#[derive(Debug, Clone)]
pub struct ParallelCollector {
    hierarchy: Hierarchy,
    workers: usize,
}

#[derive(Default)]
struct CampaignYield {
    records: Vec<JoinedRecord>,
    skipped: Vec<SkippedParent>,
    failed: Vec<ParentFailure>,
}

type CampaignTask<'a> = Pin<Box<dyn Future<Output = CampaignYield> + Send + 'a>>;

impl ParallelCollector {
    pub fn new(hierarchy: Hierarchy, workers: usize) -> Result<Self, ValidationError> {
        if workers == 0 {
            return Err(ValidationError::ZeroWorkers);
        }
        Ok(Self { hierarchy, workers })
    }

    pub const fn workers(&self) -> usize {
        self.workers
    }

    async fn collect_campaign(
        &self,
        campaign: &ResourceRecord,
        request: &FanOutRequest,
    ) -> CampaignYield {
        let hierarchy = &self.hierarchy;
        let defaults = ListOptions::default();
        let mut yielded = CampaignYield::default();

        let mut ad_groups = ChildrenByParent::new();
        match hierarchy.ad_groups.list_under(campaign.id(), &defaults).await {
            Ok(groups) => {
                ad_groups.insert(campaign.id().clone(), groups);
            }
            Err(error) => yielded.failed.push(failure(campaign.id(), ResourceKind::AdGroup, error)),
        }

        let mut ads = ChildrenByParent::new();
        for group_id in ids_of(ad_groups.values().flatten()) {
            match hierarchy.ads.list_under(&group_id, &defaults).await {
                Ok(found) => {
                    ads.insert(group_id, found);
                }
                Err(error) => yielded.failed.push(failure(&group_id, ResourceKind::Ad, error)),
            }
        }

        let mut insights = ChildrenByParent::new();
        for ad_id in ids_of(ads.values().flatten()) {
            let rows = hierarchy
                .insights
                .for_object(&ad_id, request.date_range, request.insight_fields.as_deref())
                .await;
            match rows {
                Ok(rows) => {
                    insights.insert(ad_id, rows);
                }
                Err(error) => yielded.failed.push(failure(&ad_id, ResourceKind::InsightRow, error)),
            }
        }

        yielded.records = join_levels(
            std::slice::from_ref(campaign),
            &ad_groups,
            &ads,
            &insights,
            &yielded.failed,
            &mut yielded.skipped,
        );
        yielded
    }

    async fn run(&self, request: &FanOutRequest) -> Result<FanOutReport, ApiError> {
        let campaigns = self.hierarchy.campaigns.list(&request.campaigns).await?;

        let tasks: Vec<CampaignTask<'_>> = campaigns
            .iter()
            .map(|campaign| -> CampaignTask<'_> {
                Box::pin(self.collect_campaign(campaign, request))
            })
            .collect();
        let yields: Vec<CampaignYield> = stream::iter(tasks)
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = FanOutReport::default();
        for mut yielded in yields {
            for failure in &yielded.failed {
                warn!(
                    parent = %failure.parent,
                    listing = %failure.kind,
                    error = %failure.error.kind(),
                    "listing failed: {}",
                    failure.error.message()
                );
            }
            report.records.append(&mut yielded.records);
            report.skipped_parents.append(&mut yielded.skipped);
            report.failed_parents.append(&mut yielded.failed);
        }

        info!(
            strategy = self.name(),
            workers = self.workers,
            campaigns = campaigns.len(),
            records = report.records.len(),
            skipped = report.skipped_parents.len(),
            failed = report.failed_parents.len(),
            range = %request.date_range,
            "fan-out pass complete"
        );
        Ok(report)
    }
}

fn failure(parent: &ResourceId, kind: ResourceKind, error: ApiError) -> ParentFailure {
    ParentFailure {
        parent: parent.clone(),
        kind,
        error,
    }
}

impl FanOutStrategy for ParallelCollector {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn collect<'a>(&'a self, request: &'a FanOutRequest) -> FanOutFuture<'a> {
        Box::pin(self.run(request))
    }
}
