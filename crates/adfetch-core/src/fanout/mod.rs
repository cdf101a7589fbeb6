//! # Fan-out
//!
//! Walks campaign → ad group → ad → insight and joins the levels into
//! [`JoinedRecord`]s. Two interchangeable strategies implement
//! [`FanOutStrategy`]:
//!
//! | Strategy | Traversal | Requests |
//! |----------|-----------|----------|
//! | [`ChunkedAssembler`] | level by level, ids chunked | one batched request per chunk per level |
//! | [`ParallelCollector`] | campaign by campaign, bounded worker pool | one list request per parent |
//!
//! Both skip parents with no children instead of emitting placeholders, and
//! neither guarantees output order.

pub mod batched;
pub mod parallel;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::api_error::ApiError;
use crate::manager::{InsightsManager, ListOptions, ParentFailure, ResourceManager};
use crate::{DateRange, JoinedRecord, ResourceId, ResourceKind, ResourceRecord, ValidationError};

pub use batched::ChunkedAssembler;
pub use parallel::ParallelCollector;

/// What one fan-out pass collects.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutRequest {
    /// Campaign selection; defaults list every non-deleted campaign.
    pub campaigns: ListOptions,
    pub date_range: DateRange,
    pub insight_fields: Option<Vec<String>>,
}

impl FanOutRequest {
    pub fn new(date_range: DateRange) -> Self {
        Self {
            campaigns: ListOptions::default(),
            date_range,
            insight_fields: None,
        }
    }

    pub fn with_campaigns(mut self, campaigns: ListOptions) -> Self {
        self.campaigns = campaigns;
        self
    }

    pub fn with_insight_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insight_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// A parent that produced no output because it had no children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SkippedParent {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

/// Result of one fan-out pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FanOutReport {
    pub records: Vec<JoinedRecord>,
    /// Batched requests issued across all levels (zero for per-parent strategies).
    pub chunks_issued: usize,
    pub skipped_parents: Vec<SkippedParent>,
    pub failed_parents: Vec<ParentFailure>,
}

impl FanOutReport {
    pub fn is_complete(&self) -> bool {
        self.failed_parents.is_empty()
    }
}

pub type FanOutFuture<'a> = Pin<Box<dyn Future<Output = Result<FanOutReport, ApiError>> + Send + 'a>>;

/// A way of collecting the joined hierarchy.
///
/// Only a failure to list the top-level campaigns fails the pass; failures
/// below that land in [`FanOutReport::failed_parents`].
pub trait FanOutStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn collect<'a>(&'a self, request: &'a FanOutRequest) -> FanOutFuture<'a>;
}

/// The managers a fan-out pass reads through.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub campaigns: ResourceManager,
    pub ad_groups: ResourceManager,
    pub ads: ResourceManager,
    pub insights: InsightsManager,
}

/// Splits `ids` into consecutive chunks of at most `size`.
///
/// Yields `ceil(ids.len() / size)` chunks; empty input yields none.
pub fn chunk_ids(ids: &[ResourceId], size: usize) -> Result<Vec<&[ResourceId]>, ValidationError> {
    if size == 0 {
        return Err(ValidationError::ZeroChunkSize);
    }
    Ok(ids.chunks(size).collect())
}

pub(crate) type ChildrenByParent = HashMap<ResourceId, Vec<ResourceRecord>>;

/// Whether `child` may be joined under `parent`: its parent link, when
/// present, must name `parent`.
fn belongs_to(child: &ResourceRecord, parent: &ResourceId) -> bool {
    child.parent_id().map_or(true, |linked| &linked == parent)
}

/// Joins the collected levels.
///
/// Campaigns without ad groups and ad groups without ads are reported as
/// skipped. Children whose parent link names a different parent are
/// dropped. The first insight row of an ad is used; an ad without rows is
/// joined with no insight.
///
/// A parent listed in `failed` contributes nothing below it and is not
/// reported as skipped: an ad whose insight listing failed is left out
/// rather than joined as if it had no metrics.
pub(crate) fn join_levels(
    campaigns: &[ResourceRecord],
    ad_groups: &ChildrenByParent,
    ads: &ChildrenByParent,
    insights: &ChildrenByParent,
    failed: &[ParentFailure],
    skipped: &mut Vec<SkippedParent>,
) -> Vec<JoinedRecord> {
    let is_failed = |id: &ResourceId| failed.iter().any(|failure| &failure.parent == id);
    let mut records = Vec::new();

    for campaign in campaigns {
        let groups: Vec<&ResourceRecord> = ad_groups
            .get(campaign.id())
            .into_iter()
            .flatten()
            .filter(|group| belongs_to(group, campaign.id()))
            .collect();
        if groups.is_empty() {
            if is_failed(campaign.id()) {
                continue;
            }
            skipped.push(SkippedParent {
                kind: ResourceKind::Campaign,
                id: campaign.id().clone(),
            });
            continue;
        }

        for group in groups {
            let group_ads: Vec<&ResourceRecord> = ads
                .get(group.id())
                .into_iter()
                .flatten()
                .filter(|ad| belongs_to(ad, group.id()))
                .collect();
            if group_ads.is_empty() {
                if is_failed(group.id()) {
                    continue;
                }
                skipped.push(SkippedParent {
                    kind: ResourceKind::AdGroup,
                    id: group.id().clone(),
                });
                continue;
            }

            for ad in group_ads.into_iter().filter(|ad| !is_failed(ad.id())) {
                let insight = insights
                    .get(ad.id())
                    .and_then(|rows| rows.first())
                    .cloned();
                records.push(JoinedRecord {
                    campaign: campaign.clone(),
                    ad_group: group.clone(),
                    ad: ad.clone(),
                    insight,
                });
            }
        }
    }

    records
}

pub(crate) fn ids_of<'a, I>(records: I) -> Vec<ResourceId>
where
    I: IntoIterator<Item = &'a ResourceRecord>,
{
    records.into_iter().map(|record| record.id().clone()).collect()
}
