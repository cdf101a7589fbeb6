//! Level-by-level fan-out over chunked batch requests.

use tracing::{debug, info};

use super::{
    chunk_ids, ids_of, join_levels, ChildrenByParent, FanOutFuture, FanOutReport, FanOutRequest,
    FanOutStrategy, Hierarchy,
};
use crate::api_error::ApiError;
use crate::manager::{ListOptions, ResourceManager};
use crate::transport::MAX_BATCH_SIZE;
use crate::{ResourceId, ValidationError};

/// Default number of parent ids per batched request.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Collects each level for all parents at once, `chunk_size` parents per
/// batched request, then joins.
#[derive(Debug, Clone)]
pub struct ChunkedAssembler {
    hierarchy: Hierarchy,
    chunk_size: usize,
}

impl ChunkedAssembler {
    pub fn new(hierarchy: Hierarchy, chunk_size: usize) -> Result<Self, ValidationError> {
        if chunk_size == 0 {
            return Err(ValidationError::ZeroChunkSize);
        }
        if chunk_size > MAX_BATCH_SIZE {
            return Err(ValidationError::ChunkSizeTooLarge {
                size: chunk_size,
                max: MAX_BATCH_SIZE,
            });
        }
        Ok(Self {
            hierarchy,
            chunk_size,
        })
    }

    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Lists children of every parent, one batched request per chunk, and
    /// merges the chunks into one parent-keyed map.
    async fn children_of(
        &self,
        manager: &ResourceManager,
        parents: &[ResourceId],
        options: &ListOptions,
        report: &mut FanOutReport,
    ) -> Result<ChildrenByParent, ApiError> {
        let mut merged = ChildrenByParent::new();

        for (index, chunk) in chunk_ids(parents, self.chunk_size)?.into_iter().enumerate() {
            let batch = manager.list_children_batched(chunk, options).await?;
            report.chunks_issued += batch.batches_issued;
            debug!(
                kind = %manager.kind(),
                chunk = index,
                parents = chunk.len(),
                found = batch.children.len(),
                "collected chunk"
            );
            merged.extend(batch.children);
            report.failed_parents.extend(batch.failed);
        }

        Ok(merged)
    }

    async fn assemble(&self, request: &FanOutRequest) -> Result<FanOutReport, ApiError> {
        let hierarchy = &self.hierarchy;
        let mut report = FanOutReport::default();

        let campaigns = hierarchy.campaigns.list(&request.campaigns).await?;
        let campaign_ids = ids_of(&campaigns);

        let ad_groups = self
            .children_of(&hierarchy.ad_groups, &campaign_ids, &ListOptions::default(), &mut report)
            .await?;
        let ad_group_ids = ids_of(ad_groups.values().flatten());

        let ads = self
            .children_of(&hierarchy.ads, &ad_group_ids, &ListOptions::default(), &mut report)
            .await?;
        let ad_ids = ids_of(ads.values().flatten());

        let insight_options = hierarchy
            .insights
            .range_options(request.date_range, request.insight_fields.as_deref());
        let insights = self
            .children_of(hierarchy.insights.manager(), &ad_ids, &insight_options, &mut report)
            .await?;

        report.records = join_levels(
            &campaigns,
            &ad_groups,
            &ads,
            &insights,
            &report.failed_parents,
            &mut report.skipped_parents,
        );

        info!(
            strategy = self.name(),
            campaigns = campaigns.len(),
            ad_groups = ad_group_ids.len(),
            ads = ad_ids.len(),
            records = report.records.len(),
            chunks = report.chunks_issued,
            skipped = report.skipped_parents.len(),
            failed = report.failed_parents.len(),
            range = %request.date_range,
            "fan-out pass complete"
        );
        Ok(report)
    }
}

impl FanOutStrategy for ChunkedAssembler {
    fn name(&self) -> &'static str {
        "chunked"
    }

    fn collect<'a>(&'a self, request: &'a FanOutRequest) -> FanOutFuture<'a> {
        Box::pin(self.assemble(request))
    }
}
