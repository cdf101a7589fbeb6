use std::sync::Arc;

use tracing::info;

use crate::cache::TtlCache;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::fanout::{
    ChunkedAssembler, FanOutReport, FanOutRequest, FanOutStrategy, Hierarchy, ParallelCollector,
};
use crate::graph::GraphTransport;
use crate::http_client::ReqwestHttpClient;
use crate::manager::{InsightsManager, ResourceDefaults, ResourceManager};
use crate::retry::{CallClass, RetryExecutor, RetryPolicy};
use crate::throttling::SharedRateLimiter;
use crate::transport::AdsTransport;
use crate::{ApiError, ResourceKind};

/// Which fan-out strategy a pass runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOutMode {
    #[default]
    Chunked,
    Parallel,
}

/// Entry point: four managers and two fan-out strategies over one transport,
/// one rate limiter and one clock.
///
/// Managers share the limiter and the retry policies but each owns a
/// separate cache.
#[derive(Debug, Clone)]
pub struct AdsClient {
    config: ClientConfig,
    limiter: SharedRateLimiter,
    hierarchy: Hierarchy,
    chunked: ChunkedAssembler,
    parallel: ParallelCollector,
}

impl AdsClient {
    /// Client talking to the Graph API over reqwest.
    pub fn from_config(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = GraphTransport::new(
            config.graph_settings(),
            Arc::new(ReqwestHttpClient::default()),
        );
        Self::with_transport(config, Arc::new(transport), Arc::new(SystemClock))
    }

    /// Client over any transport and time source.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn AdsTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let account = config.account_id()?;
        let limiter = SharedRateLimiter::from_config(&config.rate_limit);

        let executor = |class| {
            RetryExecutor::new(RetryPolicy::from_config(&config.retry, class))
                .with_clock(Arc::clone(&clock))
                .with_limiter(limiter.clone())
        };
        let reads = executor(CallClass::Read);
        let mutations = executor(CallClass::Mutation);

        let manager = |kind| {
            let defaults = ResourceDefaults::for_kind(kind).with_page_size(config.fanout.page_size);
            let cache = TtlCache::new(config.cache_ttl(), Arc::clone(&clock));
            ResourceManager::new(defaults, account.clone(), Arc::clone(&transport), cache)
                .with_executors(reads.clone(), mutations.clone())
        };

        let hierarchy = Hierarchy {
            campaigns: manager(ResourceKind::Campaign),
            ad_groups: manager(ResourceKind::AdGroup),
            ads: manager(ResourceKind::Ad),
            insights: InsightsManager::new(manager(ResourceKind::InsightRow)),
        };
        let chunked = ChunkedAssembler::new(hierarchy.clone(), config.fanout.chunk_size)?;
        let parallel = ParallelCollector::new(hierarchy.clone(), config.fanout.workers)?;

        info!(
            account = %account,
            api_version = %config.api_version,
            cache_ttl_secs = config.cache_ttl_secs,
            requests_per_minute = config.rate_limit.requests_per_minute,
            chunk_size = config.fanout.chunk_size,
            workers = config.fanout.workers,
            "ads client ready"
        );

        Ok(Self {
            config,
            limiter,
            hierarchy,
            chunked,
            parallel,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn campaigns(&self) -> &ResourceManager {
        &self.hierarchy.campaigns
    }

    pub fn ad_groups(&self) -> &ResourceManager {
        &self.hierarchy.ad_groups
    }

    pub fn ads(&self) -> &ResourceManager {
        &self.hierarchy.ads
    }

    pub fn insights(&self) -> &InsightsManager {
        &self.hierarchy.insights
    }

    pub fn limiter(&self) -> &SharedRateLimiter {
        &self.limiter
    }

    pub fn strategy(&self, mode: FanOutMode) -> &dyn FanOutStrategy {
        match mode {
            FanOutMode::Chunked => &self.chunked,
            FanOutMode::Parallel => &self.parallel,
        }
    }

    /// Runs one fan-out pass.
    pub async fn fan_out(
        &self,
        mode: FanOutMode,
        request: &FanOutRequest,
    ) -> Result<FanOutReport, ApiError> {
        self.strategy(mode).collect(request).await
    }

    /// Empties the cache of every manager.
    pub async fn clear_caches(&self) {
        self.hierarchy.campaigns.clear_cache().await;
        self.hierarchy.ad_groups.clear_cache().await;
        self.hierarchy.ads.clear_cache().await;
        self.hierarchy.insights.clear_cache().await;
    }
}
