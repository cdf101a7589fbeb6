//! Resource managers: one retrying, cached façade per resource kind.
//!
//! A [`ResourceManager`] owns its own [`TtlCache`] and shares the transport,
//! the retry executors and (through them) the rate limiter with every other
//! manager built by the same client.
//!
//! | Operation | Cache | Executor |
//! |-----------|-------|----------|
//! | [`list`](ResourceManager::list) / [`list_under`](ResourceManager::list_under) | read + write per [`CacheMode`] | reads |
//! | [`list_children_batched`](ResourceManager::list_children_batched) | read + write per parent | reads |
//! | [`get_by_id`](ResourceManager::get_by_id) | bypassed | reads |
//! | [`update`](ResourceManager::update) | invalidated on success | mutations |
//! | [`create`](ResourceManager::create) | account-wide lists invalidated on success | mutations |

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::api_error::ApiError;
use crate::cache::{CacheMode, TtlCache};
use crate::query::{QueryFingerprint, QuerySpec};
use crate::retry::{CallClass, RetryConfig, RetryExecutor, RetryPolicy};
use crate::transport::{
    AdsTransport, BatchRequest, CreateRequest, ListRequest, MutateRequest, ObjectRequest,
};
use crate::{
    CampaignDraft, DateRange, InsightLevel, ResourceId, ResourceKind, ResourceRecord,
    ValidationError,
};

/// Statuses listed when the caller does not filter: everything except deleted.
const LISTED_STATUSES: [&str; 3] = ["ACTIVE", "PAUSED", "ARCHIVED"];
const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default field sets and filter for one resource kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDefaults {
    pub kind: ResourceKind,
    /// Fields requested by list calls.
    pub list_fields: Vec<String>,
    /// Richer field set requested by [`ResourceManager::get_by_id`].
    pub detail_fields: Vec<String>,
    pub list_params: Map<String, Value>,
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|field| (*field).to_owned()).collect()
}

fn listed_params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert(String::from("limit"), json!(DEFAULT_PAGE_SIZE));
    params.insert(String::from("effective_status"), json!(LISTED_STATUSES));
    params
}

impl ResourceDefaults {
    pub fn campaigns() -> Self {
        let list = [
            "id",
            "name",
            "status",
            "objective",
            "daily_budget",
            "lifetime_budget",
            "start_time",
            "stop_time",
            "created_time",
        ];
        let detail = [
            "updated_time",
            "budget_remaining",
            "buying_type",
            "configured_status",
            "effective_status",
        ];
        Self {
            kind: ResourceKind::Campaign,
            list_fields: owned(&list),
            detail_fields: owned(&[&list[..], &detail[..]].concat()),
            list_params: listed_params(),
        }
    }

    pub fn ad_groups() -> Self {
        let list = [
            "id",
            "name",
            "status",
            "campaign_id",
            "daily_budget",
            "lifetime_budget",
            "targeting",
            "bid_amount",
            "billing_event",
            "optimization_goal",
        ];
        let detail = [
            "attribution_spec",
            "bid_strategy",
            "budget_remaining",
            "configured_status",
            "effective_status",
            "issues_info",
        ];
        Self {
            kind: ResourceKind::AdGroup,
            list_fields: owned(&list),
            detail_fields: owned(&[&list[..], &detail[..]].concat()),
            list_params: listed_params(),
        }
    }

    pub fn ads() -> Self {
        let list = [
            "id",
            "name",
            "status",
            "adset_id",
            "campaign_id",
            "creative",
            "configured_status",
            "effective_status",
        ];
        let detail = ["tracking_specs", "recommendations", "issues_info"];
        Self {
            kind: ResourceKind::Ad,
            list_fields: owned(&list),
            detail_fields: owned(&[&list[..], &detail[..]].concat()),
            list_params: listed_params(),
        }
    }

    pub fn insights() -> Self {
        let fields = owned(&[
            "account_id",
            "campaign_id",
            "adset_id",
            "ad_id",
            "date_start",
            "date_stop",
            "impressions",
            "clicks",
            "spend",
            "reach",
            "frequency",
            "cpm",
            "cpc",
            "ctr",
            "cost_per_inline_link_click",
            "cost_per_unique_click",
            "actions",
        ]);
        let mut params = Map::new();
        params.insert(String::from("date_preset"), json!("last_7d"));
        Self {
            kind: ResourceKind::InsightRow,
            detail_fields: fields.clone(),
            list_fields: fields,
            list_params: params,
        }
    }

    pub fn for_kind(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Campaign => Self::campaigns(),
            ResourceKind::AdGroup => Self::ad_groups(),
            ResourceKind::Ad => Self::ads(),
            ResourceKind::InsightRow => Self::insights(),
        }
    }

    /// Overrides the page size of the default filter.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        if self.list_params.contains_key("limit") {
            self.list_params
                .insert(String::from("limit"), json!(page_size.max(1)));
        }
        self
    }
}

/// Per-call overrides for a list query. `None` means "use the defaults".
///
/// Overrides replace the defaults wholesale; they are not merged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListOptions {
    pub fields: Option<Vec<String>>,
    pub params: Option<Map<String, Value>>,
    pub cache: CacheMode,
}

impl ListOptions {
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Shorthand for the boolean `use_cache` switch.
    pub fn use_cache(self, use_cache: bool) -> Self {
        self.with_cache(CacheMode::from_use_cache(use_cache))
    }
}

/// A listing that could not be completed for one parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentFailure {
    pub parent: ResourceId,
    /// Kind of the children that were being listed.
    pub kind: ResourceKind,
    pub error: ApiError,
}

/// Children grouped by the parent they were listed under.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChildBatch {
    pub children: HashMap<ResourceId, Vec<ResourceRecord>>,
    pub failed: Vec<ParentFailure>,
    /// Batched round-trips issued, retries excluded.
    pub batches_issued: usize,
}

/// Retrying, cached access to one resource kind.
#[derive(Clone)]
pub struct ResourceManager {
    defaults: ResourceDefaults,
    account: ResourceId,
    transport: Arc<dyn AdsTransport>,
    reads: RetryExecutor,
    mutations: RetryExecutor,
    cache: TtlCache,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("kind", &self.defaults.kind)
            .field("account", &self.account)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ResourceManager {
    /// Manager with the default retry policies on the system clock.
    pub fn new(
        defaults: ResourceDefaults,
        account: ResourceId,
        transport: Arc<dyn AdsTransport>,
        cache: TtlCache,
    ) -> Self {
        let config = RetryConfig::default();
        Self {
            defaults,
            account,
            transport,
            reads: RetryExecutor::new(RetryPolicy::from_config(&config, CallClass::Read)),
            mutations: RetryExecutor::new(RetryPolicy::from_config(&config, CallClass::Mutation)),
            cache,
        }
    }

    pub fn with_executors(mut self, reads: RetryExecutor, mutations: RetryExecutor) -> Self {
        self.reads = reads;
        self.mutations = mutations;
        self
    }

    pub const fn kind(&self) -> ResourceKind {
        self.defaults.kind
    }

    pub fn account(&self) -> &ResourceId {
        &self.account
    }

    pub fn defaults(&self) -> &ResourceDefaults {
        &self.defaults
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    fn spec_for(&self, options: &ListOptions) -> Result<QuerySpec, ApiError> {
        let fields = options
            .fields
            .clone()
            .unwrap_or_else(|| self.defaults.list_fields.clone());
        let params = options
            .params
            .clone()
            .unwrap_or_else(|| self.defaults.list_params.clone());
        let spec = QuerySpec { fields, params };
        spec.validate()?;
        Ok(spec)
    }

    /// Lists this kind across the whole ad account.
    pub async fn list(&self, options: &ListOptions) -> Result<Vec<ResourceRecord>, ApiError> {
        self.list_in(&self.account, options).await
    }

    /// Lists this kind under one parent object (a campaign, an ad group, or
    /// any object the insights edge hangs off).
    pub async fn list_under(
        &self,
        parent: &ResourceId,
        options: &ListOptions,
    ) -> Result<Vec<ResourceRecord>, ApiError> {
        self.list_in(parent, options).await
    }

    async fn list_in(
        &self,
        scope: &ResourceId,
        options: &ListOptions,
    ) -> Result<Vec<ResourceRecord>, ApiError> {
        let kind = self.kind();
        let spec = self.spec_for(options)?;
        let fingerprint = QueryFingerprint::for_list(kind, scope, &spec);

        if options.cache.reads() {
            if let Some(entry) = self.cache.get(&fingerprint).await {
                debug!(%kind, %scope, records = entry.payload.len(), "cache hit");
                return Ok(entry.payload);
            }
        }

        let request = ListRequest::new(kind, scope.clone(), spec);
        let label = format!("list {}", kind.edge());
        let records = self
            .reads
            .execute(&label, || self.transport.query(&request))
            .await?;

        info!(%kind, %scope, records = records.len(), cache = ?options.cache, "fetched list");
        if options.cache.writes() {
            self.cache.put(fingerprint, records.clone()).await;
        }
        Ok(records)
    }

    /// Reads one object with the detail field set. Never served from cache.
    pub async fn get_by_id(
        &self,
        id: &ResourceId,
        fields: Option<&[String]>,
    ) -> Result<ResourceRecord, ApiError> {
        let kind = self.kind();
        if kind == ResourceKind::InsightRow {
            return Err(ApiError::permanent(
                "insight rows are not addressable by id; list them by object and date range",
            ));
        }

        let fields = fields.map_or_else(|| self.defaults.detail_fields.clone(), <[String]>::to_vec);
        let spec = QuerySpec::new(fields);
        spec.validate()?;

        let request = ObjectRequest {
            kind,
            id: id.clone(),
            fields: spec.fields,
        };
        let label = format!("get {kind}");
        let record = self
            .reads
            .execute(&label, || self.transport.get(&request))
            .await?;
        debug!(%kind, %id, "fetched object");
        Ok(record)
    }

    /// Applies `data` to object `id`.
    ///
    /// On success every cache entry associated with `id` is dropped, together
    /// with every account-wide list, since a change in status or name can
    /// move the object in or out of any filtered listing.
    pub async fn update(&self, id: &ResourceId, data: Map<String, Value>) -> Result<(), ApiError> {
        let kind = self.kind();
        if !kind.mutable() {
            return Err(ApiError::permanent(format!("{kind} records are read-only")));
        }
        if data.is_empty() {
            return Err(ApiError::permanent(format!("update of {kind} {id} carries no fields")));
        }

        let request = MutateRequest {
            kind,
            id: id.clone(),
            data,
        };
        let label = format!("update {kind}");
        self.mutations
            .execute(&label, || self.transport.mutate(&request))
            .await?;

        let account = &self.account;
        let dropped = self
            .cache
            .invalidate(|entry| {
                entry.fingerprint.mentions(id)
                    || entry.references(id)
                    || entry.fingerprint.mentions(account)
            })
            .await;
        info!(%kind, %id, invalidated = dropped, "updated object");
        Ok(())
    }

    pub async fn update_status(&self, id: &ResourceId, status: &str) -> Result<(), ApiError> {
        let mut data = Map::new();
        data.insert(String::from("status"), Value::String(status.to_owned()));
        self.update(id, data).await
    }

    /// Creates a new object of this kind in the account and returns its id.
    ///
    /// Creation is not idempotent, so it runs under the mutation policy. On
    /// success every cached query naming the account is dropped.
    pub async fn create(&self, data: Map<String, Value>) -> Result<ResourceId, ApiError> {
        let kind = self.kind();
        if !kind.mutable() {
            return Err(ApiError::permanent(format!("{kind} records cannot be created")));
        }
        if data.is_empty() {
            return Err(ApiError::permanent(format!("new {kind} carries no fields")));
        }

        let request = CreateRequest {
            kind,
            account: self.account.clone(),
            data,
        };
        let label = format!("create {kind}");
        let id = self
            .mutations
            .execute(&label, || self.transport.create(&request))
            .await?;

        let account = &self.account;
        let dropped = self
            .cache
            .invalidate(|entry| entry.fingerprint.mentions(account))
            .await;
        info!(%kind, %id, invalidated = dropped, "created object");
        Ok(id)
    }

    /// Validates `draft` and creates the campaign. Only valid on the
    /// campaigns manager.
    pub async fn create_campaign(&self, draft: &CampaignDraft) -> Result<ResourceId, ApiError> {
        if self.kind() != ResourceKind::Campaign {
            return Err(ApiError::permanent(format!(
                "campaigns cannot be created through the {} manager",
                self.kind()
            )));
        }
        self.create(draft.to_params()?).await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        debug!(kind = %self.kind(), "cache cleared");
    }

    /// Lists this kind under every id in `parents` using batched round-trips.
    ///
    /// Parents with a fresh cache entry are served locally. The rest go out
    /// in batches of at most the transport's batch size; sub-requests that
    /// fail with a retryable error are re-sent by the read executor, others
    /// are reported in [`ChildBatch::failed`] without failing their siblings.
    pub async fn list_children_batched(
        &self,
        parents: &[ResourceId],
        options: &ListOptions,
    ) -> Result<ChildBatch, ApiError> {
        let kind = self.kind();
        let spec = self.spec_for(options)?;
        let mut batch = ChildBatch::default();
        let mut pending = Vec::new();
        let mut seen = HashSet::new();

        for parent in parents {
            if !seen.insert(parent) {
                continue;
            }
            let fingerprint = QueryFingerprint::for_list(kind, parent, &spec);
            if options.cache.reads() {
                if let Some(entry) = self.cache.get(&fingerprint).await {
                    batch.children.insert(parent.clone(), entry.payload);
                    continue;
                }
            }
            pending.push(BatchRequest::for_scope(ListRequest::new(
                kind,
                parent.clone(),
                spec.clone(),
            )));
        }

        let served_from_cache = batch.children.len();
        let size = self.transport.max_batch_size().max(1);
        for group in pending.chunks(size) {
            batch.batches_issued += 1;
            let (children, failed) = self.run_batch(group).await;

            for (parent, records) in children {
                if options.cache.writes() {
                    let fingerprint = QueryFingerprint::for_list(kind, &parent, &spec);
                    self.cache.put(fingerprint, records.clone()).await;
                }
                batch.children.insert(parent, records);
            }
            batch.failed.extend(failed);
        }

        info!(
            %kind,
            parents = parents.len(),
            cached = served_from_cache,
            batches = batch.batches_issued,
            failed = batch.failed.len(),
            "listed children in batch"
        );
        Ok(batch)
    }

    async fn run_batch(
        &self,
        requests: &[BatchRequest],
    ) -> (HashMap<ResourceId, Vec<ResourceRecord>>, Vec<ParentFailure>) {
        let kind = self.kind();
        let pending = Mutex::new(requests.to_vec());
        let done = Mutex::new(HashMap::new());
        let failed = Mutex::new(Vec::new());
        let label = format!("batch {}", kind.edge());

        let result = self
            .reads
            .execute(&label, || {
                let (pending, done, failed) = (&pending, &done, &failed);
                async move {
                    let requests = pending
                        .lock()
                        .expect("batch pending lock is not poisoned")
                        .clone();
                    if requests.is_empty() {
                        return Ok(());
                    }

                    let mut response = self.transport.batch(&requests).await?;
                    let mut retry = Vec::new();
                    let mut last_error = None;

                    for request in requests {
                        let parent = request.list.scope.clone();
                        match response.remove(&request.name) {
                            Some(Ok(records)) => {
                                done.lock()
                                    .expect("batch result lock is not poisoned")
                                    .insert(parent, records);
                            }
                            Some(Err(error)) if error.retryable() => {
                                last_error = Some(error);
                                retry.push(request);
                            }
                            Some(Err(error)) => {
                                warn!(%kind, %parent, "sub-request failed: {}", error.message());
                                failed
                                    .lock()
                                    .expect("batch failure lock is not poisoned")
                                    .push(ParentFailure { parent, kind, error });
                            }
                            None => {
                                last_error = Some(ApiError::unclassified(format!(
                                    "batch response is missing sub-request '{}'",
                                    request.name
                                )));
                                retry.push(request);
                            }
                        }
                    }

                    *pending.lock().expect("batch pending lock is not poisoned") = retry;
                    last_error.map_or(Ok(()), Err)
                }
            })
            .await;

        let mut failed = failed.into_inner().expect("batch failure lock is not poisoned");
        if let Err(error) = result {
            let leftover = pending.into_inner().expect("batch pending lock is not poisoned");
            failed.extend(leftover.into_iter().map(|request| ParentFailure {
                parent: request.list.scope,
                kind,
                error: error.clone(),
            }));
        }

        let children = done.into_inner().expect("batch result lock is not poisoned");
        (children, failed)
    }
}

/// Insights access: metrics rows for objects and date ranges.
///
/// Without a time increment each object gets one row for the whole range.
/// With [`with_time_increment`](Self::with_time_increment) the range is split
/// into buckets of that many days, one row per bucket.
#[derive(Debug, Clone)]
pub struct InsightsManager {
    inner: ResourceManager,
    time_increment: Option<u32>,
}

impl InsightsManager {
    pub fn new(inner: ResourceManager) -> Self {
        Self {
            inner,
            time_increment: None,
        }
    }

    /// Same manager and cache, reporting in buckets of `days` days.
    pub fn with_time_increment(mut self, days: u32) -> Result<Self, ValidationError> {
        if days == 0 {
            return Err(ValidationError::ZeroTimeIncrement);
        }
        self.time_increment = Some(days);
        Ok(self)
    }

    /// Shorthand for one row per day.
    pub fn daily(self) -> Self {
        Self {
            time_increment: Some(1),
            ..self
        }
    }

    pub const fn time_increment(&self) -> Option<u32> {
        self.time_increment
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.inner
    }

    /// List options selecting `range` with the given (or default) fields.
    pub fn range_options(&self, range: DateRange, fields: Option<&[String]>) -> ListOptions {
        let mut params = Map::new();
        params.insert(String::from("time_range"), range.to_param());
        if let Some(days) = self.time_increment {
            params.insert(String::from("time_increment"), json!(days));
        }
        ListOptions {
            fields: fields.map(<[String]>::to_vec),
            params: Some(params),
            cache: CacheMode::Use,
        }
    }

    /// Rows for one object (campaign, ad group or ad) over `range`.
    pub async fn for_object(
        &self,
        id: &ResourceId,
        range: DateRange,
        fields: Option<&[String]>,
    ) -> Result<Vec<ResourceRecord>, ApiError> {
        self.inner
            .list_under(id, &self.range_options(range, fields))
            .await
    }

    /// Rows for many objects over `range`, batched.
    pub async fn for_objects(
        &self,
        ids: &[ResourceId],
        range: DateRange,
        fields: Option<&[String]>,
    ) -> Result<ChildBatch, ApiError> {
        self.inner
            .list_children_batched(ids, &self.range_options(range, fields))
            .await
    }

    /// Account-wide rows aggregated at `level`.
    pub async fn account(
        &self,
        level: InsightLevel,
        range: DateRange,
    ) -> Result<Vec<ResourceRecord>, ApiError> {
        let mut options = self.range_options(range, None);
        if let Some(params) = options.params.as_mut() {
            params.insert(String::from("level"), json!(level.as_param()));
        }
        self.inner.list(&options).await
    }

    pub async fn clear_cache(&self) {
        self.inner.clear_cache().await;
    }
}
