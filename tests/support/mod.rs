//! Shared fixtures for integration tests: an in-memory platform and a client
//! wired to it with a manual clock.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use adfetch_core::{
    AdsClient, AdsTransport, ApiError, BatchRequest, BatchResponse, ClientConfig, CreateRequest,
    DateRange, ListRequest, ManualClock, MutateRequest, ObjectRequest, ResourceId, ResourceKind,
    ResourceRecord, TransportFuture,
};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Query,
    Get,
    Mutate,
    Create,
    Batch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query { kind: ResourceKind, scope: ResourceId },
    Get { kind: ResourceKind, id: ResourceId },
    Mutate { kind: ResourceKind, id: ResourceId },
    Create { kind: ResourceKind, account: ResourceId },
    Batch { kind: ResourceKind, scopes: Vec<ResourceId> },
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Self::Query { .. } => Op::Query,
            Self::Get { .. } => Op::Get,
            Self::Mutate { .. } => Op::Mutate,
            Self::Create { .. } => Op::Create,
            Self::Batch { .. } => Op::Batch,
        }
    }
}

#[derive(Default)]
struct FakeState {
    records: HashMap<ResourceKind, Vec<ResourceRecord>>,
    calls: Vec<Call>,
    scripted: VecDeque<(Op, ApiError)>,
    failing_scopes: HashMap<ResourceId, ApiError>,
}

/// In-memory ad platform.
///
/// Account-scoped queries (`act_…`) return every record of the kind; other
/// scopes return the records whose parent link (or insight object) names the
/// scope. Mutations write through, so later reads observe them.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, kind: ResourceKind, values: Vec<Value>) -> Self {
        {
            let mut state = self.state.lock().expect("fake transport lock");
            let records = state.records.entry(kind).or_default();
            for value in values {
                records.push(ResourceRecord::from_json(kind, value).expect("fixture record"));
            }
        }
        self
    }

    /// The next call of kind `op` fails with `error`.
    pub fn fail_next(&self, op: Op, error: ApiError) {
        self.state
            .lock()
            .expect("fake transport lock")
            .scripted
            .push_back((op, error));
    }

    /// Every query or batch sub-request under `scope` fails with `error`.
    pub fn fail_scope(&self, scope: &str, error: ApiError) {
        self.state
            .lock()
            .expect("fake transport lock")
            .failing_scopes
            .insert(id(scope), error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().expect("fake transport lock").calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|call| call.op() == op).count()
    }

    /// Sub-request counts of every batch call for `kind`, in call order.
    pub fn batch_sizes(&self, kind: ResourceKind) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Batch { kind: batch_kind, scopes } if batch_kind == kind => Some(scopes.len()),
                _ => None,
            })
            .collect()
    }

    fn begin(&self, call: Call) -> Result<(), ApiError> {
        let mut state = self.state.lock().expect("fake transport lock");
        let op = call.op();
        state.calls.push(call);
        if let Some(position) = state.scripted.iter().position(|(scripted, _)| *scripted == op) {
            if let Some((_, error)) = state.scripted.remove(position) {
                return Err(error);
            }
        }
        Ok(())
    }

    fn select(&self, kind: ResourceKind, scope: &ResourceId) -> Result<Vec<ResourceRecord>, ApiError> {
        let state = self.state.lock().expect("fake transport lock");
        if let Some(error) = state.failing_scopes.get(scope) {
            return Err(error.clone());
        }

        let all = state.records.get(&kind).cloned().unwrap_or_default();
        if scope.as_str().starts_with("act_") {
            return Ok(all);
        }

        Ok(all
            .into_iter()
            .filter(|record| {
                let owner = match kind {
                    ResourceKind::InsightRow => record.insight_object_id(),
                    _ => record.parent_id(),
                };
                owner.as_ref() == Some(scope)
            })
            .collect())
    }
}

impl AdsTransport for FakeTransport {
    fn query<'a>(&'a self, request: &'a ListRequest) -> TransportFuture<'a, Vec<ResourceRecord>> {
        Box::pin(async move {
            self.begin(Call::Query {
                kind: request.kind,
                scope: request.scope.clone(),
            })?;
            self.select(request.kind, &request.scope)
        })
    }

    fn get<'a>(&'a self, request: &'a ObjectRequest) -> TransportFuture<'a, ResourceRecord> {
        Box::pin(async move {
            self.begin(Call::Get {
                kind: request.kind,
                id: request.id.clone(),
            })?;
            let state = self.state.lock().expect("fake transport lock");
            state
                .records
                .get(&request.kind)
                .and_then(|records| records.iter().find(|record| record.id() == &request.id))
                .cloned()
                .ok_or_else(|| ApiError::not_found(request.id.as_str()))
        })
    }

    fn mutate<'a>(&'a self, request: &'a MutateRequest) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.begin(Call::Mutate {
                kind: request.kind,
                id: request.id.clone(),
            })?;
            let mut state = self.state.lock().expect("fake transport lock");
            let record = state
                .records
                .get_mut(&request.kind)
                .and_then(|records| records.iter_mut().find(|record| record.id() == &request.id))
                .ok_or_else(|| ApiError::not_found(request.id.as_str()))?;
            for (name, value) in &request.data {
                record.set(name.clone(), value.clone());
            }
            Ok(())
        })
    }

    /// New objects get ids 900, 901, ... numbered by create call, failed calls included.
    fn create<'a>(&'a self, request: &'a CreateRequest) -> TransportFuture<'a, ResourceId> {
        Box::pin(async move {
            self.begin(Call::Create {
                kind: request.kind,
                account: request.account.clone(),
            })?;
            let mut state = self.state.lock().expect("fake transport lock");
            let created = state
                .calls
                .iter()
                .filter(|call| call.op() == Op::Create)
                .count();
            let new_id = id(&format!("{}", 899 + created));
            let mut fields = request.data.clone();
            fields.insert(String::from("id"), json!(new_id.as_str()));
            let record = ResourceRecord::new(request.kind, new_id.clone(), fields);
            state.records.entry(request.kind).or_default().push(record);
            Ok(new_id)
        })
    }

    fn batch<'a>(&'a self, requests: &'a [BatchRequest]) -> TransportFuture<'a, BatchResponse> {
        Box::pin(async move {
            let kind = requests
                .first()
                .map_or(ResourceKind::Campaign, |request| request.list.kind);
            self.begin(Call::Batch {
                kind,
                scopes: requests.iter().map(|request| request.list.scope.clone()).collect(),
            })?;

            Ok(requests
                .iter()
                .map(|request| {
                    (
                        request.name.clone(),
                        self.select(request.list.kind, &request.list.scope),
                    )
                })
                .collect())
        })
    }
}

pub fn id(raw: &str) -> ResourceId {
    ResourceId::parse(raw).expect("valid id")
}

pub fn week() -> DateRange {
    DateRange::parse("2026-10-01", "2026-10-07").expect("valid range")
}

/// Config with deterministic retry delays and no local quota.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new("act_1", "test-token");
    config.retry.jitter = false;
    config.rate_limit.enabled = false;
    config
}

pub fn client_with(
    transport: Arc<FakeTransport>,
    config: ClientConfig,
) -> (AdsClient, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let client = AdsClient::with_transport(config, transport, clock.clone()).expect("valid client config");
    (client, clock)
}

pub fn client(transport: Arc<FakeTransport>) -> (AdsClient, Arc<ManualClock>) {
    client_with(transport, test_config())
}

/// Two campaigns with one ad group and one ad each, an insight row for the
/// first ad only, and an ad group pointing at a campaign that does not exist.
pub fn two_campaign_platform() -> FakeTransport {
    FakeTransport::new()
        .with_records(
            ResourceKind::Campaign,
            vec![
                json!({"id": "101", "name": "Brand", "status": "ACTIVE"}),
                json!({"id": "102", "name": "Retargeting", "status": "ACTIVE"}),
            ],
        )
        .with_records(
            ResourceKind::AdGroup,
            vec![
                json!({"id": "201", "name": "Lookalike", "campaign_id": "101"}),
                json!({"id": "202", "name": "Site visitors", "campaign_id": "102"}),
                json!({"id": "299", "name": "Orphan", "campaign_id": "999"}),
            ],
        )
        .with_records(
            ResourceKind::Ad,
            vec![
                json!({"id": "301", "name": "Carousel", "adset_id": "201", "campaign_id": "101"}),
                json!({"id": "302", "name": "Video", "adset_id": "202", "campaign_id": "102"}),
                json!({"id": "399", "name": "Orphan ad", "adset_id": "299", "campaign_id": "999"}),
            ],
        )
        .with_records(
            ResourceKind::InsightRow,
            vec![json!({
                "ad_id": "301",
                "adset_id": "201",
                "campaign_id": "101",
                "date_start": "2026-10-01",
                "date_stop": "2026-10-07",
                "impressions": "1200",
                "spend": "48.10"
            })],
        )
}
