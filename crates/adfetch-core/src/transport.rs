//! Upstream platform contract.
//!
//! [`AdsTransport`] is the only seam between the resilient access layer and
//! the remote API. Implementations perform exactly one logical call per
//! method invocation (following pagination internally) and classify every
//! failure into an [`ApiError`]; retries and caching live above this layer.
//!
//! | Method | Request | Response |
//! |--------|---------|----------|
//! | [`query`](AdsTransport::query) | [`ListRequest`] | all pages of records |
//! | [`get`](AdsTransport::get) | [`ObjectRequest`] | one record |
//! | [`mutate`](AdsTransport::mutate) | [`MutateRequest`] | acknowledgement |
//! | [`create`](AdsTransport::create) | [`CreateRequest`] | id of the new object |
//! | [`batch`](AdsTransport::batch) | `[BatchRequest]` | [`BatchResponse`] keyed by name |

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use crate::api_error::ApiError;
use crate::query::QuerySpec;
use crate::{ResourceId, ResourceKind, ResourceRecord};

/// Upper bound on sub-requests in one batched call.
pub const MAX_BATCH_SIZE: usize = 50;

pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// List `kind` objects under the `scope` object (an ad account or a parent).
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub kind: ResourceKind,
    pub scope: ResourceId,
    pub spec: QuerySpec,
}

impl ListRequest {
    pub fn new(kind: ResourceKind, scope: ResourceId, spec: QuerySpec) -> Self {
        Self { kind, scope, spec }
    }
}

/// Read one object by id.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRequest {
    pub kind: ResourceKind,
    pub id: ResourceId,
    pub fields: Vec<String>,
}

/// Change fields of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct MutateRequest {
    pub kind: ResourceKind,
    pub id: ResourceId,
    pub data: Map<String, Value>,
}

/// Create one `kind` object under the `account` it will belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub kind: ResourceKind,
    pub account: ResourceId,
    pub data: Map<String, Value>,
}

/// One named sub-request of a batched call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub name: String,
    pub list: ListRequest,
}

impl BatchRequest {
    /// Names the sub-request after its scope, so results map back to parents.
    pub fn for_scope(list: ListRequest) -> Self {
        Self {
            name: list.scope.as_str().to_owned(),
            list,
        }
    }
}

/// Per-sub-request outcome, keyed by [`BatchRequest::name`].
pub type BatchResponse = HashMap<String, Result<Vec<ResourceRecord>, ApiError>>;

/// Remote platform contract.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one transport is shared by every
/// manager and every fan-out worker.
pub trait AdsTransport: Send + Sync {
    /// Fetches every page of a list query.
    fn query<'a>(&'a self, request: &'a ListRequest) -> TransportFuture<'a, Vec<ResourceRecord>>;

    /// Fetches one object. A missing object fails with
    /// [`ApiError::not_found`].
    fn get<'a>(&'a self, request: &'a ObjectRequest) -> TransportFuture<'a, ResourceRecord>;

    /// Applies a mutation and waits for the platform acknowledgement.
    fn mutate<'a>(&'a self, request: &'a MutateRequest) -> TransportFuture<'a, ()>;

    /// Creates an object and returns the id the platform assigned.
    fn create<'a>(&'a self, request: &'a CreateRequest) -> TransportFuture<'a, ResourceId>;

    /// Sends up to [`max_batch_size`](AdsTransport::max_batch_size) list
    /// queries in one round-trip.
    ///
    /// An `Err` means the whole batch failed; individual sub-request failures
    /// are reported inside the [`BatchResponse`].
    fn batch<'a>(&'a self, requests: &'a [BatchRequest]) -> TransportFuture<'a, BatchResponse>;

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }
}
