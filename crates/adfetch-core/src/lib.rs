//! # Adfetch Core
//!
//! Resilient, cached access to hierarchical ad-platform resources and their
//! performance metrics.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Classified remote failures** (rate-limited, transient, permanent) with
//!   per-kind retry policies, exponential backoff and jitter
//! - **Per-manager TTL caches** keyed by canonical query fingerprints
//! - **Resource managers** for campaigns, ad groups, ads and insights
//! - **Fan-out** over the campaign → ad group → ad → insight hierarchy, as
//!   chunked batch requests or a bounded worker pool
//! - **A shared rate limiter** so every manager and worker backs off together
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api_error`] | Classified remote failures and the error-code table |
//! | [`cache`] | TTL cache and cache modes |
//! | [`client`] | `AdsClient` wiring |
//! | [`clock`] | Time source for caches and backoff |
//! | [`config`] | Client configuration (TOML, environment) |
//! | [`domain`] | Resource ids, kinds, records, joined records, date ranges |
//! | [`error`] | Validation and configuration errors |
//! | [`fanout`] | Hierarchy traversal strategies |
//! | [`graph`] | Graph-style JSON API transport |
//! | [`http_client`] | HTTP client abstraction |
//! | [`manager`] | Per-kind resource managers |
//! | [`query`] | Query specs and fingerprints |
//! | [`retry`] | Retry policies and executor |
//! | [`throttling`] | Shared rate limiter |
//! | [`transport`] | Upstream platform contract |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use adfetch_core::{AdsClient, ClientConfig, DateRange, FanOutMode, FanOutRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AdsClient::from_config(ClientConfig::from_env()?)?;
//!
//!     let today = time::OffsetDateTime::now_utc().date();
//!     let request = FanOutRequest::new(DateRange::last_days(today, 7)?);
//!     let report = client.fan_out(FanOutMode::Chunked, &request).await?;
//!
//!     for record in &report.records {
//!         println!("{:?}", record.flatten());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ FanOutStrategy               │
//! │ (chunked / parallel)         │
//! └──────────────┬───────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐     ┌──────────────────┐
//! │ ResourceManager ×4           │────▶│ TtlCache (each)  │
//! └──────────────┬───────────────┘     └──────────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐     ┌──────────────────┐
//! │ RetryExecutor                │────▶│ SharedRateLimiter│
//! └──────────────┬───────────────┘     └──────────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐     ┌──────────────────┐
//! │ AdsTransport (GraphTransport)│────▶│ HttpClient       │
//! └──────────────────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every remote operation, mutations included, returns
//! `Result<_, ApiError>`:
//!
//! ```rust
//! use adfetch_core::{ApiError, ApiErrorKind};
//!
//! fn handle_error(error: ApiError) {
//!     match error.kind() {
//!         ApiErrorKind::RateLimited => {
//!             // Retry budget ran out while throttled
//!         }
//!         ApiErrorKind::Permanent => {
//!             // Bad request, missing object, or insufficient permissions
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber. Access
//! tokens are redacted from logged URLs and error messages.

pub mod api_error;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod fanout;
pub mod graph;
pub mod http_client;
pub mod manager;
pub mod query;
pub mod retry;
pub mod throttling;
pub mod transport;

// Re-export commonly used types at crate root for convenience

// Classified failures
pub use api_error::{classify_code, classify_status, ApiError, ApiErrorKind};

// Caching
pub use cache::{CacheEntry, CacheMode, TtlCache};

// Client wiring
pub use client::{AdsClient, FanOutMode};

// Time
pub use clock::{Clock, ManualClock, SystemClock};

// Configuration
pub use config::{ClientConfig, FanOutConfig};

// Domain models
pub use domain::{
    CampaignDraft, DateRange, InsightLevel, JoinedRecord, ResourceId, ResourceKind, ResourceRecord,
};

// Error types
pub use error::{ConfigError, ValidationError};

// Fan-out
pub use fanout::{
    chunk_ids, ChunkedAssembler, FanOutReport, FanOutRequest, FanOutStrategy, Hierarchy,
    ParallelCollector, SkippedParent,
};

// Graph transport
pub use graph::{GraphSettings, GraphTransport};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpMethod, HttpRequest,
    HttpResponse, ReqwestHttpClient,
};

// Managers
pub use manager::{
    ChildBatch, InsightsManager, ListOptions, ParentFailure, ResourceDefaults, ResourceManager,
};

// Queries
pub use query::{QueryFingerprint, QuerySpec};

// Retry logic
pub use retry::{Backoff, CallClass, RetryConfig, RetryExecutor, RetryPolicy, RetryState};

// Throttling
pub use throttling::{RateLimitConfig, SharedRateLimiter};

// Transport contract
pub use transport::{
    AdsTransport, BatchRequest, BatchResponse, CreateRequest, ListRequest, MutateRequest,
    ObjectRequest, TransportFuture, MAX_BATCH_SIZE,
};
