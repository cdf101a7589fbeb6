//! # Domain Models
//!
//! Canonical domain types for the three-level ad hierarchy and its metrics.
//!
//! ## Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ResourceId`] | Validated opaque platform id |
//! | [`ResourceKind`] | Campaign, ad group, ad or insight row |
//! | [`ResourceRecord`] | One remote object with its requested fields |
//! | [`CampaignDraft`] | Validated parameters for creating a campaign |
//! | [`JoinedRecord`] | Campaign + ad group + ad + optional insight snapshot |
//! | [`DateRange`] | Inclusive reporting window for insights |
//! | [`InsightLevel`] | Aggregation level of an insights query |
//!
//! Parent linkage is held by id only: an ad group names its campaign through
//! the field returned by [`ResourceKind::parent_field`], and an ad names its
//! ad group the same way. Records never own their parents.

mod campaign_draft;
mod date_range;
mod joined;
mod kind;
mod record;
mod resource_id;

pub use campaign_draft::CampaignDraft;
pub use date_range::DateRange;
pub use joined::JoinedRecord;
pub use kind::{InsightLevel, ResourceKind};
pub use record::ResourceRecord;
pub use resource_id::ResourceId;
