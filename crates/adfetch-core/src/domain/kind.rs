use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Kind of remote object a [`ResourceRecord`](super::ResourceRecord) describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Campaign,
    AdGroup,
    Ad,
    InsightRow,
}

impl ResourceKind {
    pub const ALL: [Self; 4] = [Self::Campaign, Self::AdGroup, Self::Ad, Self::InsightRow];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
            Self::AdGroup => "ad_group",
            Self::Ad => "ad",
            Self::InsightRow => "insight",
        }
    }

    /// Edge name used when listing this kind under a parent object.
    pub const fn edge(self) -> &'static str {
        match self {
            Self::Campaign => "campaigns",
            Self::AdGroup => "adsets",
            Self::Ad => "ads",
            Self::InsightRow => "insights",
        }
    }

    /// Field holding the parent's id, for kinds that have a parent.
    pub const fn parent_field(self) -> Option<&'static str> {
        match self {
            Self::Campaign | Self::InsightRow => None,
            Self::AdGroup => Some("campaign_id"),
            Self::Ad => Some("adset_id"),
        }
    }

    /// Kind of the direct children fetched during fan-out.
    pub const fn child(self) -> Option<Self> {
        match self {
            Self::Campaign => Some(Self::AdGroup),
            Self::AdGroup => Some(Self::Ad),
            Self::Ad => Some(Self::InsightRow),
            Self::InsightRow => None,
        }
    }

    /// Whether this kind can be changed through `mutate`.
    pub const fn mutable(self) -> bool {
        !matches!(self, Self::InsightRow)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "campaign" | "campaigns" => Ok(Self::Campaign),
            "ad_group" | "adset" | "adsets" => Ok(Self::AdGroup),
            "ad" | "ads" => Ok(Self::Ad),
            "insight" | "insights" => Ok(Self::InsightRow),
            other => Err(ValidationError::InvalidResourceKind {
                value: other.to_owned(),
            }),
        }
    }
}

/// Aggregation level for insights queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightLevel {
    Account,
    Campaign,
    AdGroup,
    Ad,
}

impl InsightLevel {
    /// Value sent in the `level` query parameter.
    pub const fn as_param(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Campaign => "campaign",
            Self::AdGroup => "adset",
            Self::Ad => "ad",
        }
    }

    /// Field naming the object an insight row was aggregated for.
    pub const fn object_field(self) -> &'static str {
        match self {
            Self::Account => "account_id",
            Self::Campaign => "campaign_id",
            Self::AdGroup => "adset_id",
            Self::Ad => "ad_id",
        }
    }
}

impl FromStr for InsightLevel {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "account" => Ok(Self::Account),
            "campaign" => Ok(Self::Campaign),
            "adset" | "ad_group" => Ok(Self::AdGroup),
            "ad" => Ok(Self::Ad),
            other => Err(ValidationError::InvalidInsightLevel {
                value: other.to_owned(),
            }),
        }
    }
}
