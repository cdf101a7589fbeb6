use thiserror::Error;

/// Validation and contract errors exposed by `adfetch-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("resource id cannot be empty")]
    EmptyResourceId,
    #[error("resource id contains invalid character '{ch}' at index {index}")]
    ResourceIdInvalidChar { ch: char, index: usize },

    #[error("invalid resource kind '{value}', expected one of campaign, ad_group, ad, insight")]
    InvalidResourceKind { value: String },
    #[error("invalid insight level '{value}', expected one of account, campaign, ad_group, ad")]
    InvalidInsightLevel { value: String },

    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("date range start {since} is after end {until}")]
    InvertedDateRange { since: String, until: String },
    #[error("a window of {days} days reaches before the earliest representable date")]
    DateOutOfRange { days: u16 },

    #[error("campaign name cannot be empty")]
    EmptyCampaignName,
    #[error("a campaign needs a daily_budget or a lifetime_budget")]
    MissingBudget,
    #[error("{field} must be a positive amount")]
    InvalidBudget { field: &'static str },
    #[error("campaign end time is before its start time")]
    InvertedSchedule,

    #[error("time increment must be at least one day")]
    ZeroTimeIncrement,

    #[error("record must be a JSON object")]
    RecordNotObject,
    #[error("field list cannot contain an empty field name")]
    EmptyFieldName,

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunk size {size} exceeds the upstream batch limit {max}")]
    ChunkSizeTooLarge { size: usize, max: usize },
    #[error("worker count must be greater than zero")]
    ZeroWorkers,
    #[error("retry budget must allow at least one attempt")]
    ZeroAttempts,

    #[error("ad account id cannot be empty")]
    EmptyAccountId,
    #[error("access token cannot be empty")]
    EmptyAccessToken,
}

/// Errors raised while assembling a client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable '{name}' is not set")]
    MissingEnv { name: &'static str },
}
