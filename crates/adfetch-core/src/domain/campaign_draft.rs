use serde_json::{json, Map, Value};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::ValidationError;

/// `2026-10-17T09:30:00+0200`, the schedule format the platform accepts.
const SCHEDULE_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
);

/// A campaign that does not exist yet.
///
/// Budgets are given in the account currency and sent in cents. At least
/// one of the daily or lifetime budget must be set.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignDraft {
    pub name: String,
    pub objective: String,
    pub status: String,
    pub daily_budget: Option<f64>,
    pub lifetime_budget: Option<f64>,
    pub special_ad_categories: Vec<String>,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    /// Sent as-is; overrides anything derived from the fields above.
    pub extra: Map<String, Value>,
}

impl CampaignDraft {
    /// Paused campaign with no budget and no special ad categories.
    pub fn new(name: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objective: objective.into(),
            status: String::from("PAUSED"),
            daily_budget: None,
            lifetime_budget: None,
            special_ad_categories: Vec::new(),
            start_time: None,
            end_time: None,
            extra: Map::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_daily_budget(mut self, amount: f64) -> Self {
        self.daily_budget = Some(amount);
        self
    }

    pub fn with_lifetime_budget(mut self, amount: f64) -> Self {
        self.lifetime_budget = Some(amount);
        self
    }

    pub fn with_schedule(mut self, start: OffsetDateTime, end: Option<OffsetDateTime>) -> Self {
        self.start_time = Some(start);
        self.end_time = end;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Creation parameters, validated.
    pub fn to_params(&self) -> Result<Map<String, Value>, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyCampaignName);
        }
        let daily = budget_cents("daily_budget", self.daily_budget)?;
        let lifetime = budget_cents("lifetime_budget", self.lifetime_budget)?;
        if daily.is_none() && lifetime.is_none() {
            return Err(ValidationError::MissingBudget);
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(ValidationError::InvertedSchedule);
            }
        }

        let mut params = Map::new();
        params.insert(String::from("name"), json!(self.name));
        params.insert(String::from("objective"), json!(self.objective));
        params.insert(String::from("status"), json!(self.status));
        params.insert(
            String::from("special_ad_categories"),
            json!(self.special_ad_categories),
        );
        if let Some(cents) = daily {
            params.insert(String::from("daily_budget"), json!(cents));
        }
        if let Some(cents) = lifetime {
            params.insert(String::from("lifetime_budget"), json!(cents));
        }
        if let Some(start) = self.start_time {
            params.insert(String::from("start_time"), json!(format_schedule(start)));
        }
        if let Some(end) = self.end_time {
            params.insert(String::from("end_time"), json!(format_schedule(end)));
        }
        for (name, value) in &self.extra {
            params.insert(name.clone(), value.clone());
        }
        Ok(params)
    }
}

/// `None` and zero both mean "no budget of this kind".
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn budget_cents(field: &'static str, amount: Option<f64>) -> Result<Option<u64>, ValidationError> {
    match amount {
        None => Ok(None),
        Some(amount) if amount == 0.0 => Ok(None),
        Some(amount) if !amount.is_finite() || amount < 0.0 => {
            Err(ValidationError::InvalidBudget { field })
        }
        Some(amount) => Ok(Some((amount * 100.0).round() as u64)),
    }
}

fn format_schedule(moment: OffsetDateTime) -> String {
    moment
        .format(SCHEDULE_FORMAT)
        .unwrap_or_else(|_| moment.to_string())
}
