use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

use super::Reply;

/// A message delivered by the channel adapter, with the sender's locale settings.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub user_id: String,
    pub conversation_id: String,
    pub text: String,
    pub time_zone: Tz,
    pub first_day_of_week: Weekday,
}

impl InboundMessage {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            text: text.into(),
            time_zone: Tz::UTC,
            first_day_of_week: Weekday::Mon,
        }
    }

    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn with_first_day_of_week(mut self, first_day_of_week: Weekday) -> Self {
        self.first_day_of_week = first_day_of_week;
        self
    }
}

pub fn parse_time_zone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ParleyError::InvalidTimeZone(name.to_string()))
}

/// 0 = Monday through 6 = Sunday.
pub fn weekday_from_index(index: u8) -> Result<Weekday> {
    match index {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        _ => Err(ParleyError::InvalidRequest(format!(
            "firstDayOfWeek must be between 0 (Monday) and 6 (Sunday), got {index}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The request was carried out.
    Ok,
    /// The assistant needs more information before acting.
    Clarification,
    /// Another message for this conversation is still in flight.
    Busy,
    /// The turn failed and nothing was applied.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub status: TurnStatus,
    pub reply: Reply,
}
