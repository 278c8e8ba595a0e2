//! Message intake DTOs for the v1 API.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ParleyError, Result};
use crate::models::{
    parse_time_zone, weekday_from_index, InboundMessage, TurnOutcome, TurnStatus, UiElement,
};

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// Request body for `POST /api/v1/messages`.
#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[validate(length(min = 1, max = 128))]
    pub conversation_id: String,
    /// The message as the user typed it.
    #[validate(length(max = 8000))]
    pub text: String,
    /// IANA time zone name. Defaults to `UTC`.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    /// 0 = Monday … 6 = Sunday. Defaults to Monday.
    #[serde(default)]
    #[validate(range(max = 6))]
    pub first_day_of_week: u8,
}

impl SendMessageRequest {
    pub fn into_message(self) -> Result<InboundMessage> {
        self.validate()
            .map_err(|errors| ParleyError::InvalidRequest(errors.to_string()))?;
        let time_zone = parse_time_zone(&self.time_zone)?;
        let first_day_of_week = weekday_from_index(self.first_day_of_week)?;
        Ok(InboundMessage::new(self.user_id, self.conversation_id, self.text)
            .with_time_zone(time_zone)
            .with_first_day_of_week(first_day_of_week))
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub conversation_id: String,
    /// `ok`, `clarification`, `busy` or `error`.
    #[schema(value_type = String)]
    pub status: TurnStatus,
    /// Reply elements, each tagged by `type`: markdown, table, chart or checkbox.
    #[schema(value_type = Vec<Object>)]
    pub elements: Vec<UiElement>,
}

impl From<TurnOutcome> for SendMessageResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            conversation_id: outcome.conversation_id,
            status: outcome.status,
            elements: outcome.reply.elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use serde_json::json;

    fn request(value: serde_json::Value) -> SendMessageRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn defaults_apply() {
        let message = request(json!({"userId": "u", "conversationId": "c", "text": "hi"}))
            .into_message()
            .unwrap();
        assert_eq!(message.time_zone, chrono_tz::Tz::UTC);
        assert_eq!(message.first_day_of_week, Weekday::Mon);
    }

    #[test]
    fn locale_settings_are_parsed() {
        let message = request(json!({
            "userId": "u", "conversationId": "c", "text": "hi",
            "timeZone": "America/New_York", "firstDayOfWeek": 6
        }))
        .into_message()
        .unwrap();
        assert_eq!(message.time_zone, chrono_tz::America::New_York);
        assert_eq!(message.first_day_of_week, Weekday::Sun);
    }

    #[test]
    fn bad_fields_are_rejected() {
        let unknown_zone = request(json!({
            "userId": "u", "conversationId": "c", "text": "hi", "timeZone": "Nowhere/City"
        }));
        assert!(matches!(unknown_zone.into_message(), Err(ParleyError::InvalidTimeZone(_))));

        let empty_user = request(json!({"userId": "", "conversationId": "c", "text": "hi"}));
        assert!(matches!(empty_user.into_message(), Err(ParleyError::InvalidRequest(_))));

        let bad_day = request(json!({
            "userId": "u", "conversationId": "c", "text": "hi", "firstDayOfWeek": 9
        }));
        assert!(matches!(bad_day.into_message(), Err(ParleyError::InvalidRequest(_))));
    }

    #[test]
    fn response_uses_camel_case() {
        let response = SendMessageResponse {
            conversation_id: "c".into(),
            status: TurnStatus::Clarification,
            elements: vec![UiElement::markdown("Which one?")],
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["conversationId"], "c");
        assert_eq!(value["status"], "clarification");
        assert_eq!(value["elements"][0]["type"], "markdown");
    }
}
