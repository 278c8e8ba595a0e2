//! Resolution of relative dates and back-references into concrete values.
//!
//! [`TemporalResolver::resolve`] is a pure function of the reference and the
//! [`ResolveContext`]; the current instant is an input, so results are reproducible.

mod expression;
mod tags;

pub use expression::{
    Boundary, DateSpec, Offset, Snap, SnapModifier, SnapTarget, TemporalExpression,
};
pub use tags::TemporalTag;

use chrono::{
    DateTime, LocalResult, NaiveDateTime, SecondsFormat, TimeDelta, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::context::normalize_expression;
use crate::error::{ParleyError, Result};

/// Longest local-time gap a DST transition can open.
const MAX_GAP_MINUTES: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveContext {
    pub time_zone: Tz,
    pub first_day_of_week: Weekday,
    pub now: DateTime<Utc>,
}

/// A mention extracted from a message, as the reasoner describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reference {
    Temporal {
        tag: TemporalTag,
    },
    Expression {
        start: DateSpec,
        #[serde(default)]
        end: Option<DateSpec>,
    },
    /// "that one", "the second task": something said earlier in the conversation.
    Anaphora {
        surface: String,
        #[serde(default)]
        collection_hint: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Instant(DateTime<Utc>),
    /// Half-open: `start` inclusive, `end` exclusive.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Must be answered from the conversation's resolution cache.
    Lookup {
        expression: String,
        collection_hint: Option<String>,
    },
}

impl Resolution {
    /// Inline rendering in the user's local time, substituted into the message text.
    pub fn render(&self, time_zone: Tz) -> String {
        let local = |at: &DateTime<Utc>| {
            at.with_timezone(&time_zone)
                .to_rfc3339_opts(SecondsFormat::Secs, false)
        };
        match self {
            Resolution::Instant(at) => local(at),
            Resolution::Range { start, end } => {
                format!("from {} (inclusive) to {} (exclusive)", local(start), local(end))
            }
            Resolution::Lookup { expression, .. } => expression.clone(),
        }
    }
}

pub struct TemporalResolver;

impl TemporalResolver {
    pub fn resolve(reference: &Reference, ctx: &ResolveContext) -> Result<Resolution> {
        match reference {
            Reference::Temporal { tag } => Self::resolve_expression(&tag.to_expression(), ctx),
            Reference::Expression { start, end } => Self::resolve_expression(
                &TemporalExpression {
                    start: *start,
                    end: *end,
                },
                ctx,
            ),
            Reference::Anaphora {
                surface,
                collection_hint,
            } => {
                let expression = normalize_expression(surface);
                if expression.is_empty() {
                    return Err(ParleyError::UnresolvedReference(
                        "an empty reference".to_string(),
                    ));
                }
                Ok(Resolution::Lookup {
                    expression,
                    collection_hint: collection_hint
                        .as_deref()
                        .map(str::trim)
                        .filter(|hint| !hint.is_empty())
                        .map(str::to_string),
                })
            }
        }
    }

    pub fn resolve_expression(
        expression: &TemporalExpression,
        ctx: &ResolveContext,
    ) -> Result<Resolution> {
        let local_now = ctx.now.with_timezone(&ctx.time_zone).naive_local();
        let evaluate = |spec: &DateSpec| {
            if *spec == DateSpec::default() {
                return Ok(ctx.now);
            }
            spec.evaluate(local_now, ctx.first_day_of_week)
                .and_then(|naive| to_utc(ctx.time_zone, naive))
                .ok_or_else(|| {
                    ParleyError::InvalidDecision(
                        "date expression falls outside the supported calendar".to_string(),
                    )
                })
        };

        let start = evaluate(&expression.start)?;
        let Some(end_spec) = &expression.end else {
            return Ok(Resolution::Instant(start));
        };
        let end = evaluate(end_spec)?;
        if end <= start {
            return Err(ParleyError::InvalidDecision(format!(
                "date range ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Resolution::Range { start, end })
    }
}

/// Local wall time to UTC. Ambiguous times take the earlier instant; times inside a
/// DST gap move forward to the first valid instant after it.
fn to_utc(time_zone: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match time_zone.from_local_datetime(&naive) {
        LocalResult::Single(at) => Some(at.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            let truncated = naive.date().and_hms_opt(naive.hour(), naive.minute(), 0)?;
            (1..=MAX_GAP_MINUTES).find_map(|minutes| {
                let candidate = truncated.checked_add_signed(TimeDelta::try_minutes(minutes)?)?;
                time_zone
                    .from_local_datetime(&candidate)
                    .earliest()
                    .map(|at| at.with_timezone(&Utc))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::{America::New_York, Europe::Berlin};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx(time_zone: Tz, now: DateTime<Utc>) -> ResolveContext {
        ResolveContext {
            time_zone,
            first_day_of_week: Weekday::Mon,
            now,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn range(resolution: Resolution) -> (DateTime<Utc>, DateTime<Utc>) {
        match resolution {
            Resolution::Range { start, end } => (start, end),
            other => panic!("expected a range, got {other:?}"),
        }
    }

    #[test]
    fn today_is_local_midnight_to_midnight() {
        // 23:30 UTC on the 14th is already the 15th in Berlin.
        let context = ctx(Berlin, utc(2026, 10, 14, 23, 30));
        let (start, end) = range(
            TemporalResolver::resolve(&Reference::Temporal { tag: TemporalTag::Today }, &context)
                .unwrap(),
        );
        assert_eq!(start, utc(2026, 10, 14, 22, 0));
        assert_eq!(end, utc(2026, 10, 15, 22, 0));
    }

    #[test]
    fn now_is_the_supplied_instant() {
        let now = utc(2026, 10, 14, 9, 15);
        let now_tag = Reference::Temporal { tag: TemporalTag::Now };
        let resolution = TemporalResolver::resolve(&now_tag, &ctx(Berlin, now)).unwrap();
        assert_eq!(resolution, Resolution::Instant(now));
    }

    #[test]
    fn week_honours_first_day_of_week() {
        // 2026-10-14 is a Wednesday.
        let mut context = ctx(Tz::UTC, utc(2026, 10, 14, 12, 0));
        let this_week = Reference::Temporal { tag: TemporalTag::ThisWeek };

        let (start, end) = range(TemporalResolver::resolve(&this_week, &context).unwrap());
        assert_eq!((start, end), (utc(2026, 10, 12, 0, 0), utc(2026, 10, 19, 0, 0)));

        context.first_day_of_week = Weekday::Sun;
        let (start, end) = range(TemporalResolver::resolve(&this_week, &context).unwrap());
        assert_eq!((start, end), (utc(2026, 10, 11, 0, 0), utc(2026, 10, 18, 0, 0)));
    }

    #[test]
    fn weekend_spans_saturday_and_sunday() {
        let context = ctx(Tz::UTC, utc(2026, 10, 14, 12, 0));
        let weekend = Reference::Temporal { tag: TemporalTag::ThisWeekend };
        let (start, end) = range(TemporalResolver::resolve(&weekend, &context).unwrap());
        assert_eq!((start, end), (utc(2026, 10, 17, 0, 0), utc(2026, 10, 19, 0, 0)));
    }

    #[test]
    fn dst_gap_moves_forward() {
        // Clocks in New York jump from 02:00 to 03:00 on 2026-03-08.
        let context = ctx(New_York, utc(2026, 3, 7, 12, 0));
        let expression = TemporalExpression {
            start: DateSpec {
                offset: Offset {
                    days: 1,
                    ..Offset::default()
                },
                boundary: Some(Boundary::StartOfDay),
                snap: None,
            },
            end: None,
        };
        let Resolution::Instant(midnight) =
            TemporalResolver::resolve_expression(&expression, &context).unwrap()
        else {
            panic!("expected an instant");
        };
        assert_eq!(midnight, utc(2026, 3, 8, 5, 0));

        let inside_gap = chrono::NaiveDate::from_ymd_opt(2026, 3, 8)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert_eq!(to_utc(New_York, inside_gap), Some(utc(2026, 3, 8, 7, 0)));
    }

    #[test]
    fn ambiguous_time_takes_earliest() {
        // 01:30 happens twice in New York on 2026-11-01.
        let repeated = chrono::NaiveDate::from_ymd_opt(2026, 11, 1)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();
        assert_eq!(to_utc(New_York, repeated), Some(utc(2026, 11, 1, 5, 30)));
    }

    #[test]
    fn anaphora_becomes_a_lookup() {
        let context = ctx(Tz::UTC, Utc::now());
        let reference: Reference = serde_json::from_value(json!({
            "kind": "anaphora",
            "surface": "  That   Task ",
            "collection_hint": "Tasks"
        }))
        .unwrap();
        assert_eq!(
            TemporalResolver::resolve(&reference, &context).unwrap(),
            Resolution::Lookup {
                expression: "that task".into(),
                collection_hint: Some("Tasks".into()),
            }
        );

        let empty = Reference::Anaphora {
            surface: "  ".into(),
            collection_hint: None,
        };
        assert!(matches!(
            TemporalResolver::resolve(&empty, &context),
            Err(ParleyError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn expressions_parse_from_decision_json() {
        let reference: Reference = serde_json::from_value(json!({
            "kind": "expression",
            "start": {"offset": {"months": -1}, "boundary": "start_of_month"},
            "end": {"offset": {"months": -1}, "boundary": "end_of_month"}
        }))
        .unwrap();
        let context = ctx(Tz::UTC, utc(2023, 1, 15, 12, 0));
        let (start, end) = range(TemporalResolver::resolve(&reference, &context).unwrap());
        assert_eq!((start, end), (utc(2022, 12, 1, 0, 0), utc(2023, 1, 1, 0, 0)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let expression = TemporalExpression {
            start: DateSpec::at(Offset::days(2), None),
            end: Some(DateSpec::at(Offset::default(), None)),
        };
        let result = TemporalResolver::resolve_expression(&expression, &ctx(Tz::UTC, Utc::now()));
        assert!(matches!(result, Err(ParleyError::InvalidDecision(_))));
    }
}
