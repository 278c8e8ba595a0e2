use chrono::Weekday;
use serde::{Deserialize, Serialize};

use super::expression::{Boundary, DateSpec, Offset, Snap, SnapModifier, TemporalExpression};

/// Shorthand for the everyday expressions. Every tag except `now` names a whole
/// period and lowers onto a half-open range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalTag {
    Now,
    Today,
    Tomorrow,
    Yesterday,
    ThisWeek,
    NextWeek,
    LastWeek,
    ThisMonth,
    NextMonth,
    LastMonth,
    ThisYear,
    NextYear,
    LastYear,
    ThisWeekend,
    InDays(u32),
    DaysAgo(u32),
    Next(Weekday),
    Last(Weekday),
}

impl TemporalTag {
    pub fn to_expression(&self) -> TemporalExpression {
        match *self {
            TemporalTag::Now => TemporalExpression {
                start: DateSpec::default(),
                end: None,
            },
            TemporalTag::Today => day(Offset::default()),
            TemporalTag::Tomorrow => day(Offset::days(1)),
            TemporalTag::Yesterday => day(Offset::days(-1)),
            TemporalTag::InDays(days) => day(Offset::days(i64::from(days))),
            TemporalTag::DaysAgo(days) => day(Offset::days(-i64::from(days))),
            TemporalTag::ThisWeek => week(0),
            TemporalTag::NextWeek => week(1),
            TemporalTag::LastWeek => week(-1),
            TemporalTag::ThisMonth => {
                period(Offset::months(0), Boundary::StartOfMonth, Boundary::EndOfMonth)
            }
            TemporalTag::NextMonth => {
                period(Offset::months(1), Boundary::StartOfMonth, Boundary::EndOfMonth)
            }
            TemporalTag::LastMonth => {
                period(Offset::months(-1), Boundary::StartOfMonth, Boundary::EndOfMonth)
            }
            TemporalTag::ThisYear => {
                period(Offset::years(0), Boundary::StartOfYear, Boundary::EndOfYear)
            }
            TemporalTag::NextYear => {
                period(Offset::years(1), Boundary::StartOfYear, Boundary::EndOfYear)
            }
            TemporalTag::LastYear => {
                period(Offset::years(-1), Boundary::StartOfYear, Boundary::EndOfYear)
            }
            TemporalTag::ThisWeekend => {
                let saturday = Snap::weekday(Weekday::Sat, SnapModifier::This);
                TemporalExpression {
                    start: DateSpec::at(Offset::default(), Some(Boundary::StartOfDay))
                        .snapped(saturday),
                    end: Some(
                        DateSpec::at(Offset::days(2), Some(Boundary::StartOfDay)).snapped(saturday),
                    ),
                }
            }
            TemporalTag::Next(weekday) => snapped_day(Snap::weekday(weekday, SnapModifier::Next)),
            TemporalTag::Last(weekday) => snapped_day(Snap::weekday(weekday, SnapModifier::Last)),
        }
    }
}

fn period(offset: Offset, start: Boundary, end: Boundary) -> TemporalExpression {
    TemporalExpression {
        start: DateSpec::at(offset, Some(start)),
        end: Some(DateSpec::at(offset, Some(end))),
    }
}

fn day(offset: Offset) -> TemporalExpression {
    period(offset, Boundary::StartOfDay, Boundary::EndOfDay)
}

fn week(weeks: i64) -> TemporalExpression {
    period(Offset::weeks(weeks), Boundary::StartOfWeek, Boundary::EndOfWeek)
}

fn snapped_day(snap: Snap) -> TemporalExpression {
    let TemporalExpression { start, end } = day(Offset::default());
    TemporalExpression {
        start: start.snapped(snap),
        end: end.map(|end| end.snapped(snap)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_deserialize_from_snake_case() {
        let tags: Vec<TemporalTag> = serde_json::from_value(json!([
            "today",
            "this_weekend",
            {"in_days": 3},
            {"next": "friday"},
            {"last": "Mon"}
        ]))
        .unwrap();
        assert_eq!(
            tags,
            vec![
                TemporalTag::Today,
                TemporalTag::ThisWeekend,
                TemporalTag::InDays(3),
                TemporalTag::Next(Weekday::Fri),
                TemporalTag::Last(Weekday::Mon),
            ]
        );
    }

    #[test]
    fn only_now_is_an_instant() {
        assert!(TemporalTag::Now.to_expression().end.is_none());
        assert!(TemporalTag::Tomorrow.to_expression().end.is_some());
        assert!(TemporalTag::Next(Weekday::Tue).to_expression().end.is_some());
    }
}
