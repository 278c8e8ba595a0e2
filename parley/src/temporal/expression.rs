use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};

/// Calendar offset applied to the reference instant. Months and years clamp the day to
/// the end of the target month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Offset {
    pub years: i32,
    pub months: i32,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl Offset {
    pub fn days(days: i64) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn weeks(weeks: i64) -> Self {
        Self {
            weeks,
            ..Self::default()
        }
    }

    pub fn months(months: i32) -> Self {
        Self {
            months,
            ..Self::default()
        }
    }

    pub fn years(years: i32) -> Self {
        Self {
            years,
            ..Self::default()
        }
    }

    fn apply(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        let total_months = i64::from(self.years) * 12 + i64::from(self.months);
        let months = Months::new(u32::try_from(total_months.unsigned_abs()).ok()?);
        let shifted = if total_months >= 0 {
            at.checked_add_months(months)?
        } else {
            at.checked_sub_months(months)?
        };

        shifted
            .checked_add_signed(TimeDelta::try_weeks(self.weeks)?)?
            .checked_add_signed(TimeDelta::try_days(self.days)?)?
            .checked_add_signed(TimeDelta::try_hours(self.hours)?)?
            .checked_add_signed(TimeDelta::try_minutes(self.minutes)?)
    }
}

/// Start or end of a calendar unit. Ends are exclusive: the end of a day is the next
/// midnight, so ranges built from them are half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    StartOfDay,
    EndOfDay,
    StartOfWeek,
    EndOfWeek,
    StartOfMonth,
    EndOfMonth,
    StartOfYear,
    EndOfYear,
}

impl Boundary {
    fn apply(&self, at: NaiveDateTime, first_day_of_week: Weekday) -> Option<NaiveDateTime> {
        let date = at.date();
        let day = match self {
            Boundary::StartOfDay => date,
            Boundary::EndOfDay => date.succ_opt()?,
            Boundary::StartOfWeek => week_start(date, first_day_of_week)?,
            Boundary::EndOfWeek => week_start(date, first_day_of_week)?
                .checked_add_signed(TimeDelta::try_days(7)?)?,
            Boundary::StartOfMonth => date.with_day(1)?,
            Boundary::EndOfMonth => date.with_day(1)?.checked_add_months(Months::new(1))?,
            Boundary::StartOfYear => NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
            Boundary::EndOfYear => NaiveDate::from_ymd_opt(date.year().checked_add(1)?, 1, 1)?,
        };
        day.and_hms_opt(0, 0, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapModifier {
    /// Strictly before the reference date.
    Last,
    /// Within the current week (weekdays) or year (months).
    #[default]
    This,
    /// Strictly after the reference date.
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapTarget {
    Weekday(Weekday),
    /// 1 = January.
    Month(u32),
}

/// Moves the date to a named weekday or month, keeping the time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snap {
    pub target: SnapTarget,
    #[serde(default)]
    pub modifier: SnapModifier,
}

impl Snap {
    pub fn weekday(weekday: Weekday, modifier: SnapModifier) -> Self {
        Self {
            target: SnapTarget::Weekday(weekday),
            modifier,
        }
    }

    fn apply(&self, date: NaiveDate, first_day_of_week: Weekday) -> Option<NaiveDate> {
        match self.target {
            SnapTarget::Weekday(target) => {
                let today = i64::from(date.weekday().num_days_from_monday());
                let wanted = i64::from(target.num_days_from_monday());
                let delta = match self.modifier {
                    SnapModifier::This => {
                        let start = week_start(date, first_day_of_week)?;
                        let first = i64::from(first_day_of_week.num_days_from_monday());
                        let position = (wanted - first).rem_euclid(7);
                        return start.checked_add_signed(TimeDelta::try_days(position)?);
                    }
                    SnapModifier::Next => match (wanted - today).rem_euclid(7) {
                        0 => 7,
                        ahead => ahead,
                    },
                    SnapModifier::Last => match (today - wanted).rem_euclid(7) {
                        0 => -7,
                        behind => -behind,
                    },
                };
                date.checked_add_signed(TimeDelta::try_days(delta)?)
            }
            SnapTarget::Month(month) => {
                if !(1..=12).contains(&month) {
                    return None;
                }
                let year = match self.modifier {
                    SnapModifier::This => date.year(),
                    SnapModifier::Next if month > date.month() => date.year(),
                    SnapModifier::Next => date.year().checked_add(1)?,
                    SnapModifier::Last if month < date.month() => date.year(),
                    SnapModifier::Last => date.year().checked_sub(1)?,
                };
                let day = date.day().min(days_in_month(year, month)?);
                NaiveDate::from_ymd_opt(year, month, day)
            }
        }
    }
}

/// One end of a temporal expression: snap, then offset, then boundary, all in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DateSpec {
    pub offset: Offset,
    pub boundary: Option<Boundary>,
    pub snap: Option<Snap>,
}

impl DateSpec {
    pub fn at(offset: Offset, boundary: Option<Boundary>) -> Self {
        Self {
            offset,
            boundary,
            snap: None,
        }
    }

    pub fn snapped(self, snap: Snap) -> Self {
        Self {
            snap: Some(snap),
            ..self
        }
    }

    /// `None` when the result falls outside the representable calendar.
    pub fn evaluate(
        &self,
        local_now: NaiveDateTime,
        first_day_of_week: Weekday,
    ) -> Option<NaiveDateTime> {
        let mut at = local_now;
        if let Some(snap) = &self.snap {
            at = snap.apply(at.date(), first_day_of_week)?.and_time(at.time());
        }
        at = self.offset.apply(at)?;
        match self.boundary {
            Some(boundary) => boundary.apply(at, first_day_of_week),
            None => Some(at),
        }
    }
}

/// A single instant (`end` absent) or a half-open range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalExpression {
    pub start: DateSpec,
    #[serde(default)]
    pub end: Option<DateSpec>,
}

fn week_start(date: NaiveDate, first_day_of_week: Weekday) -> Option<NaiveDate> {
    let since = (i64::from(date.weekday().num_days_from_monday())
        - i64::from(first_day_of_week.num_days_from_monday()))
    .rem_euclid(7);
    date.checked_sub_signed(TimeDelta::try_days(since)?)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    // 2023-01-15 is a Sunday.
    fn reference() -> NaiveDateTime {
        at(2023, 1, 15, 10, 30)
    }

    fn eval(spec: DateSpec) -> NaiveDateTime {
        spec.evaluate(reference(), Weekday::Mon).unwrap()
    }

    #[test]
    fn boundaries_follow_the_calendar() {
        let cases = [
            (Boundary::StartOfYear, at(2023, 1, 1, 0, 0)),
            (Boundary::EndOfYear, at(2024, 1, 1, 0, 0)),
            (Boundary::StartOfMonth, at(2023, 1, 1, 0, 0)),
            (Boundary::EndOfMonth, at(2023, 2, 1, 0, 0)),
            (Boundary::StartOfDay, at(2023, 1, 15, 0, 0)),
            (Boundary::EndOfDay, at(2023, 1, 16, 0, 0)),
            (Boundary::StartOfWeek, at(2023, 1, 9, 0, 0)),
            (Boundary::EndOfWeek, at(2023, 1, 16, 0, 0)),
        ];
        for (boundary, expected) in cases {
            let spec = DateSpec::at(Offset::default(), Some(boundary));
            assert_eq!(eval(spec), expected, "{boundary:?}");
        }
    }

    #[test]
    fn week_boundaries_honour_first_day() {
        let spec = DateSpec::at(Offset::default(), Some(Boundary::StartOfWeek));
        assert_eq!(spec.evaluate(reference(), Weekday::Sun), Some(at(2023, 1, 15, 0, 0)));
        let end = DateSpec::at(Offset::default(), Some(Boundary::EndOfWeek));
        assert_eq!(end.evaluate(reference(), Weekday::Sun), Some(at(2023, 1, 22, 0, 0)));
    }

    #[test]
    fn month_offsets_clamp_the_day() {
        let spec = DateSpec::at(Offset::months(1), None);
        assert_eq!(
            spec.evaluate(at(2023, 1, 31, 9, 0), Weekday::Mon),
            Some(at(2023, 2, 28, 9, 0))
        );
        assert_eq!(
            DateSpec::at(Offset::months(-1), Some(Boundary::StartOfMonth))
                .evaluate(reference(), Weekday::Mon),
            Some(at(2022, 12, 1, 0, 0))
        );
    }

    #[test]
    fn weekday_snaps() {
        let next_friday =
            DateSpec::default().snapped(Snap::weekday(Weekday::Fri, SnapModifier::Next));
        assert_eq!(eval(next_friday), at(2023, 1, 20, 10, 30));

        let next_sunday =
            DateSpec::default().snapped(Snap::weekday(Weekday::Sun, SnapModifier::Next));
        assert_eq!(eval(next_sunday), at(2023, 1, 22, 10, 30));

        let last_sunday =
            DateSpec::default().snapped(Snap::weekday(Weekday::Sun, SnapModifier::Last));
        assert_eq!(eval(last_sunday), at(2023, 1, 8, 10, 30));

        let this_monday =
            DateSpec::default().snapped(Snap::weekday(Weekday::Mon, SnapModifier::This));
        assert_eq!(eval(this_monday), at(2023, 1, 9, 10, 30));
    }

    #[test]
    fn month_snaps() {
        let snap = |month, modifier| {
            DateSpec::default().snapped(Snap {
                target: SnapTarget::Month(month),
                modifier,
            })
        };
        assert_eq!(eval(snap(3, SnapModifier::Next)), at(2023, 3, 15, 10, 30));
        assert_eq!(eval(snap(1, SnapModifier::Next)), at(2024, 1, 15, 10, 30));
        assert_eq!(eval(snap(1, SnapModifier::Last)), at(2022, 1, 15, 10, 30));
        assert_eq!(snap(13, SnapModifier::This).evaluate(reference(), Weekday::Mon), None);
    }

    #[test]
    fn expression_deserializes_from_decision_json() {
        let expression: TemporalExpression = serde_json::from_value(serde_json::json!({
            "start": {"offset": {"weeks": 1}, "boundary": "start_of_week"},
            "end": {"offset": {"weeks": 1}, "boundary": "end_of_week"},
        }))
        .unwrap();
        assert_eq!(eval(expression.start), at(2023, 1, 16, 0, 0));
        assert_eq!(eval(expression.end.unwrap()), at(2023, 1, 23, 0, 0));
    }
}
