use crate::schema::{CodeScheme, LedgerRecord, PeriodSelector};
use chrono::{Days, NaiveDate};
use std::cmp::Ordering;

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// Canonical period key for a month: its last day.
pub fn month_key(year: i32, month: u32) -> Option<NaiveDate> {
    last_day_of_month(year, month)
}

/// Amount of `record` for `period`. Months without data count as zero.
pub fn select_period_value(record: &LedgerRecord, period: &PeriodSelector) -> f64 {
    match period {
        PeriodSelector::Annual => record.annual_value,
        _ => record
            .monthly_values
            .iter()
            .filter(|(key, _)| period.contains(**key))
            .map(|(_, value)| *value)
            .sum(),
    }
}

/// `numerator / denominator`, or zero when the quotient would not be finite.
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    finite_or_zero(numerator / denominator)
}

pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Relative comparison with an absolute floor, for aggregated amounts.
pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= tolerance * scale
}

/// Proper ancestor candidates of `code`, longest first.
pub fn ancestor_codes(code: &str, scheme: CodeScheme) -> Vec<&str> {
    match scheme {
        CodeScheme::Dotted => code
            .char_indices()
            .filter(|(_, c)| *c == '.')
            .map(|(i, _)| &code[..i])
            .filter(|prefix| !prefix.is_empty())
            .rev()
            .collect(),
        CodeScheme::Positional => {
            let mut prefixes: Vec<&str> = code
                .char_indices()
                .skip(1)
                .map(|(i, _)| &code[..i])
                .collect();
            prefixes.reverse();
            prefixes
        }
    }
}

/// Natural ordering for account codes: numeric segments compare as numbers,
/// so "1.9" sorts before "1.10".
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny).then_with(|| x.len().cmp(&y.len())),
                    _ => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}
