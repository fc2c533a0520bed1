use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BillingCycle, Money, month_offset, year_month};

/// Forecast of a future statement built from already-recorded expenses,
/// typically the later installments of past purchases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryProjection {
    pub year: i32,
    pub month: u32,
    pub amount: Money,
    pub transaction_count: usize,
}

/// Project `months` statements starting with the month of `as_of`.
///
/// Only expenses dated strictly after `as_of` are counted, each in the
/// billing window that contains it.
pub fn project_summaries(
    closing_day: u32,
    due_day: u32,
    as_of: DateTime<Utc>,
    months: u32,
    expenses: &[(DateTime<Utc>, Money)],
) -> Vec<SummaryProjection> {
    let (year, month) = year_month(as_of);

    (0..months)
        .filter_map(|offset| {
            let (y, m) = month_offset(year, month, offset);
            BillingCycle::new(y, m, closing_day, due_day)
        })
        .map(|cycle| {
            let (amount, transaction_count) = expenses
                .iter()
                .filter(|(date, _)| *date > as_of && cycle.contains(*date))
                .fold((Money::ZERO, 0), |(sum, count), (_, amount)| {
                    (sum + *amount, count + 1)
                });
            SummaryProjection {
                year: cycle.year,
                month: cycle.month,
                amount,
                transaction_count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_projects_future_installments() {
        let expenses = vec![
            (at(2024, 1, 5), dec!(999)), // before as_of
            (at(2024, 1, 20), dec!(100)),
            (at(2024, 2, 20), dec!(100)),
            (at(2024, 3, 20), dec!(100)),
            (at(2024, 3, 24), dec!(50)),
        ];

        let projections = project_summaries(25, 5, at(2024, 1, 10), 3, &expenses);

        assert_eq!(projections.len(), 3);
        assert_eq!((projections[0].year, projections[0].month), (2024, 1));
        assert_eq!(projections[0].amount, dec!(100));
        assert_eq!(projections[0].transaction_count, 1);
        assert_eq!(projections[1].amount, dec!(100));
        assert_eq!(projections[2].amount, dec!(150));
        assert_eq!(projections[2].transaction_count, 2);
    }

    #[test]
    fn test_projection_crosses_year_boundary() {
        let expenses = vec![(at(2025, 1, 10), dec!(40))];
        let projections = project_summaries(15, 1, at(2024, 12, 1), 2, &expenses);
        assert_eq!((projections[1].year, projections[1].month), (2025, 1));
        assert_eq!(projections[1].amount, dec!(40));
        assert_eq!(projections[0].amount, dec!(0));
    }
}
