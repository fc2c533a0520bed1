//! Projection engine: forecasts upcoming statements of a credit card from
//! the expenses already recorded for future dates.

use chrono::{DateTime, Utc};

use crate::domain::{
    BillingCycle, OwnerId, ProductId, SummaryProjection, month_offset, project_summaries,
    year_month,
};
use crate::storage::LedgerTx;

use super::checks::load_product;
use super::summaries::billing_cycle;
use super::{AppError, LedgerService};

/// Longest horizon accepted for a projection.
pub const MAX_PROJECTION_MONTHS: u32 = 60;

/// Project `months` statements of `product_id` starting with the month of
/// `as_of`. Read-only.
pub async fn project(
    tx: &mut LedgerTx,
    product_id: ProductId,
    months: u32,
    as_of: DateTime<Utc>,
) -> Result<Vec<SummaryProjection>, AppError> {
    if months == 0 || months > MAX_PROJECTION_MONTHS {
        return Err(AppError::InvalidInput(format!(
            "projection horizon must be between 1 and {} months, got {}",
            MAX_PROJECTION_MONTHS, months
        )));
    }

    let card = load_product(tx, product_id).await?;
    let (year, month) = year_month(as_of);
    let (last_year, last_month) = month_offset(year, month, months - 1);
    let last: BillingCycle = billing_cycle(&card, last_year, last_month)?;

    let (closing_day, due_day) = card
        .billing_days()
        .ok_or_else(|| AppError::MissingBillingCycle(card.name.clone()))?;

    let expenses: Vec<_> = tx
        .expenses_between(card.id, as_of, last.closing_date)
        .await?
        .into_iter()
        .map(|t| (t.date, t.amount))
        .collect();

    Ok(project_summaries(closing_day, due_day, as_of, months, &expenses))
}

impl LedgerService {
    pub async fn project_summaries(
        &self,
        owner: OwnerId,
        product_id: ProductId,
        months: u32,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<SummaryProjection>, AppError> {
        let mut tx = self.begin(owner).await?;
        project(&mut tx, product_id, months, as_of).await
    }
}
