use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    InstitutionId, Money, OwnerId, ProductId, TransactionId, clamped_date, end_of_day,
    next_month, previous_month,
};

pub type SummaryId = Uuid;
pub type SummaryItemId = Uuid;
pub type AdjustmentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    /// Still tracking the card's transactions
    Draft,
    /// Items frozen, awaiting payment
    Closed,
    Paid,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Draft => "draft",
            SummaryStatus::Closed => "closed",
            SummaryStatus::Paid => "paid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(SummaryStatus::Draft),
            "closed" => Some(SummaryStatus::Closed),
            "paid" => Some(SummaryStatus::Paid),
            _ => None,
        }
    }

    /// Items of a frozen statement no longer follow their transactions.
    pub fn is_frozen(&self) -> bool {
        !matches!(self, SummaryStatus::Draft)
    }
}

impl std::fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    Commission,
    Tax,
    Interest,
    Insurance,
    /// Reduces the amount owed
    Credit,
    Other,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Commission => "commission",
            AdjustmentType::Tax => "tax",
            AdjustmentType::Interest => "interest",
            AdjustmentType::Insurance => "insurance",
            AdjustmentType::Credit => "credit",
            AdjustmentType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "commission" => Some(AdjustmentType::Commission),
            "tax" => Some(AdjustmentType::Tax),
            "interest" => Some(AdjustmentType::Interest),
            "insurance" => Some(AdjustmentType::Insurance),
            "credit" => Some(AdjustmentType::Credit),
            "other" => Some(AdjustmentType::Other),
            _ => None,
        }
    }

    /// Stored sign of an adjustment: credits are negative, charges positive.
    pub fn signed(&self, amount: Money) -> Money {
        match self {
            AdjustmentType::Credit => -amount.abs(),
            _ => amount.abs(),
        }
    }
}

impl std::fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing period of a credit card for one (year, month).
///
/// The window is `(opens_after, closing_date]`: everything after the previous
/// closing instant up to and including this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingCycle {
    pub year: i32,
    pub month: u32,
    pub opens_after: DateTime<Utc>,
    pub closing_date: DateTime<Utc>,
    pub due_date: NaiveDate,
}

impl BillingCycle {
    /// Closing falls on `closing_day` at 23:59:59; the due date stays in the
    /// same month only when `due_day` is after `closing_day`. Days are clamped
    /// to the month length. `None` for an invalid month.
    pub fn new(year: i32, month: u32, closing_day: u32, due_day: u32) -> Option<Self> {
        let closing = clamped_date(year, month, closing_day)?;
        let (prev_year, prev_month) = previous_month(year, month);
        let previous_closing = clamped_date(prev_year, prev_month, closing_day)?;

        let (due_year, due_month) = if due_day > closing_day {
            (year, month)
        } else {
            next_month(year, month)
        };
        let due_date = clamped_date(due_year, due_month, due_day)?;

        Some(Self {
            year,
            month,
            opens_after: end_of_day(previous_closing),
            closing_date: end_of_day(closing),
            due_date,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at > self.opens_after && at <= self.closing_date
    }
}

/// Monthly statement of a credit card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCardSummary {
    pub id: SummaryId,
    pub owner_id: OwnerId,
    pub product_id: ProductId,
    pub institution_id: Option<InstitutionId>,
    pub year: i32,
    pub month: u32,
    pub closing_date: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub calculated_amount: Money,
    pub adjustments_amount: Money,
    pub total_amount: Money,
    pub status: SummaryStatus,
    pub paid_date: Option<DateTime<Utc>>,
    pub paid_from_product_id: Option<ProductId>,
    pub payment_transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditCardSummary {
    pub fn new(
        owner_id: OwnerId,
        product_id: ProductId,
        institution_id: Option<InstitutionId>,
        cycle: &BillingCycle,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            product_id,
            institution_id,
            year: cycle.year,
            month: cycle.month,
            closing_date: cycle.closing_date,
            due_date: cycle.due_date,
            calculated_amount: Money::ZERO,
            adjustments_amount: Money::ZERO,
            total_amount: Money::ZERO,
            status: SummaryStatus::Draft,
            paid_date: None,
            paid_from_product_id: None,
            payment_transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_totals(&mut self, totals: SummaryTotals) {
        self.calculated_amount = totals.calculated;
        self.adjustments_amount = totals.adjustments;
        self.total_amount = totals.total;
    }

    pub fn is_paid(&self) -> bool {
        self.status == SummaryStatus::Paid
    }
}

/// Attribution of one transaction to one statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryItem {
    pub id: SummaryItemId,
    pub summary_id: SummaryId,
    pub transaction_id: TransactionId,
    pub amount: Money,
    pub is_reconciled: bool,
    pub has_discrepancy: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SummaryItem {
    pub fn new(summary_id: SummaryId, transaction_id: TransactionId, amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            summary_id,
            transaction_id,
            amount,
            is_reconciled: false,
            has_discrepancy: false,
            notes: None,
            created_at: Utc::now(),
        }
    }
}

/// Manual charge or credit applied to a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryAdjustment {
    pub id: AdjustmentId,
    pub summary_id: SummaryId,
    pub adjustment_type: AdjustmentType,
    pub description: String,
    /// Negative for credits
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

impl SummaryAdjustment {
    pub fn new(
        summary_id: SummaryId,
        adjustment_type: AdjustmentType,
        description: String,
        amount: Money,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            summary_id,
            adjustment_type,
            description,
            amount: adjustment_type.signed(amount),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryTotals {
    pub calculated: Money,
    pub adjustments: Money,
    pub total: Money,
}

impl SummaryTotals {
    pub fn compute(
        item_amounts: impl IntoIterator<Item = Money>,
        adjustment_amounts: impl IntoIterator<Item = Money>,
    ) -> Self {
        let calculated: Money = item_amounts.into_iter().sum();
        let adjustments: Money = adjustment_amounts.into_iter().sum();
        Self {
            calculated,
            adjustments,
            total: calculated + adjustments,
        }
    }
}

/// Changes needed to make a statement's items match the transactions
/// currently inside its billing window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub insert: Vec<(TransactionId, Money)>,
    pub update: Vec<(SummaryItemId, Money)>,
    pub remove: Vec<SummaryItemId>,
    /// Sum of the item amounts once the plan is applied
    pub calculated_amount: Money,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

/// Diff existing items against `(transaction, amount)` pairs in the window.
pub fn reconcile_items(existing: &[SummaryItem], in_window: &[(TransactionId, Money)]) -> ReconcilePlan {
    let wanted: HashMap<TransactionId, Money> = in_window.iter().copied().collect();
    let mut plan = ReconcilePlan::default();

    for item in existing {
        match wanted.get(&item.transaction_id) {
            Some(&amount) if amount != item.amount => plan.update.push((item.id, amount)),
            Some(_) => {}
            None => plan.remove.push(item.id),
        }
    }

    let present: HashMap<TransactionId, SummaryItemId> = existing
        .iter()
        .map(|item| (item.transaction_id, item.id))
        .collect();
    for &(transaction_id, amount) in in_window {
        if !present.contains_key(&transaction_id) {
            plan.insert.push((transaction_id, amount));
        }
    }

    plan.calculated_amount = wanted.values().copied().sum();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_billing_cycle_window_and_due_date() {
        let cycle = BillingCycle::new(2024, 3, 25, 5).unwrap();
        assert_eq!(cycle.opens_after, at(2024, 2, 25, 23, 59, 59));
        assert_eq!(cycle.closing_date, at(2024, 3, 25, 23, 59, 59));
        assert_eq!(cycle.due_date, NaiveDate::from_ymd_opt(2024, 4, 5).unwrap());

        assert!(!cycle.contains(at(2024, 2, 25, 23, 59, 59)));
        assert!(cycle.contains(at(2024, 2, 26, 0, 0, 0)));
        assert!(cycle.contains(at(2024, 3, 25, 23, 59, 59)));
        assert!(!cycle.contains(at(2024, 3, 26, 0, 0, 0)));
    }

    #[test]
    fn test_billing_cycle_due_same_month() {
        let cycle = BillingCycle::new(2024, 6, 10, 20).unwrap();
        assert_eq!(cycle.due_date, NaiveDate::from_ymd_opt(2024, 6, 20).unwrap());
    }

    #[test]
    fn test_billing_cycle_clamps_short_months() {
        let cycle = BillingCycle::new(2023, 3, 31, 10).unwrap();
        assert_eq!(cycle.opens_after, at(2023, 2, 28, 23, 59, 59));
        assert_eq!(cycle.closing_date, at(2023, 3, 31, 23, 59, 59));

        let january = BillingCycle::new(2024, 1, 30, 31).unwrap();
        assert_eq!(january.opens_after, at(2023, 12, 30, 23, 59, 59));
        assert_eq!(january.due_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());

        assert!(BillingCycle::new(2024, 13, 1, 1).is_none());
    }

    #[test]
    fn test_adjustment_sign() {
        assert_eq!(AdjustmentType::Credit.signed(dec!(50)), dec!(-50));
        assert_eq!(AdjustmentType::Tax.signed(dec!(12.5)), dec!(12.5));
        assert_eq!(AdjustmentType::Interest.signed(dec!(-3)), dec!(3));
    }

    #[test]
    fn test_totals() {
        let totals = SummaryTotals::compute([dec!(100), dec!(50.5)], [dec!(10), dec!(-20)]);
        assert_eq!(totals.calculated, dec!(150.5));
        assert_eq!(totals.adjustments, dec!(-10));
        assert_eq!(totals.total, dec!(140.5));
    }

    #[test]
    fn test_reconcile_items() {
        let summary_id = Uuid::new_v4();
        let (kept, changed, gone, new) = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        let existing = vec![
            SummaryItem::new(summary_id, kept, dec!(10)),
            SummaryItem::new(summary_id, changed, dec!(20)),
            SummaryItem::new(summary_id, gone, dec!(30)),
        ];
        let window = vec![(kept, dec!(10)), (changed, dec!(25)), (new, dec!(40))];

        let plan = reconcile_items(&existing, &window);

        assert_eq!(plan.insert, vec![(new, dec!(40))]);
        assert_eq!(plan.update, vec![(existing[1].id, dec!(25))]);
        assert_eq!(plan.remove, vec![existing[2].id]);
        assert_eq!(plan.calculated_amount, dec!(75));
    }

    #[test]
    fn test_reconcile_is_noop_when_in_sync() {
        let summary_id = Uuid::new_v4();
        let tx = Uuid::new_v4();
        let existing = vec![SummaryItem::new(summary_id, tx, dec!(10))];
        let plan = reconcile_items(&existing, &[(tx, dec!(10))]);
        assert!(plan.is_noop());
        assert_eq!(plan.calculated_amount, dec!(10));
    }
}
