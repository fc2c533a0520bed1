use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CategoryId, Money, OwnerId, TransactionId, clamped_date};

pub type ServiceId = Uuid;
pub type BillId = Uuid;

/// Due day used when a service does not define one.
pub const DEFAULT_BILL_DUE_DAY: u32 = 15;

/// A recurring obligation (rent, utilities, subscriptions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringService {
    pub id: ServiceId,
    pub owner_id: OwnerId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub default_amount: Option<Money>,
    pub default_due_day: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringService {
    pub fn new(owner_id: OwnerId, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            category_id: None,
            default_amount: None,
            default_due_day: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_category(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn with_default_amount(mut self, amount: Option<Money>) -> Self {
        self.default_amount = amount;
        self
    }

    pub fn with_default_due_day(mut self, day: Option<u32>) -> Self {
        self.default_due_day = day;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Paid,
    Skipped,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::Paid => "paid",
            BillStatus::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BillStatus::Pending),
            "paid" => Some(BillStatus::Paid),
            "skipped" => Some(BillStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One month's instance of a recurring service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceBill {
    pub id: BillId,
    pub owner_id: OwnerId,
    pub service_id: ServiceId,
    pub year: i32,
    pub month: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub status: BillStatus,
    pub transaction_id: Option<TransactionId>,
    pub paid_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceBill {
    pub fn new(
        owner_id: OwnerId,
        service_id: ServiceId,
        year: i32,
        month: u32,
        due_date: NaiveDate,
        amount: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            service_id,
            year,
            month,
            due_date,
            amount,
            status: BillStatus::Pending,
            transaction_id: None,
            paid_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending bill synthesized from a service's defaults. `None` for an
    /// invalid month.
    pub fn from_service(service: &RecurringService, year: i32, month: u32) -> Option<Self> {
        let day = service.default_due_day.unwrap_or(DEFAULT_BILL_DUE_DAY);
        let due_date = clamped_date(year, month, day)?;
        Some(Self::new(
            service.owner_id,
            service.id,
            year,
            month,
            due_date,
            service.default_amount.unwrap_or_default(),
        ))
    }

    pub fn is_paid(&self) -> bool {
        self.status == BillStatus::Paid
    }
}

/// Bills to create so every active service has one for the period.
pub fn missing_bills(
    services: &[RecurringService],
    existing: &[ServiceBill],
    year: i32,
    month: u32,
) -> Vec<ServiceBill> {
    let billed: HashSet<ServiceId> = existing.iter().map(|bill| bill.service_id).collect();
    services
        .iter()
        .filter(|service| service.is_active && !billed.contains(&service.id))
        .filter_map(|service| ServiceBill::from_service(service, year, month))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bill_defaults() {
        let service = RecurringService::new(Uuid::new_v4(), "Internet".into());
        let bill = ServiceBill::from_service(&service, 2024, 4).unwrap();
        assert_eq!(bill.due_date, NaiveDate::from_ymd_opt(2024, 4, 15).unwrap());
        assert_eq!(bill.amount, dec!(0));
        assert_eq!(bill.status, BillStatus::Pending);
    }

    #[test]
    fn test_bill_due_day_is_clamped() {
        let service = RecurringService::new(Uuid::new_v4(), "Rent".into())
            .with_default_due_day(Some(31))
            .with_default_amount(Some(dec!(900)));
        let bill = ServiceBill::from_service(&service, 2023, 2).unwrap();
        assert_eq!(bill.due_date, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
        assert_eq!(bill.amount, dec!(900));
    }

    #[test]
    fn test_missing_bills_skips_inactive_and_billed() {
        let owner = Uuid::new_v4();
        let billed = RecurringService::new(owner, "Gym".into());
        let unbilled = RecurringService::new(owner, "Phone".into());
        let mut inactive = RecurringService::new(owner, "Old".into());
        inactive.is_active = false;

        let existing = vec![ServiceBill::from_service(&billed, 2024, 5).unwrap()];
        let services = vec![billed, unbilled.clone(), inactive];

        let missing = missing_bills(&services, &existing, 2024, 5);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].service_id, unbilled.id);
    }
}
