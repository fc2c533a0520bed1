use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CategoryId, Money, OwnerId, ProductId, SummaryId, add_months, split_evenly};

pub type TransactionId = Uuid;
pub type InstallmentGroupId = Uuid;

/// Upper bound on the number of installments of a single purchase.
pub const MAX_INSTALLMENTS: u32 = 48;

/// Number of monthly parts a Plan Z restructuring produces.
pub const PLAN_Z_INSTALLMENTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money entering the destination product
    Income,
    /// Money leaving the source product
    Expense,
    /// Money moving between two owned products
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
            TransactionType::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "income" => Some(TransactionType::Income),
            "expense" => Some(TransactionType::Expense),
            "transfer" => Some(TransactionType::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position of a row inside an installment group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub group_id: InstallmentGroupId,
    pub number: u32,
    pub total: u32,
}

/// A single money movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner_id: OwnerId,
    pub transaction_type: TransactionType,
    /// Always positive; direction comes from the type
    pub amount: Money,
    pub date: DateTime<Utc>,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub from_product_id: Option<ProductId>,
    pub to_product_id: Option<ProductId>,
    pub installment: Option<Installment>,
    /// Eligible for restructuring into three payments when its statement is paid
    pub plan_z: bool,
    /// Statement whose payment generated this row
    pub statement_id: Option<SummaryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    fn new(
        owner_id: OwnerId,
        transaction_type: TransactionType,
        amount: Money,
        date: DateTime<Utc>,
        description: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            transaction_type,
            amount,
            date,
            description,
            category_id: None,
            from_product_id: None,
            to_product_id: None,
            installment: None,
            plan_z: false,
            statement_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn expense(
        owner_id: OwnerId,
        product_id: ProductId,
        amount: Money,
        date: DateTime<Utc>,
        description: String,
    ) -> Self {
        let mut tx = Self::new(owner_id, TransactionType::Expense, amount, date, description);
        tx.from_product_id = Some(product_id);
        tx
    }

    pub fn income(
        owner_id: OwnerId,
        product_id: ProductId,
        amount: Money,
        date: DateTime<Utc>,
        description: String,
    ) -> Self {
        let mut tx = Self::new(owner_id, TransactionType::Income, amount, date, description);
        tx.to_product_id = Some(product_id);
        tx
    }

    pub fn transfer(
        owner_id: OwnerId,
        from: ProductId,
        to: ProductId,
        amount: Money,
        date: DateTime<Utc>,
        description: String,
    ) -> Self {
        let mut tx = Self::new(owner_id, TransactionType::Transfer, amount, date, description);
        tx.from_product_id = Some(from);
        tx.to_product_id = Some(to);
        tx
    }

    pub fn with_category(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn with_installment(mut self, installment: Installment) -> Self {
        self.installment = Some(installment);
        self
    }

    pub fn with_plan_z(mut self, plan_z: bool) -> Self {
        self.plan_z = plan_z;
        self
    }

    pub fn with_statement(mut self, statement_id: SummaryId) -> Self {
        self.statement_id = Some(statement_id);
        self
    }

    /// Signed balance deltas produced by `amount` on each referenced product.
    pub fn balance_legs(&self, amount: Money) -> Vec<(ProductId, Money)> {
        let mut legs = Vec::with_capacity(2);
        match self.transaction_type {
            TransactionType::Income => {
                if let Some(to) = self.to_product_id {
                    legs.push((to, amount));
                }
            }
            TransactionType::Expense => {
                if let Some(from) = self.from_product_id {
                    legs.push((from, -amount));
                }
            }
            TransactionType::Transfer => {
                if let Some(from) = self.from_product_id {
                    legs.push((from, -amount));
                }
                if let Some(to) = self.to_product_id {
                    legs.push((to, amount));
                }
            }
        }
        legs
    }
}

/// One slot of an installment schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentSlot {
    pub number: u32,
    pub amount: Money,
    pub date: DateTime<Utc>,
}

/// Split `amount` into `count` monthly slots starting at `first_date`.
///
/// Amounts follow [`split_evenly`]; dates advance one calendar month per slot
/// with the day clamped to the month length. `None` on date overflow.
pub fn installment_schedule(
    amount: Money,
    count: u32,
    first_date: DateTime<Utc>,
) -> Option<Vec<InstallmentSlot>> {
    split_evenly(amount, count)
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            let offset = i as u32;
            add_months(first_date, offset).map(|date| InstallmentSlot {
                number: offset + 1,
                amount: part,
                date,
            })
        })
        .collect()
}

pub fn installment_description(description: &str, number: u32, total: u32) -> String {
    format!("{} (installment {}/{})", description, number, total)
}

pub fn plan_z_description(description: &str, number: u32) -> String {
    format!("{} (Plan Z {}/{})", description, number, PLAN_Z_INSTALLMENTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_transaction_type_roundtrip() {
        for tt in [
            TransactionType::Income,
            TransactionType::Expense,
            TransactionType::Transfer,
        ] {
            assert_eq!(TransactionType::from_str(tt.as_str()), Some(tt));
        }
    }

    #[test]
    fn test_balance_legs() {
        let owner = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let date = at(2024, 3, 1);

        let expense = Transaction::expense(owner, a, dec!(10), date, "coffee".into());
        assert_eq!(expense.balance_legs(dec!(10)), vec![(a, dec!(-10))]);

        let income = Transaction::income(owner, b, dec!(10), date, "salary".into());
        assert_eq!(income.balance_legs(dec!(10)), vec![(b, dec!(10))]);

        let transfer = Transaction::transfer(owner, a, b, dec!(5), date, "move".into());
        assert_eq!(transfer.balance_legs(dec!(5)), vec![(a, dec!(-5)), (b, dec!(5))]);
    }

    #[test]
    fn test_installment_schedule_clamps_dates() {
        let slots = installment_schedule(dec!(100), 2, at(2023, 1, 31)).unwrap();
        assert_eq!(slots[0].date, at(2023, 1, 31));
        assert_eq!(slots[1].date, at(2023, 2, 28));

        let slots = installment_schedule(dec!(100), 2, at(2024, 1, 31)).unwrap();
        assert_eq!(slots[1].date, at(2024, 2, 29));
    }

    #[test]
    fn test_installment_schedule_sums_to_amount() {
        let slots = installment_schedule(dec!(1000), 3, at(2024, 5, 10)).unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots.iter().map(|s| s.amount).sum::<Money>(), dec!(1000));
        assert_eq!(slots[0].amount, dec!(333.34));
        assert_eq!(
            slots.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(slots[2].date, at(2024, 7, 10));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(installment_description("TV", 2, 12), "TV (installment 2/12)");
        assert_eq!(plan_z_description("Flight", 1), "Flight (Plan Z 1/3)");
    }
}
