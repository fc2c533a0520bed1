//! Typed inputs of the application operations.
//!
//! Requests arrive already parsed: enums are closed, amounts are decimals and
//! dates are UTC timestamps. Business validation happens in the engines.

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{
    AdjustmentType, CardProvider, CategoryId, CategoryType, CreditLimits, Currency,
    InstitutionId, InstitutionType, Money, ProductId, ProductType, ServiceId, TransactionType,
};

/// A new income or expense, optionally split into monthly installments.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub product_id: ProductId,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub date: DateTime<Utc>,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub installments: u32,
    pub plan_z: bool,
}

impl NewTransaction {
    pub fn expense(product_id: ProductId, amount: Money, date: DateTime<Utc>, description: impl Into<String>) -> Self {
        Self {
            product_id,
            transaction_type: TransactionType::Expense,
            amount,
            date,
            description: description.into(),
            category_id: None,
            installments: 1,
            plan_z: false,
        }
    }

    pub fn income(product_id: ProductId, amount: Money, date: DateTime<Utc>, description: impl Into<String>) -> Self {
        Self {
            transaction_type: TransactionType::Income,
            ..Self::expense(product_id, amount, date, description)
        }
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_installments(mut self, installments: u32) -> Self {
        self.installments = installments;
        self
    }

    pub fn with_plan_z(mut self, plan_z: bool) -> Self {
        self.plan_z = plan_z;
        self
    }
}

/// Fields of a transaction that can be edited. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub amount: Option<Money>,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub plan_z: Option<bool>,
}

/// Money moved between two owned products.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub from_product_id: ProductId,
    pub to_product_id: ProductId,
    pub amount: Money,
    pub date: DateTime<Utc>,
    pub description: String,
    pub category_id: Option<CategoryId>,
}

#[derive(Debug, Clone)]
pub struct NewInstitution {
    pub name: String,
    pub institution_type: InstitutionType,
    pub share_summary: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InstitutionUpdate {
    pub name: Option<String>,
    pub share_summary: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub icon: Option<String>,
    pub category_type: CategoryType,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub product_type: ProductType,
    pub currency: Currency,
    pub institution_id: Option<InstitutionId>,
    pub balance: Money,
    pub linked_product_id: Option<ProductId>,
    pub closing_day: Option<u32>,
    pub due_day: Option<u32>,
    pub limits: CreditLimits,
    pub last_four_digits: Option<String>,
    pub provider: Option<CardProvider>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, product_type: ProductType, currency: Currency) -> Self {
        Self {
            name: name.into(),
            product_type,
            currency,
            institution_id: None,
            balance: Money::ZERO,
            linked_product_id: None,
            closing_day: None,
            due_day: None,
            limits: CreditLimits::default(),
            last_four_digits: None,
            provider: None,
        }
    }

    pub fn with_institution(mut self, institution_id: InstitutionId) -> Self {
        self.institution_id = Some(institution_id);
        self
    }

    pub fn with_balance(mut self, balance: Money) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_linked_product(mut self, product_id: ProductId) -> Self {
        self.linked_product_id = Some(product_id);
        self
    }

    pub fn with_billing_cycle(mut self, closing_day: u32, due_day: u32) -> Self {
        self.closing_day = Some(closing_day);
        self.due_day = Some(due_day);
        self
    }

    pub fn with_limits(mut self, limits: CreditLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_card(mut self, last_four_digits: impl Into<String>, provider: CardProvider) -> Self {
        self.last_four_digits = Some(last_four_digits.into());
        self.provider = Some(provider);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub institution_id: Option<InstitutionId>,
    pub linked_product_id: Option<ProductId>,
    pub closing_day: Option<u32>,
    pub due_day: Option<u32>,
    pub limits: Option<CreditLimits>,
    pub last_four_digits: Option<String>,
    pub provider: Option<CardProvider>,
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub default_amount: Option<Money>,
    pub default_due_day: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub category_id: Option<CategoryId>,
    pub default_amount: Option<Money>,
    pub default_due_day: Option<u32>,
    pub is_active: Option<bool>,
}

/// A bill created by hand instead of from the service defaults.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub service_id: ServiceId,
    pub year: i32,
    pub month: u32,
    pub due_date: Option<NaiveDate>,
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, Default)]
pub struct BillUpdate {
    pub amount: Option<Money>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct BillPayment {
    pub product_id: ProductId,
    /// Overrides the bill amount
    pub amount: Option<Money>,
    /// Defaults to now
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAdjustment {
    pub adjustment_type: AdjustmentType,
    pub description: String,
    /// Positive; the sign is derived from the type
    pub amount: Money,
}
