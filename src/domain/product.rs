use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Money, OwnerId};

pub type ProductId = Uuid;
pub type InstitutionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Cash,
    SavingsAccount,
    CheckingAccount,
    /// Spends from its linked savings/checking account
    DebitCard,
    /// Negative balance is outstanding debt
    CreditCard,
    Loan,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Cash => "cash",
            ProductType::SavingsAccount => "savings_account",
            ProductType::CheckingAccount => "checking_account",
            ProductType::DebitCard => "debit_card",
            ProductType::CreditCard => "credit_card",
            ProductType::Loan => "loan",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cash" => Some(ProductType::Cash),
            "savings_account" | "savings" => Some(ProductType::SavingsAccount),
            "checking_account" | "checking" => Some(ProductType::CheckingAccount),
            "debit_card" => Some(ProductType::DebitCard),
            "credit_card" => Some(ProductType::CreditCard),
            "loan" => Some(ProductType::Loan),
            _ => None,
        }
    }

    /// Credit lines cannot fund payments or receive income.
    pub fn is_credit_line(&self) -> bool {
        matches!(self, ProductType::CreditCard | ProductType::Loan)
    }

    /// Account types a debit card may draw from.
    pub fn can_back_debit_card(&self) -> bool {
        matches!(self, ProductType::SavingsAccount | ProductType::CheckingAccount)
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Ars,
    Usd,
    Usdt,
    Usdc,
    Btc,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Ars => "ARS",
            Currency::Usd => "USD",
            Currency::Usdt => "USDT",
            Currency::Usdc => "USDC",
            Currency::Btc => "BTC",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ARS" => Some(Currency::Ars),
            "USD" => Some(Currency::Usd),
            "USDT" => Some(Currency::Usdt),
            "USDC" => Some(Currency::Usdc),
            "BTC" => Some(Currency::Btc),
            _ => None,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstitutionType {
    Bank,
    Wallet,
}

impl InstitutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstitutionType::Bank => "bank",
            InstitutionType::Wallet => "wallet",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bank" => Some(InstitutionType::Bank),
            "wallet" => Some(InstitutionType::Wallet),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstitutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardProvider {
    Visa,
    Mastercard,
    Amex,
    Other,
}

impl CardProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardProvider::Visa => "visa",
            CardProvider::Mastercard => "mastercard",
            CardProvider::Amex => "amex",
            CardProvider::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "visa" => Some(CardProvider::Visa),
            "mastercard" => Some(CardProvider::Mastercard),
            "amex" => Some(CardProvider::Amex),
            "other" => Some(CardProvider::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for CardProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bank or wallet provider grouping products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    pub id: InstitutionId,
    pub owner_id: OwnerId,
    pub name: String,
    pub institution_type: InstitutionType,
    /// Cards of this institution share a single monthly statement
    pub share_summary: bool,
    pub created_at: DateTime<Utc>,
}

impl Institution {
    pub fn new(owner_id: OwnerId, name: String, institution_type: InstitutionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            institution_type,
            share_summary: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_share_summary(mut self, share: bool) -> Self {
        self.share_summary = share;
        self
    }
}

/// Which tracked limit a credit purchase draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPool {
    Unified,
    SinglePayment,
    Installments,
}

impl LimitPool {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitPool::Unified => "unified",
            LimitPool::SinglePayment => "single_payment",
            LimitPool::Installments => "installments",
        }
    }
}

impl std::fmt::Display for LimitPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Credit limits tracked on a credit card.
///
/// In unified mode every purchase draws from `limit_amount`; in split mode
/// single-payment and installment purchases draw from their own sub-limit,
/// each falling back to `limit_amount` when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditLimits {
    pub limit_single_payment: Option<Money>,
    pub limit_installments: Option<Money>,
    pub limit_amount: Option<Money>,
    pub unified: bool,
}

impl CreditLimits {
    pub fn unified(limit_amount: Money) -> Self {
        Self {
            limit_amount: Some(limit_amount),
            unified: true,
            ..Self::default()
        }
    }

    pub fn split(single_payment: Money, installments: Money) -> Self {
        Self {
            limit_single_payment: Some(single_payment),
            limit_installments: Some(installments),
            limit_amount: None,
            unified: false,
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.limit_single_payment.is_some()
            || self.limit_installments.is_some()
            || self.limit_amount.is_some()
    }

    pub fn pool_for(&self, installment_purchase: bool) -> LimitPool {
        if self.unified {
            LimitPool::Unified
        } else if installment_purchase {
            LimitPool::Installments
        } else {
            LimitPool::SinglePayment
        }
    }

    fn pool_limit(&self, pool: LimitPool) -> Money {
        let fallback = self.limit_amount.unwrap_or_default();
        match pool {
            LimitPool::Unified => fallback,
            LimitPool::SinglePayment => self.limit_single_payment.unwrap_or(fallback),
            LimitPool::Installments => self.limit_installments.unwrap_or(fallback),
        }
    }
}

/// An account, card or cash pool owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialProduct {
    pub id: ProductId,
    pub owner_id: OwnerId,
    pub institution_id: Option<InstitutionId>,
    pub name: String,
    pub product_type: ProductType,
    pub currency: Currency,
    pub balance: Money,
    /// Funding account of a debit card
    pub linked_product_id: Option<ProductId>,
    pub closing_day: Option<u32>,
    pub due_day: Option<u32>,
    pub limits: CreditLimits,
    pub last_four_digits: Option<String>,
    pub provider: Option<CardProvider>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FinancialProduct {
    pub fn new(
        owner_id: OwnerId,
        name: String,
        product_type: ProductType,
        currency: Currency,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            institution_id: None,
            name,
            product_type,
            currency,
            balance: Money::ZERO,
            linked_product_id: None,
            closing_day: None,
            due_day: None,
            limits: CreditLimits::default(),
            last_four_digits: None,
            provider: None,
            created_at: now,
            updated_at: now,
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

    pub fn with_card(mut self, last_four_digits: Option<String>, provider: Option<CardProvider>) -> Self {
        self.last_four_digits = last_four_digits;
        self.provider = provider;
        self
    }

    pub fn is_credit_card(&self) -> bool {
        self.product_type == ProductType::CreditCard
    }

    pub fn is_debit_card(&self) -> bool {
        self.product_type == ProductType::DebitCard
    }

    /// Closing and due day, when both are defined.
    pub fn billing_days(&self) -> Option<(u32, u32)> {
        self.closing_day.zip(self.due_day)
    }

    /// Credit still available in `pool`.
    ///
    /// Unified: `limit_amount + balance`. Split: the pool's limit minus the
    /// outstanding (negative) balance.
    pub fn available_credit(&self, pool: LimitPool) -> Money {
        let limit = self.limits.pool_limit(pool);
        match pool {
            LimitPool::Unified => limit + self.balance,
            _ => limit - self.debt(),
        }
    }

    /// Outstanding debt as a non-negative amount.
    pub fn debt(&self) -> Money {
        if self.balance.is_sign_negative() {
            -self.balance
        } else {
            Money::ZERO
        }
    }

    /// Move the balance by `delta` and mirror it into the tracked limit
    /// field(s) of `pool`. `limit_amount` itself is never mutated.
    pub fn apply_delta(&mut self, delta: Money, pool: Option<LimitPool>) {
        self.balance += delta;
        match pool {
            Some(LimitPool::Unified) => {
                if let Some(limit) = self.limits.limit_single_payment.as_mut() {
                    *limit += delta;
                }
                if let Some(limit) = self.limits.limit_installments.as_mut() {
                    *limit += delta;
                }
            }
            Some(LimitPool::SinglePayment) => {
                if let Some(limit) = self.limits.limit_single_payment.as_mut() {
                    *limit += delta;
                }
            }
            Some(LimitPool::Installments) => {
                if let Some(limit) = self.limits.limit_installments.as_mut() {
                    *limit += delta;
                }
            }
            None => {}
        }
    }

    /// Move `amount` of consumed credit from one pool to another. The
    /// balance stays where it is.
    pub fn move_limit_usage(&mut self, amount: Money, from: LimitPool, to: LimitPool) {
        if from == to {
            return;
        }
        self.apply_delta(amount, Some(from));
        self.apply_delta(-amount, Some(to));
    }
}

/// Day of month accepted for billing cycles and bills.
pub fn is_valid_month_day(day: u32) -> bool {
    (1..=31).contains(&day)
}

/// Card digits must be exactly four ASCII digits.
pub fn is_valid_last_four(digits: &str) -> bool {
    digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit())
}
