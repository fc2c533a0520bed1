// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use banquito::application::{LedgerService, NewInstitution, NewProduct};
use banquito::domain::{
    CreditLimits, Currency, FinancialProduct, InstitutionId, InstitutionType, Money, OwnerId,
    ProductType,
};
use chrono::{DateTime, NaiveDate, Utc};
use tempfile::TempDir;
use uuid::Uuid;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc> (midnight)
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Helper to parse a date string into DateTime<Utc> at noon
pub fn at_noon(date_str: &str) -> DateTime<Utc> {
    parse_date(date_str) + chrono::Duration::hours(12)
}

pub fn owner() -> OwnerId {
    Uuid::new_v4()
}

/// Test fixture: a bank with the usual products of one owner
pub struct Fixture {
    pub owner: OwnerId,
    pub bank: InstitutionId,
}

impl Fixture {
    pub async fn new(service: &LedgerService) -> Result<Self> {
        let owner = owner();
        let bank = service
            .create_institution(
                owner,
                NewInstitution {
                    name: "Banco Norte".into(),
                    institution_type: InstitutionType::Bank,
                    share_summary: false,
                },
            )
            .await?;
        Ok(Self {
            owner,
            bank: bank.id,
        })
    }

    pub async fn cash(&self, service: &LedgerService, balance: Money) -> Result<FinancialProduct> {
        Ok(service
            .create_product(
                self.owner,
                NewProduct::new("Wallet", ProductType::Cash, Currency::Usd).with_balance(balance),
            )
            .await?)
    }

    pub async fn savings(&self, service: &LedgerService, balance: Money) -> Result<FinancialProduct> {
        Ok(service
            .create_product(
                self.owner,
                NewProduct::new("Savings", ProductType::SavingsAccount, Currency::Usd)
                    .with_institution(self.bank)
                    .with_balance(balance),
            )
            .await?)
    }

    pub async fn debit_card(
        &self,
        service: &LedgerService,
        account: &FinancialProduct,
    ) -> Result<FinancialProduct> {
        Ok(service
            .create_product(
                self.owner,
                NewProduct::new("Debit", ProductType::DebitCard, Currency::Usd)
                    .with_institution(self.bank)
                    .with_linked_product(account.id),
            )
            .await?)
    }

    /// Credit card closing on the 25th, due on the 10th of the next month
    pub async fn credit_card(
        &self,
        service: &LedgerService,
        limits: CreditLimits,
    ) -> Result<FinancialProduct> {
        Ok(service
            .create_product(
                self.owner,
                NewProduct::new("Visa", ProductType::CreditCard, Currency::Usd)
                    .with_institution(self.bank)
                    .with_billing_cycle(25, 10)
                    .with_limits(limits),
            )
            .await?)
    }

    pub async fn balance(&self, service: &LedgerService, product: &FinancialProduct) -> Result<Money> {
        Ok(service.get_product(self.owner, product.id).await?.product.balance)
    }
}
