//! Lookups and guards shared by the engines.

use crate::domain::{
    CategoryId, FinancialProduct, LimitPool, Money, ProductId, Transaction, TransactionId,
    has_money_scale,
};
use crate::storage::LedgerTx;

use super::AppError;

pub(crate) async fn load_product(
    tx: &mut LedgerTx,
    id: ProductId,
) -> Result<FinancialProduct, AppError> {
    tx.get_product(id).await?.ok_or(AppError::ProductNotFound(id))
}

pub(crate) async fn load_transaction(
    tx: &mut LedgerTx,
    id: TransactionId,
) -> Result<Transaction, AppError> {
    tx.get_transaction(id)
        .await?
        .ok_or(AppError::TransactionNotFound(id))
}

pub(crate) async fn ensure_category(tx: &mut LedgerTx, id: CategoryId) -> Result<(), AppError> {
    tx.get_category(id)
        .await?
        .map(|_| ())
        .ok_or(AppError::CategoryNotFound(id))
}

/// The product whose balance a movement on `product` changes: debit cards
/// resolve to their linked account, everything else to itself.
pub(crate) async fn balance_holder(
    tx: &mut LedgerTx,
    product: FinancialProduct,
) -> Result<FinancialProduct, AppError> {
    if !product.is_debit_card() {
        return Ok(product);
    }
    let linked = product.linked_product_id.ok_or_else(|| {
        AppError::InvalidProduct(format!("debit card {} has no linked account", product.name))
    })?;
    load_product(tx, linked).await
}

/// Strictly positive with at most two decimals.
pub(crate) fn validate_amount(amount: Money) -> Result<(), AppError> {
    if amount <= Money::ZERO {
        return Err(AppError::InvalidAmount(format!(
            "{} must be greater than zero",
            amount
        )));
    }
    validate_scale(amount)
}

pub(crate) fn validate_scale(amount: Money) -> Result<(), AppError> {
    if !has_money_scale(amount) {
        return Err(AppError::InvalidAmount(format!(
            "{} has more than two decimal places",
            amount
        )));
    }
    Ok(())
}

pub(crate) fn ensure_funds(holder: &FinancialProduct, required: Money) -> Result<(), AppError> {
    if holder.balance < required {
        return Err(AppError::InsufficientFunds {
            product_name: holder.name.clone(),
            balance: holder.balance,
            required,
        });
    }
    Ok(())
}

/// Check a credit purchase against `pool`. Cards without any tracked limit
/// accept every purchase.
pub(crate) fn ensure_credit(
    card: &FinancialProduct,
    pool: LimitPool,
    required: Money,
) -> Result<(), AppError> {
    if !card.limits.is_tracked() {
        return Ok(());
    }
    let available = card.available_credit(pool);
    if available < required {
        return Err(AppError::InsufficientCredit {
            product_name: card.name.clone(),
            pool,
            available,
            required,
        });
    }
    Ok(())
}

/// Statement and bill payments cannot be funded from credit lines.
pub(crate) fn ensure_funding_product(product: &FinancialProduct) -> Result<(), AppError> {
    if product.product_type.is_credit_line() {
        return Err(AppError::ForbiddenFundingProduct {
            product_name: product.name.clone(),
            product_type: product.product_type,
        });
    }
    Ok(())
}

pub(crate) fn ensure_same_currency(
    from: &FinancialProduct,
    to: &FinancialProduct,
) -> Result<(), AppError> {
    if from.currency != to.currency {
        return Err(AppError::CurrencyMismatch {
            from_currency: from.currency,
            to_currency: to.currency,
        });
    }
    Ok(())
}

pub(crate) fn ensure_period(year: i32, month: u32) -> Result<(), AppError> {
    if !(1..=12).contains(&month) {
        return Err(AppError::InvalidPeriod { year, month });
    }
    Ok(())
}

pub(crate) fn ensure_name(name: &str, what: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{} name cannot be empty", what)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CreditLimits, Currency, ProductType};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn product(product_type: ProductType, balance: Money) -> FinancialProduct {
        FinancialProduct::new(Uuid::new_v4(), "Test".into(), product_type, Currency::Usd)
            .with_balance(balance)
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(dec!(0.01)).is_ok());
        assert!(matches!(validate_amount(dec!(0)), Err(AppError::InvalidAmount(_))));
        assert!(matches!(validate_amount(dec!(-5)), Err(AppError::InvalidAmount(_))));
        assert!(matches!(validate_amount(dec!(1.005)), Err(AppError::InvalidAmount(_))));
    }

    #[test]
    fn test_ensure_funds_reports_shortfall() {
        let cash = product(ProductType::Cash, dec!(40));
        match ensure_funds(&cash, dec!(50)) {
            Err(AppError::InsufficientFunds { balance, required, .. }) => {
                assert_eq!(balance, dec!(40));
                assert_eq!(required, dec!(50));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(ensure_funds(&cash, dec!(40)).is_ok());
    }

    #[test]
    fn test_ensure_credit_without_limits_accepts_everything() {
        let card = product(ProductType::CreditCard, dec!(-10000));
        assert!(ensure_credit(&card, LimitPool::Unified, dec!(1000000)).is_ok());
    }

    #[test]
    fn test_ensure_credit_unified() {
        let card = product(ProductType::CreditCard, dec!(-400))
            .with_limits(CreditLimits::unified(dec!(1000)));
        assert!(ensure_credit(&card, LimitPool::Unified, dec!(600)).is_ok());
        assert!(matches!(
            ensure_credit(&card, LimitPool::Unified, dec!(700)),
            Err(AppError::InsufficientCredit { .. })
        ));
    }

    #[test]
    fn test_credit_lines_cannot_fund() {
        assert!(ensure_funding_product(&product(ProductType::Loan, dec!(0))).is_err());
        assert!(ensure_funding_product(&product(ProductType::CreditCard, dec!(0))).is_err());
        assert!(ensure_funding_product(&product(ProductType::DebitCard, dec!(0))).is_ok());
    }
}
