use thiserror::Error;
use tracing::error;

use crate::domain::{
    AdjustmentId, BillId, CategoryId, Currency, InstitutionId, LimitPool, MAX_INSTALLMENTS, Money,
    ProductId, ProductType, ServiceId, SummaryId, TransactionId,
};
use crate::storage::OwnershipViolation;

/// Broad classification of an [`AppError`], stable for callers mapping
/// errors onto their own surface (exit codes, HTTP statuses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    BusinessRule,
    Conflict,
    Integrity,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::BusinessRule => "business_rule",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Integrity => "integrity",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("Summary not found: {0}")]
    SummaryNotFound(SummaryId),

    #[error("Adjustment not found: {0}")]
    AdjustmentNotFound(AdjustmentId),

    #[error("Service not found: {0}")]
    ServiceNotFound(ServiceId),

    #[error("Bill not found: {0}")]
    BillNotFound(BillId),

    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),

    #[error("Institution not found: {0}")]
    InstitutionNotFound(InstitutionId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid period: {year}-{month:02}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("Invalid installment count {0}: must be between 1 and {max}", max = MAX_INSTALLMENTS)]
    InvalidInstallments(u32),

    #[error("Invalid day of month: {0}")]
    InvalidDay(u32),

    #[error("Date out of range: {0}")]
    InvalidDate(String),

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Credit card {0} has no closing and due day configured")]
    MissingBillingCycle(String),

    #[error("Insufficient funds in {product_name}: available {balance}, required {required}")]
    InsufficientFunds {
        product_name: String,
        balance: Money,
        required: Money,
    },

    #[error(
        "Insufficient credit on {product_name} ({pool} limit): available {available}, required {required}"
    )]
    InsufficientCredit {
        product_name: String,
        pool: LimitPool,
        available: Money,
        required: Money,
    },

    #[error("Already paid: {0}")]
    AlreadyPaid(String),

    #[error("Cannot pay from {product_name}: {product_type} products cannot fund payments")]
    ForbiddenFundingProduct {
        product_name: String,
        product_type: ProductType,
    },

    #[error("Currency mismatch between products: {from_currency} vs {to_currency}")]
    CurrencyMismatch {
        from_currency: Currency,
        to_currency: Currency,
    },

    #[error("Transaction {id} cannot be modified: {reason}")]
    TransactionLocked { id: TransactionId, reason: String },

    #[error("Invalid status transition for {entity}: {from} -> {to}")]
    InvalidStatusTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("System category cannot be modified: {0}")]
    SystemCategory(String),

    #[error("Category is in use: {0}")]
    CategoryInUse(String),

    #[error("Product {0} still funds debit cards")]
    ProductInUse(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflicting change: {0}")]
    Conflict(String),

    #[error("Internal storage failure")]
    Storage,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ProductNotFound(_)
            | AppError::TransactionNotFound(_)
            | AppError::SummaryNotFound(_)
            | AppError::AdjustmentNotFound(_)
            | AppError::ServiceNotFound(_)
            | AppError::BillNotFound(_)
            | AppError::CategoryNotFound(_)
            | AppError::InstitutionNotFound(_) => ErrorKind::NotFound,

            AppError::InvalidAmount(_)
            | AppError::InvalidPeriod { .. }
            | AppError::InvalidInstallments(_)
            | AppError::InvalidDay(_)
            | AppError::InvalidDate(_)
            | AppError::InvalidProduct(_)
            | AppError::InvalidInput(_)
            | AppError::Unsupported(_)
            | AppError::MissingBillingCycle(_) => ErrorKind::Validation,

            AppError::InsufficientFunds { .. }
            | AppError::InsufficientCredit { .. }
            | AppError::AlreadyPaid(_)
            | AppError::ForbiddenFundingProduct { .. }
            | AppError::CurrencyMismatch { .. }
            | AppError::TransactionLocked { .. }
            | AppError::InvalidStatusTransition { .. }
            | AppError::SystemCategory(_)
            | AppError::CategoryInUse(_)
            | AppError::ProductInUse(_) => ErrorKind::BusinessRule,

            AppError::AlreadyExists(_) | AppError::Conflict(_) => ErrorKind::Conflict,

            AppError::Storage => ErrorKind::Integrity,
        }
    }
}

/// Storage failures: uniqueness and ownership problems are reported as
/// conflicts, anything else is logged and surfaced as an opaque integrity
/// failure.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(violation) = cause.downcast_ref::<OwnershipViolation>() {
                return AppError::Conflict(violation.to_string());
            }
            if let Some(sqlx::Error::Database(db_err)) = cause.downcast_ref::<sqlx::Error>() {
                if db_err.is_unique_violation() {
                    return AppError::AlreadyExists(db_err.message().to_string());
                }
            }
        }
        error!(error = ?err, "storage failure");
        AppError::Storage
    }
}
