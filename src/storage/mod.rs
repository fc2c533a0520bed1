mod bills;
mod catalog;
mod products;
mod repository;
mod summaries;
mod transactions;

pub use bills::BillFilter;
pub use repository::*;
pub use transactions::TransactionFilter;

use thiserror::Error;
use uuid::Uuid;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// An update or delete matched no row owned by the unit's owner.
#[derive(Error, Debug)]
#[error("{entity} {id} does not belong to the current owner")]
pub struct OwnershipViolation {
    pub entity: &'static str,
    pub id: Uuid,
}
