// Application layer - use cases and orchestration
//
// Engines are plain async functions over a `LedgerTx` so that several of
// them can share one unit of work; `LedgerService` wraps each of them in
// its own transaction for clients.

pub mod bills;
pub mod catalog;
mod checks;
mod error;
pub mod projections;
mod requests;
mod service;
pub mod summaries;
pub mod transactions;

pub use bills::BillReceipt;
pub use catalog::ProductInfo;
pub use error::*;
pub use requests::*;
pub use service::LedgerService;
pub use summaries::{PaymentReceipt, PlanZRestructure, SummaryDetail};

pub use crate::storage::{BillFilter, TransactionFilter};
