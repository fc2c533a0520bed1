use crate::domain::OwnerId;
use crate::storage::{LedgerTx, Repository};

use super::AppError;

/// Entry point for clients of the ledger engines.
///
/// Every operation takes the owner explicitly and runs as one unit of work:
/// either all of its writes are committed or none are.
pub struct LedgerService {
    repo: Repository,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Open a unit of work for `owner`. Engine functions in
    /// [`transactions`](super::transactions), [`summaries`](super::summaries),
    /// [`bills`](super::bills) and [`catalog`](super::catalog) run against it.
    pub async fn begin(&self, owner: OwnerId) -> Result<LedgerTx, AppError> {
        Ok(self.repo.begin(owner).await?)
    }
}
