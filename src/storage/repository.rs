use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteQueryResult};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{Money, OwnerId};

use super::{MIGRATION_001_INITIAL, OwnershipViolation};

/// Repository owning the connection pool. All reads and writes go through a
/// [`LedgerTx`] obtained from [`Repository::begin`].
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Open a unit of work scoped to `owner`.
    pub async fn begin(&self, owner: OwnerId) -> Result<LedgerTx> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(LedgerTx { tx, owner })
    }
}

/// One atomic unit of work for a single owner.
///
/// Every query issued through it filters on the owner. Dropping it without
/// calling [`LedgerTx::commit`] rolls everything back.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
    owner: OwnerId,
}

impl LedgerTx {
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub(super) fn owner_key(&self) -> String {
        self.owner.to_string()
    }

    pub(super) fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }
}

// ========================
// Column codecs
// ========================

/// Fixed-width UTC timestamp so that text comparison matches time order.
pub(super) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(super) fn parse_ts(value: &str, field: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {} timestamp", field))?
        .with_timezone(&Utc))
}

pub(super) fn parse_opt_ts(value: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|s| parse_ts(&s, field)).transpose()
}

pub(super) fn date_str(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(super) fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("Invalid {} date", field))
}

pub(super) fn parse_amount(value: &str, field: &str) -> Result<Money> {
    Money::from_str(value).with_context(|| format!("Invalid {} amount", field))
}

pub(super) fn parse_opt_amount(value: Option<String>, field: &str) -> Result<Option<Money>> {
    value.map(|s| parse_amount(&s, field)).transpose()
}

pub(super) fn parse_id(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {} ID", field))
}

pub(super) fn parse_opt_id(value: Option<String>, field: &str) -> Result<Option<Uuid>> {
    value.map(|s| parse_id(&s, field)).transpose()
}

pub(super) fn day_from_db(value: Option<i64>) -> Option<u32> {
    value.and_then(|d| u32::try_from(d).ok())
}

/// Fail the unit of work unless exactly one owned row was touched.
pub(super) fn ensure_one(result: SqliteQueryResult, entity: &'static str, id: Uuid) -> Result<()> {
    if result.rows_affected() != 1 {
        return Err(OwnershipViolation { entity, id }.into());
    }
    Ok(())
}
