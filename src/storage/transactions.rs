use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::domain::{
    CategoryId, Installment, InstallmentGroupId, ProductId, Transaction, TransactionId,
    TransactionType,
};

use super::repository::{
    LedgerTx, ensure_one, parse_amount, parse_id, parse_opt_id, parse_ts, ts,
};

const TRANSACTION_COLUMNS: &str = "id, owner_id, transaction_type, amount, date, description, \
    category_id, from_product_id, to_product_id, installment_group_id, installment_number, \
    installment_total, plan_z, statement_id, created_at, updated_at";

/// Filter for listing transactions
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Matches either side of the movement
    pub product_id: Option<ProductId>,
    pub category_id: Option<CategoryId>,
    pub transaction_type: Option<TransactionType>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl LedgerTx {
    // ========================
    // Transaction operations
    // ========================

    pub async fn insert_transaction(&mut self, tx: &Transaction) -> Result<()> {
        let owner = self.owner_key();
        sqlx::query(&format!(
            "INSERT INTO transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TRANSACTION_COLUMNS
        ))
        .bind(tx.id.to_string())
        .bind(owner)
        .bind(tx.transaction_type.as_str())
        .bind(tx.amount.to_string())
        .bind(ts(&tx.date))
        .bind(&tx.description)
        .bind(tx.category_id.map(|id| id.to_string()))
        .bind(tx.from_product_id.map(|id| id.to_string()))
        .bind(tx.to_product_id.map(|id| id.to_string()))
        .bind(tx.installment.map(|i| i.group_id.to_string()))
        .bind(tx.installment.map(|i| i64::from(i.number)))
        .bind(tx.installment.map(|i| i64::from(i.total)))
        .bind(tx.plan_z)
        .bind(tx.statement_id.map(|id| id.to_string()))
        .bind(ts(&tx.created_at))
        .bind(ts(&tx.updated_at))
        .execute(self.conn())
        .await
        .context("Failed to save transaction")?;
        Ok(())
    }

    pub async fn get_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>> {
        let owner = self.owner_key();
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE id = ? AND owner_id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    /// List transactions newest first.
    pub async fn list_transactions(&mut self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let owner = self.owner_key();
        let product = filter.product_id.map(|id| id.to_string());
        let category = filter.category_id.map(|id| id.to_string());
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE owner_id = ?1
              AND (?2 IS NULL OR from_product_id = ?2 OR to_product_id = ?2)
              AND (?3 IS NULL OR category_id = ?3)
              AND (?4 IS NULL OR transaction_type = ?4)
            ORDER BY date DESC, created_at DESC
            LIMIT ?5 OFFSET ?6
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(owner)
        .bind(product)
        .bind(category)
        .bind(filter.transaction_type.map(|t| t.as_str()))
        .bind(filter.limit.map(i64::from).unwrap_or(-1))
        .bind(filter.offset.map(i64::from).unwrap_or(0))
        .fetch_all(self.conn())
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// Rows of an installment group ordered by installment number.
    pub async fn list_installment_group(
        &mut self,
        group_id: InstallmentGroupId,
    ) -> Result<Vec<Transaction>> {
        let owner = self.owner_key();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE owner_id = ? AND installment_group_id = ? ORDER BY installment_number",
            TRANSACTION_COLUMNS
        ))
        .bind(owner)
        .bind(group_id.to_string())
        .fetch_all(self.conn())
        .await
        .context("Failed to list installment group")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// Expenses charged to `product_id` dated in `(after, until]`.
    pub async fn expenses_between(
        &mut self,
        product_id: ProductId,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let owner = self.owner_key();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE owner_id = ? AND from_product_id = ? AND transaction_type = 'expense'
              AND date > ? AND date <= ?
            ORDER BY date
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(owner)
        .bind(product_id.to_string())
        .bind(ts(&after))
        .bind(ts(&until))
        .fetch_all(self.conn())
        .await
        .context("Failed to fetch expenses in range")?;

        rows.iter().map(row_to_transaction).collect()
    }

    pub async fn update_transaction(&mut self, tx: &Transaction) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET amount = ?, date = ?, description = ?, category_id = ?, plan_z = ?, updated_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(tx.amount.to_string())
        .bind(ts(&tx.date))
        .bind(&tx.description)
        .bind(tx.category_id.map(|id| id.to_string()))
        .bind(tx.plan_z)
        .bind(ts(&Utc::now()))
        .bind(tx.id.to_string())
        .bind(owner)
        .execute(self.conn())
        .await
        .context("Failed to update transaction")?;

        ensure_one(result, "transaction", tx.id)
    }

    /// Set the category of every row in an installment group.
    pub async fn set_group_category(
        &mut self,
        group_id: InstallmentGroupId,
        category_id: Option<CategoryId>,
    ) -> Result<u64> {
        let owner = self.owner_key();
        let result = sqlx::query(
            "UPDATE transactions SET category_id = ?, updated_at = ? WHERE owner_id = ? AND installment_group_id = ?",
        )
        .bind(category_id.map(|id| id.to_string()))
        .bind(ts(&Utc::now()))
        .bind(owner)
        .bind(group_id.to_string())
        .execute(self.conn())
        .await
        .context("Failed to propagate category")?;
        Ok(result.rows_affected())
    }

    pub async fn delete_transaction(&mut self, id: TransactionId) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query("DELETE FROM transactions WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner)
            .execute(self.conn())
            .await
            .context("Failed to delete transaction")?;

        ensure_one(result, "transaction", id)
    }

    /// Transactions and services referencing a category.
    pub async fn count_category_usage(&mut self, category_id: CategoryId) -> Result<i64> {
        let owner = self.owner_key();
        let row = sqlx::query(
            r#"
            SELECT (SELECT COUNT(*) FROM transactions WHERE owner_id = ?1 AND category_id = ?2)
                 + (SELECT COUNT(*) FROM services WHERE owner_id = ?1 AND category_id = ?2) AS count
            "#,
        )
        .bind(owner)
        .bind(category_id.to_string())
        .fetch_one(self.conn())
        .await
        .context("Failed to count category usage")?;
        Ok(row.get("count"))
    }
}

fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
    let type_str: String = row.get("transaction_type");
    let group_id = parse_opt_id(row.get("installment_group_id"), "installment group")?;
    let number: Option<i64> = row.get("installment_number");
    let total: Option<i64> = row.get("installment_total");

    let installment = match (group_id, number, total) {
        (Some(group_id), Some(number), Some(total)) => Some(Installment {
            group_id,
            number: u32::try_from(number).context("Invalid installment number")?,
            total: u32::try_from(total).context("Invalid installment total")?,
        }),
        _ => None,
    };

    Ok(Transaction {
        id: parse_id(&row.get::<String, _>("id"), "transaction")?,
        owner_id: parse_id(&row.get::<String, _>("owner_id"), "owner")?,
        transaction_type: TransactionType::from_str(&type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
        amount: parse_amount(&row.get::<String, _>("amount"), "transaction")?,
        date: parse_ts(&row.get::<String, _>("date"), "date")?,
        description: row.get("description"),
        category_id: parse_opt_id(row.get("category_id"), "category")?,
        from_product_id: parse_opt_id(row.get("from_product_id"), "product")?,
        to_product_id: parse_opt_id(row.get("to_product_id"), "product")?,
        installment,
        plan_z: row.get::<i64, _>("plan_z") != 0,
        statement_id: parse_opt_id(row.get("statement_id"), "statement")?,
        created_at: parse_ts(&row.get::<String, _>("created_at"), "created_at")?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"), "updated_at")?,
    })
}
