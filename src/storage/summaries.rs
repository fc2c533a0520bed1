use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::domain::{
    AdjustmentId, AdjustmentType, CreditCardSummary, Money, ProductId, SummaryAdjustment,
    SummaryId, SummaryItem, SummaryItemId, SummaryStatus, TransactionId,
};

use super::repository::{
    LedgerTx, date_str, ensure_one, parse_amount, parse_date, parse_id, parse_opt_id,
    parse_opt_ts, parse_ts, ts,
};

const SUMMARY_COLUMNS: &str = "id, owner_id, product_id, institution_id, year, month, closing_date, \
    due_date, calculated_amount, adjustments_amount, total_amount, status, paid_date, \
    paid_from_product_id, payment_transaction_id, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, summary_id, transaction_id, amount, is_reconciled, has_discrepancy, notes, created_at";

const ADJUSTMENT_COLUMNS: &str =
    "id, summary_id, adjustment_type, description, amount, created_at";

impl LedgerTx {
    // ========================
    // Summary operations
    // ========================

    /// Insert a statement unless one already exists for its period, then
    /// return the stored row. Concurrent creators converge on the same row.
    pub async fn insert_summary_if_absent(
        &mut self,
        summary: &CreditCardSummary,
    ) -> Result<CreditCardSummary> {
        let owner = self.owner_key();
        sqlx::query(&format!(
            "INSERT INTO credit_card_summaries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (product_id, year, month) DO NOTHING",
            SUMMARY_COLUMNS
        ))
        .bind(summary.id.to_string())
        .bind(owner)
        .bind(summary.product_id.to_string())
        .bind(summary.institution_id.map(|id| id.to_string()))
        .bind(summary.year)
        .bind(i64::from(summary.month))
        .bind(ts(&summary.closing_date))
        .bind(date_str(&summary.due_date))
        .bind(summary.calculated_amount.to_string())
        .bind(summary.adjustments_amount.to_string())
        .bind(summary.total_amount.to_string())
        .bind(summary.status.as_str())
        .bind(summary.paid_date.map(|d| ts(&d)))
        .bind(summary.paid_from_product_id.map(|id| id.to_string()))
        .bind(summary.payment_transaction_id.map(|id| id.to_string()))
        .bind(ts(&summary.created_at))
        .bind(ts(&summary.updated_at))
        .execute(self.conn())
        .await
        .context("Failed to save summary")?;

        self.get_summary_for_period(summary.product_id, summary.year, summary.month)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Summary {} vanished after insert", summary.id))
    }

    pub async fn get_summary(&mut self, id: SummaryId) -> Result<Option<CreditCardSummary>> {
        let owner = self.owner_key();
        let row = sqlx::query(&format!(
            "SELECT {} FROM credit_card_summaries WHERE id = ? AND owner_id = ?",
            SUMMARY_COLUMNS
        ))
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch summary")?;

        row.as_ref().map(row_to_summary).transpose()
    }

    pub async fn get_summary_for_period(
        &mut self,
        product_id: ProductId,
        year: i32,
        month: u32,
    ) -> Result<Option<CreditCardSummary>> {
        let owner = self.owner_key();
        let row = sqlx::query(&format!(
            "SELECT {} FROM credit_card_summaries WHERE owner_id = ? AND product_id = ? AND year = ? AND month = ?",
            SUMMARY_COLUMNS
        ))
        .bind(owner)
        .bind(product_id.to_string())
        .bind(year)
        .bind(i64::from(month))
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch summary for period")?;

        row.as_ref().map(row_to_summary).transpose()
    }

    /// Statements of a card, newest period first.
    pub async fn list_summaries(
        &mut self,
        product_id: ProductId,
        status: Option<SummaryStatus>,
    ) -> Result<Vec<CreditCardSummary>> {
        let owner = self.owner_key();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM credit_card_summaries \
             WHERE owner_id = ?1 AND product_id = ?2 AND (?3 IS NULL OR status = ?3) \
             ORDER BY year DESC, month DESC",
            SUMMARY_COLUMNS
        ))
        .bind(owner)
        .bind(product_id.to_string())
        .bind(status.map(|s| s.as_str()))
        .fetch_all(self.conn())
        .await
        .context("Failed to list summaries")?;

        rows.iter().map(row_to_summary).collect()
    }

    pub async fn update_summary(&mut self, summary: &CreditCardSummary) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query(
            r#"
            UPDATE credit_card_summaries
            SET calculated_amount = ?, adjustments_amount = ?, total_amount = ?, status = ?,
                paid_date = ?, paid_from_product_id = ?, payment_transaction_id = ?, updated_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(summary.calculated_amount.to_string())
        .bind(summary.adjustments_amount.to_string())
        .bind(summary.total_amount.to_string())
        .bind(summary.status.as_str())
        .bind(summary.paid_date.map(|d| ts(&d)))
        .bind(summary.paid_from_product_id.map(|id| id.to_string()))
        .bind(summary.payment_transaction_id.map(|id| id.to_string()))
        .bind(ts(&Utc::now()))
        .bind(summary.id.to_string())
        .bind(owner)
        .execute(self.conn())
        .await
        .context("Failed to update summary")?;

        ensure_one(result, "summary", summary.id)
    }

    /// A closed or paid statement that lists `transaction_id` among its items.
    pub async fn frozen_summary_for(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<Option<(SummaryId, SummaryStatus)>> {
        let owner = self.owner_key();
        let row = sqlx::query(
            r#"
            SELECT s.id AS id, s.status AS status
            FROM summary_items i
            JOIN credit_card_summaries s ON s.id = i.summary_id
            WHERE i.owner_id = ? AND i.transaction_id = ? AND s.status != 'draft'
            LIMIT 1
            "#,
        )
        .bind(owner)
        .bind(transaction_id.to_string())
        .fetch_optional(self.conn())
        .await
        .context("Failed to look up frozen summary")?;

        match row {
            Some(row) => {
                let status_str: String = row.get("status");
                let status = SummaryStatus::from_str(&status_str)
                    .ok_or_else(|| anyhow::anyhow!("Invalid summary status: {}", status_str))?;
                Ok(Some((parse_id(&row.get::<String, _>("id"), "summary")?, status)))
            }
            None => Ok(None),
        }
    }

    // ========================
    // Summary item operations
    // ========================

    pub async fn list_summary_items(&mut self, summary_id: SummaryId) -> Result<Vec<SummaryItem>> {
        let owner = self.owner_key();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM summary_items WHERE owner_id = ? AND summary_id = ? ORDER BY created_at",
            ITEM_COLUMNS
        ))
        .bind(owner)
        .bind(summary_id.to_string())
        .fetch_all(self.conn())
        .await
        .context("Failed to list summary items")?;

        rows.iter().map(row_to_item).collect()
    }

    pub async fn insert_summary_item(&mut self, item: &SummaryItem) -> Result<()> {
        let owner = self.owner_key();
        sqlx::query(
            r#"
            INSERT INTO summary_items (id, owner_id, summary_id, transaction_id, amount, is_reconciled, has_discrepancy, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(owner)
        .bind(item.summary_id.to_string())
        .bind(item.transaction_id.to_string())
        .bind(item.amount.to_string())
        .bind(item.is_reconciled)
        .bind(item.has_discrepancy)
        .bind(&item.notes)
        .bind(ts(&item.created_at))
        .execute(self.conn())
        .await
        .context("Failed to save summary item")?;
        Ok(())
    }

    pub async fn update_summary_item_amount(
        &mut self,
        item_id: SummaryItemId,
        amount: Money,
    ) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query("UPDATE summary_items SET amount = ? WHERE id = ? AND owner_id = ?")
            .bind(amount.to_string())
            .bind(item_id.to_string())
            .bind(owner)
            .execute(self.conn())
            .await
            .context("Failed to update summary item")?;

        ensure_one(result, "summary item", item_id)
    }

    pub async fn delete_summary_item(&mut self, item_id: SummaryItemId) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query("DELETE FROM summary_items WHERE id = ? AND owner_id = ?")
            .bind(item_id.to_string())
            .bind(owner)
            .execute(self.conn())
            .await
            .context("Failed to delete summary item")?;

        ensure_one(result, "summary item", item_id)
    }

    pub async fn delete_summary_items(&mut self, summary_id: SummaryId) -> Result<u64> {
        let owner = self.owner_key();
        let result = sqlx::query("DELETE FROM summary_items WHERE owner_id = ? AND summary_id = ?")
            .bind(owner)
            .bind(summary_id.to_string())
            .execute(self.conn())
            .await
            .context("Failed to delete summary items")?;
        Ok(result.rows_affected())
    }

    /// Drop every statement attribution of a transaction.
    pub async fn delete_items_for_transaction(&mut self, transaction_id: TransactionId) -> Result<u64> {
        let owner = self.owner_key();
        let result =
            sqlx::query("DELETE FROM summary_items WHERE owner_id = ? AND transaction_id = ?")
                .bind(owner)
                .bind(transaction_id.to_string())
                .execute(self.conn())
                .await
                .context("Failed to delete transaction items")?;
        Ok(result.rows_affected())
    }

    // ========================
    // Adjustment operations
    // ========================

    pub async fn list_adjustments(&mut self, summary_id: SummaryId) -> Result<Vec<SummaryAdjustment>> {
        let owner = self.owner_key();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM summary_adjustments WHERE owner_id = ? AND summary_id = ? ORDER BY created_at",
            ADJUSTMENT_COLUMNS
        ))
        .bind(owner)
        .bind(summary_id.to_string())
        .fetch_all(self.conn())
        .await
        .context("Failed to list adjustments")?;

        rows.iter().map(row_to_adjustment).collect()
    }

    pub async fn get_adjustment(&mut self, id: AdjustmentId) -> Result<Option<SummaryAdjustment>> {
        let owner = self.owner_key();
        let row = sqlx::query(&format!(
            "SELECT {} FROM summary_adjustments WHERE id = ? AND owner_id = ?",
            ADJUSTMENT_COLUMNS
        ))
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch adjustment")?;

        row.as_ref().map(row_to_adjustment).transpose()
    }

    pub async fn insert_adjustment(&mut self, adjustment: &SummaryAdjustment) -> Result<()> {
        let owner = self.owner_key();
        sqlx::query(
            r#"
            INSERT INTO summary_adjustments (id, owner_id, summary_id, adjustment_type, description, amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(adjustment.id.to_string())
        .bind(owner)
        .bind(adjustment.summary_id.to_string())
        .bind(adjustment.adjustment_type.as_str())
        .bind(&adjustment.description)
        .bind(adjustment.amount.to_string())
        .bind(ts(&adjustment.created_at))
        .execute(self.conn())
        .await
        .context("Failed to save adjustment")?;
        Ok(())
    }

    pub async fn delete_adjustment(&mut self, id: AdjustmentId) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query("DELETE FROM summary_adjustments WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner)
            .execute(self.conn())
            .await
            .context("Failed to delete adjustment")?;

        ensure_one(result, "adjustment", id)
    }

    pub async fn delete_adjustments(&mut self, summary_id: SummaryId) -> Result<u64> {
        let owner = self.owner_key();
        let result =
            sqlx::query("DELETE FROM summary_adjustments WHERE owner_id = ? AND summary_id = ?")
                .bind(owner)
                .bind(summary_id.to_string())
                .execute(self.conn())
                .await
                .context("Failed to delete adjustments")?;
        Ok(result.rows_affected())
    }
}

fn row_to_summary(row: &SqliteRow) -> Result<CreditCardSummary> {
    let status_str: String = row.get("status");
    let month: i64 = row.get("month");

    Ok(CreditCardSummary {
        id: parse_id(&row.get::<String, _>("id"), "summary")?,
        owner_id: parse_id(&row.get::<String, _>("owner_id"), "owner")?,
        product_id: parse_id(&row.get::<String, _>("product_id"), "product")?,
        institution_id: parse_opt_id(row.get("institution_id"), "institution")?,
        year: row.get("year"),
        month: u32::try_from(month).context("Invalid summary month")?,
        closing_date: parse_ts(&row.get::<String, _>("closing_date"), "closing_date")?,
        due_date: parse_date(&row.get::<String, _>("due_date"), "due_date")?,
        calculated_amount: parse_amount(&row.get::<String, _>("calculated_amount"), "calculated")?,
        adjustments_amount: parse_amount(&row.get::<String, _>("adjustments_amount"), "adjustments")?,
        total_amount: parse_amount(&row.get::<String, _>("total_amount"), "total")?,
        status: SummaryStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid summary status: {}", status_str))?,
        paid_date: parse_opt_ts(row.get("paid_date"), "paid_date")?,
        paid_from_product_id: parse_opt_id(row.get("paid_from_product_id"), "product")?,
        payment_transaction_id: parse_opt_id(row.get("payment_transaction_id"), "transaction")?,
        created_at: parse_ts(&row.get::<String, _>("created_at"), "created_at")?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"), "updated_at")?,
    })
}

fn row_to_item(row: &SqliteRow) -> Result<SummaryItem> {
    Ok(SummaryItem {
        id: parse_id(&row.get::<String, _>("id"), "summary item")?,
        summary_id: parse_id(&row.get::<String, _>("summary_id"), "summary")?,
        transaction_id: parse_id(&row.get::<String, _>("transaction_id"), "transaction")?,
        amount: parse_amount(&row.get::<String, _>("amount"), "item")?,
        is_reconciled: row.get::<i64, _>("is_reconciled") != 0,
        has_discrepancy: row.get::<i64, _>("has_discrepancy") != 0,
        notes: row.get("notes"),
        created_at: parse_ts(&row.get::<String, _>("created_at"), "created_at")?,
    })
}

fn row_to_adjustment(row: &SqliteRow) -> Result<SummaryAdjustment> {
    let type_str: String = row.get("adjustment_type");

    Ok(SummaryAdjustment {
        id: parse_id(&row.get::<String, _>("id"), "adjustment")?,
        summary_id: parse_id(&row.get::<String, _>("summary_id"), "summary")?,
        adjustment_type: AdjustmentType::from_str(&type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid adjustment type: {}", type_str))?,
        description: row.get("description"),
        amount: parse_amount(&row.get::<String, _>("amount"), "adjustment")?,
        created_at: parse_ts(&row.get::<String, _>("created_at"), "created_at")?,
    })
}
