use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::domain::{
    CardProvider, CreditLimits, Currency, FinancialProduct, InstitutionId, ProductId,
    ProductType,
};

use super::repository::{
    LedgerTx, day_from_db, ensure_one, parse_amount, parse_id, parse_opt_amount, parse_opt_id,
    parse_ts, ts,
};

const PRODUCT_COLUMNS: &str = "id, owner_id, institution_id, name, product_type, currency, balance, \
    linked_product_id, closing_day, due_day, limit_single_payment, limit_installments, limit_amount, \
    unified_limit, last_four_digits, provider, created_at, updated_at";

impl LedgerTx {
    // ========================
    // Product operations
    // ========================

    pub async fn insert_product(&mut self, product: &FinancialProduct) -> Result<()> {
        let owner = self.owner_key();
        sqlx::query(&format!(
            "INSERT INTO products ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            PRODUCT_COLUMNS
        ))
        .bind(product.id.to_string())
        .bind(owner)
        .bind(product.institution_id.map(|id| id.to_string()))
        .bind(&product.name)
        .bind(product.product_type.as_str())
        .bind(product.currency.as_str())
        .bind(product.balance.to_string())
        .bind(product.linked_product_id.map(|id| id.to_string()))
        .bind(product.closing_day.map(i64::from))
        .bind(product.due_day.map(i64::from))
        .bind(product.limits.limit_single_payment.map(|m| m.to_string()))
        .bind(product.limits.limit_installments.map(|m| m.to_string()))
        .bind(product.limits.limit_amount.map(|m| m.to_string()))
        .bind(product.limits.unified)
        .bind(&product.last_four_digits)
        .bind(product.provider.map(|p| p.as_str()))
        .bind(ts(&product.created_at))
        .bind(ts(&product.updated_at))
        .execute(self.conn())
        .await
        .context("Failed to save product")?;
        Ok(())
    }

    pub async fn get_product(&mut self, id: ProductId) -> Result<Option<FinancialProduct>> {
        let owner = self.owner_key();
        let row = sqlx::query(&format!(
            "SELECT {} FROM products WHERE id = ? AND owner_id = ?",
            PRODUCT_COLUMNS
        ))
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch product")?;

        row.as_ref().map(row_to_product).transpose()
    }

    pub async fn list_products(
        &mut self,
        institution_id: Option<InstitutionId>,
    ) -> Result<Vec<FinancialProduct>> {
        let owner = self.owner_key();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM products WHERE owner_id = ? AND (? IS NULL OR institution_id = ?) ORDER BY name",
            PRODUCT_COLUMNS
        ))
        .bind(owner)
        .bind(institution_id.map(|id| id.to_string()))
        .bind(institution_id.map(|id| id.to_string()))
        .fetch_all(self.conn())
        .await
        .context("Failed to list products")?;

        rows.iter().map(row_to_product).collect()
    }

    /// Persist every mutable field, including balance and tracked limits.
    pub async fn update_product(&mut self, product: &FinancialProduct) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query(
            r#"
            UPDATE products
            SET institution_id = ?, name = ?, balance = ?, linked_product_id = ?,
                closing_day = ?, due_day = ?, limit_single_payment = ?, limit_installments = ?,
                limit_amount = ?, unified_limit = ?, last_four_digits = ?, provider = ?, updated_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(product.institution_id.map(|id| id.to_string()))
        .bind(&product.name)
        .bind(product.balance.to_string())
        .bind(product.linked_product_id.map(|id| id.to_string()))
        .bind(product.closing_day.map(i64::from))
        .bind(product.due_day.map(i64::from))
        .bind(product.limits.limit_single_payment.map(|m| m.to_string()))
        .bind(product.limits.limit_installments.map(|m| m.to_string()))
        .bind(product.limits.limit_amount.map(|m| m.to_string()))
        .bind(product.limits.unified)
        .bind(&product.last_four_digits)
        .bind(product.provider.map(|p| p.as_str()))
        .bind(ts(&Utc::now()))
        .bind(product.id.to_string())
        .bind(owner)
        .execute(self.conn())
        .await
        .context("Failed to update product")?;

        ensure_one(result, "product", product.id)
    }

    /// Debit cards drawing from `product_id`.
    pub async fn count_linked_cards(&mut self, product_id: ProductId) -> Result<i64> {
        let owner = self.owner_key();
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM products WHERE owner_id = ? AND linked_product_id = ?",
        )
        .bind(owner)
        .bind(product_id.to_string())
        .fetch_one(self.conn())
        .await
        .context("Failed to count linked cards")?;
        Ok(row.get("count"))
    }

    /// Delete a product together with its statements and transactions.
    ///
    /// Bills paid by removed transactions go back to pending. Balances of
    /// counterpart products are left as they are.
    pub async fn purge_product(&mut self, product_id: ProductId) -> Result<()> {
        let owner = self.owner_key();
        let id = product_id.to_string();

        let owned_transactions = "SELECT id FROM transactions \
            WHERE owner_id = ?1 AND (from_product_id = ?2 OR to_product_id = ?2)";
        let owned_summaries =
            "SELECT id FROM credit_card_summaries WHERE owner_id = ?1 AND product_id = ?2";

        let statements = [
            format!(
                "DELETE FROM summary_items WHERE owner_id = ?1 AND (transaction_id IN ({}) OR summary_id IN ({}))",
                owned_transactions, owned_summaries
            ),
            format!(
                "DELETE FROM summary_adjustments WHERE owner_id = ?1 AND summary_id IN ({})",
                owned_summaries
            ),
            "DELETE FROM credit_card_summaries WHERE owner_id = ?1 AND product_id = ?2".to_string(),
            format!(
                "UPDATE service_bills SET status = 'pending', transaction_id = NULL, paid_date = NULL \
                 WHERE owner_id = ?1 AND transaction_id IN ({})",
                owned_transactions
            ),
            "DELETE FROM transactions WHERE owner_id = ?1 AND (from_product_id = ?2 OR to_product_id = ?2)"
                .to_string(),
        ];

        for statement in &statements {
            sqlx::query(statement)
                .bind(&owner)
                .bind(&id)
                .execute(self.conn())
                .await
                .context("Failed to delete product records")?;
        }

        let result = sqlx::query("DELETE FROM products WHERE id = ? AND owner_id = ?")
            .bind(&id)
            .bind(&owner)
            .execute(self.conn())
            .await
            .context("Failed to delete product")?;

        ensure_one(result, "product", product_id)
    }
}

fn row_to_product(row: &SqliteRow) -> Result<FinancialProduct> {
    let product_type_str: String = row.get("product_type");
    let currency_str: String = row.get("currency");
    let provider_str: Option<String> = row.get("provider");
    let balance_str: String = row.get("balance");

    Ok(FinancialProduct {
        id: parse_id(&row.get::<String, _>("id"), "product")?,
        owner_id: parse_id(&row.get::<String, _>("owner_id"), "owner")?,
        institution_id: parse_opt_id(row.get("institution_id"), "institution")?,
        name: row.get("name"),
        product_type: ProductType::from_str(&product_type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid product type: {}", product_type_str))?,
        currency: Currency::from_str(&currency_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid currency: {}", currency_str))?,
        balance: parse_amount(&balance_str, "balance")?,
        linked_product_id: parse_opt_id(row.get("linked_product_id"), "linked product")?,
        closing_day: day_from_db(row.get("closing_day")),
        due_day: day_from_db(row.get("due_day")),
        limits: CreditLimits {
            limit_single_payment: parse_opt_amount(row.get("limit_single_payment"), "limit")?,
            limit_installments: parse_opt_amount(row.get("limit_installments"), "limit")?,
            limit_amount: parse_opt_amount(row.get("limit_amount"), "limit")?,
            unified: row.get::<i64, _>("unified_limit") != 0,
        },
        last_four_digits: row.get("last_four_digits"),
        provider: provider_str
            .map(|s| CardProvider::from_str(&s).ok_or_else(|| anyhow::anyhow!("Invalid provider: {}", s)))
            .transpose()?,
        created_at: parse_ts(&row.get::<String, _>("created_at"), "created_at")?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"), "updated_at")?,
    })
}
