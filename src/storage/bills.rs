use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::domain::{
    BillId, BillStatus, RecurringService, ServiceBill, ServiceId, TransactionId,
};

use super::repository::{
    LedgerTx, date_str, day_from_db, ensure_one, parse_amount, parse_date, parse_id,
    parse_opt_amount, parse_opt_id, parse_opt_ts, parse_ts, ts,
};

const SERVICE_COLUMNS: &str = "id, owner_id, name, category_id, default_amount, default_due_day, \
    is_active, created_at, updated_at";

const BILL_COLUMNS: &str = "id, owner_id, service_id, year, month, due_date, amount, status, \
    transaction_id, paid_date, created_at, updated_at";

/// Filter for listing service bills
#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub status: Option<BillStatus>,
    pub service_id: Option<ServiceId>,
}

impl LedgerTx {
    // ========================
    // Service operations
    // ========================

    pub async fn insert_service(&mut self, service: &RecurringService) -> Result<()> {
        let owner = self.owner_key();
        sqlx::query(&format!(
            "INSERT INTO services ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SERVICE_COLUMNS
        ))
        .bind(service.id.to_string())
        .bind(owner)
        .bind(&service.name)
        .bind(service.category_id.map(|id| id.to_string()))
        .bind(service.default_amount.map(|m| m.to_string()))
        .bind(service.default_due_day.map(i64::from))
        .bind(service.is_active)
        .bind(ts(&service.created_at))
        .bind(ts(&service.updated_at))
        .execute(self.conn())
        .await
        .context("Failed to save service")?;
        Ok(())
    }

    pub async fn get_service(&mut self, id: ServiceId) -> Result<Option<RecurringService>> {
        let owner = self.owner_key();
        let row = sqlx::query(&format!(
            "SELECT {} FROM services WHERE id = ? AND owner_id = ?",
            SERVICE_COLUMNS
        ))
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch service")?;

        row.as_ref().map(row_to_service).transpose()
    }

    pub async fn list_services(&mut self, active_only: bool) -> Result<Vec<RecurringService>> {
        let owner = self.owner_key();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM services WHERE owner_id = ? AND (? = 0 OR is_active = 1) ORDER BY name",
            SERVICE_COLUMNS
        ))
        .bind(owner)
        .bind(active_only)
        .fetch_all(self.conn())
        .await
        .context("Failed to list services")?;

        rows.iter().map(row_to_service).collect()
    }

    pub async fn update_service(&mut self, service: &RecurringService) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query(
            r#"
            UPDATE services
            SET name = ?, category_id = ?, default_amount = ?, default_due_day = ?, is_active = ?, updated_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(&service.name)
        .bind(service.category_id.map(|id| id.to_string()))
        .bind(service.default_amount.map(|m| m.to_string()))
        .bind(service.default_due_day.map(i64::from))
        .bind(service.is_active)
        .bind(ts(&Utc::now()))
        .bind(service.id.to_string())
        .bind(owner)
        .execute(self.conn())
        .await
        .context("Failed to update service")?;

        ensure_one(result, "service", service.id)
    }

    /// Delete a service and all of its bills.
    pub async fn delete_service(&mut self, id: ServiceId) -> Result<()> {
        let owner = self.owner_key();
        sqlx::query("DELETE FROM service_bills WHERE owner_id = ? AND service_id = ?")
            .bind(&owner)
            .bind(id.to_string())
            .execute(self.conn())
            .await
            .context("Failed to delete service bills")?;

        let result = sqlx::query("DELETE FROM services WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(&owner)
            .execute(self.conn())
            .await
            .context("Failed to delete service")?;

        ensure_one(result, "service", id)
    }

    // ========================
    // Bill operations
    // ========================

    pub async fn insert_bill(&mut self, bill: &ServiceBill) -> Result<()> {
        self.write_bill(bill, false).await
    }

    /// Insert unless the service already has a bill for the period.
    pub async fn insert_bill_if_absent(&mut self, bill: &ServiceBill) -> Result<()> {
        self.write_bill(bill, true).await
    }

    async fn write_bill(&mut self, bill: &ServiceBill, ignore_existing: bool) -> Result<()> {
        let owner = self.owner_key();
        let on_conflict = if ignore_existing {
            " ON CONFLICT (service_id, year, month) DO NOTHING"
        } else {
            ""
        };
        sqlx::query(&format!(
            "INSERT INTO service_bills ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?){}",
            BILL_COLUMNS, on_conflict
        ))
        .bind(bill.id.to_string())
        .bind(owner)
        .bind(bill.service_id.to_string())
        .bind(bill.year)
        .bind(i64::from(bill.month))
        .bind(date_str(&bill.due_date))
        .bind(bill.amount.to_string())
        .bind(bill.status.as_str())
        .bind(bill.transaction_id.map(|id| id.to_string()))
        .bind(bill.paid_date.map(|d| ts(&d)))
        .bind(ts(&bill.created_at))
        .bind(ts(&bill.updated_at))
        .execute(self.conn())
        .await
        .context("Failed to save bill")?;
        Ok(())
    }

    pub async fn get_bill(&mut self, id: BillId) -> Result<Option<ServiceBill>> {
        let owner = self.owner_key();
        let row = sqlx::query(&format!(
            "SELECT {} FROM service_bills WHERE id = ? AND owner_id = ?",
            BILL_COLUMNS
        ))
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch bill")?;

        row.as_ref().map(row_to_bill).transpose()
    }

    /// Bill whose payment is `transaction_id`.
    pub async fn get_bill_by_transaction(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<Option<ServiceBill>> {
        let owner = self.owner_key();
        let row = sqlx::query(&format!(
            "SELECT {} FROM service_bills WHERE owner_id = ? AND transaction_id = ?",
            BILL_COLUMNS
        ))
        .bind(owner)
        .bind(transaction_id.to_string())
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch bill by transaction")?;

        row.as_ref().map(row_to_bill).transpose()
    }

    /// Bills ordered by due date.
    pub async fn list_bills(&mut self, filter: &BillFilter) -> Result<Vec<ServiceBill>> {
        let owner = self.owner_key();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM service_bills
            WHERE owner_id = ?1
              AND (?2 IS NULL OR year = ?2)
              AND (?3 IS NULL OR month = ?3)
              AND (?4 IS NULL OR status = ?4)
              AND (?5 IS NULL OR service_id = ?5)
            ORDER BY due_date, created_at
            "#,
            BILL_COLUMNS
        ))
        .bind(owner)
        .bind(filter.year)
        .bind(filter.month.map(i64::from))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.service_id.map(|id| id.to_string()))
        .fetch_all(self.conn())
        .await
        .context("Failed to list bills")?;

        rows.iter().map(row_to_bill).collect()
    }

    pub async fn update_bill(&mut self, bill: &ServiceBill) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query(
            r#"
            UPDATE service_bills
            SET due_date = ?, amount = ?, status = ?, transaction_id = ?, paid_date = ?, updated_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(date_str(&bill.due_date))
        .bind(bill.amount.to_string())
        .bind(bill.status.as_str())
        .bind(bill.transaction_id.map(|id| id.to_string()))
        .bind(bill.paid_date.map(|d| ts(&d)))
        .bind(ts(&Utc::now()))
        .bind(bill.id.to_string())
        .bind(owner)
        .execute(self.conn())
        .await
        .context("Failed to update bill")?;

        ensure_one(result, "bill", bill.id)
    }

    pub async fn delete_bill(&mut self, id: BillId) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query("DELETE FROM service_bills WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner)
            .execute(self.conn())
            .await
            .context("Failed to delete bill")?;

        ensure_one(result, "bill", id)
    }
}

fn row_to_service(row: &SqliteRow) -> Result<RecurringService> {
    Ok(RecurringService {
        id: parse_id(&row.get::<String, _>("id"), "service")?,
        owner_id: parse_id(&row.get::<String, _>("owner_id"), "owner")?,
        name: row.get("name"),
        category_id: parse_opt_id(row.get("category_id"), "category")?,
        default_amount: parse_opt_amount(row.get("default_amount"), "default")?,
        default_due_day: day_from_db(row.get("default_due_day")),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_ts(&row.get::<String, _>("created_at"), "created_at")?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"), "updated_at")?,
    })
}

fn row_to_bill(row: &SqliteRow) -> Result<ServiceBill> {
    let status_str: String = row.get("status");
    let month: i64 = row.get("month");

    Ok(ServiceBill {
        id: parse_id(&row.get::<String, _>("id"), "bill")?,
        owner_id: parse_id(&row.get::<String, _>("owner_id"), "owner")?,
        service_id: parse_id(&row.get::<String, _>("service_id"), "service")?,
        year: row.get("year"),
        month: u32::try_from(month).context("Invalid bill month")?,
        due_date: parse_date(&row.get::<String, _>("due_date"), "due_date")?,
        amount: parse_amount(&row.get::<String, _>("amount"), "bill")?,
        status: BillStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid bill status: {}", status_str))?,
        transaction_id: parse_opt_id(row.get("transaction_id"), "transaction")?,
        paid_date: parse_opt_ts(row.get("paid_date"), "paid_date")?,
        created_at: parse_ts(&row.get::<String, _>("created_at"), "created_at")?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"), "updated_at")?,
    })
}
