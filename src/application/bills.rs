//! Recurring bill engine: services, their monthly bills, and bill payments.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{
    BillId, BillStatus, CategoryId, DEFAULT_BILL_DUE_DAY, Money, OwnerId, RecurringService,
    ServiceBill, ServiceId, Transaction, clamped_date, is_valid_month_day, missing_bills,
};
use crate::storage::{BillFilter, LedgerTx};

use super::checks::{
    balance_holder, ensure_category, ensure_funding_product, ensure_funds, ensure_name,
    ensure_period, load_product, validate_amount, validate_scale,
};
use super::{
    AppError, BillPayment, BillUpdate, LedgerService, NewBill, NewService, ServiceUpdate,
};

/// A paid bill together with the expense that settled it.
#[derive(Debug, Clone, Serialize)]
pub struct BillReceipt {
    pub bill: ServiceBill,
    pub transaction: Transaction,
}

// ========================
// Services
// ========================

pub async fn create_service(
    tx: &mut LedgerTx,
    request: NewService,
) -> Result<RecurringService, AppError> {
    ensure_name(&request.name, "service")?;
    validate_service_defaults(tx, request.category_id, request.default_amount, request.default_due_day)
        .await?;

    let service = RecurringService::new(tx.owner(), request.name.trim().to_string())
        .with_category(request.category_id)
        .with_default_amount(request.default_amount)
        .with_default_due_day(request.default_due_day);
    tx.insert_service(&service).await?;
    Ok(service)
}

pub async fn get_service(tx: &mut LedgerTx, id: ServiceId) -> Result<RecurringService, AppError> {
    load_service(tx, id).await
}

pub async fn list_services(
    tx: &mut LedgerTx,
    active_only: bool,
) -> Result<Vec<RecurringService>, AppError> {
    Ok(tx.list_services(active_only).await?)
}

pub async fn update_service(
    tx: &mut LedgerTx,
    id: ServiceId,
    changes: ServiceUpdate,
) -> Result<RecurringService, AppError> {
    let mut service = load_service(tx, id).await?;
    validate_service_defaults(tx, changes.category_id, changes.default_amount, changes.default_due_day)
        .await?;

    if let Some(name) = changes.name {
        ensure_name(&name, "service")?;
        service.name = name.trim().to_string();
    }
    if changes.category_id.is_some() {
        service.category_id = changes.category_id;
    }
    if changes.default_amount.is_some() {
        service.default_amount = changes.default_amount;
    }
    if changes.default_due_day.is_some() {
        service.default_due_day = changes.default_due_day;
    }
    if let Some(is_active) = changes.is_active {
        service.is_active = is_active;
    }

    tx.update_service(&service).await?;
    Ok(service)
}

/// Delete a service and all of its bills. Payment transactions stay.
pub async fn delete_service(tx: &mut LedgerTx, id: ServiceId) -> Result<RecurringService, AppError> {
    let service = load_service(tx, id).await?;
    tx.delete_service(id).await?;
    Ok(service)
}

async fn validate_service_defaults(
    tx: &mut LedgerTx,
    category_id: Option<CategoryId>,
    default_amount: Option<Money>,
    default_due_day: Option<u32>,
) -> Result<(), AppError> {
    if let Some(category_id) = category_id {
        ensure_category(tx, category_id).await?;
    }
    if let Some(amount) = default_amount {
        if amount < Money::ZERO {
            return Err(AppError::InvalidAmount(format!("{} cannot be negative", amount)));
        }
        validate_scale(amount)?;
    }
    if let Some(day) = default_due_day {
        if !is_valid_month_day(day) {
            return Err(AppError::InvalidDay(day));
        }
    }
    Ok(())
}

// ========================
// Bills
// ========================

/// Bills of the period, one per active service, creating the missing ones
/// from the service defaults. Ordered by due date.
pub async fn get_or_create_monthly(
    tx: &mut LedgerTx,
    year: i32,
    month: u32,
) -> Result<Vec<ServiceBill>, AppError> {
    ensure_period(year, month)?;
    let services = tx.list_services(true).await?;
    let period = BillFilter {
        year: Some(year),
        month: Some(month),
        ..BillFilter::default()
    };
    let existing = tx.list_bills(&period).await?;

    let created = missing_bills(&services, &existing, year, month);
    for bill in &created {
        tx.insert_bill_if_absent(bill).await?;
    }
    if !created.is_empty() {
        debug!(year, month, created = created.len(), "materialized monthly bills");
    }

    let mut bills = tx.list_bills(&period).await?;
    bills.retain(|bill| services.iter().any(|service| service.id == bill.service_id));
    Ok(bills)
}

pub async fn create_bill(tx: &mut LedgerTx, request: NewBill) -> Result<ServiceBill, AppError> {
    ensure_period(request.year, request.month)?;
    let service = load_service(tx, request.service_id).await?;

    let period = BillFilter {
        year: Some(request.year),
        month: Some(request.month),
        service_id: Some(service.id),
        ..BillFilter::default()
    };
    if !tx.list_bills(&period).await?.is_empty() {
        return Err(AppError::AlreadyExists(format!(
            "bill for {} in {}-{:02}",
            service.name, request.year, request.month
        )));
    }

    let due_date = match request.due_date {
        Some(date) => date,
        None => clamped_date(
            request.year,
            request.month,
            service.default_due_day.unwrap_or(DEFAULT_BILL_DUE_DAY),
        )
        .ok_or(AppError::InvalidPeriod {
            year: request.year,
            month: request.month,
        })?,
    };
    let amount = request
        .amount
        .or(service.default_amount)
        .unwrap_or_default();
    if amount < Money::ZERO {
        return Err(AppError::InvalidAmount(format!("{} cannot be negative", amount)));
    }
    validate_scale(amount)?;

    let bill = ServiceBill::new(
        tx.owner(),
        service.id,
        request.year,
        request.month,
        due_date,
        amount,
    );
    tx.insert_bill(&bill).await?;
    Ok(bill)
}

pub async fn get_bill(tx: &mut LedgerTx, id: BillId) -> Result<ServiceBill, AppError> {
    load_bill(tx, id).await
}

pub async fn list_bills(tx: &mut LedgerTx, filter: &BillFilter) -> Result<Vec<ServiceBill>, AppError> {
    if let (Some(year), Some(month)) = (filter.year, filter.month) {
        ensure_period(year, month)?;
    }
    Ok(tx.list_bills(filter).await?)
}

pub async fn update_bill(
    tx: &mut LedgerTx,
    id: BillId,
    changes: BillUpdate,
) -> Result<ServiceBill, AppError> {
    let mut bill = load_bill(tx, id).await?;
    ensure_unpaid(&bill)?;

    if let Some(amount) = changes.amount {
        validate_amount(amount)?;
        bill.amount = amount;
    }
    if let Some(due_date) = changes.due_date {
        bill.due_date = due_date;
    }
    tx.update_bill(&bill).await?;
    Ok(bill)
}

/// Delete a bill. A paid bill keeps its payment transaction.
pub async fn delete_bill(tx: &mut LedgerTx, id: BillId) -> Result<ServiceBill, AppError> {
    let bill = load_bill(tx, id).await?;
    tx.delete_bill(id).await?;
    Ok(bill)
}

/// Pay a bill with an expense on a non-credit product.
pub async fn pay_bill(
    tx: &mut LedgerTx,
    id: BillId,
    payment: BillPayment,
) -> Result<BillReceipt, AppError> {
    let mut bill = load_bill(tx, id).await?;
    ensure_unpaid(&bill)?;
    let service = load_service(tx, bill.service_id).await?;

    let product = load_product(tx, payment.product_id).await?;
    ensure_funding_product(&product)?;
    let mut holder = balance_holder(tx, product.clone()).await?;

    let amount = payment.amount.unwrap_or(bill.amount);
    validate_amount(amount)?;
    ensure_funds(&holder, amount)?;

    let paid_at = payment.date.unwrap_or_else(Utc::now);
    let transaction = Transaction::expense(
        tx.owner(),
        product.id,
        amount,
        paid_at,
        format!("Payment {}", service.name),
    )
    .with_category(service.category_id);
    tx.insert_transaction(&transaction).await?;

    holder.apply_delta(-amount, None);
    tx.update_product(&holder).await?;

    bill.amount = amount;
    bill.status = BillStatus::Paid;
    bill.transaction_id = Some(transaction.id);
    bill.paid_date = Some(paid_at);
    tx.update_bill(&bill).await?;

    Ok(BillReceipt { bill, transaction })
}

pub async fn skip_bill(tx: &mut LedgerTx, id: BillId) -> Result<ServiceBill, AppError> {
    let mut bill = load_bill(tx, id).await?;
    if bill.is_paid() {
        return Err(AppError::InvalidStatusTransition {
            entity: "bill",
            from: bill.status.to_string(),
            to: BillStatus::Skipped.to_string(),
        });
    }
    bill.status = BillStatus::Skipped;
    tx.update_bill(&bill).await?;
    Ok(bill)
}

async fn load_service(tx: &mut LedgerTx, id: ServiceId) -> Result<RecurringService, AppError> {
    tx.get_service(id).await?.ok_or(AppError::ServiceNotFound(id))
}

async fn load_bill(tx: &mut LedgerTx, id: BillId) -> Result<ServiceBill, AppError> {
    tx.get_bill(id).await?.ok_or(AppError::BillNotFound(id))
}

fn ensure_unpaid(bill: &ServiceBill) -> Result<(), AppError> {
    if bill.is_paid() {
        return Err(AppError::AlreadyPaid(format!(
            "bill {}-{:02} ({})",
            bill.year, bill.month, bill.id
        )));
    }
    Ok(())
}

impl LedgerService {
    // ========================
    // Service operations
    // ========================

    pub async fn create_service(
        &self,
        owner: OwnerId,
        request: NewService,
    ) -> Result<RecurringService, AppError> {
        let mut tx = self.begin(owner).await?;
        let service = create_service(&mut tx, request).await?;
        tx.commit().await?;
        info!(%owner, service_id = %service.id, name = %service.name, "service created");
        Ok(service)
    }

    pub async fn get_service(
        &self,
        owner: OwnerId,
        id: ServiceId,
    ) -> Result<RecurringService, AppError> {
        let mut tx = self.begin(owner).await?;
        get_service(&mut tx, id).await
    }

    pub async fn list_services(
        &self,
        owner: OwnerId,
        active_only: bool,
    ) -> Result<Vec<RecurringService>, AppError> {
        let mut tx = self.begin(owner).await?;
        list_services(&mut tx, active_only).await
    }

    pub async fn update_service(
        &self,
        owner: OwnerId,
        id: ServiceId,
        changes: ServiceUpdate,
    ) -> Result<RecurringService, AppError> {
        let mut tx = self.begin(owner).await?;
        let service = update_service(&mut tx, id, changes).await?;
        tx.commit().await?;
        info!(%owner, service_id = %id, "service updated");
        Ok(service)
    }

    pub async fn delete_service(
        &self,
        owner: OwnerId,
        id: ServiceId,
    ) -> Result<RecurringService, AppError> {
        let mut tx = self.begin(owner).await?;
        let service = delete_service(&mut tx, id).await?;
        tx.commit().await?;
        info!(%owner, service_id = %id, "service deleted");
        Ok(service)
    }

    // ========================
    // Bill operations
    // ========================

    pub async fn get_or_create_monthly_bills(
        &self,
        owner: OwnerId,
        year: i32,
        month: u32,
    ) -> Result<Vec<ServiceBill>, AppError> {
        let mut tx = self.begin(owner).await?;
        let bills = get_or_create_monthly(&mut tx, year, month).await?;
        tx.commit().await?;
        Ok(bills)
    }

    pub async fn create_bill(&self, owner: OwnerId, request: NewBill) -> Result<ServiceBill, AppError> {
        let mut tx = self.begin(owner).await?;
        let bill = create_bill(&mut tx, request).await?;
        tx.commit().await?;
        info!(%owner, bill_id = %bill.id, "bill created");
        Ok(bill)
    }

    pub async fn get_bill(&self, owner: OwnerId, id: BillId) -> Result<ServiceBill, AppError> {
        let mut tx = self.begin(owner).await?;
        get_bill(&mut tx, id).await
    }

    pub async fn list_bills(
        &self,
        owner: OwnerId,
        filter: &BillFilter,
    ) -> Result<Vec<ServiceBill>, AppError> {
        let mut tx = self.begin(owner).await?;
        list_bills(&mut tx, filter).await
    }

    pub async fn update_bill(
        &self,
        owner: OwnerId,
        id: BillId,
        changes: BillUpdate,
    ) -> Result<ServiceBill, AppError> {
        let mut tx = self.begin(owner).await?;
        let bill = update_bill(&mut tx, id, changes).await?;
        tx.commit().await?;
        info!(%owner, bill_id = %id, "bill updated");
        Ok(bill)
    }

    pub async fn delete_bill(&self, owner: OwnerId, id: BillId) -> Result<ServiceBill, AppError> {
        let mut tx = self.begin(owner).await?;
        let bill = delete_bill(&mut tx, id).await?;
        tx.commit().await?;
        info!(%owner, bill_id = %id, "bill deleted");
        Ok(bill)
    }

    pub async fn pay_bill(
        &self,
        owner: OwnerId,
        id: BillId,
        payment: BillPayment,
    ) -> Result<BillReceipt, AppError> {
        let mut tx = self.begin(owner).await?;
        let receipt = pay_bill(&mut tx, id, payment).await?;
        tx.commit().await?;
        info!(
            %owner,
            bill_id = %id,
            transaction_id = %receipt.transaction.id,
            amount = %receipt.transaction.amount,
            "bill paid"
        );
        Ok(receipt)
    }

    pub async fn skip_bill(&self, owner: OwnerId, id: BillId) -> Result<ServiceBill, AppError> {
        let mut tx = self.begin(owner).await?;
        let bill = skip_bill(&mut tx, id).await?;
        tx.commit().await?;
        info!(%owner, bill_id = %id, "bill skipped");
        Ok(bill)
    }
}
