//! Transaction engine: records movements and keeps product balances and
//! tracked credit limits consistent with them.

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    BillStatus, FinancialProduct, Installment, InstallmentGroupId, LimitPool, MAX_INSTALLMENTS, Money,
    OwnerId, Transaction, TransactionId, TransactionType, installment_description,
    installment_schedule,
};
use crate::storage::{LedgerTx, TransactionFilter};

use super::checks::{
    balance_holder, ensure_category, ensure_credit, ensure_funds, ensure_funding_product,
    ensure_same_currency, load_product, load_transaction, validate_amount,
};
use super::{AppError, LedgerService, NewTransaction, NewTransfer, TransactionUpdate};

/// Record an income or expense. Installment purchases produce one row per
/// month; the whole amount hits the balance immediately.
pub async fn create(tx: &mut LedgerTx, request: NewTransaction) -> Result<Vec<Transaction>, AppError> {
    validate_amount(request.amount)?;
    if request.installments == 0 || request.installments > MAX_INSTALLMENTS {
        return Err(AppError::InvalidInstallments(request.installments));
    }
    if request.transaction_type == TransactionType::Transfer {
        return Err(AppError::Unsupported(
            "transfers must be recorded with a source and destination".into(),
        ));
    }

    let product = load_product(tx, request.product_id).await?;
    if let Some(category_id) = request.category_id {
        ensure_category(tx, category_id).await?;
    }

    let is_expense = request.transaction_type == TransactionType::Expense;
    if !is_expense && product.product_type.is_credit_line() {
        return Err(AppError::Unsupported(format!(
            "income cannot be recorded on {} product {}",
            product.product_type, product.name
        )));
    }
    if request.installments > 1 && !product.is_credit_card() {
        return Err(AppError::Unsupported(format!(
            "installments are only available on credit cards, {} is a {}",
            product.name, product.product_type
        )));
    }

    let pool = if product.is_credit_card() {
        if product.billing_days().is_none() {
            return Err(AppError::MissingBillingCycle(product.name.clone()));
        }
        let pool = product.limits.pool_for(request.installments > 1);
        ensure_credit(&product, pool, request.amount)?;
        Some(pool)
    } else {
        None
    };

    let is_debit_card = product.is_debit_card();
    let mut holder = balance_holder(tx, product.clone()).await?;
    if is_expense && is_debit_card {
        ensure_funds(&holder, request.amount)?;
    }

    let rows = build_rows(tx.owner(), &product, &request)?;
    for row in &rows {
        tx.insert_transaction(row).await?;
    }

    let delta = if is_expense {
        -request.amount
    } else {
        request.amount
    };
    holder.apply_delta(delta, pool);
    tx.update_product(&holder).await?;

    debug!(
        product_id = %product.id,
        holder_id = %holder.id,
        rows = rows.len(),
        %delta,
        "recorded transaction"
    );
    Ok(rows)
}

fn build_rows(
    owner: OwnerId,
    product: &FinancialProduct,
    request: &NewTransaction,
) -> Result<Vec<Transaction>, AppError> {
    let new_row = |amount: Money, date, description: String| match request.transaction_type {
        TransactionType::Income => Transaction::income(owner, product.id, amount, date, description),
        _ => Transaction::expense(owner, product.id, amount, date, description),
    };

    if request.installments == 1 {
        let row = new_row(request.amount, request.date, request.description.clone())
            .with_category(request.category_id)
            .with_plan_z(request.plan_z);
        return Ok(vec![row]);
    }

    let schedule = installment_schedule(request.amount, request.installments, request.date)
        .ok_or_else(|| AppError::InvalidDate(request.date.to_rfc3339()))?;
    let group_id = Uuid::new_v4();

    Ok(schedule
        .into_iter()
        .map(|slot| {
            new_row(
                slot.amount,
                slot.date,
                installment_description(&request.description, slot.number, request.installments),
            )
            .with_category(request.category_id)
            .with_installment(Installment {
                group_id,
                number: slot.number,
                total: request.installments,
            })
            .with_plan_z(request.plan_z && slot.number == 1)
        })
        .collect())
}

/// Edit a transaction. An amount change moves every balance leg by the
/// difference; a category change spreads to the whole installment group.
pub async fn update(
    tx: &mut LedgerTx,
    id: TransactionId,
    changes: TransactionUpdate,
) -> Result<Transaction, AppError> {
    let mut current = load_transaction(tx, id).await?;
    ensure_editable(tx, &current).await?;

    if let Some(amount) = changes.amount {
        validate_amount(amount)?;
        let diff = amount - current.amount;
        if diff != Money::ZERO {
            apply_legs(tx, &current, diff, true).await?;
            current.amount = amount;
        }
    }

    if let Some(category_id) = changes.category_id {
        ensure_category(tx, category_id).await?;
        if current.category_id != Some(category_id) {
            current.category_id = Some(category_id);
            if let Some(installment) = current.installment {
                tx.set_group_category(installment.group_id, current.category_id)
                    .await?;
            }
        }
    }
    if let Some(date) = changes.date {
        current.date = date;
    }
    if let Some(description) = changes.description {
        current.description = description;
    }
    if let Some(plan_z) = changes.plan_z {
        current.plan_z = plan_z;
    }

    tx.update_transaction(&current).await?;
    Ok(current)
}

/// Delete a transaction, reversing its balance effect. A bill paid by it
/// goes back to pending.
pub async fn delete(tx: &mut LedgerTx, id: TransactionId) -> Result<Transaction, AppError> {
    let current = load_transaction(tx, id).await?;
    ensure_editable(tx, &current).await?;

    apply_legs(tx, &current, -current.amount, false).await?;

    if let Some(mut bill) = tx.get_bill_by_transaction(id).await? {
        bill.status = BillStatus::Pending;
        bill.transaction_id = None;
        bill.paid_date = None;
        tx.update_bill(&bill).await?;
        debug!(bill_id = %bill.id, "bill reverted to pending");
    }

    tx.delete_items_for_transaction(id).await?;
    tx.delete_transaction(id).await?;
    Ok(current)
}

/// Move `amount` from one product to another of the same currency.
pub async fn transfer(tx: &mut LedgerTx, request: NewTransfer) -> Result<Transaction, AppError> {
    validate_amount(request.amount)?;
    if let Some(category_id) = request.category_id {
        ensure_category(tx, category_id).await?;
    }

    let from = load_product(tx, request.from_product_id).await?;
    let to = load_product(tx, request.to_product_id).await?;
    ensure_funding_product(&from)?;

    let mut source = balance_holder(tx, from.clone()).await?;
    let mut destination = balance_holder(tx, to.clone()).await?;
    if source.id == destination.id {
        return Err(AppError::Unsupported(
            "source and destination of a transfer must differ".into(),
        ));
    }
    ensure_same_currency(&source, &destination)?;
    ensure_funds(&source, request.amount)?;

    let row = Transaction::transfer(
        tx.owner(),
        from.id,
        to.id,
        request.amount,
        request.date,
        request.description,
    )
    .with_category(request.category_id);
    tx.insert_transaction(&row).await?;

    source.apply_delta(-request.amount, None);
    destination.apply_delta(request.amount, None);
    tx.update_product(&source).await?;
    tx.update_product(&destination).await?;

    Ok(row)
}

pub async fn get(tx: &mut LedgerTx, id: TransactionId) -> Result<Transaction, AppError> {
    load_transaction(tx, id).await
}

pub async fn list(tx: &mut LedgerTx, filter: &TransactionFilter) -> Result<Vec<Transaction>, AppError> {
    Ok(tx.list_transactions(filter).await?)
}

pub async fn list_group(
    tx: &mut LedgerTx,
    group_id: InstallmentGroupId,
) -> Result<Vec<Transaction>, AppError> {
    Ok(tx.list_installment_group(group_id).await?)
}

/// Rows frozen in a closed statement, or produced by a statement payment,
/// are part of settled history.
async fn ensure_editable(tx: &mut LedgerTx, transaction: &Transaction) -> Result<(), AppError> {
    if let Some(statement_id) = transaction.statement_id {
        return Err(AppError::TransactionLocked {
            id: transaction.id,
            reason: format!("generated by the payment of statement {}", statement_id),
        });
    }
    if let Some((summary_id, status)) = tx.frozen_summary_for(transaction.id).await? {
        return Err(AppError::TransactionLocked {
            id: transaction.id,
            reason: format!("listed in {} statement {}", status, summary_id),
        });
    }
    Ok(())
}

/// Apply `amount` (signed by the transaction's direction) to every balance
/// leg. With `check` set, legs losing money are verified first.
async fn apply_legs(
    tx: &mut LedgerTx,
    transaction: &Transaction,
    amount: Money,
    check: bool,
) -> Result<(), AppError> {
    for (product_id, delta) in transaction.balance_legs(amount) {
        let product = load_product(tx, product_id).await?;
        let pool = credit_pool(&product, transaction);

        if check && delta < Money::ZERO {
            let required = -delta;
            if let Some(pool) = pool {
                ensure_credit(&product, pool, required)?;
            } else if product.is_debit_card()
                || transaction.transaction_type == TransactionType::Transfer
            {
                let holder = balance_holder(tx, product.clone()).await?;
                ensure_funds(&holder, required)?;
            }
        }

        let mut holder = balance_holder(tx, product).await?;
        holder.apply_delta(delta, pool);
        tx.update_product(&holder).await?;
    }
    Ok(())
}

/// Limit pool a leg draws from: only expenses on credit cards consume limits.
fn credit_pool(product: &FinancialProduct, transaction: &Transaction) -> Option<LimitPool> {
    if product.is_credit_card() && transaction.transaction_type == TransactionType::Expense {
        Some(product.limits.pool_for(transaction.installment.is_some()))
    } else {
        None
    }
}

impl LedgerService {
    // ========================
    // Transaction operations
    // ========================

    /// Record an income or expense, split into installments when requested.
    pub async fn create_transaction(
        &self,
        owner: OwnerId,
        request: NewTransaction,
    ) -> Result<Vec<Transaction>, AppError> {
        let mut tx = self.begin(owner).await?;
        let rows = create(&mut tx, request).await?;
        tx.commit().await?;
        info!(%owner, transaction_id = %rows[0].id, rows = rows.len(), "transaction created");
        Ok(rows)
    }

    pub async fn update_transaction(
        &self,
        owner: OwnerId,
        id: TransactionId,
        changes: TransactionUpdate,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.begin(owner).await?;
        let updated = update(&mut tx, id, changes).await?;
        tx.commit().await?;
        info!(%owner, transaction_id = %id, "transaction updated");
        Ok(updated)
    }

    pub async fn delete_transaction(
        &self,
        owner: OwnerId,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.begin(owner).await?;
        let deleted = delete(&mut tx, id).await?;
        tx.commit().await?;
        info!(%owner, transaction_id = %id, "transaction deleted");
        Ok(deleted)
    }

    pub async fn record_transfer(
        &self,
        owner: OwnerId,
        request: NewTransfer,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.begin(owner).await?;
        let row = transfer(&mut tx, request).await?;
        tx.commit().await?;
        info!(%owner, transaction_id = %row.id, amount = %row.amount, "transfer recorded");
        Ok(row)
    }

    pub async fn get_transaction(
        &self,
        owner: OwnerId,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.begin(owner).await?;
        get(&mut tx, id).await
    }

    pub async fn list_transactions(
        &self,
        owner: OwnerId,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError> {
        let mut tx = self.begin(owner).await?;
        list(&mut tx, filter).await
    }

    pub async fn list_installment_group(
        &self,
        owner: OwnerId,
        group_id: InstallmentGroupId,
    ) -> Result<Vec<Transaction>, AppError> {
        let mut tx = self.begin(owner).await?;
        list_group(&mut tx, group_id).await
    }
}
