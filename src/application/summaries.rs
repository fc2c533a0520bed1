//! Statement engine: builds monthly credit-card statements from the card's
//! expenses and settles them.
//!
//! Lifecycle: `draft -> closed -> paid`. Drafts follow their billing window on
//! every generation; closed and paid statements keep their items frozen.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    AdjustmentId, BillingCycle, CreditCardSummary, FinancialProduct, Installment, Money,
    OwnerId, PLAN_Z_INSTALLMENTS, ProductId, SummaryAdjustment, SummaryId, SummaryItem,
    SummaryStatus, SummaryTotals, Transaction, TransactionId, installment_schedule,
    plan_z_description, reconcile_items, year_month,
};
use crate::storage::LedgerTx;

use super::checks::{
    balance_holder, ensure_funding_product, ensure_funds, ensure_period, ensure_same_currency,
    load_product, load_transaction, validate_amount,
};
use super::{AppError, LedgerService, NewAdjustment};

/// A statement with its items and adjustments.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryDetail {
    pub summary: CreditCardSummary,
    pub items: Vec<SummaryItem>,
    pub adjustments: Vec<SummaryAdjustment>,
}

/// A plan-z purchase replaced by three monthly parts.
#[derive(Debug, Clone, Serialize)]
pub struct PlanZRestructure {
    pub original_transaction_id: TransactionId,
    pub original_amount: Money,
    pub parts: Vec<Transaction>,
}

/// Outcome of paying a statement.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub summary: CreditCardSummary,
    /// Transfer from the funding product to the card; absent for
    /// statements with nothing to pay
    pub payment: Option<Transaction>,
    /// Ledger records of the positive adjustments
    pub adjustment_expenses: Vec<Transaction>,
    pub restructured: Vec<PlanZRestructure>,
    /// Plan-z debt moved to later statements
    pub deferred_amount: Money,
}

/// Get or create the statement of `product_id` for a month and, while it is
/// a draft, recompute it from the billing window.
pub async fn generate(
    tx: &mut LedgerTx,
    product_id: ProductId,
    year: i32,
    month: u32,
) -> Result<CreditCardSummary, AppError> {
    ensure_period(year, month)?;
    let card = load_product(tx, product_id).await?;
    let cycle = billing_cycle(&card, year, month)?;

    let mut summary = match tx.get_summary_for_period(card.id, year, month).await? {
        Some(existing) => existing,
        None => {
            let fresh = CreditCardSummary::new(tx.owner(), card.id, card.institution_id, &cycle);
            tx.insert_summary_if_absent(&fresh).await?
        }
    };

    if summary.status.is_frozen() {
        return Ok(summary);
    }

    let expenses = tx
        .expenses_between(card.id, cycle.opens_after, cycle.closing_date)
        .await?;
    let in_window: Vec<(TransactionId, Money)> =
        expenses.iter().map(|t| (t.id, t.amount)).collect();
    let items = tx.list_summary_items(summary.id).await?;
    let plan = reconcile_items(&items, &in_window);

    if !plan.is_noop() {
        debug!(
            summary_id = %summary.id,
            inserted = plan.insert.len(),
            updated = plan.update.len(),
            removed = plan.remove.len(),
            "reconciling statement items"
        );
    }

    for item_id in &plan.remove {
        tx.delete_summary_item(*item_id).await?;
    }
    for (item_id, amount) in &plan.update {
        tx.update_summary_item_amount(*item_id, *amount).await?;
    }
    for (transaction_id, amount) in &plan.insert {
        tx.insert_summary_item(&SummaryItem::new(summary.id, *transaction_id, *amount))
            .await?;
    }

    let adjustments = tx.list_adjustments(summary.id).await?;
    summary.apply_totals(SummaryTotals::compute(
        [plan.calculated_amount],
        adjustments.iter().map(|a| a.amount),
    ));
    tx.update_summary(&summary).await?;
    Ok(summary)
}

/// Statement for the month containing `as_of`.
pub async fn current(
    tx: &mut LedgerTx,
    product_id: ProductId,
    as_of: DateTime<Utc>,
) -> Result<CreditCardSummary, AppError> {
    let (year, month) = year_month(as_of);
    generate(tx, product_id, year, month).await
}

pub async fn add_adjustment(
    tx: &mut LedgerTx,
    summary_id: SummaryId,
    request: NewAdjustment,
) -> Result<SummaryAdjustment, AppError> {
    validate_amount(request.amount)?;
    let mut summary = load_summary(tx, summary_id).await?;
    ensure_unpaid(&summary)?;

    let adjustment = SummaryAdjustment::new(
        summary.id,
        request.adjustment_type,
        request.description,
        request.amount,
    );
    tx.insert_adjustment(&adjustment).await?;
    refresh_totals(tx, &mut summary).await?;
    Ok(adjustment)
}

pub async fn delete_adjustment(
    tx: &mut LedgerTx,
    summary_id: SummaryId,
    adjustment_id: AdjustmentId,
) -> Result<CreditCardSummary, AppError> {
    let mut summary = load_summary(tx, summary_id).await?;
    ensure_unpaid(&summary)?;

    match tx.get_adjustment(adjustment_id).await? {
        Some(adjustment) if adjustment.summary_id == summary.id => {}
        _ => return Err(AppError::AdjustmentNotFound(adjustment_id)),
    }
    tx.delete_adjustment(adjustment_id).await?;
    refresh_totals(tx, &mut summary).await?;
    Ok(summary)
}

pub async fn close(tx: &mut LedgerTx, summary_id: SummaryId) -> Result<CreditCardSummary, AppError> {
    let mut summary = load_summary(tx, summary_id).await?;
    if summary.status != SummaryStatus::Draft {
        return Err(AppError::InvalidStatusTransition {
            entity: "summary",
            from: summary.status.to_string(),
            to: SummaryStatus::Closed.to_string(),
        });
    }
    summary.status = SummaryStatus::Closed;
    tx.update_summary(&summary).await?;
    Ok(summary)
}

/// Pay a statement from a non-credit product.
///
/// Plan-z purchases are first restructured into three monthly parts, only the
/// first of which stays on this statement. The total is then transferred from
/// the funding product to the card and the statement is marked paid.
pub async fn pay(
    tx: &mut LedgerTx,
    summary_id: SummaryId,
    funding_product_id: ProductId,
    payment_date: Option<DateTime<Utc>>,
) -> Result<PaymentReceipt, AppError> {
    let mut summary = load_summary(tx, summary_id).await?;
    ensure_unpaid(&summary)?;

    let mut card = load_product(tx, summary.product_id).await?;
    let funding_product = load_product(tx, funding_product_id).await?;
    ensure_funding_product(&funding_product)?;
    let mut funding = balance_holder(tx, funding_product.clone()).await?;
    ensure_same_currency(&funding, &card)?;

    let (restructured, deferred_amount) = restructure_plan_z(tx, &summary, &mut card).await?;

    refresh_totals(tx, &mut summary).await?;
    let total = summary.total_amount;
    let paid_at = payment_date.unwrap_or_else(Utc::now);
    let label = format!("{} {}-{:02}", card.name, summary.year, summary.month);

    let payment = if total > Money::ZERO {
        ensure_funds(&funding, total)?;
        let transfer = Transaction::transfer(
            tx.owner(),
            funding_product.id,
            card.id,
            total,
            paid_at,
            format!("Statement payment {}", label),
        )
        .with_statement(summary.id);
        tx.insert_transaction(&transfer).await?;

        funding.apply_delta(-total, None);
        card.apply_delta(total, None);
        tx.update_product(&funding).await?;
        tx.update_product(&card).await?;
        Some(transfer)
    } else {
        None
    };

    let mut adjustment_expenses = Vec::new();
    for adjustment in tx.list_adjustments(summary.id).await? {
        if adjustment.amount <= Money::ZERO {
            continue;
        }
        let expense = Transaction::expense(
            tx.owner(),
            funding_product.id,
            adjustment.amount,
            paid_at,
            format!("{} ({}) {}", adjustment.description, adjustment.adjustment_type, label),
        )
        .with_statement(summary.id);
        tx.insert_transaction(&expense).await?;
        adjustment_expenses.push(expense);
    }

    summary.status = SummaryStatus::Paid;
    summary.paid_date = Some(paid_at);
    summary.paid_from_product_id = Some(funding_product.id);
    summary.payment_transaction_id = payment.as_ref().map(|t| t.id);
    tx.update_summary(&summary).await?;

    Ok(PaymentReceipt {
        summary,
        payment,
        adjustment_expenses,
        restructured,
        deferred_amount,
    })
}

/// Replace each plan-z item of `summary` with three monthly expenses.
/// The balance is untouched: the debt is only re-timed. On split limits the
/// consumed credit follows the parts into the installment pool.
async fn restructure_plan_z(
    tx: &mut LedgerTx,
    summary: &CreditCardSummary,
    card: &mut FinancialProduct,
) -> Result<(Vec<PlanZRestructure>, Money), AppError> {
    let mut restructured = Vec::new();
    let mut deferred = Money::ZERO;
    let parts_pool = card.limits.pool_for(true);
    let mut limits_moved = false;

    for item in tx.list_summary_items(summary.id).await? {
        let original = load_transaction(tx, item.transaction_id).await?;
        if !original.plan_z {
            continue;
        }

        let schedule = installment_schedule(original.amount, PLAN_Z_INSTALLMENTS, original.date)
            .ok_or_else(|| AppError::InvalidDate(original.date.to_rfc3339()))?;
        let group_id = Uuid::new_v4();
        let parts: Vec<Transaction> = schedule
            .into_iter()
            .map(|slot| {
                Transaction::expense(
                    tx.owner(),
                    card.id,
                    slot.amount,
                    slot.date,
                    plan_z_description(&original.description, slot.number),
                )
                .with_category(original.category_id)
                .with_installment(Installment {
                    group_id,
                    number: slot.number,
                    total: PLAN_Z_INSTALLMENTS,
                })
            })
            .collect();

        for part in &parts {
            tx.insert_transaction(part).await?;
        }
        let first = &parts[0];
        tx.delete_items_for_transaction(original.id).await?;
        tx.insert_summary_item(&SummaryItem::new(summary.id, first.id, first.amount))
            .await?;
        tx.delete_transaction(original.id).await?;

        let original_pool = card.limits.pool_for(original.installment.is_some());
        if original_pool != parts_pool {
            card.move_limit_usage(original.amount, original_pool, parts_pool);
            limits_moved = true;
        }

        deferred += original.amount - first.amount;
        debug!(
            summary_id = %summary.id,
            original_id = %original.id,
            group_id = %group_id,
            "plan z restructured"
        );
        restructured.push(PlanZRestructure {
            original_transaction_id: original.id,
            original_amount: original.amount,
            parts,
        });
    }

    if limits_moved {
        tx.update_product(card).await?;
    }
    Ok((restructured, deferred))
}

/// Back to an empty draft.
pub async fn reset(tx: &mut LedgerTx, summary_id: SummaryId) -> Result<CreditCardSummary, AppError> {
    let mut summary = load_summary(tx, summary_id).await?;
    ensure_unpaid(&summary)?;

    tx.delete_summary_items(summary.id).await?;
    tx.delete_adjustments(summary.id).await?;
    summary.apply_totals(SummaryTotals::default());
    summary.status = SummaryStatus::Draft;
    tx.update_summary(&summary).await?;
    Ok(summary)
}

pub async fn detail(tx: &mut LedgerTx, summary_id: SummaryId) -> Result<SummaryDetail, AppError> {
    let summary = load_summary(tx, summary_id).await?;
    let items = tx.list_summary_items(summary.id).await?;
    let adjustments = tx.list_adjustments(summary.id).await?;
    Ok(SummaryDetail {
        summary,
        items,
        adjustments,
    })
}

pub async fn list(
    tx: &mut LedgerTx,
    product_id: ProductId,
    status: Option<SummaryStatus>,
) -> Result<Vec<CreditCardSummary>, AppError> {
    load_product(tx, product_id).await?;
    Ok(tx.list_summaries(product_id, status).await?)
}

pub(crate) fn billing_cycle(
    card: &FinancialProduct,
    year: i32,
    month: u32,
) -> Result<BillingCycle, AppError> {
    if !card.is_credit_card() {
        return Err(AppError::Unsupported(format!(
            "{} is a {}, statements exist only for credit cards",
            card.name, card.product_type
        )));
    }
    let (closing_day, due_day) = card
        .billing_days()
        .ok_or_else(|| AppError::MissingBillingCycle(card.name.clone()))?;
    BillingCycle::new(year, month, closing_day, due_day).ok_or(AppError::InvalidPeriod { year, month })
}

async fn load_summary(tx: &mut LedgerTx, id: SummaryId) -> Result<CreditCardSummary, AppError> {
    tx.get_summary(id).await?.ok_or(AppError::SummaryNotFound(id))
}

fn ensure_unpaid(summary: &CreditCardSummary) -> Result<(), AppError> {
    if summary.is_paid() {
        return Err(AppError::AlreadyPaid(format!(
            "statement {}-{:02} ({})",
            summary.year, summary.month, summary.id
        )));
    }
    Ok(())
}

/// Recompute totals from the stored items and adjustments.
async fn refresh_totals(tx: &mut LedgerTx, summary: &mut CreditCardSummary) -> Result<(), AppError> {
    let items = tx.list_summary_items(summary.id).await?;
    let adjustments = tx.list_adjustments(summary.id).await?;
    summary.apply_totals(SummaryTotals::compute(
        items.iter().map(|i| i.amount),
        adjustments.iter().map(|a| a.amount),
    ));
    tx.update_summary(summary).await?;
    Ok(())
}

impl LedgerService {
    // ========================
    // Statement operations
    // ========================

    pub async fn generate_summary(
        &self,
        owner: OwnerId,
        product_id: ProductId,
        year: i32,
        month: u32,
    ) -> Result<CreditCardSummary, AppError> {
        let mut tx = self.begin(owner).await?;
        let summary = generate(&mut tx, product_id, year, month).await?;
        tx.commit().await?;
        info!(%owner, summary_id = %summary.id, total = %summary.total_amount, "statement generated");
        Ok(summary)
    }

    pub async fn current_summary(
        &self,
        owner: OwnerId,
        product_id: ProductId,
        as_of: DateTime<Utc>,
    ) -> Result<CreditCardSummary, AppError> {
        let mut tx = self.begin(owner).await?;
        let summary = current(&mut tx, product_id, as_of).await?;
        tx.commit().await?;
        Ok(summary)
    }

    pub async fn add_summary_adjustment(
        &self,
        owner: OwnerId,
        summary_id: SummaryId,
        request: NewAdjustment,
    ) -> Result<SummaryAdjustment, AppError> {
        let mut tx = self.begin(owner).await?;
        let adjustment = add_adjustment(&mut tx, summary_id, request).await?;
        tx.commit().await?;
        info!(%owner, %summary_id, adjustment_id = %adjustment.id, "adjustment added");
        Ok(adjustment)
    }

    pub async fn delete_summary_adjustment(
        &self,
        owner: OwnerId,
        summary_id: SummaryId,
        adjustment_id: AdjustmentId,
    ) -> Result<CreditCardSummary, AppError> {
        let mut tx = self.begin(owner).await?;
        let summary = delete_adjustment(&mut tx, summary_id, adjustment_id).await?;
        tx.commit().await?;
        info!(%owner, %summary_id, %adjustment_id, "adjustment deleted");
        Ok(summary)
    }

    pub async fn close_summary(
        &self,
        owner: OwnerId,
        summary_id: SummaryId,
    ) -> Result<CreditCardSummary, AppError> {
        let mut tx = self.begin(owner).await?;
        let summary = close(&mut tx, summary_id).await?;
        tx.commit().await?;
        info!(%owner, %summary_id, "statement closed");
        Ok(summary)
    }

    pub async fn pay_summary(
        &self,
        owner: OwnerId,
        summary_id: SummaryId,
        funding_product_id: ProductId,
        payment_date: Option<DateTime<Utc>>,
    ) -> Result<PaymentReceipt, AppError> {
        let mut tx = self.begin(owner).await?;
        let receipt = pay(&mut tx, summary_id, funding_product_id, payment_date).await?;
        tx.commit().await?;
        info!(
            %owner,
            %summary_id,
            total = %receipt.summary.total_amount,
            restructured = receipt.restructured.len(),
            "statement paid"
        );
        Ok(receipt)
    }

    pub async fn reset_summary(
        &self,
        owner: OwnerId,
        summary_id: SummaryId,
    ) -> Result<CreditCardSummary, AppError> {
        let mut tx = self.begin(owner).await?;
        let summary = reset(&mut tx, summary_id).await?;
        tx.commit().await?;
        info!(%owner, %summary_id, "statement reset");
        Ok(summary)
    }

    pub async fn get_summary(
        &self,
        owner: OwnerId,
        summary_id: SummaryId,
    ) -> Result<SummaryDetail, AppError> {
        let mut tx = self.begin(owner).await?;
        detail(&mut tx, summary_id).await
    }

    pub async fn list_summaries(
        &self,
        owner: OwnerId,
        product_id: ProductId,
        status: Option<SummaryStatus>,
    ) -> Result<Vec<CreditCardSummary>, AppError> {
        let mut tx = self.begin(owner).await?;
        list(&mut tx, product_id, status).await
    }
}
