//! Catalog operations: categories, institutions and financial products.

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{
    Category, CategoryId, CategoryType, FinancialProduct, Institution, InstitutionId, LimitPool,
    Money, OwnerId, ProductId, ProductType, default_categories, is_valid_last_four,
    is_valid_month_day,
};
use crate::storage::LedgerTx;

use super::checks::{ensure_name, ensure_same_currency, load_product, validate_scale};
use super::{
    AppError, CategoryUpdate, InstitutionUpdate, LedgerService, NewCategory, NewInstitution,
    NewProduct, ProductUpdate,
};

/// A product with the credit still available on each tracked pool.
#[derive(Debug, Clone, Serialize)]
pub struct ProductInfo {
    pub product: FinancialProduct,
    /// Empty for products without tracked limits
    pub available_credit: Vec<(LimitPool, Money)>,
}

impl From<FinancialProduct> for ProductInfo {
    fn from(product: FinancialProduct) -> Self {
        let available_credit = if product.is_credit_card() && product.limits.is_tracked() {
            let pools: &[LimitPool] = if product.limits.unified {
                &[LimitPool::Unified]
            } else {
                &[LimitPool::SinglePayment, LimitPool::Installments]
            };
            pools
                .iter()
                .map(|pool| (*pool, product.available_credit(*pool)))
                .collect()
        } else {
            Vec::new()
        };
        Self {
            product,
            available_credit,
        }
    }
}

// ========================
// Categories
// ========================

pub async fn create_category(tx: &mut LedgerTx, request: NewCategory) -> Result<Category, AppError> {
    ensure_name(&request.name, "category")?;
    let category = Category::new(tx.owner(), request.name.trim().to_string(), request.category_type)
        .with_icon(request.icon);
    tx.insert_category(&category).await?;
    Ok(category)
}

pub async fn get_category(tx: &mut LedgerTx, id: CategoryId) -> Result<Category, AppError> {
    load_category(tx, id).await
}

pub async fn list_categories(
    tx: &mut LedgerTx,
    category_type: Option<CategoryType>,
) -> Result<Vec<Category>, AppError> {
    Ok(tx.list_categories(category_type).await?)
}

pub async fn update_category(
    tx: &mut LedgerTx,
    id: CategoryId,
    changes: CategoryUpdate,
) -> Result<Category, AppError> {
    let mut category = load_category(tx, id).await?;
    if category.is_system {
        return Err(AppError::SystemCategory(category.name));
    }
    if let Some(name) = changes.name {
        ensure_name(&name, "category")?;
        category.name = name.trim().to_string();
    }
    if changes.icon.is_some() {
        category.icon = changes.icon;
    }
    tx.update_category(&category).await?;
    Ok(category)
}

pub async fn delete_category(tx: &mut LedgerTx, id: CategoryId) -> Result<Category, AppError> {
    let category = load_category(tx, id).await?;
    if category.is_system {
        return Err(AppError::SystemCategory(category.name));
    }
    let usage = tx.count_category_usage(id).await?;
    if usage > 0 {
        return Err(AppError::CategoryInUse(format!(
            "{} is used by {} records",
            category.name, usage
        )));
    }
    tx.delete_category(id).await?;
    Ok(category)
}

/// Insert the default income and expense categories that do not exist yet.
pub async fn seed_default_categories(tx: &mut LedgerTx) -> Result<Vec<Category>, AppError> {
    let existing: Vec<String> = tx
        .list_categories(None)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();

    let seeded = default_categories(tx.owner(), &existing);
    for category in &seeded {
        tx.insert_category(category).await?;
    }
    debug!(seeded = seeded.len(), skipped = existing.len(), "seeded default categories");
    Ok(seeded)
}

async fn load_category(tx: &mut LedgerTx, id: CategoryId) -> Result<Category, AppError> {
    tx.get_category(id).await?.ok_or(AppError::CategoryNotFound(id))
}

// ========================
// Institutions
// ========================

pub async fn create_institution(
    tx: &mut LedgerTx,
    request: NewInstitution,
) -> Result<Institution, AppError> {
    ensure_name(&request.name, "institution")?;
    let institution = Institution::new(tx.owner(), request.name.trim().to_string(), request.institution_type)
        .with_share_summary(request.share_summary);
    tx.insert_institution(&institution).await?;
    Ok(institution)
}

pub async fn get_institution(tx: &mut LedgerTx, id: InstitutionId) -> Result<Institution, AppError> {
    load_institution(tx, id).await
}

pub async fn list_institutions(tx: &mut LedgerTx) -> Result<Vec<Institution>, AppError> {
    Ok(tx.list_institutions().await?)
}

pub async fn update_institution(
    tx: &mut LedgerTx,
    id: InstitutionId,
    changes: InstitutionUpdate,
) -> Result<Institution, AppError> {
    let mut institution = load_institution(tx, id).await?;
    if let Some(name) = changes.name {
        ensure_name(&name, "institution")?;
        institution.name = name.trim().to_string();
    }
    if let Some(share) = changes.share_summary {
        institution.share_summary = share;
    }
    tx.update_institution(&institution).await?;
    Ok(institution)
}

/// Delete an institution with all of its products. Debit cards go first so
/// that the accounts backing them can follow.
pub async fn delete_institution(
    tx: &mut LedgerTx,
    id: InstitutionId,
) -> Result<Institution, AppError> {
    let institution = load_institution(tx, id).await?;
    let mut products = tx.list_products(Some(id)).await?;
    products.sort_by_key(|p| !p.is_debit_card());

    for product in &products {
        let linked = tx.count_linked_cards(product.id).await?;
        if linked > 0 {
            debug!(product_id = %product.id, linked, "product still backs debit cards");
            return Err(AppError::ProductInUse(product.name.clone()));
        }
        tx.purge_product(product.id).await?;
    }
    tx.delete_institution(id).await?;
    debug!(institution_id = %id, products = products.len(), "institution purged");
    Ok(institution)
}

async fn load_institution(tx: &mut LedgerTx, id: InstitutionId) -> Result<Institution, AppError> {
    tx.get_institution(id)
        .await?
        .ok_or(AppError::InstitutionNotFound(id))
}

// ========================
// Products
// ========================

pub async fn create_product(
    tx: &mut LedgerTx,
    request: NewProduct,
) -> Result<FinancialProduct, AppError> {
    ensure_name(&request.name, "product")?;
    validate_scale(request.balance)?;

    let mut product = FinancialProduct::new(
        tx.owner(),
        request.name.trim().to_string(),
        request.product_type,
        request.currency,
    )
    .with_balance(request.balance)
    .with_limits(request.limits)
    .with_card(request.last_four_digits, request.provider);
    product.institution_id = request.institution_id;
    product.linked_product_id = request.linked_product_id;
    product.closing_day = request.closing_day;
    product.due_day = request.due_day;

    validate_product(tx, &product).await?;
    tx.insert_product(&product).await?;
    Ok(product)
}

pub async fn get_product(tx: &mut LedgerTx, id: ProductId) -> Result<ProductInfo, AppError> {
    Ok(load_product(tx, id).await?.into())
}

pub async fn list_products(
    tx: &mut LedgerTx,
    institution_id: Option<InstitutionId>,
) -> Result<Vec<FinancialProduct>, AppError> {
    Ok(tx.list_products(institution_id).await?)
}

/// Edit descriptive and credit-card fields. Balance only moves through
/// transactions.
pub async fn update_product(
    tx: &mut LedgerTx,
    id: ProductId,
    changes: ProductUpdate,
) -> Result<FinancialProduct, AppError> {
    let mut product = load_product(tx, id).await?;

    if let Some(name) = changes.name {
        ensure_name(&name, "product")?;
        product.name = name.trim().to_string();
    }
    if changes.institution_id.is_some() {
        product.institution_id = changes.institution_id;
    }
    if changes.linked_product_id.is_some() {
        product.linked_product_id = changes.linked_product_id;
    }
    if changes.closing_day.is_some() {
        product.closing_day = changes.closing_day;
    }
    if changes.due_day.is_some() {
        product.due_day = changes.due_day;
    }
    if let Some(limits) = changes.limits {
        product.limits = limits;
    }
    if changes.last_four_digits.is_some() {
        product.last_four_digits = changes.last_four_digits;
    }
    if changes.provider.is_some() {
        product.provider = changes.provider;
    }

    validate_product(tx, &product).await?;
    tx.update_product(&product).await?;
    Ok(product)
}

/// Delete a product with its statements and transactions. Rejected while
/// debit cards draw from it.
pub async fn delete_product(tx: &mut LedgerTx, id: ProductId) -> Result<FinancialProduct, AppError> {
    let product = load_product(tx, id).await?;
    let linked = tx.count_linked_cards(id).await?;
    if linked > 0 {
        debug!(product_id = %id, linked, "product still backs debit cards");
        return Err(AppError::ProductInUse(product.name));
    }
    tx.purge_product(id).await?;
    Ok(product)
}

async fn validate_product(tx: &mut LedgerTx, product: &FinancialProduct) -> Result<(), AppError> {
    if let Some(institution_id) = product.institution_id {
        load_institution(tx, institution_id).await?;
    }

    match product.product_type {
        ProductType::DebitCard => {
            let linked_id = product.linked_product_id.ok_or_else(|| {
                AppError::InvalidProduct(format!(
                    "debit card {} needs a linked savings or checking account",
                    product.name
                ))
            })?;
            let linked = load_product(tx, linked_id).await?;
            if !linked.product_type.can_back_debit_card() {
                return Err(AppError::InvalidProduct(format!(
                    "{} is a {}, debit cards draw from savings or checking accounts",
                    linked.name, linked.product_type
                )));
            }
            ensure_same_currency(product, &linked)?;
        }
        _ if product.linked_product_id.is_some() => {
            return Err(AppError::InvalidProduct(format!(
                "only debit cards can link to an account, {} is a {}",
                product.name, product.product_type
            )));
        }
        _ => {}
    }

    if product.is_credit_card() {
        let (closing_day, due_day) = product.billing_days().ok_or_else(|| {
            AppError::MissingBillingCycle(product.name.clone())
        })?;
        for day in [closing_day, due_day] {
            if !is_valid_month_day(day) {
                return Err(AppError::InvalidDay(day));
            }
        }
        for limit in [
            product.limits.limit_amount,
            product.limits.limit_single_payment,
            product.limits.limit_installments,
        ]
        .into_iter()
        .flatten()
        {
            validate_scale(limit)?;
        }
    } else if product.closing_day.is_some()
        || product.due_day.is_some()
        || product.limits.is_tracked()
    {
        return Err(AppError::InvalidProduct(format!(
            "billing cycle and credit limits apply only to credit cards, {} is a {}",
            product.name, product.product_type
        )));
    }

    if let Some(digits) = &product.last_four_digits {
        if !is_valid_last_four(digits) {
            return Err(AppError::InvalidInput(format!(
                "last four digits must be exactly 4 digits, got '{}'",
                digits
            )));
        }
    }
    Ok(())
}

impl LedgerService {
    // ========================
    // Category operations
    // ========================

    pub async fn create_category(
        &self,
        owner: OwnerId,
        request: NewCategory,
    ) -> Result<Category, AppError> {
        let mut tx = self.begin(owner).await?;
        let category = create_category(&mut tx, request).await?;
        tx.commit().await?;
        info!(%owner, category_id = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    pub async fn get_category(&self, owner: OwnerId, id: CategoryId) -> Result<Category, AppError> {
        let mut tx = self.begin(owner).await?;
        get_category(&mut tx, id).await
    }

    pub async fn list_categories(
        &self,
        owner: OwnerId,
        category_type: Option<CategoryType>,
    ) -> Result<Vec<Category>, AppError> {
        let mut tx = self.begin(owner).await?;
        list_categories(&mut tx, category_type).await
    }

    pub async fn update_category(
        &self,
        owner: OwnerId,
        id: CategoryId,
        changes: CategoryUpdate,
    ) -> Result<Category, AppError> {
        let mut tx = self.begin(owner).await?;
        let category = update_category(&mut tx, id, changes).await?;
        tx.commit().await?;
        info!(%owner, category_id = %id, "category updated");
        Ok(category)
    }

    pub async fn delete_category(&self, owner: OwnerId, id: CategoryId) -> Result<Category, AppError> {
        let mut tx = self.begin(owner).await?;
        let category = delete_category(&mut tx, id).await?;
        tx.commit().await?;
        info!(%owner, category_id = %id, "category deleted");
        Ok(category)
    }

    pub async fn seed_default_categories(&self, owner: OwnerId) -> Result<Vec<Category>, AppError> {
        let mut tx = self.begin(owner).await?;
        let seeded = seed_default_categories(&mut tx).await?;
        tx.commit().await?;
        info!(%owner, seeded = seeded.len(), "default categories seeded");
        Ok(seeded)
    }

    // ========================
    // Institution operations
    // ========================

    pub async fn create_institution(
        &self,
        owner: OwnerId,
        request: NewInstitution,
    ) -> Result<Institution, AppError> {
        let mut tx = self.begin(owner).await?;
        let institution = create_institution(&mut tx, request).await?;
        tx.commit().await?;
        info!(%owner, institution_id = %institution.id, name = %institution.name, "institution created");
        Ok(institution)
    }

    pub async fn get_institution(
        &self,
        owner: OwnerId,
        id: InstitutionId,
    ) -> Result<Institution, AppError> {
        let mut tx = self.begin(owner).await?;
        get_institution(&mut tx, id).await
    }

    pub async fn list_institutions(&self, owner: OwnerId) -> Result<Vec<Institution>, AppError> {
        let mut tx = self.begin(owner).await?;
        list_institutions(&mut tx).await
    }

    pub async fn update_institution(
        &self,
        owner: OwnerId,
        id: InstitutionId,
        changes: InstitutionUpdate,
    ) -> Result<Institution, AppError> {
        let mut tx = self.begin(owner).await?;
        let institution = update_institution(&mut tx, id, changes).await?;
        tx.commit().await?;
        info!(%owner, institution_id = %id, "institution updated");
        Ok(institution)
    }

    pub async fn delete_institution(
        &self,
        owner: OwnerId,
        id: InstitutionId,
    ) -> Result<Institution, AppError> {
        let mut tx = self.begin(owner).await?;
        let institution = delete_institution(&mut tx, id).await?;
        tx.commit().await?;
        info!(%owner, institution_id = %id, "institution deleted");
        Ok(institution)
    }

    // ========================
    // Product operations
    // ========================

    pub async fn create_product(
        &self,
        owner: OwnerId,
        request: NewProduct,
    ) -> Result<FinancialProduct, AppError> {
        let mut tx = self.begin(owner).await?;
        let product = create_product(&mut tx, request).await?;
        tx.commit().await?;
        info!(
            %owner,
            product_id = %product.id,
            product_type = %product.product_type,
            "product created"
        );
        Ok(product)
    }

    pub async fn get_product(&self, owner: OwnerId, id: ProductId) -> Result<ProductInfo, AppError> {
        let mut tx = self.begin(owner).await?;
        get_product(&mut tx, id).await
    }

    pub async fn list_products(
        &self,
        owner: OwnerId,
        institution_id: Option<InstitutionId>,
    ) -> Result<Vec<FinancialProduct>, AppError> {
        let mut tx = self.begin(owner).await?;
        list_products(&mut tx, institution_id).await
    }

    pub async fn update_product(
        &self,
        owner: OwnerId,
        id: ProductId,
        changes: ProductUpdate,
    ) -> Result<FinancialProduct, AppError> {
        let mut tx = self.begin(owner).await?;
        let product = update_product(&mut tx, id, changes).await?;
        tx.commit().await?;
        info!(%owner, product_id = %id, "product updated");
        Ok(product)
    }

    pub async fn delete_product(
        &self,
        owner: OwnerId,
        id: ProductId,
    ) -> Result<FinancialProduct, AppError> {
        let mut tx = self.begin(owner).await?;
        let product = delete_product(&mut tx, id).await?;
        tx.commit().await?;
        info!(%owner, product_id = %id, "product deleted");
        Ok(product)
    }
}
