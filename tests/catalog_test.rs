mod common;

use anyhow::Result;
use banquito::application::{
    AppError, CategoryUpdate, InstitutionUpdate, NewCategory, NewInstitution, NewProduct,
    NewService, NewTransaction, ProductUpdate,
};
use banquito::domain::{
    CardProvider, CategoryType, CreditLimits, Currency, DEFAULT_CATEGORIES, InstitutionType,
    LimitPool, ProductType,
};
use common::{Fixture, at_noon, test_service};
use rust_decimal_macros::dec;

fn category(name: &str, category_type: CategoryType) -> NewCategory {
    NewCategory {
        name: name.into(),
        icon: None,
        category_type,
    }
}

// ========================
// Categories
// ========================

#[tokio::test]
async fn test_category_names_are_unique_per_owner() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let other = Fixture::new(&service).await?;

    service
        .create_category(fx.owner, category("Pets", CategoryType::Expense))
        .await?;
    let err = service
        .create_category(fx.owner, category("Pets", CategoryType::Expense))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    // Another owner may reuse the name
    service
        .create_category(other.owner, category("Pets", CategoryType::Expense))
        .await?;

    let err = service
        .create_category(fx.owner, category("   ", CategoryType::Income))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    Ok(())
}

#[tokio::test]
async fn test_seed_skips_existing_and_protects_system_categories() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;

    service
        .create_category(fx.owner, category("Food", CategoryType::Expense))
        .await?;
    let seeded = service.seed_default_categories(fx.owner).await?;
    assert_eq!(seeded.len(), DEFAULT_CATEGORIES.len() - 1);
    assert!(seeded.iter().all(|c| c.is_system));

    // Seeding twice adds nothing
    assert!(service.seed_default_categories(fx.owner).await?.is_empty());

    let income = service
        .list_categories(fx.owner, Some(CategoryType::Income))
        .await?;
    assert_eq!(income.len(), 4);

    let salary = income.iter().find(|c| c.name == "Salary").unwrap();
    let err = service
        .update_category(
            fx.owner,
            salary.id,
            CategoryUpdate {
                name: Some("Wages".into()),
                ..CategoryUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SystemCategory(_)));
    let err = service.delete_category(fx.owner, salary.id).await.unwrap_err();
    assert!(matches!(err, AppError::SystemCategory(_)));
    Ok(())
}

#[tokio::test]
async fn test_category_in_use_cannot_be_deleted() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let cash = fx.cash(&service, dec!(100)).await?;

    let books = service
        .create_category(fx.owner, category("Books", CategoryType::Expense))
        .await?;
    let renamed = service
        .update_category(
            fx.owner,
            books.id,
            CategoryUpdate {
                name: Some("Reading".into()),
                icon: Some("📖".into()),
            },
        )
        .await?;
    assert_eq!(renamed.name, "Reading");

    let created = service
        .create_transaction(
            fx.owner,
            NewTransaction::expense(cash.id, dec!(15), at_noon("2024-03-01"), "Novel")
                .with_category(books.id),
        )
        .await?;

    let err = service.delete_category(fx.owner, books.id).await.unwrap_err();
    assert!(matches!(err, AppError::CategoryInUse(_)));

    service.delete_transaction(fx.owner, created[0].id).await?;

    // Services count as usage too
    service
        .create_service(
            fx.owner,
            NewService {
                name: "Library".into(),
                category_id: Some(books.id),
                default_amount: None,
                default_due_day: None,
            },
        )
        .await?;
    let err = service.delete_category(fx.owner, books.id).await.unwrap_err();
    assert!(matches!(err, AppError::CategoryInUse(_)));

    let spare = service
        .create_category(fx.owner, category("Spare", CategoryType::Expense))
        .await?;
    service.delete_category(fx.owner, spare.id).await?;
    assert!(matches!(
        service.get_category(fx.owner, spare.id).await,
        Err(AppError::CategoryNotFound(_))
    ));
    Ok(())
}

// ========================
// Institutions
// ========================

#[tokio::test]
async fn test_institution_crud() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;

    let err = service
        .create_institution(
            fx.owner,
            NewInstitution {
                name: "Banco Norte".into(),
                institution_type: InstitutionType::Bank,
                share_summary: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    let wallet = service
        .create_institution(
            fx.owner,
            NewInstitution {
                name: "PayWallet".into(),
                institution_type: InstitutionType::Wallet,
                share_summary: false,
            },
        )
        .await?;
    let updated = service
        .update_institution(
            fx.owner,
            wallet.id,
            InstitutionUpdate {
                share_summary: Some(true),
                ..InstitutionUpdate::default()
            },
        )
        .await?;
    assert!(updated.share_summary);
    assert_eq!(updated.name, "PayWallet");

    assert_eq!(service.list_institutions(fx.owner).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_delete_institution_removes_its_products() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let savings = fx.savings(&service, dec!(500)).await?;
    let debit = fx.debit_card(&service, &savings).await?;
    let card = fx.credit_card(&service, CreditLimits::default()).await?;
    let cash = fx.cash(&service, dec!(10)).await?;

    service
        .create_transaction(
            fx.owner,
            NewTransaction::expense(debit.id, dec!(20), at_noon("2024-03-01"), "Coffee"),
        )
        .await?;
    service
        .create_transaction(
            fx.owner,
            NewTransaction::expense(card.id, dec!(60), at_noon("2024-03-02"), "Shoes"),
        )
        .await?;
    service.generate_summary(fx.owner, card.id, 2024, 3).await?;

    service.delete_institution(fx.owner, fx.bank).await?;

    assert!(matches!(
        service.get_institution(fx.owner, fx.bank).await,
        Err(AppError::InstitutionNotFound(_))
    ));
    for product in [&savings, &debit, &card] {
        assert!(matches!(
            service.get_product(fx.owner, product.id).await,
            Err(AppError::ProductNotFound(_))
        ));
    }
    // Products outside the institution stay
    let remaining = service.list_products(fx.owner, None).await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, cash.id);
    assert!(
        service
            .list_transactions(fx.owner, &Default::default())
            .await?
            .is_empty()
    );
    Ok(())
}

// ========================
// Products
// ========================

#[tokio::test]
async fn test_product_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let savings = fx.savings(&service, dec!(0)).await?;
    let cash = fx.cash(&service, dec!(0)).await?;

    // Debit cards need a savings or checking account
    let err = service
        .create_product(fx.owner, NewProduct::new("Debit", ProductType::DebitCard, Currency::Usd))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidProduct(_)));

    let err = service
        .create_product(
            fx.owner,
            NewProduct::new("Debit", ProductType::DebitCard, Currency::Usd)
                .with_linked_product(cash.id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidProduct(_)));

    let err = service
        .create_product(
            fx.owner,
            NewProduct::new("Debit", ProductType::DebitCard, Currency::Ars)
                .with_linked_product(savings.id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CurrencyMismatch { .. }));

    // Credit cards need a billing cycle
    let err = service
        .create_product(fx.owner, NewProduct::new("Amex", ProductType::CreditCard, Currency::Usd))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingBillingCycle(_)));

    let err = service
        .create_product(
            fx.owner,
            NewProduct::new("Amex", ProductType::CreditCard, Currency::Usd).with_billing_cycle(0, 10),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidDay(0)));

    // Billing fields belong to credit cards only
    let err = service
        .create_product(
            fx.owner,
            NewProduct::new("Checking", ProductType::CheckingAccount, Currency::Usd)
                .with_billing_cycle(25, 10),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidProduct(_)));

    let err = service
        .create_product(
            fx.owner,
            NewProduct::new("Amex", ProductType::CreditCard, Currency::Usd)
                .with_billing_cycle(25, 10)
                .with_card("12a4", CardProvider::Amex),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = service
        .create_product(
            fx.owner,
            NewProduct::new("Amex", ProductType::CreditCard, Currency::Usd)
                .with_billing_cycle(25, 10)
                .with_limits(CreditLimits::unified(dec!(100.005))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let amex = service
        .create_product(
            fx.owner,
            NewProduct::new("Amex", ProductType::CreditCard, Currency::Usd)
                .with_institution(fx.bank)
                .with_billing_cycle(25, 10)
                .with_card("1234", CardProvider::Amex),
        )
        .await?;
    assert_eq!(amex.last_four_digits.as_deref(), Some("1234"));
    Ok(())
}

#[tokio::test]
async fn test_product_info_reports_available_credit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let card = fx
        .credit_card(&service, CreditLimits::split(dec!(1000), dec!(2000)))
        .await?;

    service
        .create_transaction(
            fx.owner,
            NewTransaction::expense(card.id, dec!(250), at_noon("2024-03-01"), "Tickets"),
        )
        .await?;

    let info = service.get_product(fx.owner, card.id).await?;
    assert_eq!(info.product.balance, dec!(-250));
    assert_eq!(
        info.available_credit,
        vec![
            (LimitPool::SinglePayment, dec!(500)),
            (LimitPool::Installments, dec!(1750)),
        ]
    );

    let cash = fx.cash(&service, dec!(5)).await?;
    assert!(service.get_product(fx.owner, cash.id).await?.available_credit.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_update_and_delete_product() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let savings = fx.savings(&service, dec!(300)).await?;
    let debit = fx.debit_card(&service, &savings).await?;
    let card = fx.credit_card(&service, CreditLimits::default()).await?;

    let updated = service
        .update_product(
            fx.owner,
            card.id,
            ProductUpdate {
                name: Some("Visa Gold".into()),
                closing_day: Some(20),
                limits: Some(CreditLimits::unified(dec!(5000))),
                ..ProductUpdate::default()
            },
        )
        .await?;
    assert_eq!(updated.name, "Visa Gold");
    assert_eq!(updated.closing_day, Some(20));
    assert_eq!(updated.due_day, Some(10));
    assert_eq!(updated.balance, dec!(0));

    let err = service
        .update_product(
            fx.owner,
            savings.id,
            ProductUpdate {
                due_day: Some(5),
                ..ProductUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidProduct(_)));

    let err = service.delete_product(fx.owner, savings.id).await.unwrap_err();
    assert!(matches!(err, AppError::ProductInUse(_)));

    service.delete_product(fx.owner, debit.id).await?;
    service.delete_product(fx.owner, savings.id).await?;
    assert!(matches!(
        service.get_product(fx.owner, savings.id).await,
        Err(AppError::ProductNotFound(_))
    ));
    Ok(())
}
