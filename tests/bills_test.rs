mod common;

use anyhow::Result;
use banquito::application::{
    AppError, BillFilter, BillPayment, BillUpdate, NewBill, NewCategory, NewService, ServiceUpdate,
};
use banquito::domain::{BillStatus, CategoryType};
use chrono::NaiveDate;
use common::{Fixture, at_noon, test_service};
use rust_decimal_macros::dec;

fn service_request(name: &str, amount: Option<rust_decimal::Decimal>, due_day: Option<u32>) -> NewService {
    NewService {
        name: name.into(),
        category_id: None,
        default_amount: amount,
        default_due_day: due_day,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_monthly_bills_are_created_once() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;

    service
        .create_service(fx.owner, service_request("Electricity", Some(dec!(80)), Some(15)))
        .await?;
    service
        .create_service(fx.owner, service_request("Rent", Some(dec!(900)), Some(31)))
        .await?;

    let first = service.get_or_create_monthly_bills(fx.owner, 2024, 2).await?;
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|b| b.status == BillStatus::Pending));

    // Ordered by due date; day 31 clamps to the end of February
    assert_eq!(first[0].due_date, date(2024, 2, 15));
    assert_eq!(first[0].amount, dec!(80));
    assert_eq!(first[1].due_date, date(2024, 2, 29));
    assert_eq!(first[1].amount, dec!(900));

    let second = service.get_or_create_monthly_bills(fx.owner, 2024, 2).await?;
    let first_ids: Vec<_> = first.iter().map(|b| b.id).collect();
    let second_ids: Vec<_> = second.iter().map(|b| b.id).collect();
    assert_eq!(first_ids, second_ids);
    Ok(())
}

#[tokio::test]
async fn test_monthly_bills_skip_inactive_services() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;

    let gym = service
        .create_service(fx.owner, service_request("Gym", Some(dec!(30)), None))
        .await?;
    service
        .create_service(fx.owner, service_request("Internet", None, None))
        .await?;
    service
        .update_service(
            fx.owner,
            gym.id,
            ServiceUpdate {
                is_active: Some(false),
                ..ServiceUpdate::default()
            },
        )
        .await?;

    let bills = service.get_or_create_monthly_bills(fx.owner, 2024, 5).await?;
    assert_eq!(bills.len(), 1);
    // No defaults: amount zero, due mid-month
    assert_eq!(bills[0].amount, dec!(0));
    assert_eq!(bills[0].due_date, date(2024, 5, 15));

    let active = service.list_services(fx.owner, true).await?;
    assert_eq!(active.len(), 1);
    assert_eq!(service.list_services(fx.owner, false).await?.len(), 2);

    let err = service
        .get_or_create_monthly_bills(fx.owner, 2024, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidPeriod { .. }));
    Ok(())
}

#[tokio::test]
async fn test_manual_bill_conflicts_with_existing_period() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;

    let water = service
        .create_service(fx.owner, service_request("Water", Some(dec!(25)), Some(20)))
        .await?;

    let bill = service
        .create_bill(
            fx.owner,
            NewBill {
                service_id: water.id,
                year: 2024,
                month: 7,
                due_date: None,
                amount: Some(dec!(27.40)),
            },
        )
        .await?;
    assert_eq!(bill.amount, dec!(27.40));
    assert_eq!(bill.due_date, date(2024, 7, 20));

    let err = service
        .create_bill(
            fx.owner,
            NewBill {
                service_id: water.id,
                year: 2024,
                month: 7,
                due_date: None,
                amount: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    // Materialization keeps the manual bill
    let bills = service.get_or_create_monthly_bills(fx.owner, 2024, 7).await?;
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].id, bill.id);
    Ok(())
}

#[tokio::test]
async fn test_pay_bill_records_expense() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let savings = fx.savings(&service, dec!(500)).await?;
    let debit = fx.debit_card(&service, &savings).await?;

    let utilities = service
        .create_category(
            fx.owner,
            NewCategory {
                name: "Utilities".into(),
                icon: None,
                category_type: CategoryType::Expense,
            },
        )
        .await?;
    let power = service
        .create_service(
            fx.owner,
            NewService {
                category_id: Some(utilities.id),
                ..service_request("Electricity", Some(dec!(80)), Some(15))
            },
        )
        .await?;

    let bills = service.get_or_create_monthly_bills(fx.owner, 2024, 3).await?;
    let bill = &bills[0];

    let receipt = service
        .pay_bill(
            fx.owner,
            bill.id,
            BillPayment {
                product_id: debit.id,
                amount: Some(dec!(82.15)),
                date: Some(at_noon("2024-03-14")),
            },
        )
        .await?;

    assert_eq!(receipt.bill.status, BillStatus::Paid);
    assert_eq!(receipt.bill.amount, dec!(82.15));
    assert_eq!(receipt.bill.transaction_id, Some(receipt.transaction.id));
    assert_eq!(receipt.bill.paid_date, Some(at_noon("2024-03-14")));
    assert_eq!(receipt.transaction.date, at_noon("2024-03-14"));
    assert_eq!(receipt.transaction.description, "Payment Electricity");
    assert_eq!(receipt.transaction.category_id, Some(utilities.id));
    assert_eq!(receipt.transaction.from_product_id, Some(debit.id));
    assert_eq!(fx.balance(&service, &savings).await?, dec!(417.85));

    let err = service
        .pay_bill(
            fx.owner,
            bill.id,
            BillPayment {
                product_id: savings.id,
                amount: None,
                date: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyPaid(_)));

    let err = service
        .update_bill(
            fx.owner,
            bill.id,
            BillUpdate {
                amount: Some(dec!(1)),
                ..BillUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyPaid(_)));

    let err = service.skip_bill(fx.owner, bill.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStatusTransition { .. }));

    let paid = service
        .list_bills(
            fx.owner,
            &BillFilter {
                status: Some(BillStatus::Paid),
                ..BillFilter::default()
            },
        )
        .await?;
    assert_eq!(paid.len(), 1);
    assert_eq!(power.id, paid[0].service_id);
    Ok(())
}

#[tokio::test]
async fn test_pay_bill_checks_funding() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let cash = fx.cash(&service, dec!(20)).await?;
    let card = fx.credit_card(&service, Default::default()).await?;

    service
        .create_service(fx.owner, service_request("Phone", Some(dec!(45)), Some(5)))
        .await?;
    let bills = service.get_or_create_monthly_bills(fx.owner, 2024, 3).await?;

    let err = service
        .pay_bill(
            fx.owner,
            bills[0].id,
            BillPayment {
                product_id: card.id,
                amount: None,
                date: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ForbiddenFundingProduct { .. }));

    let err = service
        .pay_bill(
            fx.owner,
            bills[0].id,
            BillPayment {
                product_id: cash.id,
                amount: None,
                date: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { .. }));

    let bill = service.get_bill(fx.owner, bills[0].id).await?;
    assert_eq!(bill.status, BillStatus::Pending);
    assert_eq!(fx.balance(&service, &cash).await?, dec!(20));
    Ok(())
}

#[tokio::test]
async fn test_deleting_payment_reverts_bill() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let cash = fx.cash(&service, dec!(100)).await?;

    service
        .create_service(fx.owner, service_request("Gas", Some(dec!(40)), Some(12)))
        .await?;
    let bills = service.get_or_create_monthly_bills(fx.owner, 2024, 4).await?;
    let receipt = service
        .pay_bill(
            fx.owner,
            bills[0].id,
            BillPayment {
                product_id: cash.id,
                amount: None,
                date: None,
            },
        )
        .await?;
    assert_eq!(fx.balance(&service, &cash).await?, dec!(60));

    service
        .delete_transaction(fx.owner, receipt.transaction.id)
        .await?;

    let bill = service.get_bill(fx.owner, bills[0].id).await?;
    assert_eq!(bill.status, BillStatus::Pending);
    assert_eq!(bill.transaction_id, None);
    assert_eq!(bill.paid_date, None);
    assert_eq!(fx.balance(&service, &cash).await?, dec!(100));
    Ok(())
}

#[tokio::test]
async fn test_skip_and_edit_pending_bill() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;

    let cable = service
        .create_service(fx.owner, service_request("Cable", Some(dec!(35)), Some(8)))
        .await?;
    let bills = service.get_or_create_monthly_bills(fx.owner, 2024, 6).await?;

    let edited = service
        .update_bill(
            fx.owner,
            bills[0].id,
            BillUpdate {
                amount: Some(dec!(37.50)),
                due_date: Some(date(2024, 6, 9)),
            },
        )
        .await?;
    assert_eq!(edited.amount, dec!(37.50));
    assert_eq!(edited.due_date, date(2024, 6, 9));

    let skipped = service.skip_bill(fx.owner, bills[0].id).await?;
    assert_eq!(skipped.status, BillStatus::Skipped);
    // Skipping again is harmless
    let skipped = service.skip_bill(fx.owner, bills[0].id).await?;
    assert_eq!(skipped.status, BillStatus::Skipped);

    service.delete_bill(fx.owner, bills[0].id).await?;
    assert!(matches!(
        service.get_bill(fx.owner, bills[0].id).await,
        Err(AppError::BillNotFound(_))
    ));

    // A deleted bill comes back on the next materialization
    let again = service.get_or_create_monthly_bills(fx.owner, 2024, 6).await?;
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].service_id, cable.id);
    assert_eq!(again[0].amount, dec!(35));
    Ok(())
}

#[tokio::test]
async fn test_service_validation_and_delete() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;

    let err = service
        .create_service(fx.owner, service_request("  ", None, None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = service
        .create_service(fx.owner, service_request("Rent", Some(dec!(-1)), None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let err = service
        .create_service(fx.owner, service_request("Rent", None, Some(32)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidDay(32)));

    let rent = service
        .create_service(fx.owner, service_request("Rent", Some(dec!(900)), Some(1)))
        .await?;
    let bills = service.get_or_create_monthly_bills(fx.owner, 2024, 1).await?;

    service.delete_service(fx.owner, rent.id).await?;
    assert!(matches!(
        service.get_service(fx.owner, rent.id).await,
        Err(AppError::ServiceNotFound(_))
    ));
    assert!(matches!(
        service.get_bill(fx.owner, bills[0].id).await,
        Err(AppError::BillNotFound(_))
    ));
    Ok(())
}
