mod common;

use anyhow::Result;
use banquito::application::{AppError, NewTransaction};
use banquito::domain::CreditLimits;
use common::{Fixture, at_noon, test_service};
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_projects_remaining_installments() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let card = fx.credit_card(&service, CreditLimits::default()).await?;

    // 100 a month on Feb 10, Mar 10 and Apr 10
    service
        .create_transaction(
            fx.owner,
            NewTransaction::expense(card.id, dec!(300), at_noon("2024-02-10"), "Laptop")
                .with_installments(3),
        )
        .await?;
    service
        .create_transaction(
            fx.owner,
            NewTransaction::expense(card.id, dec!(45), at_noon("2024-03-28"), "Dinner"),
        )
        .await?;

    let projections = service
        .project_summaries(fx.owner, card.id, 3, at_noon("2024-03-01"))
        .await?;

    let periods: Vec<_> = projections.iter().map(|p| (p.year, p.month)).collect();
    assert_eq!(periods, vec![(2024, 3), (2024, 4), (2024, 5)]);

    // The February part is already behind us
    assert_eq!(projections[0].amount, dec!(100));
    assert_eq!(projections[0].transaction_count, 1);
    // Dinner on the 28th falls after the March closing
    assert_eq!(projections[1].amount, dec!(145));
    assert_eq!(projections[1].transaction_count, 2);
    assert_eq!(projections[2].amount, dec!(0));
    Ok(())
}

#[tokio::test]
async fn test_projection_rejects_bad_input() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let fx = Fixture::new(&service).await?;
    let card = fx.credit_card(&service, CreditLimits::default()).await?;
    let savings = fx.savings(&service, dec!(0)).await?;
    let as_of = at_noon("2024-03-01");

    for months in [0, 61] {
        let err = service
            .project_summaries(fx.owner, card.id, months, as_of)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    let err = service
        .project_summaries(fx.owner, savings.id, 3, as_of)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unsupported(_)));

    // A year-long horizon crosses into the next year
    let projections = service.project_summaries(fx.owner, card.id, 12, as_of).await?;
    assert_eq!(projections.len(), 12);
    assert_eq!((projections[11].year, projections[11].month), (2025, 2));
    Ok(())
}
