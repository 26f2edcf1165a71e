//! End-to-end billing flows over the in-memory backend.
//!
//! Tests: readings + tariffs → generate_draft → lifecycle → notifications
//!
//! Verifies:
//! - Rating results for flat and time-of-use tariffs
//! - Per-meter failures degrade to warnings
//! - Building circulation fee by season
//! - Generation is idempotent, including under concurrent callers
//! - Lifecycle transitions and compare-and-set conflicts
//! - Tenant isolation

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use rust_decimal_macros::dec;

    use utilbill_core::{AggregateRoot, Currency, UserId};
    use utilbill_events::{BillingEvent, EventBus};
    use utilbill_invoicing::{InvoiceError, InvoiceItem, InvoiceStatus};
    use utilbill_metering::UtilityType;
    use utilbill_properties::Building;

    use crate::audit::AuditKind;
    use crate::billing::BillingError;
    use crate::fixtures::{World, date};
    use crate::tenancy::TenantContext;

    fn late_fee() -> InvoiceItem {
        InvoiceItem::priced("Late payment fee", dec!(1), "fee", dec!(0), dec!(5.00), Currency::Eur)
    }

    #[tokio::test]
    async fn flat_water_meter_is_rated_into_one_item() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Ona").await;
        let meter = world.meter(&ctx, &renter, "CW-001", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(500.0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(515.0), date(2025, 1, 31), None).await;

        let invoice = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();

        assert_eq!(invoice.items().len(), 1);
        let item = &invoice.items()[0];
        assert_eq!(item.quantity, dec!(15.0));
        assert_eq!(item.total(), dec!(15.40));
        assert_eq!(invoice.total_amount(), dec!(15.40));
        assert_eq!(invoice.status(), InvoiceStatus::Draft);
        assert_eq!(invoice.due_date(), date(2025, 2, 14));
        assert!(invoice.generation_warnings().is_empty());

        let snapshot = item.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.previous_value, dec!(500.0));
        assert_eq!(snapshot.current_value, dec!(515.0));
    }

    #[tokio::test]
    async fn day_night_meter_is_rated_per_zone() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Jonas").await;
        let meter = world.meter(&ctx, &renter, "EL-001", UtilityType::Electricity, true).await;
        world.day_night_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(1000), date(2025, 1, 1), Some("day")).await;
        world.raw_reading(&ctx, &meter, dec!(600), date(2025, 1, 1), Some("night")).await;
        world.raw_reading(&ctx, &meter, dec!(1125), date(2025, 1, 31), Some("day")).await;
        world.raw_reading(&ctx, &meter, dec!(660), date(2025, 1, 31), Some("night")).await;

        let invoice = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();

        let totals: Vec<_> = invoice.items().iter().map(|i| i.total()).collect();
        assert_eq!(totals, vec![dec!(22.50), dec!(6.00)]);
        assert_eq!(invoice.total_amount(), dec!(28.50));
    }

    #[tokio::test]
    async fn decreasing_meter_becomes_a_warning_while_siblings_are_billed() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Rasa").await;
        let water = world.meter(&ctx, &renter, "CW-002", UtilityType::ColdWater, false).await;
        let power = world.meter(&ctx, &renter, "EL-002", UtilityType::Electricity, true).await;
        world.flat_water_tariff(&ctx).await;
        world.day_night_tariff(&ctx).await;

        world.raw_reading(&ctx, &water, dec!(515.0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &water, dec!(510.0), date(2025, 1, 31), None).await;
        world.raw_reading(&ctx, &power, dec!(1000), date(2025, 1, 1), Some("day")).await;
        world.raw_reading(&ctx, &power, dec!(600), date(2025, 1, 1), Some("night")).await;
        world.raw_reading(&ctx, &power, dec!(1125), date(2025, 1, 31), Some("day")).await;
        world.raw_reading(&ctx, &power, dec!(660), date(2025, 1, 31), Some("night")).await;

        let invoice = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();

        assert_eq!(invoice.items().len(), 2);
        assert_eq!(invoice.total_amount(), dec!(28.50));
        assert_eq!(invoice.generation_warnings().len(), 1);
        assert!(invoice.generation_warnings()[0].contains("CW-002"));
        assert!(invoice.generation_warnings()[0].contains("below previous reading"));
    }

    #[tokio::test]
    async fn meter_without_tariff_is_reported_not_fatal() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Tomas").await;
        let water = world.meter(&ctx, &renter, "CW-003", UtilityType::ColdWater, false).await;
        let heat = world.meter(&ctx, &renter, "HT-003", UtilityType::Heating, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &water, dec!(10), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &water, dec!(20), date(2025, 1, 31), None).await;
        world.raw_reading(&ctx, &heat, dec!(100), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &heat, dec!(300), date(2025, 1, 31), None).await;

        let invoice = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();

        assert_eq!(invoice.items().len(), 1);
        assert_eq!(invoice.generation_warnings().len(), 1);
        assert!(invoice.generation_warnings()[0].contains("no tariff active"));
    }

    #[tokio::test]
    async fn nothing_billable_is_refused() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Empty").await;
        world.meter(&ctx, &renter, "CW-004", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;

        let err = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap_err();

        assert_eq!(err, BillingError::Invoice(InvoiceError::EmptyInvoice));
        assert!(world.backend.invoices.rows().is_empty());
    }

    #[tokio::test]
    async fn concurrent_generation_yields_one_invoice() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Renter 42").await;
        let meter = world.meter(&ctx, &renter, "CW-042", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(500.0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(515.0), date(2025, 1, 31), None).await;
        world.backend.invoices.set_latency(Duration::from_millis(10));

        let billing = world.billing();
        let (first, second) = tokio::join!(
            billing.generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31)),
            billing.generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31)),
        );

        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.id(), second.id());
        assert_eq!(world.backend.invoices.rows().len(), 1);

        let again = billing
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();
        assert_eq!(again.id(), first.id());
    }

    #[tokio::test]
    async fn finalized_invoice_rejects_item_changes() {
        let world = World::new();
        let (tenant, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Ieva").await;
        let meter = world.meter(&ctx, &renter, "CW-005", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(500.0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(515.0), date(2025, 1, 31), None).await;

        let subscription = world.bus.subscribe();
        let billing = world.billing();
        let draft = billing
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();
        let id = *draft.id();

        let finalized = billing.finalize(&ctx, id).await.unwrap();
        assert_eq!(finalized.status(), InvoiceStatus::Finalized);
        assert!(finalized.finalized_at().is_some());

        let err = billing.add_item(&ctx, id, late_fee()).await.unwrap_err();
        assert_eq!(
            err,
            BillingError::Invoice(InvoiceError::InvoiceNotEditable(InvoiceStatus::Finalized))
        );
        let item_id = finalized.items()[0].id;
        assert!(matches!(
            billing.remove_item(&ctx, id, item_id).await,
            Err(BillingError::Invoice(InvoiceError::InvoiceNotEditable(_)))
        ));

        let stored = billing.get(&ctx, id).await.unwrap();
        assert_eq!(stored.total_amount(), dec!(15.40));
        assert_eq!(stored.version(), finalized.version());

        let envelope = subscription.try_recv().unwrap();
        assert_eq!(envelope.tenant_id(), tenant);
        assert_eq!(envelope.event_type(), "billing.invoice.finalized");
        match envelope.payload() {
            BillingEvent::InvoiceFinalized {
                invoice_id,
                total_amount,
                currency,
                ..
            } => {
                assert_eq!(*invoice_id, uuid::Uuid::from(id));
                assert_eq!(*total_amount, dec!(15.40));
                assert_eq!(currency, "EUR");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn invoice_moves_forward_only() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Paulius").await;
        let meter = world.meter(&ctx, &renter, "CW-006", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(10), date(2025, 1, 31), None).await;

        let billing = world.billing();
        let draft = billing
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();
        let id = *draft.id();

        let with_fee = billing.add_item(&ctx, id, late_fee()).await.unwrap();
        assert_eq!(with_fee.total_amount(), draft.total_amount() + dec!(5.00));

        assert_eq!(
            billing.mark_paid(&ctx, id, dec!(15.55), None, Utc::now()).await,
            Err(BillingError::Invoice(InvoiceError::NotFinalized))
        );

        billing.finalize(&ctx, id).await.unwrap();
        assert_eq!(
            billing.finalize(&ctx, id).await,
            Err(BillingError::Invoice(InvoiceError::AlreadyFinalized))
        );
        assert_eq!(
            billing.delete(&ctx, id).await,
            Err(BillingError::Invoice(InvoiceError::CannotDeleteFinalized))
        );

        let paid = billing
            .mark_paid(&ctx, id, with_fee.total_amount(), Some("BANK-7781".into()), Utc::now())
            .await
            .unwrap();
        assert_eq!(paid.status(), InvoiceStatus::Paid);
        assert_eq!(paid.payment_reference(), Some("BANK-7781"));

        assert_eq!(
            billing.mark_paid(&ctx, id, dec!(1), None, Utc::now()).await,
            Err(BillingError::Invoice(InvoiceError::AlreadyPaid))
        );
    }

    #[tokio::test]
    async fn draft_can_be_deleted_and_regenerated() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Dovile").await;
        let meter = world.meter(&ctx, &renter, "CW-007", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(10), date(2025, 1, 31), None).await;

        let billing = world.billing();
        let draft = billing
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();
        billing.delete(&ctx, *draft.id()).await.unwrap();
        assert!(matches!(
            billing.get(&ctx, *draft.id()).await,
            Err(BillingError::NotFound { .. })
        ));

        let regenerated = billing
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();
        assert_ne!(regenerated.id(), draft.id());
    }

    #[tokio::test]
    async fn losing_writer_gets_a_concurrency_error() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Race").await;
        let meter = world.meter(&ctx, &renter, "CW-008", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(10), date(2025, 1, 31), None).await;

        let billing = world.billing();
        let draft = billing
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();
        let id = *draft.id();
        world.backend.invoices.set_latency(Duration::from_millis(20));

        let (a, b) = tokio::join!(billing.add_item(&ctx, id, late_fee()), billing.add_item(&ctx, id, late_fee()));

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(loser, BillingError::Concurrency(_)));
        assert!(loser.is_retryable());

        world.backend.invoices.set_latency(Duration::ZERO);
        let stored = billing.get(&ctx, id).await.unwrap();
        assert_eq!(stored.items().len(), draft.items().len() + 1);
    }

    #[tokio::test]
    async fn losing_finalizer_sees_the_state_conflict() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Race 2").await;
        let meter = world.meter(&ctx, &renter, "CW-009", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(10), date(2025, 1, 31), None).await;

        let billing = world.billing();
        let id = *billing
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap()
            .id();
        world.backend.invoices.set_latency(Duration::from_millis(20));

        let (a, b) = tokio::join!(billing.finalize(&ctx, id), billing.finalize(&ctx, id));

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| r == &Err(BillingError::Invoice(InvoiceError::AlreadyFinalized)))
        );
    }

    #[tokio::test]
    async fn added_items_are_priced_by_the_invoice() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Priced").await;
        let meter = world.meter(&ctx, &renter, "CW-011", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(10), date(2025, 1, 31), None).await;

        let billing = world.billing();
        let draft = billing
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();
        let id = *draft.id();

        let inspection = InvoiceItem::priced("Meter inspection", dec!(2), "visit", dec!(1.00), dec!(0), Currency::Eur);
        let mut raw = serde_json::to_value(&inspection).unwrap();
        raw["total"] = serde_json::json!("999.999");
        let tampered: InvoiceItem = serde_json::from_value(raw).unwrap();
        assert_eq!(tampered.total(), dec!(999.999));

        let invoice = billing.add_item(&ctx, id, tampered).await.unwrap();
        assert_eq!(invoice.item(inspection.id).unwrap().total(), dec!(2.00));
        assert_eq!(invoice.total_amount(), draft.total_amount() + dec!(2.00));

        let finalized = billing.finalize(&ctx, id).await.unwrap();
        assert_eq!(finalized.total_amount(), draft.total_amount() + dec!(2.00));
    }

    #[tokio::test]
    async fn summer_invoice_carries_the_building_circulation_fee() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let building = world.building(&ctx, Building::new("Linden 4", "Linden g. 4", 20)).await;
        let renter = world.renter_in(&ctx, &building, "Rasa").await;
        let meter = world.meter(&ctx, &renter, "CW-020", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(500.0), date(2025, 7, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(515.0), date(2025, 7, 31), None).await;

        let invoice = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 7, 1), date(2025, 7, 31))
            .await
            .unwrap();

        let lines: Vec<_> = invoice.items().iter().map(|i| (i.description.as_str(), i.total())).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], ("Hot water circulation", dec!(300.00)));
        assert_eq!(invoice.total_amount(), dec!(315.40));
        assert!(invoice.generation_warnings().is_empty());
    }

    #[tokio::test]
    async fn heating_season_fee_uses_the_summer_average() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let building = world
            .building(&ctx, Building::new("Sodu 1", "Sodu g. 1", 8).with_summer_average(dec!(150)))
            .await;
        let renter = world.renter_in(&ctx, &building, "Jonas").await;
        let meter = world.meter(&ctx, &renter, "CW-021", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(500.0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(515.0), date(2025, 1, 31), None).await;

        let invoice = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();

        // 150 kWh * 1.3 peak winter * 1.1 small building
        let fee = invoice.items().iter().find(|i| i.description == "Hot water circulation").unwrap();
        assert_eq!(fee.total(), dec!(214.50));
        assert_eq!(invoice.total_amount(), dec!(229.90));
    }

    #[tokio::test]
    async fn implausible_building_degrades_to_a_warning() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let building = world.building(&ctx, Building::new("Shell", "Nowhere 0", 0)).await;
        let renter = world.renter_in(&ctx, &building, "Eglė").await;
        let meter = world.meter(&ctx, &renter, "CW-022", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(500.0), date(2025, 7, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(515.0), date(2025, 7, 31), None).await;

        let invoice = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 7, 1), date(2025, 7, 31))
            .await
            .unwrap();

        assert_eq!(invoice.items().len(), 1);
        assert_eq!(invoice.total_amount(), dec!(15.40));
        assert_eq!(invoice.generation_warnings().len(), 1);
        assert!(invoice.generation_warnings()[0].contains("circulation fee skipped"));
    }

    #[tokio::test]
    async fn other_tenants_invoices_are_invisible() {
        let world = World::new();
        let (_, ctx_a) = world.tenant(Currency::Eur).await;
        let (_, ctx_b) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx_a, "Owner").await;
        let meter = world.meter(&ctx_a, &renter, "CW-010", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx_a).await;
        world.raw_reading(&ctx_a, &meter, dec!(0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx_a, &meter, dec!(10), date(2025, 1, 31), None).await;

        let billing = world.billing();
        let invoice = billing
            .generate_draft(&ctx_a, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();
        let id = *invoice.id();

        assert!(matches!(billing.get(&ctx_b, id).await, Err(BillingError::NotFound { .. })));
        assert!(matches!(billing.finalize(&ctx_b, id).await, Err(BillingError::NotFound { .. })));
        assert!(matches!(
            billing
                .generate_draft(&ctx_b, renter.id, date(2025, 1, 1), date(2025, 1, 31))
                .await,
            Err(BillingError::NotFound { .. })
        ));
        assert_eq!(billing.get(&ctx_a, id).await.unwrap().status(), InvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn missing_tenant_context_is_refused() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Nobody").await;

        let err = world
            .billing()
            .generate_draft(&TenantContext::empty(), renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap_err();
        assert_eq!(err, BillingError::TenantContextMissing);
    }

    #[tokio::test]
    async fn organization_currency_is_used_for_items() {
        let world = World::new();
        let (_, ctx) = world.tenant(Currency::Pln).await;
        let renter = world.renter(&ctx, "Kasia").await;
        let meter = world.meter(&ctx, &renter, "CW-011", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(10), date(2025, 1, 31), None).await;

        let invoice = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();
        assert_eq!(invoice.currency(), Currency::Pln);
    }

    #[tokio::test]
    async fn slow_storage_surfaces_as_transient() {
        let world = World::with_timeout(Duration::from_millis(30));
        let (_, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Slow").await;
        world.backend.invoices.set_latency(Duration::from_millis(200));

        let err = world
            .billing()
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::TransientStorage(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn billing_run_reports_each_renter() {
        let world = World::new();
        let (tenant, ctx) = world.tenant(Currency::Eur).await;
        world.flat_water_tariff(&ctx).await;

        let billed = world.renter(&ctx, "Billed").await;
        let meter = world.meter(&ctx, &billed, "CW-012", UtilityType::ColdWater, false).await;
        world.raw_reading(&ctx, &meter, dec!(0), date(2025, 1, 1), None).await;
        world.raw_reading(&ctx, &meter, dec!(10), date(2025, 1, 31), None).await;

        let unmetered = world.renter(&ctx, "Unmetered").await;

        let mut moved_out = world.renter(&ctx, "Moved out").await;
        moved_out.active = false;
        world.stores.renters.update(&ctx, moved_out.id, moved_out.clone()).await.unwrap();

        let billing = world.billing();
        let report = billing.run_billing(&ctx, date(2025, 1, 1), date(2025, 1, 31)).await.unwrap();

        assert_eq!(report.tenant_id, tenant);
        assert_eq!(report.generated.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].renter_id, unmetered.id);
        assert!(!report.failed[0].retryable);
        assert_eq!(report.renters_processed(), 2);

        let rerun = billing.run_billing(&ctx, date(2025, 1, 1), date(2025, 1, 31)).await.unwrap();
        assert!(rerun.generated.is_empty());
        assert_eq!(rerun.reused, report.generated);
        assert_eq!(world.backend.invoices.rows().len(), 1);
    }

    #[tokio::test]
    async fn correcting_a_reading_leaves_invoice_snapshots_alone() {
        let world = World::new();
        let (tenant, ctx) = world.tenant(Currency::Eur).await;
        let renter = world.renter(&ctx, "Snapshot").await;
        let meter = world.meter(&ctx, &renter, "CW-013", UtilityType::ColdWater, false).await;
        world.flat_water_tariff(&ctx).await;
        world.raw_reading(&ctx, &meter, dec!(500.0), date(2025, 1, 1), None).await;
        let current = world.raw_reading(&ctx, &meter, dec!(515.0), date(2025, 1, 31), None).await;

        let billing = world.billing();
        let invoice = billing
            .generate_draft(&ctx, renter.id, date(2025, 1, 1), date(2025, 1, 31))
            .await
            .unwrap();

        let actor = UserId::new();
        world
            .readings()
            .correct_reading(&ctx, actor, current.id, dec!(517.0), "photo shows 517")
            .await
            .unwrap();

        let stored = billing.get(&ctx, *invoice.id()).await.unwrap();
        assert_eq!(stored.items(), invoice.items());
        assert_eq!(stored.total_amount(), dec!(15.40));

        let trail = world
            .stores
            .audit
            .for_entity(tenant, "meter_readings", current.id.into())
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].kind, AuditKind::ReadingCorrected);
        assert_eq!(trail[0].actor, Some(actor));
    }
}
