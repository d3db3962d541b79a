use std::str::FromStr;

use serde_json::json;

use super::*;

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn transformer() -> Transformer {
    Transformer::new(&PipelineConfig::default(), day(2026, 3, 15)).unwrap()
}

fn diag(kind: EntityKind) -> Diagnostics {
    Diagnostics::new(kind, 10)
}

#[test]
fn unknown_status_defaults_to_draft_with_warning() {
    let mut d = diag(EntityKind::Campaign);
    let record = transformer().campaign(
        &row(json!({"status": "Teleported"})),
        "C1",
        None,
        Team::default(),
        CampaignMetrics::default(),
        &mut d,
    );
    assert_eq!(record.status, LifecycleStatus::Draft);
    assert_eq!(record.display_status, mpdb_core::DisplayStatus::Planning);
    assert_eq!(d.count(WarningKind::UnknownStatus), 1);
}

#[test]
fn campaign_price_and_flight() {
    let mut d = diag(EntityKind::Campaign);
    let record = transformer().campaign(
        &row(json!({
            "name": "Spring Launch",
            "status": "live",
            "target_amount": "$10,000.00",
            "actual_amount": 2500.125,
            "start_date": "2026-03-01",
        })),
        "C1",
        None,
        Team::default(),
        CampaignMetrics::default(),
        &mut d,
    );
    assert_eq!(record.display_status, mpdb_core::DisplayStatus::InFlight);
    assert_eq!(record.price.remaining_amount, dec("7499.875"));
    assert_eq!(record.price.currency, "USD");
    assert_eq!(record.dates.end, Some(day(2026, 3, 31)));
    assert_eq!(d.total(), 0);
}

#[test]
fn unparseable_money_is_zero_and_flagged() {
    let mut d = diag(EntityKind::Strategy);
    let record = transformer().strategy(
        &row(json!({"status": "active", "budget": "lots"})),
        "S1",
        None,
        StrategyRollup {
            allocated_amount: dec("50"),
            ..StrategyRollup::default()
        },
        &mut d,
    );
    assert_eq!(record.budget, Decimal::ZERO);
    assert_eq!(record.budget_variance, dec("-50"));
    assert_eq!(d.count(WarningKind::UnparseableNumber), 1);
    assert_eq!(d.samples()[0].field, "budget");
}

#[test]
fn management_fee_bonus_name_is_a_fee() {
    let mut d = diag(EntityKind::LineItem);
    let details = transformer().line_item_details(
        &row(json!({"name": "Management Fee - Bonus", "unit_price": 0, "budget": "1200", "fee_rate": 12})),
        "L1",
        &mut d,
    );
    assert_eq!(details.kind(), LineItemKind::ManagementFee);
    assert_eq!(
        details,
        LineItemDetails::ManagementFee {
            fee_rate: dec("0.12"),
            fee_amount: dec("1200"),
        }
    );
}

#[test]
fn standard_budget_falls_back_to_cpm_price_times_quantity() {
    let mut d = diag(EntityKind::LineItem);
    let details = transformer().line_item_details(
        &row(json!({
            "name": "Prospecting Display",
            "unit_type": "CPM",
            "unit_price": "12.50",
            "quantity": 400000,
            "target_margin": 20,
        })),
        "L1",
        &mut d,
    );
    let LineItemDetails::Standard {
        budget,
        target_margin,
        media_cost,
        ..
    } = details
    else {
        panic!("expected standard, got {details:?}");
    };
    assert_eq!(budget, dec("5000"));
    assert_eq!(target_margin, dec("0.2"));
    assert_eq!(media_cost, dec("4000"));
}

#[test]
fn bonus_line_item_is_zero_dollar_and_budgetless() {
    let mut d = diag(EntityKind::LineItem);
    let details = transformer().line_item_details(
        &row(json!({"name": "Added Value Impressions", "unit_price": 0, "quantity": 50000})),
        "L2",
        &mut d,
    );
    assert_eq!(details.kind(), LineItemKind::ZeroDollar);
    assert_eq!(details.budget(), Decimal::ZERO);
}

#[test]
fn line_item_record_dedups_trader_ids() {
    let mut d = diag(EntityKind::LineItem);
    let record = transformer().line_item(
        &row(json!({
            "name": "Search",
            "status": "active",
            "unit_price": 1,
            "budget": 100,
            "target_margin": 0.1,
            "traders": ["U2", {"user_id": "U1", "name": "Ann"}, "U2"],
            "senior_traders": "U9, U8",
        })),
        "L1",
        None,
        None,
        2,
        &mut d,
    );
    assert_eq!(record.trader_ids, vec!["U1", "U2"]);
    assert_eq!(record.senior_trader_ids, vec!["U8", "U9"]);
    assert_eq!(record.media_buy_count, 2);
}

#[test]
fn parse_members_reads_every_shape() {
    let members = parse_members(Some(&json!([
        "U1",
        7,
        {"id": "U3", "first_name": "Cy", "last_name": "Ng"},
        {"name": "no id"},
    ])));
    let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["U1", "7", "U3"]);
    assert_eq!(members[2].name.as_deref(), Some("Cy Ng"));
    assert!(parse_members(None).is_empty());
}

#[test]
fn line_item_facts_carry_budget_and_traders() {
    let facts = transformer().line_item_facts(&row(json!({
        "line_item_id": "L1",
        "name": "Video",
        "unit_price": 2,
        "budget": "300",
        "target_margin": 0.25,
        "channel": "video",
        "traders": ["A", "B"],
        "start_date": "2026-03-01",
    })));
    assert_eq!(facts.budget, dec("300"));
    assert_eq!(facts.traders.len(), 2);
    assert_eq!(facts.channel.as_deref(), Some("video"));
    assert_eq!(facts.flight.end, Some(day(2026, 3, 31)));
}

#[test]
fn media_buy_uses_delivery_spend_and_status() {
    let t = transformer();
    let mut d = diag(EntityKind::MediaBuy);
    let perf = [
        row(json!({"date": "2026-03-01", "impressions": 1000, "clicks": 10, "spend": "40"})),
        row(json!({"date": "2026-03-02", "impressions": "2,000", "clicks": 5, "spend": "80"})),
        row(json!({"date": "2026-03-02", "impressions": 0, "clicks": 0, "spend": "0"})),
    ];
    let refs: Vec<&Row> = perf.iter().collect();
    let delivery = t.delivery(&refs, "M1", &mut d);
    assert_eq!(delivery.days, 2);
    assert_eq!(delivery.impressions, 3000);
    assert_eq!(delivery.clicks, 15);

    let record = t.media_buy(
        &row(json!({
            "name": "Buy",
            "budget": 100,
            "spend": 5,
            "start_date": "2026-03-01",
            "end_date": "2026-03-31",
        })),
        "M1",
        MediaBuyLink::default(),
        Some("Acme DSP".into()),
        Some(delivery),
        &mut d,
    );
    assert_eq!(record.spend, dec("120"));
    assert_eq!(record.spend_ratio, dec("1.2"));
    assert_eq!(record.status, MediaBuyStatus::Overspent);
    assert_eq!(record.allocation_pct, dec("100"));
    assert_eq!(record.platform_name.as_deref(), Some("Acme DSP"));
}

#[test]
fn media_buy_without_delivery_uses_own_spend() {
    let mut d = diag(EntityKind::MediaBuy);
    let record = transformer().media_buy(
        &row(json!({
            "budget": 200,
            "spend": 50,
            "start_date": "2026-04-01",
            "end_date": "2026-04-30",
        })),
        "M2",
        MediaBuyLink {
            line_item: None,
            allocation_pct: Some(dec("40")),
        },
        None,
        None,
        &mut d,
    );
    assert_eq!(record.spend_ratio, dec("0.25"));
    assert_eq!(record.status, MediaBuyStatus::Scheduled);
    assert_eq!(record.allocation_pct, dec("40"));
}

#[test]
fn inverted_flight_is_flagged() {
    let mut d = diag(EntityKind::LineItem);
    let record = transformer().line_item(
        &row(json!({"status": "active", "start_date": "2026-05-01", "end_date": "2026-04-01"})),
        "L1",
        None,
        None,
        0,
        &mut d,
    );
    assert_eq!(record.flight.start, Some(day(2026, 5, 1)));
    assert_eq!(d.count(WarningKind::InvertedFlight), 1);
}

#[test]
fn overflowing_price_times_quantity_is_zero_and_flagged() {
    let mut d = diag(EntityKind::LineItem);
    let details = transformer().line_item_details(
        &row(json!({"name": "Run of Network", "unit_price": "1e20", "quantity": "1e20"})),
        "L1",
        &mut d,
    );
    assert_eq!(details.budget(), Decimal::ZERO);
    assert_eq!(d.count(WarningKind::NumericOverflow), 1);
    assert_eq!(d.count(WarningKind::UnparseableNumber), 0);
}

#[test]
fn overflowing_remaining_amount_is_zero_and_flagged() {
    let mut d = diag(EntityKind::Campaign);
    let record = transformer().campaign(
        &row(json!({"status": "active", "target_amount": "7e28", "actual_amount": "-7e28"})),
        "C1",
        None,
        Team::default(),
        CampaignMetrics::default(),
        &mut d,
    );
    assert_eq!(record.price.remaining_amount, Decimal::ZERO);
    assert_eq!(d.count(WarningKind::NumericOverflow), 1);
}

#[test]
fn overflowing_spend_ratio_and_delivery_totals_are_flagged() {
    let t = transformer();
    let mut d = diag(EntityKind::MediaBuy);
    let perf = [
        row(json!({"impressions": u64::MAX, "spend": "1e25"})),
        row(json!({"impressions": 1, "spend": "0"})),
    ];
    let refs: Vec<&Row> = perf.iter().collect();
    let delivery = t.delivery(&refs, "M1", &mut d);
    assert_eq!(delivery.impressions, 0);
    assert_eq!(d.count(WarningKind::NumericOverflow), 1);

    let record = t.media_buy(
        &row(json!({"budget": "0.000001"})),
        "M1",
        MediaBuyLink::default(),
        None,
        Some(delivery),
        &mut d,
    );
    assert_eq!(record.spend, Decimal::from_scientific("1e25").unwrap());
    assert_eq!(record.spend_ratio, Decimal::ZERO);
    assert_eq!(d.count(WarningKind::NumericOverflow), 2);
}

#[test]
fn currency_is_upper_cased() {
    let mut d = diag(EntityKind::Campaign);
    let record = transformer().campaign(
        &row(json!({"status": "active", "currency": "eur"})),
        "C1",
        None,
        Team::default(),
        CampaignMetrics::default(),
        &mut d,
    );
    assert_eq!(record.price.currency, "EUR");
}
