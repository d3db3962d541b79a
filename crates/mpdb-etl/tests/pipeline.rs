//! End-to-end reconcile runs over a small export written to a temp dir.
//!
//! The fixture is one account hierarchy with a few deliberate defects: a
//! campaign pointing at an unknown account, a line item under an unknown
//! strategy, and a media buy linked to an unknown line item.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use mpdb_core::{EntityKind, PipelineConfig};
use mpdb_db::{
    CancelFlag, Document, DocumentStore, JsonFileStore, LoadMode, MemoryStore,
};
use mpdb_etl::{
    document_key, EntityReport, Pipeline, PipelineError, PipelineReport, RecordValidator,
    ReportSink, RunOptions, RunState, WarningKind,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
}

fn write(dir: &Path, file: &str, value: &Value) {
    std::fs::write(dir.join(file), serde_json::to_vec_pretty(value).unwrap())
        .unwrap_or_else(|e| panic!("writing fixture {file} failed: {e}"));
}

fn write_export(dir: &Path) {
    write(
        dir,
        "accounts.json",
        &json!([
            {"account_id": "A1", "name": "Acme", "referral_rate": 5},
            {"account_id": "A2", "name": "Globex"},
        ]),
    );
    write(
        dir,
        "users.json",
        &json!([
            {"user_id": "U1", "first_name": "Ann", "last_name": "Lee"},
            {"user_id": "U2", "name": "Bob"},
            {"user_id": "U9", "name": "Manager"},
        ]),
    );
    write(
        dir,
        "campaigns.json",
        &json!([
            {
                "campaign_id": "C1", "account_id": "A1", "account_manager_id": "U9",
                "name": "Spring", "status": "active",
                "target_amount": "10000", "actual_amount": "2500.125",
                "start_date": "2026-03-01", "end_date": "2026-06-30",
            },
            {
                "campaign_id": "C2", "account_id": "A404", "name": "Stray",
                "status": "draft", "actual_amount": "100",
            },
        ]),
    );
    write(
        dir,
        "strategies.json",
        &json!([
            {"strategy_id": "S1", "campaign_id": "C1", "name": "Prospecting", "status": "active", "budget": "1000"},
            {"strategy_id": "S2", "campaign_id": "C1", "name": "Retargeting", "status": "active", "budget": "500"},
        ]),
    );
    write(
        dir,
        "line_items.json",
        &json!([
            {
                "line_item_id": "L1", "strategy_id": "S1", "name": "Display",
                "unit_type": "CPM", "unit_price": "12.3456785", "quantity": 1000,
                "budget": "300", "target_margin": 0.2, "channel": "display",
                "traders": ["U1", "U2"], "status": "active",
                "start_date": "2026-03-01", "end_date": "2026-04-30",
            },
            {
                "line_item_id": "L2", "strategy_id": "S2", "name": "Search",
                "unit_price": 1, "budget": "200", "target_margin": 0.1, "channel": "search",
                "traders": ["U2", {"user_id": "U3", "name": "Cy"}], "status": "active",
                "start_date": "2026-03-01", "end_date": "2026-03-31",
            },
            {
                "line_item_id": "L3", "strategy_id": "S2", "name": "Management Fee - Bonus",
                "unit_price": 0, "budget": "50", "fee_rate": 10, "status": "active",
            },
            {
                "line_item_id": "L4", "strategy_id": "S404", "name": "Lost",
                "unit_price": 1, "budget": "10", "status": "active",
            },
        ]),
    );
    write(
        dir,
        "media_buys.json",
        &json!([
            {
                "media_buy_id": "M1", "name": "Programmatic", "platform_id": "P1",
                "budget": "100", "spend": "5",
                "start_date": "2026-03-01", "end_date": "2026-03-31",
            },
            {
                "media_buy_id": "M2", "name": "Direct", "line_item_id": "L2",
                "budget": "200", "spend": "50",
                "start_date": "2026-04-01", "end_date": "2026-04-30",
            },
            {"media_buy_id": "M3", "name": "Nowhere", "line_item_id": "L999", "budget": "10", "spend": "0"},
        ]),
    );
    write(
        dir,
        "line_item_media_buys.json",
        &json!([{"line_item_id": "L1", "media_buy_id": "M1", "allocation_pct": 60}]),
    );
    write(dir, "platforms.json", &json!([{"platform_id": "P1", "name": "DV360"}]));
    write(
        dir,
        "daily_performance.json",
        &json!([
            {"media_buy_id": "M1", "date": "2026-03-01", "impressions": 1000, "clicks": 10, "spend": "40"},
            {"media_buy_id": "M1", "date": "2026-03-02", "impressions": 2000, "clicks": 5, "spend": "80"},
        ]),
    );
}

fn export() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_export(dir.path());
    dir
}

fn config(source: &Path) -> PipelineConfig {
    PipelineConfig {
        source_dir: source.to_path_buf(),
        output_dir: source.join("out"),
        namespace: "test".to_string(),
        retry_backoff_ms: 1,
        ..PipelineConfig::default()
    }
}

async fn reconcile<S: DocumentStore>(
    config: &PipelineConfig,
    store: &S,
    options: RunOptions,
) -> PipelineReport {
    Pipeline::new(config, store, options).unwrap().run().await
}

fn key(kind: EntityKind, id: &str) -> String {
    document_key(kind, id).unwrap().to_string()
}

async fn body(store: &MemoryStore, kind: EntityKind, id: &str) -> Value {
    store
        .get(kind.collection(), &key(kind, id))
        .await
        .unwrap_or_else(|| panic!("{kind} {id} not stored"))
}

fn dec(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().unwrap_or_else(|| panic!("not a decimal string: {value}")))
        .unwrap()
}

fn entity(report: &PipelineReport, kind: EntityKind) -> &EntityReport {
    report.entity(kind).unwrap()
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_run_loads_every_collection_in_order() {
    let dir = export();
    let store = MemoryStore::new();
    let report = reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    let order: Vec<EntityKind> = report.entities.iter().map(|e| e.entity).collect();
    assert_eq!(order, EntityKind::LOAD_ORDER.to_vec());
    for e in &report.entities {
        assert_eq!(e.state, RunState::Done { with_errors: false }, "{}", e.entity);
    }
    assert_eq!(report.exit_code(), 0);

    for (kind, expected) in [
        (EntityKind::Account, 2),
        (EntityKind::User, 3),
        (EntityKind::Campaign, 2),
        (EntityKind::Strategy, 2),
        (EntityKind::LineItem, 4),
        (EntityKind::MediaBuy, 3),
    ] {
        assert_eq!(store.count(kind.collection()).await.unwrap(), expected, "{kind}");
        assert_eq!(entity(&report, kind).inserted(), expected as usize, "{kind}");
    }
}

#[tokio::test]
async fn rerun_updates_in_place_without_duplicates() {
    let dir = export();
    let config = config(dir.path());
    let store = MemoryStore::new();

    reconcile(&config, &store, RunOptions::new(as_of())).await;
    let first = body(&store, EntityKind::Campaign, "C1").await;

    let second = reconcile(&config, &store, RunOptions::new(as_of())).await;
    for e in &second.entities {
        assert_eq!(e.inserted(), 0, "{}", e.entity);
        assert_eq!(e.updated(), e.transformed, "{}", e.entity);
    }
    assert_eq!(store.count("line_items").await.unwrap(), 4);
    assert_eq!(body(&store, EntityKind::Campaign, "C1").await, first);
}

#[tokio::test]
async fn campaign_rolls_up_strategies_line_items_and_team() {
    let dir = export();
    let store = MemoryStore::new();
    reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    let campaign = body(&store, EntityKind::Campaign, "C1").await;
    let metrics = &campaign["metrics"];
    assert_eq!(metrics["strategy_count"], 2);
    assert_eq!(metrics["line_item_count"], 3);
    assert_eq!(dec(&metrics["allocated_budget"]), Decimal::from(550));
    assert_eq!(metrics["media_mix"]["channels"], json!(["display", "search"]));

    let traders = campaign["team"]["traders"].as_array().unwrap();
    let ids: Vec<&str> = traders.iter().map(|t| t["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["U1", "U2", "U3"]);
    assert_eq!(traders[0]["name"], "Ann Lee");
    assert_eq!(traders[0]["key"], key(EntityKind::User, "U1"));
    assert_eq!(traders[2]["name"], "Cy");
    assert!(traders[2]["key"].is_null());

    let manager = &campaign["team"]["account_manager"];
    assert_eq!(manager["name"], "Manager");
    assert_eq!(manager["key"], key(EntityKind::User, "U9"));

    assert_eq!(dec(&campaign["price"]["remaining_amount"]), Decimal::from_str("7499.875").unwrap());
}

#[tokio::test]
async fn strategy_and_account_rollups() {
    let dir = export();
    let store = MemoryStore::new();
    reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    let s2 = body(&store, EntityKind::Strategy, "S2").await;
    assert_eq!(s2["line_item_count"], 2);
    assert_eq!(dec(&s2["allocated_amount"]), Decimal::from(250));
    assert_eq!(dec(&s2["budget_variance"]), Decimal::from(250));

    let a1 = body(&store, EntityKind::Account, "A1").await;
    assert_eq!(a1["metrics"]["campaign_count"], 1);
    assert_eq!(dec(&a1["metrics"]["total_revenue"]), Decimal::from_str("2500.125").unwrap());
    assert_eq!(dec(&a1["terms"]["referral_rate"]), Decimal::from_str("0.05").unwrap());
    let a2 = body(&store, EntityKind::Account, "A2").await;
    assert_eq!(a2["metrics"]["campaign_count"], 0);
}

#[tokio::test]
async fn references_carry_stable_keys_across_levels() {
    let dir = export();
    let store = MemoryStore::new();
    reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    let c1 = key(EntityKind::Campaign, "C1");
    let s1 = body(&store, EntityKind::Strategy, "S1").await;
    assert_eq!(s1["campaign"]["key"], c1);

    let l1 = body(&store, EntityKind::LineItem, "L1").await;
    assert_eq!(l1["strategy"]["key"], key(EntityKind::Strategy, "S1"));
    assert_eq!(l1["campaign"]["key"], c1);
    assert_eq!(l1["_key"], key(EntityKind::LineItem, "L1"));
    assert_eq!(l1["media_buy_count"], 1);
}

#[tokio::test]
async fn line_items_are_classified_and_rounded() {
    let dir = export();
    let store = MemoryStore::new();
    reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    let l1 = body(&store, EntityKind::LineItem, "L1").await;
    assert_eq!(l1["financials"]["kind"], "standard");
    assert_eq!(dec(&l1["financials"]["unit_price"]), Decimal::from_str("12.345679").unwrap());
    assert_eq!(dec(&l1["financials"]["media_cost"]), Decimal::from(240));

    let l3 = body(&store, EntityKind::LineItem, "L3").await;
    assert_eq!(l3["financials"]["kind"], "management_fee");
    assert_eq!(dec(&l3["financials"]["fee_rate"]), Decimal::from_str("0.1").unwrap());
}

#[tokio::test]
async fn media_buys_join_association_platform_and_delivery() {
    let dir = export();
    let store = MemoryStore::new();
    reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    let m1 = body(&store, EntityKind::MediaBuy, "M1").await;
    assert_eq!(m1["line_item"]["key"], key(EntityKind::LineItem, "L1"));
    assert_eq!(dec(&m1["allocation_pct"]), Decimal::from(60));
    assert_eq!(m1["platform_name"], "DV360");
    assert_eq!(m1["delivery"]["impressions"], 3000);
    assert_eq!(m1["delivery"]["days"], 2);
    assert_eq!(dec(&m1["spend"]), Decimal::from(120));
    assert_eq!(m1["status"], "overspent");

    let m2 = body(&store, EntityKind::MediaBuy, "M2").await;
    assert_eq!(m2["line_item"]["id"], "L2");
    assert_eq!(dec(&m2["allocation_pct"]), Decimal::from(100));
    assert_eq!(m2["status"], "scheduled");
}

#[tokio::test]
async fn orphans_are_loaded_and_flagged() {
    let dir = export();
    let store = MemoryStore::new();
    let report = reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    assert_eq!(entity(&report, EntityKind::Campaign).orphans, 1);
    assert_eq!(entity(&report, EntityKind::LineItem).orphans, 1);
    assert_eq!(entity(&report, EntityKind::MediaBuy).orphans, 1);
    assert_eq!(entity(&report, EntityKind::Strategy).orphans, 0);

    let c2 = body(&store, EntityKind::Campaign, "C2").await;
    assert_eq!(c2["account"]["id"], "A404");
    assert!(c2["account"]["key"].is_null());
    let m3 = body(&store, EntityKind::MediaBuy, "M3").await;
    assert!(m3["line_item"]["key"].is_null());
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_source_fails_entity_and_its_dependents() {
    let dir = export();
    std::fs::remove_file(dir.path().join("strategies.json")).unwrap();
    let store = MemoryStore::new();
    let report = reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    assert!(!entity(&report, EntityKind::Account).state.is_failed());
    let campaign = entity(&report, EntityKind::Campaign);
    assert!(!campaign.state.is_failed());
    assert!(campaign.degraded_inputs.iter().any(|d| d.starts_with("strategies")));

    let RunState::Failed { reason } = &entity(&report, EntityKind::Strategy).state else {
        panic!("strategies should fail");
    };
    assert!(reason.contains("not found"), "{reason}");
    for kind in [EntityKind::LineItem, EntityKind::MediaBuy] {
        let RunState::Failed { reason } = &entity(&report, kind).state else {
            panic!("{kind} should fail");
        };
        assert!(reason.contains("dependency"), "{reason}");
    }
    assert_eq!(store.count("line_items").await.unwrap(), 0);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn missing_optional_source_reads_as_empty() {
    let dir = export();
    std::fs::remove_file(dir.path().join("daily_performance.json")).unwrap();
    let store = MemoryStore::new();
    let report = reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    assert_eq!(report.exit_code(), 0);
    let m1 = body(&store, EntityKind::MediaBuy, "M1").await;
    assert_eq!(dec(&m1["spend"]), Decimal::from(5));
    assert_eq!(m1["status"], "live");
}

#[tokio::test]
async fn record_failure_marks_done_with_errors_and_dependents_continue() {
    let dir = export();
    write(
        dir.path(),
        "accounts.json",
        &json!([
            {"account_id": "A1", "name": "Acme"},
            {"account_id": "A2", "name": "Acme"},
        ]),
    );
    let store = MemoryStore::new().with_unique_field("accounts", "name");
    let report = reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    let accounts = entity(&report, EntityKind::Account);
    assert_eq!(accounts.state, RunState::Done { with_errors: true });
    assert_eq!(accounts.inserted(), 1);
    assert_eq!(accounts.failed(), 1);
    let failure = accounts.load.as_ref().unwrap().failures().next().unwrap();
    assert_eq!(failure.business_id, "A2");

    assert!(!entity(&report, EntityKind::Campaign).state.is_failed());
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn duplicate_business_id_keeps_last_row() {
    let dir = export();
    write(
        dir.path(),
        "accounts.json",
        &json!([
            {"account_id": "A1", "name": "Acme"},
            {"account_id": "A1", "name": "Acme Corp"},
        ]),
    );
    let store = MemoryStore::new();
    let report = reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    let accounts = entity(&report, EntityKind::Account);
    assert_eq!(accounts.duplicates, 1);
    assert_eq!(accounts.inserted(), 1);
    assert_eq!(store.count("accounts").await.unwrap(), 1);
    assert_eq!(body(&store, EntityKind::Account, "A1").await["name"], "Acme Corp");
}

#[tokio::test]
async fn repeated_rows_count_once_in_every_rollup() {
    let dir = export();
    write(
        dir.path(),
        "campaigns.json",
        &json!([
            {"campaign_id": "C1", "account_id": "A1", "status": "active", "actual_amount": "100"},
            {"campaign_id": "C1", "account_id": "A1", "status": "active", "actual_amount": "150"},
        ]),
    );
    write(
        dir.path(),
        "strategies.json",
        &json!([
            {"strategy_id": "S1", "campaign_id": "C404", "status": "active", "budget": "1000"},
            {"strategy_id": "S1", "campaign_id": "C1", "status": "active", "budget": "1000"},
            {"strategy_id": "S2", "campaign_id": "C1", "status": "active", "budget": "500"},
        ]),
    );
    write(
        dir.path(),
        "line_items.json",
        &json!([
            {"line_item_id": "L1", "strategy_id": "S1", "unit_price": 1, "budget": "300", "status": "active"},
            {"line_item_id": "L1", "strategy_id": "S1", "unit_price": 1, "budget": "350", "status": "active"},
            {"line_item_id": "L5", "unit_price": 1, "budget": "20", "status": "active"},
        ]),
    );
    let store = MemoryStore::new();
    let report = reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    assert_eq!(store.count("line_items").await.unwrap(), 2);
    assert_eq!(store.count("campaigns").await.unwrap(), 1);

    let s1 = body(&store, EntityKind::Strategy, "S1").await;
    assert_eq!(s1["line_item_count"], 1);
    assert_eq!(dec(&s1["allocated_amount"]), Decimal::from(350));

    let c1 = body(&store, EntityKind::Campaign, "C1").await;
    assert_eq!(c1["metrics"]["strategy_count"], 2);
    assert_eq!(c1["metrics"]["line_item_count"], 1);
    assert_eq!(dec(&c1["metrics"]["allocated_budget"]), Decimal::from(350));

    let a1 = body(&store, EntityKind::Account, "A1").await;
    assert_eq!(a1["metrics"]["campaign_count"], 1);
    assert_eq!(dec(&a1["metrics"]["total_revenue"]), Decimal::from(150));

    // The line item follows the strategy row that was stored.
    let l1 = body(&store, EntityKind::LineItem, "L1").await;
    assert_eq!(l1["campaign"]["id"], "C1");
    assert_eq!(l1["campaign"]["key"], key(EntityKind::Campaign, "C1"));

    assert_eq!(entity(&report, EntityKind::Strategy).unattributed, 1);
    assert_eq!(entity(&report, EntityKind::Campaign).unattributed, 1);
    assert_eq!(entity(&report, EntityKind::Account).unattributed, 0);
}

#[tokio::test]
async fn overflowing_line_item_is_flagged_and_the_run_completes() {
    let dir = export();
    write(
        dir.path(),
        "line_items.json",
        &json!([
            {"line_item_id": "L1", "strategy_id": "S1", "unit_price": "1e20", "quantity": "1e20", "status": "active"},
            {"line_item_id": "L2", "strategy_id": "S1", "unit_price": 1, "budget": "200", "status": "active"},
        ]),
    );
    let store = MemoryStore::new();
    let report = reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    assert_eq!(report.exit_code(), 0);
    let line_items = entity(&report, EntityKind::LineItem);
    assert_eq!(line_items.state, RunState::Done { with_errors: false });
    assert_eq!(line_items.warnings.get(&WarningKind::NumericOverflow), Some(&1));

    let l1 = body(&store, EntityKind::LineItem, "L1").await;
    assert_eq!(dec(&l1["financials"]["budget"]), Decimal::ZERO);
    let s1 = body(&store, EntityKind::Strategy, "S1").await;
    assert_eq!(dec(&s1["allocated_amount"]), Decimal::from(200));
}

#[tokio::test]
async fn rows_without_business_id_are_rejected() {
    let dir = export();
    write(
        dir.path(),
        "users.json",
        &json!([{"user_id": "U1", "name": "Ann"}, {"name": "Nobody"}, {"user_id": "  "}]),
    );
    let store = MemoryStore::new();
    let report = reconcile(&config(dir.path()), &store, RunOptions::new(as_of())).await;

    let users = entity(&report, EntityKind::User);
    assert_eq!(users.rows_read, 3);
    assert_eq!(users.rejected, 2);
    assert_eq!(users.rejection_reasons.len(), 2);
    assert_eq!(users.state, RunState::Done { with_errors: true });
    assert_eq!(store.count("users").await.unwrap(), 1);
}

#[tokio::test]
async fn cancelled_run_fails_every_entity() {
    let dir = export();
    let store = MemoryStore::new();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let config = config(dir.path());
    let report = Pipeline::new(&config, &store, RunOptions::new(as_of()))
        .unwrap()
        .with_cancel_flag(cancel)
        .run()
        .await;

    assert_eq!(report.failed_entities().count(), EntityKind::LOAD_ORDER.len());
    assert_eq!(store.count("accounts").await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Options and hooks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dry_run_writes_nothing() {
    let dir = export();
    let store = MemoryStore::new();
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::new(as_of())
    };
    let report = reconcile(&config(dir.path()), &store, options).await;

    assert!(report.dry_run);
    for e in &report.entities {
        assert!(matches!(e.state, RunState::Done { .. }), "{}", e.entity);
        assert!(e.load.is_none());
    }
    assert_eq!(entity(&report, EntityKind::LineItem).transformed, 4);
    for kind in EntityKind::LOAD_ORDER {
        assert_eq!(store.count(kind.collection()).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn replace_mode_drops_stale_documents() {
    let dir = export();
    let store = MemoryStore::new();
    let stale = Document::from_record(
        mpdb_core::DocumentKey::new("stale"),
        "A0",
        &json!({"name": "gone"}),
    )
    .unwrap();
    store.upsert_batch("accounts", &[stale]).await.unwrap();

    let options = RunOptions {
        mode: LoadMode::Replace,
        ..RunOptions::new(as_of())
    };
    let report = reconcile(&config(dir.path()), &store, options).await;

    let load = entity(&report, EntityKind::Account).load.as_ref().unwrap();
    assert_eq!(load.cleared, Some(1));
    assert!(store.get("accounts", "stale").await.is_none());
    assert_eq!(store.count("accounts").await.unwrap(), 2);
}

#[tokio::test]
async fn file_store_run_verifies_and_writes_id_maps() {
    let dir = export();
    let config = config(dir.path());
    let store = JsonFileStore::new(&config.output_dir, &config.namespace);
    let id_maps = store.root().join("id_map");
    let options = RunOptions {
        verify: true,
        id_map_dir: Some(id_maps.clone()),
        ..RunOptions::new(as_of())
    };
    let report = reconcile(&config, &store, options).await;

    assert_eq!(report.exit_code(), 0);
    for e in &report.entities {
        let verify = e.verify.as_ref().unwrap();
        assert!(verify.is_complete(), "{}", e.entity);
    }

    let written: Vec<Value> =
        serde_json::from_slice(&std::fs::read(store.collection_path("campaigns")).unwrap()).unwrap();
    assert_eq!(written.len(), 2);

    let map: Value =
        serde_json::from_slice(&std::fs::read(id_maps.join("campaigns.json")).unwrap()).unwrap();
    assert_eq!(map["C1"], key(EntityKind::Campaign, "C1"));
}

struct RejectUser(&'static str);

impl RecordValidator for RejectUser {
    fn validate(&self, kind: EntityKind, doc: &Document) -> Result<(), String> {
        if kind == EntityKind::User && doc.business_id == self.0 {
            return Err("blocked".to_string());
        }
        Ok(())
    }
}

#[tokio::test]
async fn validator_veto_keeps_record_out_of_store_and_resolver() {
    let dir = export();
    let store = MemoryStore::new();
    let config = config(dir.path());
    let report = Pipeline::new(&config, &store, RunOptions::new(as_of()))
        .unwrap()
        .with_validator(RejectUser("U9"))
        .run()
        .await;

    let users = entity(&report, EntityKind::User);
    assert_eq!(users.rejected, 1);
    assert_eq!(users.rejection_reasons, vec!["U9: blocked"]);
    assert_eq!(store.count("users").await.unwrap(), 2);

    let campaign = body(&store, EntityKind::Campaign, "C1").await;
    assert!(campaign["team"]["account_manager"]["key"].is_null());
}

#[derive(Default, Clone)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl ReportSink for Recorder {
    fn entity_finished(&self, report: &EntityReport) {
        self.0
            .lock()
            .unwrap()
            .push(format!("{}:{}", report.entity, report.state.label()));
    }

    fn run_finished(&self, report: &PipelineReport) {
        self.0
            .lock()
            .unwrap()
            .push(format!("run:{}", report.exit_code()));
    }
}

#[tokio::test]
async fn sink_sees_each_entity_then_the_run() {
    let dir = export();
    let store = MemoryStore::new();
    let recorder = Recorder::default();
    let config = config(dir.path());
    Pipeline::new(&config, &store, RunOptions::new(as_of()))
        .unwrap()
        .with_sink(recorder.clone())
        .run()
        .await;

    let events = recorder.0.lock().unwrap().clone();
    assert_eq!(events.len(), EntityKind::LOAD_ORDER.len() + 1);
    assert_eq!(events[0], "account:done");
    assert_eq!(events.last().unwrap(), "run:0");
}

#[test]
fn classifier_errors_surface_as_pipeline_errors() {
    let err: PipelineError = regex::Regex::new("(").unwrap_err().into();
    assert!(err.to_string().contains("classifier"));
}
