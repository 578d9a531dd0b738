use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use stockpulse_core::domain::product::{ProductId, ProductSnapshot};
use stockpulse_core::domain::sales::SaleRecord;
use stockpulse_core::domain::store::{StoreProfile, UserId};
use stockpulse_core::domain::suggestion::{SuggestionPriority, SuggestionStatus, SuggestionType};
use stockpulse_core::suggestions::ports::Clock;
use stockpulse_core::suggestions::{EngineCollaborators, EngineSettings, SuggestionEngine};
use stockpulse_core::SuggestionFilter;
use stockpulse_db::{
    connect_with_settings, migrations, DbPool, SqlPreferencesStore, SqlProductRepository,
    SqlSalesRepository, SqlStoreProfileRepository, SqlSuggestionStore,
};

struct StepClock(Mutex<DateTime<Utc>>);

impl StepClock {
    fn advance(&self, by: Duration) {
        let mut now = self.0.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("clock lock")
    }
}

struct Fixture {
    pool: DbPool,
    engine: SuggestionEngine,
    clock: Arc<StepClock>,
    user: UserId,
}

/// Monday 2 March 2026, 18:00 UTC.
fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap()
}

async fn fixture() -> Fixture {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    fixture_on(pool).await
}

async fn fixture_on(pool: DbPool) -> Fixture {
    migrations::run_pending(&pool).await.expect("migrations");

    let user = UserId("u-bakery".to_string());
    SqlStoreProfileRepository::new(pool.clone())
        .upsert(
            &user,
            &StoreProfile {
                store_type: "boulangerie".to_string(),
                city: String::new(),
                country: "FR".to_string(),
            },
        )
        .await
        .expect("store");

    let product_id = ProductId("p-croissant".to_string());
    SqlProductRepository::new(pool.clone())
        .save(&ProductSnapshot {
            id: product_id.clone(),
            user_id: user.clone(),
            name: "Croissant".to_string(),
            current_quantity: 5.0,
            unit: "pcs".to_string(),
            alert_threshold: 20.0,
            supplier: None,
            category: Some("Viennoiserie".to_string()),
            expiry_date: None,
        })
        .await
        .expect("product");

    record_daily_sales(&pool, &product_id).await;

    let clock = Arc::new(StepClock(Mutex::new(start())));
    let engine = SuggestionEngine::new(
        EngineCollaborators {
            products: Arc::new(SqlProductRepository::new(pool.clone())),
            sales: Arc::new(SqlSalesRepository::new(pool.clone())),
            profiles: Arc::new(SqlStoreProfileRepository::new(pool.clone())),
            suggestions: Arc::new(SqlSuggestionStore::new(pool.clone())),
            preferences: Arc::new(SqlPreferencesStore::new(pool.clone())),
        },
        EngineSettings::default(),
    )
    .with_clock(clock.clone());

    Fixture { pool, engine, clock, user }
}

async fn record_daily_sales(pool: &DbPool, product_id: &ProductId) {
    let sales = SqlSalesRepository::new(pool.clone());
    for day in 0..7 {
        let sale = SaleRecord {
            product_id: product_id.clone(),
            quantity_sold: 10.0,
            sale_date: start() - Duration::days(day) - Duration::hours(2),
        };
        sales.record(&format!("s-{}-{day}", product_id.0), &sale).await.expect("sale");
    }
}

#[tokio::test]
async fn croissant_stock_out_is_suggested_once() {
    let fx = fixture().await;

    let created = fx.engine.generate_all_suggestions(&fx.user).await.expect("first run");
    assert_eq!(created.len(), 1);
    let rupture = &created[0];
    assert_eq!(rupture.suggestion_type, SuggestionType::Rupture);
    assert_eq!(rupture.priority, SuggestionPriority::Critical);
    assert_eq!(rupture.severity_score, 100);
    assert_eq!(rupture.action_data["suggested_quantity"], 70.0);
    assert_eq!(rupture.action_data["days_until_rupture"], 0);

    let again = fx.engine.generate_all_suggestions(&fx.user).await.expect("second run");
    assert!(again.is_empty(), "an active suggestion must not be duplicated");
    assert_eq!(fx.engine.get_unread_count(&fx.user).await.expect("unread"), 1);

    let stored = SqlSuggestionStore::new(fx.pool.clone())
        .list_rows(&fx.user, &SuggestionFilter::default())
        .await
        .expect("list");
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn lifecycle_changes_persist_and_feed_engagement() {
    let fx = fixture().await;
    let created = fx.engine.generate_all_suggestions(&fx.user).await.expect("generate");
    let id = created[0].id.clone();

    let viewed = fx.engine.mark_suggestion_viewed(&id).await.expect("view");
    assert_eq!(viewed.status, SuggestionStatus::Viewed);
    assert_eq!(fx.engine.get_unread_count(&fx.user).await.expect("unread"), 0);

    let acted =
        fx.engine.act_on_suggestion(&id, json!({"ordered": 70})).await.expect("act");
    assert_eq!(acted.status, SuggestionStatus::Acted);

    let dismiss = fx.engine.dismiss_suggestion(&id).await;
    assert!(dismiss.is_err(), "acted suggestions are terminal");

    let prefs = fx.engine.get_preferences(&fx.user).await.expect("prefs");
    assert_eq!(prefs.engagement_score, 2);

    // Acted rows no longer block the fingerprint.
    let regenerated = fx.engine.generate_all_suggestions(&fx.user).await.expect("regenerate");
    assert_eq!(regenerated.len(), 1);
    assert_ne!(regenerated[0].id, id);
}

#[tokio::test]
async fn lapsed_suggestions_expire_and_make_room_for_fresh_ones() {
    let fx = fixture().await;
    let first = fx.engine.generate_all_suggestions(&fx.user).await.expect("generate");

    fx.clock.advance(Duration::hours(25));
    assert_eq!(fx.engine.cleanup_expired_suggestions().await.expect("cleanup"), 1);

    let store = SqlSuggestionStore::new(fx.pool.clone());
    let lapsed = store.find_row(&first[0].id).await.expect("load").expect("row");
    assert_eq!(lapsed.status, SuggestionStatus::Expired);
    assert_eq!(fx.engine.get_unread_count(&fx.user).await.expect("unread"), 0);
}

#[tokio::test]
async fn engagement_resets_after_a_quiet_week() {
    let fx = fixture().await;
    let created = fx.engine.generate_all_suggestions(&fx.user).await.expect("generate");
    fx.engine.dismiss_suggestion(&created[0].id).await.expect("dismiss");
    assert_eq!(fx.engine.get_preferences(&fx.user).await.expect("prefs").engagement_score, 1);

    fx.clock.advance(Duration::days(8));
    let prefs = fx.engine.get_preferences(&fx.user).await.expect("prefs");
    assert_eq!(prefs.engagement_score, 0);
    assert_eq!(prefs.last_engagement_reset_at, start() + Duration::days(8));
}

#[tokio::test]
async fn suggestions_outlive_their_deleted_product() {
    let fx = fixture().await;
    let created = fx.engine.generate_all_suggestions(&fx.user).await.expect("generate");

    let products = SqlProductRepository::new(fx.pool.clone());
    assert!(products.delete(&ProductId("p-croissant".to_string())).await.expect("delete"));

    let listed = fx
        .engine
        .get_user_suggestions_with_context(&fx.user, &SuggestionFilter::default())
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].suggestion.id, created[0].id);
    assert_eq!(listed[0].suggestion.product_id, Some(ProductId("p-croissant".to_string())));
    assert!(listed[0].product.is_none());
}

#[tokio::test]
async fn popup_gate_follows_the_configured_frequency() {
    let fx = fixture().await;

    assert!(fx.engine.should_show_popup(&fx.user).await.expect("gate"));
    fx.engine.record_popup_shown(&fx.user).await.expect("shown");
    assert!(!fx.engine.should_show_popup(&fx.user).await.expect("gate"));

    fx.engine.update_popup_frequency(&fx.user, 30).await.expect("update");
    fx.clock.advance(Duration::minutes(30));
    assert!(fx.engine.should_show_popup(&fx.user).await.expect("gate"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_store_each_fingerprint_once() {
    let dir = TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("stockpulse.db").display());
    let pool = connect_with_settings(&url, 8, 30).await.expect("connect");
    let fx = fixture_on(pool).await;

    let products = SqlProductRepository::new(fx.pool.clone());
    for index in 0..9 {
        let id = ProductId(format!("p-pastry-{index}"));
        products
            .save(&ProductSnapshot {
                id: id.clone(),
                user_id: fx.user.clone(),
                name: format!("Pastry {index}"),
                current_quantity: 5.0,
                unit: "pcs".to_string(),
                alert_threshold: 20.0,
                supplier: None,
                category: Some("Viennoiserie".to_string()),
                expiry_date: None,
            })
            .await
            .expect("product");
        record_daily_sales(&fx.pool, &id).await;
    }

    let engine = Arc::new(fx.engine);
    let runs = (0..6)
        .map(|_| {
            let engine = engine.clone();
            let user = fx.user.clone();
            tokio::spawn(async move { engine.generate_report(&user).await })
        })
        .collect::<Vec<_>>();

    let mut created = 0;
    let mut duplicates = 0;
    for run in runs {
        let report = run.await.expect("join").expect("report");
        assert!(report.persistence_failures.is_empty(), "{:?}", report.persistence_failures);
        created += report.created.len();
        duplicates += report.duplicates_skipped;
    }

    let stored = SqlSuggestionStore::new(fx.pool.clone())
        .list_rows(&fx.user, &SuggestionFilter::default())
        .await
        .expect("list");
    assert_eq!(stored.len(), 10);
    assert_eq!(created, 10);
    assert_eq!(duplicates, 50);
}
