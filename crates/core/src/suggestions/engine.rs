//! Orchestrates detectors, deduplication and lifecycle for one store owner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::detectors::{rule_detectors, Detector, UseItUpDetector, WeatherImpactDetector};
use super::engagement::EngagementPolicy;
use super::ports::{
    Clock, PreferencesStore, ProductSource, SalesSource, StoreProfileProvider, SuggestionStore,
    SystemClock, TextGenerator, WeatherService,
};
use super::scoring::SeverityModel;
use super::types::{
    CandidateFailure, GenerationReport, InsertOutcome, InventorySnapshot, SuggestionFilter,
    SuggestionWithProduct,
};
use crate::config::{EngineConfig, WeatherConfig};
use crate::domain::preferences::UserSuggestionPreferences;
use crate::domain::store::{StoreProfile, UserId};
use crate::domain::suggestion::{Suggestion, SuggestionId, SuggestionStatus};
use crate::errors::{ApplicationError, DomainError};

/// Runtime knobs of the engine, usually derived from [`EngineConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub default_expiry: Duration,
    pub generative_expiry: Duration,
    pub detector_timeout: StdDuration,
    pub sales_lookback_days: u32,
    pub default_country: String,
    pub default_popup_frequency_minutes: u32,
    pub engagement_reset_after: Duration,
    pub weather_forecast_days: u8,
}

impl EngineSettings {
    pub fn from_config(engine: &EngineConfig, weather: &WeatherConfig) -> Self {
        Self {
            default_expiry: Duration::hours(i64::from(engine.default_expiry_hours)),
            generative_expiry: Duration::hours(i64::from(engine.generative_expiry_hours)),
            detector_timeout: StdDuration::from_secs(engine.detector_timeout_secs),
            sales_lookback_days: engine.sales_lookback_days,
            default_country: engine.default_country.clone(),
            default_popup_frequency_minutes: engine.default_popup_frequency_minutes,
            engagement_reset_after: Duration::days(i64::from(engine.engagement_reset_days)),
            weather_forecast_days: weather.forecast_days,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), &WeatherConfig::default())
    }
}

/// Data sources and stores the engine reads from and writes to.
pub struct EngineCollaborators {
    pub products: Arc<dyn ProductSource>,
    pub sales: Arc<dyn SalesSource>,
    pub profiles: Arc<dyn StoreProfileProvider>,
    pub suggestions: Arc<dyn SuggestionStore>,
    pub preferences: Arc<dyn PreferencesStore>,
}

pub struct SuggestionEngine {
    products: Arc<dyn ProductSource>,
    sales: Arc<dyn SalesSource>,
    profiles: Arc<dyn StoreProfileProvider>,
    suggestions: Arc<dyn SuggestionStore>,
    engagement: EngagementPolicy,
    severity: SeverityModel,
    detectors: Vec<Arc<dyn Detector>>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl SuggestionEngine {
    pub fn new(collaborators: EngineCollaborators, settings: EngineSettings) -> Self {
        let engagement = EngagementPolicy::new(collaborators.preferences)
            .with_default_popup_frequency(settings.default_popup_frequency_minutes)
            .with_reset_after(settings.engagement_reset_after);

        Self {
            products: collaborators.products,
            sales: collaborators.sales,
            profiles: collaborators.profiles,
            suggestions: collaborators.suggestions,
            engagement,
            severity: SeverityModel::new(settings.default_expiry),
            detectors: rule_detectors(),
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_weather_service(mut self, service: Arc<dyn WeatherService>) -> Self {
        let detector = WeatherImpactDetector::new(service)
            .with_forecast_days(self.settings.weather_forecast_days);
        self.detectors.push(Arc::new(detector));
        self
    }

    pub fn with_text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        let detector = UseItUpDetector::new(generator).with_expiry(self.settings.generative_expiry);
        self.detectors.push(Arc::new(detector));
        self
    }

    /// Replaces the detector set entirely.
    pub fn with_detectors(mut self, detectors: Vec<Arc<dyn Detector>>) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|detector| detector.name()).collect()
    }

    /// Runs every detector and persists the new suggestions. Fails when any
    /// candidate could not be stored, after all of them were attempted.
    pub async fn generate_all_suggestions(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Suggestion>, ApplicationError> {
        let report = self.generate_report(user_id).await?;
        if let Some(first) = report.persistence_failures.first() {
            return Err(ApplicationError::Persistence(format!(
                "{} of {} suggestions for user `{}` could not be stored: {}",
                report.persistence_failures.len(),
                report.persistence_failures.len() + report.created.len() + report.duplicates_skipped,
                user_id.0,
                first.error
            )));
        }
        Ok(report.created)
    }

    pub async fn generate_report(
        &self,
        user_id: &UserId,
    ) -> Result<GenerationReport, ApplicationError> {
        let started = Instant::now();
        let now = self.clock.now();
        tracing::info!(
            event_name = "suggestions.generate.started",
            user_id = %user_id.0,
            detectors = self.detectors.len(),
            "generating suggestions"
        );

        let swept = self.suggestions.expire_stale(now, Some(user_id)).await?;
        if swept > 0 {
            tracing::debug!(
                event_name = "suggestions.presweep.completed",
                user_id = %user_id.0,
                expired = swept,
                "expired lapsed suggestions before detection"
            );
        }

        let snapshot = self.load_snapshot(user_id, now).await?;
        let mut report = GenerationReport::default();
        let mut candidates = Vec::new();

        for detector in &self.detectors {
            match tokio::time::timeout(self.settings.detector_timeout, detector.detect(&snapshot))
                .await
            {
                Ok(Ok(found)) => {
                    tracing::debug!(
                        event_name = "suggestions.detector.completed",
                        user_id = %user_id.0,
                        detector = detector.name(),
                        candidates = found.len(),
                        "detector completed"
                    );
                    candidates.extend(found);
                }
                Ok(Err(error)) => {
                    tracing::warn!(
                        event_name = "suggestions.detector.failed",
                        user_id = %user_id.0,
                        detector = detector.name(),
                        error = %error,
                        "detector failed, continuing with the others"
                    );
                    report.failed_detectors.push(detector.name().to_string());
                }
                Err(_) => {
                    tracing::warn!(
                        event_name = "suggestions.detector.timed_out",
                        user_id = %user_id.0,
                        detector = detector.name(),
                        timeout_ms = self.settings.detector_timeout.as_millis() as u64,
                        "detector timed out, continuing with the others"
                    );
                    report.failed_detectors.push(detector.name().to_string());
                }
            }
        }

        for candidate in candidates {
            let suggestion = self.severity.annotate(candidate, user_id, now);
            match self.persist(&suggestion).await {
                Ok(InsertOutcome::Inserted) => report.created.push(suggestion),
                Ok(InsertOutcome::Duplicate) => {
                    tracing::debug!(
                        event_name = "suggestions.dedup.skipped",
                        user_id = %user_id.0,
                        suggestion_type = suggestion.suggestion_type.as_str(),
                        content_hash = %suggestion.content_hash,
                        "equivalent suggestion still active"
                    );
                    report.duplicates_skipped += 1;
                }
                Err(error) => {
                    tracing::error!(
                        event_name = "suggestions.persist.failed",
                        user_id = %user_id.0,
                        suggestion_type = suggestion.suggestion_type.as_str(),
                        error = %error,
                        "failed to store suggestion"
                    );
                    report.persistence_failures.push(CandidateFailure {
                        suggestion_type: suggestion.suggestion_type,
                        content_hash: suggestion.content_hash,
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            event_name = "suggestions.generate.completed",
            user_id = %user_id.0,
            created = report.created.len(),
            duplicates_skipped = report.duplicates_skipped,
            failed_detectors = report.failed_detectors.len(),
            persistence_failures = report.persistence_failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "suggestion generation finished"
        );
        Ok(report)
    }

    async fn persist(&self, suggestion: &Suggestion) -> Result<InsertOutcome, ApplicationError> {
        if self
            .suggestions
            .find_active_by_hash(&suggestion.user_id, &suggestion.content_hash)
            .await?
            .is_some()
        {
            return Ok(InsertOutcome::Duplicate);
        }
        self.suggestions.insert(suggestion).await
    }

    async fn load_snapshot(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<InventorySnapshot, ApplicationError> {
        let products = self.products.products_for_user(user_id).await?;

        let lookback = self.settings.sales_lookback_days;
        let mut sales = HashMap::with_capacity(products.len());
        for product in &products {
            // Idle products skip the row fetch.
            let records = if self.sales.total_sold(&product.id, lookback, now).await? > 0.0 {
                self.sales.sales_for_product(&product.id, lookback, now).await?
            } else {
                Vec::new()
            };
            sales.insert(product.id.clone(), records);
        }

        let store = match self.profiles.store_info(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => StoreProfile::generic(self.settings.default_country.clone()),
            Err(error) => {
                tracing::warn!(
                    event_name = "suggestions.profile.fallback",
                    user_id = %user_id.0,
                    error = %error,
                    "store profile unavailable, using the generic profile"
                );
                StoreProfile::generic(self.settings.default_country.clone())
            }
        };

        Ok(InventorySnapshot::new(user_id.clone(), now, store, products, sales))
    }

    pub async fn get_unread_count(&self, user_id: &UserId) -> Result<u64, ApplicationError> {
        self.suggestions.unread_count(user_id, self.clock.now()).await
    }

    pub async fn get_user_suggestions(
        &self,
        user_id: &UserId,
        filter: &SuggestionFilter,
    ) -> Result<Vec<Suggestion>, ApplicationError> {
        self.suggestions.list_for_user(user_id, filter).await
    }

    /// Pairs each suggestion with its product; deleted products read as `None`.
    pub async fn get_user_suggestions_with_context(
        &self,
        user_id: &UserId,
        filter: &SuggestionFilter,
    ) -> Result<Vec<SuggestionWithProduct>, ApplicationError> {
        let suggestions = self.suggestions.list_for_user(user_id, filter).await?;
        let products = self
            .products
            .products_for_user(user_id)
            .await?
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect::<HashMap<_, _>>();

        Ok(suggestions
            .into_iter()
            .map(|suggestion| {
                let product =
                    suggestion.product_id.as_ref().and_then(|id| products.get(id)).cloned();
                SuggestionWithProduct { suggestion, product }
            })
            .collect())
    }

    /// Viewing an already viewed or acted suggestion only marks it read.
    pub async fn mark_suggestion_viewed(
        &self,
        id: &SuggestionId,
    ) -> Result<Suggestion, ApplicationError> {
        let current = self.require(id).await?;
        let now = self.clock.now();

        let updated = match current.status {
            SuggestionStatus::Viewed | SuggestionStatus::Acted => {
                self.suggestions.mark_read(id, now).await?;
                self.require(id).await?
            }
            _ => self.transition(current.clone(), SuggestionStatus::Viewed, None, now).await?,
        };

        self.engagement.record_interaction(&current.user_id, now).await?;
        Ok(updated)
    }

    pub async fn dismiss_suggestion(
        &self,
        id: &SuggestionId,
    ) -> Result<Suggestion, ApplicationError> {
        let current = self.require(id).await?;
        let now = self.clock.now();
        let updated = self.transition(current, SuggestionStatus::Dismissed, None, now).await?;
        self.engagement.record_interaction(&updated.user_id, now).await?;
        Ok(updated)
    }

    /// Records the action payload and closes the suggestion as acted.
    pub async fn act_on_suggestion(
        &self,
        id: &SuggestionId,
        action_payload: Value,
    ) -> Result<Suggestion, ApplicationError> {
        let current = self.require(id).await?;
        let now = self.clock.now();
        let updated = self
            .transition(current, SuggestionStatus::Acted, Some(action_payload), now)
            .await?;
        self.engagement.record_interaction(&updated.user_id, now).await?;
        Ok(updated)
    }

    async fn transition(
        &self,
        current: Suggestion,
        to: SuggestionStatus,
        action_result: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<Suggestion, ApplicationError> {
        let mut next = current.transitioned(to, now)?;
        if action_result.is_some() {
            next.action_result = action_result;
        }

        if self.suggestions.apply_transition(current.status, &next).await? {
            tracing::info!(
                event_name = "suggestions.lifecycle.transitioned",
                suggestion_id = %next.id.0,
                from = current.status.as_str(),
                to = to.as_str(),
                "suggestion status changed"
            );
            return Ok(next);
        }

        // Lost a race with another writer; report against the stored status.
        let stored = self.require(&current.id).await?;
        Err(DomainError::InvalidSuggestionTransition { from: stored.status, to }.into())
    }

    async fn require(&self, id: &SuggestionId) -> Result<Suggestion, ApplicationError> {
        self.suggestions
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("suggestion `{}`", id.0)))
    }

    /// Expires every active suggestion past its deadline, for all users.
    pub async fn cleanup_expired_suggestions(&self) -> Result<u64, ApplicationError> {
        let expired = self.suggestions.expire_stale(self.clock.now(), None).await?;
        tracing::info!(
            event_name = "suggestions.cleanup.completed",
            expired,
            "expired suggestion sweep finished"
        );
        Ok(expired)
    }

    pub async fn get_preferences(
        &self,
        user_id: &UserId,
    ) -> Result<UserSuggestionPreferences, ApplicationError> {
        self.engagement.get_or_create_preferences(user_id, self.clock.now()).await
    }

    pub async fn should_show_popup(&self, user_id: &UserId) -> Result<bool, ApplicationError> {
        self.engagement.should_show_popup(user_id, self.clock.now()).await
    }

    pub async fn record_popup_shown(
        &self,
        user_id: &UserId,
    ) -> Result<UserSuggestionPreferences, ApplicationError> {
        self.engagement.record_popup_shown(user_id, self.clock.now()).await
    }

    pub async fn update_popup_frequency(
        &self,
        user_id: &UserId,
        minutes: u32,
    ) -> Result<UserSuggestionPreferences, ApplicationError> {
        self.engagement.update_popup_frequency(user_id, minutes, self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use super::{EngineCollaborators, EngineSettings, SuggestionEngine};
    use crate::domain::product::{ProductId, ProductSnapshot};
    use crate::domain::sales::SaleRecord;
    use crate::domain::store::UserId;
    use crate::domain::suggestion::{
        Suggestion, SuggestionDomain, SuggestionId, SuggestionPriority, SuggestionStatus,
        SuggestionType,
    };
    use crate::errors::{ApplicationError, DomainError};
    use crate::suggestions::detectors::{Detector, RuptureDetector};
    use crate::suggestions::memory::{
        InMemoryCatalog, InMemoryPreferencesStore, InMemorySuggestionStore,
    };
    use crate::suggestions::ports::{Clock, SalesSource, SuggestionStore};
    use crate::suggestions::types::{
        CandidateSuggestion, InsertOutcome, InventorySnapshot, SuggestionFilter,
    };

    struct TestClock(Mutex<DateTime<Utc>>);

    impl TestClock {
        fn at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(now)))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().expect("clock lock");
            *now += by;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().expect("clock lock")
        }
    }

    struct Harness {
        engine: SuggestionEngine,
        catalog: Arc<InMemoryCatalog>,
        store: Arc<InMemorySuggestionStore>,
        clock: Arc<TestClock>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap()
    }

    fn user() -> UserId {
        UserId("u-1".to_string())
    }

    async fn harness_with(
        suggestions: Arc<dyn SuggestionStore>,
        settings: EngineSettings,
    ) -> (SuggestionEngine, Arc<InMemoryCatalog>, Arc<TestClock>) {
        let catalog = Arc::new(InMemoryCatalog::default());
        catalog
            .upsert_product(ProductSnapshot {
                id: ProductId("p-croissant".to_string()),
                user_id: user(),
                name: "Croissant".to_string(),
                current_quantity: 5.0,
                unit: "pcs".to_string(),
                alert_threshold: 10.0,
                supplier: None,
                category: Some("Viennoiserie".to_string()),
                expiry_date: None,
            })
            .await;
        for day in 0..7 {
            catalog
                .record_sale(SaleRecord {
                    product_id: ProductId("p-croissant".to_string()),
                    quantity_sold: 10.0,
                    sale_date: start() - Duration::days(day) - Duration::hours(2),
                })
                .await;
        }

        let clock = TestClock::at(start());
        let engine = SuggestionEngine::new(
            EngineCollaborators {
                products: catalog.clone(),
                sales: catalog.clone(),
                profiles: catalog.clone(),
                suggestions,
                preferences: Arc::new(InMemoryPreferencesStore::default()),
            },
            settings,
        )
        .with_clock(clock.clone());
        (engine, catalog, clock)
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemorySuggestionStore::default());
        let (engine, catalog, clock) = harness_with(store.clone(), EngineSettings::default()).await;
        Harness { engine, catalog, store, clock }
    }

    #[tokio::test]
    async fn croissant_scenario_is_idempotent() {
        let h = harness().await;

        let first = h.engine.generate_all_suggestions(&user()).await.expect("first run");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].suggestion_type, SuggestionType::Rupture);
        assert_eq!(first[0].priority, SuggestionPriority::Critical);
        assert_eq!(first[0].severity_score, 100);
        assert_eq!(first[0].action_data["suggested_quantity"], 70.0);

        let second = h.engine.generate_report(&user()).await.expect("second run");
        assert!(second.created.is_empty());
        assert_eq!(second.duplicates_skipped, 1);
        assert_eq!(h.store.all().await.len(), 1);
    }

    struct FailingDetector;

    #[async_trait]
    impl Detector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn detect(
            &self,
            _snapshot: &InventorySnapshot,
        ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
            Err(ApplicationError::Integration("language service unreachable".to_string()))
        }
    }

    struct SlowDetector;

    #[async_trait]
    impl Detector for SlowDetector {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn detect(
            &self,
            _snapshot: &InventorySnapshot,
        ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
            tokio::time::sleep(StdDuration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn failing_and_slow_detectors_do_not_block_the_others() {
        let settings = EngineSettings {
            detector_timeout: StdDuration::from_millis(50),
            ..EngineSettings::default()
        };
        let (engine, _, _) =
            harness_with(Arc::new(InMemorySuggestionStore::default()), settings).await;
        let engine = engine.with_detectors(vec![
            Arc::new(FailingDetector),
            Arc::new(SlowDetector),
            Arc::new(RuptureDetector),
        ]);

        let report = engine.generate_report(&user()).await.expect("report");

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.failed_detectors, vec!["failing".to_string(), "slow".to_string()]);
    }

    struct BrokenStore;

    #[async_trait]
    impl SuggestionStore for BrokenStore {
        async fn find_active_by_hash(
            &self,
            _user_id: &UserId,
            _content_hash: &str,
        ) -> Result<Option<Suggestion>, ApplicationError> {
            Ok(None)
        }

        async fn insert(&self, _suggestion: &Suggestion) -> Result<InsertOutcome, ApplicationError> {
            Err(ApplicationError::Persistence("disk full".to_string()))
        }

        async fn find_by_id(
            &self,
            _id: &SuggestionId,
        ) -> Result<Option<Suggestion>, ApplicationError> {
            Ok(None)
        }

        async fn list_for_user(
            &self,
            _user_id: &UserId,
            _filter: &SuggestionFilter,
        ) -> Result<Vec<Suggestion>, ApplicationError> {
            Ok(Vec::new())
        }

        async fn apply_transition(
            &self,
            _expected: SuggestionStatus,
            _next: &Suggestion,
        ) -> Result<bool, ApplicationError> {
            Ok(false)
        }

        async fn mark_read(
            &self,
            _id: &SuggestionId,
            _at: DateTime<Utc>,
        ) -> Result<bool, ApplicationError> {
            Ok(false)
        }

        async fn unread_count(
            &self,
            _user_id: &UserId,
            _now: DateTime<Utc>,
        ) -> Result<u64, ApplicationError> {
            Ok(0)
        }

        async fn expire_stale(
            &self,
            _now: DateTime<Utc>,
            _user_id: Option<&UserId>,
        ) -> Result<u64, ApplicationError> {
            Ok(0)
        }
    }

    struct TwoCandidates;

    #[async_trait]
    impl Detector for TwoCandidates {
        fn name(&self) -> &'static str {
            "two"
        }

        async fn detect(
            &self,
            _snapshot: &InventorySnapshot,
        ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
            Ok(["Check the cold room", "Check the display fridge"]
                .into_iter()
                .map(|message| {
                    CandidateSuggestion::new(
                        SuggestionType::Anomaly,
                        SuggestionDomain::Operations,
                        SuggestionPriority::Low,
                        "Equipment",
                        message,
                    )
                })
                .collect())
        }
    }

    struct CountingSales {
        inner: Arc<InMemoryCatalog>,
        row_fetches: Mutex<Vec<ProductId>>,
    }

    #[async_trait]
    impl SalesSource for CountingSales {
        async fn sales_for_product(
            &self,
            product_id: &ProductId,
            days_back: u32,
            as_of: DateTime<Utc>,
        ) -> Result<Vec<SaleRecord>, ApplicationError> {
            self.row_fetches.lock().expect("fetch log").push(product_id.clone());
            self.inner.sales_for_product(product_id, days_back, as_of).await
        }

        async fn total_sold(
            &self,
            product_id: &ProductId,
            days_back: u32,
            as_of: DateTime<Utc>,
        ) -> Result<f64, ApplicationError> {
            self.inner.total_sold(product_id, days_back, as_of).await
        }
    }

    #[tokio::test]
    async fn idle_products_skip_the_sales_row_fetch() {
        let (_, catalog, _) =
            harness_with(Arc::new(InMemorySuggestionStore::default()), EngineSettings::default())
                .await;
        catalog
            .upsert_product(ProductSnapshot {
                id: ProductId("p-idle".to_string()),
                user_id: user(),
                name: "Cannelé".to_string(),
                current_quantity: 3.0,
                unit: "pcs".to_string(),
                alert_threshold: 10.0,
                supplier: None,
                category: None,
                expiry_date: None,
            })
            .await;
        let sales = Arc::new(CountingSales { inner: catalog.clone(), row_fetches: Mutex::new(Vec::new()) });
        let engine = SuggestionEngine::new(
            EngineCollaborators {
                products: catalog.clone(),
                sales: sales.clone(),
                profiles: catalog.clone(),
                suggestions: Arc::new(InMemorySuggestionStore::default()),
                preferences: Arc::new(InMemoryPreferencesStore::default()),
            },
            EngineSettings::default(),
        )
        .with_clock(TestClock::at(start()));

        let report = engine.generate_report(&user()).await.expect("report");

        assert_eq!(report.created.len(), 1);
        let fetched = sales.row_fetches.lock().expect("fetch log").clone();
        assert_eq!(fetched, vec![ProductId("p-croissant".to_string())]);
    }

    struct RepeatedCandidate;

    #[async_trait]
    impl Detector for RepeatedCandidate {
        fn name(&self) -> &'static str {
            "repeated"
        }

        async fn detect(
            &self,
            _snapshot: &InventorySnapshot,
        ) -> Result<Vec<CandidateSuggestion>, ApplicationError> {
            let candidate = CandidateSuggestion::new(
                SuggestionType::Rupture,
                SuggestionDomain::Stock,
                SuggestionPriority::High,
                "Low stock",
                "Croissant will run out within three days at the current pace",
            )
            .for_product(&ProductId("p-croissant".to_string()));
            Ok(vec![candidate.clone(), candidate])
        }
    }

    #[tokio::test]
    async fn identical_candidates_in_one_run_collapse_to_one_row() {
        let h = harness().await;
        let engine = h.engine.with_detectors(vec![Arc::new(RepeatedCandidate)]);

        let report = engine.generate_report(&user()).await.expect("report");

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.duplicates_skipped, 1);
        assert_eq!(h.store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn persistence_failures_are_collected_then_reported() {
        let (engine, _, _) = harness_with(Arc::new(BrokenStore), EngineSettings::default()).await;
        let engine = engine.with_detectors(vec![Arc::new(TwoCandidates)]);

        let report = engine.generate_report(&user()).await.expect("report");
        assert_eq!(report.persistence_failures.len(), 2, "every candidate is attempted");

        let error = engine.generate_all_suggestions(&user()).await.expect_err("must fail");
        assert!(matches!(error, ApplicationError::Persistence(message) if message.contains("2 of 2")));
    }

    #[tokio::test]
    async fn lifecycle_moves_are_guarded_and_count_as_engagement() {
        let h = harness().await;
        let created = h.engine.generate_all_suggestions(&user()).await.expect("generate");
        let id = created[0].id.clone();
        assert_eq!(h.engine.get_unread_count(&user()).await.expect("count"), 1);

        let viewed = h.engine.mark_suggestion_viewed(&id).await.expect("view");
        assert_eq!(viewed.status, SuggestionStatus::Viewed);
        assert!(viewed.is_read);
        assert_eq!(h.engine.get_unread_count(&user()).await.expect("count"), 0);

        let acted = h
            .engine
            .act_on_suggestion(&id, json!({ "ordered": 70 }))
            .await
            .expect("act");
        assert_eq!(acted.status, SuggestionStatus::Acted);
        assert_eq!(acted.action_result, Some(json!({ "ordered": 70 })));
        assert_eq!(acted.acted_at, Some(start()));

        let again = h.engine.mark_suggestion_viewed(&id).await.expect("re-view");
        assert_eq!(again.status, SuggestionStatus::Acted);

        let error = h.engine.dismiss_suggestion(&id).await.expect_err("terminal");
        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::InvalidSuggestionTransition {
                from: SuggestionStatus::Acted,
                to: SuggestionStatus::Dismissed,
            })
        );

        let prefs = h.engine.get_preferences(&user()).await.expect("prefs");
        assert_eq!(prefs.engagement_score, 3);
    }

    #[tokio::test]
    async fn unknown_suggestion_is_not_found() {
        let h = harness().await;
        let error = h
            .engine
            .dismiss_suggestion(&SuggestionId("sg-missing".to_string()))
            .await
            .expect_err("missing");
        assert!(matches!(error, ApplicationError::NotFound(_)));
    }

    #[tokio::test]
    async fn cleanup_expires_pending_rows_and_leaves_closed_ones() {
        let h = harness().await;
        let created = h.engine.generate_all_suggestions(&user()).await.expect("generate");
        let mut other = created[0].clone();
        other.id = SuggestionId("sg-acted".to_string());
        other.content_hash = "acted-hash".to_string();
        other.status = SuggestionStatus::Acted;
        h.store.insert(&other).await.expect("insert");

        h.clock.advance(Duration::hours(25));
        assert_eq!(h.engine.cleanup_expired_suggestions().await.expect("cleanup"), 1);
        assert_eq!(h.engine.cleanup_expired_suggestions().await.expect("cleanup"), 0);

        let rows = h.store.all().await;
        let status_of = |id: &SuggestionId| {
            rows.iter().find(|row| &row.id == id).map(|row| row.status)
        };
        assert_eq!(status_of(&created[0].id), Some(SuggestionStatus::Expired));
        assert_eq!(status_of(&other.id), Some(SuggestionStatus::Acted));
    }

    #[tokio::test]
    async fn lapsed_rows_do_not_suppress_fresh_candidates() {
        let h = harness().await;
        h.engine.generate_all_suggestions(&user()).await.expect("first");

        h.clock.advance(Duration::hours(25));
        let again = h.engine.generate_all_suggestions(&user()).await.expect("second");

        assert_eq!(again.len(), 1, "pre-sweep expired the old row");
    }

    #[tokio::test]
    async fn deleted_products_leave_suggestions_readable() {
        let h = harness().await;
        h.engine.generate_all_suggestions(&user()).await.expect("generate");
        h.catalog.remove_product(&ProductId("p-croissant".to_string())).await;

        let rows = h
            .engine
            .get_user_suggestions_with_context(&user(), &SuggestionFilter::default())
            .await
            .expect("list");

        assert_eq!(rows.len(), 1);
        assert!(rows[0].product.is_none());
        assert_eq!(rows[0].suggestion.product_id, Some(ProductId("p-croissant".to_string())));
    }

    #[tokio::test]
    async fn popup_gate_uses_configured_frequency() {
        let h = harness().await;
        assert!(h.engine.should_show_popup(&user()).await.expect("check"));

        h.engine.record_popup_shown(&user()).await.expect("record");
        assert!(!h.engine.should_show_popup(&user()).await.expect("check"));

        h.clock.advance(Duration::minutes(120));
        assert!(h.engine.should_show_popup(&user()).await.expect("check"));
    }
}
