use std::sync::Arc;

use stockpulse_core::config::{AppConfig, ConfigError, LoadOptions};
use stockpulse_core::errors::ApplicationError;
use stockpulse_core::suggestions::{EngineCollaborators, EngineSettings, SuggestionEngine};
use stockpulse_db::{
    connect_from_config, migrations, DbPool, SqlPreferencesStore, SqlProductRepository,
    SqlSalesRepository, SqlStoreProfileRepository, SqlSuggestionStore,
};
use stockpulse_integrations::{HttpTextGenerator, OpenMeteoWeatherService};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: SuggestionEngine,
    pub store_users: SqlStoreProfileRepository,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("integration setup failed: {0}")]
    Integration(#[source] ApplicationError),
}

impl BootstrapError {
    /// Stable error class and process exit code for CLI output.
    pub fn classify(&self) -> (&'static str, u8) {
        match self {
            Self::Config(_) => ("config_validation", 2),
            Self::DatabaseConnect(_) => ("db_connectivity", 4),
            Self::Migration(_) => ("migration", 5),
            Self::Integration(_) => ("integration_setup", 6),
        }
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        database_url = %config.database.url,
        "database ready"
    );

    let engine = build_engine(&config, &db_pool).map_err(BootstrapError::Integration)?;
    info!(
        event_name = "system.bootstrap.engine_ready",
        detectors = ?engine.detector_names(),
        "suggestion engine assembled"
    );

    Ok(Application {
        store_users: SqlStoreProfileRepository::new(db_pool.clone()),
        config,
        db_pool,
        engine,
    })
}

/// Wires the SQL adapters into the engine and attaches the optional
/// weather and text-generation detectors when enabled.
pub fn build_engine(config: &AppConfig, pool: &DbPool) -> Result<SuggestionEngine, ApplicationError> {
    let collaborators = EngineCollaborators {
        products: Arc::new(SqlProductRepository::new(pool.clone())),
        sales: Arc::new(SqlSalesRepository::new(pool.clone())),
        profiles: Arc::new(SqlStoreProfileRepository::new(pool.clone())),
        suggestions: Arc::new(SqlSuggestionStore::new(pool.clone())),
        preferences: Arc::new(SqlPreferencesStore::new(pool.clone())),
    };
    let settings = EngineSettings::from_config(&config.engine, &config.weather);
    let mut engine = SuggestionEngine::new(collaborators, settings);

    if config.weather.enabled {
        engine = engine
            .with_weather_service(Arc::new(OpenMeteoWeatherService::from_config(&config.weather)?));
    }
    if config.llm.enabled {
        engine = engine.with_text_generator(Arc::new(HttpTextGenerator::from_config(&config.llm)?));
    }

    Ok(engine)
}
