use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::preferences::{DEFAULT_ENGAGEMENT_RESET_DAYS, DEFAULT_POPUP_FREQUENCY_MINUTES};

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub weather: WeatherConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub geocoding_base_url: String,
    pub forecast_base_url: String,
    pub forecast_days: u8,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_popup_frequency_minutes: u32,
    pub engagement_reset_days: u32,
    pub default_expiry_hours: u32,
    pub generative_expiry_hours: u32,
    pub detector_timeout_secs: u64,
    pub sales_lookback_days: u32,
    /// Country used when a store has no profile.
    pub default_country: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_enabled: Option<bool>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub weather_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://stockpulse.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: LlmProvider::Ollama,
            api_key: None,
            base_url: Some("http://localhost:11434".to_string()),
            model: "llama3.1".to_string(),
            timeout_secs: 20,
            max_retries: 1,
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            geocoding_base_url: "https://geocoding-api.open-meteo.com".to_string(),
            forecast_base_url: "https://api.open-meteo.com".to_string(),
            forecast_days: 3,
            timeout_secs: 5,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_popup_frequency_minutes: DEFAULT_POPUP_FREQUENCY_MINUTES,
            engagement_reset_days: DEFAULT_ENGAGEMENT_RESET_DAYS as u32,
            default_expiry_hours: 24,
            generative_expiry_hours: 12,
            detector_timeout_secs: 30,
            sales_lookback_days: 30,
            default_country: "FR".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("stockpulse.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(enabled) = llm.enabled {
                self.llm.enabled = enabled;
            }
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(weather) = patch.weather {
            if let Some(enabled) = weather.enabled {
                self.weather.enabled = enabled;
            }
            if let Some(url) = weather.geocoding_base_url {
                self.weather.geocoding_base_url = url;
            }
            if let Some(url) = weather.forecast_base_url {
                self.weather.forecast_base_url = url;
            }
            if let Some(forecast_days) = weather.forecast_days {
                self.weather.forecast_days = forecast_days;
            }
            if let Some(timeout_secs) = weather.timeout_secs {
                self.weather.timeout_secs = timeout_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(minutes) = engine.default_popup_frequency_minutes {
                self.engine.default_popup_frequency_minutes = minutes;
            }
            if let Some(days) = engine.engagement_reset_days {
                self.engine.engagement_reset_days = days;
            }
            if let Some(hours) = engine.default_expiry_hours {
                self.engine.default_expiry_hours = hours;
            }
            if let Some(hours) = engine.generative_expiry_hours {
                self.engine.generative_expiry_hours = hours;
            }
            if let Some(secs) = engine.detector_timeout_secs {
                self.engine.detector_timeout_secs = secs;
            }
            if let Some(days) = engine.sales_lookback_days {
                self.engine.sales_lookback_days = days;
            }
            if let Some(country) = engine.default_country {
                self.engine.default_country = country;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STOCKPULSE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STOCKPULSE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("STOCKPULSE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("STOCKPULSE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("STOCKPULSE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOCKPULSE_LLM_ENABLED") {
            self.llm.enabled = parse_bool("STOCKPULSE_LLM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("STOCKPULSE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("STOCKPULSE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("STOCKPULSE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("STOCKPULSE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("STOCKPULSE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("STOCKPULSE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("STOCKPULSE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("STOCKPULSE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("STOCKPULSE_WEATHER_ENABLED") {
            self.weather.enabled = parse_bool("STOCKPULSE_WEATHER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("STOCKPULSE_WEATHER_FORECAST_DAYS") {
            self.weather.forecast_days = parse_u8("STOCKPULSE_WEATHER_FORECAST_DAYS", &value)?;
        }
        if let Some(value) = read_env("STOCKPULSE_WEATHER_TIMEOUT_SECS") {
            self.weather.timeout_secs = parse_u64("STOCKPULSE_WEATHER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOCKPULSE_ENGINE_DETECTOR_TIMEOUT_SECS") {
            self.engine.detector_timeout_secs =
                parse_u64("STOCKPULSE_ENGINE_DETECTOR_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("STOCKPULSE_ENGINE_DEFAULT_COUNTRY") {
            self.engine.default_country = value;
        }

        let log_level =
            read_env("STOCKPULSE_LOGGING_LEVEL").or_else(|| read_env("STOCKPULSE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STOCKPULSE_LOGGING_FORMAT").or_else(|| read_env("STOCKPULSE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(enabled) = overrides.weather_enabled {
            self.weather.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_weather(&self.weather)?;
        validate_engine(&self.engine)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("stockpulse.toml"), PathBuf::from("config/stockpulse.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if !llm.enabled {
        return Ok(());
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_weather(weather: &WeatherConfig) -> Result<(), ConfigError> {
    if !weather.enabled {
        return Ok(());
    }

    for (field, url) in [
        ("weather.geocoding_base_url", &weather.geocoding_base_url),
        ("weather.forecast_base_url", &weather.forecast_base_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{field} must start with http:// or https://"
            )));
        }
    }

    if weather.forecast_days == 0 || weather.forecast_days > 16 {
        return Err(ConfigError::Validation(
            "weather.forecast_days must be in range 1..=16".to_string(),
        ));
    }

    if weather.timeout_secs == 0 || weather.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "weather.timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.default_popup_frequency_minutes == 0 {
        return Err(ConfigError::Validation(
            "engine.default_popup_frequency_minutes must be at least 1".to_string(),
        ));
    }
    if engine.engagement_reset_days == 0 {
        return Err(ConfigError::Validation(
            "engine.engagement_reset_days must be greater than zero".to_string(),
        ));
    }
    if engine.default_expiry_hours == 0 || engine.generative_expiry_hours == 0 {
        return Err(ConfigError::Validation(
            "engine.default_expiry_hours and engine.generative_expiry_hours must be greater than zero"
                .to_string(),
        ));
    }
    if engine.detector_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "engine.detector_timeout_secs must be greater than zero".to_string(),
        ));
    }
    // Anomaly needs two full weeks of history.
    if engine.sales_lookback_days < 14 {
        return Err(ConfigError::Validation(
            "engine.sales_lookback_days must be at least 14".to_string(),
        ));
    }
    if engine.default_country.trim().is_empty() {
        return Err(ConfigError::Validation(
            "engine.default_country must not be empty (for example `FR`)".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    weather: Option<WeatherPatch>,
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    enabled: Option<bool>,
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WeatherPatch {
    enabled: Option<bool>,
    geocoding_base_url: Option<String>,
    forecast_base_url: Option<String>,
    forecast_days: Option<u8>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    default_popup_frequency_minutes: Option<u32>,
    engagement_reset_days: Option<u32>,
    default_expiry_hours: Option<u32>,
    generative_expiry_hours: Option<u32>,
    detector_timeout_secs: Option<u64>,
    sales_lookback_days: Option<u32>,
    default_country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
