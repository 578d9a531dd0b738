use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use stockpulse_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run(options: LoadOptions) -> String {
    let config_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_doc = load_config_file_doc(config_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(&field, config_doc.as_ref(), config_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }
    lines.join("\n")
}

fn field(key: &'static str, env_keys: &'static [&'static str], value: String) -> Field {
    Field { key, env_keys, value }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("database.url", &["STOCKPULSE_DATABASE_URL"], config.database.url.clone()),
        field(
            "database.max_connections",
            &["STOCKPULSE_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            &["STOCKPULSE_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        field("llm.enabled", &["STOCKPULSE_LLM_ENABLED"], config.llm.enabled.to_string()),
        field("llm.provider", &["STOCKPULSE_LLM_PROVIDER"], format!("{:?}", config.llm.provider)),
        field("llm.model", &["STOCKPULSE_LLM_MODEL"], config.llm.model.clone()),
        field(
            "llm.base_url",
            &["STOCKPULSE_LLM_BASE_URL"],
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field(
            "llm.api_key",
            &["STOCKPULSE_LLM_API_KEY"],
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
        ),
        field("weather.enabled", &["STOCKPULSE_WEATHER_ENABLED"], config.weather.enabled.to_string()),
        field(
            "weather.forecast_days",
            &["STOCKPULSE_WEATHER_FORECAST_DAYS"],
            config.weather.forecast_days.to_string(),
        ),
        field(
            "engine.detector_timeout_secs",
            &["STOCKPULSE_ENGINE_DETECTOR_TIMEOUT_SECS"],
            config.engine.detector_timeout_secs.to_string(),
        ),
        field(
            "engine.default_popup_frequency_minutes",
            &[],
            config.engine.default_popup_frequency_minutes.to_string(),
        ),
        field(
            "engine.sales_lookback_days",
            &[],
            config.engine.sales_lookback_days.to_string(),
        ),
        field(
            "engine.default_country",
            &["STOCKPULSE_ENGINE_DEFAULT_COUNTRY"],
            config.engine.default_country.clone(),
        ),
        field(
            "logging.level",
            &["STOCKPULSE_LOGGING_LEVEL", "STOCKPULSE_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["STOCKPULSE_LOGGING_FORMAT", "STOCKPULSE_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    [PathBuf::from("stockpulse.toml"), PathBuf::from("config/stockpulse.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, config_doc: Option<&Value>, config_path: Option<&Path>) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_doc.is_some_and(|doc| contains_path(doc, field.key)) {
        let file_path = config_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::contains_path;

    #[test]
    fn dotted_paths_walk_nested_tables() {
        let doc: toml::Value = "[llm]\nmodel = \"gpt-4o-mini\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "database.url"));
    }
}
