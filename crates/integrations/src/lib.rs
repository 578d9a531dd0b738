//! Outbound HTTP adapters for the suggestion engine ports.

use std::time::Duration;

use stockpulse_core::errors::ApplicationError;

pub mod llm;
pub mod weather;

pub use llm::HttpTextGenerator;
pub use weather::OpenMeteoWeatherService;

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ApplicationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("stockpulse/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|error| ApplicationError::Configuration(format!("http client: {error}")))
}
