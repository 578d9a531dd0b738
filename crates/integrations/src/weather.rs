//! Open-Meteo geocoding and daily forecast lookups.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use stockpulse_core::config::WeatherConfig;
use stockpulse_core::errors::ApplicationError;
use stockpulse_core::suggestions::ports::WeatherService;
use stockpulse_core::suggestions::{DailyForecast, WeatherForecast};

const MAX_FORECAST_DAYS: u8 = 16;

pub struct OpenMeteoWeatherService {
    client: reqwest::Client,
    geocoding_base_url: String,
    forecast_base_url: String,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeocodingResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: DailySeries,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    time: Vec<NaiveDate>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    weathercode: Vec<Option<u16>>,
}

impl OpenMeteoWeatherService {
    pub fn from_config(config: &WeatherConfig) -> Result<Self, ApplicationError> {
        Ok(Self {
            client: crate::http_client(config.timeout_secs)?,
            geocoding_base_url: config.geocoding_base_url.trim_end_matches('/').to_string(),
            forecast_base_url: config.forecast_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn geocode(&self, city: &str, country: &str) -> Result<(f64, f64), String> {
        let body = self
            .client
            .get(format!("{}/v1/search", self.geocoding_base_url))
            .query(&[("name", city), ("count", "1"), ("format", "json"), ("countryCode", country)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| format!("geocoding request failed: {error}"))?
            .text()
            .await
            .map_err(|error| format!("geocoding body unreadable: {error}"))?;

        parse_coordinates(&body)?.ok_or_else(|| format!("no coordinates for `{city}`"))
    }

    async fn daily_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        days: u8,
    ) -> Result<WeatherForecast, String> {
        let body = self
            .client
            .get(format!("{}/v1/forecast", self.forecast_base_url))
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("daily", "weathercode,temperature_2m_max,temperature_2m_min".to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", days.clamp(1, MAX_FORECAST_DAYS).to_string()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| format!("forecast request failed: {error}"))?
            .text()
            .await
            .map_err(|error| format!("forecast body unreadable: {error}"))?;

        parse_forecast(&body)
    }
}

#[async_trait]
impl WeatherService for OpenMeteoWeatherService {
    async fn forecast(&self, city: &str, country: &str, days: u8) -> Option<WeatherForecast> {
        let lookup = async {
            let (latitude, longitude) = self.geocode(city, country).await?;
            self.daily_forecast(latitude, longitude, days).await
        };

        match lookup.await {
            Ok(forecast) => Some(forecast),
            Err(error) => {
                tracing::warn!(
                    event_name = "integrations.weather.failed",
                    city,
                    country,
                    error = %error,
                    "weather lookup failed"
                );
                None
            }
        }
    }
}

fn parse_coordinates(body: &str) -> Result<Option<(f64, f64)>, String> {
    let response: GeocodingResponse =
        serde_json::from_str(body).map_err(|error| format!("invalid geocoding payload: {error}"))?;
    Ok(response.results.first().map(|result| (result.latitude, result.longitude)))
}

/// Days with a missing temperature are skipped.
fn parse_forecast(body: &str) -> Result<WeatherForecast, String> {
    let response: ForecastResponse =
        serde_json::from_str(body).map_err(|error| format!("invalid forecast payload: {error}"))?;
    let daily = response.daily;

    let forecasts = daily
        .time
        .iter()
        .enumerate()
        .filter_map(|(index, date)| {
            let temp_max = daily.temperature_2m_max.get(index).copied().flatten()?;
            let temp_min = daily.temperature_2m_min.get(index).copied().flatten()?;
            let code = daily.weathercode.get(index).copied().flatten();
            Some(DailyForecast {
                date: *date,
                temp_min,
                temp_max,
                condition: code.map_or("unknown", condition_for_code).to_string(),
            })
        })
        .collect();

    Ok(WeatherForecast { forecasts })
}

/// WMO weather interpretation codes as used by Open-Meteo.
pub fn condition_for_code(code: u16) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 | 48 => "fog",
        51..=57 => "drizzle",
        61..=67 => "rain",
        71..=77 => "snow",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95..=99 => "thunderstorm",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{condition_for_code, parse_coordinates, parse_forecast};

    #[test]
    fn first_geocoding_hit_wins() {
        let body = r#"{"results": [
            {"name": "Lyon", "latitude": 45.748, "longitude": 4.847, "country_code": "FR"},
            {"name": "Lyons", "latitude": 43.0, "longitude": -77.0, "country_code": "US"}
        ]}"#;
        assert_eq!(parse_coordinates(body).expect("parse"), Some((45.748, 4.847)));
        assert_eq!(parse_coordinates(r#"{"generationtime_ms": 0.5}"#).expect("parse"), None);
    }

    #[test]
    fn daily_series_become_forecast_days() {
        let body = r#"{"daily": {
            "time": ["2026-07-01", "2026-07-02", "2026-07-03"],
            "temperature_2m_max": [31.2, null, 27.0],
            "temperature_2m_min": [19.5, 18.0, 16.1],
            "weathercode": [0, 3, 95]
        }}"#;
        let forecast = parse_forecast(body).expect("parse");

        assert_eq!(forecast.forecasts.len(), 2);
        assert_eq!(forecast.forecasts[0].date, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
        assert_eq!(forecast.forecasts[0].condition, "clear sky");
        assert_eq!(forecast.forecasts[1].condition, "thunderstorm");
        assert_eq!(forecast.max_temperature(), Some(31.2));
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(parse_forecast(r#"{"error": true, "reason": "bad latitude"}"#).is_err());
        assert!(parse_coordinates("<html>").is_err());
    }

    #[test]
    fn rainy_codes_read_as_rain() {
        for code in [53, 63, 81] {
            let condition = condition_for_code(code);
            assert!(condition.contains("rain") || condition.contains("drizzle"), "{code}");
        }
        assert_eq!(condition_for_code(42), "unknown");
    }
}
