pub mod cleanup;
pub mod config;
pub mod generate;
pub mod list;
pub mod migrate;
pub mod popup;
pub mod respond;
pub mod schedule;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use stockpulse_core::config::LoadOptions;
use stockpulse_core::errors::ApplicationError;

use crate::bootstrap::{bootstrap, Application};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::outcome(command, None, message.into(), None, 0)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Value) -> Self {
        Self::outcome(command, None, message.into(), Some(data), 0)
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::outcome(command, Some(error_class), message.into(), None, exit_code)
    }

    /// Maps an engine error onto the CLI's error classes.
    pub fn from_application_error(command: &str, error: &ApplicationError) -> Self {
        let (error_class, exit_code) = match error {
            ApplicationError::Domain(_) => ("invalid_transition", 2),
            ApplicationError::NotFound(_) => ("not_found", 7),
            ApplicationError::Persistence(_) => ("persistence", 8),
            ApplicationError::Integration(_) => ("integration", 9),
            ApplicationError::Configuration(_) => ("config_validation", 2),
        };
        Self::failure(command, error_class, error.to_string(), exit_code)
    }

    fn outcome(
        command: &str,
        error_class: Option<&str>,
        message: String,
        data: Option<Value>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: if error_class.is_some() { "error" } else { "ok" }.to_string(),
            error_class: error_class.map(str::to_string),
            message,
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Boots the application on a fresh runtime and hands it to `body`.
pub(crate) fn with_application<F, Fut>(command: &str, options: LoadOptions, body: F) -> CommandResult
where
    F: FnOnce(Application) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        match bootstrap(options).await {
            Ok(app) => {
                let pool = app.db_pool.clone();
                let result = body(app).await;
                pool.close().await;
                result
            }
            Err(error) => {
                let (error_class, exit_code) = error.classify();
                CommandResult::failure(command, error_class, error.to_string(), exit_code)
            }
        }
    })
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
