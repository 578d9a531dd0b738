use serde_json::json;
use stockpulse_core::config::LoadOptions;

use crate::commands::{with_application, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    with_application("cleanup", options, |app| async move {
        match app.engine.cleanup_expired_suggestions().await {
            Ok(expired) => CommandResult::success_with_data(
                "cleanup",
                format!("expired {expired} suggestion(s)"),
                json!({ "expired": expired }),
            ),
            Err(error) => CommandResult::from_application_error("cleanup", &error),
        }
    })
}
