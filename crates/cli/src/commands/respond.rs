use anyhow::{bail, Context};
use serde_json::Value;
use stockpulse_core::config::LoadOptions;
use stockpulse_core::domain::suggestion::SuggestionId;

use crate::commands::{to_data, with_application, CommandResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    View,
    Dismiss,
    Act(Value),
}

pub fn parse_response(action: &str, payload: Option<&str>) -> anyhow::Result<Response> {
    match action.trim().to_ascii_lowercase().as_str() {
        "view" => Ok(Response::View),
        "dismiss" => Ok(Response::Dismiss),
        "act" => {
            let payload = match payload {
                Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
                None => Value::Object(serde_json::Map::new()),
            };
            Ok(Response::Act(payload))
        }
        other => bail!("unknown action `{other}` (expected view|dismiss|act)"),
    }
}

pub fn run(options: LoadOptions, id: &str, action: &str, payload: Option<&str>) -> CommandResult {
    let response = match parse_response(action, payload) {
        Ok(response) => response,
        Err(error) => {
            return CommandResult::failure("respond", "invalid_argument", format!("{error:#}"), 2);
        }
    };
    let id = SuggestionId(id.to_string());

    with_application("respond", options, |app| async move {
        let updated = match response {
            Response::View => app.engine.mark_suggestion_viewed(&id).await,
            Response::Dismiss => app.engine.dismiss_suggestion(&id).await,
            Response::Act(payload) => app.engine.act_on_suggestion(&id, payload).await,
        };

        match updated {
            Ok(suggestion) => CommandResult::success_with_data(
                "respond",
                format!("suggestion `{}` is now {}", suggestion.id.0, suggestion.status.as_str()),
                to_data(&suggestion),
            ),
            Err(error) => CommandResult::from_application_error("respond", &error),
        }
    })
}
