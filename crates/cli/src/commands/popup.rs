use stockpulse_core::config::LoadOptions;
use stockpulse_core::domain::store::UserId;

use crate::commands::{to_data, with_application, CommandResult};

pub fn run(
    options: LoadOptions,
    user: &str,
    mark_shown: bool,
    frequency_minutes: Option<u32>,
) -> CommandResult {
    let user_id = UserId(user.to_string());

    with_application("popup", options, |app| async move {
        if let Some(minutes) = frequency_minutes {
            if let Err(error) = app.engine.update_popup_frequency(&user_id, minutes).await {
                return CommandResult::from_application_error("popup", &error);
            }
        }

        let due = match app.engine.should_show_popup(&user_id).await {
            Ok(due) => due,
            Err(error) => return CommandResult::from_application_error("popup", &error),
        };

        let preferences = if due && mark_shown {
            app.engine.record_popup_shown(&user_id).await
        } else {
            app.engine.get_preferences(&user_id).await
        };

        match preferences {
            Ok(preferences) => CommandResult::success_with_data(
                "popup",
                if due { "popup due" } else { "popup not due" },
                serde_json::json!({ "due": due, "preferences": to_data(&preferences) }),
            ),
            Err(error) => CommandResult::from_application_error("popup", &error),
        }
    })
}
