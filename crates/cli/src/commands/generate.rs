use serde_json::json;
use stockpulse_core::config::LoadOptions;
use stockpulse_core::domain::store::UserId;
use stockpulse_core::suggestions::GenerationReport;

use crate::commands::{to_data, with_application, CommandResult};

pub fn run(options: LoadOptions, user: Option<String>, all: bool) -> CommandResult {
    if user.is_none() && !all {
        return CommandResult::failure(
            "generate",
            "invalid_argument",
            "pass --user <id> or --all",
            2,
        );
    }

    with_application("generate", options, |app| async move {
        let users = match user {
            Some(user) => vec![UserId(user)],
            None => match app.store_users.list_user_ids().await {
                Ok(users) => users,
                Err(error) => {
                    return CommandResult::failure("generate", "persistence", error.to_string(), 8);
                }
            },
        };

        let mut reports = Vec::with_capacity(users.len());
        for user_id in &users {
            match app.engine.generate_report(user_id).await {
                Ok(report) => reports.push(summarize(user_id, &report)),
                Err(error) => return CommandResult::from_application_error("generate", &error),
            }
        }

        let created: usize = reports
            .iter()
            .filter_map(|report| report["created"].as_array().map(Vec::len))
            .sum();
        let failures =
            reports.iter().any(|report| report["persistence_failures"].as_u64() != Some(0));

        let message = format!("{created} new suggestion(s) for {} user(s)", users.len());
        if failures {
            return CommandResult::failure("generate", "persistence", message, 8);
        }
        CommandResult::success_with_data("generate", message, json!({ "users": reports }))
    })
}

fn summarize(user_id: &UserId, report: &GenerationReport) -> serde_json::Value {
    json!({
        "user_id": user_id.0,
        "created": report
            .created
            .iter()
            .map(|suggestion| json!({
                "id": suggestion.id.0,
                "type": suggestion.suggestion_type.as_str(),
                "priority": suggestion.priority.as_str(),
                "title": suggestion.title,
            }))
            .collect::<Vec<_>>(),
        "duplicates_skipped": report.duplicates_skipped,
        "failed_detectors": to_data(&report.failed_detectors),
        "persistence_failures": report.persistence_failures.len(),
    })
}
