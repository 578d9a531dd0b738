use serde_json::json;
use stockpulse_core::config::LoadOptions;
use stockpulse_core::domain::store::UserId;
use stockpulse_core::domain::suggestion::{SuggestionDomain, SuggestionStatus};
use stockpulse_core::suggestions::SuggestionFilter;

use crate::commands::{to_data, with_application, CommandResult};

pub fn run(
    options: LoadOptions,
    user: &str,
    status: Option<&str>,
    domain: Option<&str>,
    limit: Option<u32>,
) -> CommandResult {
    let filter = match build_filter(status, domain, limit) {
        Ok(filter) => filter,
        Err(message) => return CommandResult::failure("list", "invalid_argument", message, 2),
    };
    let user_id = UserId(user.to_string());

    with_application("list", options, |app| async move {
        let listed = match app.engine.get_user_suggestions_with_context(&user_id, &filter).await {
            Ok(listed) => listed,
            Err(error) => return CommandResult::from_application_error("list", &error),
        };
        let unread = match app.engine.get_unread_count(&user_id).await {
            Ok(unread) => unread,
            Err(error) => return CommandResult::from_application_error("list", &error),
        };

        CommandResult::success_with_data(
            "list",
            format!("{} suggestion(s), {unread} unread", listed.len()),
            json!({ "unread": unread, "suggestions": to_data(&listed) }),
        )
    })
}

pub fn build_filter(
    status: Option<&str>,
    domain: Option<&str>,
    limit: Option<u32>,
) -> Result<SuggestionFilter, String> {
    let mut filter = SuggestionFilter { limit, ..SuggestionFilter::default() };
    if let Some(raw) = status {
        let status = SuggestionStatus::parse(raw).ok_or_else(|| {
            format!("unknown status `{raw}` (expected pending|viewed|dismissed|acted|expired)")
        })?;
        filter = filter.with_status(status);
    }
    if let Some(raw) = domain {
        let domain = SuggestionDomain::parse(raw).ok_or_else(|| {
            format!("unknown domain `{raw}` (expected stock|sales|finance|operations)")
        })?;
        filter = filter.with_domain(domain);
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use stockpulse_core::domain::suggestion::{SuggestionDomain, SuggestionStatus};

    use super::build_filter;

    #[test]
    fn filter_arguments_are_parsed_case_insensitively() {
        let filter = build_filter(Some("Pending"), Some("STOCK"), Some(5)).expect("valid filter");
        assert_eq!(filter.status, Some(SuggestionStatus::Pending));
        assert_eq!(filter.domain, Some(SuggestionDomain::Stock));
        assert_eq!(filter.limit, Some(5));
    }

    #[test]
    fn unknown_status_is_reported() {
        let error = build_filter(Some("archived"), None, None).expect_err("invalid status");
        assert!(error.contains("archived"));
    }
}
