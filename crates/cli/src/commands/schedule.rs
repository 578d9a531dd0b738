use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use stockpulse_core::config::LoadOptions;
use tokio::time::MissedTickBehavior;

use crate::bootstrap::Application;
use crate::commands::{with_application, CommandResult};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub expired: u64,
    pub users: usize,
    pub created: usize,
    pub failed_users: usize,
}

/// One scheduler pass: global sweep, then generation for every known user.
/// Failures are logged and counted; the pass always completes.
pub async fn tick(app: &Application) -> TickSummary {
    let mut summary = TickSummary::default();

    match app.engine.cleanup_expired_suggestions().await {
        Ok(expired) => summary.expired = expired,
        Err(error) => tracing::error!(
            event_name = "scheduler.cleanup.failed",
            error = %error,
            "expired suggestion sweep failed"
        ),
    }

    let users = match app.store_users.list_user_ids().await {
        Ok(users) => users,
        Err(error) => {
            tracing::error!(
                event_name = "scheduler.users.failed",
                error = %error,
                "could not list store users"
            );
            return summary;
        }
    };
    summary.users = users.len();

    for user_id in &users {
        match app.engine.generate_all_suggestions(user_id).await {
            Ok(created) => summary.created += created.len(),
            Err(error) => {
                summary.failed_users += 1;
                tracing::error!(
                    event_name = "scheduler.generate.failed",
                    user_id = %user_id.0,
                    error = %error,
                    "suggestion generation failed"
                );
            }
        }
    }

    tracing::info!(
        event_name = "scheduler.tick.completed",
        expired = summary.expired,
        users = summary.users,
        created = summary.created,
        failed_users = summary.failed_users,
        "scheduler tick finished"
    );
    summary
}

pub fn run(options: LoadOptions, interval_secs: u64, max_ticks: Option<u64>) -> CommandResult {
    if interval_secs == 0 {
        return CommandResult::failure(
            "run",
            "invalid_argument",
            "--interval-secs must be at least 1",
            2,
        );
    }

    with_application("run", options, |app| async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;
        let mut totals = TickSummary::default();

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(event_name = "scheduler.stopping", ticks, "interrupt received");
                    break;
                }
            }

            let summary = tick(&app).await;
            totals.expired += summary.expired;
            totals.created += summary.created;
            totals.failed_users += summary.failed_users;
            totals.users = summary.users;
            ticks += 1;

            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
        }

        CommandResult::success_with_data(
            "run",
            format!("scheduler stopped after {ticks} tick(s)"),
            json!({ "ticks": ticks, "totals": totals }),
        )
    })
}
