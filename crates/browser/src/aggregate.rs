//! Builds the response envelope for an executed plan.

use {serde_json::json, tracing::warn};

use crate::{
    remote::SessionApi,
    session::SessionHandle,
    types::{ActionPlan, ActionResult, CommandResponse, Session},
};

/// Summary line for `succeeded` of `total` actions.
pub fn summarize(succeeded: usize, total: usize) -> String {
    if total == 0 {
        "No actions to execute".to_string()
    } else if succeeded == total {
        format!("Successfully executed {total} action(s)")
    } else if succeeded == 0 {
        format!("Failed to execute command: all {total} actions failed")
    } else {
        format!(
            "Partially completed: {succeeded} of {total} actions succeeded. Some actions failed."
        )
    }
}

/// Classify `results`, refresh the live view once, and append the trailing
/// status record. `success` is true when at least one action succeeded.
pub async fn aggregate(
    plan: &ActionPlan,
    mut results: Vec<ActionResult>,
    session: &SessionHandle,
    api: &dyn SessionApi,
) -> CommandResponse {
    let total = results.len();
    let succeeded = results.iter().filter(|r| r.success).count();

    let mut message = summarize(succeeded, total);
    if let Some(reasoning) = plan
        .reasoning
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
    {
        message.push_str("\n\nReasoning: ");
        message.push_str(reasoning);
    }

    match api.live_view_url(session.id()).await {
        Ok(Some(url)) => session.set_live_view_url(url).await,
        Ok(None) => {},
        Err(e) => warn!(session_id = session.id(), error = %e, "live view refresh failed, keeping last known URL"),
    }

    let snapshot = session.snapshot().await;
    results.push(status_result(&snapshot));

    CommandResponse {
        success: succeeded > 0,
        message,
        session_id: Some(snapshot.id),
        live_view_url: snapshot.live_view_url,
        results,
        actions: plan.describe_actions(),
    }
}

fn status_result(session: &Session) -> ActionResult {
    let mut result = ActionResult::success(format!("Session {} is {}", session.id, session.status))
        .with_data(json!({
            "type": "status",
            "sessionId": session.id,
            "status": session.status,
            "currentUrl": session.current_url,
            "liveViewUrl": session.live_view_url,
        }));
    if let Some(url) = &session.current_url {
        result = result.with_url(url.clone());
    }
    result
}
