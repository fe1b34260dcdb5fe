use std::time::Duration;

use tokio::sync::mpsc;

use crate::engine::switch::SwitchState;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Drains switch events and posts scene notifications. Fire-and-forget: a
/// failed POST is logged and dropped; the queue dies with the process.
pub fn spawn_notifier(
    base_url: String,
    mut events: mpsc::UnboundedReceiver<SwitchState>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "failed to build notifier client");
                return;
            }
        };
        while let Some(state) = events.recv().await {
            let path = match state {
                SwitchState::Live => "/scene/live",
                SwitchState::Fallback | SwitchState::PrivacyForcedFallback => "/scene/fallback",
            };
            let url = format!("{base_url}{path}");
            match client.post(&url).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(url = %url, status = %response.status(), "scene notification rejected");
                }
                Ok(_) => {
                    tracing::debug!(url = %url, "scene notification sent");
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "scene notification failed");
                }
            }
        }
        tracing::debug!("notifier shutting down");
    })
}
