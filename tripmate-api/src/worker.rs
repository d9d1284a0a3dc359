use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tripmate_core::RequestChange;
use tripmate_notify::{DispatchOutcome, NotificationDispatcher, NotificationKind};

use crate::metrics::Metrics;

/// Feeds committed request changes to the notification dispatcher until the
/// change bus closes. Each change is handled on its own task.
pub async fn start_notification_worker(
    mut rx: broadcast::Receiver<RequestChange>,
    dispatcher: Arc<NotificationDispatcher>,
    metrics: Arc<Metrics>,
) {
    info!("Notification worker started, listening to request changes...");

    loop {
        match rx.recv().await {
            Ok(change) => {
                let dispatcher = dispatcher.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    dispatch(&dispatcher, &metrics, &change).await;
                });
            }
            Err(RecvError::Lagged(missed)) => {
                // Missed changes are not replayed, their flags stay unset
                warn!("Notification worker lagged, {} changes skipped", missed);
                metrics
                    .notifications
                    .with_label_values(&["unknown", "lagged"])
                    .inc_by(missed);
            }
            Err(RecvError::Closed) => {
                info!("Change bus closed, notification worker stopping");
                break;
            }
        }
    }
}

async fn dispatch(dispatcher: &NotificationDispatcher, metrics: &Metrics, change: &RequestChange) {
    let kind = NotificationKind::for_change(change)
        .map(|k| k.as_str())
        .unwrap_or("none");

    match dispatcher.handle(change).await {
        Ok(DispatchOutcome::Sent { .. }) => {
            metrics.notifications.with_label_values(&[kind, "sent"]).inc();
        }
        Ok(DispatchOutcome::Skipped(_)) => {
            metrics.notifications.with_label_values(&[kind, "skipped"]).inc();
        }
        Err(e) => {
            error!(request_id = %change.request_id, "Failed to dispatch notification: {}", e);
            metrics.notifications.with_label_values(&[kind, "failed"]).inc();
        }
    }
}
