use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error};
use tripmate_core::{ChangeFeed, CoreResult, RequestChange};
use tripmate_store::EventProducer;

use crate::metrics::Metrics;
use crate::middleware::auth::SessionClaims;
use crate::state::AppState;

const CHANNEL_CAPACITY: usize = 256;

/// In-process fan-out of committed request changes.
///
/// Feeds the notification worker and SSE subscribers, and mirrors every
/// change to Kafka when a producer is configured.
#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<RequestChange>,
    kafka: Option<Arc<EventProducer>>,
    metrics: Arc<Metrics>,
}

impl ChangeBus {
    pub fn new(kafka: Option<Arc<EventProducer>>, metrics: Arc<Metrics>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, kafka, metrics }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RequestChange> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl ChangeFeed for ChangeBus {
    async fn publish(&self, change: &RequestChange) -> CoreResult<()> {
        self.metrics
            .transitions
            .with_label_values(&[change.to.as_str()])
            .inc();

        // No receivers is fine, nobody is listening yet
        if self.tx.send(change.clone()).is_err() {
            debug!(request_id = %change.request_id, "No change subscribers");
        }

        if let Some(kafka) = &self.kafka {
            if let Err(e) = ChangeFeed::publish(kafka.as_ref(), change).await {
                error!(request_id = %change.request_id, "Failed to mirror change to Kafka: {}", e);
                return Err(e);
            }
        }
        Ok(())
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/requests/stream", get(stream_changes))
}

/// GET /api/requests/stream
///
/// Admins see every change, everyone else only the requests they are party to.
async fn stream_changes(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.changes.subscribe();
    let uid = claims.sub.clone();
    let admin = claims.admin;

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let visible = match &result {
            Ok(change) => admin || change.involves(&uid),
            // Lagged subscribers just miss events
            Err(_) => false,
        };
        async move {
            let change = result.ok().filter(|_| visible)?;
            let data = serde_json::to_string(&change).ok()?;
            Some(Ok(Event::default().event("request_changed").data(data)))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
