//! Server-sent event subscriptions for order notifications.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use common::{CommonDto, MemberEmail};
use futures_util::stream::{self, Stream, StreamExt};
use notification::{NotificationRegistry, push_channel};

use crate::extract::RequesterEmail;
use crate::state::AppState;

/// Events buffered per subscriber before it counts as lagging.
const SUBSCRIBER_BUFFER: usize = 64;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Removes the registration when its stream is dropped.
struct Subscription {
    registry: Arc<NotificationRegistry>,
    subscriber: MemberEmail,
    token: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.registry.unregister_if(&self.subscriber, self.token) {
            tracing::info!(subscriber = %self.subscriber, "push subscription closed");
        }
    }
}

/// GET /sse/connect — opens the caller's push stream.
///
/// Emits `connect` first, then one `ordered` event per notification. A newer
/// connection for the same caller ends this stream.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    RequesterEmail(subscriber): RequesterEmail,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (channel, rx) = push_channel(SUBSCRIBER_BUFFER);
    let token = state
        .notifications
        .register(subscriber.clone(), Arc::new(channel));
    tracing::info!(%subscriber, "push subscription opened");
    metrics::counter!("sse_connections_total").increment(1);

    let subscription = Subscription {
        registry: state.notifications.clone(),
        subscriber,
        token,
    };

    let connected = stream::once(async {
        Ok::<_, axum::Error>(Event::default().event("connect").data("connected"))
    });
    let notifications = stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        let notification = rx.recv().await?;
        let event = Event::default().event("ordered").json_data(&notification);
        Some((event, (rx, subscription)))
    });

    Sse::new(connected.chain(notifications)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// GET /sse/unsubscribe — closes the caller's push stream.
#[tracing::instrument(skip(state))]
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    RequesterEmail(subscriber): RequesterEmail,
) -> Json<CommonDto<bool>> {
    let removed = state.notifications.unregister(&subscriber);
    Json(CommonDto::new(removed, 200, "unsubscribed"))
}
