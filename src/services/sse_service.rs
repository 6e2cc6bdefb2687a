use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::ServerEvent,
    error::ServiceError,
    services::{scoring_service, sse_events},
    state::{SharedState, sync::SyncMessage},
};

/// Open the event stream of one match.
///
/// The subscription is taken before the snapshot is read so nothing written
/// in between is lost; a record seen twice is harmless because clients keep
/// the higher version.
pub async fn match_stream(
    state: &SharedState,
    match_id: Uuid,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let mut subscription = state.sync().subscribe(match_id);
    let snapshot = scoring_service::match_snapshot(state, match_id).await?;
    let first = sse_events::snapshot_event(&snapshot);
    info!(match_id = %match_id, "match stream connected");

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let state = state.clone();

    tokio::spawn(async move {
        if let Some(payload) = first
            && tx.send(Ok(to_event(payload))).await.is_err()
        {
            subscription.close();
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                message = subscription.next() => {
                    let payload = match message {
                        Some(SyncMessage::Resync { missed }) => {
                            warn!(match_id = %match_id, missed, "match stream lagged; sending snapshot");
                            match scoring_service::match_snapshot(&state, match_id).await {
                                Ok(snapshot) => sse_events::snapshot_event(&snapshot),
                                Err(err) => {
                                    warn!(match_id = %match_id, error = %err, "snapshot after lag failed");
                                    None
                                }
                            }
                        }
                        Some(message) => sse_events::to_server_event(&message),
                        None => break,
                    };

                    if let Some(payload) = payload
                        && tx.send(Ok(to_event(payload))).await.is_err()
                    {
                        break;
                    }
                }
            }
        }

        subscription.close();
        info!(match_id = %match_id, "match stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}
