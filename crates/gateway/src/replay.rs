//! History replay for newly connected clients.

use {
    chatcast_config::HistoryTarget,
    tracing::{debug, warn},
};

use crate::{
    connection::ConnectionHandle,
    dispatcher::{encode_frame, fan_out},
    hub::Hub,
};

/// Send up to `history_limit` stored messages, in the order the store
/// returns them (newest first).
///
/// A failed store query counts as an empty history. Returns the number of
/// messages written.
pub async fn replay_history(hub: &Hub, joiner: &ConnectionHandle) -> usize {
    let settings = hub.settings();
    if settings.history_limit == 0 {
        return 0;
    }

    let history = match hub.store().recent(settings.history_limit).await {
        Ok(history) => history,
        Err(e) => {
            warn!(
                conn_id = joiner.conn_id(),
                error = %e,
                "history query failed, skipping replay"
            );
            return 0;
        },
    };

    let mut sent = 0;
    for message in &history {
        let Some(frame) = encode_frame(message) else {
            continue;
        };
        match settings.history_target {
            HistoryTarget::Joiner => {
                // Waits for room in the joiner's queue; a large backlog is
                // not a slow client.
                if let Err(e) = joiner.deliver(frame, settings.send_timeout).await {
                    debug!(conn_id = joiner.conn_id(), error = %e, "history write failed");
                    hub.disconnect(joiner.conn_id());
                    break;
                }
            },
            HistoryTarget::Everyone => {
                fan_out(hub.registry(), &frame);
            },
        }
        sent += 1;
    }

    debug!(
        conn_id = joiner.conn_id(),
        sent,
        available = history.len(),
        "history replayed"
    );
    sent
}
