use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

use crate::game::{ActionPayload, GameAction, GameError, GameState};
use crate::players::AutomatedPlayer;
use crate::session::SessionHandle;
use crate::store::GameStore;
use crate::types::ActionType;

use super::{Scheduler, SchedulerConfig};

/// Drives every automated seat of `handle` until the session ends.
///
/// Between timers the session is revalidated on the poll interval, so turns
/// taken elsewhere cancel whatever was pending. Offers addressed to automated
/// seats are answered as soon as they are observed.
pub async fn drive<S: GameStore>(
    handle: &SessionHandle<S>,
    player: &AutomatedPlayer,
    config: SchedulerConfig,
) {
    let mut scheduler = Scheduler::new(config);
    let session = handle.id();
    loop {
        let state = handle.state();
        if state.status.is_terminal() {
            scheduler.cancel(session);
            debug!(%session, "driver stopped");
            return;
        }
        answer_offers(handle, player, &state).await;

        let now = Instant::now();
        let wake = match scheduler.observe(&state, now) {
            Some(entry) => entry.due,
            None => now + scheduler.config().poll_interval(),
        };
        sleep_until(wake).await;

        if scheduler.pending(session).is_none() {
            if let Err(err) = handle.revalidate().await {
                warn!(%session, error = %err, "revalidate failed");
            }
            continue;
        }

        let state = handle.state();
        for entry in scheduler.take_due(Instant::now()) {
            let Some(action) = entry.resolve(&state, player) else {
                warn!(%session, kind = ?entry.kind, "stale automated action dropped");
                continue;
            };
            if let Err(err) = handle.perform(action).await {
                warn!(%session, error = %err, "automated action failed");
                // Back off instead of hammering a failing store.
                sleep(scheduler.config().poll_interval()).await;
            }
        }
    }
}

async fn answer_offers<S: GameStore>(
    handle: &SessionHandle<S>,
    player: &AutomatedPlayer,
    state: &GameState,
) {
    let responses: Vec<GameAction> = state
        .trades
        .offers()
        .iter()
        .filter(|offer| offer.status.is_open())
        .filter(|offer| {
            state
                .players
                .get(offer.counterparty)
                .is_some_and(|seat| seat.automated && seat.is_active())
        })
        .map(|offer| {
            GameAction::respond(offer.counterparty, offer.id, player.respond_to(state, offer))
        })
        .collect();
    for action in responses {
        let declined = action.action_type == ActionType::DeclineTrade;
        let (seat, trade) = match &action.payload {
            ActionPayload::TradeReply(trade) | ActionPayload::Counter { trade, .. } => {
                (action.player_index, *trade)
            }
            _ => continue,
        };
        match handle.perform(action).await {
            Ok(_) => {}
            // The offer no longer holds; answer it once and for all.
            Err(err @ (GameError::StaleOffer(_) | GameError::InvalidTrade(_))) if !declined => {
                debug!(session = %handle.id(), %trade, error = %err, "automated response failed, declining");
                if let Err(err) = handle.perform(GameAction::decline_trade(seat, trade)).await {
                    warn!(session = %handle.id(), %trade, error = %err, "decline failed");
                }
            }
            Err(err) => {
                warn!(session = %handle.id(), %trade, error = %err, "automated trade response failed");
            }
        }
    }
}
