use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::Display;
use tracing::{debug, info};
use uuid::Uuid;

use crate::board::{BoardCatalog, SquareId};
use crate::game::ownership::OwnershipIndex;
use crate::game::players::PlayerState;
use crate::game::state::GameError;

pub type TradeId = Uuid;

/// One side of a trade: the properties and cash a player puts on the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeTerms {
    pub properties: SmallVec<[SquareId; 4]>,
    pub cash: i64,
}

impl TradeTerms {
    pub fn new(properties: impl IntoIterator<Item = SquareId>, cash: i64) -> Self {
        Self {
            properties: properties.into_iter().collect(),
            cash,
        }
    }

    pub fn cash(cash: i64) -> Self {
        Self::new([], cash)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.cash == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Proposed,
    Accepted,
    Declined,
    Countered,
}

impl TradeStatus {
    pub fn is_open(self) -> bool {
        self == TradeStatus::Proposed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub id: TradeId,
    pub proposer: usize,
    pub counterparty: usize,
    /// What the proposer gives.
    pub offered: TradeTerms,
    /// What the proposer asks for in return.
    pub requested: TradeTerms,
    pub status: TradeStatus,
    /// The offer this one counters, if any.
    pub parent: Option<TradeId>,
    /// Ownership versions of every property involved, as seen at proposal time.
    pub versions: Vec<(SquareId, u64)>,
}

impl TradeOffer {
    pub fn properties(&self) -> impl Iterator<Item = SquareId> + '_ {
        self.offered
            .properties
            .iter()
            .chain(self.requested.properties.iter())
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResponse {
    Accept,
    Decline,
    /// Counter with terms written from the responder's side.
    Counter {
        offered: TradeTerms,
        requested: TradeTerms,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResolution {
    Accepted,
    Declined,
    Countered { counter: TradeId },
}

/// Every offer made in a session, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeBook {
    offers: Vec<TradeOffer>,
}

impl TradeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TradeId) -> Option<&TradeOffer> {
        self.offers.iter().find(|offer| offer.id == id)
    }

    pub fn offers(&self) -> &[TradeOffer] {
        &self.offers
    }

    pub fn open_for(&self, player: usize) -> impl Iterator<Item = &TradeOffer> + '_ {
        self.offers
            .iter()
            .filter(move |offer| offer.status.is_open() && offer.counterparty == player)
    }

    /// Inserts an offer built elsewhere (store replay). Existing ids are replaced.
    pub fn upsert(&mut self, offer: TradeOffer) {
        match self.offers.iter_mut().find(|existing| existing.id == offer.id) {
            Some(existing) => *existing = offer,
            None => self.offers.push(offer),
        }
    }

    pub fn propose(
        &mut self,
        board: &BoardCatalog,
        players: &[PlayerState],
        ownership: &OwnershipIndex,
        proposer: usize,
        counterparty: usize,
        offered: TradeTerms,
        requested: TradeTerms,
    ) -> Result<TradeId, GameError> {
        let offer =
            build_offer(board, players, ownership, proposer, counterparty, offered, requested, None)?;
        let id = offer.id;
        debug!(trade = %id, proposer, counterparty, "trade proposed");
        self.offers.push(offer);
        Ok(id)
    }

    /// Applies the counterparty's response. Acceptance moves properties and cash atomically.
    pub fn respond(
        &mut self,
        board: &BoardCatalog,
        players: &mut [PlayerState],
        ownership: &mut OwnershipIndex,
        id: TradeId,
        responder: usize,
        response: TradeResponse,
    ) -> Result<TradeResolution, GameError> {
        let idx = self
            .offers
            .iter()
            .position(|offer| offer.id == id)
            .ok_or(GameError::TradeNotFound(id))?;
        let offer = &self.offers[idx];
        if !offer.status.is_open() {
            return Err(GameError::InvalidTrade("offer already answered"));
        }
        if offer.counterparty != responder {
            return Err(GameError::InvalidTrade("only the counterparty may respond"));
        }

        match response {
            TradeResponse::Decline => {
                self.offers[idx].status = TradeStatus::Declined;
                debug!(trade = %id, "trade declined");
                Ok(TradeResolution::Declined)
            }
            TradeResponse::Counter { offered, requested } => {
                let counter = build_offer(
                    board,
                    players,
                    ownership,
                    offer.counterparty,
                    offer.proposer,
                    offered,
                    requested,
                    Some(id),
                )?;
                let counter_id = counter.id;
                self.offers[idx].status = TradeStatus::Countered;
                self.offers.push(counter);
                debug!(trade = %id, counter = %counter_id, "trade countered");
                Ok(TradeResolution::Countered {
                    counter: counter_id,
                })
            }
            TradeResponse::Accept => {
                execute(players, ownership, offer)?;
                self.offers[idx].status = TradeStatus::Accepted;
                info!(trade = %id, "trade accepted");
                Ok(TradeResolution::Accepted)
            }
        }
    }

    /// Declines every open offer to or from `player`; used when they go bankrupt.
    pub fn withdraw_player(&mut self, player: usize) -> Vec<TradeId> {
        self.offers
            .iter_mut()
            .filter(|offer| {
                offer.status.is_open() && (offer.proposer == player || offer.counterparty == player)
            })
            .map(|offer| {
                offer.status = TradeStatus::Declined;
                offer.id
            })
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn build_offer(
    board: &BoardCatalog,
    players: &[PlayerState],
    ownership: &OwnershipIndex,
    proposer: usize,
    counterparty: usize,
    offered: TradeTerms,
    requested: TradeTerms,
    parent: Option<TradeId>,
) -> Result<TradeOffer, GameError> {
    if proposer == counterparty {
        return Err(GameError::InvalidTrade("cannot trade with yourself"));
    }
    for idx in [proposer, counterparty] {
        let player = players.get(idx).ok_or(GameError::InvalidPlayer(idx))?;
        if !player.is_active() {
            return Err(GameError::InvalidTrade("bankrupt players cannot trade"));
        }
    }
    if offered.is_empty() && requested.is_empty() {
        return Err(GameError::InvalidTrade("offer is empty"));
    }
    if offered.cash < 0 || requested.cash < 0 {
        return Err(GameError::InvalidTrade("cash amounts must be non-negative"));
    }

    let mut versions = Vec::new();
    for (terms, owner) in [(&offered, proposer), (&requested, counterparty)] {
        for property in &terms.properties {
            if board.property(*property).is_none() {
                return Err(GameError::InvalidPayload("trade references a non-property square"));
            }
            if versions.iter().any(|(seen, _)| seen == property) {
                return Err(GameError::InvalidTrade("property listed twice"));
            }
            let record = ownership
                .get(*property)
                .filter(|record| record.owner == owner)
                .ok_or(GameError::InvalidTrade("property not held by the trading player"))?;
            if record.houses > 0 {
                return Err(GameError::InvalidTrade("developed properties cannot be traded"));
            }
            versions.push((*property, record.version));
        }
    }

    Ok(TradeOffer {
        id: Uuid::new_v4(),
        proposer,
        counterparty,
        offered,
        requested,
        status: TradeStatus::Proposed,
        parent,
        versions,
    })
}

/// Validates then applies both sides of an accepted offer. Nothing changes on error.
fn execute(
    players: &mut [PlayerState],
    ownership: &mut OwnershipIndex,
    offer: &TradeOffer,
) -> Result<(), GameError> {
    for (property, version) in &offer.versions {
        if ownership.version_of(*property) != Some(*version) {
            return Err(GameError::StaleOffer(*property));
        }
    }
    let proposer = &players[offer.proposer];
    let counterparty = &players[offer.counterparty];
    if !proposer.is_active() || !counterparty.is_active() {
        return Err(GameError::InvalidTrade("bankrupt players cannot trade"));
    }
    let proposer_after = proposer.balance - offer.offered.cash + offer.requested.cash;
    let counterparty_after = counterparty.balance - offer.requested.cash + offer.offered.cash;
    if proposer_after < 0 || counterparty_after < 0 {
        return Err(GameError::InvalidTrade("trade would leave a negative balance"));
    }

    for property in &offer.offered.properties {
        ownership.transfer(*property, offer.proposer, offer.counterparty)?;
    }
    for property in &offer.requested.properties {
        ownership.transfer(*property, offer.counterparty, offer.proposer)?;
    }
    players[offer.proposer].balance = proposer_after;
    players[offer.counterparty].balance = counterparty_after;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Token;

    fn seats(count: usize) -> Vec<PlayerState> {
        Token::ORDERED
            .iter()
            .take(count)
            .enumerate()
            .map(|(order, token)| PlayerState::new(order, *token, 1500))
            .collect()
    }

    #[test]
    fn proposal_records_versions() {
        let board = BoardCatalog::standard();
        let players = seats(2);
        let mut ownership = OwnershipIndex::new();
        ownership.acquire(board, 1, 0).unwrap();
        ownership.acquire(board, 3, 1).unwrap();

        let mut book = TradeBook::new();
        let id = book
            .propose(
                board,
                &players,
                &ownership,
                0,
                1,
                TradeTerms::new([1], 20),
                TradeTerms::new([3], 0),
            )
            .unwrap();
        let offer = book.get(id).unwrap();
        assert_eq!(offer.versions.len(), 2);
        assert_eq!(offer.properties().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(book.open_for(1).count(), 1);
        assert_eq!(book.open_for(0).count(), 0);
    }

    #[test]
    fn round_trip_resale_makes_offer_stale() {
        let board = BoardCatalog::standard();
        let mut players = seats(3);
        let mut ownership = OwnershipIndex::new();
        ownership.acquire(board, 1, 0).unwrap();

        let mut book = TradeBook::new();
        let id = book
            .propose(
                board,
                &players,
                &ownership,
                0,
                1,
                TradeTerms::new([1], 0),
                TradeTerms::cash(80),
            )
            .unwrap();

        ownership.transfer(1, 0, 2).unwrap();
        ownership.transfer(1, 2, 0).unwrap();
        let result = book.respond(board, &mut players, &mut ownership, id, 1, TradeResponse::Accept);
        assert!(matches!(result, Err(GameError::StaleOffer(1))));
        assert_eq!(players[1].balance, 1500);
    }

    #[test]
    fn withdraw_declines_open_offers() {
        let board = BoardCatalog::standard();
        let players = seats(3);
        let mut ownership = OwnershipIndex::new();
        ownership.acquire(board, 1, 0).unwrap();

        let mut book = TradeBook::new();
        let to_one = book
            .propose(board, &players, &ownership, 0, 1, TradeTerms::new([1], 0), TradeTerms::cash(50))
            .unwrap();
        let to_two = book
            .propose(board, &players, &ownership, 0, 2, TradeTerms::new([1], 0), TradeTerms::cash(60))
            .unwrap();

        assert_eq!(book.withdraw_player(2), vec![to_two]);
        assert!(book.get(to_one).unwrap().status.is_open());
        assert_eq!(book.get(to_two).unwrap().status, TradeStatus::Declined);
    }
}
