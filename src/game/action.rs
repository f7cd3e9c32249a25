use serde::{Deserialize, Serialize};

use crate::board::SquareId;
use crate::game::trade::{TradeId, TradeResponse, TradeTerms};
use crate::types::ActionType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GameAction {
    pub player_index: usize,
    pub action_type: ActionType,
    pub payload: ActionPayload,
}

impl GameAction {
    pub fn new(player_index: usize, action_type: ActionType) -> Self {
        Self {
            player_index,
            action_type,
            payload: ActionPayload::None,
        }
    }

    pub fn with_payload(mut self, payload: ActionPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn roll(player_index: usize) -> Self {
        Self::new(player_index, ActionType::Roll)
    }

    /// A roll with predetermined faces, for replays and tests.
    pub fn roll_with(player_index: usize, die1: u8, die2: u8) -> Self {
        Self::roll(player_index).with_payload(ActionPayload::Dice(die1, die2))
    }

    pub fn buy(player_index: usize, property: SquareId) -> Self {
        Self::new(player_index, ActionType::BuyProperty)
            .with_payload(ActionPayload::Property(property))
    }

    pub fn skip(player_index: usize, property: SquareId) -> Self {
        Self::new(player_index, ActionType::SkipProperty)
            .with_payload(ActionPayload::Property(property))
    }

    pub fn end_turn(player_index: usize) -> Self {
        Self::new(player_index, ActionType::EndTurn)
    }

    pub fn propose_trade(
        player_index: usize,
        counterparty: usize,
        offered: TradeTerms,
        requested: TradeTerms,
    ) -> Self {
        Self::new(player_index, ActionType::ProposeTrade).with_payload(ActionPayload::Trade {
            counterparty,
            offered,
            requested,
        })
    }

    pub fn accept_trade(player_index: usize, trade: TradeId) -> Self {
        Self::new(player_index, ActionType::AcceptTrade).with_payload(ActionPayload::TradeReply(trade))
    }

    pub fn decline_trade(player_index: usize, trade: TradeId) -> Self {
        Self::new(player_index, ActionType::DeclineTrade)
            .with_payload(ActionPayload::TradeReply(trade))
    }

    pub fn counter_trade(
        player_index: usize,
        trade: TradeId,
        offered: TradeTerms,
        requested: TradeTerms,
    ) -> Self {
        Self::new(player_index, ActionType::CounterTrade).with_payload(ActionPayload::Counter {
            trade,
            offered,
            requested,
        })
    }

    /// The action that delivers `response` to offer `trade`.
    pub fn respond(player_index: usize, trade: TradeId, response: TradeResponse) -> Self {
        match response {
            TradeResponse::Accept => Self::accept_trade(player_index, trade),
            TradeResponse::Decline => Self::decline_trade(player_index, trade),
            TradeResponse::Counter { offered, requested } => {
                Self::counter_trade(player_index, trade, offered, requested)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ActionPayload {
    #[default]
    None,
    Dice(u8, u8),
    Property(SquareId),
    Trade {
        counterparty: usize,
        offered: TradeTerms,
        requested: TradeTerms,
    },
    TradeReply(TradeId),
    Counter {
        trade: TradeId,
        offered: TradeTerms,
        requested: TradeTerms,
    },
}
