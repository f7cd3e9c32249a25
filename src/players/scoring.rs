//! Deterministic scores shared by purchase hints and the automated counterparty.

use crate::board::{BoardCatalog, SquareId};
use crate::game::ownership::OwnershipIndex;
use crate::game::players::PlayerState;
use crate::game::trade::{TradeOffer, TradeTerms};
use crate::types::PropertyGroup;

pub const MAX_PURCHASE_SCORE: u8 = 95;
const BASELINE: i32 = 50;
const COMPLETION_BONUS: i32 = 30;
const PARTIAL_GROUP_BONUS: i32 = 10;
const DEFENSIVE_BONUS: i32 = 15;
const SET_MULTIPLIER: f64 = 1.5;

/// How desirable `property` is for `player` right now, in `0..=95`.
///
/// Zero when the square is not a free, priced property or the buyer cannot pay.
pub fn purchase_score(
    board: &BoardCatalog,
    ownership: &OwnershipIndex,
    players: &[PlayerState],
    property: SquareId,
    player: usize,
) -> u8 {
    let Some(info) = board.property(property) else {
        return 0;
    };
    let Some(buyer) = players.get(player) else {
        return 0;
    };
    if info.price <= 0 || ownership.owner_of(property).is_some() || !buyer.can_afford(info.price) {
        return 0;
    }

    let mut score = BASELINE;
    score += affordability(buyer.balance, info.price);

    let owned = ownership.count_in_group(board, player, info.group) as i32;
    let group_size = board.group_size(info.group) as i32;
    match info.group {
        PropertyGroup::Railroad => score += 5 + 8 * owned,
        PropertyGroup::Utility => score += 10 * owned,
        _ if owned + 1 == group_size => score += COMPLETION_BONUS,
        _ => score += PARTIAL_GROUP_BONUS * owned,
    }

    let relative = board.landing_frequency(property) / board.average_property_frequency();
    score += ((relative - 1.0) * 20.0).round().clamp(-10.0, 10.0) as i32;

    let roi = info.site_rent() as f64 / info.price as f64;
    if roi >= 0.12 {
        score += 8;
    } else if roi >= 0.08 {
        score += 4;
    }

    let threatened = players.iter().enumerate().any(|(idx, opponent)| {
        idx != player
            && opponent.is_active()
            && group_size > 1
            && ownership.count_in_group(board, idx, info.group) as i32 == group_size - 1
    });
    if threatened {
        score += DEFENSIVE_BONUS;
    }

    score.clamp(0, MAX_PURCHASE_SCORE as i32) as u8
}

fn affordability(balance: i64, price: i64) -> i32 {
    let ratio = balance as f64 / price as f64;
    if ratio < 1.5 {
        -20
    } else if ratio < 2.0 {
        -10
    } else if ratio > 4.0 {
        10
    } else if ratio > 3.0 {
        5
    } else {
        0
    }
}

/// What `property` is worth to `holder`, counting the set it completes or breaks.
pub fn fair_value(
    board: &BoardCatalog,
    ownership: &OwnershipIndex,
    holder: usize,
    property: SquareId,
    incoming: &[SquareId],
) -> f64 {
    let Some(info) = board.property(property) else {
        return 0.0;
    };
    let mut value = info.price as f64;
    if ownership.get(property).is_some_and(|record| record.mortgaged) {
        value = info.mortgage_value() as f64;
    }
    let group_size = board.group_size(info.group);
    let held = ownership.count_in_group(board, holder, info.group);
    let arriving = incoming
        .iter()
        .filter(|square| board.property(**square).is_some_and(|p| p.group == info.group))
        .count();
    let owned_by_holder = ownership.owner_of(property) == Some(holder);
    let completes = if owned_by_holder {
        held == group_size
    } else {
        held + arriving == group_size
    };
    if completes && group_size > 1 {
        value *= SET_MULTIPLIER;
    }
    value
}

fn side_value(
    board: &BoardCatalog,
    ownership: &OwnershipIndex,
    holder: usize,
    terms: &TradeTerms,
    incoming: &[SquareId],
) -> f64 {
    terms
        .properties
        .iter()
        .map(|property| fair_value(board, ownership, holder, *property, incoming))
        .sum::<f64>()
        + terms.cash as f64
}

/// Signed percentage in `-100..=100`: positive when accepting benefits the counterparty.
pub fn trade_favorability(board: &BoardCatalog, ownership: &OwnershipIndex, offer: &TradeOffer) -> i32 {
    let recipient = offer.counterparty;
    let incoming: Vec<SquareId> = offer.offered.properties.to_vec();
    let gain = side_value(board, ownership, recipient, &offer.offered, &incoming);
    let loss = side_value(board, ownership, recipient, &offer.requested, &[]);
    let scale = gain.max(loss).max(1.0);
    (((gain - loss) / scale) * 100.0).round().clamp(-100.0, 100.0) as i32
}

/// Cash the counterparty would need on top of `offer` to reach `target` favorability.
pub fn cash_shortfall(
    board: &BoardCatalog,
    ownership: &OwnershipIndex,
    offer: &TradeOffer,
    target: i32,
) -> i64 {
    let recipient = offer.counterparty;
    let incoming: Vec<SquareId> = offer.offered.properties.to_vec();
    let gain = side_value(board, ownership, recipient, &offer.offered, &incoming);
    let loss = side_value(board, ownership, recipient, &offer.requested, &[]);
    // gain' = loss / (1 - target%) solves (gain' - loss) / gain' = target%.
    let target = (target.clamp(0, 90) as f64) / 100.0;
    let needed = loss / (1.0 - target) - gain;
    if needed <= 0.0 {
        return 0;
    }
    ((needed / 10.0).ceil() * 10.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::SquareKind;
    use crate::game::trade::TradeStatus;
    use crate::types::Token;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn players(balances: &[i64]) -> Vec<PlayerState> {
        balances
            .iter()
            .enumerate()
            .map(|(idx, balance)| PlayerState::new(idx, Token::ORDERED[idx], *balance))
            .collect()
    }

    fn offer(offered: TradeTerms, requested: TradeTerms) -> TradeOffer {
        TradeOffer {
            id: Uuid::new_v4(),
            proposer: 0,
            counterparty: 1,
            offered,
            requested,
            status: TradeStatus::Proposed,
            parent: None,
            versions: Vec::new(),
        }
    }

    #[test]
    fn free_property_scores_zero() {
        let mut squares = BoardCatalog::standard().squares().to_vec();
        if let SquareKind::Property(property) = &mut squares[1].kind {
            property.price = 0;
        }
        let board = BoardCatalog::from_squares(squares).unwrap();
        let players = players(&[1500, 1500]);
        let ownership = OwnershipIndex::new();

        assert_eq!(purchase_score(&board, &ownership, &players, 1, 0), 0);
        assert!(purchase_score(BoardCatalog::standard(), &ownership, &players, 1, 0) > 0);
    }

    #[test]
    fn completing_a_group_scores_higher() {
        let board = BoardCatalog::standard();
        let players = players(&[1500, 1500]);
        let empty = OwnershipIndex::new();
        let mut partial = OwnershipIndex::new();
        partial.acquire(board, 37, 0).unwrap();
        assert!(
            purchase_score(board, &partial, &players, 39, 0)
                > purchase_score(board, &empty, &players, 39, 0)
        );
    }

    #[test]
    fn defensive_bonus_when_opponent_is_one_away() {
        let board = BoardCatalog::standard();
        let players = players(&[1500, 1500]);
        let mut threat = OwnershipIndex::new();
        threat.acquire(board, 37, 1).unwrap();
        assert_eq!(
            purchase_score(board, &threat, &players, 39, 0),
            purchase_score(board, &OwnershipIndex::new(), &players, 39, 0) + 15
        );
    }

    #[test]
    fn unaffordable_or_owned_scores_zero() {
        let board = BoardCatalog::standard();
        let poor = players(&[100, 1500]);
        let index = OwnershipIndex::new();
        assert_eq!(purchase_score(board, &index, &poor, 39, 0), 0);
        assert_eq!(purchase_score(board, &index, &poor, 0, 0), 0);
        let mut owned = OwnershipIndex::new();
        owned.acquire(board, 1, 1).unwrap();
        assert_eq!(purchase_score(board, &owned, &poor, 1, 0), 0);
    }

    #[test]
    fn cash_gift_is_fully_favorable() {
        let board = BoardCatalog::standard();
        let index = OwnershipIndex::new();
        assert_eq!(
            trade_favorability(board, &index, &offer(TradeTerms::cash(100), TradeTerms::default())),
            100
        );
        assert_eq!(
            trade_favorability(board, &index, &offer(TradeTerms::default(), TradeTerms::cash(100))),
            -100
        );
    }

    #[test]
    fn set_completion_raises_favorability() {
        let board = BoardCatalog::standard();
        let mut index = OwnershipIndex::new();
        index.acquire(board, 37, 1).unwrap();
        index.acquire(board, 39, 0).unwrap();
        let completing = offer(TradeTerms::new([39], 0), TradeTerms::cash(400));
        assert!(trade_favorability(board, &index, &completing) > 0);
        assert_eq!(cash_shortfall(board, &index, &completing, 15), 0);
    }

    #[test]
    fn shortfall_reaches_target() {
        let board = BoardCatalog::standard();
        let mut index = OwnershipIndex::new();
        index.acquire(board, 1, 1).unwrap();
        let lowball = offer(TradeTerms::cash(20), TradeTerms::new([1], 0));
        let extra = cash_shortfall(board, &index, &lowball, 15);
        let raised = offer(TradeTerms::cash(20 + extra), TradeTerms::new([1], 0));
        assert!(trade_favorability(board, &index, &raised) >= 15);
    }

    proptest! {
        #[test]
        fn purchase_score_is_bounded(
            balance in 0i64..5000,
            square in 0u8..40,
            owned in proptest::collection::vec((0u8..40, 0usize..3), 0..12),
        ) {
            let board = BoardCatalog::standard();
            let players = players(&[balance, 1500, 1500]);
            let mut index = OwnershipIndex::new();
            for (property, owner) in owned {
                let _ = index.acquire(board, property, owner);
            }
            let score = purchase_score(board, &index, &players, square, 0);
            prop_assert!(score <= MAX_PURCHASE_SCORE);
            if board.property(square).is_none() {
                prop_assert_eq!(score, 0);
            }
        }

        #[test]
        fn favorability_is_a_percentage(give in 0i64..2000, take in 0i64..2000) {
            let board = BoardCatalog::standard();
            let index = OwnershipIndex::new();
            let value = trade_favorability(board, &index, &offer(TradeTerms::cash(give), TradeTerms::cash(take)));
            prop_assert!((-100..=100).contains(&value));
        }
    }
}
