use serde::{Deserialize, Serialize};

use crate::board::{BoardCatalog, Property, RAILROAD_BASE_RENT, SquareId, SquareKind};
use crate::game::dice::DiceRoll;
use crate::game::ownership::OwnershipIndex;
use crate::types::{CardDeck, PropertyGroup};

/// Follow-up required after a token stops on a square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Landing {
    Buyable { property: SquareId, price: i64 },
    OwnedByOther { property: SquareId, owner: usize, rent: i64 },
    OwnedBySelf { property: SquareId },
    Tax { amount: i64 },
    DrawCard(CardDeck),
    GoToJail,
    Free,
}

impl Landing {
    pub fn property(&self) -> Option<SquareId> {
        match self {
            Landing::Buyable { property, .. }
            | Landing::OwnedByOther { property, .. }
            | Landing::OwnedBySelf { property } => Some(*property),
            _ => None,
        }
    }
}

/// How rent is multiplied, for card effects that override the normal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RentModifier {
    #[default]
    Normal,
    /// Nearest-railroad card: twice the usual railroad rent.
    DoubleRailroad,
    /// Nearest-utility card: ten times the dice regardless of utilities owned.
    TenTimesDice,
}

/// Classifies `square` for `player`. Pure: reads ownership, never mutates it.
pub fn classify(
    board: &BoardCatalog,
    ownership: &OwnershipIndex,
    square: SquareId,
    player: usize,
    roll: Option<DiceRoll>,
) -> Landing {
    classify_with(board, ownership, square, player, roll, RentModifier::Normal)
}

pub fn classify_with(
    board: &BoardCatalog,
    ownership: &OwnershipIndex,
    square: SquareId,
    player: usize,
    roll: Option<DiceRoll>,
    modifier: RentModifier,
) -> Landing {
    match &board.square(square).kind {
        SquareKind::Property(property) => match ownership.get(property.position) {
            None => Landing::Buyable {
                property: property.position,
                price: property.price,
            },
            Some(record) if record.owner == player => Landing::OwnedBySelf {
                property: property.position,
            },
            Some(record) => Landing::OwnedByOther {
                property: property.position,
                owner: record.owner,
                rent: rent_due(board, ownership, property, roll, modifier),
            },
        },
        SquareKind::Tax { amount } => Landing::Tax { amount: *amount },
        SquareKind::Card(deck) => Landing::DrawCard(*deck),
        SquareKind::GoToJail => Landing::GoToJail,
        SquareKind::Go | SquareKind::Jail | SquareKind::FreeParking => Landing::Free,
    }
}

/// Rent owed to the owner of `property`. Zero if unowned or mortgaged.
pub fn rent_due(
    board: &BoardCatalog,
    ownership: &OwnershipIndex,
    property: &Property,
    roll: Option<DiceRoll>,
    modifier: RentModifier,
) -> i64 {
    let Some(record) = ownership.get(property.position) else {
        return 0;
    };
    if record.mortgaged {
        return 0;
    }
    let owned_in_group = ownership.count_in_group(board, record.owner, property.group);
    match property.group {
        PropertyGroup::Railroad => {
            let rent = railroad_rent(owned_in_group);
            match modifier {
                RentModifier::DoubleRailroad => rent * 2,
                _ => rent,
            }
        }
        PropertyGroup::Utility => {
            let dice_total = roll.map(|r| r.total() as i64).unwrap_or(7);
            let multiplier = match modifier {
                RentModifier::TenTimesDice => 10,
                _ if owned_in_group >= 2 => 10,
                _ => 4,
            };
            dice_total * multiplier
        }
        _ => {
            let level = record.houses.min(5) as usize;
            let base = property.rents[level];
            if level == 0 && ownership.owns_group(board, record.owner, property.group) {
                base * 2
            } else {
                base
            }
        }
    }
}

pub fn railroad_rent(owned: usize) -> i64 {
    if owned == 0 {
        return 0;
    }
    RAILROAD_BASE_RENT << (owned.min(4) - 1)
}
