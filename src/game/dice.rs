use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::board::SquareId;
use crate::game::players::wrap_position;

/// Consecutive doubles that send a player to jail.
pub const MAX_DOUBLES: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiceRoll {
    pub die1: u8,
    pub die2: u8,
}

impl DiceRoll {
    /// Builds a roll from a forced pair, rejecting faces outside 1..=6.
    pub fn from_pair(die1: u8, die2: u8) -> Option<Self> {
        let valid = 1..=6;
        (valid.contains(&die1) && valid.contains(&die2)).then_some(Self { die1, die2 })
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            die1: rng.gen_range(1..=6),
            die2: rng.gen_range(1..=6),
        }
    }

    pub fn total(&self) -> u8 {
        self.die1 + self.die2
    }

    pub fn is_double(&self) -> bool {
        self.die1 == self.die2
    }
}

/// What a normal (non-jailed) roll does to the roller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Moved {
        from: SquareId,
        to: SquareId,
        passed_go: bool,
    },
    /// Third consecutive double: straight to jail, no movement.
    SpeedingToJail,
}

/// Applies the doubles rule and the board wrap to a roll.
///
/// `doubles` is the roller's per-turn doubles counter; it is incremented on a
/// double and reset to zero otherwise or when the jail limit is hit.
pub fn resolve_movement(position: SquareId, roll: DiceRoll, doubles: &mut u8) -> Movement {
    if roll.is_double() {
        *doubles += 1;
        if *doubles >= MAX_DOUBLES {
            *doubles = 0;
            return Movement::SpeedingToJail;
        }
    } else {
        *doubles = 0;
    }
    let (to, passed_go) = wrap_position(position, roll.total());
    Movement::Moved {
        from: position,
        to,
        passed_go,
    }
}
