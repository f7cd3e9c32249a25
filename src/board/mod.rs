use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::types::{CardDeck, PropertyGroup};

pub type SquareId = u8;

pub const BOARD_SIZE: u8 = 40;
pub const GO_SQUARE: SquareId = 0;
pub const JAIL_SQUARE: SquareId = 10;
pub const FREE_PARKING_SQUARE: SquareId = 20;
pub const GO_TO_JAIL_SQUARE: SquareId = 30;

pub const RAILROAD_BASE_RENT: i64 = 25;
/// Expected utility rent for an average roll of 7 with a single utility owned.
pub const UTILITY_EXPECTED_RENT: i64 = 28;

#[derive(Debug, Clone, Serialize)]
pub struct Property {
    pub position: SquareId,
    pub name: &'static str,
    pub group: PropertyGroup,
    pub price: i64,
    /// Site rent followed by rent with 1-4 houses and a hotel. Zero for railroads and utilities.
    pub rents: [i64; 6],
    pub house_cost: i64,
}

impl Property {
    pub fn mortgage_value(&self) -> i64 {
        self.price / 2
    }

    pub fn unmortgage_cost(&self) -> i64 {
        self.mortgage_value() + self.mortgage_value() / 10
    }

    pub fn site_rent(&self) -> i64 {
        match self.group {
            PropertyGroup::Railroad => RAILROAD_BASE_RENT,
            PropertyGroup::Utility => UTILITY_EXPECTED_RENT,
            _ => self.rents[0],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum SquareKind {
    Go,
    Property(Property),
    Tax { amount: i64 },
    Card(CardDeck),
    Jail,
    FreeParking,
    GoToJail,
}

#[derive(Debug, Clone, Serialize)]
pub struct Square {
    pub position: SquareId,
    pub name: &'static str,
    pub kind: SquareKind,
}

impl Square {
    pub fn property(&self) -> Option<&Property> {
        match &self.kind {
            SquareKind::Property(property) => Some(property),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("a board has {BOARD_SIZE} squares, got {0}")]
    WrongSize(usize),
    #[error("square at index {index} claims position {position}")]
    Misplaced { index: usize, position: SquareId },
}

/// Immutable board reference data shared by every session.
#[derive(Debug, Clone)]
pub struct BoardCatalog {
    squares: Vec<Square>,
    groups: HashMap<PropertyGroup, Vec<SquareId>>,
    landing_frequency: [f64; BOARD_SIZE as usize],
}

impl BoardCatalog {
    pub fn standard() -> &'static BoardCatalog {
        &STANDARD_BOARD
    }

    /// Builds a catalog from a full ring of squares, e.g. a house-rules variant.
    ///
    /// Landing frequencies are those of the standard board geometry.
    pub fn from_squares(squares: Vec<Square>) -> Result<Self, BoardError> {
        if squares.len() != BOARD_SIZE as usize {
            return Err(BoardError::WrongSize(squares.len()));
        }
        if let Some((index, square)) = squares
            .iter()
            .enumerate()
            .find(|(index, square)| square.position as usize != *index)
        {
            return Err(BoardError::Misplaced {
                index,
                position: square.position,
            });
        }
        Ok(Self::assemble(squares))
    }

    fn assemble(squares: Vec<Square>) -> Self {
        let mut groups: HashMap<PropertyGroup, Vec<SquareId>> = HashMap::new();
        for square in &squares {
            if let Some(property) = square.property() {
                groups.entry(property.group).or_default().push(property.position);
            }
        }
        BoardCatalog {
            squares,
            groups,
            landing_frequency: LANDING_FREQUENCY,
        }
    }

    pub fn square(&self, position: SquareId) -> &Square {
        &self.squares[(position % BOARD_SIZE) as usize]
    }

    pub fn squares(&self) -> &[Square] {
        &self.squares
    }

    pub fn property(&self, position: SquareId) -> Option<&Property> {
        self.squares
            .get(position as usize)
            .and_then(|square| square.property())
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> + '_ {
        self.squares.iter().filter_map(|square| square.property())
    }

    pub fn group_members(&self, group: PropertyGroup) -> &[SquareId] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn group_size(&self, group: PropertyGroup) -> usize {
        self.group_members(group).len()
    }

    /// Long-run probability (in percent) of ending a move on `position`.
    pub fn landing_frequency(&self, position: SquareId) -> f64 {
        self.landing_frequency[(position % BOARD_SIZE) as usize]
    }

    pub fn average_property_frequency(&self) -> f64 {
        let (sum, count) = self
            .properties()
            .fold((0.0, 0usize), |(sum, count), property| {
                (sum + self.landing_frequency(property.position), count + 1)
            });
        if count == 0 { 0.0 } else { sum / count as f64 }
    }

    /// First square at or after `from` (exclusive) whose property belongs to `group`.
    pub fn next_in_group(&self, from: SquareId, group: PropertyGroup) -> Option<SquareId> {
        (1..=BOARD_SIZE)
            .map(|offset| (from + offset) % BOARD_SIZE)
            .find(|pos| {
                self.property(*pos)
                    .is_some_and(|property| property.group == group)
            })
    }
}

fn street(
    position: SquareId,
    name: &'static str,
    group: PropertyGroup,
    price: i64,
    rents: [i64; 6],
    house_cost: i64,
) -> Square {
    Square {
        position,
        name,
        kind: SquareKind::Property(Property {
            position,
            name,
            group,
            price,
            rents,
            house_cost,
        }),
    }
}

fn transport(position: SquareId, name: &'static str, group: PropertyGroup, price: i64) -> Square {
    Square {
        position,
        name,
        kind: SquareKind::Property(Property {
            position,
            name,
            group,
            price,
            rents: [0; 6],
            house_cost: 0,
        }),
    }
}

fn plain(position: SquareId, name: &'static str, kind: SquareKind) -> Square {
    Square {
        position,
        name,
        kind,
    }
}

static STANDARD_BOARD: Lazy<BoardCatalog> = Lazy::new(|| {
    use PropertyGroup::*;
    let squares = vec![
        plain(0, "Go", SquareKind::Go),
        street(1, "Mediterranean Avenue", Brown, 60, [2, 10, 30, 90, 160, 250], 50),
        plain(2, "Community Chest", SquareKind::Card(CardDeck::CommunityChest)),
        street(3, "Baltic Avenue", Brown, 60, [4, 20, 60, 180, 320, 450], 50),
        plain(4, "Income Tax", SquareKind::Tax { amount: 200 }),
        transport(5, "Reading Railroad", Railroad, 200),
        street(6, "Oriental Avenue", LightBlue, 100, [6, 30, 90, 270, 400, 550], 50),
        plain(7, "Chance", SquareKind::Card(CardDeck::Chance)),
        street(8, "Vermont Avenue", LightBlue, 100, [6, 30, 90, 270, 400, 550], 50),
        street(9, "Connecticut Avenue", LightBlue, 120, [8, 40, 100, 300, 450, 600], 50),
        plain(10, "Jail", SquareKind::Jail),
        street(11, "St. Charles Place", Pink, 140, [10, 50, 150, 450, 625, 750], 100),
        transport(12, "Electric Company", Utility, 150),
        street(13, "States Avenue", Pink, 140, [10, 50, 150, 450, 625, 750], 100),
        street(14, "Virginia Avenue", Pink, 160, [12, 60, 180, 500, 700, 900], 100),
        transport(15, "Pennsylvania Railroad", Railroad, 200),
        street(16, "St. James Place", Orange, 180, [14, 70, 200, 550, 750, 950], 100),
        plain(17, "Community Chest", SquareKind::Card(CardDeck::CommunityChest)),
        street(18, "Tennessee Avenue", Orange, 180, [14, 70, 200, 550, 750, 950], 100),
        street(19, "New York Avenue", Orange, 200, [16, 80, 220, 600, 800, 1000], 100),
        plain(20, "Free Parking", SquareKind::FreeParking),
        street(21, "Kentucky Avenue", Red, 220, [18, 90, 250, 700, 875, 1050], 150),
        plain(22, "Chance", SquareKind::Card(CardDeck::Chance)),
        street(23, "Indiana Avenue", Red, 220, [18, 90, 250, 700, 875, 1050], 150),
        street(24, "Illinois Avenue", Red, 240, [20, 100, 300, 750, 925, 1100], 150),
        transport(25, "B. & O. Railroad", Railroad, 200),
        street(26, "Atlantic Avenue", Yellow, 260, [22, 110, 330, 800, 975, 1150], 150),
        street(27, "Ventnor Avenue", Yellow, 260, [22, 110, 330, 800, 975, 1150], 150),
        transport(28, "Water Works", Utility, 150),
        street(29, "Marvin Gardens", Yellow, 280, [24, 120, 360, 850, 1025, 1200], 150),
        plain(30, "Go To Jail", SquareKind::GoToJail),
        street(31, "Pacific Avenue", Green, 300, [26, 130, 390, 900, 1100, 1275], 200),
        street(32, "North Carolina Avenue", Green, 300, [26, 130, 390, 900, 1100, 1275], 200),
        plain(33, "Community Chest", SquareKind::Card(CardDeck::CommunityChest)),
        street(34, "Pennsylvania Avenue", Green, 320, [28, 150, 450, 1000, 1200, 1400], 200),
        transport(35, "Short Line", Railroad, 200),
        plain(36, "Chance", SquareKind::Card(CardDeck::Chance)),
        street(37, "Park Place", DarkBlue, 350, [35, 175, 500, 1100, 1300, 1500], 200),
        plain(38, "Luxury Tax", SquareKind::Tax { amount: 100 }),
        street(39, "Boardwalk", DarkBlue, 400, [50, 200, 600, 1400, 1700, 2000], 200),
    ];
    BoardCatalog::assemble(squares)
});

// Long-run landing percentages for a standard game, jail square includes inmates.
const LANDING_FREQUENCY: [f64; BOARD_SIZE as usize] = [
    3.09, 2.13, 1.88, 2.16, 2.33, 2.96, 2.26, 0.87, 2.32, 2.30, //
    6.24, 2.70, 2.60, 2.37, 2.46, 2.92, 2.79, 2.59, 2.94, 3.09, //
    2.88, 2.83, 1.05, 2.74, 3.19, 3.06, 2.71, 2.68, 2.81, 2.62, //
    0.00, 2.68, 2.62, 2.37, 2.50, 2.43, 0.87, 2.19, 2.19, 2.62,
];
