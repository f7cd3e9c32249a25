use std::collections::VecDeque;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::board::{GO_SQUARE, SquareId};
use crate::types::{CardDeck, PropertyGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Card {
    AdvanceTo(SquareId),
    AdvanceToNearest(PropertyGroup),
    GoBack(u8),
    Collect(i64),
    Pay(i64),
    CollectFromEach(i64),
    PayEach(i64),
    GoToJail,
    GetOutOfJailFree,
}

#[derive(Debug, Clone)]
pub struct CardDecks {
    decks: [VecDeque<Card>; 2],
}

impl CardDecks {
    pub fn shuffled(rng: &mut impl rand::Rng) -> Self {
        let mut chance = chance_cards();
        let mut chest = community_chest_cards();
        chance.shuffle(rng);
        chest.shuffle(rng);
        Self {
            decks: [chance.into(), chest.into()],
        }
    }

    /// Draws the top card. Jail cards leave the deck until they are spent.
    pub fn draw(&mut self, deck: CardDeck) -> Option<Card> {
        let pile = &mut self.decks[deck.index()];
        let card = pile.pop_front()?;
        if card != Card::GetOutOfJailFree {
            pile.push_back(card);
        }
        Some(card)
    }

    pub fn return_jail_card(&mut self, deck: CardDeck) {
        self.decks[deck.index()].push_back(Card::GetOutOfJailFree);
    }

    pub fn len(&self, deck: CardDeck) -> usize {
        self.decks[deck.index()].len()
    }

    /// Puts `card` on top of `deck`; used to stage draws in tests and replays.
    pub fn stack(&mut self, deck: CardDeck, card: Card) {
        self.decks[deck.index()].push_front(card);
    }
}

fn chance_cards() -> Vec<Card> {
    use Card::*;
    vec![
        AdvanceTo(GO_SQUARE),
        AdvanceTo(24),
        AdvanceTo(11),
        AdvanceTo(39),
        AdvanceTo(5),
        AdvanceToNearest(PropertyGroup::Railroad),
        AdvanceToNearest(PropertyGroup::Railroad),
        AdvanceToNearest(PropertyGroup::Utility),
        Collect(50),
        Collect(150),
        GetOutOfJailFree,
        GoBack(3),
        GoToJail,
        Pay(15),
        PayEach(50),
    ]
}

fn community_chest_cards() -> Vec<Card> {
    use Card::*;
    vec![
        AdvanceTo(GO_SQUARE),
        Collect(200),
        Pay(50),
        Collect(50),
        GetOutOfJailFree,
        GoToJail,
        Collect(100),
        Collect(20),
        CollectFromEach(10),
        Collect(100),
        Pay(100),
        Pay(50),
        Collect(25),
        Collect(10),
        Collect(100),
    ]
}
