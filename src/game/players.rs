use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::{BOARD_SIZE, JAIL_SQUARE, SquareId};
use crate::types::{CardDeck, Token};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: Uuid,
    pub wallet: String,
    pub display_name: String,
    pub symbol: Token,
    pub turn_order: usize,
    pub balance: i64,
    pub position: SquareId,
    /// Get-out-of-jail-free cards held, indexed by [`CardDeck::index`].
    pub jail_cards: [u8; 2],
    pub in_jail: bool,
    pub jail_attempts: u8,
    pub bankrupt: bool,
    pub automated: bool,
}

impl PlayerState {
    pub fn new(turn_order: usize, symbol: Token, balance: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet: String::new(),
            display_name: format!("Player {}", turn_order + 1),
            symbol,
            turn_order,
            balance,
            position: 0,
            jail_cards: [0; 2],
            in_jail: false,
            jail_attempts: 0,
            bankrupt: false,
            automated: false,
        }
    }

    pub fn with_identity(mut self, wallet: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.wallet = wallet.into();
        self.display_name = display_name.into();
        self
    }

    pub fn automated(mut self) -> Self {
        self.automated = true;
        self
    }

    pub fn is_active(&self) -> bool {
        !self.bankrupt
    }

    pub fn can_afford(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    pub fn credit(&mut self, amount: i64) {
        self.balance = self.balance.saturating_add(amount);
    }

    pub fn debit(&mut self, amount: i64) {
        self.balance = self.balance.saturating_sub(amount);
    }

    pub fn send_to_jail(&mut self) {
        self.position = JAIL_SQUARE;
        self.in_jail = true;
        self.jail_attempts = 0;
    }

    pub fn release_from_jail(&mut self) {
        self.in_jail = false;
        self.jail_attempts = 0;
    }

    pub fn total_jail_cards(&self) -> u8 {
        self.jail_cards.iter().sum()
    }

    pub fn add_jail_card(&mut self, deck: CardDeck) {
        self.jail_cards[deck.index()] = self.jail_cards[deck.index()].saturating_add(1);
    }

    /// Spends one card, returning the deck it goes back to.
    pub fn take_jail_card(&mut self) -> Option<CardDeck> {
        [CardDeck::Chance, CardDeck::CommunityChest]
            .into_iter()
            .find(|deck| self.jail_cards[deck.index()] > 0)
            .inspect(|deck| self.jail_cards[deck.index()] -= 1)
    }
}

/// `(position + steps) mod 40`, together with whether the move crossed Go.
pub fn wrap_position(position: SquareId, steps: u8) -> (SquareId, bool) {
    let raw = position as u16 + steps as u16;
    let size = BOARD_SIZE as u16;
    ((raw % size) as SquareId, raw >= size)
}
