use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyGroup {
    Brown,
    LightBlue,
    Pink,
    Orange,
    Red,
    Yellow,
    Green,
    DarkBlue,
    Railroad,
    Utility,
}

impl PropertyGroup {
    pub const ALL: [PropertyGroup; 10] = [
        PropertyGroup::Brown,
        PropertyGroup::LightBlue,
        PropertyGroup::Pink,
        PropertyGroup::Orange,
        PropertyGroup::Red,
        PropertyGroup::Yellow,
        PropertyGroup::Green,
        PropertyGroup::DarkBlue,
        PropertyGroup::Railroad,
        PropertyGroup::Utility,
    ];

    pub fn is_street(self) -> bool {
        !matches!(self, PropertyGroup::Railroad | PropertyGroup::Utility)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CardDeck {
    Chance,
    CommunityChest,
}

impl CardDeck {
    pub const fn index(self) -> usize {
        match self {
            CardDeck::Chance => 0,
            CardDeck::CommunityChest => 1,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Token {
    Car,
    Dog,
    Hat,
    Ship,
    Thimble,
    Boot,
    Iron,
    Wheelbarrow,
}

impl Token {
    pub const ORDERED: [Token; 8] = [
        Token::Car,
        Token::Dog,
        Token::Hat,
        Token::Ship,
        Token::Thimble,
        Token::Boot,
        Token::Iron,
        Token::Wheelbarrow,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Waiting,
    Running,
    Finished,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Finished | SessionStatus::Cancelled)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    #[default]
    Public,
    Private,
}

/// Where the active player is inside their turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnPhase {
    WaitingForRoll,
    Rolling,
    AwaitingLandingAction,
    AwaitingBuyDecision,
    EndingTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LockKind {
    Roll,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Roll,
    PayJailFine,
    UseJailCard,
    BuyProperty,
    SkipProperty,
    Mortgage,
    Unmortgage,
    EndTurn,
    ProposeTrade,
    AcceptTrade,
    DeclineTrade,
    CounterTrade,
    DeclareBankruptcy,
}

impl ActionType {
    /// Action kinds that advance the turn and therefore need the session lock.
    pub fn lock_kind(self) -> Option<LockKind> {
        match self {
            ActionType::Roll | ActionType::PayJailFine | ActionType::UseJailCard => {
                Some(LockKind::Roll)
            }
            ActionType::BuyProperty | ActionType::SkipProperty | ActionType::EndTurn => {
                Some(LockKind::End)
            }
            _ => None,
        }
    }

    pub fn is_trade_response(self) -> bool {
        matches!(
            self,
            ActionType::AcceptTrade | ActionType::DeclineTrade | ActionType::CounterTrade
        )
    }
}
