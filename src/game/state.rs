use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    board::{BOARD_SIZE, BoardCatalog, FREE_PARKING_SQUARE, SquareId},
    store::SessionSnapshot,
    types::{ActionType, CardDeck, LockKind, PropertyGroup, SessionMode, SessionStatus, Token, TurnPhase},
};

use super::{
    action::{ActionPayload, GameAction},
    cards::{Card, CardDecks},
    dice::{DiceRoll, Movement, resolve_movement},
    landing::{Landing, RentModifier, classify_with},
    ownership::{OwnershipError, OwnershipIndex},
    players::{PlayerState, wrap_position},
    trade::{TradeBook, TradeId, TradeOffer, TradeResolution, TradeResponse},
};

pub const MAX_PLAYERS: usize = 8;
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const JOIN_CODE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub num_players: usize,
    pub mode: SessionMode,
    pub starting_cash: i64,
    pub pass_go_credit: i64,
    pub jail_fine: i64,
    pub max_jail_attempts: u8,
    /// Taxes, fines and card payments accumulate on Free Parking.
    pub free_parking_pot: bool,
    /// Owners sitting in jail still collect rent.
    pub rent_in_jail: bool,
    pub seed: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            num_players: 4,
            mode: SessionMode::Public,
            starting_cash: 1500,
            pass_go_credit: 200,
            jail_fine: 50,
            max_jail_attempts: 3,
            free_parking_pot: false,
            rent_in_jail: true,
            seed: 42,
        }
    }
}

/// Explicit per-turn flags. Reset whenever the turn passes to another player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
    pub phase: TurnPhase,
    pub doubles: u8,
    pub has_rolled: bool,
    pub extra_roll: bool,
    pub last_roll: Option<DiceRoll>,
    pub active_landing: Option<Landing>,
    pub landing_resolved: bool,
}

impl TurnState {
    fn fresh() -> Self {
        Self {
            phase: TurnPhase::WaitingForRoll,
            doubles: 0,
            has_rolled: false,
            extra_roll: false,
            last_roll: None,
            active_landing: None,
            landing_resolved: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLock {
    pub kind: LockKind,
    pub player: usize,
    pub action: ActionType,
    resume_phase: TurnPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Creditor {
    Bank,
    Player(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceReason {
    PassGo,
    Rent,
    Tax,
    Card,
    JailFine,
    Mortgage,
    Unmortgage,
    FreeParking,
    Bankruptcy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    SessionStarted,
    SessionCancelled,
    DiceRolled {
        player: usize,
        roll: DiceRoll,
    },
    Moved {
        player: usize,
        from: SquareId,
        to: SquareId,
        roll: Option<DiceRoll>,
    },
    SentToJail {
        player: usize,
    },
    ReleasedFromJail {
        player: usize,
    },
    JailAttemptFailed {
        player: usize,
        attempts: u8,
    },
    BalanceChanged {
        player: usize,
        delta: i64,
        reason: BalanceReason,
    },
    PotChanged {
        pot: i64,
    },
    PropertyBought {
        player: usize,
        property: SquareId,
        price: i64,
    },
    PropertySkipped {
        player: usize,
        property: SquareId,
    },
    MortgageChanged {
        player: usize,
        property: SquareId,
        mortgaged: bool,
    },
    CardDrawn {
        player: usize,
        deck: CardDeck,
        card: Card,
    },
    JailCardGained {
        player: usize,
        deck: CardDeck,
    },
    JailCardUsed {
        player: usize,
        deck: CardDeck,
    },
    TradeProposed {
        offer: TradeOffer,
    },
    TradeResolved {
        trade: TradeId,
        responder: usize,
        resolution: TradeResolution,
    },
    PlayerBankrupt {
        player: usize,
        creditor: Creditor,
        released: Vec<SquareId>,
    },
    TurnAdvanced {
        from: usize,
        next_player: usize,
        turn: u32,
    },
    GameWon {
        winner: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: u64,
    pub turn: u32,
    pub event: GameEvent,
}

#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub events: Vec<HistoryEntry>,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TurnViolation {
    #[error("player {actual} acted during player {expected}'s turn")]
    NotYourTurn { expected: usize, actual: usize },
    #[error("a {0} operation is already in flight")]
    Locked(LockKind),
    #[error("{action} is not allowed while {phase}")]
    WrongPhase { phase: TurnPhase, action: ActionType },
}

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("game already completed")]
    GameFinished,
    #[error("session is {0}, not running")]
    SessionNotRunning(SessionStatus),
    #[error("invalid player index {0}")]
    InvalidPlayer(usize),
    #[error("invalid turn: {0}")]
    InvalidTurn(TurnViolation),
    #[error("insufficient funds: have {available}, need {required}")]
    InsufficientFunds { available: i64, required: i64 },
    #[error("property {0} is already owned")]
    AlreadyOwned(SquareId),
    #[error("invalid trade: {0}")]
    InvalidTrade(&'static str),
    #[error("ownership of property {0} changed since the offer was made")]
    StaleOffer(SquareId),
    #[error("trade {0} not found")]
    TradeNotFound(TradeId),
    #[error("game store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("missing or invalid payload: {0}")]
    InvalidPayload(&'static str),
    #[error(transparent)]
    Ownership(OwnershipError),
    #[error("action not allowed at this stage")]
    IllegalAction,
}

impl From<OwnershipError> for GameError {
    fn from(err: OwnershipError) -> Self {
        match err {
            OwnershipError::AlreadyOwned(property) => GameError::AlreadyOwned(property),
            OwnershipError::NotAProperty(_) => GameError::InvalidPayload("square is not a property"),
            other => GameError::Ownership(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub id: Uuid,
    pub code: String,
    pub config: GameConfig,
    pub status: SessionStatus,
    pub players: Vec<PlayerState>,
    pub next_player: usize,
    pub turn: u32,
    pub turn_state: TurnState,
    pub ownership: OwnershipIndex,
    pub trades: TradeBook,
    pub winner: Option<usize>,
    pub free_parking_pot: i64,
    history: Vec<HistoryEntry>,
    actions: Vec<GameAction>,
    available_actions: Vec<GameAction>,
    lock: Option<ActionLock>,
    decks: CardDecks,
    board: &'static BoardCatalog,
    rng: StdRng,
}

impl GameState {
    /// Creates a session in the WAITING state with `config.num_players` seats.
    pub fn new(config: GameConfig) -> Self {
        assert!(
            (2..=MAX_PLAYERS).contains(&config.num_players),
            "sessions support between 2 and {MAX_PLAYERS} players"
        );

        let mut rng = StdRng::seed_from_u64(config.seed);
        let code = join_code(&mut rng);
        let decks = CardDecks::shuffled(&mut rng);
        let players = Token::ORDERED
            .iter()
            .take(config.num_players)
            .enumerate()
            .map(|(order, symbol)| PlayerState::new(order, *symbol, config.starting_cash))
            .collect();

        Self {
            id: Uuid::new_v4(),
            code,
            config,
            status: SessionStatus::Waiting,
            players,
            next_player: 0,
            turn: 0,
            turn_state: TurnState::fresh(),
            ownership: OwnershipIndex::new(),
            trades: TradeBook::new(),
            winner: None,
            free_parking_pot: 0,
            history: Vec::new(),
            actions: Vec::new(),
            available_actions: Vec::new(),
            lock: None,
            decks,
            board: BoardCatalog::standard(),
            rng,
        }
    }

    pub fn board(&self) -> &'static BoardCatalog {
        self.board
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn action_log(&self) -> &[GameAction] {
        &self.actions
    }

    pub fn legal_actions(&self) -> &[GameAction] {
        &self.available_actions
    }

    pub fn lock(&self) -> Option<&ActionLock> {
        self.lock.as_ref()
    }

    pub fn phase(&self) -> TurnPhase {
        self.turn_state.phase
    }

    pub fn active_landing(&self) -> Option<Landing> {
        self.turn_state.active_landing
    }

    pub fn active_players(&self) -> impl Iterator<Item = usize> + '_ {
        self.players
            .iter()
            .enumerate()
            .filter(|(_, player)| player.is_active())
            .map(|(idx, _)| idx)
    }

    /// Mutable access to the decks, for staging card draws.
    pub fn decks_mut(&mut self) -> &mut CardDecks {
        &mut self.decks
    }

    /// Replaces a seat while the session is still waiting for players.
    pub fn seat_player(&mut self, seat: usize, player: PlayerState) -> Result<(), GameError> {
        if self.status != SessionStatus::Waiting {
            return Err(GameError::IllegalAction);
        }
        let slot = self
            .players
            .get_mut(seat)
            .ok_or(GameError::InvalidPlayer(seat))?;
        *slot = PlayerState {
            turn_order: seat,
            balance: self.config.starting_cash,
            ..player
        };
        Ok(())
    }

    pub fn start(&mut self) -> Result<StepOutcome, GameError> {
        if self.status != SessionStatus::Waiting {
            return Err(GameError::SessionNotRunning(self.status));
        }
        self.status = SessionStatus::Running;
        let mut outcome = StepOutcome::default();
        self.emit(&mut outcome, GameEvent::SessionStarted);
        self.refresh_available_actions();
        info!(session = %self.id, code = %self.code, players = self.players.len(), "session started");
        Ok(outcome)
    }

    pub fn cancel(&mut self) -> Result<StepOutcome, GameError> {
        if self.status.is_terminal() {
            return Err(GameError::GameFinished);
        }
        self.status = SessionStatus::Cancelled;
        self.lock = None;
        let mut outcome = StepOutcome::default();
        self.emit(&mut outcome, GameEvent::SessionCancelled);
        outcome.done = true;
        self.refresh_available_actions();
        info!(session = %self.id, "session cancelled");
        Ok(outcome)
    }

    /// Takes the session lock for a turn-advancing action by `player` and returns it.
    ///
    /// Trade and mortgage actions are not gated by the lock and get `None`.
    pub fn acquire_lock(
        &mut self,
        player: usize,
        action_type: ActionType,
    ) -> Result<Option<ActionLock>, GameError> {
        let Some(kind) = action_type.lock_kind() else {
            return Ok(None);
        };
        self.ensure_running()?;
        self.ensure_turn(player, action_type)?;
        let resume_phase = self.turn_state.phase;
        if kind == LockKind::Roll {
            self.turn_state.phase = TurnPhase::Rolling;
        }
        let lock = ActionLock {
            kind,
            player,
            action: action_type,
            resume_phase,
        };
        self.lock = Some(lock);
        self.refresh_available_actions();
        debug!(session = %self.id, player, %kind, "lock acquired");
        Ok(Some(lock))
    }

    pub fn release_lock(&mut self) {
        if let Some(lock) = self.lock.take() {
            if self.turn_state.phase == TurnPhase::Rolling {
                self.turn_state.phase = lock.resume_phase;
            }
            self.refresh_available_actions();
            debug!(session = %self.id, kind = %lock.kind, "lock released");
        }
    }

    /// Releases the lock only if it is still the one `held` by the caller.
    pub fn release_held(&mut self, held: &ActionLock) {
        if self.lock.as_ref() == Some(held) {
            self.release_lock();
        }
    }

    /// Runs `action` against a copy of the session, leaving `self` untouched.
    ///
    /// A lock taken for this very action is dropped on the copy; any other lock stays.
    pub fn preview(&self, action: GameAction) -> Result<(GameState, StepOutcome), GameError> {
        let mut next = self.clone();
        if next.lock.is_some_and(|lock| {
            lock.player == action.player_index && lock.action == action.action_type
        }) {
            next.release_lock();
        }
        let outcome = next.step(action)?;
        Ok((next, outcome))
    }

    pub fn step(&mut self, mut action: GameAction) -> Result<StepOutcome, GameError> {
        self.ensure_running()?;
        let player = action.player_index;
        match self.players.get(player) {
            Some(state) if state.is_active() => {}
            _ => return Err(GameError::InvalidPlayer(player)),
        }

        let mut outcome = StepOutcome::default();
        match action.action_type {
            ActionType::ProposeTrade
            | ActionType::AcceptTrade
            | ActionType::DeclineTrade
            | ActionType::CounterTrade => self.handle_trade_action(&action, &mut outcome)?,
            ActionType::Mortgage | ActionType::Unmortgage => {
                self.handle_mortgage_action(&action, &mut outcome)?
            }
            ActionType::DeclareBankruptcy => self.bankrupt(player, Creditor::Bank, &mut outcome),
            action_type => {
                self.ensure_turn(player, action_type)?;
                self.handle_turn_action(&mut action, &mut outcome)?
            }
        }

        if self.status == SessionStatus::Running && !self.players[self.next_player].is_active() {
            self.advance_turn(&mut outcome);
        }
        self.actions.push(action);
        self.refresh_available_actions();
        outcome.done = self.status.is_terminal();
        Ok(outcome)
    }

    fn ensure_running(&self) -> Result<(), GameError> {
        match self.status {
            SessionStatus::Running => Ok(()),
            SessionStatus::Finished | SessionStatus::Cancelled => Err(GameError::GameFinished),
            status => Err(GameError::SessionNotRunning(status)),
        }
    }

    fn ensure_turn(&self, player: usize, action: ActionType) -> Result<(), GameError> {
        if let Some(lock) = &self.lock {
            return Err(GameError::InvalidTurn(TurnViolation::Locked(lock.kind)));
        }
        if player != self.next_player {
            return Err(GameError::InvalidTurn(TurnViolation::NotYourTurn {
                expected: self.next_player,
                actual: player,
            }));
        }
        let phase = self.turn_state.phase;
        let allowed = match action {
            ActionType::Roll | ActionType::PayJailFine | ActionType::UseJailCard => {
                phase == TurnPhase::WaitingForRoll
            }
            ActionType::BuyProperty | ActionType::SkipProperty => {
                phase == TurnPhase::AwaitingBuyDecision
            }
            ActionType::EndTurn => phase == TurnPhase::EndingTurn,
            _ => false,
        };
        if !allowed {
            return Err(GameError::InvalidTurn(TurnViolation::WrongPhase { phase, action }));
        }
        Ok(())
    }

    fn handle_turn_action(
        &mut self,
        action: &mut GameAction,
        outcome: &mut StepOutcome,
    ) -> Result<(), GameError> {
        let player = action.player_index;
        match action.action_type {
            ActionType::Roll => {
                let roll = match action.payload {
                    ActionPayload::Dice(die1, die2) => DiceRoll::from_pair(die1, die2)
                        .ok_or(GameError::InvalidPayload("dice faces must be between 1 and 6"))?,
                    _ => DiceRoll::random(&mut self.rng),
                };
                action.payload = ActionPayload::Dice(roll.die1, roll.die2);
                self.roll(player, roll, outcome);
            }
            ActionType::PayJailFine => {
                if !self.players[player].in_jail {
                    return Err(GameError::IllegalAction);
                }
                let fine = self.config.jail_fine;
                let available = self.players[player].balance;
                if available < fine {
                    return Err(GameError::InsufficientFunds {
                        available,
                        required: fine,
                    });
                }
                self.charge(player, fine, Creditor::Bank, BalanceReason::JailFine, outcome);
                self.players[player].release_from_jail();
                self.emit(outcome, GameEvent::ReleasedFromJail { player });
            }
            ActionType::UseJailCard => {
                if !self.players[player].in_jail {
                    return Err(GameError::IllegalAction);
                }
                let deck = self.players[player]
                    .take_jail_card()
                    .ok_or(GameError::IllegalAction)?;
                self.decks.return_jail_card(deck);
                self.players[player].release_from_jail();
                self.emit(outcome, GameEvent::JailCardUsed { player, deck });
                self.emit(outcome, GameEvent::ReleasedFromJail { player });
            }
            ActionType::BuyProperty => self.buy(player, &action.payload, outcome)?,
            ActionType::SkipProperty => self.skip(player, &action.payload, outcome)?,
            ActionType::EndTurn => self.advance_turn(outcome),
            _ => return Err(GameError::IllegalAction),
        }
        Ok(())
    }

    fn roll(&mut self, player: usize, roll: DiceRoll, outcome: &mut StepOutcome) {
        self.turn_state.has_rolled = true;
        self.turn_state.last_roll = Some(roll);
        self.emit(outcome, GameEvent::DiceRolled { player, roll });

        if self.players[player].in_jail {
            self.roll_in_jail(player, roll, outcome);
            return;
        }

        let position = self.players[player].position;
        match resolve_movement(position, roll, &mut self.turn_state.doubles) {
            Movement::SpeedingToJail => {
                debug!(session = %self.id, player, "third double, going to jail");
                self.jail(player, outcome);
                self.turn_state.phase = TurnPhase::EndingTurn;
            }
            Movement::Moved { to, passed_go, .. } => {
                self.turn_state.extra_roll = roll.is_double();
                self.move_to(player, to, passed_go, Some(roll), outcome);
                self.resolve_landing(player, Some(roll), RentModifier::Normal, outcome);
            }
        }
    }

    fn roll_in_jail(&mut self, player: usize, roll: DiceRoll, outcome: &mut StepOutcome) {
        self.turn_state.extra_roll = false;
        if !roll.is_double() {
            let attempts = {
                let state = &mut self.players[player];
                state.jail_attempts += 1;
                state.jail_attempts
            };
            if attempts < self.config.max_jail_attempts {
                self.emit(outcome, GameEvent::JailAttemptFailed { player, attempts });
                self.turn_state.phase = TurnPhase::EndingTurn;
                return;
            }
            let fine = self.config.jail_fine;
            self.charge(player, fine, Creditor::Bank, BalanceReason::JailFine, outcome);
            if !self.players[player].is_active() {
                return;
            }
        }
        self.players[player].release_from_jail();
        self.emit(outcome, GameEvent::ReleasedFromJail { player });
        let (to, passed_go) = wrap_position(self.players[player].position, roll.total());
        self.move_to(player, to, passed_go, Some(roll), outcome);
        self.resolve_landing(player, Some(roll), RentModifier::Normal, outcome);
    }

    fn move_to(
        &mut self,
        player: usize,
        to: SquareId,
        passed_go: bool,
        roll: Option<DiceRoll>,
        outcome: &mut StepOutcome,
    ) {
        let from = self.players[player].position;
        self.players[player].position = to;
        self.emit(
            outcome,
            GameEvent::Moved {
                player,
                from,
                to,
                roll,
            },
        );
        if passed_go {
            let credit = self.config.pass_go_credit;
            self.players[player].credit(credit);
            self.emit(
                outcome,
                GameEvent::BalanceChanged {
                    player,
                    delta: credit,
                    reason: BalanceReason::PassGo,
                },
            );
        }
    }

    fn resolve_landing(
        &mut self,
        player: usize,
        roll: Option<DiceRoll>,
        modifier: RentModifier,
        outcome: &mut StepOutcome,
    ) {
        self.turn_state.phase = TurnPhase::AwaitingLandingAction;
        let square = self.players[player].position;
        let landing = match classify_with(self.board, &self.ownership, square, player, roll, modifier)
        {
            Landing::OwnedByOther {
                property, owner, ..
            } if !self.config.rent_in_jail && self.players[owner].in_jail => Landing::OwnedByOther {
                property,
                owner,
                rent: 0,
            },
            landing => landing,
        };
        self.turn_state.active_landing = Some(landing);
        self.turn_state.landing_resolved = false;
        debug!(session = %self.id, player, square, ?landing, "landing classified");

        match landing {
            Landing::Buyable { .. } => {
                self.turn_state.phase = TurnPhase::AwaitingBuyDecision;
                return;
            }
            Landing::OwnedByOther { owner, rent, .. } => {
                self.charge(player, rent, Creditor::Player(owner), BalanceReason::Rent, outcome);
            }
            Landing::Tax { amount } => {
                self.charge(player, amount, Creditor::Bank, BalanceReason::Tax, outcome);
            }
            Landing::DrawCard(deck) => {
                self.draw_card(player, deck, roll, outcome);
                return;
            }
            Landing::GoToJail => self.jail(player, outcome),
            Landing::Free => {
                if square == FREE_PARKING_SQUARE && self.config.free_parking_pot {
                    self.collect_pot(player, outcome);
                }
            }
            Landing::OwnedBySelf { .. } => {}
        }
        self.finish_landing(player);
    }

    fn draw_card(
        &mut self,
        player: usize,
        deck: CardDeck,
        roll: Option<DiceRoll>,
        outcome: &mut StepOutcome,
    ) {
        let Some(card) = self.decks.draw(deck) else {
            self.finish_landing(player);
            return;
        };
        self.emit(outcome, GameEvent::CardDrawn { player, deck, card });
        let position = self.players[player].position;

        match card {
            Card::AdvanceTo(target) => {
                let steps = (target + BOARD_SIZE - position) % BOARD_SIZE;
                let (to, passed_go) = wrap_position(position, steps);
                self.move_to(player, to, passed_go, None, outcome);
                self.resolve_landing(player, roll, RentModifier::Normal, outcome);
                return;
            }
            Card::AdvanceToNearest(group) => {
                if let Some(target) = self.board.next_in_group(position, group) {
                    let steps = (target + BOARD_SIZE - position) % BOARD_SIZE;
                    let (to, passed_go) = wrap_position(position, steps);
                    let modifier = if group == PropertyGroup::Railroad {
                        RentModifier::DoubleRailroad
                    } else {
                        RentModifier::TenTimesDice
                    };
                    self.move_to(player, to, passed_go, None, outcome);
                    self.resolve_landing(player, roll, modifier, outcome);
                    return;
                }
            }
            Card::GoBack(steps) => {
                let to = (position + BOARD_SIZE - steps % BOARD_SIZE) % BOARD_SIZE;
                self.move_to(player, to, false, None, outcome);
                self.resolve_landing(player, roll, RentModifier::Normal, outcome);
                return;
            }
            Card::Collect(amount) => {
                self.players[player].credit(amount);
                self.emit(
                    outcome,
                    GameEvent::BalanceChanged {
                        player,
                        delta: amount,
                        reason: BalanceReason::Card,
                    },
                );
            }
            Card::Pay(amount) => {
                self.charge(player, amount, Creditor::Bank, BalanceReason::Card, outcome);
            }
            Card::CollectFromEach(amount) => {
                let others: Vec<usize> = self.active_players().filter(|idx| *idx != player).collect();
                for other in others {
                    self.charge(other, amount, Creditor::Player(player), BalanceReason::Card, outcome);
                }
            }
            Card::PayEach(amount) => {
                let others: Vec<usize> = self.active_players().filter(|idx| *idx != player).collect();
                for other in others {
                    if !self.players[player].is_active() {
                        break;
                    }
                    self.charge(player, amount, Creditor::Player(other), BalanceReason::Card, outcome);
                }
            }
            Card::GoToJail => self.jail(player, outcome),
            Card::GetOutOfJailFree => {
                self.players[player].add_jail_card(deck);
                self.emit(outcome, GameEvent::JailCardGained { player, deck });
            }
        }
        self.finish_landing(player);
    }

    fn finish_landing(&mut self, player: usize) {
        self.turn_state.landing_resolved = true;
        let state = &self.players[player];
        self.turn_state.phase = if self.turn_state.extra_roll && !state.in_jail && state.is_active() {
            TurnPhase::WaitingForRoll
        } else {
            TurnPhase::EndingTurn
        };
    }

    fn jail(&mut self, player: usize, outcome: &mut StepOutcome) {
        self.players[player].send_to_jail();
        self.turn_state.extra_roll = false;
        self.turn_state.doubles = 0;
        self.emit(outcome, GameEvent::SentToJail { player });
    }

    fn collect_pot(&mut self, player: usize, outcome: &mut StepOutcome) {
        let pot = std::mem::take(&mut self.free_parking_pot);
        if pot == 0 {
            return;
        }
        self.players[player].credit(pot);
        self.emit(
            outcome,
            GameEvent::BalanceChanged {
                player,
                delta: pot,
                reason: BalanceReason::FreeParking,
            },
        );
        self.emit(outcome, GameEvent::PotChanged { pot: 0 });
    }

    fn buy(
        &mut self,
        player: usize,
        payload: &ActionPayload,
        outcome: &mut StepOutcome,
    ) -> Result<(), GameError> {
        let Some(Landing::Buyable { property, price }) = self.turn_state.active_landing else {
            return Err(GameError::IllegalAction);
        };
        if let ActionPayload::Property(requested) = payload {
            if *requested != property {
                return Err(GameError::InvalidPayload("property is not the one landed on"));
            }
        }
        if self.ownership.owner_of(property).is_some() {
            return Err(GameError::AlreadyOwned(property));
        }
        let available = self.players[player].balance;
        if available < price {
            return Err(GameError::InsufficientFunds {
                available,
                required: price,
            });
        }
        self.ownership.acquire(self.board, property, player)?;
        self.players[player].debit(price);
        self.emit(
            outcome,
            GameEvent::PropertyBought {
                player,
                property,
                price,
            },
        );
        info!(session = %self.id, player, property, price, "property bought");
        self.finish_landing(player);
        Ok(())
    }

    fn skip(
        &mut self,
        player: usize,
        payload: &ActionPayload,
        outcome: &mut StepOutcome,
    ) -> Result<(), GameError> {
        let Some(Landing::Buyable { property, .. }) = self.turn_state.active_landing else {
            return Err(GameError::IllegalAction);
        };
        if let ActionPayload::Property(requested) = payload {
            if *requested != property {
                return Err(GameError::InvalidPayload("property is not the one landed on"));
            }
        }
        self.emit(outcome, GameEvent::PropertySkipped { player, property });
        self.finish_landing(player);
        Ok(())
    }

    /// Moves `amount` from `debtor` to `creditor`, mortgaging and then bankrupting as needed.
    fn charge(
        &mut self,
        debtor: usize,
        amount: i64,
        creditor: Creditor,
        reason: BalanceReason,
        outcome: &mut StepOutcome,
    ) {
        if amount <= 0 || !self.players[debtor].is_active() {
            return;
        }
        if !self.players[debtor].can_afford(amount) {
            self.liquidate(debtor, amount, outcome);
        }
        if !self.players[debtor].can_afford(amount) {
            self.bankrupt(debtor, creditor, outcome);
            return;
        }

        self.players[debtor].debit(amount);
        self.emit(
            outcome,
            GameEvent::BalanceChanged {
                player: debtor,
                delta: -amount,
                reason,
            },
        );
        match creditor {
            Creditor::Player(owner) => {
                self.players[owner].credit(amount);
                self.emit(
                    outcome,
                    GameEvent::BalanceChanged {
                        player: owner,
                        delta: amount,
                        reason,
                    },
                );
            }
            Creditor::Bank => {
                if self.config.free_parking_pot {
                    self.free_parking_pot += amount;
                    let pot = self.free_parking_pot;
                    self.emit(outcome, GameEvent::PotChanged { pot });
                }
            }
        }
    }

    /// Mortgages the debtor's properties, most valuable first, until `target` is covered.
    fn liquidate(&mut self, player: usize, target: i64, outcome: &mut StepOutcome) {
        for property in self.ownership.liquidation_order(self.board, player) {
            if self.players[player].can_afford(target) {
                break;
            }
            if self.ownership.mortgage(property, player).is_err() {
                continue;
            }
            let value = self
                .board
                .property(property)
                .map(|info| info.mortgage_value())
                .unwrap_or(0);
            self.players[player].credit(value);
            self.emit(
                outcome,
                GameEvent::MortgageChanged {
                    player,
                    property,
                    mortgaged: true,
                },
            );
            self.emit(
                outcome,
                GameEvent::BalanceChanged {
                    player,
                    delta: value,
                    reason: BalanceReason::Mortgage,
                },
            );
        }
    }

    fn bankrupt(&mut self, player: usize, creditor: Creditor, outcome: &mut StepOutcome) {
        if !self.players[player].is_active() {
            return;
        }
        let balance = self.players[player].balance;
        if balance > 0 {
            if let Creditor::Player(owner) = creditor {
                if owner != player && self.players[owner].is_active() {
                    self.players[owner].credit(balance);
                    self.emit(
                        outcome,
                        GameEvent::BalanceChanged {
                            player: owner,
                            delta: balance,
                            reason: BalanceReason::Bankruptcy,
                        },
                    );
                }
            }
        }
        if balance != 0 {
            self.players[player].balance = 0;
            self.emit(
                outcome,
                GameEvent::BalanceChanged {
                    player,
                    delta: -balance,
                    reason: BalanceReason::Bankruptcy,
                },
            );
        }

        let state = &mut self.players[player];
        state.bankrupt = true;
        state.in_jail = false;
        let cards = std::mem::take(&mut state.jail_cards);
        for deck in [CardDeck::Chance, CardDeck::CommunityChest] {
            for _ in 0..cards[deck.index()] {
                self.decks.return_jail_card(deck);
            }
        }
        let released = self.ownership.release_all(player);
        self.trades.withdraw_player(player);
        info!(session = %self.id, player, ?creditor, released = released.len(), "player bankrupt");
        self.emit(
            outcome,
            GameEvent::PlayerBankrupt {
                player,
                creditor,
                released,
            },
        );
        self.check_termination(outcome);
    }

    fn check_termination(&mut self, outcome: &mut StepOutcome) {
        let active: Vec<usize> = self.active_players().collect();
        if active.len() > 1 || self.status != SessionStatus::Running {
            return;
        }
        self.status = SessionStatus::Finished;
        self.winner = active.first().copied();
        self.lock = None;
        if let Some(winner) = self.winner {
            info!(session = %self.id, winner, "session finished");
            self.emit(outcome, GameEvent::GameWon { winner });
        }
    }

    fn advance_turn(&mut self, outcome: &mut StepOutcome) {
        let from = self.next_player;
        let count = self.players.len();
        let next = (1..=count)
            .map(|offset| (from + offset) % count)
            .find(|idx| self.players[*idx].is_active())
            .unwrap_or(from);
        self.next_player = next;
        self.turn += 1;
        self.turn_state = TurnState::fresh();
        self.emit(
            outcome,
            GameEvent::TurnAdvanced {
                from,
                next_player: next,
                turn: self.turn,
            },
        );
        debug!(session = %self.id, from, next, turn = self.turn, "turn advanced");
    }

    fn handle_trade_action(
        &mut self,
        action: &GameAction,
        outcome: &mut StepOutcome,
    ) -> Result<(), GameError> {
        let player = action.player_index;
        match (action.action_type, &action.payload) {
            (
                ActionType::ProposeTrade,
                ActionPayload::Trade {
                    counterparty,
                    offered,
                    requested,
                },
            ) => {
                let id = self.trades.propose(
                    self.board,
                    &self.players,
                    &self.ownership,
                    player,
                    *counterparty,
                    offered.clone(),
                    requested.clone(),
                )?;
                self.emit_proposal(id, outcome);
            }
            (ActionType::AcceptTrade | ActionType::DeclineTrade, ActionPayload::TradeReply(id)) => {
                let response = if action.action_type == ActionType::AcceptTrade {
                    TradeResponse::Accept
                } else {
                    TradeResponse::Decline
                };
                let resolution = self.trades.respond(
                    self.board,
                    &mut self.players,
                    &mut self.ownership,
                    *id,
                    player,
                    response,
                )?;
                self.emit(
                    outcome,
                    GameEvent::TradeResolved {
                        trade: *id,
                        responder: player,
                        resolution,
                    },
                );
            }
            (
                ActionType::CounterTrade,
                ActionPayload::Counter {
                    trade,
                    offered,
                    requested,
                },
            ) => {
                let resolution = self.trades.respond(
                    self.board,
                    &mut self.players,
                    &mut self.ownership,
                    *trade,
                    player,
                    TradeResponse::Counter {
                        offered: offered.clone(),
                        requested: requested.clone(),
                    },
                )?;
                self.emit(
                    outcome,
                    GameEvent::TradeResolved {
                        trade: *trade,
                        responder: player,
                        resolution,
                    },
                );
                if let TradeResolution::Countered { counter } = resolution {
                    self.emit_proposal(counter, outcome);
                }
            }
            _ => return Err(GameError::InvalidPayload("expected trade payload")),
        }
        Ok(())
    }

    fn emit_proposal(&mut self, id: TradeId, outcome: &mut StepOutcome) {
        if let Some(offer) = self.trades.get(id).cloned() {
            self.emit(outcome, GameEvent::TradeProposed { offer });
        }
    }

    fn handle_mortgage_action(
        &mut self,
        action: &GameAction,
        outcome: &mut StepOutcome,
    ) -> Result<(), GameError> {
        let player = action.player_index;
        let ActionPayload::Property(property) = action.payload else {
            return Err(GameError::InvalidPayload("expected property"));
        };
        let info = self
            .board
            .property(property)
            .ok_or(GameError::InvalidPayload("square is not a property"))?;
        let (mortgaged, delta, reason) = if action.action_type == ActionType::Mortgage {
            self.ownership.mortgage(property, player)?;
            (true, info.mortgage_value(), BalanceReason::Mortgage)
        } else {
            let cost = info.unmortgage_cost();
            let available = self.players[player].balance;
            if available < cost {
                return Err(GameError::InsufficientFunds {
                    available,
                    required: cost,
                });
            }
            self.ownership.unmortgage(property, player)?;
            (false, -cost, BalanceReason::Unmortgage)
        };
        self.players[player].credit(delta);
        self.emit(
            outcome,
            GameEvent::MortgageChanged {
                player,
                property,
                mortgaged,
            },
        );
        self.emit(
            outcome,
            GameEvent::BalanceChanged {
                player,
                delta,
                reason,
            },
        );
        Ok(())
    }

    fn emit(&mut self, outcome: &mut StepOutcome, event: GameEvent) {
        let entry = HistoryEntry {
            seq: self.history.len() as u64,
            turn: self.turn,
            event,
        };
        self.history.push(entry.clone());
        outcome.events.push(entry);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            code: self.code.clone(),
            config: self.config.clone(),
            status: self.status,
            players: self.players.clone(),
            next_player: self.next_player,
            turn: self.turn,
            ownership: self.ownership.clone(),
            trades: self.trades.clone(),
            winner: self.winner,
            free_parking_pot: self.free_parking_pot,
            history: self.history.clone(),
        }
    }

    /// Last-writer-wins merge of a store snapshot. Skipped while an operation is in flight.
    ///
    /// Returns whether the snapshot was applied.
    pub fn apply_snapshot(&mut self, snapshot: SessionSnapshot) -> bool {
        if self.lock.is_some() || snapshot.id != self.id {
            return false;
        }
        let turn_changed = snapshot.next_player != self.next_player || snapshot.turn != self.turn;
        self.code = snapshot.code;
        self.status = snapshot.status;
        self.players = snapshot.players;
        self.next_player = snapshot.next_player;
        self.turn = snapshot.turn;
        self.ownership = snapshot.ownership;
        self.trades = snapshot.trades;
        self.winner = snapshot.winner;
        self.free_parking_pot = snapshot.free_parking_pot;
        self.history = snapshot.history;
        if turn_changed {
            self.turn_state = TurnState::fresh();
        }
        self.refresh_available_actions();
        true
    }

    /// Rebuilds a local session from a store snapshot, e.g. after joining by code.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let mut state = GameState::new(GameConfig {
            num_players: snapshot.players.len().clamp(2, MAX_PLAYERS),
            ..snapshot.config.clone()
        });
        state.id = snapshot.id;
        state.apply_snapshot(snapshot);
        state
    }

    fn refresh_available_actions(&mut self) {
        self.available_actions = self.compute_available_actions();
    }

    fn compute_available_actions(&self) -> Vec<GameAction> {
        if self.status != SessionStatus::Running || self.lock.is_some() {
            return Vec::new();
        }
        let idx = self.next_player;
        let Some(player) = self.players.get(idx) else {
            return Vec::new();
        };
        let mut actions = Vec::new();
        match self.turn_state.phase {
            TurnPhase::WaitingForRoll => {
                actions.push(GameAction::roll(idx));
                if player.in_jail {
                    if player.can_afford(self.config.jail_fine) {
                        actions.push(GameAction::new(idx, ActionType::PayJailFine));
                    }
                    if player.total_jail_cards() > 0 {
                        actions.push(GameAction::new(idx, ActionType::UseJailCard));
                    }
                }
            }
            TurnPhase::AwaitingBuyDecision => {
                if let Some(Landing::Buyable { property, price }) = self.turn_state.active_landing {
                    if player.can_afford(price) {
                        actions.push(GameAction::buy(idx, property));
                    }
                    actions.push(GameAction::skip(idx, property));
                }
            }
            TurnPhase::EndingTurn => actions.push(GameAction::end_turn(idx)),
            TurnPhase::Rolling | TurnPhase::AwaitingLandingAction => {}
        }
        actions
    }
}

fn join_code(rng: &mut impl Rng) -> String {
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.gen_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}
