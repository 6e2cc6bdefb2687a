//! Per-game scoring record and the confirmation state machine driving it.
//!
//! A record is never edited in place by callers: every operation is expressed
//! as a [`GameEvent`] and [`GameRecord::apply`] returns the next record (with a
//! bumped version) or a [`TransitionError`]. Persisting that next record is a
//! conditional write on the previous version, which is what serialises the two
//! team clients racing on the same game.

use std::{collections::BTreeMap, fmt, time::SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Reserved player id standing in for a substitute in a lineup slot.
pub const SUBSTITUTE_PLAYER_ID: Uuid = Uuid::nil();

/// One of the two teams taking part in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Home team.
    Home,
    /// Away team.
    Away,
}

impl Side {
    /// The other team.
    pub fn opposite(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => f.write_str("home"),
            Side::Away => f.write_str("away"),
        }
    }
}

/// What a player does at the start of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BreakAction {
    /// Player breaks the rack.
    Breaks,
    /// Player racks for the opponent.
    Racks,
}

/// Discipline played for the match, taken from league settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    /// 8-ball.
    #[default]
    EightBall,
    /// 9-ball.
    NineBall,
    /// 10-ball.
    TenBall,
}

/// Scoring flags attached to a submitted result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScoringOptions {
    /// Winner broke and ran out the table.
    #[serde(default)]
    pub break_and_run: bool,
    /// Game-deciding ball was pocketed on the break.
    #[serde(default)]
    pub golden_break: bool,
}

/// Stored state of a single game within a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Match this game belongs to.
    pub match_id: Uuid,
    /// Position of the game in the match, starting at 1.
    pub game_number: u8,
    /// Discipline played.
    pub game_type: GameType,
    /// Whether this game belongs to a tiebreaker match.
    pub is_tiebreaker: bool,
    /// Player occupying the home slot (may be [`SUBSTITUTE_PLAYER_ID`]).
    pub home_player_id: Uuid,
    /// Player occupying the away slot (may be [`SUBSTITUTE_PLAYER_ID`]).
    pub away_player_id: Uuid,
    /// Index of the home player in the home lineup.
    pub home_position: u8,
    /// Index of the away player in the away lineup.
    pub away_position: u8,
    /// Whether the home player breaks or racks.
    pub home_action: BreakAction,
    /// Whether the away player breaks or racks.
    pub away_action: BreakAction,
    /// Team credited with the win, once submitted.
    pub winner_team_id: Option<Uuid>,
    /// Player credited with the win, once submitted.
    pub winner_player_id: Option<Uuid>,
    /// Break-and-run flag.
    pub break_and_run: bool,
    /// Golden-break flag.
    pub golden_break: bool,
    /// Home member who confirmed the result.
    pub confirmed_by_home: Option<Uuid>,
    /// Away member who confirmed the result.
    pub confirmed_by_away: Option<Uuid>,
    /// Side asking for a confirmed result to be undone.
    pub vacate_requested_by: Option<Side>,
    /// When both sides had confirmed.
    pub confirmed_at: Option<SystemTime>,
    /// Incremented on every write; conditional writes compare against it.
    pub version: u64,
    /// Last write time.
    pub updated_at: SystemTime,
}

/// Derived position of a record in the confirmation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GameState {
    /// No result recorded.
    Unscored,
    /// Result submitted by one side, waiting on the other.
    Pending {
        /// Side whose confirmation is still missing.
        awaiting: Side,
    },
    /// Both sides confirmed.
    Confirmed,
    /// Confirmed, but one side asked to undo it.
    VacatePending {
        /// Side that asked for the vacate.
        requested_by: Side,
    },
}

/// Operations that move a record through the confirmation workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// Submit a result for an unscored game.
    Score {
        /// Side of the submitting member.
        side: Side,
        /// Submitting member.
        member_id: Uuid,
        /// Team credited with the win.
        winner_team_id: Uuid,
        /// Player credited with the win.
        winner_player_id: Uuid,
        /// Break-and-run / golden-break flags.
        options: ScoringOptions,
    },
    /// Second side agrees with the submitted result.
    Confirm {
        /// Side of the confirming member.
        side: Side,
        /// Confirming member.
        member_id: Uuid,
    },
    /// Second side rejects the submitted result.
    Deny {
        /// Side of the denying member.
        side: Side,
    },
    /// Ask to undo a confirmed result.
    RequestVacate {
        /// Side of the requesting member.
        side: Side,
    },
    /// Answer a vacate request.
    ResolveVacate {
        /// Side of the answering member.
        side: Side,
        /// `true` clears the game, `false` keeps the confirmed result.
        approve: bool,
    },
}

impl GameEvent {
    /// Side issuing the event.
    pub fn side(&self) -> Side {
        match self {
            GameEvent::Score { side, .. }
            | GameEvent::Confirm { side, .. }
            | GameEvent::Deny { side }
            | GameEvent::RequestVacate { side }
            | GameEvent::ResolveVacate { side, .. } => *side,
        }
    }

    /// Short operation name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::Score { .. } => "score",
            GameEvent::Confirm { .. } => "confirm",
            GameEvent::Deny { .. } => "deny",
            GameEvent::RequestVacate { .. } => "request_vacate",
            GameEvent::ResolveVacate { .. } => "resolve_vacate",
        }
    }
}

/// Error returned when an event cannot be applied from the record's state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event} cannot be applied to game {game_number} while {from:?}")]
pub struct InvalidTransition {
    /// Game the event targeted.
    pub game_number: u8,
    /// State the record was in.
    pub from: GameState,
    /// Operation that was rejected.
    pub event: &'static str,
}

/// Reasons a [`GameEvent`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Operation not permitted from the current state.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// Operation permitted, but not for the caller's side.
    #[error("{side} side may not {event} game {game_number}: {reason}")]
    UnauthorizedSide {
        /// Game the event targeted.
        game_number: u8,
        /// Caller's side.
        side: Side,
        /// Operation that was rejected.
        event: &'static str,
        /// Why the side is not allowed.
        reason: &'static str,
    },
    /// Mutually exclusive scoring flags were both set.
    #[error("invalid scoring option: {0}")]
    InvalidOption(&'static str),
}

impl GameRecord {
    /// Build an empty record for a freshly generated match.
    #[allow(clippy::too_many_arguments)]
    pub fn unscored(
        match_id: Uuid,
        game_number: u8,
        game_type: GameType,
        is_tiebreaker: bool,
        (home_player_id, home_position): (Uuid, u8),
        (away_player_id, away_position): (Uuid, u8),
        breaking_side: Side,
        now: SystemTime,
    ) -> Self {
        let (home_action, away_action) = match breaking_side {
            Side::Home => (BreakAction::Breaks, BreakAction::Racks),
            Side::Away => (BreakAction::Racks, BreakAction::Breaks),
        };

        Self {
            match_id,
            game_number,
            game_type,
            is_tiebreaker,
            home_player_id,
            away_player_id,
            home_position,
            away_position,
            home_action,
            away_action,
            winner_team_id: None,
            winner_player_id: None,
            break_and_run: false,
            golden_break: false,
            confirmed_by_home: None,
            confirmed_by_away: None,
            vacate_requested_by: None,
            confirmed_at: None,
            version: 0,
            updated_at: now,
        }
    }

    /// Derive the workflow state from the stored fields.
    ///
    /// A winner without any confirmation cannot be produced by [`GameRecord::apply`];
    /// such rows are treated as unscored so a fresh submission overwrites them.
    pub fn state(&self) -> GameState {
        if self.winner_team_id.is_none() {
            return GameState::Unscored;
        }

        match (
            self.confirmed_by_home,
            self.confirmed_by_away,
            self.vacate_requested_by,
        ) {
            (Some(_), Some(_), Some(requested_by)) => GameState::VacatePending { requested_by },
            (Some(_), Some(_), None) => GameState::Confirmed,
            (Some(_), None, _) => GameState::Pending {
                awaiting: Side::Away,
            },
            (None, Some(_), _) => GameState::Pending {
                awaiting: Side::Home,
            },
            (None, None, _) => GameState::Unscored,
        }
    }

    /// Both sides have confirmed (including while a vacate is being decided).
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.state(),
            GameState::Confirmed | GameState::VacatePending { .. }
        )
    }

    /// Member recorded as confirming for `side`.
    pub fn confirmation(&self, side: Side) -> Option<Uuid> {
        match side {
            Side::Home => self.confirmed_by_home,
            Side::Away => self.confirmed_by_away,
        }
    }

    /// Player seated for `side` in this game.
    pub fn player(&self, side: Side) -> Uuid {
        match side {
            Side::Home => self.home_player_id,
            Side::Away => self.away_player_id,
        }
    }

    /// Apply `event`, returning the next record without touching `self`.
    pub fn apply(&self, event: &GameEvent, now: SystemTime) -> Result<GameRecord, TransitionError> {
        let from = self.state();
        let mut next = self.clone();

        match (from, event) {
            (
                GameState::Unscored,
                GameEvent::Score {
                    side,
                    member_id,
                    winner_team_id,
                    winner_player_id,
                    options,
                },
            ) => {
                if options.break_and_run && options.golden_break {
                    return Err(TransitionError::InvalidOption(
                        "break_and_run and golden_break are mutually exclusive",
                    ));
                }
                next.reset();
                next.winner_team_id = Some(*winner_team_id);
                next.winner_player_id = Some(*winner_player_id);
                next.break_and_run = options.break_and_run;
                next.golden_break = options.golden_break;
                next.set_confirmation(*side, Some(*member_id));
            }
            (GameState::Pending { awaiting }, GameEvent::Confirm { side, member_id }) => {
                if *side != awaiting {
                    return Err(self.unauthorized(
                        event,
                        "this side already confirmed the submitted result",
                    ));
                }
                next.set_confirmation(*side, Some(*member_id));
                next.confirmed_at = Some(now);
            }
            (GameState::Pending { awaiting }, GameEvent::Deny { side }) => {
                if *side != awaiting {
                    return Err(
                        self.unauthorized(event, "only the side asked to confirm may deny")
                    );
                }
                next.reset();
            }
            (GameState::Confirmed, GameEvent::RequestVacate { side }) => {
                next.vacate_requested_by = Some(*side);
            }
            (GameState::VacatePending { requested_by }, GameEvent::ResolveVacate { side, approve }) => {
                if *side == requested_by {
                    return Err(self.unauthorized(
                        event,
                        "a vacate request must be resolved by the opposing side",
                    ));
                }
                if *approve {
                    next.reset();
                } else {
                    next.vacate_requested_by = None;
                }
            }
            (from, event) => {
                return Err(InvalidTransition {
                    game_number: self.game_number,
                    from,
                    event: event.name(),
                }
                .into());
            }
        }

        next.version = self.version + 1;
        next.updated_at = now;
        Ok(next)
    }

    /// Clear every scoring field, keeping seating and rotation.
    fn reset(&mut self) {
        self.winner_team_id = None;
        self.winner_player_id = None;
        self.break_and_run = false;
        self.golden_break = false;
        self.confirmed_by_home = None;
        self.confirmed_by_away = None;
        self.vacate_requested_by = None;
        self.confirmed_at = None;
    }

    fn set_confirmation(&mut self, side: Side, member_id: Option<Uuid>) {
        match side {
            Side::Home => self.confirmed_by_home = member_id,
            Side::Away => self.confirmed_by_away = member_id,
        }
    }

    fn unauthorized(&self, event: &GameEvent, reason: &'static str) -> TransitionError {
        TransitionError::UnauthorizedSide {
            game_number: self.game_number,
            side: event.side(),
            event: event.name(),
            reason,
        }
    }
}

/// Keep only the newest version of each game number.
pub fn latest_by_game<'a, I>(records: I) -> BTreeMap<u8, &'a GameRecord>
where
    I: IntoIterator<Item = &'a GameRecord>,
{
    let mut latest: BTreeMap<u8, &GameRecord> = BTreeMap::new();
    for record in records {
        latest
            .entry(record.game_number)
            .and_modify(|current| {
                if record.version > current.version {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    latest
}
