//! Folds a match's game records into win counts, points and the match result.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::MatchStatus;
use crate::state::{
    game_record::{GameRecord, Side, latest_by_game},
    handicap::{HandicapThresholds, MatchThresholds},
};

/// Final outcome of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    /// Home reached its win threshold.
    HomeWin,
    /// Away reached its win threshold.
    AwayWin,
    /// Play ended with neither side winning in a tie-eligible format.
    Tie,
}

/// Team ids for both sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTeams {
    /// Home team id.
    pub home_team_id: Uuid,
    /// Away team id.
    pub away_team_id: Uuid,
}

impl MatchTeams {
    /// Side a team plays on, if it takes part in the match.
    pub fn side_of(&self, team_id: Uuid) -> Option<Side> {
        if team_id == self.home_team_id {
            Some(Side::Home)
        } else if team_id == self.away_team_id {
            Some(Side::Away)
        } else {
            None
        }
    }

    /// Team playing on `side`.
    pub fn team(&self, side: Side) -> Uuid {
        match side {
            Side::Home => self.home_team_id,
            Side::Away => self.away_team_id,
        }
    }
}

/// Aggregate view of a match at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct MatchProjection {
    /// Confirmed home wins.
    pub home_wins: u8,
    /// Confirmed away wins.
    pub away_wins: u8,
    /// Home wins relative to the home baseline.
    pub home_points: i32,
    /// Away wins relative to the away baseline.
    pub away_points: i32,
    /// Games whose result counts.
    pub completed_count: u8,
    /// Outcome once decided.
    pub match_result: Option<MatchResult>,
}

impl MatchProjection {
    /// Status of a match still in play, as implied by these counts.
    pub fn live_status(&self) -> MatchStatus {
        if self.match_result.is_some() {
            MatchStatus::AwaitingVerification
        } else {
            MatchStatus::InProgress
        }
    }
}

/// Per-match projector configuration. [`MatchStateProjector::project`] is a
/// pure fold, so replaying it on the same records always yields the same
/// projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchStateProjector {
    teams: MatchTeams,
    thresholds: MatchThresholds,
    game_count: u8,
    golden_break_counts_as_win: bool,
}

impl MatchStateProjector {
    /// Configure a projector for one match.
    pub fn new(
        teams: MatchTeams,
        thresholds: MatchThresholds,
        game_count: u8,
        golden_break_counts_as_win: bool,
    ) -> Self {
        Self {
            teams,
            thresholds,
            game_count,
            golden_break_counts_as_win,
        }
    }

    /// Teams this projector counts for.
    pub fn teams(&self) -> &MatchTeams {
        &self.teams
    }

    /// Thresholds this projector decides with.
    pub fn thresholds(&self) -> &MatchThresholds {
        &self.thresholds
    }

    /// Fold `records` into a projection.
    ///
    /// A game counts once both sides confirmed it, and keeps counting while a
    /// vacate request is open. Golden-break wins are skipped when the league
    /// does not treat them as wins.
    pub fn project<'a, I>(&self, records: I) -> MatchProjection
    where
        I: IntoIterator<Item = &'a GameRecord>,
    {
        let latest = latest_by_game(records);

        let mut home_wins = 0u8;
        let mut away_wins = 0u8;
        let mut completed_count = 0u8;
        let mut confirmed_count = 0u8;

        for record in latest.values() {
            if !record.is_confirmed() {
                continue;
            }
            confirmed_count += 1;

            if record.golden_break && !self.golden_break_counts_as_win {
                continue;
            }

            let side = record
                .winner_team_id
                .and_then(|team_id| self.teams.side_of(team_id));
            match side {
                Some(Side::Home) => home_wins += 1,
                Some(Side::Away) => away_wins += 1,
                None => continue,
            }
            completed_count += 1;
        }

        let home = self.thresholds.home;
        let away = self.thresholds.away;
        let end_of_play = confirmed_count >= self.game_count;

        let match_result = if home_wins >= home.games_to_win {
            Some(MatchResult::HomeWin)
        } else if away_wins >= away.games_to_win {
            Some(MatchResult::AwayWin)
        } else if end_of_play {
            settle_at_end_of_play(home_wins, away_wins, home, away)
        } else {
            None
        };

        MatchProjection {
            home_wins,
            away_wins,
            home_points: i32::from(home_wins) - i32::from(home.baseline()),
            away_points: i32::from(away_wins) - i32::from(away.baseline()),
            completed_count,
            match_result,
        }
    }
}

/// Result once every game is confirmed and neither side reached its win
/// threshold. A tie needs both sides at their tie threshold; otherwise the
/// side at or below its lose threshold loses, and the point differential
/// breaks the case where both or neither are.
fn settle_at_end_of_play(
    home_wins: u8,
    away_wins: u8,
    home: HandicapThresholds,
    away: HandicapThresholds,
) -> Option<MatchResult> {
    if let (Some(home_tie), Some(away_tie)) = (home.games_to_tie, away.games_to_tie)
        && home_wins >= home_tie
        && away_wins >= away_tie
    {
        return Some(MatchResult::Tie);
    }

    match (home_wins <= home.games_to_lose, away_wins <= away.games_to_lose) {
        (true, false) => Some(MatchResult::AwayWin),
        (false, true) => Some(MatchResult::HomeWin),
        _ => {
            let home_points = i32::from(home_wins) - i32::from(home.baseline());
            let away_points = i32::from(away_wins) - i32::from(away.baseline());
            match home_points.cmp(&away_points) {
                Ordering::Greater => Some(MatchResult::HomeWin),
                Ordering::Less => Some(MatchResult::AwayWin),
                Ordering::Equal => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        game_record::{
            GameEvent, ScoringOptions,
            tests::{
                AWAY_CAPTAIN, AWAY_PLAYER, AWAY_TEAM, HOME_CAPTAIN, HOME_TEAM, blank,
                confirm_away, confirmed_home_win, score_home_win,
            },
        },
        handicap::{HandicapCharts, HandicapThresholds, MatchFormat},
    };
    use std::time::SystemTime;

    fn teams() -> MatchTeams {
        MatchTeams {
            home_team_id: HOME_TEAM,
            away_team_id: AWAY_TEAM,
        }
    }

    fn projector(format: MatchFormat, golden_break_counts_as_win: bool) -> MatchStateProjector {
        MatchStateProjector::new(
            teams(),
            format.thresholds(&HandicapCharts::default(), 0),
            format.game_count(),
            golden_break_counts_as_win,
        )
    }

    fn confirmed_away_win(game_number: u8) -> GameRecord {
        let now = SystemTime::UNIX_EPOCH;
        blank(game_number)
            .apply(
                &GameEvent::Score {
                    side: Side::Away,
                    member_id: AWAY_CAPTAIN,
                    winner_team_id: AWAY_TEAM,
                    winner_player_id: AWAY_PLAYER,
                    options: ScoringOptions::default(),
                },
                now,
            )
            .and_then(|pending| {
                pending.apply(
                    &GameEvent::Confirm {
                        side: Side::Home,
                        member_id: HOME_CAPTAIN,
                    },
                    now,
                )
            })
            .unwrap()
    }

    #[test]
    fn ten_home_wins_decide_an_even_three_v_three() {
        let mut records: Vec<GameRecord> = (1..=10).map(confirmed_home_win).collect();
        records.extend((11..=18).map(blank));

        let projection = projector(MatchFormat::ThreeVThree, true).project(&records);
        assert_eq!(projection.home_wins, 10);
        assert_eq!(projection.home_points, 1);
        assert_eq!(projection.away_points, -9);
        assert_eq!(projection.completed_count, 10);
        assert_eq!(projection.match_result, Some(MatchResult::HomeWin));
    }

    #[test]
    fn nine_wins_do_not_decide_mid_match() {
        let records: Vec<GameRecord> = (1..=9).map(confirmed_home_win).collect();
        let projection = projector(MatchFormat::ThreeVThree, true).project(&records);
        assert_eq!(projection.match_result, None);
        assert_eq!(projection.home_points, 0);
    }

    #[test]
    fn pending_games_do_not_count() {
        let records = vec![
            score_home_win(&blank(1), ScoringOptions::default()),
            confirmed_home_win(2),
        ];
        let projection = projector(MatchFormat::ThreeVThree, true).project(&records);
        assert_eq!(projection.home_wins, 1);
        assert_eq!(projection.completed_count, 1);
    }

    #[test]
    fn tiebreaker_is_decided_after_two_wins() {
        let records = vec![confirmed_away_win(1), confirmed_away_win(2), blank(3)];
        let projection = projector(MatchFormat::Tiebreaker, true).project(&records);
        assert_eq!(projection.away_wins, 2);
        assert_eq!(projection.match_result, Some(MatchResult::AwayWin));
        assert_eq!(
            projection.away_points,
            2 - i32::from(HandicapThresholds::TIEBREAKER.games_to_win)
        );
    }

    #[test]
    fn golden_break_is_ignored_when_league_disallows_it() {
        let golden = confirm_away(&score_home_win(
            &blank(1),
            ScoringOptions {
                break_and_run: false,
                golden_break: true,
            },
        ));
        assert!(golden.is_confirmed());

        let disallowed = projector(MatchFormat::ThreeVThree, false).project([&golden]);
        assert_eq!(disallowed.home_wins, 0);
        assert_eq!(disallowed.away_wins, 0);

        let allowed = projector(MatchFormat::ThreeVThree, true).project([&golden]);
        assert_eq!(allowed.home_wins, 1);
    }

    #[test]
    fn projection_is_idempotent() {
        let records: Vec<GameRecord> = (1..=5)
            .map(confirmed_home_win)
            .chain((6..=8).map(confirmed_away_win))
            .collect();
        let projector = projector(MatchFormat::ThreeVThree, true);
        assert_eq!(projector.project(&records), projector.project(&records));
    }

    #[test]
    fn even_split_at_end_of_play_is_a_tie() {
        let records: Vec<GameRecord> = (1..=9)
            .map(confirmed_home_win)
            .chain((10..=18).map(confirmed_away_win))
            .collect();
        let projection = projector(MatchFormat::ThreeVThree, true).project(&records);
        assert_eq!(projection.match_result, Some(MatchResult::Tie));
        assert_eq!(projection.completed_count, 18);
    }

    #[test]
    fn open_vacate_keeps_the_game_counted() {
        let requested = confirmed_home_win(1)
            .apply(
                &GameEvent::RequestVacate { side: Side::Away },
                SystemTime::UNIX_EPOCH,
            )
            .unwrap();
        let projection = projector(MatchFormat::ThreeVThree, true).project([&requested]);
        assert_eq!(projection.home_wins, 1);
    }

    fn golden_home_win(game_number: u8) -> GameRecord {
        confirm_away(&score_home_win(
            &blank(game_number),
            ScoringOptions {
                break_and_run: false,
                golden_break: true,
            },
        ))
    }

    #[test]
    fn uncounted_golden_breaks_do_not_make_a_tie() {
        let records: Vec<GameRecord> = (1..=8)
            .map(confirmed_home_win)
            .chain((9..=18).map(golden_home_win))
            .collect();
        let projection = projector(MatchFormat::ThreeVThree, false).project(&records);
        assert_eq!(projection.home_wins, 8);
        assert_eq!(projection.away_wins, 0);
        assert_eq!(projection.match_result, Some(MatchResult::HomeWin));
    }

    #[test]
    fn side_at_its_lose_threshold_loses_at_end_of_play() {
        let records: Vec<GameRecord> = (1..=8)
            .map(confirmed_home_win)
            .chain((9..=17).map(confirmed_away_win))
            .chain(std::iter::once(golden_home_win(18)))
            .collect();
        let projection = projector(MatchFormat::ThreeVThree, false).project(&records);
        assert_eq!((projection.home_wins, projection.away_wins), (8, 9));
        assert_eq!(projection.match_result, Some(MatchResult::AwayWin));
    }
}
