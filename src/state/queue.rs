//! Games waiting on one side's decision, in a stable order.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    game_record::{GameRecord, GameState, Side, latest_by_game},
    projector::MatchTeams,
};

/// What the viewer is being asked to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemKind {
    /// Confirm or deny a submitted result.
    Confirm,
    /// Approve or deny a vacate request.
    Vacate,
}

/// Prompt data for one game awaiting the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ConfirmationQueueItem {
    /// Game awaiting action.
    pub game_number: u8,
    /// Decision requested.
    pub kind: QueueItemKind,
    /// Side credited with the win.
    pub winner_side: Option<Side>,
    /// Player credited with the win.
    pub winner_player_id: Option<Uuid>,
    /// Break-and-run flag of the submitted result.
    pub break_and_run: bool,
    /// Golden-break flag of the submitted result.
    pub golden_break: bool,
    /// Record version the prompt was built from.
    pub version: u64,
}

/// Queue of games awaiting a single viewer, ordered by game number.
///
/// The queue is always rebuilt from the records rather than patched, so its
/// contents follow the records exactly and both clients see the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ConfirmationQueue {
    items: Vec<ConfirmationQueueItem>,
}

impl ConfirmationQueue {
    /// Build the queue for `viewer` from the full record set.
    pub fn derive<'a, I>(records: I, viewer: Side, teams: &MatchTeams) -> Self
    where
        I: IntoIterator<Item = &'a GameRecord>,
    {
        let items = latest_by_game(records)
            .into_values()
            .filter_map(|record| {
                let kind = match record.state() {
                    GameState::Pending { awaiting } if awaiting == viewer => QueueItemKind::Confirm,
                    GameState::VacatePending { requested_by } if requested_by != viewer => {
                        QueueItemKind::Vacate
                    }
                    _ => return None,
                };

                Some(ConfirmationQueueItem {
                    game_number: record.game_number,
                    kind,
                    winner_side: record
                        .winner_team_id
                        .and_then(|team_id| teams.side_of(team_id)),
                    winner_player_id: record.winner_player_id,
                    break_and_run: record.break_and_run,
                    golden_break: record.golden_break,
                    version: record.version,
                })
            })
            .collect();

        Self { items }
    }

    /// The single item shown to the viewer right now.
    pub fn current(&self) -> Option<&ConfirmationQueueItem> {
        self.items.first()
    }

    /// All items, lowest game number first.
    pub fn items(&self) -> &[ConfirmationQueueItem] {
        &self.items
    }

    /// Number of games awaiting the viewer.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Nothing awaits the viewer.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game_record::{
        GameEvent, ScoringOptions,
        tests::{AWAY_TEAM, HOME_TEAM, blank, confirmed_home_win, score_home_win},
    };
    use std::time::SystemTime;

    fn teams() -> MatchTeams {
        MatchTeams {
            home_team_id: HOME_TEAM,
            away_team_id: AWAY_TEAM,
        }
    }

    #[test]
    fn lower_game_numbers_come_first() {
        let records = vec![
            score_home_win(&blank(7), ScoringOptions::default()),
            score_home_win(&blank(3), ScoringOptions::default()),
        ];
        let queue = ConfirmationQueue::derive(&records, Side::Away, &teams());
        let numbers: Vec<u8> = queue.items().iter().map(|item| item.game_number).collect();
        assert_eq!(numbers, vec![3, 7]);
        assert_eq!(queue.current().map(|item| item.game_number), Some(3));
        assert_eq!(queue.items()[0].winner_side, Some(Side::Home));
    }

    #[test]
    fn submitting_side_sees_nothing_to_confirm() {
        let records = vec![score_home_win(&blank(1), ScoringOptions::default())];
        let queue = ConfirmationQueue::derive(&records, Side::Home, &teams());
        assert!(queue.is_empty());
    }

    #[test]
    fn vacate_is_shown_to_the_side_that_did_not_ask() {
        let requested = confirmed_home_win(2)
            .apply(
                &GameEvent::RequestVacate { side: Side::Home },
                SystemTime::UNIX_EPOCH,
            )
            .unwrap();
        let records = [requested];

        let away = ConfirmationQueue::derive(&records, Side::Away, &teams());
        assert_eq!(away.len(), 1);
        assert_eq!(away.items()[0].kind, QueueItemKind::Vacate);

        let home = ConfirmationQueue::derive(&records, Side::Home, &teams());
        assert!(home.is_empty());
    }

    #[test]
    fn duplicate_deliveries_collapse_to_the_newest() {
        let pending = score_home_win(&blank(4), ScoringOptions::default());
        let confirmed = crate::state::game_record::tests::confirm_away(&pending);
        let records = vec![pending.clone(), confirmed, pending];
        let queue = ConfirmationQueue::derive(&records, Side::Away, &teams());
        assert!(queue.is_empty());
    }
}
